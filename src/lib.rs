//! Mapping of rank-two tensor quantities from matrix elements onto the lower-dimensional
//! fracture elements embedded in them.
//!
//! A [`CorrespondenceMap`](correspondence::CorrespondenceMap) records, for every fracture
//! element, the matrix elements sharing all of its nodes. It is built once from the mesh
//! geometry and persisted as a text file. Every step, a
//! [`RankTwoTensorSampler`](sampler::RankTwoTensorSampler) samples one tensor component on the
//! matrix elements, sums the samples across workers and exposes the mean over each fracture
//! element's mapped set. [`FieldWriter`](writer::FieldWriter) copies the result into an
//! auxiliary per-element field.
pub mod action;
pub mod comm;
pub mod config;
pub mod correspondence;
pub mod error;
pub mod geometry;
pub mod io;
pub mod mesh;
pub mod sampler;
pub mod writer;

pub use fracmap_traits::{Communicator, ElementId, ElementMesh, MeshElement, Real, TensorField};

pub extern crate nalgebra;
pub extern crate vtkio;
