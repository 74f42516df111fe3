//! Mesh import from Gmsh MSH files and export of meshes with auxiliary fields to VTK.
pub mod msh;
pub mod vtk;
