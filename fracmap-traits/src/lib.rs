//! Core traits used by `fracmap`.
//!
//! These are the interfaces through which a host simulation engine hands its mesh, its tensor
//! valued material properties and its collective communication to `fracmap`. They live in a
//! separate crate so that a host can implement them without depending on the rest of `fracmap`.
use nalgebra::{Matrix3, Point3, RealField, Scalar};

pub use nalgebra;

pub trait Real: RealField + Copy {}

impl<T: RealField + Copy> Real for T {}

/// Stable, non-negative identifier of a mesh element, unique within the (global) mesh.
pub type ElementId = usize;

/// An element resolved from an [`ElementMesh`]: its identifier, its topological dimension and
/// the coordinates of its nodes, in the element's local node order.
#[derive(Debug, Clone, PartialEq)]
pub struct MeshElement<T: Scalar> {
    pub id: ElementId,
    pub dimension: usize,
    pub nodes: Vec<Point3<T>>,
}

impl<T: Scalar> MeshElement<T> {
    pub fn num_nodes(&self) -> usize {
        self.nodes.len()
    }
}

/// Read-only view of a (possibly distributed) mesh containing elements of mixed dimension.
pub trait ElementMesh<T: Scalar> {
    /// The top topological dimension of the mesh.
    fn mesh_dimension(&self) -> usize;

    /// Number of elements enumerated on this partition.
    fn num_local_elements(&self) -> usize;

    /// Id of the local element at the given position of the enumeration.
    ///
    /// The enumeration order must be deterministic: it determines the row order of the
    /// correspondence map file.
    ///
    /// # Panics
    ///
    /// May panic if `local_index >= self.num_local_elements()`.
    fn local_element_id(&self, local_index: usize) -> ElementId;

    /// Resolves an element by id.
    ///
    /// Returns `None` if the element is not available on this partition.
    fn query_element(&self, id: ElementId) -> Option<MeshElement<T>>;

    /// Topological dimension of the element with the given id, if it can be resolved.
    fn element_dimension(&self, id: ElementId) -> Option<usize> {
        self.query_element(id).map(|element| element.dimension)
    }

    /// The largest element id of the whole (global) mesh, or `None` for an empty mesh.
    fn max_element_id(&self) -> Option<ElementId>;

    /// Ids of all locally enumerated elements, in enumeration order.
    fn local_element_ids(&self) -> Vec<ElementId> {
        (0..self.num_local_elements())
            .map(|i| self.local_element_id(i))
            .collect()
    }
}

impl<'a, T: Scalar, M: ElementMesh<T> + ?Sized> ElementMesh<T> for &'a M {
    fn mesh_dimension(&self) -> usize {
        M::mesh_dimension(self)
    }

    fn num_local_elements(&self) -> usize {
        M::num_local_elements(self)
    }

    fn local_element_id(&self, local_index: usize) -> ElementId {
        M::local_element_id(self, local_index)
    }

    fn query_element(&self, id: ElementId) -> Option<MeshElement<T>> {
        M::query_element(self, id)
    }

    fn element_dimension(&self, id: ElementId) -> Option<usize> {
        M::element_dimension(self, id)
    }

    fn max_element_id(&self) -> Option<ElementId> {
        M::max_element_id(self)
    }
}

/// A rank-two (3x3) tensor field defined per element and quadrature point.
pub trait TensorField<T: Scalar> {
    fn evaluate(&self, element: ElementId, quadrature_point: usize) -> Matrix3<T>;
}

impl<'a, T: Scalar, F: TensorField<T> + ?Sized> TensorField<T> for &'a F {
    fn evaluate(&self, element: ElementId, quadrature_point: usize) -> Matrix3<T> {
        F::evaluate(self, element, quadrature_point)
    }
}

/// Collective operations across a group of cooperating workers.
///
/// Every method is collective: all workers of the group must call it, in the same order,
/// before any of them returns.
pub trait Communicator {
    /// Index of this worker within the group.
    fn rank(&self) -> usize;

    /// Number of workers in the group.
    fn size(&self) -> usize;

    /// Returns `true` on every worker if and only if `local` is `true` on every worker.
    fn all(&self, local: bool) -> bool;

    /// Blocks until every worker of the group has reached the barrier.
    fn barrier(&self);

    /// Replaces `values` on every worker with the element-wise sum over all workers.
    ///
    /// # Panics
    ///
    /// May panic if the workers provide slices of different lengths.
    fn sum_in_place<T: Real + Send>(&self, values: &mut [T]);
}

impl<'a, C: Communicator + ?Sized> Communicator for &'a C {
    fn rank(&self) -> usize {
        C::rank(self)
    }

    fn size(&self) -> usize {
        C::size(self)
    }

    fn all(&self, local: bool) -> bool {
        C::all(self, local)
    }

    fn barrier(&self) {
        C::barrier(self)
    }

    fn sum_in_place<T: Real + Send>(&self, values: &mut [T]) {
        C::sum_in_place(self, values)
    }
}
