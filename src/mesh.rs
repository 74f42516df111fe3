//! Mixed-dimension meshes, element roles and the partitioning of a mesh among workers.
use crate::error::MeshError;
use crate::{ElementId, ElementMesh, MeshElement};
use nalgebra::{Point3, Scalar};
use rustc_hash::{FxHashMap, FxHashSet};
use serde::{Deserialize, Serialize};

pub mod procedural;

/// Connectivity of a single element in a [`MixedDimensionMesh`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ElementConnectivity {
    pub id: ElementId,
    pub dimension: usize,
    pub vertex_indices: Vec<usize>,
}

impl ElementConnectivity {
    pub fn new(id: ElementId, dimension: usize, vertex_indices: impl Into<Vec<usize>>) -> Self {
        Self {
            id,
            dimension,
            vertex_indices: vertex_indices.into(),
        }
    }
}

/// Index-based mesh whose elements may have different topological dimensions.
///
/// Typically the mesh holds full-dimension "matrix" elements together with co-dimension one
/// "fracture" elements whose nodes coincide with nodes of the matrix elements. Elements are
/// identified by their (stable) id, not by their position in the mesh.
#[derive(Debug, Clone, PartialEq)]
pub struct MixedDimensionMesh<T: Scalar> {
    vertices: Vec<Point3<T>>,
    elements: Vec<ElementConnectivity>,
    positions: FxHashMap<ElementId, usize>,
    dimension: usize,
}

impl<T: Scalar> MixedDimensionMesh<T> {
    /// Construct a mesh from vertices and element connectivity.
    ///
    /// Element ids must be unique and every vertex index must be in bounds. The top dimension
    /// of the mesh is the largest element dimension.
    pub fn try_from_vertices_and_elements(
        vertices: Vec<Point3<T>>,
        elements: Vec<ElementConnectivity>,
    ) -> Result<Self, MeshError> {
        let mut positions = FxHashMap::default();
        for (position, element) in elements.iter().enumerate() {
            if positions.insert(element.id, position).is_some() {
                return Err(MeshError::DuplicateElementId(element.id));
            }
            if let Some(&vertex_index) = element
                .vertex_indices
                .iter()
                .find(|&&idx| idx >= vertices.len())
            {
                return Err(MeshError::VertexIndexOutOfBounds {
                    element: element.id,
                    vertex_index,
                    num_vertices: vertices.len(),
                });
            }
        }

        let dimension = elements.iter().map(|e| e.dimension).max().unwrap_or(0);
        Ok(Self {
            vertices,
            elements,
            positions,
            dimension,
        })
    }

    pub fn vertices(&self) -> &[Point3<T>] {
        &self.vertices
    }

    pub fn elements(&self) -> &[ElementConnectivity] {
        &self.elements
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn element_by_id(&self, id: ElementId) -> Option<&ElementConnectivity> {
        self.positions.get(&id).map(|&position| &self.elements[position])
    }

    /// Ids of all elements with the given topological dimension, in mesh order.
    pub fn element_ids_with_dimension(&self, dimension: usize) -> Vec<ElementId> {
        self.elements
            .iter()
            .filter(|element| element.dimension == dimension)
            .map(|element| element.id)
            .collect()
    }
}

impl<T: Scalar> ElementMesh<T> for MixedDimensionMesh<T> {
    fn mesh_dimension(&self) -> usize {
        self.dimension
    }

    fn num_local_elements(&self) -> usize {
        self.elements.len()
    }

    fn local_element_id(&self, local_index: usize) -> ElementId {
        self.elements[local_index].id
    }

    fn query_element(&self, id: ElementId) -> Option<MeshElement<T>> {
        let connectivity = self.element_by_id(id)?;
        let nodes = connectivity
            .vertex_indices
            .iter()
            .map(|&idx| self.vertices[idx].clone())
            .collect();
        Some(MeshElement {
            id,
            dimension: connectivity.dimension,
            nodes,
        })
    }

    fn element_dimension(&self, id: ElementId) -> Option<usize> {
        self.element_by_id(id).map(|element| element.dimension)
    }

    fn max_element_id(&self) -> Option<ElementId> {
        self.elements.iter().map(|element| element.id).max()
    }
}

/// The role an element plays relative to the top dimension of its mesh.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ElementRole {
    /// Full-dimension element.
    Matrix,
    /// Co-dimension one element.
    Fracture,
    /// Any other dimension. These elements take no part in the mapping.
    Other,
}

impl ElementRole {
    pub fn classify(element_dimension: usize, mesh_dimension: usize) -> Self {
        if element_dimension == mesh_dimension {
            ElementRole::Matrix
        } else if Some(element_dimension) == mesh_dimension.checked_sub(1) {
            ElementRole::Fracture
        } else {
            ElementRole::Other
        }
    }
}

/// Split of element ids into matrix and fracture populations, each in enumeration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ElementPopulations {
    pub matrix: Vec<ElementId>,
    pub fracture: Vec<ElementId>,
}

impl ElementPopulations {
    pub fn split(mesh_dimension: usize, elements: impl IntoIterator<Item = (ElementId, usize)>) -> Self {
        let mut populations = Self::default();
        for (id, dimension) in elements {
            match ElementRole::classify(dimension, mesh_dimension) {
                ElementRole::Matrix => populations.matrix.push(id),
                ElementRole::Fracture => populations.fracture.push(id),
                ElementRole::Other => {}
            }
        }
        populations
    }

    /// Splits the locally enumerated elements of a mesh. Elements that cannot be resolved are skipped.
    pub fn from_mesh<T: Scalar>(mesh: &impl ElementMesh<T>) -> Self {
        let elements = mesh
            .local_element_ids()
            .into_iter()
            .filter_map(|id| mesh.element_dimension(id).map(|dim| (id, dim)));
        Self::split(mesh.mesh_dimension(), elements)
    }
}

/// The part of a mesh owned by a single worker.
///
/// Owned elements are enumerated and resolved through the underlying mesh. Ghost elements are
/// enumerated (after the owned ones) but can not be resolved, modelling elements that are known
/// by id on this partition while their data lives on another one. The global quantities
/// (top dimension and maximum element id) are those of the underlying mesh.
#[derive(Debug, Clone)]
pub struct MeshPartition<'a, M> {
    mesh: &'a M,
    owned: Vec<ElementId>,
    ghosts: Vec<ElementId>,
    owned_set: FxHashSet<ElementId>,
}

impl<'a, M> MeshPartition<'a, M> {
    pub fn new(mesh: &'a M, owned: Vec<ElementId>) -> Self {
        let owned_set = owned.iter().copied().collect();
        Self {
            mesh,
            owned,
            ghosts: Vec::new(),
            owned_set,
        }
    }

    pub fn with_ghosts(self, ghosts: Vec<ElementId>) -> Self {
        Self { ghosts, ..self }
    }

    pub fn owned_element_ids(&self) -> &[ElementId] {
        &self.owned
    }

    pub fn owns(&self, id: ElementId) -> bool {
        self.owned_set.contains(&id)
    }

    /// Splits the enumeration of `mesh` into `num_parts` contiguous partitions of nearly equal size.
    pub fn split_contiguous<T: Scalar>(mesh: &'a M, num_parts: usize) -> Vec<Self>
    where
        M: ElementMesh<T>,
    {
        assert!(num_parts > 0, "Number of partitions must be positive.");
        let ids = mesh.local_element_ids();
        let base = ids.len() / num_parts;
        let remainder = ids.len() % num_parts;

        let mut begin = 0;
        (0..num_parts)
            .map(|part| {
                let end = begin + base + usize::from(part < remainder);
                let partition = Self::new(mesh, ids[begin..end].to_vec());
                begin = end;
                partition
            })
            .collect()
    }
}

impl<'a, T: Scalar, M: ElementMesh<T>> ElementMesh<T> for MeshPartition<'a, M> {
    fn mesh_dimension(&self) -> usize {
        self.mesh.mesh_dimension()
    }

    fn num_local_elements(&self) -> usize {
        self.owned.len() + self.ghosts.len()
    }

    fn local_element_id(&self, local_index: usize) -> ElementId {
        if local_index < self.owned.len() {
            self.owned[local_index]
        } else {
            self.ghosts[local_index - self.owned.len()]
        }
    }

    fn query_element(&self, id: ElementId) -> Option<MeshElement<T>> {
        if self.owns(id) {
            self.mesh.query_element(id)
        } else {
            None
        }
    }

    fn element_dimension(&self, id: ElementId) -> Option<usize> {
        if self.owns(id) {
            self.mesh.element_dimension(id)
        } else {
            None
        }
    }

    fn max_element_id(&self) -> Option<ElementId> {
        self.mesh.max_element_id()
    }
}
