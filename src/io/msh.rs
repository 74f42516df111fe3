use crate::mesh::{ElementConnectivity, MixedDimensionMesh};
use crate::Real;
use eyre::{eyre, Context};
use log::debug;
use nalgebra::Point3;
use num::ToPrimitive;
use std::path::Path;

/// Loads a [`MixedDimensionMesh`] from a Gmsh MSH file at the given path.
///
/// See [`load_msh_from_bytes`].
pub fn load_msh_from_file<T, P>(file_path: P) -> eyre::Result<MixedDimensionMesh<T>>
where
    T: Real,
    P: AsRef<Path>,
{
    let file_path = file_path.as_ref();
    let msh_bytes = std::fs::read(file_path).wrap_err_with(|| format!("failed to read file {}", file_path.display()))?;
    load_msh_from_bytes(&msh_bytes).wrap_err("failed to load mesh from msh file")
}

/// Loads a [`MixedDimensionMesh`] by parsing the given bytes as a Gmsh MSH file.
///
/// Every element block of a supported first-order element type contributes its elements. An
/// element's id is its MSH tag minus one and its dimension is the entity dimension of its
/// block, so matrix and fracture elements of one file end up in the same mesh.
pub fn load_msh_from_bytes<T: Real>(bytes: &[u8]) -> eyre::Result<MixedDimensionMesh<T>> {
    let mut msh_file = mshio::parse_msh_bytes(bytes).map_err(|e| eyre!("failed to parse msh file: {}", e))?;

    let msh_nodes = msh_file
        .data
        .nodes
        .take()
        .ok_or(eyre!("MSH file does not contain nodes"))?;
    let msh_elements = msh_file
        .data
        .elements
        .take()
        .ok_or(eyre!("MSH file does not contain elements"))?;

    let mut vertices = Vec::new();
    for node_block in &msh_nodes.node_blocks {
        vertices.extend(vertices_from_node_block(node_block)?);
    }

    let mut elements = Vec::new();
    for element_block in &msh_elements.element_blocks {
        elements.extend(elements_from_element_block(element_block)?);
    }

    debug!(
        "loaded msh mesh with {} vertices and {} elements",
        vertices.len(),
        elements.len()
    );
    MixedDimensionMesh::try_from_vertices_and_elements(vertices, elements).wrap_err("invalid mesh in msh file")
}

fn vertices_from_node_block<T, F, I>(node_block: &mshio::NodeBlock<u64, I, F>) -> eyre::Result<Vec<Point3<T>>>
where
    T: Real,
    F: mshio::MshFloatT,
    I: mshio::MshIntT,
{
    // Vertex indices are derived from node tags, which requires consecutive tags
    if node_block.node_tags.is_some() {
        return Err(eyre!("node block tags are not consecutive in msh file"));
    }

    node_block
        .nodes
        .iter()
        .map(|node| Ok(Point3::new(f_to_t(node.x)?, f_to_t(node.y)?, f_to_t(node.z)?)))
        .collect()
}

fn f_to_t<T: Real, F: mshio::MshFloatT>(coordinate: F) -> eyre::Result<T> {
    let coordinate = coordinate
        .to_f64()
        .ok_or_else(|| eyre!("failed to convert coordinate to f64"))?;
    T::from_f64(coordinate).ok_or_else(|| eyre!("failed to convert node coordinate from f64 to target mesh real type"))
}

/// Number of nodes of the supported MSH element types.
fn supported_num_nodes(element_type: &mshio::ElementType) -> Option<usize> {
    use mshio::ElementType::*;
    match element_type {
        Pnt1 => Some(1),
        Lin2 => Some(2),
        Tri3 => Some(3),
        Qua4 => Some(4),
        Tet4 => Some(4),
        Hex8 => Some(8),
        Pri6 => Some(6),
        Pyr5 => Some(5),
        _ => None,
    }
}

fn elements_from_element_block<I>(element_block: &mshio::ElementBlock<u64, I>) -> eyre::Result<Vec<ElementConnectivity>>
where
    I: mshio::MshIntT,
{
    let num_nodes = supported_num_nodes(&element_block.element_type)
        .ok_or_else(|| eyre!("unsupported element type {:?} in msh file", element_block.element_type))?;
    let dimension = element_block
        .entity_dim
        .to_usize()
        .ok_or_else(|| eyre!("error converting element block entity dimension to usize"))?;

    element_block
        .elements
        .iter()
        .map(|element| {
            if element.nodes.len() < num_nodes {
                return Err(eyre!(
                    "element {} has {} nodes, expected {}",
                    element.element_tag,
                    element.nodes.len(),
                    num_nodes
                ));
            }
            let id = tag_to_index(element.element_tag)?;
            let vertex_indices = element.nodes[..num_nodes]
                .iter()
                .map(|&tag| tag_to_index(tag))
                .collect::<eyre::Result<Vec<_>>>()?;
            Ok(ElementConnectivity::new(id, dimension, vertex_indices))
        })
        .collect()
}

/// MSH tags are one-based.
fn tag_to_index(tag: u64) -> eyre::Result<usize> {
    tag.checked_sub(1)
        .and_then(|index| index.to_usize())
        .ok_or_else(|| eyre!("invalid tag {} in msh file", tag))
}
