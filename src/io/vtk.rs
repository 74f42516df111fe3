use crate::mesh::MixedDimensionMesh;
use crate::writer::AuxiliaryField;
use crate::Real;
use eyre::{eyre, Context};
use std::convert::TryInto;
use std::path::Path;
use vtkio::model::{
    Attribute, Attributes, ByteOrder, CellType, Cells, DataSet, Piece, UnstructuredGridPiece, Version, VertexNumbers,
    Vtk,
};

/// The VTK cell type of an element with the given dimension and number of nodes.
pub fn vtk_cell_type(dimension: usize, num_nodes: usize) -> Option<CellType> {
    match (dimension, num_nodes) {
        (0, 1) => Some(CellType::Vertex),
        (1, 2) => Some(CellType::Line),
        (2, 3) => Some(CellType::Triangle),
        (2, 4) => Some(CellType::Quad),
        (3, 4) => Some(CellType::Tetra),
        (3, 5) => Some(CellType::Pyramid),
        (3, 6) => Some(CellType::Wedge),
        (3, 8) => Some(CellType::Hexahedron),
        _ => None,
    }
}

/// Builds a VTK data set from a [`MixedDimensionMesh`], with one cell scalar attribute per
/// auxiliary field.
pub struct MixedDimensionMeshDataSetBuilder<'a, T: Real> {
    mesh: &'a MixedDimensionMesh<T>,
    fields: Vec<&'a AuxiliaryField<T>>,
    // Only used for exporting directly to file
    title: Option<String>,
}

impl<'a, T: Real> MixedDimensionMeshDataSetBuilder<'a, T> {
    pub fn from_mesh(mesh: &'a MixedDimensionMesh<T>) -> Self {
        Self {
            mesh,
            fields: Vec::new(),
            title: None,
        }
    }

    pub fn with_title(self, title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..self
        }
    }

    pub fn with_cell_field(mut self, field: &'a AuxiliaryField<T>) -> Self {
        self.fields.push(field);
        self
    }

    pub fn with_cell_fields(mut self, fields: impl IntoIterator<Item = &'a AuxiliaryField<T>>) -> Self {
        self.fields.extend(fields);
        self
    }

    pub fn try_build(&self) -> eyre::Result<DataSet> {
        let points = self
            .mesh
            .vertices()
            .iter()
            .flat_map(|v| v.coords.iter().copied())
            .map(to_f64)
            .collect::<eyre::Result<Vec<_>>>()?;

        // Vertices is laid out as follows: N, i_1, i_2, ... i_N,
        // so for e.g. quads this becomes 4 followed by the four indices making up the quad
        let mut vertices: Vec<u32> = Vec::new();
        let mut cell_types = Vec::new();
        for element in self.mesh.elements() {
            let num_nodes = element.vertex_indices.len();
            let cell_type = vtk_cell_type(element.dimension, num_nodes).ok_or_else(|| {
                eyre!(
                    "element {} of dimension {} with {} nodes has no VTK cell type",
                    element.id,
                    element.dimension,
                    num_nodes
                )
            })?;
            vertices.push(num_nodes.try_into()?);
            for &idx in &element.vertex_indices {
                vertices.push(idx.try_into()?);
            }
            cell_types.push(cell_type);
        }

        let ids = self.mesh.elements().iter().map(|element| element.id);
        let cell_attributes = self
            .fields
            .iter()
            .map(|field| {
                let values = field
                    .values_for(ids.clone())
                    .into_iter()
                    .map(to_f64)
                    .collect::<eyre::Result<Vec<_>>>()?;
                Ok(Attribute::scalars(field.name(), 1).with_data(values))
            })
            .collect::<eyre::Result<Vec<_>>>()?;

        let piece = UnstructuredGridPiece {
            points: points.into(),
            cells: Cells {
                cell_verts: VertexNumbers::Legacy {
                    num_cells: self.mesh.elements().len().try_into()?,
                    vertices,
                },
                types: cell_types,
            },
            data: Attributes {
                point: Vec::new(),
                cell: cell_attributes,
            },
        };

        Ok(DataSet::UnstructuredGrid {
            meta: None,
            pieces: vec![Piece::Inline(Box::new(piece))],
        })
    }

    /// Convenience function for directly exporting the dataset to a file.
    pub fn try_export(&self, filename: impl AsRef<Path>) -> eyre::Result<()> {
        let filepath = filename.as_ref();
        let fallback_title = filepath
            .file_stem()
            .map(|os_str| os_str.to_string_lossy().to_string())
            .unwrap_or_else(|| "untitled".to_string());
        let dataset = self.try_build()?;
        Vtk {
            version: Version { major: 4, minor: 1 },
            // If we don't have a title then just make the filepath the title
            title: self.title.clone().unwrap_or(fallback_title),
            byte_order: ByteOrder::BigEndian,
            data: dataset,
            file_path: None,
        }
        .export(filepath)
        .map_err(|err| eyre!("{}", err))
        .wrap_err_with(|| format!("failed to export VTK file {}", filepath.display()))
    }
}

fn to_f64<T: Real>(value: T) -> eyre::Result<f64> {
    value
        .to_subset()
        .ok_or_else(|| eyre!("failed to convert value to f64"))
}
