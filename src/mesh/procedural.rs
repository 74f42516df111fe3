//! Basic procedural generation of meshes with embedded fractures.
use crate::mesh::{ElementConnectivity, MixedDimensionMesh};
use crate::Real;
use nalgebra::{Point3, Vector3};

/// Generates an axis-aligned rectangular uniform quad mesh in the `z = 0` plane, with a
/// fracture of line segments along the horizontal grid line `fracture_row`.
///
/// The grid has `units_x * cells_per_unit` by `units_y * cells_per_unit` cells of equal size,
/// starting at `top_left` and extending in the positive `x` and negative `y` directions.
/// Vertex rows are numbered from the top, so `fracture_row = 0` places the fracture on the top
/// boundary.
///
/// Quads receive ids `0 .. num_quads` in row-major order, and the fracture segments receive the
/// following ids from left to right.
///
/// # Panics
///
/// Panics if `fracture_row` exceeds the number of cells in the `y` direction.
pub fn create_rectangular_uniform_quad_mesh_with_fracture<T>(
    unit_length: T,
    units_x: usize,
    units_y: usize,
    cells_per_unit: usize,
    top_left: &Vector3<T>,
    fracture_row: usize,
) -> MixedDimensionMesh<T>
where
    T: Real,
{
    let num_cells_x = units_x * cells_per_unit;
    let num_cells_y = units_y * cells_per_unit;
    assert!(
        num_cells_x == 0 || fracture_row <= num_cells_y,
        "Fracture row must be a vertex row of the grid."
    );

    if num_cells_x == 0 || num_cells_y == 0 {
        return MixedDimensionMesh::try_from_vertices_and_elements(Vec::new(), Vec::new())
            .expect("An empty mesh is always valid.");
    }

    let cell_size = unit_length / T::from_usize(cells_per_unit).expect("Must be able to fit usize in T");
    let num_vertices_x = num_cells_x + 1;
    let num_vertices_y = num_cells_y + 1;
    let to_global_vertex_index = |i: usize, j: usize| num_vertices_x * j + i;

    let mut vertices = Vec::with_capacity(num_vertices_x * num_vertices_y);
    for j in 0..num_vertices_y {
        for i in 0..num_vertices_x {
            let i_as_t = T::from_usize(i).expect("Must be able to fit usize in T");
            let j_as_t = T::from_usize(j).expect("Must be able to fit usize in T");
            let v = top_left + Vector3::new(i_as_t, -j_as_t, T::zero()) * cell_size;
            vertices.push(Point3::from(v));
        }
    }

    let mut elements = Vec::with_capacity(num_cells_x * (num_cells_y + 1));
    for j in 0..num_cells_y {
        for i in 0..num_cells_x {
            let id = elements.len();
            elements.push(ElementConnectivity::new(
                id,
                2,
                [
                    to_global_vertex_index(i, j + 1),
                    to_global_vertex_index(i + 1, j + 1),
                    to_global_vertex_index(i + 1, j),
                    to_global_vertex_index(i, j),
                ],
            ));
        }
    }

    for i in 0..num_cells_x {
        let id = elements.len();
        elements.push(ElementConnectivity::new(
            id,
            1,
            [
                to_global_vertex_index(i, fracture_row),
                to_global_vertex_index(i + 1, fracture_row),
            ],
        ));
    }

    MixedDimensionMesh::try_from_vertices_and_elements(vertices, elements)
        .expect("Procedurally generated connectivity is always in bounds.")
}

/// Unit square mesh with a horizontal fracture through its middle (or just above the middle
/// for an odd number of cells).
pub fn create_unit_square_uniform_quad_mesh_with_fracture<T>(cells_per_dim: usize) -> MixedDimensionMesh<T>
where
    T: Real,
{
    create_rectangular_uniform_quad_mesh_with_fracture(
        T::one(),
        1,
        1,
        cells_per_dim,
        &Vector3::new(T::zero(), T::one(), T::zero()),
        cells_per_dim / 2,
    )
}

/// Generates an axis-aligned rectangular uniform hexahedral mesh starting at the origin, with a
/// fracture of quadrilateral faces in the plane `z = fracture_layer * cell_size`.
///
/// Hexahedra receive ids `0 .. num_hexes` ordered by `k`, then `j`, then `i`, and the fracture
/// quads receive the following ids ordered by `j`, then `i`.
///
/// # Panics
///
/// Panics if `fracture_layer` exceeds the number of cells in the `z` direction.
pub fn create_rectangular_uniform_hex_mesh_with_fracture<T>(
    unit_length: T,
    units_x: usize,
    units_y: usize,
    units_z: usize,
    cells_per_unit: usize,
    fracture_layer: usize,
) -> MixedDimensionMesh<T>
where
    T: Real,
{
    let num_cells_x = units_x * cells_per_unit;
    let num_cells_y = units_y * cells_per_unit;
    let num_cells_z = units_z * cells_per_unit;

    if num_cells_x == 0 || num_cells_y == 0 || num_cells_z == 0 {
        return MixedDimensionMesh::try_from_vertices_and_elements(Vec::new(), Vec::new())
            .expect("An empty mesh is always valid.");
    }
    assert!(fracture_layer <= num_cells_z, "Fracture layer must be a vertex layer of the grid.");

    let cell_size = unit_length / T::from_usize(cells_per_unit).expect("Must be able to fit usize in T");
    let num_vertices_x = num_cells_x + 1;
    let num_vertices_y = num_cells_y + 1;
    let num_vertices_z = num_cells_z + 1;
    let to_global_vertex_index =
        |i: usize, j: usize, k: usize| (num_vertices_x * num_vertices_y) * k + num_vertices_x * j + i;

    let mut vertices = Vec::with_capacity(num_vertices_x * num_vertices_y * num_vertices_z);
    for k in 0..num_vertices_z {
        for j in 0..num_vertices_y {
            for i in 0..num_vertices_x {
                vertices.push(Point3::new(
                    T::from_usize(i).unwrap() * cell_size,
                    T::from_usize(j).unwrap() * cell_size,
                    T::from_usize(k).unwrap() * cell_size,
                ));
            }
        }
    }

    let idx = &to_global_vertex_index;
    let mut elements = Vec::new();
    for k in 0..num_cells_z {
        for j in 0..num_cells_y {
            for i in 0..num_cells_x {
                let id = elements.len();
                elements.push(ElementConnectivity::new(
                    id,
                    3,
                    [
                        idx(i, j, k),
                        idx(i + 1, j, k),
                        idx(i + 1, j + 1, k),
                        idx(i, j + 1, k),
                        idx(i, j, k + 1),
                        idx(i + 1, j, k + 1),
                        idx(i + 1, j + 1, k + 1),
                        idx(i, j + 1, k + 1),
                    ],
                ));
            }
        }
    }

    let k = fracture_layer;
    for j in 0..num_cells_y {
        for i in 0..num_cells_x {
            let id = elements.len();
            elements.push(ElementConnectivity::new(
                id,
                2,
                [idx(i, j, k), idx(i + 1, j, k), idx(i + 1, j + 1, k), idx(i, j + 1, k)],
            ));
        }
    }

    MixedDimensionMesh::try_from_vertices_and_elements(vertices, elements)
        .expect("Procedurally generated connectivity is always in bounds.")
}
