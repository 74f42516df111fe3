use crate::{two_squares_tensors, two_squares_with_fracture, ElementTensors};
use fracmap::comm::SerialCommunicator;
use fracmap::correspondence::{CorrespondenceBuilder, CorrespondenceMap, MapCache};
use fracmap::error::{ConfigError, MapFileError, SamplerError};
use fracmap::mesh::procedural::create_rectangular_uniform_quad_mesh_with_fracture;
use fracmap::mesh::ElementPopulations;
use fracmap::sampler::{ElementScalarStore, RankTwoTensorSampler, SamplerState, Steppable, TensorComponent};
use fracmap::ElementMesh;
use matrixcompare::assert_scalar_eq;
use nalgebra::{Matrix3, Vector3};
use proptest::prelude::*;
use std::path::Path;
use std::sync::Arc;
use util::{assert_panics, test_output_path};

fn write_two_squares_map(test_name: &str) -> std::path::PathBuf {
    let path = test_output_path(test_name, "map.txt");
    CorrespondenceBuilder::new()
        .build_and_write(&two_squares_with_fracture(), &SerialCommunicator, &path, None)
        .unwrap();
    path
}

#[test]
fn tensor_component_indices_are_validated() {
    assert_eq!(
        TensorComponent::new(3, 0),
        Err(ConfigError::InvalidIndex {
            name: "index_i",
            value: 3
        })
    );
    assert_eq!(
        TensorComponent::new(1, 7),
        Err(ConfigError::InvalidIndex {
            name: "index_j",
            value: 7
        })
    );

    let component = TensorComponent::new(0, 2).unwrap();
    assert_eq!((component.i(), component.j()), (0, 2));
    assert_eq!(component.axis_suffix(), "xz");
    assert_eq!(TensorComponent::new(2, 1).unwrap().axis_suffix(), "zy");

    let tensor = Matrix3::from_fn(|i, j| (10 * i + j) as f64);
    assert_eq!(component.extract(&tensor), 2.0);
}

#[test]
fn scalar_store_merge_is_elementwise_sum() {
    let mut a = ElementScalarStore::zeros(4);
    a.set(0, 1.0);
    a.set(3, 2.0);
    let mut b = ElementScalarStore::zeros(4);
    b.set(1, 5.0);

    let mut ab = a.clone();
    ab.merge(&b);
    let mut ba = b.clone();
    ba.merge(&a);
    assert_eq!(ab, ba);
    assert_eq!(ab.as_slice(), &[1.0, 5.0, 0.0, 2.0]);

    ab.reset(2);
    assert_eq!(ab.as_slice(), &[0.0, 0.0]);
    assert_eq!(ab.get(2), None);

    assert_panics!({
        let mut a = ElementScalarStore::<f64>::zeros(2);
        a.merge(&ElementScalarStore::zeros(3));
    });
    assert_panics!({
        let mut a = ElementScalarStore::<f64>::zeros(2);
        a.set(2, 1.0);
    });
}

#[test]
fn two_squares_mapped_value_is_mean_of_neighbors() {
    let path = write_two_squares_map("sampler_two_squares");
    let mesh = two_squares_with_fracture();
    let field = two_squares_tensors();
    let component = TensorComponent::new(0, 0).unwrap();
    let mut sampler = RankTwoTensorSampler::new(&mesh, &field, &SerialCommunicator, component, &path);

    sampler.begin_step().unwrap();
    for m in ElementPopulations::from_mesh(&mesh).matrix {
        sampler.accumulate(m).unwrap();
    }
    sampler.end_step().unwrap();

    assert_eq!(sampler.state(), SamplerState::Finalized);
    assert_scalar_eq!(sampler.value_at(0), 5.0, comp = abs, tol = 1e-12);
    assert_scalar_eq!(sampler.value_at(1), 7.0, comp = abs, tol = 1e-12);
    assert_scalar_eq!(sampler.mapped_value_at(2).unwrap(), 6.0, comp = abs, tol = 1e-12);
    // The fracture element itself is never sampled
    assert_eq!(sampler.value_at(2), 0.0);
}

#[test]
fn unknown_fracture_element_is_reported() {
    let path = write_two_squares_map("sampler_unknown_fracture");
    let mesh = two_squares_with_fracture();
    let field = two_squares_tensors();
    let component = TensorComponent::new(1, 1).unwrap();
    let mut sampler = RankTwoTensorSampler::new(&mesh, &field, &SerialCommunicator, component, &path);

    sampler.begin_step().unwrap();
    sampler.accumulate(0).unwrap();
    sampler.accumulate(1).unwrap();
    sampler.end_step().unwrap();

    assert_eq!(sampler.mapped_value_at(2).unwrap(), 3.0);
    let err = sampler.mapped_value_at(99).unwrap_err();
    assert!(matches!(err, SamplerError::UnknownFractureElement { element: 99 }));
    assert!(err.to_string().contains("99"));
}

#[test]
fn empty_mapped_set_is_reported() {
    let path = test_output_path("sampler_empty_mapped_set", "map.txt");
    std::fs::write(&path, "2\n").unwrap();
    let mesh = two_squares_with_fracture();
    let field = two_squares_tensors();
    let mut sampler =
        RankTwoTensorSampler::new(&mesh, &field, &SerialCommunicator, TensorComponent::new(0, 0).unwrap(), &path);

    sampler.begin_step().unwrap();
    sampler.end_step().unwrap();
    assert!(matches!(
        sampler.mapped_value_at(2),
        Err(SamplerError::EmptyMappedSet { element: 2 })
    ));
}

#[test]
fn queries_before_first_step_return_zero() {
    let mesh = two_squares_with_fracture();
    let field = two_squares_tensors();
    let sampler = RankTwoTensorSampler::new(
        &mesh,
        &field,
        &SerialCommunicator,
        TensorComponent::new(0, 0).unwrap(),
        "unused.txt",
    );
    assert_eq!(sampler.state(), SamplerState::Uninitialized);
    assert_eq!(sampler.value_at(0), 0.0);
    assert_eq!(sampler.mapped_value_at(2).unwrap(), 0.0);
}

#[test]
fn lifecycle_violations_are_reported() {
    let path = write_two_squares_map("sampler_lifecycle");
    let mesh = two_squares_with_fracture();
    let field = two_squares_tensors();
    let mut sampler =
        RankTwoTensorSampler::new(&mesh, &field, &SerialCommunicator, TensorComponent::new(0, 0).unwrap(), &path);

    assert!(matches!(
        sampler.accumulate(0),
        Err(SamplerError::InvalidState {
            state: SamplerState::Uninitialized,
            ..
        })
    ));
    assert!(matches!(sampler.end_step(), Err(SamplerError::InvalidState { .. })));

    sampler.begin_step().unwrap();
    assert_eq!(sampler.state(), SamplerState::Accumulating);
    sampler.end_step().unwrap();
    assert!(matches!(
        sampler.accumulate(0),
        Err(SamplerError::InvalidState {
            state: SamplerState::Finalized,
            ..
        })
    ));
    assert!(matches!(
        sampler.accumulate_par(&[0]),
        Err(SamplerError::InvalidState { .. })
    ));
}

#[test]
fn missing_or_malformed_map_file_fails_initialization() {
    let mesh = two_squares_with_fracture();
    let field = two_squares_tensors();
    let component = TensorComponent::new(0, 0).unwrap();

    let mut sampler = RankTwoTensorSampler::new(
        &mesh,
        &field,
        &SerialCommunicator,
        component,
        "data/unit_tests/sampler_missing/none.txt",
    );
    assert!(matches!(
        sampler.begin_step(),
        Err(SamplerError::MapFile(MapFileError::Unreadable { .. }))
    ));

    let path = test_output_path("sampler_malformed", "map.txt");
    std::fs::write(&path, "2 0 one\n").unwrap();
    let mut sampler = RankTwoTensorSampler::new(&mesh, &field, &SerialCommunicator, component, &path);
    assert!(matches!(
        sampler.begin_step(),
        Err(SamplerError::MapFile(MapFileError::MalformedLine { line_number: 1, .. }))
    ));
}

#[test]
fn every_step_reloads_the_map_and_resets_the_store() {
    let path = write_two_squares_map("sampler_reload");
    let mesh = two_squares_with_fracture();
    let field = two_squares_tensors();
    let component = TensorComponent::new(0, 0).unwrap();
    let cache = Arc::new(MapCache::new());
    let mut sampler =
        RankTwoTensorSampler::new(&mesh, &field, &SerialCommunicator, component, &path).with_cache(Arc::clone(&cache));

    sampler.begin_step().unwrap();
    sampler.accumulate(0).unwrap();
    sampler.accumulate(1).unwrap();
    sampler.end_step().unwrap();
    assert_eq!(sampler.mapped_value_at(2).unwrap(), 6.0);

    // Map the fracture to the right square only
    let mut map = CorrespondenceMap::new();
    map.push(2, vec![1]);
    map.write_to_file(&path).unwrap();
    cache.invalidate(&path);

    sampler.begin_step().unwrap();
    assert_eq!(sampler.value_at(0), 0.0);
    assert_eq!(sampler.map().get(2), Some([1].as_slice()));
    sampler.accumulate(1).unwrap();
    sampler.end_step().unwrap();
    assert_eq!(sampler.mapped_value_at(2).unwrap(), 7.0);
    assert_eq!(sampler.map_path(), Path::new(&path));
}

proptest! {
    #[test]
    fn parallel_accumulation_equals_serial_accumulation(
        units_x in 1..5usize,
        units_y in 1..5usize,
        cells_per_unit in 1..3usize,
        i in 0..3usize,
        j in 0..3usize
    ) {
        let path = test_output_path("sampler_parallel_accumulation", "map.txt");
        let mesh = create_rectangular_uniform_quad_mesh_with_fracture(
            1.0, units_x, units_y, cells_per_unit, &Vector3::new(0.0, 1.0, 0.0), 1);
        CorrespondenceBuilder::new().build_and_write(&mesh, &SerialCommunicator, &path, None).unwrap();

        let matrix = ElementPopulations::from_mesh(&mesh).matrix;
        let field = ElementTensors::from_fn(matrix.iter().copied(), |id| {
            Matrix3::from_fn(|r, c| (id * 9 + r * 3 + c) as f64 * 0.25)
        });
        let component = TensorComponent::new(i, j).unwrap();

        let mut serial = RankTwoTensorSampler::new(&mesh, &field, &SerialCommunicator, component, &path);
        serial.begin_step().unwrap();
        for &m in &matrix {
            serial.accumulate(m).unwrap();
        }
        serial.end_step().unwrap();

        let mut parallel = RankTwoTensorSampler::new(&mesh, &field, &SerialCommunicator, component, &path);
        parallel.begin_step().unwrap();
        parallel.accumulate_par(&matrix).unwrap();
        parallel.end_step().unwrap();

        prop_assert_eq!(parallel.store(), serial.store());
        prop_assert_eq!(serial.store().len(), mesh.max_element_id().unwrap() + 1);
        for (f, mapped) in serial.map().iter() {
            let expected = mapped.iter().map(|&m| serial.value_at(m)).sum::<f64>() / mapped.len() as f64;
            prop_assert_eq!(parallel.mapped_value_at(f).unwrap(), expected);
        }
    }
}
