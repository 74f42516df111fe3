use crate::{two_squares_tensors, two_squares_with_fracture, ElementTensors};
use fracmap::action::{field_name, MapRankTwoTensorAction, MaterialProperties, SharedTensorField};
use fracmap::comm::{SerialCommunicator, ThreadGroup};
use fracmap::config::MapRankTwoTensorConfig;
use fracmap::error::ConfigError;
use fracmap::sampler::TensorComponent;
use nalgebra::{Matrix3, Vector3};
use std::thread;
use util::test_output_path;

struct Properties {
    stress: ElementTensors,
    permeability: ElementTensors,
}

impl MaterialProperties<f64> for Properties {
    fn rank_two_tensor(&self, name: &str) -> Option<&SharedTensorField<'_, f64>> {
        match name {
            "stress" => Some(&self.stress as &SharedTensorField<'_, f64>),
            "permeability" => Some(&self.permeability as &SharedTensorField<'_, f64>),
            _ => None,
        }
    }
}

fn two_squares_properties() -> Properties {
    Properties {
        stress: two_squares_tensors(),
        permeability: ElementTensors::default()
            .with(0, Matrix3::from_diagonal(&Vector3::new(1.0, 2.0, 4.0)))
            .with(1, Matrix3::from_diagonal(&Vector3::new(3.0, 2.0, 8.0))),
    }
}

fn config(path: impl Into<std::path::PathBuf>) -> MapRankTwoTensorConfig {
    MapRankTwoTensorConfig::new(
        vec!["stress".to_string(), "permeability".to_string()],
        vec![0, 1, 2],
        vec![0, 1, 2],
        path,
    )
}

#[test]
fn field_names_follow_property_and_axes() {
    assert_eq!(field_name("stress", TensorComponent::new(0, 1).unwrap()), "stress_xy");

    let mesh = two_squares_with_fracture();
    let properties = two_squares_properties();
    let action = MapRankTwoTensorAction::new(
        config("unused.txt"),
        &mesh,
        &SerialCommunicator,
        &properties,
    )
    .unwrap();
    assert_eq!(
        action.field_names(),
        vec![
            "stress_xx",
            "stress_yy",
            "stress_zz",
            "permeability_xx",
            "permeability_yy",
            "permeability_zz"
        ]
    );
    assert_eq!(action.owned_matrix_elements(), &[0, 1]);
    assert!(action.field("stress_xy").is_none());
}

#[test]
fn unknown_material_property_is_rejected() {
    let mesh = two_squares_with_fracture();
    let properties = two_squares_properties();
    let config = MapRankTwoTensorConfig::new(vec!["strain".to_string()], vec![0], vec![0], "unused.txt");
    let err = MapRankTwoTensorAction::new(config, &mesh, &SerialCommunicator, &properties)
        .err()
        .unwrap();
    assert_eq!(
        err.downcast_ref::<ConfigError>(),
        Some(&ConfigError::UnknownMaterialProperty("strain".to_string()))
    );
}

#[test]
fn invalid_index_is_rejected_on_construction() {
    let path = test_output_path("action_invalid_index", "map.txt");
    let _ = std::fs::remove_file(&path);
    let mesh = two_squares_with_fracture();
    let properties = two_squares_properties();
    let config = MapRankTwoTensorConfig::new(vec!["stress".to_string()], vec![0], vec![3], &path);
    let err = MapRankTwoTensorAction::new(config, &mesh, &SerialCommunicator, &properties)
        .err()
        .unwrap();
    assert_eq!(
        err.downcast_ref::<ConfigError>(),
        Some(&ConfigError::InvalidIndex {
            name: "index_j",
            value: 3
        })
    );
    // Nothing touched the file system
    assert!(!path.exists());
}

#[test]
fn setup_and_step_map_every_component() -> eyre::Result<()> {
    let path = test_output_path("action_two_squares", "map.txt");
    let mesh = two_squares_with_fracture();
    let properties = two_squares_properties();
    let mut action = MapRankTwoTensorAction::new(config(&path), &mesh, &SerialCommunicator, &properties)?;

    let map = action.setup()?.expect("map should be created");
    assert_eq!(map.get(2), Some([0, 1].as_slice()));
    assert_eq!(std::fs::read_to_string(&path)?, "2 0 1\n");

    action.execute_step()?;
    let values = |name: &str| action.field(name).unwrap().values().to_vec();
    assert_eq!(values("stress_xx"), vec![5.0, 7.0, 6.0]);
    assert_eq!(values("stress_yy"), vec![3.0, 3.0, 3.0]);
    assert_eq!(values("stress_zz"), vec![1.0, 1.0, 1.0]);
    assert_eq!(values("permeability_xx"), vec![1.0, 3.0, 2.0]);
    assert_eq!(values("permeability_zz"), vec![4.0, 8.0, 6.0]);

    // A second step starts from scratch
    action.execute_step()?;
    assert_eq!(action.field("stress_xx").unwrap().values(), &[5.0, 7.0, 6.0]);
    Ok(())
}

#[test]
fn existing_map_is_trusted_when_not_created() -> eyre::Result<()> {
    let path = test_output_path("action_existing_map", "map.txt");
    // Map the fracture to the left square only
    std::fs::write(&path, "2 0\n")?;

    let mesh = two_squares_with_fracture();
    let properties = two_squares_properties();
    let config = MapRankTwoTensorConfig::new(vec!["stress".to_string()], vec![0], vec![0], &path).with_create_map(false);
    let mut action = MapRankTwoTensorAction::new(config, &mesh, &SerialCommunicator, &properties)?;
    assert!(action.setup()?.is_none());
    assert_eq!(std::fs::read_to_string(&path)?, "2 0\n");

    action.execute_step()?;
    assert_eq!(action.field("stress_xx").unwrap().values(), &[5.0, 7.0, 5.0]);
    Ok(())
}

#[test]
fn missing_map_fails_the_step() {
    let path = test_output_path("action_missing_map", "map.txt");
    let _ = std::fs::remove_file(&path);

    let mesh = two_squares_with_fracture();
    let properties = two_squares_properties();
    let config = MapRankTwoTensorConfig::new(vec!["stress".to_string()], vec![0], vec![0], &path).with_create_map(false);
    let mut action = MapRankTwoTensorAction::new(config, &mesh, &SerialCommunicator, &properties).unwrap();
    assert!(action.setup().unwrap().is_none());

    let err = action.execute_step().unwrap_err();
    assert!(format!("{:?}", err).contains("stress_xx"));
}

#[test]
fn owned_elements_split_the_work_across_workers() {
    let path = test_output_path("action_thread_group", "map.txt");
    let mesh = two_squares_with_fracture();
    let properties = two_squares_properties();
    let group = ThreadGroup::new(2);
    let owned = [vec![0], vec![1, 2]];

    let fields: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = owned
            .iter()
            .enumerate()
            .map(|(rank, owned)| {
                let (group, mesh, properties, path) = (&group, &mesh, &properties, &path);
                s.spawn(move || {
                    let comm = group.communicator(rank);
                    let config = MapRankTwoTensorConfig::new(vec!["stress".to_string()], vec![0], vec![0], path);
                    let mut action = MapRankTwoTensorAction::new(config, mesh, &comm, properties)
                        .unwrap()
                        .with_owned_elements(owned);
                    assert_eq!(action.owned_matrix_elements(), &[rank]);
                    action.setup().unwrap();
                    action.execute_step().unwrap();
                    action.field("stress_xx").unwrap().values().to_vec()
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    for values in fields {
        assert_eq!(values, vec![5.0, 7.0, 6.0]);
    }
}
