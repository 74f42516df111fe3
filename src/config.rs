//! Configuration of samplers and of the mapping action, loadable from JSON.
use crate::error::ConfigError;
use crate::geometry::DEFAULT_TOLERANCE;
use crate::sampler::TensorComponent;
use eyre::{eyre, Context};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Configuration of a single [`RankTwoTensorSampler`](crate::sampler::RankTwoTensorSampler).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TensorSamplerConfig {
    /// Name of the rank-two tensor material property to sample.
    pub mat_prop: String,
    pub index_i: usize,
    pub index_j: usize,
    /// Path of the correspondence map file.
    pub file_name: PathBuf,
}

impl TensorSamplerConfig {
    pub fn component(&self) -> Result<TensorComponent, ConfigError> {
        TensorComponent::new(self.index_i, self.index_j)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.component().map(|_| ())
    }
}

fn default_create_map() -> bool {
    true
}

fn default_tolerance() -> f64 {
    DEFAULT_TOLERANCE
}

/// Configuration of a [`MapRankTwoTensorAction`](crate::action::MapRankTwoTensorAction).
///
/// `index_i[k]` and `index_j[k]` select the k-th component to map, for every listed property.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MapRankTwoTensorConfig {
    pub rank_two_material_property: Vec<String>,
    pub index_i: Vec<usize>,
    pub index_j: Vec<usize>,
    pub file_name: PathBuf,
    /// Whether to build and write the correspondence map before the first step. If not set,
    /// the file at `file_name` is trusted.
    #[serde(default = "default_create_map")]
    pub create_map: bool,
    #[serde(default = "default_tolerance")]
    pub tolerance: f64,
}

impl MapRankTwoTensorConfig {
    pub fn new(
        rank_two_material_property: Vec<String>,
        index_i: Vec<usize>,
        index_j: Vec<usize>,
        file_name: impl Into<PathBuf>,
    ) -> Self {
        Self {
            rank_two_material_property,
            index_i,
            index_j,
            file_name: file_name.into(),
            create_map: default_create_map(),
            tolerance: default_tolerance(),
        }
    }

    pub fn with_create_map(self, create_map: bool) -> Self {
        Self { create_map, ..self }
    }

    pub fn with_tolerance(self, tolerance: f64) -> Self {
        Self { tolerance, ..self }
    }

    /// The configured components, in configuration order.
    pub fn components(&self) -> Result<Vec<TensorComponent>, ConfigError> {
        if self.index_i.len() != self.index_j.len() {
            return Err(ConfigError::MismatchedIndexLists {
                index_i: self.index_i.len(),
                index_j: self.index_j.len(),
            });
        }
        self.index_i
            .iter()
            .zip(&self.index_j)
            .map(|(&i, &j)| TensorComponent::new(i, j))
            .collect()
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.components()?;
        if !self.tolerance.is_finite() || self.tolerance < 0.0 {
            return Err(ConfigError::InvalidTolerance(self.tolerance));
        }
        Ok(())
    }

    /// The configuration of the sampler for the given property and component.
    pub fn sampler_config(&self, property: &str, component: TensorComponent) -> TensorSamplerConfig {
        TensorSamplerConfig {
            mat_prop: property.to_string(),
            index_i: component.i(),
            index_j: component.j(),
            file_name: self.file_name.clone(),
        }
    }

    /// Parses and validates a configuration given as JSON.
    pub fn from_json_str(json: &str) -> eyre::Result<Self> {
        let config: Self = serde_json::from_str(json).wrap_err("failed to parse mapping configuration")?;
        config
            .validate()
            .wrap_err("invalid mapping configuration")?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    pub fn from_json_file(path: impl AsRef<Path>) -> eyre::Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|err| eyre!("failed to read configuration file {}: {}", path.display(), err))?;
        Self::from_json_str(&json).wrap_err_with(|| format!("in configuration file {}", path.display()))
    }
}
