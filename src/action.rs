//! Orchestration of the mapping of several tensor components onto auxiliary fields.
use crate::config::MapRankTwoTensorConfig;
use crate::correspondence::{CorrespondenceBuilder, CorrespondenceMap, MapCache};
use crate::error::ConfigError;
use crate::mesh::ElementPopulations;
use crate::sampler::{RankTwoTensorSampler, Steppable, TensorComponent};
use crate::writer::{AuxiliaryField, FieldWriter};
use crate::{Communicator, ElementId, ElementMesh, Real, TensorField};
use eyre::{eyre, Context};
use log::info;
use rustc_hash::FxHashSet;
use std::sync::Arc;

/// A tensor field that can be shared with the rayon thread pool.
pub type SharedTensorField<'a, T> = dyn TensorField<T> + Sync + 'a;

/// Provides the rank-two tensor material properties of a host by name.
pub trait MaterialProperties<T: Real> {
    fn rank_two_tensor(&self, name: &str) -> Option<&SharedTensorField<'_, T>>;
}

/// Maps components of rank-two tensor material properties onto auxiliary element fields.
///
/// For every configured property `p` and every configured component `(i, j)` the action owns
/// one sampler and one writer, producing a field named `p_ab` with `a, b` the axis names of
/// `i, j` (for example `stress_xy`).
pub struct MapRankTwoTensorAction<'a, T, M, C>
where
    T: Real,
{
    config: MapRankTwoTensorConfig,
    mesh: &'a M,
    comm: &'a C,
    cache: Arc<MapCache>,
    matrix_elements: Vec<ElementId>,
    outputs: Vec<(RankTwoTensorSampler<'a, T, M, SharedTensorField<'a, T>, C>, FieldWriter<T>)>,
}

/// Name of the auxiliary field holding component `(i, j)` of a property.
pub fn field_name(property: &str, component: TensorComponent) -> String {
    format!("{}_{}", property, component.axis_suffix())
}

impl<'a, T, M, C> MapRankTwoTensorAction<'a, T, M, C>
where
    T: Real,
    M: ElementMesh<T>,
    C: Communicator,
{
    /// Validates the configuration and resolves every property, before any mesh operation.
    pub fn new<P>(config: MapRankTwoTensorConfig, mesh: &'a M, comm: &'a C, properties: &'a P) -> eyre::Result<Self>
    where
        P: MaterialProperties<T> + ?Sized,
    {
        config
            .validate()
            .wrap_err("invalid mapping configuration")?;
        let components = config.components()?;
        let cache = Arc::new(MapCache::new());

        let mut outputs = Vec::new();
        for property in &config.rank_two_material_property {
            let field = properties
                .rank_two_tensor(property)
                .ok_or_else(|| ConfigError::UnknownMaterialProperty(property.clone()))?;
            for &component in &components {
                let sampler = RankTwoTensorSampler::new(mesh, field, comm, component, config.file_name.clone())
                    .with_cache(Arc::clone(&cache));
                outputs.push((sampler, FieldWriter::new(field_name(property, component))));
            }
        }

        let matrix_elements = ElementPopulations::from_mesh(mesh).matrix;
        Ok(Self {
            config,
            mesh,
            comm,
            cache,
            matrix_elements,
            outputs,
        })
    }

    /// Restricts accumulation to the matrix elements owned by this worker.
    ///
    /// By default every matrix element of the mesh is accumulated, which is correct for a
    /// single worker. With several workers sharing a replicated mesh, each worker must own a
    /// disjoint subset of the matrix elements.
    pub fn with_owned_elements(mut self, owned: &[ElementId]) -> Self {
        let owned: FxHashSet<_> = owned.iter().copied().collect();
        self.matrix_elements.retain(|id| owned.contains(id));
        self
    }

    /// Matrix elements accumulated by this worker, in enumeration order.
    pub fn owned_matrix_elements(&self) -> &[ElementId] {
        &self.matrix_elements
    }

    pub fn config(&self) -> &MapRankTwoTensorConfig {
        &self.config
    }

    /// Names of the auxiliary fields, in creation order.
    pub fn field_names(&self) -> Vec<&str> {
        self.outputs
            .iter()
            .map(|(_, writer)| writer.field().name())
            .collect()
    }

    pub fn fields(&self) -> impl '_ + Iterator<Item = &AuxiliaryField<T>> {
        self.outputs.iter().map(|(_, writer)| writer.field())
    }

    pub fn field(&self, name: &str) -> Option<&AuxiliaryField<T>> {
        self.fields().find(|field| field.name() == name)
    }

    /// Builds and writes the correspondence map if configured to do so.
    ///
    /// Returns the built map, or `None` if the existing file is trusted.
    pub fn setup(&self) -> eyre::Result<Option<CorrespondenceMap>> {
        if !self.config.create_map {
            info!(
                "using existing correspondence map {}",
                self.config.file_name.display()
            );
            return Ok(None);
        }

        let tolerance = T::from_f64(self.config.tolerance)
            .ok_or_else(|| eyre!("tolerance {} can not be represented", self.config.tolerance))?;
        let map = CorrespondenceBuilder::new()
            .with_tolerance(tolerance)
            .build_and_write(self.mesh, self.comm, &self.config.file_name, Some(&self.cache))
            .wrap_err("failed to create correspondence map")?;
        Ok(Some(map))
    }

    /// Runs one step of every sampler over the locally owned matrix elements, then refreshes
    /// every auxiliary field.
    pub fn execute_step(&mut self) -> eyre::Result<()> {
        for (sampler, writer) in &mut self.outputs {
            let name = writer.field().name().to_string();
            sampler
                .begin_step()
                .wrap_err_with(|| format!("failed to initialize sampler for {}", name))?;
            // Finalization is collective, so it runs even if sampling failed locally
            let accumulated = sampler.accumulate_par(&self.matrix_elements);
            let finalized = sampler.end_step();
            accumulated.wrap_err_with(|| format!("failed to sample {}", name))?;
            finalized.wrap_err_with(|| format!("failed to finalize sampler for {}", name))?;
            writer
                .write(&*sampler)
                .wrap_err_with(|| format!("failed to write auxiliary field {}", name))?;
        }
        Ok(())
    }
}
