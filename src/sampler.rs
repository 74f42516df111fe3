//! Sampling of a single component of a rank-two tensor field on matrix elements, and averaging
//! of the sampled values onto fracture elements.
use crate::correspondence::{CorrespondenceMap, MapCache};
use crate::error::{ConfigError, SamplerError};
use crate::{Communicator, ElementId, ElementMesh, Real, TensorField};
use log::debug;
use nalgebra::{Matrix3, Scalar};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thread_local::ThreadLocal;

/// Index pair `(i, j)` selecting one component of a 3x3 tensor.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "(usize, usize)", into = "(usize, usize)")]
pub struct TensorComponent {
    i: usize,
    j: usize,
}

impl TensorComponent {
    /// Fails with [`ConfigError::InvalidIndex`] unless both indices are in `[0, 2]`.
    pub fn new(i: usize, j: usize) -> Result<Self, ConfigError> {
        if i > 2 {
            return Err(ConfigError::InvalidIndex {
                name: "index_i",
                value: i,
            });
        }
        if j > 2 {
            return Err(ConfigError::InvalidIndex {
                name: "index_j",
                value: j,
            });
        }
        Ok(Self { i, j })
    }

    pub fn i(&self) -> usize {
        self.i
    }

    pub fn j(&self) -> usize {
        self.j
    }

    pub fn extract<T: Scalar + Copy>(&self, tensor: &Matrix3<T>) -> T {
        tensor[(self.i, self.j)]
    }

    /// Axis names of the component, e.g. `"xy"` for `(0, 1)`.
    pub fn axis_suffix(&self) -> String {
        const AXES: [char; 3] = ['x', 'y', 'z'];
        [AXES[self.i], AXES[self.j]].iter().collect()
    }
}

impl TryFrom<(usize, usize)> for TensorComponent {
    type Error = ConfigError;

    fn try_from((i, j): (usize, usize)) -> Result<Self, Self::Error> {
        Self::new(i, j)
    }
}

impl From<TensorComponent> for (usize, usize) {
    fn from(component: TensorComponent) -> Self {
        (component.i, component.j)
    }
}

/// Dense per-element scalar values, indexed by element id.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ElementScalarStore<T> {
    values: Vec<T>,
}

impl<T: Real> ElementScalarStore<T> {
    pub fn new() -> Self {
        Self { values: Vec::new() }
    }

    pub fn zeros(len: usize) -> Self {
        Self {
            values: vec![T::zero(); len],
        }
    }

    /// Clears all values and resizes the store to `len` zeros.
    pub fn reset(&mut self, len: usize) {
        self.values.clear();
        self.values.resize(len, T::zero());
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, id: ElementId) -> Option<T> {
        self.values.get(id).copied()
    }

    /// # Panics
    ///
    /// Panics if `id` is not smaller than the length of the store.
    pub fn set(&mut self, id: ElementId, value: T) {
        assert!(
            id < self.values.len(),
            "Element id {} out of bounds for scalar store of length {}.",
            id,
            self.values.len()
        );
        self.values[id] = value;
    }

    pub fn as_slice(&self) -> &[T] {
        &self.values
    }

    pub fn as_mut_slice(&mut self) -> &mut [T] {
        &mut self.values
    }

    /// Adds the values of `other` element-wise.
    ///
    /// Merging stores whose non-zero entries are disjoint reconstructs the union of their
    /// entries, regardless of the order in which they are merged.
    ///
    /// # Panics
    ///
    /// Panics if the stores have different lengths.
    pub fn merge(&mut self, other: &Self) {
        assert_eq!(self.len(), other.len(), "Only stores of equal length can be merged.");
        for (value, other_value) in self.values.iter_mut().zip(&other.values) {
            *value += *other_value;
        }
    }
}

/// Phase of a [`Steppable`] object within the current step.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SamplerState {
    Uninitialized,
    Initializing,
    Accumulating,
    Finalized,
}

/// An object whose state is recomputed once per simulation step by an external driver.
///
/// Per step, the driver calls `begin_step` once, `accumulate` for every element owned by the
/// worker, and finally `end_step` once (collectively across all workers).
pub trait Steppable {
    type Error;

    fn begin_step(&mut self) -> Result<(), Self::Error>;

    fn accumulate(&mut self, element: ElementId) -> Result<(), Self::Error>;

    fn end_step(&mut self) -> Result<(), Self::Error>;
}

/// Samples the component `(i, j)` of a rank-two tensor field on the matrix elements of a mesh,
/// and provides averaged values for the fracture elements listed in a correspondence map file.
///
/// Every step reloads the correspondence map from its file (or from a [`MapCache`]), so that
/// the sampler always reflects the file as it is on disk.
pub struct RankTwoTensorSampler<'a, T, M, F, C>
where
    T: Real,
    F: ?Sized,
{
    mesh: &'a M,
    field: &'a F,
    comm: &'a C,
    component: TensorComponent,
    map_path: PathBuf,
    cache: Option<Arc<MapCache>>,
    store: ElementScalarStore<T>,
    map: Arc<CorrespondenceMap>,
    state: SamplerState,
}

impl<'a, T, M, F, C> RankTwoTensorSampler<'a, T, M, F, C>
where
    T: Real,
    M: ElementMesh<T>,
    F: TensorField<T> + ?Sized,
    C: Communicator,
{
    pub fn new(mesh: &'a M, field: &'a F, comm: &'a C, component: TensorComponent, map_path: impl Into<PathBuf>) -> Self {
        Self {
            mesh,
            field,
            comm,
            component,
            map_path: map_path.into(),
            cache: None,
            store: ElementScalarStore::new(),
            map: Arc::new(CorrespondenceMap::new()),
            state: SamplerState::Uninitialized,
        }
    }

    /// Loads the correspondence map through the given cache instead of parsing it every step.
    pub fn with_cache(self, cache: Arc<MapCache>) -> Self {
        Self {
            cache: Some(cache),
            ..self
        }
    }

    pub fn mesh(&self) -> &'a M {
        self.mesh
    }

    pub fn component(&self) -> TensorComponent {
        self.component
    }

    pub fn map_path(&self) -> &Path {
        &self.map_path
    }

    pub fn state(&self) -> SamplerState {
        self.state
    }

    pub fn store(&self) -> &ElementScalarStore<T> {
        &self.store
    }

    /// The correspondence map loaded by the most recent `begin_step`.
    pub fn map(&self) -> &CorrespondenceMap {
        &self.map
    }

    /// The value sampled for a matrix element.
    ///
    /// Returns zero if no step has been initialized yet, and for ids without a sampled value.
    pub fn value_at(&self, element: ElementId) -> T {
        self.store.get(element).unwrap_or_else(T::zero)
    }

    /// The mean of the values sampled for the matrix elements mapped to a fracture element.
    ///
    /// Returns zero if no step has been initialized yet.
    pub fn mapped_value_at(&self, element: ElementId) -> Result<T, SamplerError> {
        if self.store.is_empty() {
            return Ok(T::zero());
        }
        let mapped = self
            .map
            .get(element)
            .ok_or(SamplerError::UnknownFractureElement { element })?;
        if mapped.is_empty() {
            return Err(SamplerError::EmptyMappedSet { element });
        }

        let sum = mapped
            .iter()
            .fold(T::zero(), |sum, &matrix| sum + self.value_at(matrix));
        let count = T::from_usize(mapped.len()).expect("Must be able to fit usize in T");
        Ok(sum / count)
    }

    fn require_state(&self, operation: &'static str, expected: SamplerState) -> Result<(), SamplerError> {
        if self.state == expected {
            Ok(())
        } else {
            Err(SamplerError::InvalidState {
                operation,
                state: self.state,
            })
        }
    }

    fn sample(&self, element: ElementId) -> T {
        self.component.extract(&self.field.evaluate(element, 0))
    }
}

impl<'a, T, M, F, C> RankTwoTensorSampler<'a, T, M, F, C>
where
    T: Real,
    M: ElementMesh<T>,
    F: TensorField<T> + Sync + ?Sized,
    C: Communicator,
{
    /// Samples the given elements on the rayon thread pool.
    ///
    /// Every thread samples into its own partial store, and the partial stores are merged into
    /// the sampler's store. The result is the same as calling [`Steppable::accumulate`] for
    /// every element, provided that no element is given twice.
    pub fn accumulate_par(&mut self, elements: &[ElementId]) -> Result<(), SamplerError> {
        self.require_state("accumulate", SamplerState::Accumulating)?;

        let len = self.store.len();
        let partial_stores = ThreadLocal::new();
        let field = self.field;
        let component = self.component;
        elements.par_iter().for_each(|&element| {
            let mut partial = partial_stores
                .get_or(|| RefCell::new(ElementScalarStore::zeros(len)))
                .borrow_mut();
            partial.set(element, component.extract(&field.evaluate(element, 0)));
        });

        for partial in partial_stores.into_iter() {
            self.store.merge(&partial.into_inner());
        }
        Ok(())
    }
}

impl<'a, T, M, F, C> Steppable for RankTwoTensorSampler<'a, T, M, F, C>
where
    T: Real,
    M: ElementMesh<T>,
    F: TensorField<T> + ?Sized,
    C: Communicator,
{
    type Error = SamplerError;

    fn begin_step(&mut self) -> Result<(), SamplerError> {
        self.state = SamplerState::Initializing;
        let len = self.mesh.max_element_id().map_or(0, |id| id + 1);
        self.store.reset(len);
        self.map = Arc::new(CorrespondenceMap::new());

        let loaded = match &self.cache {
            Some(cache) => cache.load(&self.map_path),
            None => CorrespondenceMap::load(&self.map_path).map(Arc::new),
        };
        // Every worker must learn about a failed load, since finalization is collective
        let loaded_everywhere = self.comm.all(loaded.is_ok());
        self.map = loaded?;
        if !loaded_everywhere {
            return Err(SamplerError::FailedOnOtherWorker {
                operation: "load the correspondence map",
            });
        }
        debug!(
            "loaded {} correspondence map rows from {} for component {:?}",
            self.map.len(),
            self.map_path.display(),
            self.component
        );

        self.state = SamplerState::Accumulating;
        Ok(())
    }

    fn accumulate(&mut self, element: ElementId) -> Result<(), SamplerError> {
        self.require_state("accumulate", SamplerState::Accumulating)?;
        let value = self.sample(element);
        self.store.set(element, value);
        Ok(())
    }

    fn end_step(&mut self) -> Result<(), SamplerError> {
        let ready_everywhere = self.comm.all(self.state == SamplerState::Accumulating);
        self.require_state("finalize", SamplerState::Accumulating)?;
        if !ready_everywhere {
            return Err(SamplerError::FailedOnOtherWorker { operation: "finalize" });
        }
        self.comm.sum_in_place(self.store.as_mut_slice());
        self.state = SamplerState::Finalized;
        Ok(())
    }
}
