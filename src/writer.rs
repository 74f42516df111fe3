//! Auxiliary per-element fields refreshed from a sampler after every step.
use crate::error::SamplerError;
use crate::mesh::ElementRole;
use crate::sampler::RankTwoTensorSampler;
use crate::{Communicator, ElementId, ElementMesh, Real, TensorField};

/// A named scalar field with one value per element id.
#[derive(Debug, Clone, PartialEq)]
pub struct AuxiliaryField<T> {
    name: String,
    values: Vec<T>,
}

impl<T: Real> AuxiliaryField<T> {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            values: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Values indexed by element id.
    pub fn values(&self) -> &[T] {
        &self.values
    }

    pub fn value(&self, id: ElementId) -> Option<T> {
        self.values.get(id).copied()
    }

    /// Values for the given element ids, with zero for ids outside the field.
    pub fn values_for(&self, ids: impl IntoIterator<Item = ElementId>) -> Vec<T> {
        ids.into_iter()
            .map(|id| self.value(id).unwrap_or_else(T::zero))
            .collect()
    }

    fn reset(&mut self, len: usize) {
        self.values.clear();
        self.values.resize(len, T::zero());
    }
}

/// Writes the values of one sampler into one auxiliary field.
///
/// Matrix elements receive their sampled value and fracture elements the mean of the values of
/// their mapped matrix elements. Elements of any other dimension receive zero.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldWriter<T> {
    field: AuxiliaryField<T>,
}

impl<T: Real> FieldWriter<T> {
    pub fn new(field_name: impl Into<String>) -> Self {
        Self {
            field: AuxiliaryField::new(field_name),
        }
    }

    pub fn field(&self) -> &AuxiliaryField<T> {
        &self.field
    }

    pub fn into_field(self) -> AuxiliaryField<T> {
        self.field
    }

    /// Recomputes the field for every locally enumerated element that can be resolved.
    ///
    /// Values of elements that are not resolved locally are zero.
    pub fn write<M, F, C>(&mut self, sampler: &RankTwoTensorSampler<'_, T, M, F, C>) -> Result<(), SamplerError>
    where
        M: ElementMesh<T>,
        F: TensorField<T> + ?Sized,
        C: Communicator,
    {
        let mesh = sampler.mesh();
        self.field
            .reset(mesh.max_element_id().map_or(0, |id| id + 1));

        let mesh_dimension = mesh.mesh_dimension();
        for id in mesh.local_element_ids() {
            if let Some(dimension) = mesh.element_dimension(id) {
                self.field.values[id] = element_value(sampler, id, dimension, mesh_dimension)?;
            }
        }
        Ok(())
    }
}

/// The value of the auxiliary field for a single element.
pub fn element_value<T, M, F, C>(
    sampler: &RankTwoTensorSampler<'_, T, M, F, C>,
    id: ElementId,
    element_dimension: usize,
    mesh_dimension: usize,
) -> Result<T, SamplerError>
where
    T: Real,
    M: ElementMesh<T>,
    F: TensorField<T> + ?Sized,
    C: Communicator,
{
    match ElementRole::classify(element_dimension, mesh_dimension) {
        ElementRole::Matrix => Ok(sampler.value_at(id)),
        ElementRole::Fracture => sampler.mapped_value_at(id),
        ElementRole::Other => Ok(T::zero()),
    }
}
