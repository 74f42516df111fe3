//! Error types.
//!
//! Every error reported here is fatal for the current run: a geometric or configuration
//! mismatch invalidates the results of every subsequent step, so none of these errors is ever
//! retried or downgraded to a warning.
use crate::sampler::SamplerState;
use crate::ElementId;
use std::error::Error;
use std::fmt;
use std::fmt::Display;
use std::io;
use std::path::PathBuf;

/// Errors raised while constructing a mesh.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MeshError {
    DuplicateElementId(ElementId),
    VertexIndexOutOfBounds {
        element: ElementId,
        vertex_index: usize,
        num_vertices: usize,
    },
}

impl Display for MeshError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeshError::DuplicateElementId(id) => write!(f, "element id {} occurs more than once in the mesh", id),
            MeshError::VertexIndexOutOfBounds {
                element,
                vertex_index,
                num_vertices,
            } => write!(
                f,
                "element {} references vertex {}, but the mesh only has {} vertices",
                element, vertex_index, num_vertices
            ),
        }
    }
}

impl Error for MeshError {}

/// Errors raised while building or persisting the correspondence map.
#[derive(Debug)]
pub enum CorrespondenceError {
    /// An element could not be resolved on some partition of the mesh.
    ///
    /// The id is `None` on workers whose own partition was complete but which failed
    /// because another worker reported an unresolvable element.
    IncompleteElement { element: Option<ElementId> },
    /// A fracture element shares all of its nodes with no matrix element.
    UnmatchedFractureElement { element: ElementId },
    /// The map file could not be written.
    MapFileWrite { path: PathBuf, source: io::Error },
}

impl Display for CorrespondenceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CorrespondenceError::IncompleteElement { element: Some(id) } => {
                write!(f, "the element {} could not be found on this partition", id)
            }
            CorrespondenceError::IncompleteElement { element: None } => {
                write!(f, "an element could not be found on another partition of the mesh")
            }
            CorrespondenceError::UnmatchedFractureElement { element } => {
                write!(f, "the fracture element {} does not share its nodes with any matrix element", element)
            }
            CorrespondenceError::MapFileWrite { path, source } => {
                write!(f, "failed to write correspondence map to '{}': {}", path.display(), source)
            }
        }
    }
}

impl Error for CorrespondenceError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            CorrespondenceError::MapFileWrite { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Errors raised while reading a correspondence map.
#[derive(Debug)]
pub enum MapFileError {
    /// The file is missing, unreadable or the path is invalid.
    Unreadable { path: PathBuf, source: io::Error },
    /// A token of a line could not be parsed as an element id.
    MalformedLine {
        line_number: usize,
        line: String,
        token: String,
    },
}

impl Display for MapFileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MapFileError::Unreadable { path, source } => {
                write!(f, "error opening correspondence map file '{}': {}", path.display(), source)
            }
            MapFileError::MalformedLine {
                line_number,
                line,
                token,
            } => write!(
                f,
                "malformed correspondence map line {}: '{}' (could not parse '{}' as an element id)",
                line_number, line, token
            ),
        }
    }
}

impl Error for MapFileError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            MapFileError::Unreadable { source, .. } => Some(source),
            MapFileError::MalformedLine { .. } => None,
        }
    }
}

/// Errors raised by the tensor sampler.
#[derive(Debug)]
pub enum SamplerError {
    MapFile(MapFileError),
    /// The queried fracture element is not a key of the loaded map.
    UnknownFractureElement { element: ElementId },
    /// The queried fracture element is mapped to no matrix element.
    ///
    /// The builder never writes such a map, but a hand-edited file may contain one.
    EmptyMappedSet { element: ElementId },
    /// An operation was invoked in a phase of the step lifecycle in which it is not valid.
    InvalidState {
        operation: &'static str,
        state: SamplerState,
    },
    /// A collective phase of the step failed on another worker.
    FailedOnOtherWorker { operation: &'static str },
}

impl Display for SamplerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SamplerError::MapFile(err) => write!(f, "{}", err),
            SamplerError::UnknownFractureElement { element } => {
                write!(f, "could not find the key {} in the current map", element)
            }
            SamplerError::EmptyMappedSet { element } => {
                write!(f, "the key {} is mapped to no matrix element", element)
            }
            SamplerError::InvalidState { operation, state } => {
                write!(f, "cannot {} while the sampler is {:?}", operation, state)
            }
            SamplerError::FailedOnOtherWorker { operation } => {
                write!(f, "cannot {}: the operation failed on another worker", operation)
            }
        }
    }
}

impl Error for SamplerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            SamplerError::MapFile(err) => Some(err),
            _ => None,
        }
    }
}

impl From<MapFileError> for SamplerError {
    fn from(err: MapFileError) -> Self {
        SamplerError::MapFile(err)
    }
}

/// Errors raised while validating a configuration, before any mesh operation runs.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A tensor index is outside `[0, 2]`.
    InvalidIndex { name: &'static str, value: usize },
    MismatchedIndexLists { index_i: usize, index_j: usize },
    InvalidTolerance(f64),
    UnknownMaterialProperty(String),
}

impl Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidIndex { name, value } => {
                write!(f, "{} = {} is out of range, it must be 0, 1 or 2", name, value)
            }
            ConfigError::MismatchedIndexLists { index_i, index_j } => write!(
                f,
                "the size of the list of indices (index_i: {}, index_j: {}) is not the same",
                index_i, index_j
            ),
            ConfigError::InvalidTolerance(tol) => {
                write!(f, "tolerance must be finite and non-negative, got {}", tol)
            }
            ConfigError::UnknownMaterialProperty(name) => {
                write!(f, "no rank two tensor material property named '{}'", name)
            }
        }
    }
}

impl Error for ConfigError {}
