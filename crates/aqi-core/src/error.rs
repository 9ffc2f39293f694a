//! Error types for the prediction core
//!
//! Only [`CoreError::InvalidRequestDate`] is ever returned to callers of the
//! public contract. The other variants describe failures that the loader and
//! executor recover from locally; they exist so those recoveries can be
//! logged and tested by kind.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the prediction core
#[derive(Debug, Error)]
pub enum CoreError {
    /// Archive file missing, unreadable or not valid JSON
    #[error("archive at {path:?} is unreadable: {reason}")]
    ArchiveUnreadable { path: PathBuf, reason: String },

    /// Archive parsed but matched none of the known layouts
    #[error("archive does not match any known model layout")]
    UnrecognizedArchiveLayout,

    /// A model handle rejected its input or produced an unusable value
    #[error("model invocation failed: {0}")]
    ModelInvocation(#[from] ModelError),

    /// The requested point in time could not be parsed
    #[error("invalid request date '{0}', expected YYYY-MM-DD")]
    InvalidRequestDate(String),
}

/// Failure of a single `predict` call on a model handle
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ModelError {
    #[error("expected {expected} features, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    #[error("feature column '{0}' is not present in the row")]
    MissingColumn(String),

    #[error("feature index {index} is out of range for a row of {len}")]
    FeatureIndexOutOfRange { index: usize, len: usize },

    #[error("model produced a non-finite value")]
    NonFinite,

    #[error("model produced no output")]
    EmptyOutput,

    #[error("entry '{0}' does not expose a predict capability")]
    NotPredictable(String),

    #[error("model runtime error: {0}")]
    Runtime(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
