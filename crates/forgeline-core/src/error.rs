//! Error types for the release engine.

use forgeline_state::StorageError;
use thiserror::Error;

/// Errors surfaced by the engine's public operations.
#[derive(Error, Debug)]
pub enum EngineError {
    /// A required field is missing or malformed; the call is rejected.
    #[error("validation failed: {0}")]
    Validation(String),

    /// An assembly-affecting mutation was attempted outside the permitted
    /// lifecycle strength. Nothing was written.
    #[error("lifecycle violation: {0}")]
    LifecycleViolation(String),

    /// The requested write contradicts existing state (version already bound
    /// to another release, non-removable tag dropped).
    #[error("consistency violation: {0}")]
    Consistency(String),

    /// Referenced branch/component/release is missing
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// Storage-layer failure, including unique-version races. Callers may
    /// retry these.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Result type for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
