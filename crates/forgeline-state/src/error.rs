//! Error types for the release state layer.

use thiserror::Error;

/// Errors surfaced by storage trait implementations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Referenced record does not exist
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },

    /// A (component, version) pair is already taken. Uniqueness races lose
    /// with this error, never with a silent overwrite.
    #[error("version {version} already exists for component {component}")]
    DuplicateVersion { component: String, version: String },

    /// An OPEN assignment already exists for the (branch, version-type)
    #[error("open version assignment already exists for branch {branch}")]
    DuplicateOpenAssignment { branch: String },

    /// Backend-specific failure
    #[error("storage conflict: {0}")]
    Conflict(String),
}

/// Result type for storage operations
pub type StorageResult<T> = std::result::Result<T, StorageError>;
