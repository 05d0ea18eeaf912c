//! Error types for lfs-store
//!
//! Provides a unified error type for all store and backend operations.

use thiserror::Error;

/// Result type alias using StoreError
pub type Result<T> = std::result::Result<T, StoreError>;

/// Unified error type for lfs-store operations
#[derive(Debug, Error)]
pub enum StoreError {
    // -------------------------------------------------------------------------
    // Backend Errors
    // -------------------------------------------------------------------------
    /// Target unreachable, permission denied, root cannot be created.
    #[error("backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("object not found: {0}")]
    ObjectNotFound(String),

    #[error("read offset {offset} exceeds object size {size}")]
    RangeError { offset: u64, size: u64 },

    // -------------------------------------------------------------------------
    // Integrity Errors
    // -------------------------------------------------------------------------
    #[error("content size does not match: expected {expected}, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("content hash does not match oid: expected {expected}, computed {actual}")]
    HashMismatch { expected: String, actual: String },

    /// Two identifiers resolved to one key with different content. Never retried.
    #[error("key collision suspected at {key}: expected size {expected_size}, stored size {stored_size}")]
    KeyCollisionSuspected {
        key: String,
        expected_size: u64,
        stored_size: u64,
    },

    // -------------------------------------------------------------------------
    // Input Errors
    // -------------------------------------------------------------------------
    #[error("invalid identifier: {0:?}")]
    InvalidIdentifier(String),

    #[error("configuration error: {0}")]
    Config(String),

    // -------------------------------------------------------------------------
    // I/O Errors
    // -------------------------------------------------------------------------
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl StoreError {
    /// True for the typed not-found condition
    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::ObjectNotFound(_))
    }

    /// True for failures that leave nothing stored (size/hash/collision)
    pub fn is_integrity_failure(&self) -> bool {
        matches!(
            self,
            StoreError::SizeMismatch { .. }
                | StoreError::HashMismatch { .. }
                | StoreError::KeyCollisionSuspected { .. }
        )
    }
}
