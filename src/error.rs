//! Error types for request synchronization.

use crate::types::{RequestId, RequestStatus};
use thiserror::Error;

/// Main error type for store and lifecycle operations.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Store write failed: {0}")]
    StoreWrite(String),

    #[error("Request not found: {0}")]
    RecordNotFound(RequestId),

    #[error("No request id could be resolved for cancellation")]
    UnresolvedTarget,

    #[error("Invalid status transition: {from} -> {to}")]
    InvalidTransition { from: RequestStatus, to: RequestStatus },

    #[error("Invalid order: {0}")]
    InvalidOrder(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Deserialization error: {0}")]
    Deserialization(String),

    #[error("Corruption detected: {0}")]
    Corruption(String),

    #[error("Checksum mismatch: expected {expected}, got {got}")]
    ChecksumMismatch { expected: u32, got: u32 },

    #[error("Invalid store format: {0}")]
    InvalidFormat(String),

    #[error("Store is locked by another process")]
    Locked,

    #[error("Store not initialized")]
    NotInitialized,
}

impl SyncError {
    /// Whether this error means the store could not be reached or written.
    pub fn is_store_write(&self) -> bool {
        matches!(self, SyncError::StoreWrite(_) | SyncError::Io(_))
    }
}

impl From<serde_json::Error> for SyncError {
    fn from(e: serde_json::Error) -> Self {
        SyncError::Serialization(e.to_string())
    }
}

/// Result type for request synchronization.
pub type Result<T> = std::result::Result<T, SyncError>;
