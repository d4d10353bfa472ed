//! Error types for stores and middlewares.

use thiserror::Error;

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors surfaced by the store contract.
#[derive(Debug, Error)]
pub enum StoreError {
    /// A write, reinitialization or destroy was attempted on a derived store.
    #[error("{operation} is not available in derived store")]
    DerivedStoreMutation { operation: &'static str },
}

/// Errors that can occur while synchronizing stores across contexts.
#[derive(Debug, Error)]
pub enum SyncError {
    /// No broadcast mechanism is available in this context.
    #[error("broadcast channels are not supported in this context")]
    Unsupported,

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A custom codec rejected its input.
    #[error("codec error: {0}")]
    Codec(String),

    /// Channel closed.
    #[error("channel closed")]
    ChannelClosed,
}
