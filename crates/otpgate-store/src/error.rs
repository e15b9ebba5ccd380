//! Error types for the store layer.

/// Errors raised by a [`StorageBackend`](crate::StorageBackend).
///
/// [`DurableStore`](crate::DurableStore) never returns these to callers;
/// it logs them and carries on. Backends still report them so the log
/// line says what actually went wrong.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Reading or writing the underlying file failed.
    #[error("storage I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// A value could not be turned into JSON or back.
    #[error("storage serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The backend refused the write (for example, a quota was hit).
    #[error("storage backend rejected the operation: {0}")]
    Rejected(String),
}
