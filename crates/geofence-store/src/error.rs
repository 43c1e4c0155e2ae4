use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("internal store error: {0}")]
    Internal(String),

    #[error("conflict: {0}")]
    Conflict(String),
}

impl StoreError {
    /// Whether this failure is plausibly transient (connection drop, pool
    /// exhaustion) and worth retrying with backoff rather than surfacing
    /// immediately, per §7's "Storage unavailable" error kind.
    pub fn is_retriable(&self) -> bool {
        matches!(self, StoreError::Internal(_))
    }
}
