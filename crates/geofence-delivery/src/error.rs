use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("store error: {0}")]
    Store(#[from] geofence_store::StoreError),

    #[error("adapter not configured for kind: {0}")]
    AdapterNotConfigured(String),

    #[error("adapter retriable failure: {0}")]
    AdapterRetriable(String),

    #[error("adapter permanent failure: {0}")]
    AdapterPermanent(String),

    #[error("template did not render valid JSON: {0}")]
    InvalidTemplate(String),

    #[error("crypto error: {0}")]
    Crypto(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid replay request: {0}")]
    InvalidReplay(String),

    #[error("internal error: {0}")]
    Internal(String),
}

impl DeliveryError {
    /// §7's retry/DLQ split for C7: retriable failures reschedule with
    /// backoff, everything else is permanent and kills the Delivery.
    pub fn is_retriable(&self) -> bool {
        matches!(self, DeliveryError::AdapterRetriable(_))
    }
}
