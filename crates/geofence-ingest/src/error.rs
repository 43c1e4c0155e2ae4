use thiserror::Error;

/// Failures encountered while processing one inbound message (§4.1, steps 1-4).
/// Every variant but [`IngestError::Store`] means the payload itself is not
/// salvageable by retry and routes to the DLQ; `Store` failures are an infra
/// problem on the lookup path and are logged without consuming the message as
/// malformed input.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("topic does not match the expected pattern: {0}")]
    InvalidTopic(String),

    #[error("could not decode payload: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("malformed payload: {0}")]
    MalformedPayload(String),

    #[error("position out of range: lat={lat} lon={lon}")]
    PositionOutOfRange { lat: f64, lon: f64 },

    #[error("no paired device for this tenant/device-key pair")]
    UnknownDevice,

    #[error("signature verification failed")]
    SignatureMismatch,

    #[error("store error: {0}")]
    Store(#[from] geofence_store::StoreError),
}

impl IngestError {
    /// True for every failure whose cause is the payload itself (bad topic,
    /// bad JSON, unknown device, bad signature) — these are written to the
    /// DLQ and the message is considered handled. False for infra-level
    /// failures on the lookup path, which are logged and simply not
    /// forwarded downstream.
    pub fn is_dlq_eligible(&self) -> bool {
        !matches!(self, IngestError::Store(_))
    }
}
