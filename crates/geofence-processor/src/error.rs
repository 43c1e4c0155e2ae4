use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProcessorError {
    #[error("geometry error: {0}")]
    Geometry(#[from] geofence_geo::GeoError),

    #[error("store error: {0}")]
    Store(#[from] geofence_store::StoreError),

    #[error("internal error: {0}")]
    Internal(String),
}

impl ProcessorError {
    /// §7's "Geometry computation error" kind: log, skip fix, advance offset.
    /// Store errors are the retry/backoff kind and are never silently skipped.
    pub fn is_skippable(&self) -> bool {
        matches!(self, ProcessorError::Geometry(_))
    }
}
