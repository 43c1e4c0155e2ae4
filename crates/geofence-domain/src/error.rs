use thiserror::Error;

#[derive(Debug, Error)]
pub enum DomainError {
    #[error("zone {0}: circle radius must be > 0")]
    InvalidCircleRadius(String),

    #[error("zone {0}: polygon must have at least 3 vertices")]
    InvalidPolygonVertices(String),

    #[error("point out of range: lat={lat} lon={lon}")]
    PointOutOfRange { lat: f64, lon: f64 },

    #[error("device key too short: expected at least 16 chars, got {0}")]
    DeviceKeyTooShort(usize),

    #[error("invalid automation config: {0}")]
    InvalidAutomationConfig(String),
}
