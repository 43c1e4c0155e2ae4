use geofence_domain::ZoneId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum GeoError {
    #[error("zone {zone_id}: circle radius must be > 0, got {radius_m}")]
    InvalidCircleRadius { zone_id: ZoneId, radius_m: f64 },

    #[error("zone {zone_id}: polygon must have at least 3 vertices, got {count}")]
    InvalidPolygonVertices { zone_id: ZoneId, count: usize },

    #[error("point out of range: lat={lat} lon={lon}")]
    PointOutOfRange { lat: f64, lon: f64 },

    #[error("degenerate geometry for zone {0}: containment is undefined")]
    DegenerateGeometry(ZoneId),
}
