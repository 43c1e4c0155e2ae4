mod containment;
mod error;

pub use containment::{
    contains, haversine_distance_m, validate_zone, within_bbox, zone_kind, CANDIDATE_RADIUS_M,
};
pub use error::GeoError;
