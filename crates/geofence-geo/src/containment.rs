use geo::{Contains, HaversineDistance, LineString, Point as GeoPoint, Polygon};
use geofence_domain::{Geometry, Point, Zone, ZoneKind};

use crate::error::GeoError;

const EARTH_CIRCUMFERENCE_M: f64 = 40_075_017.0;

/// Validates the static invariants on a zone's geometry (§3): circles need a
/// positive radius, polygons need at least 3 vertices. Called whenever a zone
/// is (re)loaded from the store, since C9 provides no application-level
/// validation of its own.
pub fn validate_zone(zone: &Zone) -> Result<(), GeoError> {
    match &zone.geometry {
        Geometry::Circle { radius_m, .. } => {
            if *radius_m <= 0.0 {
                return Err(GeoError::InvalidCircleRadius {
                    zone_id: zone.id.clone(),
                    radius_m: *radius_m,
                });
            }
        }
        Geometry::Polygon { vertices } => {
            if vertices.len() < 3 {
                return Err(GeoError::InvalidPolygonVertices {
                    zone_id: zone.id.clone(),
                    count: vertices.len(),
                });
            }
        }
        Geometry::Point { .. } => {}
    }
    Ok(())
}

/// Great-circle distance between two points, in meters.
pub fn haversine_distance_m(a: Point, b: Point) -> f64 {
    let ga = GeoPoint::new(a.lon, a.lat);
    let gb = GeoPoint::new(b.lon, b.lat);
    ga.haversine_distance(&gb)
}

/// Cheap prefilter: is `query` plausibly within `radius_m` of `center`, using a
/// fixed-latitude degree-delta bound rather than precise spherical distance.
/// Always a superset of the precise answer (never excludes a true candidate).
pub fn within_bbox(center: Point, query: Point, radius_m: f64) -> bool {
    let lat_deg_per_m = 360.0 / EARTH_CIRCUMFERENCE_M;
    let lon_scale = (center.lat.to_radians().cos()).max(1e-6);
    let lat_delta = (query.lat - center.lat).abs();
    let lon_delta = (query.lon - center.lon).abs() * lon_scale;
    let bound_deg = radius_m * lat_deg_per_m;
    lat_delta <= bound_deg && lon_delta <= bound_deg
}

/// Candidate-lookup default radius for the bounding-box prefilter (§4.3: "~1 km").
pub const CANDIDATE_RADIUS_M: f64 = 1000.0;

/// Precise containment test: point-in-polygon for polygons, Haversine distance
/// for circles, exact-match (within a meter) for point zones.
pub fn contains(zone: &Zone, point: Point) -> Result<bool, GeoError> {
    if !point.in_range() {
        return Err(GeoError::PointOutOfRange { lat: point.lat, lon: point.lon });
    }
    match &zone.geometry {
        Geometry::Circle { center, radius_m } => {
            Ok(haversine_distance_m(*center, point) <= *radius_m)
        }
        Geometry::Point { center } => Ok(haversine_distance_m(*center, point) <= 1.0),
        Geometry::Polygon { vertices } => {
            if vertices.len() < 3 {
                return Err(GeoError::DegenerateGeometry(zone.id.clone()));
            }
            let ring: LineString<f64> =
                vertices.iter().map(|p| (p.lon, p.lat)).collect();
            let polygon = Polygon::new(ring, vec![]);
            let gp = GeoPoint::new(point.lon, point.lat);
            Ok(polygon.contains(&gp))
        }
    }
}

pub fn zone_kind(zone: &Zone) -> ZoneKind {
    zone.geometry.kind()
}

#[cfg(test)]
mod tests {
    use super::*;
    use geofence_domain::{TenantId, ZoneId};

    fn circle_zone(center: Point, radius_m: f64) -> Zone {
        Zone {
            id: ZoneId::new("z1"),
            tenant_id: TenantId::new("t1"),
            name: "circle".into(),
            geometry: Geometry::Circle { center, radius_m },
            active: true,
        }
    }

    fn polygon_zone(vertices: Vec<Point>) -> Zone {
        Zone {
            id: ZoneId::new("z2"),
            tenant_id: TenantId::new("t1"),
            name: "poly".into(),
            geometry: Geometry::Polygon { vertices },
            active: true,
        }
    }

    #[test]
    fn circle_contains_center() {
        let center = Point { lat: 37.7749, lon: -122.4194 };
        let zone = circle_zone(center, 100.0);
        assert!(contains(&zone, center).unwrap());
    }

    #[test]
    fn circle_excludes_far_point() {
        let center = Point { lat: 37.7749, lon: -122.4194 };
        let zone = circle_zone(center, 100.0);
        let far = Point { lat: 37.7849, lon: -122.4194 };
        assert!(!contains(&zone, far).unwrap());
    }

    #[test]
    fn polygon_contains_interior_point() {
        let square = vec![
            Point { lat: 0.0, lon: 0.0 },
            Point { lat: 0.0, lon: 1.0 },
            Point { lat: 1.0, lon: 1.0 },
            Point { lat: 1.0, lon: 0.0 },
        ];
        let zone = polygon_zone(square);
        assert!(contains(&zone, Point { lat: 0.5, lon: 0.5 }).unwrap());
        assert!(!contains(&zone, Point { lat: 5.0, lon: 5.0 }).unwrap());
    }

    #[test]
    fn validate_rejects_zero_radius_circle() {
        let zone = circle_zone(Point { lat: 0.0, lon: 0.0 }, 0.0);
        assert!(matches!(validate_zone(&zone), Err(GeoError::InvalidCircleRadius { .. })));
    }

    #[test]
    fn validate_rejects_two_vertex_polygon() {
        let zone = polygon_zone(vec![Point { lat: 0.0, lon: 0.0 }, Point { lat: 1.0, lon: 1.0 }]);
        assert!(matches!(validate_zone(&zone), Err(GeoError::InvalidPolygonVertices { .. })));
    }

    #[test]
    fn bbox_prefilter_is_superset_of_precise_circle() {
        let center = Point { lat: 37.7749, lon: -122.4194 };
        let near = Point { lat: 37.7752, lon: -122.4194 };
        assert!(within_bbox(center, near, CANDIDATE_RADIUS_M));
    }
}
