use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use geofence_domain::{DeviceId, Point, RawFix, TenantId};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::IngestError;

/// The wire shape a device publishes (§6): a location sample plus an HMAC
/// signature over every other field.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LocationFix {
    pub v: u32,
    pub ts: DateTime<Utc>,
    pub lat: f64,
    pub lon: f64,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "speedMps")]
    pub speed_mps: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "accuracyM")]
    pub accuracy_m: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "batteryPct")]
    pub battery_pct: Option<f64>,
    #[serde(default)]
    pub attrs: BTreeMap<String, Value>,
    pub sig: String,
}

impl LocationFix {
    pub fn position(&self) -> Point {
        Point { lat: self.lat, lon: self.lon }
    }

    pub fn into_raw_fix(self, tenant_id: TenantId, device_id: DeviceId) -> RawFix {
        RawFix {
            tenant_id,
            device_id,
            ts: self.ts,
            position: self.position(),
            speed_mps: self.speed_mps,
            accuracy_m: self.accuracy_m,
            battery_pct: self.battery_pct,
            attrs: self.attrs,
        }
    }
}

/// Parses the raw message body, checking the position bounds §3 requires of
/// every `Device.last_position`. Returns both the typed fix and the original
/// [`Value`] (needed by [`crate::auth::verify_signature`] to canonicalise the
/// payload minus `sig` exactly as published).
pub fn decode(body: &[u8]) -> Result<(LocationFix, Value), IngestError> {
    let value: Value = serde_json::from_slice(body)?;
    let fix: LocationFix = serde_json::from_value(value.clone())?;
    if !fix.position().in_range() {
        return Err(IngestError::PositionOutOfRange { lat: fix.lat, lon: fix.lon });
    }
    Ok((fix, value))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn body(lat: f64, lon: f64) -> Vec<u8> {
        serde_json::to_vec(&json!({
            "v": 1,
            "ts": "2026-01-01T00:00:00Z",
            "lat": lat,
            "lon": lon,
            "sig": "deadbeef",
        }))
        .unwrap()
    }

    #[test]
    fn decodes_minimal_payload() {
        let (fix, _) = decode(&body(37.0, -122.0)).unwrap();
        assert_eq!(fix.v, 1);
        assert_eq!(fix.sig, "deadbeef");
    }

    #[test]
    fn rejects_out_of_range_latitude() {
        let err = decode(&body(120.0, -122.0)).unwrap_err();
        assert!(matches!(err, IngestError::PositionOutOfRange { .. }));
    }

    #[test]
    fn rejects_malformed_json() {
        let err = decode(b"not json").unwrap_err();
        assert!(matches!(err, IngestError::Decode(_)));
    }
}
