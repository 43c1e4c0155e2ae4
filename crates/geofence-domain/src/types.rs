use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

macro_rules! id_newtype {
    ($name:ident) => {
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(String);

        impl $name {
            pub fn new(id: impl Into<String>) -> Self {
                Self(id.into())
            }

            pub fn generate() -> Self {
                Self(Uuid::new_v4().to_string())
            }

            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<String> for $name {
            fn from(s: String) -> Self {
                Self(s)
            }
        }

        impl From<&str> for $name {
            fn from(s: &str) -> Self {
                Self(s.to_string())
            }
        }
    };
}

id_newtype!(TenantId);
id_newtype!(DeviceId);
id_newtype!(ZoneId);
id_newtype!(RuleId);
id_newtype!(AutomationId);
id_newtype!(DeliveryId);
id_newtype!(DlqEntryId);
id_newtype!(TransitionEventId);

/// A tenant: the billing and isolation boundary. Every other entity carries a `TenantId`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tenant {
    pub id: TenantId,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Device {
    pub id: DeviceId,
    pub tenant_id: TenantId,
    pub name: String,
    /// Shared secret used for HMAC verification. 16+ chars, tenant-unique.
    pub device_key: String,
    pub is_paired: bool,
    pub last_seen: Option<DateTime<Utc>>,
    pub last_position: Option<Point>,
    #[serde(default)]
    pub attrs: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct Point {
    pub lat: f64,
    pub lon: f64,
}

impl Point {
    pub fn in_range(&self) -> bool {
        (-90.0..=90.0).contains(&self.lat) && (-180.0..=180.0).contains(&self.lon)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneKind {
    Polygon,
    Circle,
    Point,
}

impl fmt::Display for ZoneKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ZoneKind::Polygon => "polygon",
            ZoneKind::Circle => "circle",
            ZoneKind::Point => "point",
        };
        f.write_str(s)
    }
}

/// Zone geometry, in WGS84 coordinates. `Circle`/`Point` carry a single center;
/// `Polygon` carries an ordered ring (first and last vertex need not repeat).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Geometry {
    Polygon { vertices: Vec<Point> },
    Circle { center: Point, radius_m: f64 },
    Point { center: Point },
}

impl Geometry {
    pub fn kind(&self) -> ZoneKind {
        match self {
            Geometry::Polygon { .. } => ZoneKind::Polygon,
            Geometry::Circle { .. } => ZoneKind::Circle,
            Geometry::Point { .. } => ZoneKind::Point,
        }
    }

    /// A rough center used for the bounding-box candidate prefilter.
    pub fn rough_center(&self) -> Point {
        match self {
            Geometry::Circle { center, .. } | Geometry::Point { center } => *center,
            Geometry::Polygon { vertices } => {
                let n = vertices.len().max(1) as f64;
                let (sum_lat, sum_lon) = vertices
                    .iter()
                    .fold((0.0, 0.0), |(la, lo), p| (la + p.lat, lo + p.lon));
                Point { lat: sum_lat / n, lon: sum_lon / n }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Zone {
    pub id: ZoneId,
    pub tenant_id: TenantId,
    pub name: String,
    pub geometry: Geometry,
    pub active: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransitionKind {
    Enter,
    Exit,
    Dwell,
}

impl fmt::Display for TransitionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransitionKind::Enter => "enter",
            TransitionKind::Exit => "exit",
            TransitionKind::Dwell => "dwell",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Rule {
    pub id: RuleId,
    pub tenant_id: TenantId,
    pub zone_id: ZoneId,
    pub device_id: Option<DeviceId>,
    pub automation_id: AutomationId,
    pub on_events: Vec<TransitionKind>,
    pub min_dwell_seconds: i64,
    #[serde(default)]
    pub device_filter: BTreeMap<String, serde_json::Value>,
    pub enabled: bool,
}

impl Rule {
    pub fn matches_event_kind(&self, kind: TransitionKind) -> bool {
        self.on_events.contains(&kind)
    }

    pub fn matches_device(&self, device_id: &DeviceId) -> bool {
        match &self.device_id {
            None => true,
            Some(d) => d == device_id,
        }
    }

    pub fn matches_dwell(&self, dwell_seconds: Option<i64>) -> bool {
        self.min_dwell_seconds <= dwell_seconds.unwrap_or(0).max(0)
    }

    /// Evaluates `device_filter` against a device's free-form attributes. An empty
    /// filter always matches; otherwise every key in the filter must be present in
    /// `attrs` with an equal value.
    pub fn matches_device_filter(&self, attrs: &BTreeMap<String, serde_json::Value>) -> bool {
        self.device_filter
            .iter()
            .all(|(k, v)| attrs.get(k) == Some(v))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AutomationKind {
    Webhook,
    Other(String),
}

impl fmt::Display for AutomationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AutomationKind::Webhook => f.write_str("webhook"),
            AutomationKind::Other(k) => f.write_str(k),
        }
    }
}

impl From<&str> for AutomationKind {
    fn from(s: &str) -> Self {
        match s {
            "webhook" => AutomationKind::Webhook,
            other => AutomationKind::Other(other.to_string()),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Automation {
    pub id: AutomationId,
    pub tenant_id: TenantId,
    pub kind: AutomationKind,
    pub config: BTreeMap<String, serde_json::Value>,
    pub enabled: bool,
}

/// The set of Zones a device is currently considered inside, plus the
/// timestamp of the last accepted transition for that device.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ZoneMembershipState {
    pub zones: std::collections::BTreeSet<ZoneId>,
    pub last_accepted_ts: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DwellTracker {
    pub entry_time: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub notified_minutes: std::collections::BTreeSet<i64>,
}

/// A single location sample after C1 has authenticated and resolved it to a
/// concrete device, in transit on the raw-fix stream (C2).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawFix {
    pub tenant_id: TenantId,
    pub device_id: DeviceId,
    pub ts: DateTime<Utc>,
    pub position: Point,
    pub speed_mps: Option<f64>,
    pub accuracy_m: Option<f64>,
    pub battery_pct: Option<f64>,
    #[serde(default)]
    pub attrs: BTreeMap<String, serde_json::Value>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionEvent {
    pub id: TransitionEventId,
    pub tenant_id: TenantId,
    pub device_id: DeviceId,
    pub zone_id: ZoneId,
    pub kind: TransitionKind,
    pub ts: DateTime<Utc>,
    pub dwell_seconds: Option<i64>,
    pub event_hash: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    InFlight,
    Success,
    Failed,
    Dead,
}

impl DeliveryStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryStatus::Success | DeliveryStatus::Dead)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Delivery {
    pub id: DeliveryId,
    pub tenant_id: TenantId,
    pub automation_id: AutomationId,
    pub rule_id: RuleId,
    pub transition_event_id: TransitionEventId,
    pub status: DeliveryStatus,
    pub attempt: u32,
    pub next_attempt_at: DateTime<Utc>,
    pub last_error: Option<String>,
    pub response_snapshot: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DlqOrigin {
    Ingest,
    Delivery,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DlqEntry {
    pub id: DlqEntryId,
    pub tenant_id: Option<TenantId>,
    pub origin: DlqOrigin,
    /// The original payload (ingest) or a reference to the Delivery (delivery).
    pub reference: serde_json::Value,
    pub error: String,
    pub created_at: DateTime<Utc>,
    pub replayed: bool,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn id_newtype_roundtrips_as_bare_string() {
        let id = TenantId::new("t-1");
        let json = serde_json::to_string(&id).unwrap();
        assert_eq!(json, "\"t-1\"");
        let back: TenantId = serde_json::from_str(&json).unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn point_in_range() {
        assert!(Point { lat: 37.0, lon: -122.0 }.in_range());
        assert!(!Point { lat: 91.0, lon: 0.0 }.in_range());
        assert!(!Point { lat: 0.0, lon: 181.0 }.in_range());
    }

    #[test]
    fn rule_device_filter_empty_always_matches() {
        let rule = Rule {
            id: RuleId::new("r1"),
            tenant_id: TenantId::new("t1"),
            zone_id: ZoneId::new("z1"),
            device_id: None,
            automation_id: AutomationId::new("a1"),
            on_events: vec![TransitionKind::Enter],
            min_dwell_seconds: 0,
            device_filter: BTreeMap::new(),
            enabled: true,
        };
        assert!(rule.matches_device_filter(&BTreeMap::new()));
    }

    #[test]
    fn rule_device_filter_requires_exact_match() {
        let mut filter = BTreeMap::new();
        filter.insert("tier".to_string(), serde_json::json!("gold"));
        let rule = Rule {
            id: RuleId::new("r1"),
            tenant_id: TenantId::new("t1"),
            zone_id: ZoneId::new("z1"),
            device_id: None,
            automation_id: AutomationId::new("a1"),
            on_events: vec![TransitionKind::Enter],
            min_dwell_seconds: 0,
            device_filter: filter,
            enabled: true,
        };
        let mut attrs = BTreeMap::new();
        assert!(!rule.matches_device_filter(&attrs));
        attrs.insert("tier".to_string(), serde_json::json!("gold"));
        assert!(rule.matches_device_filter(&attrs));
        attrs.insert("tier".to_string(), serde_json::json!("silver"));
        assert!(!rule.matches_device_filter(&attrs));
    }

    #[test]
    fn delivery_status_terminality() {
        assert!(DeliveryStatus::Success.is_terminal());
        assert!(DeliveryStatus::Dead.is_terminal());
        assert!(!DeliveryStatus::Pending.is_terminal());
        assert!(!DeliveryStatus::InFlight.is_terminal());
    }
}
