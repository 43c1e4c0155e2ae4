use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use sha2::{Digest, Sha256};

/// Serializes `value` to JSON with object keys sorted ascending and no
/// insignificant whitespace. Used for HMAC signing, where the wire
/// serializer's key order must not be load-bearing. Takes an already-parsed
/// [`Value`] so callers can strip fields (e.g. `sig`) before canonicalising.
pub fn canonical_json_value(value: &Value) -> String {
    sort_json_keys(value).to_string()
}

/// `H(deviceId || zoneId || type || ts)` truncated to 16 hex chars (§4.3),
/// the value a TransitionEvent is deduplicated on within a tenant.
pub fn transition_event_hash(
    device_id: &str,
    zone_id: &str,
    kind: &str,
    ts: DateTime<Utc>,
) -> String {
    let mut hasher = Sha256::new();
    hasher.update(device_id.as_bytes());
    hasher.update(zone_id.as_bytes());
    hasher.update(kind.as_bytes());
    hasher.update(ts.to_rfc3339().as_bytes());
    let digest = hasher.finalize();
    digest[..8].iter().map(|b| format!("{:02x}", b)).collect()
}

fn sort_json_keys(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), sort_json_keys(v)))
                .collect();
            serde_json::to_value(sorted).expect("sorted map of values always serializes")
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_json_keys).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn sorts_top_level_keys() {
        let v = json!({"b": 1, "a": 2});
        assert_eq!(canonical_json_value(&v), r#"{"a":2,"b":1}"#);
    }

    #[test]
    fn sorts_nested_keys_and_preserves_array_order() {
        let v = json!({"z": {"y": 1, "x": 2}, "a": [3, 1, 2]});
        assert_eq!(canonical_json_value(&v), r#"{"a":[3,1,2],"z":{"x":2,"y":1}}"#);
    }

    #[test]
    fn no_insignificant_whitespace() {
        let v = json!({"a": 1, "b": "two"});
        let s = canonical_json_value(&v);
        assert!(!s.contains(' '));
    }

    #[test]
    fn transition_event_hash_is_stable_and_16_hex_chars() {
        let ts = "2026-01-01T00:00:00Z".parse().unwrap();
        let a = transition_event_hash("dev-1", "zone-1", "enter", ts);
        let b = transition_event_hash("dev-1", "zone-1", "enter", ts);
        assert_eq!(a, b);
        assert_eq!(a.len(), 16);
    }

    #[test]
    fn transition_event_hash_differs_by_kind() {
        let ts = "2026-01-01T00:00:00Z".parse().unwrap();
        let enter = transition_event_hash("dev-1", "zone-1", "enter", ts);
        let exit = transition_event_hash("dev-1", "zone-1", "exit", ts);
        assert_ne!(enter, exit);
    }
}
