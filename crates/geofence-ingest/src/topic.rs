use geofence_domain::TenantId;

use crate::error::IngestError;

pub const SUBJECT_PREFIX: &str = "geofence";
pub const MIRROR_SUBJECT_PREFIX: &str = "ws/geofence";

/// The wildcard subscription this crate subscribes to, matching both the
/// primary and mirror prefixes (§6: `geofence/{tenantId}/{deviceKey}` and an
/// optional `ws/geofence/...` mirror).
pub fn wildcard_subjects() -> [&'static str; 2] {
    ["geofence.*.*", "ws.geofence.*.*"]
}

/// A parsed subject, identifying which tenant and device-key published it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub tenant_id: TenantId,
    pub device_key: String,
}

/// Parses a subject of the form `geofence/{tenantId}/{deviceKey}` (dots are
/// used as NATS's hierarchy separator in place of the conceptual `/`, the
/// same translation the pack's mux transport makes between HTTP-style paths
/// and subject tokens). Rejects anything else.
pub fn parse(subject: &str) -> Result<Topic, IngestError> {
    let rest = subject
        .strip_prefix("ws.geofence.")
        .or_else(|| subject.strip_prefix("geofence."))
        .ok_or_else(|| IngestError::InvalidTopic(subject.to_string()))?;

    let mut parts = rest.splitn(2, '.');
    let tenant = parts.next().filter(|s| !s.is_empty());
    let device_key = parts.next().filter(|s| !s.is_empty());

    match (tenant, device_key) {
        (Some(tenant), Some(device_key)) if !device_key.contains('.') => {
            Ok(Topic { tenant_id: TenantId::new(tenant), device_key: device_key.to_string() })
        }
        _ => Err(IngestError::InvalidTopic(subject.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_primary_subject() {
        let topic = parse("geofence.acme.devkey123").unwrap();
        assert_eq!(topic.tenant_id, TenantId::new("acme"));
        assert_eq!(topic.device_key, "devkey123");
    }

    #[test]
    fn parses_mirror_subject() {
        let topic = parse("ws.geofence.acme.devkey123").unwrap();
        assert_eq!(topic.tenant_id, TenantId::new("acme"));
        assert_eq!(topic.device_key, "devkey123");
    }

    #[test]
    fn rejects_wrong_prefix() {
        assert!(parse("other.acme.devkey").is_err());
    }

    #[test]
    fn rejects_missing_segments() {
        assert!(parse("geofence.acme").is_err());
        assert!(parse("geofence..devkey").is_err());
    }

    #[test]
    fn rejects_extra_segments() {
        assert!(parse("geofence.acme.dev.extra").is_err());
    }
}
