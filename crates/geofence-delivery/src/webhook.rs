use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use hmac::{Hmac, Mac};
use reqwest::Client;
use serde_json::{json, Value};
use sha2::Sha256;
use tracing::{debug, warn};

use crate::adapter::{Adapter, AdapterSuccess, DeliveryContext};
use crate::error::DeliveryError;

type HmacSha256 = Hmac<Sha256>;

/// The generic webhook adapter (§4.5, §4.6) — the only kind this spec covers
/// in detail. Other kinds share the same [`Adapter`] contract but ship their
/// own wire shape.
pub struct WebhookAdapter {
    client: Client,
}

impl WebhookAdapter {
    pub fn new(timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(1))
            .build()
            .expect("reqwest client config is always valid");
        Self { client }
    }
}

#[async_trait]
impl Adapter for WebhookAdapter {
    fn kind(&self) -> &'static str {
        "webhook"
    }

    async fn dispatch(&self, ctx: &DeliveryContext) -> Result<AdapterSuccess, DeliveryError> {
        let url = ctx
            .automation
            .config
            .get("url")
            .and_then(Value::as_str)
            .ok_or_else(|| DeliveryError::AdapterPermanent("automation config missing 'url'".to_string()))?;

        let body = render_body(ctx)?;
        let body_str = serde_json::to_string(&body)
            .map_err(|e| DeliveryError::Internal(format!("body serialization: {e}")))?;

        let signature = sign(body_str.as_bytes(), ctx.automation.id.as_str());
        let timestamp_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis();

        let mut request = self
            .client
            .post(url)
            .header("Content-Type", "application/json")
            .header("X-GeoFence-Signature", signature)
            .header("X-GeoFence-Timestamp", timestamp_ms.to_string());

        if let Some(headers) = ctx.automation.config.get("headers").and_then(Value::as_object) {
            for (name, value) in headers {
                if let Some(value) = value.as_str() {
                    request = request.header(name.as_str(), value);
                }
            }
        }

        debug!(url, delivery_id = %ctx.delivery.id, "dispatching webhook");

        // Transport failures (timeout, connection refused, DNS) are always
        // retriable — treating a timeout as transient matches §7.
        let response = request
            .body(body_str)
            .send()
            .await
            .map_err(|e| DeliveryError::AdapterRetriable(format!("request error: {e}")))?;

        let status = response.status();
        let response_body: Value = response.json().await.unwrap_or(Value::Null);

        if status.is_success() {
            Ok(AdapterSuccess { response_snapshot: Some(response_body) })
        } else if status.as_u16() == 408 || status.as_u16() == 429 || status.is_server_error() {
            Err(DeliveryError::AdapterRetriable(format!("http {status}")))
        } else {
            warn!(delivery_id = %ctx.delivery.id, %status, "webhook rejected permanently");
            Err(DeliveryError::AdapterPermanent(format!("http {status}")))
        }
    }
}

fn sign(body: &[u8], automation_id: &str) -> String {
    let mut mac =
        HmacSha256::new_from_slice(automation_id.as_bytes()).expect("HMAC accepts any key length");
    mac.update(body);
    mac.finalize()
        .into_bytes()
        .iter()
        .map(|b| format!("{:02x}", b))
        .collect()
}

/// Builds the outgoing request body: either the user's rendered template
/// (which must parse as JSON) or a default envelope describing the event.
fn render_body(ctx: &DeliveryContext) -> Result<Value, DeliveryError> {
    match ctx.automation.config.get("body_template").and_then(Value::as_str) {
        Some(template) => {
            let rendered = resolve_template(template, ctx);
            serde_json::from_str(&rendered)
                .map_err(|e| DeliveryError::InvalidTemplate(format!("rendered body is not valid JSON: {e}")))
        }
        None => Ok(default_envelope(ctx)),
    }
}

fn default_envelope(ctx: &DeliveryContext) -> Value {
    json!({
        "device": ctx.device.name,
        "deviceId": ctx.device.id.as_str(),
        "geofence": ctx.zone.name,
        "geofenceId": ctx.zone.id.as_str(),
        "event": ctx.event.kind.to_string(),
        "timestamp": ctx.event.ts.to_rfc3339(),
        "dwellSeconds": ctx.event.dwell_seconds,
    })
}

/// Substitutes `{{device}}`, `{{geofence}}`, `{{event}}`, `{{timestamp}}`,
/// `{{deviceId}}`, `{{geofenceId}}`, `{{dwellSeconds}}` against `ctx`.
/// Generalized from the teacher's `{{ alias.key }}`-style resolver: a plain
/// string-scan-and-splice loop rather than a templating crate, matching the
/// teacher's reconciliation-input resolver in shape and restraint.
fn resolve_template(template: &str, ctx: &DeliveryContext) -> String {
    let mut result = template.to_string();
    let mut search_start = 0;
    loop {
        let Some(start) = result[search_start..].find("{{") else { break };
        let abs_start = search_start + start;
        let Some(end) = result[abs_start..].find("}}") else { break };
        let abs_end = abs_start + end + 2;

        let token = result[abs_start + 2..abs_end - 2].trim();
        let replacement = match token {
            "device" => Some(ctx.device.name.clone()),
            "deviceId" => Some(ctx.device.id.as_str().to_string()),
            "geofence" => Some(ctx.zone.name.clone()),
            "geofenceId" => Some(ctx.zone.id.as_str().to_string()),
            "event" => Some(ctx.event.kind.to_string()),
            "timestamp" => Some(ctx.event.ts.to_rfc3339()),
            "dwellSeconds" => Some(ctx.event.dwell_seconds.map(|s| s.to_string()).unwrap_or_default()),
            _ => None,
        };

        match replacement {
            Some(val) => {
                result = format!("{}{}{}", &result[..abs_start], val, &result[abs_end..]);
                search_start = abs_start + val.len();
            }
            None => {
                search_start = abs_end;
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use geofence_domain::{
        Automation, AutomationId, AutomationKind, Delivery, DeliveryId, DeliveryStatus, Device,
        DeviceId, Geometry, Point, RuleId, TenantId, TransitionEvent, TransitionEventId,
        TransitionKind, Zone, ZoneId,
    };
    use std::collections::BTreeMap;
    use wiremock::matchers::{header_exists, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ctx(config: BTreeMap<String, Value>) -> DeliveryContext {
        let tenant_id = TenantId::new("t1");
        let device = Device {
            id: DeviceId::new("d1"),
            tenant_id: tenant_id.clone(),
            name: "Truck 7".to_string(),
            device_key: "k".to_string(),
            is_paired: true,
            last_seen: None,
            last_position: None,
            attrs: BTreeMap::new(),
        };
        let zone = Zone {
            id: ZoneId::new("z1"),
            tenant_id: tenant_id.clone(),
            name: "Warehouse".to_string(),
            geometry: Geometry::Point { center: Point { lat: 0.0, lon: 0.0 } },
            active: true,
        };
        let event = TransitionEvent {
            id: TransitionEventId::new("e1"),
            tenant_id: tenant_id.clone(),
            device_id: device.id.clone(),
            zone_id: zone.id.clone(),
            kind: TransitionKind::Enter,
            ts: Utc::now(),
            dwell_seconds: None,
            event_hash: "abc".to_string(),
        };
        let automation = Automation {
            id: AutomationId::new("auto-1"),
            tenant_id: tenant_id.clone(),
            kind: AutomationKind::Webhook,
            config,
            enabled: true,
        };
        let delivery = Delivery {
            id: DeliveryId::new("del-1"),
            tenant_id,
            automation_id: automation.id.clone(),
            rule_id: RuleId::new("r1"),
            transition_event_id: event.id.clone(),
            status: DeliveryStatus::InFlight,
            attempt: 0,
            next_attempt_at: Utc::now(),
            last_error: None,
            response_snapshot: None,
        };
        DeliveryContext { delivery, automation, event, device, zone }
    }

    #[test]
    fn default_envelope_carries_event_fields() {
        let c = ctx(BTreeMap::new());
        let body = default_envelope(&c);
        assert_eq!(body["device"], json!("Truck 7"));
        assert_eq!(body["geofence"], json!("Warehouse"));
        assert_eq!(body["event"], json!("enter"));
    }

    #[test]
    fn template_substitutes_known_tokens() {
        let c = ctx(BTreeMap::new());
        let rendered = resolve_template(r#"{"who": "{{device}}", "what": "{{event}}"}"#, &c);
        let parsed: Value = serde_json::from_str(&rendered).unwrap();
        assert_eq!(parsed["who"], json!("Truck 7"));
        assert_eq!(parsed["what"], json!("enter"));
    }

    #[test]
    fn unknown_token_is_left_untouched() {
        let c = ctx(BTreeMap::new());
        let rendered = resolve_template("{{nonsense}}", &c);
        assert_eq!(rendered, "{{nonsense}}");
    }

    #[tokio::test]
    async fn dispatch_success_returns_response_snapshot() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .and(header_exists("X-GeoFence-Signature"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"ok": true})))
            .mount(&server)
            .await;

        let mut config = BTreeMap::new();
        config.insert("url".to_string(), json!(format!("{}/hook", server.uri())));
        let c = ctx(config);

        let adapter = WebhookAdapter::new(Duration::from_secs(5));
        let result = adapter.dispatch(&c).await.unwrap();
        assert_eq!(result.response_snapshot, Some(json!({"ok": true})));
    }

    #[tokio::test]
    async fn server_error_is_retriable() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let mut config = BTreeMap::new();
        config.insert("url".to_string(), json!(format!("{}/hook", server.uri())));
        let c = ctx(config);

        let adapter = WebhookAdapter::new(Duration::from_secs(5));
        let err = adapter.dispatch(&c).await.unwrap_err();
        assert!(err.is_retriable());
    }

    #[tokio::test]
    async fn client_error_is_permanent() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hook"))
            .respond_with(ResponseTemplate::new(400))
            .mount(&server)
            .await;

        let mut config = BTreeMap::new();
        config.insert("url".to_string(), json!(format!("{}/hook", server.uri())));
        let c = ctx(config);

        let adapter = WebhookAdapter::new(Duration::from_secs(5));
        let err = adapter.dispatch(&c).await.unwrap_err();
        assert!(!err.is_retriable());
    }
}
