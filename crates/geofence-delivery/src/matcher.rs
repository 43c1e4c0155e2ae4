use std::sync::Arc;

use chrono::Utc;
use geofence_domain::{Delivery, DeliveryId, DeliveryStatus, ShardedReceiver, TransitionEvent};
use geofence_store::GeoStore;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::error::DeliveryError;

/// Drains one shard of the transition stream (C4), matching each event
/// against tenant rules and creating Delivery rows (C5). Same `tokio::select!`
/// shutdown-race shape as the processor's partition consumer; kept in this
/// crate because matching is purely a store operation with no geometry
/// dependency.
pub async fn run_matcher_consumer(
    mut receiver: ShardedReceiver<TransitionEvent>,
    store: Arc<dyn GeoStore>,
    shutdown: CancellationToken,
) {
    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            event = receiver.rx.recv() => {
                let Some(event) = event else { break };
                if let Err(e) = match_event(&event, store.as_ref()).await {
                    error!(transition_event_id = %event.id, error = %e, "rule matching failed");
                }
            }
        }
    }
}

/// C5: joins a TransitionEvent with its tenant's enabled Rules and creates a
/// Delivery row per surviving match (§4.4). `list_matching_rules` already
/// filters by tenant, zone, device, event kind, dwell threshold and
/// automation-enabled state server-side; only `device_filter` is left for
/// this function to apply, since it depends on the device's free-form attrs.
pub async fn match_event(
    event: &TransitionEvent,
    store: &dyn GeoStore,
) -> Result<Vec<Delivery>, DeliveryError> {
    let Some(device) = store.get_device(&event.device_id).await? else {
        warn!(device_id = %event.device_id, "device vanished before rule matching, skipping event");
        return Ok(Vec::new());
    };

    let rules = store
        .list_matching_rules(
            &event.tenant_id,
            &event.zone_id,
            event.kind,
            &event.device_id,
            event.dwell_seconds,
        )
        .await?;

    let mut created = Vec::with_capacity(rules.len());
    for rule in rules {
        if !rule.matches_device_filter(&device.attrs) {
            continue;
        }
        let delivery = Delivery {
            id: DeliveryId::generate(),
            tenant_id: event.tenant_id.clone(),
            automation_id: rule.automation_id.clone(),
            rule_id: rule.id.clone(),
            transition_event_id: event.id.clone(),
            status: DeliveryStatus::Pending,
            attempt: 0,
            next_attempt_at: Utc::now(),
            last_error: None,
            response_snapshot: None,
        };
        store.create_delivery(&delivery).await?;
        created.push(delivery);
    }
    Ok(created)
}

#[cfg(test)]
mod tests {
    use super::*;
    use geofence_domain::{
        Automation, AutomationId, AutomationKind, Device, DeviceId, Geometry, Point, Rule, RuleId,
        TenantId, TransitionEventId, TransitionKind, Zone, ZoneId,
    };
    use geofence_store::InMemoryStore;
    use std::collections::BTreeMap;

    async fn seeded_store() -> (InMemoryStore, TenantId, DeviceId, ZoneId) {
        let store = InMemoryStore::new();
        let tenant_id = TenantId::new("t1");
        let zone_id = ZoneId::new("z1");
        let device_id = DeviceId::new("d1");

        let mut attrs = BTreeMap::new();
        attrs.insert("tier".to_string(), serde_json::json!("gold"));
        store
            .seed_device(Device {
                id: device_id.clone(),
                tenant_id: tenant_id.clone(),
                name: "Truck 7".to_string(),
                device_key: "k".to_string(),
                is_paired: true,
                last_seen: None,
                last_position: None,
                attrs,
            })
            .await;
        store
            .seed_zone(Zone {
                id: zone_id.clone(),
                tenant_id: tenant_id.clone(),
                name: "Warehouse".to_string(),
                geometry: Geometry::Point { center: Point { lat: 0.0, lon: 0.0 } },
                active: true,
            })
            .await;
        store
            .seed_automation(Automation {
                id: AutomationId::new("auto-1"),
                tenant_id: tenant_id.clone(),
                kind: AutomationKind::Webhook,
                config: BTreeMap::new(),
                enabled: true,
            })
            .await;
        (store, tenant_id, device_id, zone_id)
    }

    #[tokio::test]
    async fn creates_delivery_for_matching_rule() {
        let (store, tenant_id, device_id, zone_id) = seeded_store().await;
        store
            .seed_rule(Rule {
                id: RuleId::new("r1"),
                tenant_id: tenant_id.clone(),
                zone_id: zone_id.clone(),
                device_id: None,
                automation_id: AutomationId::new("auto-1"),
                on_events: vec![TransitionKind::Enter],
                min_dwell_seconds: 0,
                device_filter: BTreeMap::new(),
                enabled: true,
            })
            .await;

        let event = TransitionEvent {
            id: TransitionEventId::new("e1"),
            tenant_id,
            device_id,
            zone_id,
            kind: TransitionKind::Enter,
            ts: Utc::now(),
            dwell_seconds: None,
            event_hash: "abc".to_string(),
        };

        let created = match_event(&event, &store).await.unwrap();
        assert_eq!(created.len(), 1);
        assert_eq!(created[0].status, DeliveryStatus::Pending);
        assert_eq!(created[0].attempt, 0);
    }

    #[tokio::test]
    async fn device_filter_mismatch_skips_rule() {
        let (store, tenant_id, device_id, zone_id) = seeded_store().await;
        let mut device_filter = BTreeMap::new();
        device_filter.insert("tier".to_string(), serde_json::json!("silver"));
        store
            .seed_rule(Rule {
                id: RuleId::new("r1"),
                tenant_id: tenant_id.clone(),
                zone_id: zone_id.clone(),
                device_id: None,
                automation_id: AutomationId::new("auto-1"),
                on_events: vec![TransitionKind::Enter],
                min_dwell_seconds: 0,
                device_filter,
                enabled: true,
            })
            .await;

        let event = TransitionEvent {
            id: TransitionEventId::new("e1"),
            tenant_id,
            device_id,
            zone_id,
            kind: TransitionKind::Enter,
            ts: Utc::now(),
            dwell_seconds: None,
            event_hash: "abc".to_string(),
        };

        let created = match_event(&event, &store).await.unwrap();
        assert!(created.is_empty());
    }

    #[tokio::test]
    async fn missing_device_skips_without_error() {
        let (store, tenant_id, _device_id, zone_id) = seeded_store().await;
        let event = TransitionEvent {
            id: TransitionEventId::new("e1"),
            tenant_id,
            device_id: DeviceId::new("ghost"),
            zone_id,
            kind: TransitionKind::Enter,
            ts: Utc::now(),
            dwell_seconds: None,
            event_hash: "abc".to_string(),
        };
        let created = match_event(&event, &store).await.unwrap();
        assert!(created.is_empty());
    }
}
