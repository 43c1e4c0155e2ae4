use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use geofence_domain::{Delivery, DeliveryStatus, DlqEntry, DlqEntryId, DlqOrigin};
use geofence_store::GeoStore;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::adapter::DeliveryContext;
use crate::backoff::backoff;
use crate::error::DeliveryError;
use crate::registry::AdapterRegistry;

#[derive(Debug, Clone, Copy)]
pub struct WorkerConfig {
    pub concurrency: usize,
    pub poll_interval: Duration,
    pub claim_batch: u32,
    pub max_attempts: u32,
    pub backoff_base_ms: u64,
    pub backoff_cap_ms: u64,
}

/// C7: the webhook worker pool. Polls C6 (the store's ready-delivery queue)
/// on a fixed interval, claims a batch, and fans each claimed Delivery out
/// to its own task bounded by `concurrency` — the pool-size-limited
/// backpressure idiom §4.8 calls for, rather than one task per Delivery
/// unconditionally spawned.
pub async fn run_worker_pool(
    config: WorkerConfig,
    store: Arc<dyn GeoStore>,
    adapters: Arc<AdapterRegistry>,
    shutdown: CancellationToken,
) {
    let semaphore = Arc::new(tokio::sync::Semaphore::new(config.concurrency));
    let mut interval = tokio::time::interval(config.poll_interval);
    interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                info!("worker pool shutting down");
                break;
            }
            _ = interval.tick() => {
                let claimed = match store.claim_ready_deliveries(config.claim_batch, Utc::now()).await {
                    Ok(batch) => batch,
                    Err(e) => {
                        error!(error = %e, "failed to claim ready deliveries");
                        continue;
                    }
                };
                for delivery in claimed {
                    let permit = semaphore.clone().acquire_owned().await.expect("semaphore not closed");
                    let store = store.clone();
                    let adapters = adapters.clone();
                    tokio::spawn(async move {
                        let _permit = permit;
                        process_delivery(delivery, store, adapters, config).await;
                    });
                }
            }
        }
    }
}

/// One delivery attempt end to end: enrich, dispatch, and apply the
/// retry/dead/success state transition (§4.5 steps 2-4).
async fn process_delivery(
    mut delivery: Delivery,
    store: Arc<dyn GeoStore>,
    adapters: Arc<AdapterRegistry>,
    config: WorkerConfig,
) {
    let delivery_id = delivery.id.clone();
    match enrich(&delivery, store.as_ref()).await {
        Ok(ctx) => {
            let outcome = dispatch(&ctx, adapters.as_ref()).await;
            apply_outcome(&mut delivery, outcome, store.as_ref(), config).await;
        }
        Err(e) => {
            warn!(delivery_id = %delivery_id, error = %e, "failed to enrich delivery, marking dead");
            mark_dead(&mut delivery, e.to_string(), store.as_ref()).await;
        }
    }
}

async fn enrich(delivery: &Delivery, store: &dyn GeoStore) -> Result<DeliveryContext, DeliveryError> {
    let automation = store
        .get_automation(&delivery.automation_id)
        .await?
        .ok_or_else(|| DeliveryError::Internal(format!("automation {} missing", delivery.automation_id)))?;
    let event = store
        .get_transition_event(&delivery.transition_event_id)
        .await?
        .ok_or_else(|| {
            DeliveryError::Internal(format!("transition event {} missing", delivery.transition_event_id))
        })?;
    let device = store
        .get_device(&event.device_id)
        .await?
        .ok_or_else(|| DeliveryError::Internal(format!("device {} missing", event.device_id)))?;
    let zone = store
        .get_zone(&event.zone_id)
        .await?
        .ok_or_else(|| DeliveryError::Internal(format!("zone {} missing", event.zone_id)))?;

    Ok(DeliveryContext { delivery: delivery.clone(), automation, event, device, zone })
}

async fn dispatch(
    ctx: &DeliveryContext,
    adapters: &AdapterRegistry,
) -> Result<serde_json::Value, DeliveryError> {
    let adapter = adapters.for_kind(&ctx.automation.kind)?;
    let success = adapter.dispatch(ctx).await?;
    Ok(success.response_snapshot.unwrap_or(serde_json::Value::Null))
}

/// Applies §4.5 steps 4a-4c: success is terminal, a retriable failure
/// reschedules with backoff until `max_attempts` is exhausted, everything
/// else (including exhaustion) is a permanent failure routed to the DLQ.
async fn apply_outcome(
    delivery: &mut Delivery,
    outcome: Result<serde_json::Value, DeliveryError>,
    store: &dyn GeoStore,
    config: WorkerConfig,
) {
    match outcome {
        Ok(response) => {
            delivery.status = DeliveryStatus::Success;
            delivery.response_snapshot = Some(response);
            delivery.last_error = None;
            if let Err(e) = store.update_delivery(delivery).await {
                error!(delivery_id = %delivery.id, error = %e, "failed to persist successful delivery");
            }
        }
        Err(e) if e.is_retriable() => {
            delivery.attempt += 1;
            delivery.last_error = Some(e.to_string());
            if delivery.attempt < config.max_attempts {
                delivery.status = DeliveryStatus::Pending;
                let delay = backoff(delivery.attempt, config.backoff_base_ms, config.backoff_cap_ms);
                delivery.next_attempt_at = Utc::now() + chrono::Duration::from_std(delay).unwrap_or_default();
                if let Err(store_err) = store.update_delivery(delivery).await {
                    error!(delivery_id = %delivery.id, error = %store_err, "failed to persist retry");
                }
            } else {
                mark_dead(delivery, e.to_string(), store).await;
            }
        }
        Err(e) => {
            mark_dead(delivery, e.to_string(), store).await;
        }
    }
}

async fn mark_dead(delivery: &mut Delivery, error: String, store: &dyn GeoStore) {
    delivery.status = DeliveryStatus::Dead;
    delivery.last_error = Some(error.clone());
    if let Err(e) = store.update_delivery(delivery).await {
        error!(delivery_id = %delivery.id, error = %e, "failed to persist dead delivery");
    }
    let entry = DlqEntry {
        id: DlqEntryId::generate(),
        tenant_id: Some(delivery.tenant_id.clone()),
        origin: DlqOrigin::Delivery,
        reference: serde_json::json!({ "delivery_id": delivery.id.as_str() }),
        error,
        created_at: Utc::now(),
        replayed: false,
    };
    if let Err(e) = store.insert_dlq_entry(&entry).await {
        error!(delivery_id = %delivery.id, error = %e, "failed to write DLQ entry for dead delivery");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::{Adapter, AdapterSuccess};
    use crate::registry::AdapterRegistry;
    use async_trait::async_trait;
    use geofence_domain::{
        Automation, AutomationId, AutomationKind, Device, DeviceId, DeliveryId, Geometry, Point,
        RuleId, TenantId, TransitionEvent, TransitionEventId, TransitionKind, Zone, ZoneId,
    };
    use geofence_store::InMemoryStore;
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyAdapter {
        calls: AtomicUsize,
        fail_until: usize,
    }

    #[async_trait]
    impl Adapter for FlakyAdapter {
        fn kind(&self) -> &'static str {
            "webhook"
        }

        async fn dispatch(&self, _ctx: &DeliveryContext) -> Result<AdapterSuccess, DeliveryError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            if n < self.fail_until {
                Err(DeliveryError::AdapterRetriable("not yet".to_string()))
            } else {
                Ok(AdapterSuccess { response_snapshot: Some(serde_json::json!({"ok": true})) })
            }
        }
    }

    struct AlwaysPermanent;

    #[async_trait]
    impl Adapter for AlwaysPermanent {
        fn kind(&self) -> &'static str {
            "webhook"
        }

        async fn dispatch(&self, _ctx: &DeliveryContext) -> Result<AdapterSuccess, DeliveryError> {
            Err(DeliveryError::AdapterPermanent("nope".to_string()))
        }
    }

    async fn seed(store: &InMemoryStore) -> Delivery {
        let tenant_id = TenantId::new("t1");
        let device_id = DeviceId::new("d1");
        let zone_id = ZoneId::new("z1");
        let automation_id = AutomationId::new("auto-1");
        let event_id = TransitionEventId::new("e1");

        store
            .seed_device(Device {
                id: device_id.clone(),
                tenant_id: tenant_id.clone(),
                name: "Truck 7".to_string(),
                device_key: "k".to_string(),
                is_paired: true,
                last_seen: None,
                last_position: None,
                attrs: BTreeMap::new(),
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
                id: automation_id.clone(),
                tenant_id: tenant_id.clone(),
                kind: AutomationKind::Webhook,
                config: BTreeMap::new(),
                enabled: true,
            })
            .await;
        let event = TransitionEvent {
            id: event_id.clone(),
            tenant_id: tenant_id.clone(),
            device_id,
            zone_id,
            kind: TransitionKind::Enter,
            ts: Utc::now(),
            dwell_seconds: None,
            event_hash: "h".to_string(),
        };
        store.insert_transition_event_if_new(&event).await.unwrap();

        let delivery = Delivery {
            id: DeliveryId::generate(),
            tenant_id,
            automation_id,
            rule_id: RuleId::new("r1"),
            transition_event_id: event_id,
            status: DeliveryStatus::InFlight,
            attempt: 0,
            next_attempt_at: Utc::now(),
            last_error: None,
            response_snapshot: None,
        };
        store.create_delivery(&delivery).await.unwrap();
        delivery
    }

    fn default_config() -> WorkerConfig {
        WorkerConfig {
            concurrency: 4,
            poll_interval: Duration::from_millis(10),
            claim_batch: 10,
            max_attempts: 3,
            backoff_base_ms: 1,
            backoff_cap_ms: 10,
        }
    }

    #[tokio::test]
    async fn retry_then_success_ends_with_success_status() {
        let store = InMemoryStore::new();
        let delivery = seed(&store).await;
        let mut registry = AdapterRegistry::new();
        registry.register(
            "webhook",
            Arc::new(FlakyAdapter { calls: AtomicUsize::new(0), fail_until: 1 }),
        );

        process_delivery(delivery.clone(), Arc::new(store.clone()), Arc::new(registry), default_config())
            .await;
        // first attempt fails retriable, leaves Pending with attempt=1.
        let after_first = store.get_delivery(&delivery.id).await.unwrap().unwrap();
        assert_eq!(after_first.status, DeliveryStatus::Pending);
        assert_eq!(after_first.attempt, 1);
    }

    #[tokio::test]
    async fn permanent_failure_marks_dead_and_writes_dlq() {
        let store = InMemoryStore::new();
        let delivery = seed(&store).await;
        let mut registry = AdapterRegistry::new();
        registry.register("webhook", Arc::new(AlwaysPermanent));

        process_delivery(delivery.clone(), Arc::new(store.clone()), Arc::new(registry), default_config())
            .await;

        let after = store.get_delivery(&delivery.id).await.unwrap().unwrap();
        assert_eq!(after.status, DeliveryStatus::Dead);

        let dlq = store.list_dlq(Some(DlqOrigin::Delivery), 10).await.unwrap();
        assert_eq!(dlq.len(), 1);
    }

    #[tokio::test]
    async fn exhausted_retries_marks_dead() {
        let store = InMemoryStore::new();
        let mut delivery = seed(&store).await;
        delivery.attempt = 2;
        store.update_delivery(&delivery).await.unwrap();

        let mut registry = AdapterRegistry::new();
        registry.register(
            "webhook",
            Arc::new(FlakyAdapter { calls: AtomicUsize::new(0), fail_until: usize::MAX }),
        );

        let mut config = default_config();
        config.max_attempts = 3;
        process_delivery(delivery.clone(), Arc::new(store.clone()), Arc::new(registry), config).await;

        let after = store.get_delivery(&delivery.id).await.unwrap().unwrap();
        assert_eq!(after.status, DeliveryStatus::Dead);
    }
}
