use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use geofence_domain::{RawFix, ShardedReceiver, ShardedStream, TransitionEvent};
use geofence_store::{GeoStore, ZoneStateStore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, instrument, warn};

use crate::processor::{process_fix, ProcessorConfig};
use crate::report::FixOutcome;

/// Per-shard counter of fixes received but not yet fully processed, exposed
/// so a health endpoint can report consumer lag the way the teacher's
/// reconcile loop exposes its queue depth.
#[derive(Default)]
pub struct ShardLag(AtomicU64);

impl ShardLag {
    pub fn get(&self) -> u64 {
        self.0.load(Ordering::Relaxed)
    }
}

/// Drains one shard of the raw-fix stream (C2), running every fix through
/// [`process_fix`] and republishing any resulting transitions onto the
/// outgoing transition stream (C4). Mirrors the teacher's `NatsPublisher::run`
/// shape: a `tokio::select!` loop that races shutdown against the next item,
/// keyed on a per-shard receiver instead of a broadcast channel because each
/// device's fixes must be processed in order on a single task.
#[instrument(skip_all, fields(shard = receiver.shard))]
pub async fn run_partition_consumer(
    mut receiver: ShardedReceiver<RawFix>,
    outgoing: ShardedStream<TransitionEvent>,
    geo_store: Arc<dyn GeoStore>,
    zone_state: Arc<dyn ZoneStateStore>,
    config: ProcessorConfig,
    lag: Arc<ShardLag>,
    shutdown: CancellationToken,
) {
    let shard = receiver.shard;
    debug!(shard, "partition consumer starting");

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => {
                debug!(shard, "partition consumer shutting down");
                break;
            }
            fix = receiver.rx.recv() => {
                let Some(fix) = fix else {
                    debug!(shard, "raw fix stream closed, consumer exiting");
                    break;
                };
                lag.0.fetch_add(1, Ordering::Relaxed);
                handle_fix(&fix, &outgoing, &geo_store, &zone_state, &config).await;
                lag.0.fetch_sub(1, Ordering::Relaxed);
            }
        }
    }
}

async fn handle_fix(
    fix: &RawFix,
    outgoing: &ShardedStream<TransitionEvent>,
    geo_store: &Arc<dyn GeoStore>,
    zone_state: &Arc<dyn ZoneStateStore>,
    config: &ProcessorConfig,
) {
    match process_fix(fix, geo_store, zone_state, config).await {
        Ok(FixOutcome::Processed { events, .. }) => {
            for event in events {
                if outgoing.send(&event.device_id, event.clone()).await.is_err() {
                    warn!(
                        device_id = %event.device_id,
                        "transition stream closed, dropping event"
                    );
                }
            }
        }
        Ok(FixOutcome::Suppressed) | Ok(FixOutcome::OutOfOrder) => {}
        Err(e) if e.is_skippable() => {
            warn!(device_id = %fix.device_id, error = %e, "skipping fix after geometry error");
        }
        Err(e) => {
            // Store errors are retriable in principle, but a single in-process
            // consumer has nowhere to redeliver a raw fix to once it has left
            // the channel; log loudly so an operator notices a persistently
            // failing store.
            error!(device_id = %fix.device_id, error = %e, "failed to process fix");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use geofence_domain::{DeviceId, Geometry, Point, TenantId, Zone, ZoneId};
    use geofence_store::{InMemoryStore, InMemoryZoneStateStore};

    fn cfg() -> ProcessorConfig {
        ProcessorConfig { hysteresis_ms: 20_000, dwell_thresholds_min: vec![5, 10] }
    }

    fn fix(center: Point) -> RawFix {
        RawFix {
            tenant_id: TenantId::new("t1"),
            device_id: DeviceId::new("dev-1"),
            ts: Utc::now(),
            position: center,
            speed_mps: None,
            accuracy_m: None,
            battery_pct: None,
            attrs: Default::default(),
        }
    }

    #[tokio::test]
    async fn consumes_fixes_and_republishes_transitions_until_shutdown() {
        let center = Point { lat: 37.7749, lon: -122.4194 };
        let zone = Zone {
            id: ZoneId::new("z1"),
            tenant_id: TenantId::new("t1"),
            name: "circle".into(),
            geometry: Geometry::Circle { center, radius_m: 100.0 },
            active: true,
        };
        let geo_store = InMemoryStore::new();
        geo_store.seed_zone(zone).await;
        let geo_store: Arc<dyn GeoStore> = Arc::new(geo_store);
        let zone_state: Arc<dyn ZoneStateStore> = Arc::new(InMemoryZoneStateStore::new());

        let (incoming, mut incoming_receivers) = ShardedStream::<RawFix>::new(1, 8);
        let (outgoing, mut outgoing_receivers) = ShardedStream::<TransitionEvent>::new(1, 8);
        let shutdown = CancellationToken::new();
        let lag = Arc::new(ShardLag::default());

        let handle = tokio::spawn(run_partition_consumer(
            incoming_receivers.remove(0),
            outgoing,
            geo_store,
            zone_state,
            cfg(),
            lag,
            shutdown.clone(),
        ));

        incoming.send(&DeviceId::new("dev-1"), fix(center)).await.unwrap();

        let mut out_rx = outgoing_receivers.remove(0).rx;
        let event = out_rx.recv().await.expect("expected a republished transition event");
        assert_eq!(event.zone_id, ZoneId::new("z1"));

        shutdown.cancel();
        handle.await.unwrap();
    }
}
