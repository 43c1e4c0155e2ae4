use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use geofence_domain::{DlqEntry, DlqEntryId, DlqOrigin, RawFix, ShardedStream};
use geofence_store::GeoStore;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

use crate::cache::DeviceKeyCache;
use crate::error::IngestError;
use crate::pipeline::process_message;
use crate::topic;

/// Tunables for the broker connection; everything else (device-key cache TTL
/// aside) is transport-default.
#[derive(Debug, Clone)]
pub struct SubscriberConfig {
    pub broker_url: String,
    pub device_key_cache_ttl: Duration,
}

/// Connects to the pub/sub transport and forwards authenticated fixes onto
/// the raw-fix stream (C2) until `shutdown` fires. Reconnects with capped
/// exponential backoff on connection loss — the same reconnect-loop shape the
/// pack's per-session upstream feed uses, generalized from one WebSocket
/// upstream to the wildcard subject subscription this pipeline needs.
pub async fn run(
    config: SubscriberConfig,
    outgoing: ShardedStream<RawFix>,
    store: Arc<dyn GeoStore>,
    shutdown: CancellationToken,
) {
    let cache = Arc::new(DeviceKeyCache::new(config.device_key_cache_ttl));
    spawn_cache_sweeper(cache.clone(), shutdown.clone());

    let mut backoff = Duration::from_millis(200);
    let max_backoff = Duration::from_secs(30);

    while !shutdown.is_cancelled() {
        match async_nats::connect(&config.broker_url).await {
            Ok(client) => {
                backoff = Duration::from_millis(200);
                if let Err(e) =
                    run_connected(&client, &outgoing, &store, &cache, &shutdown).await
                {
                    warn!(error = %e, "subscriber connection ended");
                }
            }
            Err(e) => {
                warn!(error = %e, broker = %config.broker_url, "failed to connect to broker");
            }
        }

        if shutdown.is_cancelled() {
            break;
        }

        tokio::select! {
            _ = shutdown.cancelled() => break,
            _ = tokio::time::sleep(backoff) => {}
        }
        backoff = (backoff * 2).min(max_backoff);
    }
}

async fn run_connected(
    client: &async_nats::Client,
    outgoing: &ShardedStream<RawFix>,
    store: &Arc<dyn GeoStore>,
    cache: &Arc<DeviceKeyCache>,
    shutdown: &CancellationToken,
) -> anyhow::Result<()> {
    let mut subscriptions = Vec::new();
    for subject in topic::wildcard_subjects() {
        subscriptions.push(client.subscribe(subject).await?);
    }
    let mut merged = futures_util::stream::select_all(subscriptions);

    loop {
        tokio::select! {
            _ = shutdown.cancelled() => break,
            message = merged.next() => {
                match message {
                    Some(msg) => handle_message(msg, outgoing, store, cache).await,
                    None => break,
                }
            }
        }
    }
    Ok(())
}

async fn handle_message(
    message: async_nats::Message,
    outgoing: &ShardedStream<RawFix>,
    store: &Arc<dyn GeoStore>,
    cache: &Arc<DeviceKeyCache>,
) {
    let subject = message.subject.to_string();
    match process_message(&subject, &message.payload, cache, store).await {
        Ok(fix) => {
            if outgoing.send(&fix.device_id, fix.clone()).await.is_err() {
                warn!(device_id = %fix.device_id, "raw fix stream closed, dropping fix");
            }
        }
        Err(e) if e.is_dlq_eligible() => {
            warn!(subject = %subject, error = %e, "routing unauthenticated/malformed fix to DLQ");
            write_dlq(store, &subject, &message.payload, &e).await;
        }
        Err(e) => {
            // Store errors: the broker already considers this message
            // delivered (core NATS has no application-level ack), so the only
            // recourse is to log loudly and move on to the next message.
            error!(subject = %subject, error = %e, "ingest lookup failed, dropping message");
        }
    }
}

async fn write_dlq(store: &Arc<dyn GeoStore>, subject: &str, payload: &[u8], error: &IngestError) {
    let entry = DlqEntry {
        id: DlqEntryId::generate(),
        tenant_id: None,
        origin: DlqOrigin::Ingest,
        reference: serde_json::json!({
            "subject": subject,
            "payload": String::from_utf8_lossy(payload),
        }),
        error: error.to_string(),
        created_at: chrono::Utc::now(),
        replayed: false,
    };
    if let Err(e) = store.insert_dlq_entry(&entry).await {
        error!(error = %e, "failed to write DLQ entry for ingest failure");
    }
}

fn spawn_cache_sweeper(cache: Arc<DeviceKeyCache>, shutdown: CancellationToken) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(Duration::from_secs(60));
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => cache.sweep().await,
            }
        }
    });
}
