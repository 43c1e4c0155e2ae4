use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use geofence_api::state::ApiMetrics;
use geofence_config::Config;
use geofence_delivery::{
    replay_dlq_entry, run_matcher_consumer, run_worker_pool, AdapterRegistry, WebhookAdapter,
    WorkerConfig,
};
use geofence_domain::{DlqEntryId, RawFix, ShardedStream, TransitionEvent};
use geofence_ingest::{run_subscriber, SubscriberConfig};
use geofence_processor::{run_partition_consumer, ProcessorConfig, ShardLag};
use geofence_store::{GeoStore, InMemoryStore, PostgresStore, RedbZoneStateStore, ZoneStateStore};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::output;

/// Partitioning of the internal sharded streams (§4.2). A handful of shards
/// is plenty for a single-process deployment — each shard gets its own
/// consumer task, and per-device ordering only needs *a* stable shard, not a
/// particular count of them.
const SHARD_COUNT: usize = 8;
const STREAM_BUFFER: usize = 1024;
const DELIVERY_POLL_INTERVAL: Duration = Duration::from_secs(2);
const LAG_REFRESH_INTERVAL: Duration = Duration::from_secs(5);

/// Runs C1 (ingest) → C3 (processor) → C5 (rule matcher) in-process, and
/// optionally C7 (the webhook worker pool) alongside them. There is no
/// external fix bus to hand `ingest`/`processor` off to independently yet
/// (§4.1's "Transport binding" note), so both subcommands wire the identical
/// pipeline; `all-in-one` is the same pipeline with delivery folded in.
pub async fn run_pipeline(config: Config, include_delivery: bool) -> Result<()> {
    let store = build_store(&config).await?;
    let zone_state = build_zone_state_store(&config)?;
    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    let (raw_fix_stream, raw_fix_receivers) =
        ShardedStream::<RawFix>::new(SHARD_COUNT, STREAM_BUFFER);
    let (transition_stream, transition_receivers) =
        ShardedStream::<TransitionEvent>::new(SHARD_COUNT, STREAM_BUFFER);

    let mut handles = Vec::new();
    let shard_lags: Vec<Arc<ShardLag>> =
        (0..SHARD_COUNT).map(|_| Arc::new(ShardLag::default())).collect();

    let metrics = ApiMetrics::default();
    spawn_lag_aggregator(shard_lags.clone(), metrics.consumer_lag.clone(), shutdown.clone());
    handles.push(spawn_admin_api(&config, store.clone(), metrics, shutdown.clone()));

    {
        let sub_config = SubscriberConfig {
            broker_url: config.broker_url.clone(),
            device_key_cache_ttl: Duration::from_secs(config.device_key_cache_ttl_s),
        };
        let store = store.clone();
        let outgoing = raw_fix_stream.clone();
        let shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move {
            run_subscriber(sub_config, outgoing, store, shutdown).await;
        }));
    }

    let processor_config = ProcessorConfig::from(&config);
    for (receiver, lag) in raw_fix_receivers.into_iter().zip(shard_lags.iter().cloned()) {
        let outgoing = transition_stream.clone();
        let geo_store = store.clone();
        let zone_state = zone_state.clone();
        let shutdown = shutdown.clone();
        let processor_config = processor_config.clone();
        handles.push(tokio::spawn(async move {
            run_partition_consumer(
                receiver,
                outgoing,
                geo_store,
                zone_state,
                processor_config,
                lag,
                shutdown,
            )
            .await;
        }));
    }
    drop(transition_stream);

    for receiver in transition_receivers {
        let store = store.clone();
        let shutdown = shutdown.clone();
        handles.push(tokio::spawn(async move {
            run_matcher_consumer(receiver, store, shutdown).await;
        }));
    }

    if include_delivery {
        handles.push(spawn_worker_pool(&config, store.clone(), shutdown.clone()));
    }

    for handle in handles {
        let _ = handle.await;
    }
    Ok(())
}

/// Runs only C7 (the webhook worker pool), polling the durable delivery
/// queue. Independent of the other stages — safe to scale horizontally
/// against one shared Postgres without touching ingest/processor at all.
pub async fn run_delivery(config: Config) -> Result<()> {
    let store = build_store(&config).await?;
    let shutdown = CancellationToken::new();
    spawn_signal_handler(shutdown.clone());

    let registry = build_adapter_registry(&config);
    let metrics = ApiMetrics { active_adapters: registry.active_kinds(), ..ApiMetrics::default() };

    let admin = spawn_admin_api(&config, store.clone(), metrics, shutdown.clone());
    let worker = spawn_worker_pool(&config, store, shutdown);

    let _ = tokio::join!(admin, worker);
    Ok(())
}

pub async fn dlq_replay(config: Config, id: String) -> Result<()> {
    let store = build_store(&config).await?;
    let entry_id = DlqEntryId::new(id);
    let replacement = replay_dlq_entry(store.as_ref(), &entry_id).await?;
    println!("replayed as delivery {}", replacement.id);
    Ok(())
}

pub async fn dlq_list(config: Config, origin: Option<String>, limit: u32) -> Result<()> {
    let store = build_store(&config).await?;
    let origin = match origin.as_deref() {
        None => None,
        Some("ingest") => Some(geofence_domain::DlqOrigin::Ingest),
        Some("delivery") => Some(geofence_domain::DlqOrigin::Delivery),
        Some(other) => anyhow::bail!("unknown origin '{other}', expected 'ingest' or 'delivery'"),
    };
    let entries = store.list_dlq(origin, limit).await?;
    if entries.is_empty() {
        println!("no DLQ entries");
        return Ok(());
    }
    for entry in &entries {
        println!("{}", output::render_dlq_entry(entry));
    }
    Ok(())
}

fn spawn_worker_pool(
    config: &Config,
    store: Arc<dyn GeoStore>,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let registry = Arc::new(build_adapter_registry(config));
    let worker_config = WorkerConfig {
        concurrency: config.worker_concurrency,
        poll_interval: DELIVERY_POLL_INTERVAL,
        claim_batch: config.worker_concurrency as u32,
        max_attempts: config.delivery_max_attempts,
        backoff_base_ms: config.delivery_backoff_base_ms,
        backoff_cap_ms: config.delivery_backoff_cap_ms,
    };
    tokio::spawn(async move {
        info!(concurrency = worker_config.concurrency, "starting webhook worker pool");
        run_worker_pool(worker_config, store, registry, shutdown).await;
    })
}

fn spawn_admin_api(
    config: &Config,
    store: Arc<dyn GeoStore>,
    metrics: ApiMetrics,
    shutdown: CancellationToken,
) -> tokio::task::JoinHandle<()> {
    let bind_addr = config.api_bind_addr.clone();
    let auth_token = config.api_auth_token.clone().map(Arc::new);
    tokio::spawn(async move {
        let app = geofence_api::build_app(store, auth_token, metrics);
        let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                tracing::error!(error = %e, addr = %bind_addr, "failed to bind admin API");
                return;
            }
        };
        info!(addr = %bind_addr, "admin API listening");
        let serve = axum::serve(listener, app).with_graceful_shutdown(async move {
            shutdown.cancelled().await;
        });
        if let Err(e) = serve.await {
            tracing::error!(error = %e, "admin API server error");
        }
    })
}

/// Sums the processor's per-shard backlog counters into the single gauge the
/// admin API reports, on a short poll — cheaper than threading a shared
/// counter through every consumer task.
fn spawn_lag_aggregator(
    shard_lags: Vec<Arc<ShardLag>>,
    target: Arc<AtomicU64>,
    shutdown: CancellationToken,
) {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(LAG_REFRESH_INTERVAL);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = interval.tick() => {
                    let total: u64 = shard_lags.iter().map(|l| l.get()).sum();
                    target.store(total, Ordering::Relaxed);
                }
            }
        }
    });
}

async fn build_store(config: &Config) -> Result<Arc<dyn GeoStore>> {
    match &config.database_url {
        Some(url) => {
            let store = PostgresStore::connect(url).await.context("connecting to Postgres")?;
            Ok(Arc::new(store))
        }
        None => {
            info!("DATABASE_URL not set, using in-memory store");
            Ok(Arc::new(InMemoryStore::new()))
        }
    }
}

fn build_zone_state_store(config: &Config) -> Result<Arc<dyn ZoneStateStore>> {
    let path = std::path::Path::new(&config.redb_path);
    let store = RedbZoneStateStore::open(path)
        .with_context(|| format!("opening redb zone-state store at {}", path.display()))?;
    Ok(Arc::new(store))
}

fn build_adapter_registry(config: &Config) -> AdapterRegistry {
    let mut registry = AdapterRegistry::new();
    let timeout = Duration::from_millis(config.webhook_timeout_ms);
    registry.register("webhook", Arc::new(WebhookAdapter::new(timeout)));
    registry
}

/// Races SIGINT/SIGTERM against each other and cancels `shutdown` on
/// whichever fires first (§6/§9's "graceful shutdown" requirement).
fn spawn_signal_handler(shutdown: CancellationToken) {
    tokio::spawn(async move {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            let mut sigterm = signal(SignalKind::terminate()).expect("installing SIGTERM handler");
            tokio::select! {
                _ = tokio::signal::ctrl_c() => {}
                _ = sigterm.recv() => {}
            }
        }
        #[cfg(not(unix))]
        {
            let _ = tokio::signal::ctrl_c().await;
        }
        info!("shutdown signal received, winding down");
        shutdown.cancel();
    });
}
