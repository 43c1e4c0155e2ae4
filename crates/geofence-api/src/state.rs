use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use geofence_store::GeoStore;

#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn GeoStore>,
    /// `None` disables the bearer-auth middleware entirely (§9): operators
    /// running locally without a configured token get an open admin surface.
    pub auth_token: Option<Arc<String>>,
    pub metrics: ApiMetrics,
}

/// Gauges surfaced under `/health`'s `metrics` block (§6, §9): the summed
/// processor consumer lag across shards, and the delivery adapter kinds this
/// process has registered. Either may be left at its default in a process
/// that doesn't run that component (e.g. the standalone `delivery` binary
/// has no consumer lag to report).
#[derive(Clone, Default)]
pub struct ApiMetrics {
    pub consumer_lag: Arc<AtomicU64>,
    pub active_adapters: Vec<String>,
}

impl ApiMetrics {
    pub fn lag(&self) -> u64 {
        self.consumer_lag.load(Ordering::Relaxed)
    }
}
