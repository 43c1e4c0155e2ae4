use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use geofence_domain::{Device, TenantId};
use geofence_store::GeoStore;
use tokio::sync::RwLock;

use crate::error::IngestError;

struct CacheEntry {
    device: Device,
    inserted_at: Instant,
}

/// Process-local, TTL-evicting cache of `(tenant, device_key) -> Device`
/// resolutions (§4.1), the same `HashMap<K, Instant>` plus periodic-sweep
/// shape used elsewhere in the pack for liveness tracking.
pub struct DeviceKeyCache {
    ttl: Duration,
    entries: RwLock<HashMap<(TenantId, String), CacheEntry>>,
}

impl DeviceKeyCache {
    pub fn new(ttl: Duration) -> Self {
        Self { ttl, entries: RwLock::new(HashMap::new()) }
    }

    async fn get(&self, tenant_id: &TenantId, device_key: &str) -> Option<Device> {
        let guard = self.entries.read().await;
        let entry = guard.get(&(tenant_id.clone(), device_key.to_string()))?;
        if entry.inserted_at.elapsed() >= self.ttl {
            return None;
        }
        Some(entry.device.clone())
    }

    async fn insert(&self, tenant_id: TenantId, device_key: String, device: Device) {
        let mut guard = self.entries.write().await;
        guard.insert((tenant_id, device_key), CacheEntry { device, inserted_at: Instant::now() });
    }

    async fn invalidate(&self, tenant_id: &TenantId, device_key: &str) {
        self.entries.write().await.remove(&(tenant_id.clone(), device_key.to_string()));
    }

    /// Drops every entry past its TTL. Intended to be driven by a
    /// `tokio::time::interval` loop so the map doesn't grow unbounded between
    /// lookups of devices that stop publishing.
    pub async fn sweep(&self) {
        let mut guard = self.entries.write().await;
        guard.retain(|_, entry| entry.inserted_at.elapsed() < self.ttl);
    }

    #[cfg(test)]
    async fn len(&self) -> usize {
        self.entries.read().await.len()
    }
}

/// Resolves a device-key to its paired `Device`, consulting the cache before
/// falling back to the store (§4.1 step 3). On a negative result the cache is
/// proactively invalidated, so a device that just got paired isn't wedged
/// behind a stale miss-turned-hit from an earlier lookup.
pub async fn resolve_device(
    cache: &DeviceKeyCache,
    store: &Arc<dyn GeoStore>,
    tenant_id: &TenantId,
    device_key: &str,
) -> Result<Device, IngestError> {
    if let Some(device) = cache.get(tenant_id, device_key).await {
        return Ok(device);
    }

    match store.get_paired_device_by_key(tenant_id, device_key).await? {
        Some(device) => {
            cache.insert(tenant_id.clone(), device_key.to_string(), device.clone()).await;
            Ok(device)
        }
        None => {
            cache.invalidate(tenant_id, device_key).await;
            Err(IngestError::UnknownDevice)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use geofence_store::InMemoryStore;

    fn dummy_device(tenant: &str, key: &str, paired: bool) -> Device {
        Device {
            id: geofence_domain::DeviceId::generate(),
            tenant_id: TenantId::new(tenant),
            name: "d".into(),
            device_key: key.into(),
            is_paired: paired,
            last_seen: None,
            last_position: None,
            attrs: Default::default(),
        }
    }

    #[tokio::test]
    async fn caches_after_first_store_hit() {
        let store = InMemoryStore::new();
        store.seed_device(dummy_device("t1", "k", true)).await;
        let store: Arc<dyn GeoStore> = Arc::new(store);
        let cache = DeviceKeyCache::new(Duration::from_secs(300));

        resolve_device(&cache, &store, &TenantId::new("t1"), "k").await.unwrap();
        assert_eq!(cache.len().await, 1);

        // Second resolution is served from cache even without re-seeding.
        let device = resolve_device(&cache, &store, &TenantId::new("t1"), "k").await.unwrap();
        assert_eq!(device.device_key, "k");
    }

    #[tokio::test]
    async fn expired_entry_is_not_served_from_cache() {
        let store = InMemoryStore::new();
        store.seed_device(dummy_device("t1", "k", true)).await;
        let store: Arc<dyn GeoStore> = Arc::new(store);
        let cache = DeviceKeyCache::new(Duration::from_millis(1));

        resolve_device(&cache, &store, &TenantId::new("t1"), "k").await.unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert!(cache.get(&TenantId::new("t1"), "k").await.is_none());
    }

    #[tokio::test]
    async fn unknown_device_is_an_error_and_not_cached() {
        let store: Arc<dyn GeoStore> = Arc::new(InMemoryStore::new());
        let cache = DeviceKeyCache::new(Duration::from_secs(300));
        let err = resolve_device(&cache, &store, &TenantId::new("t1"), "nope").await.unwrap_err();
        assert!(matches!(err, IngestError::UnknownDevice));
        assert_eq!(cache.len().await, 0);
    }

    #[tokio::test]
    async fn sweep_drops_only_expired_entries() {
        let store = InMemoryStore::new();
        store.seed_device(dummy_device("t1", "fresh", true)).await;
        let store: Arc<dyn GeoStore> = Arc::new(store);
        let cache = DeviceKeyCache::new(Duration::from_millis(5));

        resolve_device(&cache, &store, &TenantId::new("t1"), "fresh").await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        cache.sweep().await;
        assert_eq!(cache.len().await, 0);
    }
}
