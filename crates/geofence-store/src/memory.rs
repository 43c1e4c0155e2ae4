use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use geofence_domain::{
    Automation, AutomationId, Delivery, DeliveryId, DeliveryStatus, Device, DeviceId, DlqEntry,
    DlqEntryId, DlqOrigin, DwellTracker, Point, Rule, TenantId, TransitionEvent, TransitionEventId,
    TransitionKind, Zone, ZoneId, ZoneMembershipState,
};
use tokio::sync::RwLock;

use crate::error::StoreError;
use crate::store::{GeoStore, ZoneStateStore};

#[derive(Debug, Default)]
struct Inner {
    devices: HashMap<DeviceId, Device>,
    zones: HashMap<ZoneId, Zone>,
    rules: HashMap<ZoneId, Vec<Rule>>,
    automations: HashMap<AutomationId, Automation>,
    transition_hashes: std::collections::HashSet<(TenantId, String)>,
    transition_events: HashMap<TransitionEventId, TransitionEvent>,
    deliveries: HashMap<DeliveryId, Delivery>,
    dlq: HashMap<DlqEntryId, DlqEntry>,
}

/// In-memory implementation of [`GeoStore`] and [`ZoneStateStore`].
///
/// All data is lost on process exit. Suitable for tests and single-process
/// local development.
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<RwLock<Inner>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Test/seed helper: direct insert bypassing the admin REST surface (out
    /// of scope here, see §1).
    pub async fn seed_device(&self, device: Device) {
        self.inner.write().await.devices.insert(device.id.clone(), device);
    }

    pub async fn seed_zone(&self, zone: Zone) {
        self.inner.write().await.zones.insert(zone.id.clone(), zone);
    }

    pub async fn seed_rule(&self, rule: Rule) {
        self.inner
            .write()
            .await
            .rules
            .entry(rule.zone_id.clone())
            .or_default()
            .push(rule);
    }

    pub async fn seed_automation(&self, automation: Automation) {
        self.inner
            .write()
            .await
            .automations
            .insert(automation.id.clone(), automation);
    }
}

#[async_trait]
impl GeoStore for InMemoryStore {
    async fn get_paired_device_by_key(
        &self,
        tenant_id: &TenantId,
        device_key: &str,
    ) -> Result<Option<Device>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard
            .devices
            .values()
            .find(|d| d.tenant_id == *tenant_id && d.device_key == device_key && d.is_paired)
            .cloned())
    }

    async fn get_device(&self, id: &DeviceId) -> Result<Option<Device>, StoreError> {
        Ok(self.inner.read().await.devices.get(id).cloned())
    }

    async fn get_zone(&self, id: &ZoneId) -> Result<Option<Zone>, StoreError> {
        Ok(self.inner.read().await.zones.get(id).cloned())
    }

    async fn touch_device_last_seen(
        &self,
        id: &DeviceId,
        ts: DateTime<Utc>,
        position: Point,
    ) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        if let Some(device) = guard.devices.get_mut(id) {
            device.last_seen = Some(ts);
            device.last_position = Some(position);
        }
        Ok(())
    }

    async fn list_active_zones_near(
        &self,
        tenant_id: &TenantId,
        point: Point,
        radius_m: f64,
    ) -> Result<Vec<Zone>, StoreError> {
        let guard = self.inner.read().await;
        Ok(guard
            .zones
            .values()
            .filter(|z| {
                z.tenant_id == *tenant_id
                    && z.active
                    && geofence_geo::within_bbox(z.geometry.rough_center(), point, radius_m)
            })
            .cloned()
            .collect())
    }

    async fn insert_transition_event_if_new(
        &self,
        event: &TransitionEvent,
    ) -> Result<bool, StoreError> {
        let mut guard = self.inner.write().await;
        let key = (event.tenant_id.clone(), event.event_hash.clone());
        if guard.transition_hashes.contains(&key) {
            return Ok(false);
        }
        guard.transition_hashes.insert(key);
        guard.transition_events.insert(event.id.clone(), event.clone());
        Ok(true)
    }

    async fn get_transition_event(
        &self,
        id: &TransitionEventId,
    ) -> Result<Option<TransitionEvent>, StoreError> {
        Ok(self.inner.read().await.transition_events.get(id).cloned())
    }

    async fn list_matching_rules(
        &self,
        tenant_id: &TenantId,
        zone_id: &ZoneId,
        event_kind: TransitionKind,
        device_id: &DeviceId,
        dwell_seconds: Option<i64>,
    ) -> Result<Vec<Rule>, StoreError> {
        let guard = self.inner.read().await;
        let candidates = guard.rules.get(zone_id).cloned().unwrap_or_default();
        let mut matching = Vec::new();
        for rule in candidates {
            if rule.tenant_id != *tenant_id || !rule.enabled {
                continue;
            }
            if !rule.matches_event_kind(event_kind) {
                continue;
            }
            if !rule.matches_device(device_id) {
                continue;
            }
            if !rule.matches_dwell(dwell_seconds) {
                continue;
            }
            let automation_enabled = guard
                .automations
                .get(&rule.automation_id)
                .map(|a| a.enabled)
                .unwrap_or(false);
            if !automation_enabled {
                continue;
            }
            matching.push(rule);
        }
        Ok(matching)
    }

    async fn get_automation(&self, id: &AutomationId) -> Result<Option<Automation>, StoreError> {
        Ok(self.inner.read().await.automations.get(id).cloned())
    }

    async fn create_delivery(&self, delivery: &Delivery) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .deliveries
            .insert(delivery.id.clone(), delivery.clone());
        Ok(())
    }

    async fn claim_ready_deliveries(
        &self,
        limit: u32,
        now: DateTime<Utc>,
    ) -> Result<Vec<Delivery>, StoreError> {
        let mut guard = self.inner.write().await;
        let ready_ids: Vec<DeliveryId> = guard
            .deliveries
            .values()
            .filter(|d| d.status == DeliveryStatus::Pending && d.next_attempt_at <= now)
            .take(limit as usize)
            .map(|d| d.id.clone())
            .collect();
        let mut claimed = Vec::new();
        for id in ready_ids {
            if let Some(d) = guard.deliveries.get_mut(&id) {
                d.status = DeliveryStatus::InFlight;
                claimed.push(d.clone());
            }
        }
        Ok(claimed)
    }

    async fn get_delivery(&self, id: &DeliveryId) -> Result<Option<Delivery>, StoreError> {
        Ok(self.inner.read().await.deliveries.get(id).cloned())
    }

    async fn update_delivery(&self, delivery: &Delivery) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .deliveries
            .insert(delivery.id.clone(), delivery.clone());
        Ok(())
    }

    async fn insert_dlq_entry(&self, entry: &DlqEntry) -> Result<(), StoreError> {
        self.inner.write().await.dlq.insert(entry.id.clone(), entry.clone());
        Ok(())
    }

    async fn get_dlq_entry(&self, id: &DlqEntryId) -> Result<Option<DlqEntry>, StoreError> {
        Ok(self.inner.read().await.dlq.get(id).cloned())
    }

    async fn mark_dlq_replayed(&self, id: &DlqEntryId) -> Result<(), StoreError> {
        let mut guard = self.inner.write().await;
        let entry = guard
            .dlq
            .get_mut(id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        entry.replayed = true;
        Ok(())
    }

    async fn list_dlq(
        &self,
        origin: Option<DlqOrigin>,
        limit: u32,
    ) -> Result<Vec<DlqEntry>, StoreError> {
        let guard = self.inner.read().await;
        let mut entries: Vec<DlqEntry> = guard
            .dlq
            .values()
            .filter(|e| origin.map_or(true, |o| e.origin == o))
            .cloned()
            .collect();
        entries.sort_by_key(|e| e.created_at);
        entries.truncate(limit as usize);
        Ok(entries)
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        Ok(())
    }
}

#[derive(Debug, Default)]
struct ZoneStateInner {
    memberships: HashMap<DeviceId, ZoneMembershipState>,
    dwell_trackers: HashMap<DeviceId, BTreeMap<ZoneId, DwellTracker>>,
}

/// In-memory implementation of [`ZoneStateStore`], used in tests and as the
/// default when no redb path is configured.
#[derive(Debug, Clone, Default)]
pub struct InMemoryZoneStateStore {
    inner: Arc<RwLock<ZoneStateInner>>,
}

impl InMemoryZoneStateStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ZoneStateStore for InMemoryZoneStateStore {
    async fn load_membership(
        &self,
        device_id: &DeviceId,
    ) -> Result<Option<ZoneMembershipState>, StoreError> {
        Ok(self.inner.read().await.memberships.get(device_id).cloned())
    }

    async fn save_membership(
        &self,
        device_id: &DeviceId,
        state: &ZoneMembershipState,
    ) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .memberships
            .insert(device_id.clone(), state.clone());
        Ok(())
    }

    async fn load_dwell_trackers(
        &self,
        device_id: &DeviceId,
    ) -> Result<BTreeMap<ZoneId, DwellTracker>, StoreError> {
        Ok(self
            .inner
            .read()
            .await
            .dwell_trackers
            .get(device_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn save_dwell_trackers(
        &self,
        device_id: &DeviceId,
        trackers: &BTreeMap<ZoneId, DwellTracker>,
    ) -> Result<(), StoreError> {
        self.inner
            .write()
            .await
            .dwell_trackers
            .insert(device_id.clone(), trackers.clone());
        Ok(())
    }
}
