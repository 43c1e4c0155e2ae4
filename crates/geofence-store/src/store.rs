use std::collections::BTreeMap;

use async_trait::async_trait;
use geofence_domain::{
    Automation, AutomationId, Delivery, DeliveryId, Device, DeviceId, DlqEntry, DlqEntryId,
    DlqOrigin, DwellTracker, Point, Rule, TenantId, TransitionEvent, TransitionEventId,
    TransitionKind, Zone, ZoneId, ZoneMembershipState,
};

use crate::error::StoreError;

/// The authoritative relational store (C9): Tenants/Devices/Zones/Rules/Automations,
/// plus the durable TransitionEvent/Delivery/DLQ tables C3/C5/C7 write to.
#[async_trait]
pub trait GeoStore: Send + Sync + 'static {
    async fn get_paired_device_by_key(
        &self,
        tenant_id: &TenantId,
        device_key: &str,
    ) -> Result<Option<Device>, StoreError>;

    async fn get_device(&self, id: &DeviceId) -> Result<Option<Device>, StoreError>;

    async fn get_zone(&self, id: &ZoneId) -> Result<Option<Zone>, StoreError>;

    async fn touch_device_last_seen(
        &self,
        id: &DeviceId,
        ts: chrono::DateTime<chrono::Utc>,
        position: Point,
    ) -> Result<(), StoreError>;

    /// Active zones in `tenant_id` whose rough center lies within `radius_m` of
    /// `point` (bounding-box prefilter only; precise containment is the caller's
    /// job, see `geofence_geo::contains`).
    async fn list_active_zones_near(
        &self,
        tenant_id: &TenantId,
        point: Point,
        radius_m: f64,
    ) -> Result<Vec<Zone>, StoreError>;

    /// Inserts a TransitionEvent iff `(tenant_id, event_hash)` is not already
    /// present. Returns `true` if a new row was inserted.
    async fn insert_transition_event_if_new(
        &self,
        event: &TransitionEvent,
    ) -> Result<bool, StoreError>;

    /// Fetches a previously-inserted TransitionEvent by ID, used by the
    /// delivery worker pool to enrich a claimed Delivery with the event that
    /// triggered it (§4.5 step 2).
    async fn get_transition_event(
        &self,
        id: &TransitionEventId,
    ) -> Result<Option<TransitionEvent>, StoreError>;

    async fn list_matching_rules(
        &self,
        tenant_id: &TenantId,
        zone_id: &ZoneId,
        event_kind: TransitionKind,
        device_id: &DeviceId,
        dwell_seconds: Option<i64>,
    ) -> Result<Vec<Rule>, StoreError>;

    async fn get_automation(&self, id: &AutomationId) -> Result<Option<Automation>, StoreError>;

    async fn create_delivery(&self, delivery: &Delivery) -> Result<(), StoreError>;

    /// Atomically claims up to `limit` pending, ready (`next_attempt_at <= now`)
    /// deliveries by moving them to `in_flight` and returning the updated rows.
    async fn claim_ready_deliveries(
        &self,
        limit: u32,
        now: chrono::DateTime<chrono::Utc>,
    ) -> Result<Vec<Delivery>, StoreError>;

    async fn get_delivery(&self, id: &DeliveryId) -> Result<Option<Delivery>, StoreError>;

    /// Persists a full mutation of a Delivery. Callers are responsible for
    /// respecting the terminal-status invariant (§3); stores do not enforce it.
    async fn update_delivery(&self, delivery: &Delivery) -> Result<(), StoreError>;

    async fn insert_dlq_entry(&self, entry: &DlqEntry) -> Result<(), StoreError>;

    async fn get_dlq_entry(&self, id: &DlqEntryId) -> Result<Option<DlqEntry>, StoreError>;

    async fn mark_dlq_replayed(&self, id: &DlqEntryId) -> Result<(), StoreError>;

    async fn list_dlq(
        &self,
        origin: Option<DlqOrigin>,
        limit: u32,
    ) -> Result<Vec<DlqEntry>, StoreError>;

    /// Cheap liveness probe for the `/health` endpoint — a `SELECT 1`-style
    /// round trip for a real backend, an infallible no-op for the in-memory one.
    async fn health_check(&self) -> Result<(), StoreError>;
}

/// The write-through per-device geofence state cache (§4.3, §4.8): fast reads
/// for the hot path, durable enough to reconstruct after a crash. Kept as a
/// trait separate from [`GeoStore`] because it is keyed purely by device and is
/// typically backed by a lighter-weight embedded store than the relational one.
#[async_trait]
pub trait ZoneStateStore: Send + Sync + 'static {
    async fn load_membership(
        &self,
        device_id: &DeviceId,
    ) -> Result<Option<ZoneMembershipState>, StoreError>;

    async fn save_membership(
        &self,
        device_id: &DeviceId,
        state: &ZoneMembershipState,
    ) -> Result<(), StoreError>;

    async fn load_dwell_trackers(
        &self,
        device_id: &DeviceId,
    ) -> Result<BTreeMap<ZoneId, DwellTracker>, StoreError>;

    async fn save_dwell_trackers(
        &self,
        device_id: &DeviceId,
        trackers: &BTreeMap<ZoneId, DwellTracker>,
    ) -> Result<(), StoreError>;
}
