use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use geofence_domain::{DeviceId, DwellTracker, ZoneId, ZoneMembershipState};
use redb::{Database, ReadableTable, TableDefinition};

use crate::error::StoreError;
use crate::store::ZoneStateStore;

const MEMBERSHIPS: TableDefinition<&str, &[u8]> = TableDefinition::new("memberships");
const DWELL_TRACKERS: TableDefinition<&str, &[u8]> = TableDefinition::new("dwell_trackers");

/// Persistent [`ZoneStateStore`] backed by a redb database file, keyed by device.
///
/// Survives process restarts so the geofence processor (C3) can resume
/// hysteresis/dwell state after a crash without replaying the entire raw fix
/// history (§4.3, §4.8).
#[derive(Clone)]
pub struct RedbZoneStateStore {
    db: Arc<Database>,
}

impl RedbZoneStateStore {
    /// Open (or create) a redb database at `path`.
    ///
    /// Parent directories are created automatically.
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| StoreError::Internal(e.to_string()))?;
        }
        let db = Database::create(path).map_err(|e| StoreError::Internal(e.to_string()))?;

        {
            let wtxn = db.begin_write().map_err(|e| StoreError::Internal(e.to_string()))?;
            wtxn.open_table(MEMBERSHIPS).map_err(|e| StoreError::Internal(e.to_string()))?;
            wtxn.open_table(DWELL_TRACKERS).map_err(|e| StoreError::Internal(e.to_string()))?;
            wtxn.commit().map_err(|e| StoreError::Internal(e.to_string()))?;
        }

        Ok(Self { db: Arc::new(db) })
    }
}

#[async_trait]
impl ZoneStateStore for RedbZoneStateStore {
    async fn load_membership(
        &self,
        device_id: &DeviceId,
    ) -> Result<Option<ZoneMembershipState>, StoreError> {
        let rtxn = self.db.begin_read().map_err(|e| StoreError::Internal(e.to_string()))?;
        let table = rtxn.open_table(MEMBERSHIPS).map_err(|e| StoreError::Internal(e.to_string()))?;
        match table.get(device_id.as_str()).map_err(|e| StoreError::Internal(e.to_string()))? {
            Some(guard) => Ok(Some(serde_json::from_slice(guard.value())?)),
            None => Ok(None),
        }
    }

    async fn save_membership(
        &self,
        device_id: &DeviceId,
        state: &ZoneMembershipState,
    ) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(state)?;
        let wtxn = self.db.begin_write().map_err(|e| StoreError::Internal(e.to_string()))?;
        {
            let mut table =
                wtxn.open_table(MEMBERSHIPS).map_err(|e| StoreError::Internal(e.to_string()))?;
            table
                .insert(device_id.as_str(), bytes.as_slice())
                .map_err(|e| StoreError::Internal(e.to_string()))?;
        }
        wtxn.commit().map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(())
    }

    async fn load_dwell_trackers(
        &self,
        device_id: &DeviceId,
    ) -> Result<BTreeMap<ZoneId, DwellTracker>, StoreError> {
        let rtxn = self.db.begin_read().map_err(|e| StoreError::Internal(e.to_string()))?;
        let table =
            rtxn.open_table(DWELL_TRACKERS).map_err(|e| StoreError::Internal(e.to_string()))?;
        match table.get(device_id.as_str()).map_err(|e| StoreError::Internal(e.to_string()))? {
            Some(guard) => Ok(serde_json::from_slice(guard.value())?),
            None => Ok(BTreeMap::new()),
        }
    }

    async fn save_dwell_trackers(
        &self,
        device_id: &DeviceId,
        trackers: &BTreeMap<ZoneId, DwellTracker>,
    ) -> Result<(), StoreError> {
        let bytes = serde_json::to_vec(trackers)?;
        let wtxn = self.db.begin_write().map_err(|e| StoreError::Internal(e.to_string()))?;
        {
            let mut table = wtxn
                .open_table(DWELL_TRACKERS)
                .map_err(|e| StoreError::Internal(e.to_string()))?;
            table
                .insert(device_id.as_str(), bytes.as_slice())
                .map_err(|e| StoreError::Internal(e.to_string()))?;
        }
        wtxn.commit().map_err(|e| StoreError::Internal(e.to_string()))?;
        Ok(())
    }
}
