use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use geofence_domain::{
    transition_event_hash, RawFix, TransitionEvent, TransitionEventId, TransitionKind, ZoneId,
    ZoneMembershipState,
};
use geofence_store::{GeoStore, ZoneStateStore};
use tracing::{debug, warn};

use crate::error::ProcessorError;
use crate::report::FixOutcome;

/// Tunables driving the per-fix algorithm (§4.3). Carried separately from
/// `geofence_config::Config` so the processor can be unit tested without
/// pulling in the full config-loading surface.
#[derive(Debug, Clone)]
pub struct ProcessorConfig {
    pub hysteresis_ms: i64,
    pub dwell_thresholds_min: Vec<i64>,
}

impl From<&geofence_config::Config> for ProcessorConfig {
    fn from(cfg: &geofence_config::Config) -> Self {
        Self {
            hysteresis_ms: cfg.hysteresis_ms,
            dwell_thresholds_min: cfg.dwell_thresholds_min.clone(),
        }
    }
}

/// Processes one raw fix through candidate lookup, hysteresis, transition
/// detection, and dwell-ladder evaluation, persisting state and newly
/// observed transition events as it goes.
///
/// Mirrors the teacher's `reconcile()` shape (load desired, load actual, diff,
/// persist) narrowed to a single device's per-fix update instead of a
/// whole-fleet reconcile pass.
pub async fn process_fix(
    fix: &RawFix,
    geo_store: &Arc<dyn GeoStore>,
    zone_state: &Arc<dyn ZoneStateStore>,
    config: &ProcessorConfig,
) -> Result<FixOutcome, ProcessorError> {
    // 1. Candidate lookup.
    let candidates = geo_store
        .list_active_zones_near(&fix.tenant_id, fix.position, geofence_geo::CANDIDATE_RADIUS_M)
        .await?;

    let mut current_zones = BTreeSet::new();
    for zone in &candidates {
        match geofence_geo::contains(zone, fix.position) {
            Ok(true) => {
                current_zones.insert(zone.id.clone());
            }
            Ok(false) => {}
            Err(e) => {
                warn!(zone_id = %zone.id, error = %e, "skipping zone: geometry computation error");
            }
        }
    }

    // 2. Load prior state.
    let mut membership = zone_state
        .load_membership(&fix.device_id)
        .await?
        .unwrap_or_default();
    let mut dwell_trackers = zone_state.load_dwell_trackers(&fix.device_id).await?;

    if let Some(last) = membership.last_accepted_ts {
        if fix.ts < last {
            debug!(device_id = %fix.device_id, "dropping out-of-order fix");
            return Ok(FixOutcome::OutOfOrder);
        }
    }

    // 3. Hysteresis gate.
    let gate_open = membership
        .last_accepted_ts
        .map_or(true, |last| (fix.ts - last).num_milliseconds() >= config.hysteresis_ms);

    if !gate_open {
        // Still refresh last_seen on open dwell trackers so a suppressed fix
        // doesn't prematurely expire a tracker's liveness.
        for tracker in dwell_trackers.values_mut() {
            tracker.last_seen = fix.ts;
        }
        zone_state.save_dwell_trackers(&fix.device_id, &dwell_trackers).await?;
        return Ok(FixOutcome::Suppressed);
    }

    // 4. Transition detection.
    let entered: Vec<ZoneId> = current_zones.difference(&membership.zones).cloned().collect();
    let exited: Vec<ZoneId> = membership.zones.difference(&current_zones).cloned().collect();

    let mut events = Vec::new();
    let mut duplicate_count = 0u32;

    for zone_id in &entered {
        if let Some(event) = emit_transition(geo_store, fix, zone_id, TransitionKind::Enter, None).await? {
            events.push(event);
        } else {
            duplicate_count += 1;
        }
    }
    for zone_id in &exited {
        if let Some(event) = emit_transition(geo_store, fix, zone_id, TransitionKind::Exit, None).await? {
            events.push(event);
        } else {
            duplicate_count += 1;
        }
    }

    // 5. Dwell handling.
    for zone_id in &current_zones {
        let tracker = dwell_trackers.entry(zone_id.clone()).or_insert_with(|| {
            geofence_domain::DwellTracker {
                entry_time: fix.ts,
                last_seen: fix.ts,
                notified_minutes: Default::default(),
            }
        });
        tracker.last_seen = fix.ts;

        let elapsed_s = (fix.ts - tracker.entry_time).num_seconds();
        for threshold_min in &config.dwell_thresholds_min {
            if elapsed_s >= threshold_min * 60 && !tracker.notified_minutes.contains(threshold_min) {
                if let Some(event) = emit_transition(
                    geo_store,
                    fix,
                    zone_id,
                    TransitionKind::Dwell,
                    Some(elapsed_s),
                )
                .await?
                {
                    events.push(event);
                }
                tracker.notified_minutes.insert(*threshold_min);
            }
        }
    }
    // Trackers for zones no longer occupied are discarded.
    dwell_trackers.retain(|zone_id, _| current_zones.contains(zone_id));

    // 6. Persist new state.
    membership.zones = current_zones.clone();
    membership.last_accepted_ts = Some(fix.ts);
    zone_state.save_membership(&fix.device_id, &membership).await?;
    zone_state.save_dwell_trackers(&fix.device_id, &dwell_trackers).await?;

    Ok(FixOutcome::Processed {
        events,
        duplicate_count,
        zones_entered: entered,
        zones_exited: exited,
    })
}

/// Computes the event hash, attempts the idempotent insert, and returns the
/// persisted event iff the insert produced a new row (§4.3's "publish onto C4
/// only if the insert produced a row" rule).
async fn emit_transition(
    geo_store: &Arc<dyn GeoStore>,
    fix: &RawFix,
    zone_id: &ZoneId,
    kind: TransitionKind,
    dwell_seconds: Option<i64>,
) -> Result<Option<TransitionEvent>, ProcessorError> {
    let event_hash =
        transition_event_hash(fix.device_id.as_str(), zone_id.as_str(), &kind.to_string(), fix.ts);
    let event = TransitionEvent {
        id: TransitionEventId::generate(),
        tenant_id: fix.tenant_id.clone(),
        device_id: fix.device_id.clone(),
        zone_id: zone_id.clone(),
        kind,
        ts: fix.ts,
        dwell_seconds,
        event_hash,
    };
    let inserted = geo_store.insert_transition_event_if_new(&event).await?;
    Ok(if inserted { Some(event) } else { None })
}
