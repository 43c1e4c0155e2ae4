use geofence_domain::{TransitionEvent, ZoneId};
use serde::{Deserialize, Serialize};

/// The observable result of processing one [`geofence_domain::RawFix`] through
/// the per-fix algorithm (§4.3). Returned by [`crate::processor::process_fix`]
/// for logging, metrics, and tests — mirrors the teacher's `Change`/
/// `ReconcileReport` shape (a structured diff-of-effects, not just a bool).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum FixOutcome {
    /// The hysteresis gate suppressed transition detection for this fix.
    Suppressed,
    /// The fix's timestamp was older than the device's last accepted fix.
    OutOfOrder,
    /// Transition detection ran; zero or more events were newly persisted
    /// (duplicates already observed via the event-hash uniqueness are not
    /// included here — see `duplicate_count`).
    Processed {
        events: Vec<TransitionEvent>,
        duplicate_count: u32,
        zones_entered: Vec<ZoneId>,
        zones_exited: Vec<ZoneId>,
    },
}

impl FixOutcome {
    pub fn events(&self) -> &[TransitionEvent] {
        match self {
            FixOutcome::Processed { events, .. } => events,
            _ => &[],
        }
    }
}
