use std::sync::Arc;

use geofence_domain::RawFix;
use geofence_store::GeoStore;
use tracing::warn;

use crate::cache::{resolve_device, DeviceKeyCache};
use crate::error::IngestError;
use crate::topic;
use crate::wire;

/// Runs one inbound message through §4.1 steps 1-4: topic parsing, JSON
/// decode, device-key resolution, and signature verification. Returns the
/// authenticated [`RawFix`] ready for C2, or the error that should route to
/// the DLQ (or simply be logged, for [`IngestError::Store`]).
pub async fn process_message(
    subject: &str,
    body: &[u8],
    cache: &DeviceKeyCache,
    store: &Arc<dyn GeoStore>,
) -> Result<RawFix, IngestError> {
    let parsed_topic = topic::parse(subject)?;
    let (fix, raw_value) = wire::decode(body)?;
    let device = resolve_device(cache, store, &parsed_topic.tenant_id, &parsed_topic.device_key)
        .await?;
    crate::auth::verify_signature(&raw_value, &device.device_key)?;
    let raw_fix = fix.into_raw_fix(parsed_topic.tenant_id, device.id);
    // C1 is the sole writer of Device.last_seen (§3); every authenticated
    // fix refreshes it here, independent of C3's hysteresis/ordering gates.
    if let Err(e) = store
        .touch_device_last_seen(&raw_fix.device_id, raw_fix.ts, raw_fix.position)
        .await
    {
        warn!(device_id = %raw_fix.device_id, error = %e, "failed to touch device last_seen");
    }
    Ok(raw_fix)
}
