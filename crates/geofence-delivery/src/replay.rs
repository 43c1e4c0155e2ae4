use chrono::Utc;
use geofence_domain::{Delivery, DeliveryId, DeliveryStatus, DlqEntryId};
use geofence_store::GeoStore;

use crate::error::DeliveryError;

/// Shared by the admin API's `POST /dlq/{id}/replay` and the CLI's
/// `dlq replay` command (§4.7): re-enqueues a `delivery`-origin DLQEntry as a
/// fresh Delivery with `attempt=0`, and marks the entry replayed.
pub async fn replay_dlq_entry(
    store: &dyn GeoStore,
    id: &DlqEntryId,
) -> Result<Delivery, DeliveryError> {
    let entry = store
        .get_dlq_entry(id)
        .await?
        .ok_or_else(|| DeliveryError::NotFound(format!("dlq entry {id} not found")))?;

    if entry.origin != geofence_domain::DlqOrigin::Delivery {
        return Err(DeliveryError::InvalidReplay(
            "only delivery-origin DLQ entries can be replayed".to_string(),
        ));
    }
    if entry.replayed {
        return Err(DeliveryError::InvalidReplay("dlq entry already replayed".to_string()));
    }

    let original_id = entry
        .reference
        .get("delivery_id")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| DeliveryError::Internal("dlq entry missing delivery_id reference".to_string()))?;
    let original = store
        .get_delivery(&DeliveryId::new(original_id))
        .await?
        .ok_or_else(|| DeliveryError::NotFound(format!("original delivery {original_id} not found")))?;

    let replacement = Delivery {
        id: DeliveryId::generate(),
        tenant_id: original.tenant_id,
        automation_id: original.automation_id,
        rule_id: original.rule_id,
        transition_event_id: original.transition_event_id,
        status: DeliveryStatus::Pending,
        attempt: 0,
        next_attempt_at: Utc::now(),
        last_error: None,
        response_snapshot: None,
    };
    store.create_delivery(&replacement).await?;
    store.mark_dlq_replayed(id).await?;
    Ok(replacement)
}
