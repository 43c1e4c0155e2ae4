use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use geofence_domain::{DlqEntryId, DlqOrigin};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ApiError;
use crate::state::AppState;

// ── Health ────────────────────────────────────────────────────────────────────

/// `GET /health` — liveness plus a minimal introspection surface (§6, §9):
/// 200 with `status: "ok"` when the store answers, 503 with `status:
/// "degraded"` otherwise. `metrics` carries whatever this process has to
/// report — an idle `delivery`-only process reports zero consumer lag, not
/// an error.
pub async fn health(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let store_healthy = state.store.health_check().await.is_ok();
    let status_code = if store_healthy { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    let body = json!({
        "status": if store_healthy { "ok" } else { "degraded" },
        "components": {
            "store": if store_healthy { "ok" } else { "error" },
        },
        "metrics": {
            "consumer_lag": state.metrics.lag(),
            "active_adapters": state.metrics.active_adapters,
        },
    });
    (status_code, Json(body))
}

// ── DLQ ───────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct DlqListQuery {
    pub origin: Option<String>,
    pub limit: Option<u32>,
}

/// `GET /dlq` — lists DLQ entries, optionally filtered by origin (§4.7).
pub async fn list_dlq(
    State(state): State<AppState>,
    Query(query): Query<DlqListQuery>,
) -> Result<Json<Value>, ApiError> {
    let origin = match query.origin.as_deref() {
        None => None,
        Some("ingest") => Some(DlqOrigin::Ingest),
        Some("delivery") => Some(DlqOrigin::Delivery),
        Some(other) => return Err(ApiError::bad_request(format!("unknown origin '{other}'"))),
    };
    let limit = query.limit.unwrap_or(100);
    let entries = state.store.list_dlq(origin, limit).await?;
    Ok(Json(json!({ "entries": entries })))
}

/// `POST /dlq/{id}/replay` — re-enqueues a `delivery`-origin DLQEntry as a
/// fresh Delivery with `attempt=0` and marks the entry replayed (§4.7).
/// `ingest`-origin entries are diagnostic only and cannot be replayed.
pub async fn replay_dlq(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Value>, ApiError> {
    let id = DlqEntryId::new(id);
    let replacement = geofence_delivery::replay_dlq_entry(state.store.as_ref(), &id)
        .await
        .map_err(ApiError::from)?;
    Ok(Json(json!({ "delivery_id": replacement.id.as_str() })))
}
