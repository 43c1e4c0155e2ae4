use std::sync::Arc;

use axum::middleware;
use axum::routing::{get, post};
use axum::Router;
use geofence_store::GeoStore;
use tower_http::trace::TraceLayer;

use crate::auth::require_bearer_token;
use crate::handlers;
use crate::state::{ApiMetrics, AppState};

/// Builds the admin/introspection surface (§9): health, DLQ listing and
/// replay. A narrowed generalization of the teacher's full CRUD/reconcile/
/// Terraform-state-backend API — everything else in that surface is out of
/// scope here (§1).
pub fn build_app(store: Arc<dyn GeoStore>, auth_token: Option<Arc<String>>, metrics: ApiMetrics) -> Router {
    let state = AppState { store, auth_token, metrics };

    Router::new()
        .route("/health", get(handlers::health))
        .route("/dlq", get(handlers::list_dlq))
        .route("/dlq/:id/replay", post(handlers::replay_dlq))
        .route_layer(middleware::from_fn_with_state(state.clone(), require_bearer_token))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
