//! HTTP routes for the live call service.
//!
//! Defines the Axum router and application state.

use crate::handlers;
use crate::middleware::require_caller;
use crate::observability::{health_router, HealthState};
use crate::services::CallSessionService;
use axum::{
    middleware,
    routing::{delete, get, post},
    Router,
};
use metrics_exporter_prometheus::PrometheusHandle;
use std::sync::Arc;
use std::time::Duration;
use tower_http::{timeout::TimeoutLayer, trace::TraceLayer};

/// Application state shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    /// Call session orchestrator.
    pub calls: CallSessionService,
}

/// Build the application routes.
///
/// - `/health`, `/ready` - Probes
/// - `/metrics` - Prometheus scrape endpoint (when a handle is supplied)
/// - `/v1/live/...` - Call API, requires the caller header
pub fn build_routes(
    state: Arc<AppState>,
    health_state: Arc<HealthState>,
    metrics_handle: Option<PrometheusHandle>,
) -> Router {
    let protected_routes = Router::new()
        .route("/v1/live/rooms", post(handlers::create_room))
        .route("/v1/live/rooms/current", get(handlers::get_current_room))
        .route(
            "/v1/live/groups/:group_id/room",
            get(handlers::get_group_room),
        )
        .route("/v1/live/rooms/:room_id/join", post(handlers::join_room))
        .route("/v1/live/rooms/:room_id/reject", post(handlers::reject_room))
        .route("/v1/live/rooms/:room_id/leave", post(handlers::leave_room))
        .route("/v1/live/rooms/:room_id", delete(handlers::delete_room))
        .route_layer(middleware::from_fn(require_caller))
        .with_state(state);

    let mut app = health_router(health_state).merge(protected_routes);

    if let Some(handle) = metrics_handle {
        let metrics_routes = Router::new()
            .route("/metrics", get(handlers::metrics_handler))
            .with_state(handle);
        app = app.merge(metrics_routes);
    }

    app.layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(Duration::from_secs(30)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_state_is_clone() {
        fn assert_clone<T: Clone>() {}
        assert_clone::<AppState>();
    }
}
