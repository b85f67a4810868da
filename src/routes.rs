use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::AppState;

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(handlers::health::health))
        .route(
            "/api/availability/:date",
            get(handlers::availability::get_availability),
        )
        .route(
            "/api/appointments",
            get(handlers::appointments::list_appointments)
                .post(handlers::appointments::create_appointment),
        )
        .route(
            "/api/appointments/:id",
            get(handlers::appointments::get_appointment)
                .delete(handlers::appointments::delete_appointment),
        )
        .route(
            "/api/appointments/:id/cancel",
            post(handlers::appointments::cancel_appointment),
        )
        .route(
            "/api/config",
            get(handlers::config::get_config).post(handlers::config::save_config),
        )
        .route("/api/test-google", post(handlers::integrations::test_google))
        .route(
            "/api/test-whatsapp",
            post(handlers::integrations::test_whatsapp),
        )
        .route("/api/oauth/google/start", post(handlers::oauth::start))
        .route("/api/oauth/google/callback", get(handlers::oauth::callback))
        .route("/api/oauth/google/status", get(handlers::oauth::status))
        .route("/api/oauth/google/revoke", post(handlers::oauth::revoke))
        .route(
            "/api/notifications",
            get(handlers::notifications::list_notifications)
                .delete(handlers::notifications::clear_notifications),
        )
        .route(
            "/api/notifications/stream",
            get(handlers::notifications::notification_stream),
        )
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
