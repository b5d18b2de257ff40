//! Router definition for the bridge API.

use axum::routing::{delete, get, post};
use axum::Router;

use super::{handlers, AppState};

/// Build the bridge router. Every tenant route authenticates via the
/// shared-secret extractor; `/health` is open.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/init", post(handlers::init))
        .route("/status", get(handlers::status))
        .route("/qr", get(handlers::qr))
        .route("/number-id/:number", get(handlers::number_id))
        .route("/send", post(handlers::send))
        .route("/info", get(handlers::info))
        .route("/logout", post(handlers::logout))
        .route("/restart", post(handlers::restart))
        .route("/instance", delete(handlers::remove))
        .route("/instances", get(handlers::list_instances))
        .fallback(handlers::unknown_route)
        .with_state(state)
}
