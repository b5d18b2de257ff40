// Submodules
pub mod auth;
pub mod handlers;
pub mod routes;
pub mod runtime;

use std::sync::Arc;

use crate::registry::Registry;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<Registry>,
    pub api_key: String,
}
