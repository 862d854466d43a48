//! sitewatch-api — the daemon's HTTP surface.
//!
//! Two routers, each served on its own port:
//!
//! | Router | Method | Path | Description |
//! |---|---|---|---|
//! | status | GET | `/data/{secret}` | Loaded config plus the job log |
//! | kill | POST | `/{secret}` | Signal graceful shutdown |
//!
//! Anything else answers `403` with an empty `text/plain` body.

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::any;
use tokio::sync::watch;

use sitewatch_core::SitewatchConfig;
use sitewatch_state::Store;

/// Shared state for the status router.
#[derive(Clone)]
pub struct StatusState {
    pub config: Arc<SitewatchConfig>,
    pub store: Arc<dyn Store>,
}

/// Shared state for the kill router.
#[derive(Clone)]
pub struct KillState {
    pub secret: Option<String>,
    pub shutdown: watch::Sender<bool>,
}

pub fn status_router(config: Arc<SitewatchConfig>, store: Arc<dyn Store>) -> Router {
    Router::new()
        .route("/data/{secret}", any(handlers::status))
        .fallback(handlers::forbidden)
        .with_state(StatusState { config, store })
}

pub fn kill_router(secret: Option<String>, shutdown: watch::Sender<bool>) -> Router {
    Router::new()
        .route("/{secret}", any(handlers::kill))
        .fallback(handlers::forbidden)
        .with_state(KillState { secret, shutdown })
}
