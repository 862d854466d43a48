//! Status and kill handlers.

use axum::Json;
use axum::extract::{Path, State};
use axum::http::{Method, StatusCode, header};
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use serde_json::Value;
use tracing::{error, info, warn};

use sitewatch_core::SitewatchConfig;

use crate::{KillState, StatusState};

#[derive(Serialize)]
struct StatusBody<'a> {
    config: &'a SitewatchConfig,
    data: Vec<Value>,
}

/// 403 with an empty `text/plain` body.
pub async fn forbidden() -> Response {
    forbidden_response()
}

fn forbidden_response() -> Response {
    (StatusCode::FORBIDDEN, [(header::CONTENT_TYPE, "text/plain")], "").into_response()
}

fn secret_matches(expected: Option<&str>, given: &str) -> bool {
    matches!(expected, Some(secret) if !secret.is_empty() && secret == given)
}

/// Decode each job log entry as JSON, keeping undecodable ones as strings.
fn decode_entries(entries: Vec<String>) -> Vec<Value> {
    entries
        .into_iter()
        .map(|raw| serde_json::from_str(&raw).unwrap_or(Value::String(raw)))
        .collect()
}

// ── Status ─────────────────────────────────────────────────────────

/// GET /data/{secret}
pub async fn status(State(state): State<StatusState>, method: Method, Path(secret): Path<String>) -> Response {
    if method != Method::GET || !secret_matches(state.config.kill_secret.as_deref(), &secret) {
        warn!(%method, "status request refused");
        return forbidden_response();
    }

    match state.store.job_log().await {
        Ok(entries) => Json(StatusBody {
            config: &state.config,
            data: decode_entries(entries),
        })
        .into_response(),
        Err(e) => {
            error!(error = %e, "failed to read job log");
            (StatusCode::INTERNAL_SERVER_ERROR, [(header::CONTENT_TYPE, "text/plain")], "").into_response()
        }
    }
}

// ── Kill switch ────────────────────────────────────────────────────

/// POST /{secret}
pub async fn kill(State(state): State<KillState>, method: Method, Path(secret): Path<String>) -> Response {
    if method != Method::POST || !secret_matches(state.secret.as_deref(), &secret) {
        warn!(%method, "kill request refused");
        return forbidden_response();
    }

    info!("kill switch triggered, shutting down");
    let _ = state.shutdown.send(true);
    StatusCode::OK.into_response()
}
