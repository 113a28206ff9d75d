//! Request handlers.

pub mod admin;
pub mod analyze;
pub mod enrollment;
pub mod identify;

use crate::error::ApiError;
use crate::state::AppState;
use axum::extract::State;
use axum::Json;
use base64::Engine;
use serde_json::json;
use std::sync::Arc;

/// `GET /` — liveness and model identity.
pub async fn status(State(state): State<Arc<AppState>>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "model": state.model_info.model,
        "detector": state.model_info.detector,
    }))
}

/// Decode a base64 image, tolerating a `data:image/...;base64,` prefix.
///
/// The base64 alphabet contains no comma, so everything up to the first
/// comma (if any) is the data-URI header.
pub(crate) fn decode_base64_image(data: &str) -> Result<Vec<u8>, ApiError> {
    let payload = match data.split_once(',') {
        Some((_header, rest)) => rest,
        None => data,
    };
    base64::engine::general_purpose::STANDARD
        .decode(payload.trim())
        .map_err(|e| ApiError::BadRequest(format!("invalid base64 image: {e}")))
}
