//! Identification and verification routes.

use crate::error::{ApiError, ApiResult};
use crate::routes::decode_base64_image;
use crate::state::{run_blocking, AppState};
use axum::extract::{Multipart, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use trombino_core::{MatchOutcome, MatchReason, ProviderError};

#[derive(Debug, Deserialize)]
pub struct Base64Request {
    pub img_base64: String,
}

#[derive(Debug, Serialize)]
pub struct VerifyResponse {
    pub verified: bool,
    pub distance: f32,
    pub threshold: f32,
    pub model: String,
    pub detector_backend: String,
}

/// `POST /api/identify` — one multipart `file`.
///
/// Returns the policy decision; an empty index is the one case reported
/// as 404, since there is nothing to identify against.
pub async fn identify(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult<Json<MatchOutcome>> {
    let mut image: Option<Vec<u8>> = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") {
            image = Some(field.bytes().await?.to_vec());
        }
    }
    let image = image.ok_or_else(|| ApiError::BadRequest("missing `file` field".into()))?;

    let outcome = run_match(&state, image).await?;
    if outcome.reason == MatchReason::EmptyIndex {
        return Err(ApiError::EmptyIndex);
    }
    Ok(Json(outcome))
}

/// `POST /api/identify-base64` — JSON `{img_base64}`, with or without a
/// data-URI header.
///
/// Always answers with a decision object when the pipeline ran: a
/// missing face or an empty index are expected outcomes, not faults.
pub async fn identify_base64(
    State(state): State<Arc<AppState>>,
    Json(request): Json<Base64Request>,
) -> ApiResult<Json<MatchOutcome>> {
    let image = decode_base64_image(&request.img_base64)?;
    let outcome = run_match(&state, image).await?;
    Ok(Json(outcome))
}

/// Strict extraction followed by the two-stage match policy.
async fn run_match(state: &Arc<AppState>, image: Vec<u8>) -> ApiResult<MatchOutcome> {
    let provider = state.provider.clone();
    let index = state.index.clone();
    let policy = state.policy;

    run_blocking(state, move || {
        let capture = match provider.embed(&image, true) {
            Ok(Some(capture)) => capture,
            Ok(None) | Err(ProviderError::NoFaceDetected) => return Ok(MatchOutcome::no_face()),
            Err(err) => return Err(err.into()),
        };
        policy.match_identity(&capture, index.as_ref()).map_err(ApiError::from)
    })
    .await
}

/// `POST /api/verify` — multipart `file1` and `file2`; do the two images
/// depict the same identity?
pub async fn verify(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult<Json<VerifyResponse>> {
    let mut first: Option<Vec<u8>> = None;
    let mut second: Option<Vec<u8>> = None;
    while let Some(field) = multipart.next_field().await? {
        match field.name() {
            Some("file1") => first = Some(field.bytes().await?.to_vec()),
            Some("file2") => second = Some(field.bytes().await?.to_vec()),
            _ => {}
        }
    }
    let first = first.ok_or_else(|| ApiError::BadRequest("missing `file1` field".into()))?;
    let second = second.ok_or_else(|| ApiError::BadRequest("missing `file2` field".into()))?;

    let provider = state.provider.clone();
    let threshold = state.policy.max_distance;
    let model_info = state.model_info.clone();

    let response = run_blocking(&state, move || {
        let a = provider
            .embed(&first, true)?
            .ok_or(ApiError::NoFaceDetected)?;
        let b = provider
            .embed(&second, true)?
            .ok_or(ApiError::NoFaceDetected)?;

        let distance = a.embedding.cosine_distance(&b.embedding);
        Ok(VerifyResponse {
            verified: distance <= threshold,
            distance,
            threshold,
            model: model_info.model,
            detector_backend: model_info.detector,
        })
    })
    .await?;

    Ok(Json(response))
}
