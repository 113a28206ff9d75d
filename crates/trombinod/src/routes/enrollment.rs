//! Enrollment routes: single and batch registration.
//!
//! Both paths run the same coordinator — quality gate, strict
//! detection, insert — so a single image is simply a batch of one.

use crate::error::{ApiError, ApiResult};
use crate::state::{run_blocking, AppState};
use axum::extract::{Multipart, State};
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use trombino_core::{EnrollmentCoordinator, Rejection};

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: String,
    pub accepted: usize,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<Rejection>,
}

/// `POST /api/register` — form fields `name` and `file`.
pub async fn register(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> ApiResult<Json<RegisterResponse>> {
    let (name, images) = read_enrollment_form(multipart).await?;
    if images.len() != 1 {
        return Err(ApiError::BadRequest("expected exactly one `file` field".into()));
    }

    let outcome = enroll(&state, name.clone(), images).await?;
    Ok(Json(RegisterResponse {
        message: format!("Profile for {name} created."),
        accepted: outcome.accepted,
        errors: outcome.rejections,
    }))
}

/// `POST /api/register-multi` — form fields `name` and repeated `files`.
///
/// Per-image failures are reported alongside the accepted count; the
/// request only fails when every image was rejected.
pub async fn register_multi(
    State(state): State<Arc<AppState>>,
    multipart: Multipart,
) -> ApiResult<Json<RegisterResponse>> {
    let (name, images) = read_enrollment_form(multipart).await?;
    if images.is_empty() {
        return Err(ApiError::BadRequest("no image received".into()));
    }

    let total = images.len();
    let outcome = enroll(&state, name.clone(), images).await?;
    Ok(Json(RegisterResponse {
        message: format!(
            "Enrollment succeeded: {} of {total} images accepted for {name}.",
            outcome.accepted
        ),
        accepted: outcome.accepted,
        errors: outcome.rejections,
    }))
}

async fn enroll(
    state: &Arc<AppState>,
    name: String,
    images: Vec<Vec<u8>>,
) -> ApiResult<trombino_core::EnrollmentOutcome> {
    let provider = state.provider.clone();
    let index = state.index.clone();
    let gate = state.gate;

    run_blocking(state, move || {
        EnrollmentCoordinator::new(provider.as_ref(), index.as_ref(), gate)
            .enroll(&name, &images)
            .map_err(ApiError::from)
    })
    .await
}

/// Pull the identity name and image payloads out of a multipart form.
/// Accepts `file` or `files` for the image fields, preserving input
/// order.
async fn read_enrollment_form(mut multipart: Multipart) -> ApiResult<(String, Vec<Vec<u8>>)> {
    let mut name: Option<String> = None;
    let mut images: Vec<Vec<u8>> = Vec::new();

    while let Some(field) = multipart.next_field().await? {
        match field.name() {
            Some("name") => name = Some(field.text().await?),
            Some("file") | Some("files") => images.push(field.bytes().await?.to_vec()),
            _ => {}
        }
    }

    let name = name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| ApiError::BadRequest("missing `name` field".into()))?;
    Ok((name, images))
}
