//! Attribute analysis routes: age, gender, emotion, ethnicity.

use crate::error::{ApiError, ApiResult};
use crate::routes::decode_base64_image;
use crate::routes::identify::Base64Request;
use crate::state::{run_blocking, AppState};
use axum::extract::{Multipart, State};
use axum::Json;
use std::sync::Arc;
use trombino_core::FaceAttributes;

/// `POST /api/analyze` — one multipart `file`.
pub async fn analyze(
    State(state): State<Arc<AppState>>,
    mut multipart: Multipart,
) -> ApiResult<Json<FaceAttributes>> {
    let mut image: Option<Vec<u8>> = None;
    while let Some(field) = multipart.next_field().await? {
        if field.name() == Some("file") {
            image = Some(field.bytes().await?.to_vec());
        }
    }
    let image = image.ok_or_else(|| ApiError::BadRequest("missing `file` field".into()))?;

    run_analyze(&state, image).await.map(Json)
}

/// `POST /api/analyze-base64` — JSON `{img_base64}`.
pub async fn analyze_base64(
    State(state): State<Arc<AppState>>,
    Json(request): Json<Base64Request>,
) -> ApiResult<Json<FaceAttributes>> {
    let image = decode_base64_image(&request.img_base64)?;
    run_analyze(&state, image).await.map(Json)
}

async fn run_analyze(state: &Arc<AppState>, image: Vec<u8>) -> ApiResult<FaceAttributes> {
    let provider = state.provider.clone();
    run_blocking(state, move || provider.analyze(&image).map_err(ApiError::from)).await
}
