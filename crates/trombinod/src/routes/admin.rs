//! Index administration routes.

use crate::error::ApiResult;
use crate::state::{run_blocking, AppState};
use axum::extract::{Path, State};
use axum::Json;
use serde::Serialize;
use std::sync::Arc;
use trombino_core::RecordSummary;

#[derive(Debug, Serialize)]
pub struct PeopleResponse {
    /// Number of distinct enrolled people.
    pub count: usize,
    /// Total stored records (several per person for batch enrollments).
    pub total_records: usize,
    pub people: Vec<String>,
}

#[derive(Debug, Serialize)]
pub struct RemoveResponse {
    pub person: String,
    pub deleted: usize,
}

/// `GET /api/people` — who is enrolled, and how many records back them.
pub async fn people(State(state): State<Arc<AppState>>) -> ApiResult<Json<PeopleResponse>> {
    let index = state.index.clone();
    let stats = run_blocking(&state, move || index.stats().map_err(Into::into)).await?;

    Ok(Json(PeopleResponse {
        count: stats.people.len(),
        total_records: stats.total_records,
        people: stats.people,
    }))
}

/// `GET /api/records` — per-record listing, without embeddings.
pub async fn records(State(state): State<Arc<AppState>>) -> ApiResult<Json<Vec<RecordSummary>>> {
    let index = state.index.clone();
    let records = run_blocking(&state, move || index.records().map_err(Into::into)).await?;
    Ok(Json(records))
}

/// `DELETE /api/people/{person}` — drop every record for one identity.
pub async fn remove_person(
    State(state): State<Arc<AppState>>,
    Path(person): Path<String>,
) -> ApiResult<Json<RemoveResponse>> {
    let index = state.index.clone();
    let target = person.clone();
    let deleted = run_blocking(&state, move || index.remove_person(&target).map_err(Into::into)).await?;

    Ok(Json(RemoveResponse { person, deleted }))
}
