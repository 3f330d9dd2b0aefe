use axum::{
    Json,
    extract::{Path, State},
};

use intake_api::ApiError;
use intake_core::{EntityKind, RecordId};
use intake_storage::{ApplicationTree, ApplicationView};

use crate::error::{ApiJson, api_error_from_storage};
use crate::reconcile::{SubmissionMode, SubmissionPayload, reconcile};
use crate::server::AppState;

/// Ids in the path that are not positive integers name no record.
fn parse_id(raw: &str) -> Result<RecordId, ApiError> {
    raw.parse()
        .map_err(|_| ApiError::not_found(format!("{} {raw} not found", EntityKind::Application)))
}

/// GET /application
pub async fn list_applications(
    State(state): State<AppState>,
) -> Result<Json<Vec<ApplicationTree>>, ApiError> {
    let trees = state
        .storage
        .find_all_applications()
        .await
        .map_err(api_error_from_storage)?;
    Ok(Json(trees))
}

/// GET /application/{id}
pub async fn read_application(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<ApplicationTree>, ApiError> {
    let id = parse_id(&id)?;
    state
        .storage
        .find_application(id)
        .await
        .map_err(api_error_from_storage)?
        .map(Json)
        .ok_or_else(|| ApiError::not_found(format!("{} {id} not found", EntityKind::Application)))
}

/// POST /application
///
/// Stores a tree built entirely offline.
pub async fn create_application(
    State(state): State<AppState>,
    ApiJson(payload): ApiJson<SubmissionPayload>,
) -> Result<Json<ApplicationView>, ApiError> {
    let submission = payload.resolve(SubmissionMode::Initial)?;
    let reconciled = reconcile(state.storage.as_ref(), submission).await?;
    Ok(Json(reconciled.view))
}

/// POST /application/{id}
///
/// Applies an offline revision of a stored tree.
pub async fn revise_application(
    State(state): State<AppState>,
    Path(id): Path<String>,
    ApiJson(payload): ApiJson<SubmissionPayload>,
) -> Result<Json<ApplicationView>, ApiError> {
    let id = parse_id(&id)?;
    let submission = payload.resolve(SubmissionMode::Revision(id))?;
    let reconciled = reconcile(state.storage.as_ref(), submission).await?;
    Ok(Json(reconciled.view))
}
