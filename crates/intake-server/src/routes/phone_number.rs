use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;

use intake_api::ApiError;

use crate::confirmation::{self, ConfirmRequest, ValidateRequest};
use crate::error::ApiJson;
use crate::server::AppState;

/// POST /phone-number/validate
pub async fn validate(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ValidateRequest>,
) -> Result<StatusCode, ApiError> {
    confirmation::request_code(
        state.storage.as_ref(),
        &request,
        state.config.confirmation.default_code,
    )
    .await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /phone-number/confirm
///
/// Responds with the application stored for the number, or `{}` when there is none.
pub async fn confirm(
    State(state): State<AppState>,
    ApiJson(request): ApiJson<ConfirmRequest>,
) -> Result<Response, ApiError> {
    let response = match confirmation::confirm(state.storage.as_ref(), &request).await? {
        Some(view) => Json(view).into_response(),
        None => Json(json!({})).into_response(),
    };
    Ok(response)
}
