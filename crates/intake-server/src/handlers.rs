use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use serde_json::json;

use intake_api::ApiError;

use crate::server::AppState;

#[derive(Serialize)]
pub struct HealthResponse<'a> {
    status: &'a str,
}

pub async fn root(State(state): State<AppState>) -> impl IntoResponse {
    let body = json!({
        "service": "Intake Server",
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
        "storage": state.storage.backend_name(),
    });
    (StatusCode::OK, Json(body))
}

pub async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, Json(HealthResponse { status: "ok" }))
}

pub async fn readyz(State(state): State<AppState>) -> Result<impl IntoResponse, ApiError> {
    if let Err(e) = state.storage.health_check().await {
        tracing::warn!(error = %e, backend = state.storage.backend_name(), "Readiness check failed");
        return Err(ApiError::service_unavailable(format!(
            "Storage backend is not ready: {e}"
        )));
    }
    Ok((StatusCode::OK, Json(HealthResponse { status: "ready" })))
}
