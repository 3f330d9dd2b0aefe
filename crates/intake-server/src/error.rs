//! Mapping of domain errors onto HTTP errors, and a JSON extractor whose
//! rejections use the same error body.

use axum::{
    Json,
    extract::{FromRequest, Request, rejection::JsonRejection},
    http::StatusCode,
};
use serde::de::DeserializeOwned;

use intake_api::ApiError;
use intake_storage::StorageError;

use crate::confirmation::ConfirmationError;
use crate::reconcile::ReconcileError;

/// Maps a store failure onto the API error reported to the client.
pub fn api_error_from_storage(err: StorageError) -> ApiError {
    match err {
        StorageError::NotFound { .. } => ApiError::not_found(err.to_string()),
        StorageError::AlreadyExists { .. } | StorageError::ConstraintViolation { .. } => {
            ApiError::conflict(err.to_string())
        }
        StorageError::InvalidRecord { .. } => ApiError::bad_request(err.to_string()),
        StorageError::TransactionError { .. }
        | StorageError::ConnectionError { .. }
        | StorageError::Internal { .. } => {
            tracing::error!(error = %err, category = %err.category(), "Storage failure");
            ApiError::internal(err.to_string())
        }
    }
}

impl From<ReconcileError> for ApiError {
    fn from(err: ReconcileError) -> Self {
        match err {
            ReconcileError::Validation(message) => ApiError::bad_request(message),
            ReconcileError::NotFound { .. } => ApiError::not_found(err.to_string()),
            ReconcileError::DanglingReference { .. } => {
                ApiError::unprocessable_entity(err.to_string())
            }
            ReconcileError::Storage(err) => api_error_from_storage(err),
        }
    }
}

impl From<ConfirmationError> for ApiError {
    fn from(err: ConfirmationError) -> Self {
        match err {
            ConfirmationError::Storage(err) => api_error_from_storage(err),
            other => ApiError::bad_request(other.to_string()),
        }
    }
}

/// `Json` extractor that reports malformed bodies as [`ApiError`]s.
pub struct ApiJson<T>(pub T);

impl<S, T> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        match Json::<T>::from_request(req, state).await {
            Ok(Json(value)) => Ok(Self(value)),
            Err(rejection) => Err(json_rejection(rejection)),
        }
    }
}

fn json_rejection(rejection: JsonRejection) -> ApiError {
    let message = rejection.body_text();
    match rejection.status() {
        StatusCode::PAYLOAD_TOO_LARGE => ApiError::payload_too_large(message),
        StatusCode::UNSUPPORTED_MEDIA_TYPE => ApiError::unsupported_media_type(message),
        _ => ApiError::bad_request(message),
    }
}
