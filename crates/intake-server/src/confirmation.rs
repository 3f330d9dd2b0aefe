//! Phone number confirmation.
//!
//! A client first asks for a code for its phone number, then confirms with
//! that code to recover the application already stored for the number.
//! Codes are not delivered anywhere; every number gets the configured code.

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use intake_storage::{ApplicationView, IntakeStorage, StorageError};

#[derive(Debug, Error)]
pub enum ConfirmationError {
    #[error("Phone number must be included in request.")]
    MissingPhoneNumber,

    #[error("Phone number and confirmation code must be included in request.")]
    MissingFields,

    /// Unknown number or wrong code. The two are not told apart.
    #[error("Phone number or confirmation code is incorrect.")]
    Incorrect,

    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Body of `POST /phone-number/validate`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateRequest {
    #[serde(default)]
    pub phone_number: Option<Value>,
}

/// Body of `POST /phone-number/confirm`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmRequest {
    #[serde(default)]
    pub phone_number: Option<Value>,
    #[serde(default)]
    pub confirmation_code: Option<Value>,
}

/// A confirmation code as the client sent it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SubmittedCode {
    Missing,
    Code(i64),
    /// Present but not a whole number; matches nothing.
    Unparsable,
}

/// Phone numbers may arrive as strings or bare JSON numbers.
fn normalize_phone(value: Option<&Value>) -> Option<String> {
    match value? {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => n.as_u64().filter(|v| *v != 0).map(|v| v.to_string()),
        _ => None,
    }
}

fn normalize_code(value: Option<&Value>) -> SubmittedCode {
    match value {
        None | Some(Value::Null) | Some(Value::Bool(false)) => SubmittedCode::Missing,
        Some(Value::String(s)) if s.is_empty() => SubmittedCode::Missing,
        Some(Value::String(s)) => s
            .trim()
            .parse::<i64>()
            .map_or(SubmittedCode::Unparsable, SubmittedCode::Code),
        Some(Value::Number(n)) => match n.as_i64() {
            Some(0) => SubmittedCode::Missing,
            Some(v) => SubmittedCode::Code(v),
            None => match n.as_f64() {
                Some(f) if f == 0.0 => SubmittedCode::Missing,
                Some(f) if f.fract() == 0.0 && f.is_finite() => SubmittedCode::Code(f as i64),
                _ => SubmittedCode::Unparsable,
            },
        },
        Some(_) => SubmittedCode::Unparsable,
    }
}

/// Issues the confirmation code for a phone number, registering the number
/// if it is new.
pub async fn request_code(
    storage: &dyn IntakeStorage,
    request: &ValidateRequest,
    code: i32,
) -> Result<(), ConfirmationError> {
    let phone = normalize_phone(request.phone_number.as_ref())
        .ok_or(ConfirmationError::MissingPhoneNumber)?;

    let (_, created) = storage.find_or_create_phone_number(&phone).await?;
    storage.set_confirmation_code(&phone, code).await?;
    tracing::info!(created, "Confirmation code issued");
    Ok(())
}

/// Checks the code for a phone number and returns the application stored for
/// it, if there is one.
pub async fn confirm(
    storage: &dyn IntakeStorage,
    request: &ConfirmRequest,
) -> Result<Option<ApplicationView>, ConfirmationError> {
    let phone = normalize_phone(request.phone_number.as_ref());
    let code = normalize_code(request.confirmation_code.as_ref());
    let (phone, code) = match (phone, code) {
        (Some(_), SubmittedCode::Missing) | (None, _) => {
            return Err(ConfirmationError::MissingFields);
        }
        (Some(phone), code) => (phone, code),
    };

    let record = storage
        .find_phone_number(&phone)
        .await?
        .ok_or(ConfirmationError::Incorrect)?;

    let confirmed = match (record.confirmation_code, code) {
        (Some(stored), SubmittedCode::Code(submitted)) => i64::from(stored) == submitted,
        _ => false,
    };
    if !confirmed {
        tracing::debug!("Confirmation code mismatch");
        return Err(ConfirmationError::Incorrect);
    }

    let application = storage.find_application_by_phone(&phone).await?;
    Ok(application.map(|tree| tree.into_view()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use intake_core::ApplicationAttributes;
    use intake_db_memory::InMemoryStorage;
    use intake_storage::Transaction;
    use serde_json::json;

    fn confirm_request(value: Value) -> ConfirmRequest {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn code_normalization() {
        assert_eq!(normalize_code(None), SubmittedCode::Missing);
        assert_eq!(normalize_code(Some(&json!(null))), SubmittedCode::Missing);
        assert_eq!(normalize_code(Some(&json!(""))), SubmittedCode::Missing);
        assert_eq!(normalize_code(Some(&json!(0))), SubmittedCode::Missing);
        assert_eq!(normalize_code(Some(&json!(false))), SubmittedCode::Missing);
        assert_eq!(normalize_code(Some(&json!(8585))), SubmittedCode::Code(8585));
        assert_eq!(normalize_code(Some(&json!("8585"))), SubmittedCode::Code(8585));
        assert_eq!(normalize_code(Some(&json!(8585.0))), SubmittedCode::Code(8585));
        assert_eq!(normalize_code(Some(&json!("85a5"))), SubmittedCode::Unparsable);
        assert_eq!(normalize_code(Some(&json!(85.5))), SubmittedCode::Unparsable);
    }

    #[test]
    fn phone_normalization() {
        assert_eq!(normalize_phone(Some(&json!("5551234"))).as_deref(), Some("5551234"));
        assert_eq!(normalize_phone(Some(&json!(5551234))).as_deref(), Some("5551234"));
        assert_eq!(normalize_phone(Some(&json!(""))), None);
        assert_eq!(normalize_phone(Some(&json!(0))), None);
        assert_eq!(normalize_phone(None), None);
    }

    #[tokio::test]
    async fn request_code_requires_phone() {
        let storage = InMemoryStorage::new();
        let err = request_code(&storage, &ValidateRequest::default(), 8585)
            .await
            .unwrap_err();
        assert!(matches!(err, ConfirmationError::MissingPhoneNumber));
        assert_eq!(err.to_string(), "Phone number must be included in request.");
    }

    #[tokio::test]
    async fn confirm_round_trip() {
        let storage = InMemoryStorage::new();
        let validate = ValidateRequest {
            phone_number: Some(json!("5551234")),
        };
        request_code(&storage, &validate, 8585).await.unwrap();
        // Requesting again reuses the number
        request_code(&storage, &validate, 8585).await.unwrap();

        let none = confirm(
            &storage,
            &confirm_request(json!({ "phoneNumber": "5551234", "confirmationCode": "8585" })),
        )
        .await
        .unwrap();
        assert!(none.is_none());

        let tx = storage.begin_transaction().await.unwrap();
        let app = tx
            .create_application(&ApplicationAttributes {
                phone_number: Some("5551234".into()),
                ..Default::default()
            })
            .await
            .unwrap();
        tx.commit().await.unwrap();

        let view = confirm(
            &storage,
            &confirm_request(json!({ "phoneNumber": "5551234", "confirmationCode": 8585 })),
        )
        .await
        .unwrap()
        .unwrap();
        assert_eq!(view.application.id, app.id);
        assert!(view.members.is_empty());
    }

    #[tokio::test]
    async fn confirm_rejects_missing_and_wrong_values() {
        let storage = InMemoryStorage::new();
        request_code(
            &storage,
            &ValidateRequest {
                phone_number: Some(json!("5551234")),
            },
            8585,
        )
        .await
        .unwrap();

        let cases = [
            json!({ "phoneNumber": "5551234" }),
            json!({ "confirmationCode": 8585 }),
            json!({ "phoneNumber": "5551234", "confirmationCode": 0 }),
        ];
        for body in cases {
            let err = confirm(&storage, &confirm_request(body)).await.unwrap_err();
            assert!(matches!(err, ConfirmationError::MissingFields));
        }

        let cases = [
            json!({ "phoneNumber": "5550000", "confirmationCode": 8585 }),
            json!({ "phoneNumber": "5551234", "confirmationCode": 1234 }),
            json!({ "phoneNumber": "5551234", "confirmationCode": "abc" }),
        ];
        for body in cases {
            let err = confirm(&storage, &confirm_request(body)).await.unwrap_err();
            assert!(matches!(err, ConfirmationError::Incorrect));
            assert_eq!(err.to_string(), "Phone number or confirmation code is incorrect.");
        }
    }
}
