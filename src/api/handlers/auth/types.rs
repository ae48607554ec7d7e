//! Request/response types for the auth endpoints.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use serde::{Deserialize, Serialize};
use tracing::error;
use utoipa::ToSchema;

use crate::error::{ErrorCode, SecurityError};

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct PasswordResetRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct PasswordResetConfirmRequest {
    pub token: String,
    pub new_password: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct VerifyEmailRequest {
    pub token: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct ResendVerificationRequest {
    pub email: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct DeleteAccountRequest {
    pub pin: String,
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct SessionResponse {
    pub user_id: String,
    pub email: String,
}

/// Uniform result envelope for state-changing operations.
#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct OperationResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

impl OperationResponse {
    pub(super) fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            code: None,
        }
    }

    pub(super) fn failure(message: impl Into<String>, code: ErrorCode) -> Self {
        Self {
            success: false,
            message: message.into(),
            code: Some(code.as_str().to_string()),
        }
    }
}

/// Map a [`SecurityError`] to its HTTP response, hiding internal detail.
pub(super) fn error_response(context: &str, err: &SecurityError) -> Response {
    if matches!(err, SecurityError::Internal(_) | SecurityError::Crypto(_)) {
        error!("{context}: {err:#}");
    }
    let body = OperationResponse::failure(err.public_message(), err.code());
    (err.status(), Json(body)).into_response()
}

/// Shorthand for a failed operation with an explicit status and code.
pub(super) fn failure_response(
    status: StatusCode,
    message: impl Into<String>,
    code: ErrorCode,
) -> Response {
    (status, Json(OperationResponse::failure(message, code))).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;

    #[test]
    fn operation_response_omits_code_on_success() -> Result<()> {
        let value = serde_json::to_value(OperationResponse::ok("done"))?;
        assert_eq!(value.get("success"), Some(&serde_json::json!(true)));
        assert!(value.get("code").is_none());
        Ok(())
    }

    #[test]
    fn operation_response_carries_code_on_failure() -> Result<()> {
        let value = serde_json::to_value(OperationResponse::failure(
            "Invalid credentials",
            ErrorCode::InvalidCredentials,
        ))?;
        assert_eq!(
            value.get("code"),
            Some(&serde_json::json!("INVALID_CREDENTIALS"))
        );
        assert_eq!(value.get("success"), Some(&serde_json::json!(false)));
        Ok(())
    }

    #[test]
    fn login_request_round_trips() -> Result<()> {
        let request = LoginRequest {
            email: "alice@example.com".to_string(),
            password: "hunter2hunter2".to_string(),
        };
        let value = serde_json::to_value(&request)?;
        let decoded: LoginRequest = serde_json::from_value(value)?;
        assert_eq!(decoded.email, "alice@example.com");
        Ok(())
    }
}
