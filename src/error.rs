//! Closed error taxonomy for the security core.
//!
//! Every component returns `Result<T, SecurityError>` so callers match on one
//! set of variants instead of ad hoc truthy tuples. Handlers map variants to a
//! machine-readable [`ErrorCode`] and an HTTP status; crypto and internal
//! details never cross that boundary.

use axum::http::StatusCode;
use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::protect::CryptoError;

#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("{0}")]
    Validation(String),
    #[error("crypto failure")]
    Crypto(#[from] CryptoError),
    #[error("not found")]
    NotFound,
    #[error("token expired")]
    Expired,
    #[error("token already used")]
    AlreadyUsed,
    #[error("token subject mismatch")]
    SubjectMismatch,
    #[error("locked until {locked_until}")]
    Locked { locked_until: DateTime<Utc> },
    #[error("internal error")]
    Internal(#[source] anyhow::Error),
}

impl SecurityError {
    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        Self::Internal(err.into())
    }

    #[must_use]
    pub const fn code(&self) -> ErrorCode {
        match self {
            Self::Validation(_) => ErrorCode::ValidationFailed,
            Self::Crypto(_) | Self::Internal(_) => ErrorCode::Internal,
            // Token states collapse to one code so callers cannot probe which
            // stage of verification rejected them.
            Self::NotFound | Self::Expired | Self::AlreadyUsed | Self::SubjectMismatch => {
                ErrorCode::InvalidToken
            }
            Self::Locked { .. } => ErrorCode::AccountLocked,
        }
    }

    /// The message safe to show callers. Token states share one phrase and
    /// internal detail never leaves the logs.
    #[must_use]
    pub fn public_message(&self) -> String {
        match self {
            Self::Validation(message) => message.clone(),
            Self::NotFound | Self::Expired | Self::AlreadyUsed | Self::SubjectMismatch => {
                "Invalid or expired token".to_string()
            }
            Self::Locked { locked_until } => {
                crate::lockout::locked_message(*locked_until, Utc::now())
            }
            Self::Crypto(_) | Self::Internal(_) => "Internal error".to_string(),
        }
    }

    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::NotFound | Self::Expired | Self::AlreadyUsed | Self::SubjectMismatch => {
                StatusCode::BAD_REQUEST
            }
            Self::Locked { .. } => StatusCode::TOO_MANY_REQUESTS,
            Self::Crypto(_) | Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for SecurityError {
    fn from(err: sqlx::Error) -> Self {
        Self::Internal(err.into())
    }
}

/// Machine-readable codes surfaced in the `{success, message, code}` contract.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorCode {
    ValidationFailed,
    InvalidToken,
    InvalidCredentials,
    CredentialRequirementsNotMet,
    AccountLocked,
    Unauthorized,
    Internal,
}

impl ErrorCode {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::InvalidToken => "INVALID_TOKEN",
            Self::InvalidCredentials => "INVALID_CREDENTIALS",
            Self::CredentialRequirementsNotMet => "CREDENTIAL_REQUIREMENTS_NOT_MET",
            Self::AccountLocked => "ACCOUNT_LOCKED",
            Self::Unauthorized => "UNAUTHORIZED",
            Self::Internal => "INTERNAL_ERROR",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn token_states_collapse_to_invalid_token() {
        for err in [
            SecurityError::NotFound,
            SecurityError::Expired,
            SecurityError::AlreadyUsed,
            SecurityError::SubjectMismatch,
        ] {
            assert_eq!(err.code(), ErrorCode::InvalidToken);
            assert_eq!(err.status(), StatusCode::BAD_REQUEST);
        }
    }

    #[test]
    fn lockout_maps_to_429() {
        let err = SecurityError::Locked {
            locked_until: Utc::now(),
        };
        assert_eq!(err.code(), ErrorCode::AccountLocked);
        assert_eq!(err.status(), StatusCode::TOO_MANY_REQUESTS);
    }

    #[test]
    fn internal_errors_stay_generic() {
        let err = SecurityError::internal(anyhow::anyhow!("pool exhausted"));
        assert_eq!(err.code(), ErrorCode::Internal);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(err.to_string(), "internal error");
    }

    #[test]
    fn validation_surfaces_detail() {
        let err = SecurityError::Validation("missing token".to_string());
        assert_eq!(err.to_string(), "missing token");
        assert_eq!(err.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn public_messages_hide_token_state() {
        for err in [
            SecurityError::NotFound,
            SecurityError::Expired,
            SecurityError::AlreadyUsed,
            SecurityError::SubjectMismatch,
        ] {
            assert_eq!(err.public_message(), "Invalid or expired token");
        }
    }

    #[test]
    fn error_codes_are_screaming_snake() {
        for code in [
            ErrorCode::ValidationFailed,
            ErrorCode::InvalidToken,
            ErrorCode::InvalidCredentials,
            ErrorCode::CredentialRequirementsNotMet,
            ErrorCode::AccountLocked,
            ErrorCode::Unauthorized,
            ErrorCode::Internal,
        ] {
            assert!(code
                .as_str()
                .chars()
                .all(|c| c.is_ascii_uppercase() || c == '_'));
        }
    }
}
