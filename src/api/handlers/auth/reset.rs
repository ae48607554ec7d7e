//! Password reset: opaque request, token-gated confirm.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use crate::credential::{hash_secret, validate_new_password};
use crate::error::{ErrorCode, SecurityError};
use crate::lockout::{self, ActionClass};
use crate::ratelimit::{RateLimitAction, RateLimitDecision};
use crate::session;
use crate::token::{self, TokenPurpose};

use super::state::PortalState;
use super::storage::{enqueue_email, lookup_user_by_email_digest, update_password_hash};
use super::types::{
    error_response, failure_response, OperationResponse, PasswordResetConfirmRequest,
    PasswordResetRequest,
};
use super::utils::{build_reset_url, extract_client_ip, normalize_email, valid_email};

/// The one answer every reset request gets, known account or not.
fn generic_accepted() -> axum::response::Response {
    (
        StatusCode::OK,
        Json(OperationResponse::ok(
            "If the address is registered, a reset link is on its way",
        )),
    )
        .into_response()
}

/// Request a password reset link (always the same 200 to avoid enumeration).
#[utoipa::path(
    post,
    path = "/v1/auth/password-reset/request",
    request_body = PasswordResetRequest,
    responses(
        (status = 200, description = "Request accepted", body = OperationResponse)
    ),
    tag = "auth"
)]
pub async fn password_reset_request(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    portal: Extension<Arc<PortalState>>,
    payload: Option<Json<PasswordResetRequest>>,
) -> impl IntoResponse {
    let request: PasswordResetRequest = match payload {
        Some(Json(payload)) => payload,
        None => {
            return failure_response(
                StatusCode::BAD_REQUEST,
                "Missing payload",
                ErrorCode::ValidationFailed,
            )
        }
    };

    let email = normalize_email(&request.email);
    if !valid_email(&email) {
        // Malformed addresses get the same answer as unknown ones.
        return generic_accepted();
    }

    let client_ip = extract_client_ip(&headers);
    if portal
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::PasswordReset)
        == RateLimitDecision::Limited
        || portal
            .rate_limiter()
            .check_email(&email, RateLimitAction::PasswordReset)
            == RateLimitDecision::Limited
    {
        // Rate-limited requests stay opaque too.
        return generic_accepted();
    }

    let email_digest = portal.codec().digest(&email);
    let user = match lookup_user_by_email_digest(&pool, &email_digest).await {
        Ok(user) => user,
        Err(err) => {
            error!("Failed to lookup user for password reset: {err:#}");
            return generic_accepted();
        }
    };
    let Some(user) = user.filter(|user| user.status == "active") else {
        return generic_accepted();
    };

    // Each request counts toward the lockout window, and a request during an
    // active lock extends it. Locked subjects get the generic answer with no
    // token issued.
    let outcome = match lockout::record_failure(&pool, user.id, ActionClass::PasswordResetRequest)
        .await
    {
        Ok(outcome) => outcome,
        Err(err) => {
            error!("Failed to record reset request: {err:#}");
            return generic_accepted();
        }
    };
    if outcome.status.locked {
        return generic_accepted();
    }

    let issued = match token::issue(
        &pool,
        user.id,
        TokenPurpose::PasswordReset,
        portal.config().reset_token_ttl_seconds(),
    )
    .await
    {
        Ok(issued) => issued,
        Err(err) => {
            error!("Failed to issue reset token: {err:#}");
            return generic_accepted();
        }
    };

    let reset_url = build_reset_url(portal.config().frontend_base_url(), &issued.token);
    let payload = serde_json::json!({
        "reset_url": reset_url,
        "expires_at": issued.expires_at,
    });
    if let Err(err) = enqueue_email(&pool, &user.email_enc, "password_reset", &payload).await {
        error!("Failed to enqueue reset email: {err:#}");
    }

    generic_accepted()
}

/// Confirm a reset: burn the token and set the new password.
#[utoipa::path(
    post,
    path = "/v1/auth/password-reset/confirm",
    request_body = PasswordResetConfirmRequest,
    responses(
        (status = 200, description = "Password updated", body = OperationResponse),
        (status = 400, description = "Invalid token or weak password", body = OperationResponse)
    ),
    tag = "auth"
)]
pub async fn password_reset_confirm(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    portal: Extension<Arc<PortalState>>,
    payload: Option<Json<PasswordResetConfirmRequest>>,
) -> impl IntoResponse {
    let request: PasswordResetConfirmRequest = match payload {
        Some(Json(payload)) => payload,
        None => {
            return failure_response(
                StatusCode::BAD_REQUEST,
                "Missing payload",
                ErrorCode::ValidationFailed,
            )
        }
    };

    let token = request.token.trim();
    if token.is_empty() {
        return failure_response(
            StatusCode::BAD_REQUEST,
            "Missing token",
            ErrorCode::ValidationFailed,
        );
    }

    let client_ip = extract_client_ip(&headers);
    if portal
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::PasswordReset)
        == RateLimitDecision::Limited
    {
        return failure_response(
            StatusCode::TOO_MANY_REQUESTS,
            "Rate limited",
            ErrorCode::AccountLocked,
        );
    }

    // Password strength is checked before any token work so a weak password
    // does not burn the single-use token.
    if let Err(err) = validate_new_password(&request.new_password) {
        return failure_response(
            StatusCode::BAD_REQUEST,
            err.public_message(),
            ErrorCode::CredentialRequirementsNotMet,
        );
    }

    let subject_id = match token::lookup_subject(&pool, token, TokenPurpose::PasswordReset).await {
        Ok(Some(subject_id)) => subject_id,
        Ok(None) => return error_response("reset confirm", &SecurityError::NotFound),
        Err(err) => return error_response("reset confirm", &err),
    };

    let password_hash = match hash_secret(&request.new_password) {
        Ok(hash) => hash,
        Err(err) => return error_response("reset confirm", &SecurityError::Crypto(err)),
    };

    // Atomic single-use consume; a concurrent confirm with the same token
    // loses here.
    if let Err(err) = token::consume(&pool, token, subject_id, TokenPurpose::PasswordReset).await {
        return error_response("reset confirm", &err);
    }

    if let Err(err) = update_password_hash(&pool, subject_id, &password_hash).await {
        error!("Failed to store new password hash: {err:#}");
        return failure_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal error",
            ErrorCode::Internal,
        );
    }

    // A reset proves control of the mailbox: drop every live session and
    // start the lockout slate clean.
    if let Err(err) = session::revoke_all(&pool, subject_id, None).await {
        error!("Failed to revoke sessions after reset: {err:#}");
    }
    for class in [ActionClass::CredentialLogin, ActionClass::PasswordResetRequest] {
        if let Err(err) = lockout::clear_on_success(&pool, subject_id, class).await {
            error!("Failed to clear lockout after reset: {err:#}");
        }
    }

    (
        StatusCode::OK,
        Json(OperationResponse::ok("Password updated")),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::super::state::{PortalConfig, PortalState};
    use super::{password_reset_confirm, password_reset_request, PasswordResetConfirmRequest};
    use crate::protect::{FieldCodec, Keyring};
    use crate::ratelimit::{NoopRateLimiter, RateLimiter};
    use anyhow::Result;
    use axum::extract::Extension;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::Json;
    use sqlx::postgres::PgPoolOptions;
    use std::sync::Arc;

    fn portal_state() -> Result<Arc<PortalState>> {
        let keyring = Keyring::new(0, [(0, [5u8; 32])].into())?;
        let codec = FieldCodec::new(keyring, vec![6u8; 32]);
        let limiter: Arc<dyn RateLimiter> = Arc::new(NoopRateLimiter);
        Ok(Arc::new(PortalState::new(
            PortalConfig::new("https://portal.example".to_string()),
            codec,
            limiter,
        )))
    }

    #[tokio::test]
    async fn reset_request_missing_payload() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = password_reset_request(
            HeaderMap::new(),
            Extension(pool),
            Extension(portal_state()?),
            None,
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn reset_confirm_empty_token() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = password_reset_confirm(
            HeaderMap::new(),
            Extension(pool),
            Extension(portal_state()?),
            Some(Json(PasswordResetConfirmRequest {
                token: " ".to_string(),
                new_password: "CorrectHorse9!".to_string(),
            })),
        )
        .await
        .into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }

    #[tokio::test]
    async fn reset_confirm_rejects_weak_password_before_token_lookup() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = password_reset_confirm(
            HeaderMap::new(),
            Extension(pool),
            Extension(portal_state()?),
            Some(Json(PasswordResetConfirmRequest {
                token: "some-token".to_string(),
                new_password: "short".to_string(),
            })),
        )
        .await
        .into_response();
        // No live database behind the lazy pool: reaching 400 proves the
        // strength check ran before any query.
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        Ok(())
    }
}
