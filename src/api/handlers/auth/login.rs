//! Password login.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use crate::credential::verify_password;
use crate::error::ErrorCode;
use crate::lockout::{self, ActionClass};
use crate::protect::{ProtectedField, Tier};
use crate::ratelimit::{RateLimitAction, RateLimitDecision};
use crate::session;

use super::session::session_cookie;
use super::state::PortalState;
use super::storage::lookup_user_by_email_digest;
use super::types::{failure_response, LoginRequest, OperationResponse, SessionResponse};
use super::utils::{extract_client_ip, extract_user_agent, normalize_email, valid_email};

/// One generic rejection for every credential failure so responses cannot be
/// used to probe which stage rejected the attempt.
fn invalid_credentials() -> axum::response::Response {
    failure_response(
        StatusCode::UNAUTHORIZED,
        "Invalid email or password",
        ErrorCode::InvalidCredentials,
    )
}

#[utoipa::path(
    post,
    path = "/v1/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login succeeded", body = SessionResponse),
        (status = 401, description = "Invalid credentials", body = OperationResponse),
        (status = 429, description = "Locked out or rate limited", body = OperationResponse)
    ),
    tag = "auth"
)]
pub async fn login(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    portal: Extension<Arc<PortalState>>,
    payload: Option<Json<LoginRequest>>,
) -> impl IntoResponse {
    let request: LoginRequest = match payload {
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
        // Malformed emails get the same rejection as wrong passwords.
        return invalid_credentials();
    }

    let client_ip = extract_client_ip(&headers);
    if portal
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::Login)
        == RateLimitDecision::Limited
        || portal
            .rate_limiter()
            .check_email(&email, RateLimitAction::Login)
            == RateLimitDecision::Limited
    {
        return failure_response(
            StatusCode::TOO_MANY_REQUESTS,
            "Rate limited",
            ErrorCode::AccountLocked,
        );
    }

    // Plaintext email never reaches the database; lookups go through the
    // keyed digest.
    let email_digest = portal.codec().digest(&email);
    let user = match lookup_user_by_email_digest(&pool, &email_digest).await {
        Ok(user) => user,
        Err(err) => {
            error!("Failed to lookup user for login: {err:#}");
            return failure_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal error",
                ErrorCode::Internal,
            );
        }
    };

    // Inactive accounts verify against a dummy hash so timing matches the
    // unknown-account path.
    let user = user.filter(|user| user.status == "active" && user.email_verified_at.is_some());

    if let Some(user) = &user {
        // The lock gate runs before any hash comparison; a correct password
        // during a lock must not be evaluated.
        match lockout::is_locked(&pool, user.id, ActionClass::CredentialLogin).await {
            Ok(status) if status.locked => {
                // The attempt still counts: continued abuse during an active
                // lock escalates and pushes the deadline further out.
                let locked_until =
                    match lockout::record_failure(&pool, user.id, ActionClass::CredentialLogin)
                        .await
                    {
                        Ok(outcome) => outcome.status.locked_until,
                        Err(err) => {
                            error!("Failed to record login attempt during lock: {err:#}");
                            status.locked_until
                        }
                    };
                let Some(locked_until) = locked_until else {
                    return invalid_credentials();
                };
                return failure_response(
                    StatusCode::TOO_MANY_REQUESTS,
                    lockout::locked_message(locked_until, chrono::Utc::now()),
                    ErrorCode::AccountLocked,
                );
            }
            Ok(_) => {}
            Err(err) => {
                error!("Failed to check login lockout: {err:#}");
                return failure_response(
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal error",
                    ErrorCode::Internal,
                );
            }
        }
    }

    let stored_hash = user.as_ref().and_then(|user| user.password_hash.as_deref());
    if !verify_password(&request.password, stored_hash) {
        if let Some(user) = &user {
            match lockout::record_failure(&pool, user.id, ActionClass::CredentialLogin).await {
                Ok(outcome) => {
                    if outcome.escalated
                        && ActionClass::CredentialLogin.revokes_sessions_on_lock()
                    {
                        if let Err(err) = session::revoke_all(&pool, user.id, None).await {
                            error!("Failed to revoke sessions on lockout: {err:#}");
                        }
                    }
                }
                Err(err) => error!("Failed to record login failure: {err:#}"),
            }
        }
        return invalid_credentials();
    }

    let user = match user {
        Some(user) => user,
        // Unknown account with a well-formed password: dummy verify already
        // burned above via the None hash path.
        None => return invalid_credentials(),
    };

    if let Err(err) = lockout::clear_on_success(&pool, user.id, ActionClass::CredentialLogin).await
    {
        error!("Failed to clear login failures: {err:#}");
    }

    let email_plain = match portal
        .codec()
        .unprotect(&ProtectedField::from_bytes(user.email_enc), Tier::Strong)
    {
        Ok(email) => email,
        Err(err) => {
            error!("Failed to decrypt email after login: {err}");
            return failure_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal error",
                ErrorCode::Internal,
            );
        }
    };

    let token = match session::create(
        &pool,
        user.id,
        portal.config().session_ttl_seconds(),
        client_ip.as_deref(),
        extract_user_agent(&headers).as_deref(),
    )
    .await
    {
        Ok(token) => token,
        Err(err) => {
            error!("Failed to create session: {err:#}");
            return failure_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal error",
                ErrorCode::Internal,
            );
        }
    };

    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = session_cookie(portal.config(), &token) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    let body = SessionResponse {
        user_id: user.id.to_string(),
        email: email_plain,
    };
    (StatusCode::OK, response_headers, Json(body)).into_response()
}
