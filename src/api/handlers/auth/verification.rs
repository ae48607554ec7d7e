//! Email verification endpoints.

use axum::{
    extract::Extension,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use crate::error::{ErrorCode, SecurityError};
use crate::ratelimit::{RateLimitAction, RateLimitDecision};
use crate::token::{self, TokenPurpose};

use super::state::PortalState;
use super::storage::{enqueue_email, lookup_user_by_email_digest, mark_email_verified};
use super::types::{
    error_response, failure_response, OperationResponse, ResendVerificationRequest,
    VerifyEmailRequest,
};
use super::utils::{build_verify_url, extract_client_ip, normalize_email, valid_email};

/// Verify the email link by consuming the hashed token and activating the
/// account.
#[utoipa::path(
    post,
    path = "/v1/auth/verify-email",
    request_body = VerifyEmailRequest,
    responses(
        (status = 204, description = "Email verified"),
        (status = 400, description = "Invalid or expired token", body = OperationResponse),
        (status = 429, description = "Rate limited", body = OperationResponse)
    ),
    tag = "auth"
)]
pub async fn verify_email(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    portal: Extension<Arc<PortalState>>,
    payload: Option<Json<VerifyEmailRequest>>,
) -> impl IntoResponse {
    let request: VerifyEmailRequest = match payload {
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
        .check_ip(client_ip.as_deref(), RateLimitAction::VerifyEmail)
        == RateLimitDecision::Limited
    {
        // Rate limits run before any token work to avoid amplification.
        return failure_response(
            StatusCode::TOO_MANY_REQUESTS,
            "Rate limited",
            ErrorCode::AccountLocked,
        );
    }

    let subject_id = match token::lookup_subject(&pool, token, TokenPurpose::EmailVerification).await
    {
        Ok(Some(subject_id)) => subject_id,
        Ok(None) => return error_response("verify email", &SecurityError::NotFound),
        Err(err) => return error_response("verify email", &err),
    };

    if let Err(err) =
        token::consume(&pool, token, subject_id, TokenPurpose::EmailVerification).await
    {
        return error_response("verify email", &err);
    }

    if let Err(err) = mark_email_verified(&pool, subject_id).await {
        error!("Failed to activate verified account: {err:#}");
        return failure_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal error",
            ErrorCode::Internal,
        );
    }

    StatusCode::NO_CONTENT.into_response()
}

/// Resend a verification email (always returns 204 to avoid user enumeration).
#[utoipa::path(
    post,
    path = "/v1/auth/resend-verification",
    request_body = ResendVerificationRequest,
    responses(
        (status = 204, description = "Resend accepted")
    ),
    tag = "auth"
)]
pub async fn resend_verification(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    portal: Extension<Arc<PortalState>>,
    payload: Option<Json<ResendVerificationRequest>>,
) -> impl IntoResponse {
    let request: ResendVerificationRequest = match payload {
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
        // Always return 204 for invalid emails to avoid account probing.
        return StatusCode::NO_CONTENT.into_response();
    }

    let client_ip = extract_client_ip(&headers);
    if portal
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::ResendVerification)
        == RateLimitDecision::Limited
        || portal
            .rate_limiter()
            .check_email(&email, RateLimitAction::ResendVerification)
            == RateLimitDecision::Limited
    {
        // Resend is intentionally opaque; rate limits still return 204.
        return StatusCode::NO_CONTENT.into_response();
    }

    let email_digest = portal.codec().digest(&email);
    let user = match lookup_user_by_email_digest(&pool, &email_digest).await {
        Ok(user) => user,
        Err(err) => {
            error!("Failed to lookup user for resend: {err:#}");
            return StatusCode::NO_CONTENT.into_response();
        }
    };
    // Only pending accounts have anything to verify.
    let Some(user) =
        user.filter(|user| user.status == "pending" && user.email_verified_at.is_none())
    else {
        return StatusCode::NO_CONTENT.into_response();
    };

    let issued = match token::issue(
        &pool,
        user.id,
        TokenPurpose::EmailVerification,
        portal.config().verify_token_ttl_seconds(),
    )
    .await
    {
        Ok(issued) => issued,
        Err(err) => {
            error!("Failed to issue verification token: {err:#}");
            return StatusCode::NO_CONTENT.into_response();
        }
    };

    let verify_url = build_verify_url(portal.config().frontend_base_url(), &issued.token);
    let payload = serde_json::json!({
        "verify_url": verify_url,
        "expires_at": issued.expires_at,
    });
    if let Err(err) = enqueue_email(&pool, &user.email_enc, "verify_email", &payload).await {
        error!("Failed to enqueue verification email: {err:#}");
    }

    StatusCode::NO_CONTENT.into_response()
}
