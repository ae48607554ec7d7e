//! Account deletion, gated on the deletion PIN.

use axum::{
    extract::Extension,
    http::{header::SET_COOKIE, HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::{error, info};

use crate::credential::verify_pin;
use crate::error::ErrorCode;
use crate::lockout::{self, ActionClass};
use crate::ratelimit::{RateLimitAction, RateLimitDecision};
use crate::session;

use super::session::{authenticate_session, clear_session_cookie};
use super::state::PortalState;
use super::storage::{deactivate_user, fetch_user_secrets};
use super::types::{failure_response, DeleteAccountRequest, OperationResponse};
use super::utils::extract_client_ip;

#[utoipa::path(
    post,
    path = "/v1/account/delete",
    request_body = DeleteAccountRequest,
    responses(
        (status = 200, description = "Account deleted", body = OperationResponse),
        (status = 401, description = "No active session", body = OperationResponse),
        (status = 400, description = "Incorrect PIN", body = OperationResponse),
        (status = 429, description = "Locked out or rate limited", body = OperationResponse)
    ),
    tag = "account"
)]
pub async fn delete_account(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    portal: Extension<Arc<PortalState>>,
    payload: Option<Json<DeleteAccountRequest>>,
) -> impl IntoResponse {
    let request: DeleteAccountRequest = match payload {
        Some(Json(payload)) => payload,
        None => {
            return failure_response(
                StatusCode::BAD_REQUEST,
                "Missing payload",
                ErrorCode::ValidationFailed,
            )
        }
    };

    let current = match authenticate_session(&headers, &pool).await {
        Ok(Some(current)) => current,
        Ok(None) => {
            return failure_response(
                StatusCode::UNAUTHORIZED,
                "No active session",
                ErrorCode::Unauthorized,
            )
        }
        Err(status) => {
            return failure_response(status, "Internal error", ErrorCode::Internal);
        }
    };

    let client_ip = extract_client_ip(&headers);
    if portal
        .rate_limiter()
        .check_ip(client_ip.as_deref(), RateLimitAction::AccountDeletion)
        == RateLimitDecision::Limited
    {
        return failure_response(
            StatusCode::TOO_MANY_REQUESTS,
            "Rate limited",
            ErrorCode::AccountLocked,
        );
    }

    // The lock gate runs before the PIN is compared; a correct PIN during a
    // lock is rejected unseen.
    match lockout::is_locked(&pool, current.user_id, ActionClass::AccountDeletion).await {
        Ok(status) if status.locked => {
            // Attempts during an active lock escalate and extend it.
            let locked_until =
                match lockout::record_failure(&pool, current.user_id, ActionClass::AccountDeletion)
                    .await
                {
                    Ok(outcome) => outcome.status.locked_until,
                    Err(err) => {
                        error!("Failed to record deletion attempt during lock: {err:#}");
                        status.locked_until
                    }
                };
            let message = locked_until.map_or_else(
                || "Too many failed attempts".to_string(),
                |until| lockout::locked_message(until, chrono::Utc::now()),
            );
            return failure_response(
                StatusCode::TOO_MANY_REQUESTS,
                message,
                ErrorCode::AccountLocked,
            );
        }
        Ok(_) => {}
        Err(err) => {
            error!("Failed to check deletion lockout: {err:#}");
            return failure_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal error",
                ErrorCode::Internal,
            );
        }
    }

    let secrets = match fetch_user_secrets(&pool, current.user_id).await {
        Ok(Some(secrets)) if secrets.status == "active" => secrets,
        Ok(_) => {
            return failure_response(
                StatusCode::UNAUTHORIZED,
                "No active session",
                ErrorCode::Unauthorized,
            )
        }
        Err(err) => {
            error!("Failed to fetch account for deletion: {err:#}");
            return failure_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal error",
                ErrorCode::Internal,
            );
        }
    };

    if !verify_pin(&request.pin, secrets.pin_hash.as_deref()) {
        match lockout::record_failure(&pool, current.user_id, ActionClass::AccountDeletion).await {
            Ok(outcome) => {
                if outcome.escalated && ActionClass::AccountDeletion.revokes_sessions_on_lock() {
                    // Escalation here smells like a hijacked session; sign
                    // everything out.
                    if let Err(err) = session::revoke_all(&pool, current.user_id, None).await {
                        error!("Failed to revoke sessions on deletion lockout: {err:#}");
                    }
                    let mut response_headers = HeaderMap::new();
                    if let Ok(cookie) = clear_session_cookie(portal.config()) {
                        response_headers.insert(SET_COOKIE, cookie);
                    }
                    let message = outcome.status.locked_until.map_or_else(
                        || "Too many failed attempts".to_string(),
                        |until| lockout::locked_message(until, chrono::Utc::now()),
                    );
                    return (
                        StatusCode::TOO_MANY_REQUESTS,
                        response_headers,
                        Json(OperationResponse::failure(message, ErrorCode::AccountLocked)),
                    )
                        .into_response();
                }
            }
            Err(err) => error!("Failed to record deletion failure: {err:#}"),
        }
        return failure_response(
            StatusCode::BAD_REQUEST,
            "Incorrect PIN",
            ErrorCode::InvalidCredentials,
        );
    }

    if let Err(err) = lockout::clear_on_success(&pool, current.user_id, ActionClass::AccountDeletion)
        .await
    {
        error!("Failed to clear deletion failures: {err:#}");
    }

    if let Err(err) = deactivate_user(&pool, current.user_id).await {
        error!("Failed to deactivate account: {err:#}");
        return failure_response(
            StatusCode::INTERNAL_SERVER_ERROR,
            "Internal error",
            ErrorCode::Internal,
        );
    }
    if let Err(err) = session::revoke_all(&pool, current.user_id, None).await {
        error!("Failed to revoke sessions after deletion: {err:#}");
    }

    info!(user_id = %current.user_id, "Account deleted");

    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie(portal.config()) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (
        StatusCode::OK,
        response_headers,
        Json(OperationResponse::ok("Account deleted")),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::super::state::{PortalConfig, PortalState};
    use super::delete_account;
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
        let keyring = Keyring::new(0, [(0, [9u8; 32])].into())?;
        let codec = FieldCodec::new(keyring, vec![1u8; 32]);
        let limiter: Arc<dyn RateLimiter> = Arc::new(NoopRateLimiter);
        Ok(Arc::new(PortalState::new(
            PortalConfig::new("https://portal.example".to_string()),
            codec,
            limiter,
        )))
    }

    #[tokio::test]
    async fn delete_account_missing_payload() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = delete_account(
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
    async fn delete_account_requires_session() -> Result<()> {
        let pool = PgPoolOptions::new().connect_lazy("postgres://postgres@localhost/postgres")?;
        let response = delete_account(
            HeaderMap::new(),
            Extension(pool),
            Extension(portal_state()?),
            Some(Json(super::DeleteAccountRequest {
                pin: "12345678".to_string(),
            })),
        )
        .await
        .into_response();
        // No cookie or bearer token: rejected before any database work.
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
        Ok(())
    }
}
