//! Session endpoints and cookie plumbing.

use axum::{
    extract::Extension,
    http::{
        header::{InvalidHeaderValue, AUTHORIZATION, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::IntoResponse,
    Json,
};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use crate::protect::{ProtectedField, Tier};
use crate::session as session_store;

use super::state::{PortalConfig, PortalState};
use super::storage::fetch_user_email_enc;
use super::types::SessionResponse;

const SESSION_COOKIE_NAME: &str = "gardi_session";

#[utoipa::path(
    get,
    path = "/v1/auth/session",
    responses(
        (status = 200, description = "Session is active", body = SessionResponse),
        (status = 204, description = "No active session")
    ),
    tag = "auth"
)]
pub async fn session(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    portal: Extension<Arc<PortalState>>,
) -> impl IntoResponse {
    // Missing cookies are treated as "no session" to avoid leaking auth state.
    let Some(token) = extract_session_token(&headers) else {
        return StatusCode::NO_CONTENT.into_response();
    };
    let current = match session_store::validate(&pool, &token).await {
        Ok(current) => current,
        Err(err) => {
            error!("Failed to validate session: {err:#}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let Some(current) = current else {
        return StatusCode::NO_CONTENT.into_response();
    };

    let email_enc = match fetch_user_email_enc(&pool, current.user_id).await {
        Ok(Some(email_enc)) => email_enc,
        // Session outlived the account; report no session.
        Ok(None) => return StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            error!("Failed to fetch user for session: {err:#}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };
    let email = match portal
        .codec()
        .unprotect(&ProtectedField::from_bytes(email_enc), Tier::Strong)
    {
        Ok(email) => email,
        Err(err) => {
            error!("Failed to decrypt session email: {err}");
            return StatusCode::INTERNAL_SERVER_ERROR.into_response();
        }
    };

    let response = SessionResponse {
        user_id: current.user_id.to_string(),
        email,
    };
    (StatusCode::OK, Json(response)).into_response()
}

/// Resolve the session cookie or bearer token into a validated session.
///
/// Returns `Ok(None)` when the token is missing, unknown, expired, or
/// revoked.
pub(crate) async fn authenticate_session(
    headers: &HeaderMap,
    pool: &PgPool,
) -> Result<Option<session_store::Session>, StatusCode> {
    let Some(token) = extract_session_token(headers) else {
        return Ok(None);
    };
    match session_store::validate(pool, &token).await {
        Ok(current) => Ok(current),
        Err(err) => {
            error!("Failed to validate session: {err:#}");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}

#[utoipa::path(
    post,
    path = "/v1/auth/logout",
    responses(
        (status = 204, description = "Session cleared")
    ),
    tag = "auth"
)]
pub async fn logout(
    headers: HeaderMap,
    pool: Extension<PgPool>,
    portal: Extension<Arc<PortalState>>,
) -> impl IntoResponse {
    if let Some(token) = extract_session_token(&headers) {
        if let Err(err) = session_store::revoke(&pool, &token).await {
            error!("Failed to revoke session: {err:#}");
        }
    }

    // Always clear the cookie, even if the session record was missing.
    let mut response_headers = HeaderMap::new();
    if let Ok(cookie) = clear_session_cookie(portal.config()) {
        response_headers.insert(SET_COOKIE, cookie);
    }
    (StatusCode::NO_CONTENT, response_headers).into_response()
}

/// Build a secure `HttpOnly` cookie for the session token.
pub(super) fn session_cookie(
    config: &PortalConfig,
    token: &str,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let ttl_seconds = config.session_ttl_seconds();
    // Only mark cookies secure when the frontend is served over HTTPS.
    let secure = config.session_cookie_secure();
    let mut cookie = format!(
        "{SESSION_COOKIE_NAME}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(super) fn clear_session_cookie(
    config: &PortalConfig,
) -> Result<HeaderValue, InvalidHeaderValue> {
    let secure = config.session_cookie_secure();
    let mut cookie = format!("{SESSION_COOKIE_NAME}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0");
    if secure {
        cookie.push_str("; Secure");
    }
    HeaderValue::from_str(&cookie)
}

pub(super) fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(token) = extract_bearer_token(headers) {
        return Some(token);
    }
    let header = headers.get(axum::http::header::COOKIE)?;
    let value = header.to_str().ok()?;
    for pair in value.split(';') {
        // Pairs without '=' are skipped, not fatal to the scan.
        let Some((key, val)) = pair.trim().split_once('=') else {
            continue;
        };
        if key.trim() == SESSION_COOKIE_NAME {
            return Some(val.trim().to_string());
        }
    }
    None
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<String> {
    let value = headers.get(AUTHORIZATION)?.to_str().ok()?;
    let trimmed = value.trim();
    let token = trimmed
        .strip_prefix("Bearer ")
        .or_else(|| trimmed.strip_prefix("bearer "))?
        .trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extracts_cookie_token() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("other=1; gardi_session=abc123; theme=dark"),
        );
        assert_eq!(extract_session_token(&headers), Some("abc123".to_string()));
    }

    #[test]
    fn malformed_cookie_pairs_are_skipped() {
        let mut headers = HeaderMap::new();
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("junk; gardi_session=abc123"),
        );
        assert_eq!(extract_session_token(&headers), Some("abc123".to_string()));
    }

    #[test]
    fn prefers_bearer_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer tok"));
        headers.insert(
            axum::http::header::COOKIE,
            HeaderValue::from_static("gardi_session=cookie-token"),
        );
        assert_eq!(extract_session_token(&headers), Some("tok".to_string()));
    }

    #[test]
    fn empty_bearer_is_ignored() {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_static("Bearer "));
        assert_eq!(extract_session_token(&headers), None);
    }

    #[test]
    fn session_cookie_marks_secure_for_https() {
        let config = PortalConfig::new("https://portal.example".to_string());
        let cookie = session_cookie(&config, "tok").expect("cookie");
        let value = cookie.to_str().expect("ascii");
        assert!(value.contains("gardi_session=tok"));
        assert!(value.contains("HttpOnly"));
        assert!(value.ends_with("; Secure"));

        let config = PortalConfig::new("http://localhost:5173".to_string());
        let cookie = clear_session_cookie(&config).expect("cookie");
        let value = cookie.to_str().expect("ascii");
        assert!(value.contains("Max-Age=0"));
        assert!(!value.contains("Secure"));
    }
}
