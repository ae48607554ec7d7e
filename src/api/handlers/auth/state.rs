//! Portal state and configuration shared by the auth handlers.

use std::sync::Arc;

use crate::protect::FieldCodec;
use crate::ratelimit::RateLimiter;

const DEFAULT_RESET_TOKEN_TTL_SECONDS: i64 = 30 * 60;
const DEFAULT_VERIFY_TOKEN_TTL_SECONDS: i64 = 24 * 60 * 60;
const DEFAULT_SESSION_TTL_SECONDS: i64 = crate::session::DEFAULT_TTL_SECONDS;

#[derive(Clone, Debug)]
pub struct PortalConfig {
    frontend_base_url: String,
    reset_token_ttl_seconds: i64,
    verify_token_ttl_seconds: i64,
    session_ttl_seconds: i64,
}

impl PortalConfig {
    #[must_use]
    pub fn new(frontend_base_url: String) -> Self {
        Self {
            frontend_base_url,
            reset_token_ttl_seconds: DEFAULT_RESET_TOKEN_TTL_SECONDS,
            verify_token_ttl_seconds: DEFAULT_VERIFY_TOKEN_TTL_SECONDS,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
        }
    }

    #[must_use]
    pub fn with_reset_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.reset_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_verify_token_ttl_seconds(mut self, seconds: i64) -> Self {
        self.verify_token_ttl_seconds = seconds;
        self
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, seconds: i64) -> Self {
        self.session_ttl_seconds = seconds;
        self
    }

    pub(crate) fn frontend_base_url(&self) -> &str {
        &self.frontend_base_url
    }

    pub(super) fn reset_token_ttl_seconds(&self) -> i64 {
        self.reset_token_ttl_seconds
    }

    pub(super) fn verify_token_ttl_seconds(&self) -> i64 {
        self.verify_token_ttl_seconds
    }

    pub(super) fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    pub(super) fn session_cookie_secure(&self) -> bool {
        self.frontend_base_url.starts_with("https://")
    }
}

pub struct PortalState {
    config: PortalConfig,
    codec: FieldCodec,
    rate_limiter: Arc<dyn RateLimiter>,
}

impl PortalState {
    pub fn new(config: PortalConfig, codec: FieldCodec, rate_limiter: Arc<dyn RateLimiter>) -> Self {
        Self {
            config,
            codec,
            rate_limiter,
        }
    }

    #[must_use]
    pub fn config(&self) -> &PortalConfig {
        &self.config
    }

    #[must_use]
    pub fn codec(&self) -> &FieldCodec {
        &self.codec
    }

    pub(super) fn rate_limiter(&self) -> &dyn RateLimiter {
        self.rate_limiter.as_ref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protect::Keyring;
    use crate::ratelimit::NoopRateLimiter;

    #[test]
    fn portal_config_defaults_and_overrides() {
        let config = PortalConfig::new("https://portal.example".to_string());

        assert_eq!(config.frontend_base_url(), "https://portal.example");
        assert_eq!(
            config.reset_token_ttl_seconds(),
            super::DEFAULT_RESET_TOKEN_TTL_SECONDS
        );
        assert_eq!(
            config.verify_token_ttl_seconds(),
            super::DEFAULT_VERIFY_TOKEN_TTL_SECONDS
        );
        assert!(config.session_cookie_secure());

        let config = config
            .with_reset_token_ttl_seconds(120)
            .with_verify_token_ttl_seconds(600)
            .with_session_ttl_seconds(3600);

        assert_eq!(config.reset_token_ttl_seconds(), 120);
        assert_eq!(config.verify_token_ttl_seconds(), 600);
        assert_eq!(config.session_ttl_seconds(), 3600);
    }

    #[test]
    fn plain_http_frontend_disables_secure_cookie() {
        let config = PortalConfig::new("http://localhost:5173".to_string());
        assert!(!config.session_cookie_secure());
    }

    #[test]
    fn portal_state_exposes_codec() {
        let keyring = Keyring::new(0, [(0, [1u8; 32])].into()).expect("keyring");
        let codec = FieldCodec::new(keyring, vec![2u8; 32]);
        let state = PortalState::new(
            PortalConfig::new("https://portal.example".to_string()),
            codec,
            Arc::new(NoopRateLimiter),
        );
        let digest = state.codec().digest("user@example.com");
        assert_eq!(digest.len(), crate::protect::digest::DIGEST_LEN);
    }
}
