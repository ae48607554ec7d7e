use chrono::{DateTime, Utc};
use uuid::Uuid;

/// Purpose a token was issued for; at most one live token per subject+purpose.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenPurpose {
    PasswordReset,
    EmailVerification,
}

impl TokenPurpose {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::PasswordReset => "password_reset",
            Self::EmailVerification => "email_verification",
        }
    }
}

/// Raw token plus expiry, returned once at issue time. Only the hash is stored.
#[derive(Debug)]
pub struct IssuedToken {
    pub token: String,
    pub expires_at: DateTime<Utc>,
}

/// Stored token state needed to classify a verification attempt.
#[derive(Debug, sqlx::FromRow)]
pub struct TokenRow {
    pub subject_id: Uuid,
    pub expires_at: DateTime<Utc>,
    pub consumed_at: Option<DateTime<Utc>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn purpose_labels_are_stable() {
        // These strings are persisted; changing them orphans stored tokens.
        assert_eq!(TokenPurpose::PasswordReset.as_str(), "password_reset");
        assert_eq!(TokenPurpose::EmailVerification.as_str(), "email_verification");
    }
}
