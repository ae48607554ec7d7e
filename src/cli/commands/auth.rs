use clap::{Arg, ArgMatches, Command};

pub const ARG_FRONTEND_BASE_URL: &str = "frontend-base-url";
pub const ARG_RESET_TOKEN_TTL_SECONDS: &str = "reset-token-ttl-seconds";
pub const ARG_VERIFY_TOKEN_TTL_SECONDS: &str = "verify-token-ttl-seconds";
pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";

#[derive(Debug, Clone)]
pub struct Options {
    pub frontend_base_url: String,
    pub reset_token_ttl_seconds: i64,
    pub verify_token_ttl_seconds: i64,
    pub session_ttl_seconds: i64,
}

impl Options {
    /// Parse portal auth arguments from matches.
    ///
    /// # Errors
    /// Returns an error if required arguments are missing.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let frontend_base_url = match matches.get_one::<String>(ARG_FRONTEND_BASE_URL).cloned() {
            Some(value) if !value.trim().is_empty() => value,
            _ => anyhow::bail!("missing required argument: --{ARG_FRONTEND_BASE_URL}"),
        };

        let get_i64 = |id: &str, default: i64| {
            matches.get_one::<i64>(id).copied().unwrap_or(default)
        };

        Ok(Self {
            frontend_base_url,
            reset_token_ttl_seconds: get_i64(ARG_RESET_TOKEN_TTL_SECONDS, 1800),
            verify_token_ttl_seconds: get_i64(ARG_VERIFY_TOKEN_TTL_SECONDS, 86400),
            session_ttl_seconds: get_i64(ARG_SESSION_TTL_SECONDS, 604_800),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_FRONTEND_BASE_URL)
                .long(ARG_FRONTEND_BASE_URL)
                .help("Frontend base URL used for reset and verification links")
                .env("GARDI_FRONTEND_BASE_URL")
                .default_value("https://gardi.dev"),
        )
        .arg(
            Arg::new(ARG_RESET_TOKEN_TTL_SECONDS)
                .long(ARG_RESET_TOKEN_TTL_SECONDS)
                .help("Password reset token TTL in seconds")
                .env("GARDI_RESET_TOKEN_TTL_SECONDS")
                .default_value("1800")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_VERIFY_TOKEN_TTL_SECONDS)
                .long(ARG_VERIFY_TOKEN_TTL_SECONDS)
                .help("Email verification token TTL in seconds")
                .env("GARDI_VERIFY_TOKEN_TTL_SECONDS")
                .default_value("86400")
                .value_parser(clap::value_parser!(i64)),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Session cookie TTL in seconds")
                .env("GARDI_SESSION_TTL_SECONDS")
                .default_value("604800")
                .value_parser(clap::value_parser!(i64)),
        )
}
