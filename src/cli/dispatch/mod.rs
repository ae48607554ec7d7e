//! Command-line argument dispatch and server initialization.
//!
//! This module parses validated CLI arguments and maps them to the appropriate
//! action, such as starting the API server with its full configuration state.

use crate::cli::actions::{Action, server::Args};
use crate::cli::commands::{auth, keys};
use anyhow::{Context, Result};
use secrecy::SecretString;

/// Map validated CLI matches to a server action.
///
/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let dsn = matches
        .get_one::<String>("dsn")
        .cloned()
        .context("missing required argument: --dsn")?;

    let key_opts = keys::Options::parse(matches)?;
    let auth_opts = auth::Options::parse(matches)?;

    Ok(Action::Server(Args {
        port,
        dsn,
        field_keys: SecretString::from(key_opts.field_keys),
        active_epoch: key_opts.active_epoch,
        digest_key: SecretString::from(key_opts.digest_key),
        frontend_base_url: auth_opts.frontend_base_url,
        reset_token_ttl_seconds: auth_opts.reset_token_ttl_seconds,
        verify_token_ttl_seconds: auth_opts.verify_token_ttl_seconds,
        session_ttl_seconds: auth_opts.session_ttl_seconds,
    }))
}
