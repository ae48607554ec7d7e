use crate::{
    api,
    protect::{FieldCodec, Keyring},
};
use anyhow::{Context, Result, anyhow};
use base64ct::{Base64, Encoding};
use secrecy::{ExposeSecret, SecretString};

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub dsn: String,
    pub field_keys: SecretString,
    pub active_epoch: u8,
    pub digest_key: SecretString,
    pub frontend_base_url: String,
    pub reset_token_ttl_seconds: i64,
    pub verify_token_ttl_seconds: i64,
    pub session_ttl_seconds: i64,
}

/// Execute the server action.
/// # Errors
/// Returns an error if key material is invalid or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let keyring = Keyring::from_spec(args.field_keys.expose_secret(), args.active_epoch)
        .context("invalid GARDI_FIELD_KEYS")?;

    let digest_key = Base64::decode_vec(args.digest_key.expose_secret().trim())
        .map_err(|_| anyhow!("GARDI_DIGEST_KEY is not valid base64"))?;
    if digest_key.len() < 16 {
        return Err(anyhow!("GARDI_DIGEST_KEY must decode to at least 16 bytes"));
    }

    let codec = FieldCodec::new(keyring, digest_key);

    let portal_config = api::handlers::auth::PortalConfig::new(args.frontend_base_url)
        .with_reset_token_ttl_seconds(args.reset_token_ttl_seconds)
        .with_verify_token_ttl_seconds(args.verify_token_ttl_seconds)
        .with_session_ttl_seconds(args.session_ttl_seconds);

    api::new(args.port, args.dsn, codec, portal_config).await
}
