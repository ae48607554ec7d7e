use clap::{Arg, ArgMatches, Command};

pub const ARG_FIELD_KEYS: &str = "field-keys";
pub const ARG_ACTIVE_EPOCH: &str = "active-epoch";
pub const ARG_DIGEST_KEY: &str = "digest-key";

#[derive(Debug, Clone)]
pub struct Options {
    pub field_keys: String,
    pub active_epoch: u8,
    pub digest_key: String,
}

impl Options {
    /// Parse key material arguments from matches.
    ///
    /// # Errors
    /// Returns an error if required arguments are missing or empty.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let require_non_empty = |id: &str| -> anyhow::Result<String> {
            match matches.get_one::<String>(id).cloned() {
                Some(value) if !value.trim().is_empty() => Ok(value),
                _ => anyhow::bail!("missing required argument: --{id}"),
            }
        };

        let field_keys = require_non_empty(ARG_FIELD_KEYS)?;
        let digest_key = require_non_empty(ARG_DIGEST_KEY)?;
        let active_epoch = matches
            .get_one::<u8>(ARG_ACTIVE_EPOCH)
            .copied()
            .unwrap_or(0);

        Ok(Self {
            field_keys,
            active_epoch,
            digest_key,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_FIELD_KEYS)
                .long(ARG_FIELD_KEYS)
                .help("Field encryption keys as epoch=base64 pairs, comma separated")
                .long_help(
                    "Field encryption keys as `epoch=base64` pairs, comma separated. Each key must decode to 32 bytes. Old epochs stay in the ring so previously written fields keep decrypting during rotation.",
                )
                .env("GARDI_FIELD_KEYS")
                .required(true),
        )
        .arg(
            Arg::new(ARG_ACTIVE_EPOCH)
                .long(ARG_ACTIVE_EPOCH)
                .help("Key epoch used for new encryptions")
                .env("GARDI_ACTIVE_EPOCH")
                .default_value("0")
                .value_parser(clap::value_parser!(u8)),
        )
        .arg(
            Arg::new(ARG_DIGEST_KEY)
                .long(ARG_DIGEST_KEY)
                .help("Base64 key for searchable field digests")
                .env("GARDI_DIGEST_KEY")
                .required(true),
        )
}
