use anyhow::Context;
use clap::{Arg, ArgMatches, Command, builder::PossibleValuesParser};
use secrecy::SecretString;

use crate::grantor::{
    codec::Algorithm,
    store::{
        DEFAULT_ACCESS_TOKEN_TTL_SECONDS, DEFAULT_AUTHORIZATION_CODE_TTL_SECONDS,
        DEFAULT_REFRESH_TOKEN_TTL_SECONDS,
    },
};

pub const ARG_SIGNING_KEY: &str = "signing-key";
pub const ARG_SIGNING_KEY_ID: &str = "signing-key-id";
pub const ARG_SIGNING_ALGORITHM: &str = "signing-algorithm";
pub const ARG_ACCESS_TOKEN_TTL_SECONDS: &str = "access-token-ttl-seconds";
pub const ARG_REFRESH_TOKEN_TTL_SECONDS: &str = "refresh-token-ttl-seconds";
pub const ARG_AUTHORIZATION_CODE_TTL_SECONDS: &str = "authorization-code-ttl-seconds";

#[derive(Debug)]
pub struct Options {
    pub signing_key: SecretString,
    pub signing_key_id: Option<String>,
    pub signing_algorithm: Algorithm,
    pub access_token_ttl_seconds: i64,
    pub refresh_token_ttl_seconds: i64,
    pub authorization_code_ttl_seconds: i64,
}

impl Options {
    /// Parse token signing and lifetime arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the signing key is missing or the algorithm is unknown.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let signing_key = match matches.get_one::<String>(ARG_SIGNING_KEY) {
            Some(value) if !value.trim().is_empty() => SecretString::from(value.clone()),
            _ => anyhow::bail!("missing required argument: --{ARG_SIGNING_KEY}"),
        };

        let signing_algorithm = matches
            .get_one::<String>(ARG_SIGNING_ALGORITHM)
            .map_or(Ok(Algorithm::default()), |alg| alg.parse())
            .context("invalid signing algorithm")?;

        let ttl = |id: &str, default: i64| matches.get_one::<i64>(id).copied().unwrap_or(default);

        Ok(Self {
            signing_key,
            signing_key_id: matches
                .get_one::<String>(ARG_SIGNING_KEY_ID)
                .cloned()
                .filter(|v| !v.trim().is_empty()),
            signing_algorithm,
            access_token_ttl_seconds: ttl(
                ARG_ACCESS_TOKEN_TTL_SECONDS,
                DEFAULT_ACCESS_TOKEN_TTL_SECONDS,
            ),
            refresh_token_ttl_seconds: ttl(
                ARG_REFRESH_TOKEN_TTL_SECONDS,
                DEFAULT_REFRESH_TOKEN_TTL_SECONDS,
            ),
            authorization_code_ttl_seconds: ttl(
                ARG_AUTHORIZATION_CODE_TTL_SECONDS,
                DEFAULT_AUTHORIZATION_CODE_TTL_SECONDS,
            ),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_SIGNING_KEY)
                .long(ARG_SIGNING_KEY)
                .help("HMAC key used to sign access tokens")
                .env("GRANTOR_SIGNING_KEY")
                .hide_env_values(true)
                .required(true),
        )
        .arg(
            Arg::new(ARG_SIGNING_KEY_ID)
                .long(ARG_SIGNING_KEY_ID)
                .help("Key id (kid) placed in the token header, random when unset")
                .env("GRANTOR_SIGNING_KEY_ID"),
        )
        .arg(
            Arg::new(ARG_SIGNING_ALGORITHM)
                .long(ARG_SIGNING_ALGORITHM)
                .help("Access token signing algorithm")
                .env("GRANTOR_SIGNING_ALGORITHM")
                .default_value("HS512")
                .ignore_case(true)
                .value_parser(PossibleValuesParser::new(["HS256", "HS384", "HS512"])),
        )
        .arg(
            Arg::new(ARG_ACCESS_TOKEN_TTL_SECONDS)
                .long(ARG_ACCESS_TOKEN_TTL_SECONDS)
                .help("Access token TTL in seconds")
                .env("GRANTOR_ACCESS_TOKEN_TTL_SECONDS")
                .default_value("604800")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_REFRESH_TOKEN_TTL_SECONDS)
                .long(ARG_REFRESH_TOKEN_TTL_SECONDS)
                .help("Refresh token TTL in seconds")
                .env("GRANTOR_REFRESH_TOKEN_TTL_SECONDS")
                .default_value("2592000")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_AUTHORIZATION_CODE_TTL_SECONDS)
                .long(ARG_AUTHORIZATION_CODE_TTL_SECONDS)
                .help("Authorization code TTL in seconds")
                .env("GRANTOR_AUTHORIZATION_CODE_TTL_SECONDS")
                .default_value("600")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
}
