use anyhow::{Context, Result};
use clap::{Arg, ArgAction, ArgMatches, Command};

use crate::grantor::{
    credentials::StaticCredentials, registry::Client, session::DEFAULT_SESSION_TTL_SECONDS,
    store::DEFAULT_PURGE_INTERVAL,
};

pub const ARG_CLIENT: &str = "client";
pub const ARG_USER: &str = "user";
pub const ARG_SESSION_TTL_SECONDS: &str = "session-ttl-seconds";
pub const ARG_COOKIE_SECURE: &str = "cookie-secure";
pub const ARG_PURGE_INTERVAL_SECONDS: &str = "purge-interval-seconds";

#[derive(Debug)]
pub struct Options {
    pub clients: Vec<Client>,
    pub users: StaticCredentials,
    pub session_ttl_seconds: i64,
    pub cookie_secure: bool,
    pub purge_interval_seconds: u64,
}

impl Options {
    /// Parse client registrations, resource owners and session settings.
    ///
    /// # Errors
    /// Returns an error if no client is given or an entry is malformed.
    pub fn parse(matches: &ArgMatches) -> Result<Self> {
        let clients = matches
            .get_many::<String>(ARG_CLIENT)
            .context("missing required argument: --client")?
            .map(|entry| {
                entry
                    .parse::<Client>()
                    .with_context(|| format!("invalid --{ARG_CLIENT} entry"))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut users = StaticCredentials::new();
        for entry in matches.get_many::<String>(ARG_USER).into_iter().flatten() {
            users
                .add(entry)
                .with_context(|| format!("invalid --{ARG_USER} entry"))?;
        }

        Ok(Self {
            clients,
            users,
            session_ttl_seconds: matches
                .get_one::<i64>(ARG_SESSION_TTL_SECONDS)
                .copied()
                .unwrap_or(DEFAULT_SESSION_TTL_SECONDS),
            cookie_secure: matches.get_flag(ARG_COOKIE_SECURE),
            purge_interval_seconds: matches
                .get_one::<u64>(ARG_PURGE_INTERVAL_SECONDS)
                .copied()
                .unwrap_or(DEFAULT_PURGE_INTERVAL.as_secs()),
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_CLIENT)
                .long(ARG_CLIENT)
                .help("Registered client as id:secret:redirect_uri (repeatable)")
                .env("GRANTOR_CLIENTS")
                .hide_env_values(true)
                .value_delimiter(',')
                .action(ArgAction::Append)
                .required(true),
        )
        .arg(
            Arg::new(ARG_USER)
                .long(ARG_USER)
                .help("Resource owner as username:password (repeatable)")
                .env("GRANTOR_USERS")
                .hide_env_values(true)
                .value_delimiter(',')
                .action(ArgAction::Append),
        )
        .arg(
            Arg::new(ARG_SESSION_TTL_SECONDS)
                .long(ARG_SESSION_TTL_SECONDS)
                .help("Idle lifetime of a browser session in seconds")
                .env("GRANTOR_SESSION_TTL_SECONDS")
                .default_value("3600")
                .value_parser(clap::value_parser!(i64).range(1..)),
        )
        .arg(
            Arg::new(ARG_COOKIE_SECURE)
                .long(ARG_COOKIE_SECURE)
                .help("Mark the session cookie Secure")
                .env("GRANTOR_COOKIE_SECURE")
                .action(ArgAction::SetTrue),
        )
        .arg(
            Arg::new(ARG_PURGE_INTERVAL_SECONDS)
                .long(ARG_PURGE_INTERVAL_SECONDS)
                .help("How often expired codes, tokens and sessions are reclaimed")
                .env("GRANTOR_PURGE_INTERVAL_SECONDS")
                .default_value("300")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}
