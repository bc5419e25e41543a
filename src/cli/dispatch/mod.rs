use crate::cli::{
    actions::{Action, server::Args},
    commands::{self, auth, tokens},
};
use anyhow::Result;

/// # Errors
/// Returns an error if required arguments are missing or malformed.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let port = matches
        .get_one::<u16>(commands::ARG_PORT)
        .copied()
        .unwrap_or(8080);

    Ok(Action::Server(Args {
        port,
        tokens: tokens::Options::parse(matches)?,
        auth: auth::Options::parse(matches)?,
    }))
}
