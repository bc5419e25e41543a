use crate::{
    cli::{
        commands::{auth, tokens},
        telemetry,
    },
    grantor::{
        self,
        codec::TokenCodec,
        context::ServerContext,
        registry::ClientRegistry,
        session::MemorySessionStore,
        store::{CredentialStore, StoreConfig},
    },
};
use anyhow::{Context, Result};
use std::{sync::Arc, time::Duration};
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub tokens: tokens::Options,
    pub auth: auth::Options,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the clients, signing key or listener cannot be set up.
pub async fn execute(args: Args) -> Result<()> {
    let Args { port, tokens, auth } = args;
    let purge_interval_seconds = auth.purge_interval_seconds;

    let ctx = build_context(tokens, auth)?;

    log_startup(port, &ctx, purge_interval_seconds);

    let result = grantor::new(
        port,
        Arc::new(ctx),
        Duration::from_secs(purge_interval_seconds),
    )
    .await;

    telemetry::shutdown_tracer();

    result
}

fn build_context(tokens: tokens::Options, auth: auth::Options) -> Result<ServerContext> {
    let mut registry = ClientRegistry::new();
    for client in auth.clients {
        registry
            .register(client)
            .context("Could not register client")?;
    }

    let store = CredentialStore::new(
        StoreConfig::new()
            .with_authorization_code_ttl_seconds(tokens.authorization_code_ttl_seconds)
            .with_access_token_ttl_seconds(tokens.access_token_ttl_seconds)
            .with_refresh_token_ttl_seconds(tokens.refresh_token_ttl_seconds),
    );

    let codec = TokenCodec::new(
        tokens.signing_key,
        tokens.signing_key_id,
        tokens.signing_algorithm,
    )
    .context("Could not initialize token signing")?;

    Ok(ServerContext::new(
        registry,
        Arc::new(store),
        codec,
        Arc::new(MemorySessionStore::new(auth.session_ttl_seconds)),
        Arc::new(auth.users),
    )
    .with_session_ttl_seconds(auth.session_ttl_seconds)
    .with_cookie_secure(auth.cookie_secure))
}

fn log_startup(port: u16, ctx: &ServerContext, purge_interval_seconds: u64) {
    let config = ctx.store().config();
    let entries = [
        ("listen", format!("tcp:{port}")),
        ("clients", ctx.registry().len().to_string()),
        ("signing_algorithm", ctx.codec().algorithm().to_string()),
        ("signing_key_id", ctx.codec().kid().to_string()),
        (
            "authorization_code_ttl",
            format!("{}s", config.authorization_code_ttl_seconds()),
        ),
        (
            "access_token_ttl",
            format!("{}s", config.access_token_ttl_seconds()),
        ),
        (
            "refresh_token_ttl",
            format!("{}s", config.refresh_token_ttl_seconds()),
        ),
        ("session_ttl", format!("{}s", ctx.session_ttl_seconds())),
        ("cookie_secure", ctx.cookie_secure().to_string()),
        ("purge_interval", format!("{purge_interval_seconds}s")),
    ];

    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!(
        "{} {} - {}\n\nStartup configuration:",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        short_commit(crate::GIT_COMMIT_HASH)
    );
    for (key, value) in &entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn short_commit(hash: &str) -> &str {
    let trimmed = hash.trim();
    trimmed.get(..7).unwrap_or(trimmed)
}
