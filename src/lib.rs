//! # Grantor (OAuth2 authorization server)
//!
//! `grantor` authenticates a resource owner, obtains consent, mints a single-use
//! authorization code and exchanges it for a signed access token plus a refresh
//! token.
//!
//! ## Flow
//!
//! The browser side of the flow spans several requests:
//!
//! 1. `GET /oauth2/authorize` validates the client and stashes the request in the
//!    session, then redirects to `/oauth2/authenticate`.
//! 2. `POST /oauth2/authenticate` verifies the resource owner and records the
//!    user id in the session.
//! 3. `GET /oauth2/identicate` confirms the identity and points at the consent
//!    decision.
//! 4. `POST /oauth2/authorize` restores the stashed request, consumes the
//!    identity and redirects back to the client with `code` and `state`.
//!
//! The client then calls `POST /oauth2/token` with its credentials.
//!
//! ## Tokens
//!
//! Access tokens are compact JWS values signed with an HMAC key (`HS512` by
//! default). The `jti` claim is the opaque id held by the credential store, so a
//! rotated or expired token fails verification even when its signature is valid.

pub mod cli;
pub mod grantor;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
