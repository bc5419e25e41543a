//! In-memory credential store for authorization codes and token pairs.
//!
//! Every map is a sharded `DashMap`; single-use semantics rely on its atomic
//! `remove`, so exactly one caller can take a given code or refresh token.

use dashmap::DashMap;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::instrument;

use super::utils::{generate_opaque_token, unix_now};

pub const DEFAULT_AUTHORIZATION_CODE_TTL_SECONDS: i64 = 600;
pub const DEFAULT_ACCESS_TOKEN_TTL_SECONDS: i64 = 7 * 24 * 3600;
pub const DEFAULT_REFRESH_TOKEN_TTL_SECONDS: i64 = 30 * 24 * 3600;
pub const DEFAULT_PURGE_INTERVAL: Duration = Duration::from_secs(300);

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("not found")]
    NotFound,
    #[error("expired")]
    Expired,
    #[error("already consumed")]
    AlreadyConsumed,
    #[error("failed to generate token: {0}")]
    Rng(#[from] rand::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthorizationGrant {
    pub code: String,
    pub client_id: String,
    pub user_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub issued_at: i64,
    pub expires_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AccessToken {
    pub token: String,
    pub client_id: String,
    pub user_id: String,
    pub scope: String,
    pub issued_at: i64,
    pub expires_at: i64,
    pub refresh_token: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RefreshToken {
    pub token: String,
    pub access_token: String,
    pub client_id: String,
    pub user_id: String,
    pub scope: String,
    pub issued_at: i64,
    pub expires_at: i64,
}

#[derive(Clone, Debug)]
pub struct StoreConfig {
    authorization_code_ttl_seconds: i64,
    access_token_ttl_seconds: i64,
    refresh_token_ttl_seconds: i64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            authorization_code_ttl_seconds: DEFAULT_AUTHORIZATION_CODE_TTL_SECONDS,
            access_token_ttl_seconds: DEFAULT_ACCESS_TOKEN_TTL_SECONDS,
            refresh_token_ttl_seconds: DEFAULT_REFRESH_TOKEN_TTL_SECONDS,
        }
    }
}

impl StoreConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_authorization_code_ttl_seconds(mut self, ttl: i64) -> Self {
        self.authorization_code_ttl_seconds = ttl;
        self
    }

    #[must_use]
    pub fn with_access_token_ttl_seconds(mut self, ttl: i64) -> Self {
        self.access_token_ttl_seconds = ttl;
        self
    }

    #[must_use]
    pub fn with_refresh_token_ttl_seconds(mut self, ttl: i64) -> Self {
        self.refresh_token_ttl_seconds = ttl;
        self
    }

    #[must_use]
    pub fn authorization_code_ttl_seconds(&self) -> i64 {
        self.authorization_code_ttl_seconds
    }

    #[must_use]
    pub fn access_token_ttl_seconds(&self) -> i64 {
        self.access_token_ttl_seconds
    }

    #[must_use]
    pub fn refresh_token_ttl_seconds(&self) -> i64 {
        self.refresh_token_ttl_seconds
    }
}

#[derive(Debug, Default)]
pub struct CredentialStore {
    config: StoreConfig,
    grants: DashMap<String, AuthorizationGrant>,
    // code -> original expiry, so replays are reported as such until then
    consumed: DashMap<String, i64>,
    // codes that expired unused, kept until the next purge
    expired: DashMap<String, ()>,
    access_tokens: DashMap<String, AccessToken>,
    refresh_tokens: DashMap<String, RefreshToken>,
}

impl CredentialStore {
    #[must_use]
    pub fn new(config: StoreConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Mint a fresh authorization code bound to client, user and redirect.
    ///
    /// # Errors
    /// Returns `Rng` if no code could be generated.
    #[instrument(skip(self, scope))]
    pub fn create_grant(
        &self,
        client_id: &str,
        user_id: &str,
        redirect_uri: &str,
        scope: &str,
    ) -> Result<AuthorizationGrant, StoreError> {
        let now = unix_now();
        let grant = AuthorizationGrant {
            code: generate_opaque_token()?,
            client_id: client_id.to_string(),
            user_id: user_id.to_string(),
            redirect_uri: redirect_uri.to_string(),
            scope: scope.to_string(),
            issued_at: now,
            expires_at: now + self.config.authorization_code_ttl_seconds,
        };
        self.grants.insert(grant.code.clone(), grant.clone());
        Ok(grant)
    }

    /// Take a grant out of the store. At most one caller succeeds per code.
    ///
    /// # Errors
    /// `AlreadyConsumed` for a replayed code, `Expired` for a stale one and
    /// `NotFound` otherwise. A stale code keeps reporting `Expired` until the
    /// next purge.
    pub fn consume_grant(&self, code: &str) -> Result<AuthorizationGrant, StoreError> {
        let now = unix_now();

        let Some((_, grant)) = self.grants.remove(code) else {
            if self.expired.contains_key(code) {
                return Err(StoreError::Expired);
            }
            let tombstone = self.consumed.get(code).map(|entry| *entry.value());
            return match tombstone {
                Some(expires_at) if expires_at > now => Err(StoreError::AlreadyConsumed),
                _ => Err(StoreError::NotFound),
            };
        };

        if grant.expires_at <= now {
            self.expired.insert(grant.code, ());
            return Err(StoreError::Expired);
        }

        self.consumed.insert(grant.code.clone(), grant.expires_at);
        Ok(grant)
    }

    /// Create a linked access/refresh pair.
    ///
    /// # Errors
    /// Returns `Rng` if token ids could not be generated.
    pub fn issue_tokens(
        &self,
        client_id: &str,
        user_id: &str,
        scope: &str,
    ) -> Result<(AccessToken, RefreshToken), StoreError> {
        let now = unix_now();
        let access_id = generate_opaque_token()?;
        let refresh_id = generate_opaque_token()?;

        let access = AccessToken {
            token: access_id.clone(),
            client_id: client_id.to_string(),
            user_id: user_id.to_string(),
            scope: scope.to_string(),
            issued_at: now,
            expires_at: now + self.config.access_token_ttl_seconds,
            refresh_token: refresh_id.clone(),
        };
        let refresh = RefreshToken {
            token: refresh_id.clone(),
            access_token: access_id.clone(),
            client_id: client_id.to_string(),
            user_id: user_id.to_string(),
            scope: scope.to_string(),
            issued_at: now,
            expires_at: now + self.config.refresh_token_ttl_seconds,
        };

        self.access_tokens.insert(access_id, access.clone());
        self.refresh_tokens.insert(refresh_id, refresh.clone());

        Ok((access, refresh))
    }

    /// Rotate a refresh token: the presented token and its access token are
    /// removed and a new pair with the same client, user and scope is issued.
    ///
    /// A token owned by another client is left untouched and reported as
    /// `NotFound`.
    ///
    /// # Errors
    /// `NotFound`, `Expired` or `Rng`.
    pub fn refresh_tokens(
        &self,
        refresh_token: &str,
        client_id: &str,
    ) -> Result<(AccessToken, RefreshToken), StoreError> {
        let (_, old) = self
            .refresh_tokens
            .remove_if(refresh_token, |_, stored| stored.client_id == client_id)
            .ok_or(StoreError::NotFound)?;

        self.access_tokens.remove(&old.access_token);

        if old.expires_at <= unix_now() {
            return Err(StoreError::Expired);
        }

        self.issue_tokens(&old.client_id, &old.user_id, &old.scope)
    }

    /// # Errors
    /// `NotFound` or `Expired`; expired entries are dropped on the way out.
    pub fn lookup_access_token(&self, token: &str) -> Result<AccessToken, StoreError> {
        let access = self
            .access_tokens
            .get(token)
            .map(|entry| entry.value().clone())
            .ok_or(StoreError::NotFound)?;

        if access.expires_at <= unix_now() {
            self.access_tokens.remove(token);
            return Err(StoreError::Expired);
        }

        Ok(access)
    }

    /// Drop every expired grant, tombstone and token. Returns how many entries
    /// were removed.
    ///
    /// Codes reclaimed here are remembered as expired until the following
    /// purge.
    pub fn purge_expired(&self) -> usize {
        let now = unix_now();
        let before = self.entries();

        self.expired.clear();
        self.grants.retain(|code, grant| {
            let live = grant.expires_at > now;
            if !live {
                self.expired.insert(code.clone(), ());
            }
            live
        });
        self.consumed.retain(|_, expires_at| *expires_at > now);
        self.access_tokens.retain(|_, token| token.expires_at > now);
        self.refresh_tokens.retain(|_, token| token.expires_at > now);

        before.saturating_sub(self.entries())
    }

    fn entries(&self) -> usize {
        self.grants.len()
            + self.consumed.len()
            + self.access_tokens.len()
            + self.refresh_tokens.len()
    }
}
