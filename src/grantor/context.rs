use std::sync::Arc;
use tracing::debug;

use super::{
    codec::TokenCodec,
    credentials::CredentialVerifier,
    error::OAuthError,
    registry::ClientRegistry,
    session::{DEFAULT_SESSION_TTL_SECONDS, SessionStore},
    store::{AccessToken, CredentialStore},
    utils::unix_now,
};

/// Everything a handler needs, built once at startup and shared through an
/// `Extension<Arc<ServerContext>>`.
pub struct ServerContext {
    registry: Arc<ClientRegistry>,
    store: Arc<CredentialStore>,
    codec: TokenCodec,
    sessions: Arc<dyn SessionStore>,
    verifier: Arc<dyn CredentialVerifier>,
    session_ttl_seconds: i64,
    cookie_secure: bool,
}

impl ServerContext {
    #[must_use]
    pub fn new(
        registry: ClientRegistry,
        store: Arc<CredentialStore>,
        codec: TokenCodec,
        sessions: Arc<dyn SessionStore>,
        verifier: Arc<dyn CredentialVerifier>,
    ) -> Self {
        Self {
            registry: Arc::new(registry),
            store,
            codec,
            sessions,
            verifier,
            session_ttl_seconds: DEFAULT_SESSION_TTL_SECONDS,
            cookie_secure: false,
        }
    }

    #[must_use]
    pub fn with_session_ttl_seconds(mut self, ttl: i64) -> Self {
        self.session_ttl_seconds = ttl;
        self
    }

    #[must_use]
    pub fn with_cookie_secure(mut self, secure: bool) -> Self {
        self.cookie_secure = secure;
        self
    }

    #[must_use]
    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    #[must_use]
    pub fn store(&self) -> &Arc<CredentialStore> {
        &self.store
    }

    #[must_use]
    pub fn codec(&self) -> &TokenCodec {
        &self.codec
    }

    #[must_use]
    pub fn sessions(&self) -> &dyn SessionStore {
        self.sessions.as_ref()
    }

    #[must_use]
    pub fn verifier(&self) -> &dyn CredentialVerifier {
        self.verifier.as_ref()
    }

    #[must_use]
    pub const fn session_ttl_seconds(&self) -> i64 {
        self.session_ttl_seconds
    }

    #[must_use]
    pub const fn cookie_secure(&self) -> bool {
        self.cookie_secure
    }

    /// Resource-server check: the signature must verify and the opaque id in
    /// `jti` must still be live in the store for the same client and user.
    ///
    /// # Errors
    /// `InvalidToken` on any mismatch.
    pub fn verify_access_token(&self, jwt: &str) -> Result<AccessToken, OAuthError> {
        let claims = self.codec.verify(jwt, unix_now()).map_err(|err| {
            debug!("Access token rejected by codec: {err}");
            OAuthError::InvalidToken(err.to_string())
        })?;

        let token = self.store.lookup_access_token(&claims.jti).map_err(|err| {
            debug!("Access token rejected by store: {err}");
            OAuthError::InvalidToken(format!("access token {err}"))
        })?;

        if token.client_id != claims.aud || token.user_id != claims.sub {
            return Err(OAuthError::InvalidToken(
                "claims do not match issued token".to_string(),
            ));
        }

        Ok(token)
    }
}
