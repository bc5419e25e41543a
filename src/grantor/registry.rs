//! Registered OAuth2 clients.
//!
//! Clients are loaded once at bootstrap (`--client id:secret:redirect_uri`) and
//! never change afterwards, so the registry is shared read-only behind an `Arc`.

use secrecy::{ExposeSecret, SecretString};
use std::{collections::HashMap, str::FromStr};
use thiserror::Error;
use url::Url;

use super::utils::digests_match;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("client already registered: {0}")]
    Duplicate(String),
    #[error("invalid client definition: {0}")]
    InvalidDefinition(String),
    #[error("client not found: {0}")]
    NotFound(String),
}

#[derive(Debug)]
pub struct Client {
    pub id: String,
    secret: SecretString,
    pub redirect_uri: String,
}

impl Client {
    /// # Errors
    /// Returns an error if any field is empty or the redirect target is not an
    /// absolute URL without a fragment.
    pub fn new(
        id: impl Into<String>,
        secret: SecretString,
        redirect_uri: impl Into<String>,
    ) -> Result<Self, RegistryError> {
        let id = id.into();
        let redirect_uri = redirect_uri.into();

        if id.trim().is_empty() {
            return Err(RegistryError::InvalidDefinition("empty client id".to_string()));
        }
        if secret.expose_secret().is_empty() {
            return Err(RegistryError::InvalidDefinition(format!(
                "empty secret for client {id}"
            )));
        }

        let parsed = Url::parse(&redirect_uri)
            .map_err(|e| RegistryError::InvalidDefinition(format!("redirect_uri for {id}: {e}")))?;
        if parsed.fragment().is_some() {
            return Err(RegistryError::InvalidDefinition(format!(
                "redirect_uri for {id} must not contain a fragment"
            )));
        }

        Ok(Self {
            id,
            secret,
            redirect_uri,
        })
    }
}

impl FromStr for Client {
    type Err = RegistryError;

    /// Parse `id:secret:redirect_uri`; the redirect keeps its own colons.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.splitn(3, ':');
        match (parts.next(), parts.next(), parts.next()) {
            (Some(id), Some(secret), Some(redirect_uri)) => Self::new(
                id,
                SecretString::from(secret.to_string()),
                redirect_uri,
            ),
            _ => Err(RegistryError::InvalidDefinition(
                "expected id:secret:redirect_uri".to_string(),
            )),
        }
    }
}

#[derive(Debug, Default)]
pub struct ClientRegistry {
    clients: HashMap<String, Client>,
}

impl ClientRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// # Errors
    /// Returns `Duplicate` if the id is already known.
    pub fn register(&mut self, client: Client) -> Result<(), RegistryError> {
        if self.clients.contains_key(&client.id) {
            return Err(RegistryError::Duplicate(client.id));
        }
        self.clients.insert(client.id.clone(), client);
        Ok(())
    }

    /// # Errors
    /// Returns `NotFound` for unknown ids.
    pub fn lookup(&self, client_id: &str) -> Result<&Client, RegistryError> {
        self.clients
            .get(client_id)
            .ok_or_else(|| RegistryError::NotFound(client_id.to_string()))
    }

    /// Unknown clients and wrong secrets both yield `false`.
    #[must_use]
    pub fn verify_secret(&self, client_id: &str, secret: &str) -> bool {
        let Ok(client) = self.lookup(client_id) else {
            return false;
        };
        digests_match(client.secret.expose_secret().as_bytes(), secret.as_bytes())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.clients.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.clients.is_empty()
    }
}
