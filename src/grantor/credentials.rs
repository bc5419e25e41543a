//! Resource-owner credential verification.

use secrecy::{ExposeSecret, SecretString};
use std::collections::HashMap;
use thiserror::Error;

use super::utils::digests_match;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CredentialsError {
    #[error("user already configured: {0}")]
    Duplicate(String),
    #[error("invalid user definition: {0}")]
    InvalidDefinition(String),
}

/// Checks a username/password pair and returns the user id on success.
pub trait CredentialVerifier: Send + Sync {
    fn verify(&self, username: &str, password: &str) -> Option<String>;
}

/// Users configured at startup with `--user name:password`.
#[derive(Debug, Default)]
pub struct StaticCredentials {
    users: HashMap<String, SecretString>,
}

impl StaticCredentials {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a `name:password` pair.
    ///
    /// # Errors
    /// Returns an error for a malformed or duplicate entry.
    pub fn add(&mut self, entry: &str) -> Result<(), CredentialsError> {
        let Some((name, password)) = entry.split_once(':') else {
            return Err(CredentialsError::InvalidDefinition(
                "expected username:password".to_string(),
            ));
        };
        if name.is_empty() || password.is_empty() {
            return Err(CredentialsError::InvalidDefinition(
                "username and password must not be empty".to_string(),
            ));
        }
        if self.users.contains_key(name) {
            return Err(CredentialsError::Duplicate(name.to_string()));
        }
        self.users
            .insert(name.to_string(), SecretString::from(password.to_string()));
        Ok(())
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.users.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl CredentialVerifier for StaticCredentials {
    fn verify(&self, username: &str, password: &str) -> Option<String> {
        let stored = self.users.get(username)?;
        digests_match(stored.expose_secret().as_bytes(), password.as_bytes())
            .then(|| username.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_configured_users() -> Result<(), CredentialsError> {
        let mut users = StaticCredentials::new();
        users.add("alice:wonderland")?;
        users.add("bob:pa:ss")?;

        assert_eq!(users.verify("alice", "wonderland"), Some("alice".to_string()));
        assert_eq!(users.verify("bob", "pa:ss"), Some("bob".to_string()));
        assert_eq!(users.verify("alice", "wrong"), None);
        assert_eq!(users.verify("carol", "wonderland"), None);
        Ok(())
    }

    #[test]
    fn reject_bad_entries() -> Result<(), CredentialsError> {
        let mut users = StaticCredentials::new();
        assert!(matches!(
            users.add("alice"),
            Err(CredentialsError::InvalidDefinition(_))
        ));
        assert!(users.add(":pw").is_err());
        assert!(users.add("alice:").is_err());

        users.add("alice:one")?;
        assert_eq!(
            users.add("alice:two"),
            Err(CredentialsError::Duplicate("alice".to_string()))
        );
        assert_eq!(users.len(), 1);
        Ok(())
    }
}
