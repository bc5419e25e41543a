//! Browser session persisted across the authorize/authenticate round trips.
//!
//! The backing store only sees opaque strings; [`SessionData`] is the typed
//! view and is validated whenever a record is read back.

use axum::http::{
    HeaderMap, HeaderValue,
    header::{COOKIE, InvalidHeaderValue},
};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

use super::{
    types::AuthorizeParams,
    utils::{generate_opaque_token, unix_now},
};

pub const SESSION_COOKIE_NAME: &str = "grantor_session";
pub const DEFAULT_SESSION_TTL_SECONDS: i64 = 3600;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("session backend failure: {0}")]
    Backend(String),
    #[error("failed to encode session: {0}")]
    Encode(#[from] serde_json::Error),
    #[error("failed to generate session key: {0}")]
    Rng(#[from] rand::Error),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct SessionData {
    /// Set by a successful authentication, taken by the consent decision.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logged_in_user_id: Option<String>,
    /// Authorization request stashed while the user signs in.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pending_params: Option<AuthorizeParams>,
}

impl SessionData {
    /// Decode a stored record. Anything unreadable is an empty session.
    #[must_use]
    pub fn decode(raw: &str) -> Self {
        match serde_json::from_str::<Self>(raw) {
            Ok(data) => {
                if data.logged_in_user_id.as_deref().is_some_and(str::is_empty) {
                    warn!("Discarding session with an empty user id");
                    return Self::default();
                }
                data
            }
            Err(err) => {
                warn!("Discarding undecodable session record: {err}");
                Self::default()
            }
        }
    }
}

/// Key-value backend for sessions. Calls are synchronous and never retried.
pub trait SessionStore: Send + Sync {
    /// # Errors
    /// Backend failure.
    fn load(&self, key: &str) -> Result<Option<String>, SessionError>;

    /// # Errors
    /// Backend failure.
    fn store(&self, key: &str, value: String) -> Result<(), SessionError>;

    /// # Errors
    /// Backend failure.
    fn remove(&self, key: &str) -> Result<(), SessionError>;

    fn purge_expired(&self) -> usize {
        0
    }
}

/// In-process session backend with a sliding TTL.
#[derive(Debug)]
pub struct MemorySessionStore {
    ttl_seconds: i64,
    entries: DashMap<String, (String, i64)>,
}

impl MemorySessionStore {
    #[must_use]
    pub fn new(ttl_seconds: i64) -> Self {
        Self {
            ttl_seconds,
            entries: DashMap::new(),
        }
    }
}

impl Default for MemorySessionStore {
    fn default() -> Self {
        Self::new(DEFAULT_SESSION_TTL_SECONDS)
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self, key: &str) -> Result<Option<String>, SessionError> {
        let Some((value, expires_at)) = self.entries.get(key).map(|entry| entry.value().clone())
        else {
            return Ok(None);
        };
        if expires_at <= unix_now() {
            self.entries.remove(key);
            return Ok(None);
        }
        Ok(Some(value))
    }

    fn store(&self, key: &str, value: String) -> Result<(), SessionError> {
        self.entries
            .insert(key.to_string(), (value, unix_now() + self.ttl_seconds));
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), SessionError> {
        self.entries.remove(key);
        Ok(())
    }

    fn purge_expired(&self) -> usize {
        let now = unix_now();
        let before = self.entries.len();
        self.entries.retain(|_, (_, expires_at)| *expires_at > now);
        before.saturating_sub(self.entries.len())
    }
}

/// One request's view of the browser session.
#[derive(Debug)]
pub struct Session {
    key: String,
    data: SessionData,
}

impl Session {
    /// Resolve the session cookie. Unknown or expired keys get a fresh key so
    /// a client cannot choose its own session id.
    ///
    /// # Errors
    /// Backend failure or no random key could be generated.
    pub fn start(store: &dyn SessionStore, headers: &HeaderMap) -> Result<Self, SessionError> {
        if let Some(key) = extract_session_key(headers) {
            if let Some(raw) = store.load(&key)? {
                return Ok(Self {
                    key,
                    data: SessionData::decode(&raw),
                });
            }
            debug!("Unknown session key, starting a new session");
        }

        Ok(Self {
            key: generate_opaque_token()?,
            data: SessionData::default(),
        })
    }

    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    #[must_use]
    pub const fn data(&self) -> &SessionData {
        &self.data
    }

    pub fn replace(&mut self, data: SessionData) {
        self.data = data;
    }

    /// Persist the session. An empty session removes its record.
    ///
    /// # Errors
    /// Serialization or backend failure.
    pub fn save(&self, store: &dyn SessionStore) -> Result<(), SessionError> {
        if self.data == SessionData::default() {
            return store.remove(&self.key);
        }
        let raw = serde_json::to_string(&self.data)?;
        store.store(&self.key, raw)
    }

    /// `Set-Cookie` value carrying the session key.
    ///
    /// # Errors
    /// Returns an error if the cookie is not a valid header value.
    pub fn cookie(&self, ttl_seconds: i64, secure: bool) -> Result<HeaderValue, InvalidHeaderValue> {
        let mut cookie = format!(
            "{SESSION_COOKIE_NAME}={}; Path=/; HttpOnly; SameSite=Lax; Max-Age={ttl_seconds}",
            self.key
        );
        if secure {
            cookie.push_str("; Secure");
        }
        HeaderValue::from_str(&cookie)
    }
}

fn extract_session_key(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .find_map(|pair| {
            let mut parts = pair.trim().splitn(2, '=');
            let name = parts.next()?.trim();
            let value = parts.next()?.trim();
            (name == SESSION_COOKIE_NAME && !value.is_empty()).then(|| value.to_string())
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cookie_headers(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        if let Ok(value) = HeaderValue::from_str(value) {
            headers.insert(COOKIE, value);
        }
        headers
    }

    #[test]
    fn extract_key_from_cookie_header() {
        let headers = cookie_headers("theme=dark; grantor_session=abc123; lang=en");
        assert_eq!(extract_session_key(&headers), Some("abc123".to_string()));

        assert_eq!(extract_session_key(&cookie_headers("grantor_session=")), None);
        assert_eq!(extract_session_key(&HeaderMap::new()), None);
    }

    #[test]
    fn new_session_then_resume() -> Result<(), SessionError> {
        let store = MemorySessionStore::default();

        let mut session = Session::start(&store, &HeaderMap::new())?;
        assert_eq!(store.load(session.key())?, None);
        session.replace(SessionData {
            logged_in_user_id: Some("alice".to_string()),
            pending_params: None,
        });
        session.save(&store)?;

        let headers = cookie_headers(&format!("{SESSION_COOKIE_NAME}={}", session.key()));
        let resumed = Session::start(&store, &headers)?;
        assert_eq!(resumed.key(), session.key());
        assert_eq!(resumed.data().logged_in_user_id.as_deref(), Some("alice"));
        Ok(())
    }

    #[test]
    fn unknown_key_is_not_adopted() -> Result<(), SessionError> {
        let store = MemorySessionStore::default();
        let headers = cookie_headers("grantor_session=attacker-chosen");

        let session = Session::start(&store, &headers)?;
        assert_ne!(session.key(), "attacker-chosen");
        Ok(())
    }

    #[test]
    fn undecodable_record_is_an_empty_session() -> Result<(), SessionError> {
        let store = MemorySessionStore::default();
        store.store("k", "not json".to_string())?;
        store.store("k2", r#"{"logged_in_user_id":""}"#.to_string())?;
        store.store("k3", r#"{"logged_in_user_id":"alice","admin":true}"#.to_string())?;

        for key in ["k", "k2", "k3"] {
            let headers = cookie_headers(&format!("{SESSION_COOKIE_NAME}={key}"));
            let session = Session::start(&store, &headers)?;
            assert_eq!(session.key(), key);
            assert_eq!(session.data(), &SessionData::default(), "{key}");
        }
        Ok(())
    }

    #[test]
    fn saving_an_empty_session_removes_the_record() -> Result<(), SessionError> {
        let store = MemorySessionStore::default();
        let mut session = Session::start(&store, &HeaderMap::new())?;
        session.replace(SessionData {
            logged_in_user_id: Some("alice".to_string()),
            pending_params: None,
        });
        session.save(&store)?;
        assert!(store.load(session.key())?.is_some());

        session.replace(SessionData::default());
        session.save(&store)?;
        assert_eq!(store.load(session.key())?, None);
        Ok(())
    }

    #[test]
    fn expired_sessions_are_dropped() -> Result<(), SessionError> {
        let store = MemorySessionStore::new(0);
        store.store("k", "{}".to_string())?;
        assert_eq!(store.load("k")?, None);

        store.store("k", "{}".to_string())?;
        assert_eq!(store.purge_expired(), 1);
        Ok(())
    }

    #[test]
    fn cookie_attributes() -> Result<(), InvalidHeaderValue> {
        let session = Session {
            key: "abc".to_string(),
            data: SessionData::default(),
        };

        let plain = session.cookie(3600, false)?;
        assert_eq!(
            plain.to_str().unwrap_or_default(),
            "grantor_session=abc; Path=/; HttpOnly; SameSite=Lax; Max-Age=3600"
        );

        let secure = session.cookie(60, true)?;
        assert!(secure.to_str().unwrap_or_default().ends_with("; Secure"));
        Ok(())
    }
}
