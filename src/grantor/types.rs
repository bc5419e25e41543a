use serde::{Deserialize, Serialize};
use std::fmt;
use utoipa::{IntoParams, ToSchema};

/// Authorization request parameters.
///
/// Every field is optional on the wire; validation happens in the handler so
/// missing values produce protocol errors instead of extractor rejections.
#[derive(ToSchema, IntoParams, Serialize, Deserialize, Debug, Clone, Default, PartialEq, Eq)]
#[into_params(parameter_in = Query)]
pub struct AuthorizeParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
}

impl AuthorizeParams {
    /// Fill the gaps in `self` with values from `other`.
    #[must_use]
    pub fn or(self, other: Self) -> Self {
        Self {
            response_type: self.response_type.or(other.response_type),
            client_id: self.client_id.or(other.client_id),
            redirect_uri: self.redirect_uri.or(other.redirect_uri),
            scope: self.scope.or(other.scope),
            state: self.state.or(other.state),
        }
    }
}

/// Body of `POST /oauth2/authorize`: the request parameters plus the consent
/// decision (`allow` unless `decision=deny`).
#[derive(ToSchema, Deserialize, Debug, Clone, Default)]
pub struct AuthorizeForm {
    #[serde(default)]
    pub response_type: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
    #[serde(default)]
    pub state: Option<String>,
    #[serde(default)]
    pub decision: Option<String>,
}

impl AuthorizeForm {
    #[must_use]
    pub fn split(self) -> (AuthorizeParams, Option<String>) {
        (
            AuthorizeParams {
                response_type: self.response_type,
                client_id: self.client_id,
                redirect_uri: self.redirect_uri,
                scope: self.scope,
                state: self.state,
            },
            self.decision,
        )
    }
}

/// An authorization request that passed client and redirect validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedAuthorize {
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub state: Option<String>,
}

#[derive(ToSchema, Deserialize, Default)]
pub struct AuthenticateForm {
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    #[schema(format = Password)]
    pub password: Option<String>,
}

impl fmt::Debug for AuthenticateForm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthenticateForm")
            .field("username", &self.username)
            .field("password", &self.password.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Where the user agent should go next when no redirect applies.
#[derive(ToSchema, Serialize, Deserialize, Debug, PartialEq, Eq)]
pub struct NextStep {
    pub action: String,
    pub method: String,
}

impl NextStep {
    #[must_use]
    pub fn post(action: &str) -> Self {
        Self {
            action: action.to_string(),
            method: "POST".to_string(),
        }
    }
}

#[derive(ToSchema, IntoParams, Deserialize, Default)]
#[into_params(parameter_in = Query)]
pub struct TokenRequest {
    #[serde(default)]
    pub grant_type: Option<String>,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub redirect_uri: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub client_id: Option<String>,
    #[serde(default)]
    #[schema(format = Password)]
    #[param(format = Password)]
    pub client_secret: Option<String>,
}

impl fmt::Debug for TokenRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TokenRequest")
            .field("grant_type", &self.grant_type)
            .field("client_id", &self.client_id)
            .field("redirect_uri", &self.redirect_uri)
            .finish_non_exhaustive()
    }
}

#[derive(ToSchema, Serialize, Deserialize, Debug)]
pub struct TokenResponse {
    pub access_token: String,
    pub token_type: String,
    pub expires_in: i64,
    pub refresh_token: String,
    pub scope: String,
}
