//! Login and consent state machine.
//!
//! Each inbound request applies exactly one transition to the session. The
//! functions here are pure: they take the current [`SessionData`] and return
//! the next one with the [`Transition`] the handler has to render.

use tracing::debug;

use super::{
    credentials::CredentialVerifier, error::OAuthError, session::SessionData,
    types::AuthorizeParams,
};

pub const AUTHORIZE_PATH: &str = "/oauth2/authorize";
pub const AUTHENTICATE_PATH: &str = "/oauth2/authenticate";
pub const IDENTICATE_PATH: &str = "/oauth2/identicate";
pub const TOKEN_PATH: &str = "/oauth2/token";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Granted,
    Denied,
}

impl Decision {
    /// Anything but an explicit `deny` grants.
    #[must_use]
    pub fn from_form(value: Option<&str>) -> Self {
        match value {
            Some(v) if v.trim().eq_ignore_ascii_case("deny") => Self::Denied,
            _ => Self::Granted,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowState {
    Anonymous,
    Authenticating,
    Authenticated { user_id: String },
}

impl FlowState {
    #[must_use]
    pub fn of(session: &SessionData) -> Self {
        match (&session.logged_in_user_id, &session.pending_params) {
            (Some(user_id), _) => Self::Authenticated {
                user_id: user_id.clone(),
            },
            (None, Some(_)) => Self::Authenticating,
            (None, None) => Self::Anonymous,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Transition {
    /// 302 to the login endpoint.
    RedirectToLogin,
    /// 302 to the identity check.
    RedirectToIdentify,
    /// Render the consent decision point.
    ConsentRequired,
    Decided {
        decision: Decision,
        user_id: String,
        params: AuthorizeParams,
    },
}

/// `GET /oauth2/authorize` with an already validated request.
///
/// The request is always stashed, replacing any left over from an earlier
/// flow, so the consent decision acts on the request that led to it.
#[must_use]
pub fn begin(session: &SessionData, params: AuthorizeParams) -> (SessionData, Transition) {
    let next = SessionData {
        logged_in_user_id: session.logged_in_user_id.clone(),
        pending_params: Some(params),
    };

    if next.logged_in_user_id.is_some() {
        return (next, Transition::ConsentRequired);
    }

    debug!("No identity in session, stashing authorization request");
    (next, Transition::RedirectToLogin)
}

/// `POST /oauth2/authenticate`.
///
/// # Errors
/// `InvalidRequest` without a username, `AccessDenied` for bad credentials.
/// The session is left untouched in both cases.
pub fn submit_credentials(
    session: &SessionData,
    username: Option<&str>,
    password: Option<&str>,
    verifier: &dyn CredentialVerifier,
) -> Result<(SessionData, Transition), OAuthError> {
    let username = username
        .map(str::trim)
        .filter(|u| !u.is_empty())
        .ok_or_else(|| OAuthError::InvalidRequest("username is required".to_string()))?;

    let user_id = verifier
        .verify(username, password.unwrap_or_default())
        .ok_or_else(|| OAuthError::AccessDenied("invalid username or password".to_string()))?;

    let next = SessionData {
        logged_in_user_id: Some(user_id),
        pending_params: session.pending_params.clone(),
    };
    Ok((next, Transition::RedirectToIdentify))
}

/// `GET /oauth2/identicate`. Read-only.
#[must_use]
pub fn identify(session: &SessionData) -> Transition {
    match FlowState::of(session) {
        FlowState::Authenticated { .. } => Transition::ConsentRequired,
        _ => Transition::RedirectToLogin,
    }
}

/// First half of `POST /oauth2/authorize`: a stashed request wins over the
/// parameters of the current request and is removed from the session.
#[must_use]
pub fn restore(session: &SessionData, request: AuthorizeParams) -> (SessionData, AuthorizeParams) {
    let mut next = session.clone();
    let params = match next.pending_params.take() {
        Some(stashed) => stashed.or(request),
        None => request,
    };
    (next, params)
}

/// Second half of `POST /oauth2/authorize`, after validation: take the
/// identity out of the session. Without one the request is stashed again and
/// the user is sent back to log in.
#[must_use]
pub fn decide(
    session: &SessionData,
    params: AuthorizeParams,
    decision: Decision,
) -> (SessionData, Transition) {
    let mut next = session.clone();
    match next.logged_in_user_id.take() {
        Some(user_id) => {
            debug!(?decision, "Authorization decided");
            (
                next,
                Transition::Decided {
                    decision,
                    user_id,
                    params,
                },
            )
        }
        None => {
            next.pending_params = Some(params);
            (next, Transition::RedirectToLogin)
        }
    }
}
