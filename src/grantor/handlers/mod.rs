pub mod authenticate;
pub mod authorize;
pub mod health;
pub mod identicate;
pub mod token;

// common functions for the handlers
use axum::{
    Json,
    http::{
        HeaderMap, StatusCode,
        header::{LOCATION, SET_COOKIE},
    },
    response::{IntoResponse, Response},
};
use tracing::{error, warn};

use super::{context::ServerContext, error::OAuthError, session::Session, types::NextStep};

/// 302 to `location`.
pub(crate) fn redirect(location: &str) -> Result<Response, OAuthError> {
    let mut headers = HeaderMap::new();
    headers.insert(
        LOCATION,
        location
            .parse()
            .map_err(|e| OAuthError::internal(format!("invalid redirect location: {e}")))?,
    );
    Ok((StatusCode::FOUND, headers).into_response())
}

/// The JSON decision point pointing the user agent at the next form.
pub(crate) fn next_step(action: &str) -> Response {
    (StatusCode::OK, Json(NextStep::post(action))).into_response()
}

pub(crate) fn open_session(ctx: &ServerContext, headers: &HeaderMap) -> Result<Session, OAuthError> {
    Session::start(ctx.sessions(), headers).map_err(|err| {
        error!("Failed to start session: {err}");
        OAuthError::internal(err)
    })
}

/// Save the session; failures are logged and never retried.
pub(crate) fn save_session(ctx: &ServerContext, session: &Session) -> bool {
    match session.save(ctx.sessions()) {
        Ok(()) => true,
        Err(err) => {
            warn!("Failed to save session: {err}");
            false
        }
    }
}

/// Save the session and attach its cookie. The response goes out even when
/// the save fails.
pub(crate) fn persist_session(
    ctx: &ServerContext,
    session: &Session,
    mut response: Response,
) -> Response {
    if !save_session(ctx, session) {
        return response;
    }

    match session.cookie(ctx.session_ttl_seconds(), ctx.cookie_secure()) {
        Ok(cookie) => {
            response.headers_mut().append(SET_COOKIE, cookie);
        }
        Err(err) => error!("Failed to build session cookie: {err}"),
    }
    response
}
