use axum::{extract::Extension, http::HeaderMap, response::Response};
use std::sync::Arc;
use tracing::{debug, instrument};

use super::{next_step, open_session, redirect};
use crate::grantor::{
    context::ServerContext,
    error::OAuthError,
    flow::{self, AUTHENTICATE_PATH, AUTHORIZE_PATH, Transition},
    types::NextStep,
};

/// Identity check between login and consent. Never writes to the session.
#[utoipa::path(
    get,
    path = "/oauth2/identicate",
    responses(
        (status = 200, description = "Signed in, consent decision point", body = NextStep),
        (status = 302, description = "Not signed in, redirect to /oauth2/authenticate")
    ),
    tag = "oauth2"
)]
#[instrument(skip(headers, ctx))]
pub async fn identicate(
    headers: HeaderMap,
    ctx: Extension<Arc<ServerContext>>,
) -> Result<Response, OAuthError> {
    let session = open_session(&ctx, &headers)?;

    match flow::identify(session.data()) {
        Transition::ConsentRequired => Ok(next_step(AUTHORIZE_PATH)),
        _ => {
            debug!("No identity in session, back to login");
            redirect(AUTHENTICATE_PATH)
        }
    }
}
