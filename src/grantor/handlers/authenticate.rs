use axum::{
    Json,
    extract::{Extension, Form, rejection::FormRejection},
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use std::sync::Arc;
use tracing::{info, instrument, warn};

use super::{open_session, persist_session, redirect};
use crate::grantor::{
    context::ServerContext,
    error::{ErrorResponse, OAuthError},
    flow::{self, AUTHENTICATE_PATH, IDENTICATE_PATH},
    types::{AuthenticateForm, NextStep},
};

#[utoipa::path(
    get,
    path = "/oauth2/authenticate",
    responses(
        (status = 200, description = "Where to post the credentials", body = NextStep)
    ),
    tag = "oauth2"
)]
pub async fn login_form() -> impl IntoResponse {
    Json(NextStep::post(AUTHENTICATE_PATH))
}

#[utoipa::path(
    post,
    path = "/oauth2/authenticate",
    request_body(content = AuthenticateForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 302, description = "Signed in, redirect to /oauth2/identicate"),
        (status = 400, description = "Missing username", body = ErrorResponse),
        (status = 401, description = "Invalid credentials", body = ErrorResponse)
    ),
    tag = "oauth2"
)]
#[instrument(skip(headers, ctx, form))]
pub async fn authenticate(
    headers: HeaderMap,
    ctx: Extension<Arc<ServerContext>>,
    form: Result<Form<AuthenticateForm>, FormRejection>,
) -> Result<Response, OAuthError> {
    let Form(form) = form.map_err(|e| OAuthError::InvalidRequest(e.body_text()))?;

    let mut session = open_session(&ctx, &headers)?;
    let (next, _) = flow::submit_credentials(
        session.data(),
        form.username.as_deref(),
        form.password.as_deref(),
        ctx.verifier(),
    )
    .inspect_err(|err| warn!("Authentication failed: {err}"))?;

    info!(user_id = next.logged_in_user_id.as_deref().unwrap_or_default(), "User authenticated");
    session.replace(next);

    Ok(persist_session(&ctx, &session, redirect(IDENTICATE_PATH)?))
}
