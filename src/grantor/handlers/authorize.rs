use axum::{
    extract::{Extension, Form, Query, rejection::QueryRejection},
    http::HeaderMap,
    response::Response,
};
use std::sync::Arc;
use tracing::{debug, info, instrument};
use url::Url;

use super::{next_step, open_session, persist_session, redirect, save_session};
use crate::grantor::{
    context::ServerContext,
    error::{ErrorResponse, OAuthError},
    flow::{self, AUTHENTICATE_PATH, AUTHORIZE_PATH, Decision, Transition},
    registry::ClientRegistry,
    types::{AuthorizeForm, AuthorizeParams, NextStep, ValidatedAuthorize},
};

/// Check an authorization request against the registry: client first, then
/// the exact redirect target, then the response type.
///
/// # Errors
/// Never redirects; failures are rendered as JSON by the caller.
pub fn validate(
    registry: &ClientRegistry,
    params: &AuthorizeParams,
) -> Result<ValidatedAuthorize, OAuthError> {
    let client_id = params
        .client_id
        .as_deref()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| OAuthError::InvalidRequest("client_id is required".to_string()))?;

    let client = registry.lookup(client_id).map_err(|err| {
        debug!("Authorization request rejected: {err}");
        OAuthError::InvalidClient
    })?;

    if params.redirect_uri.as_deref() != Some(client.redirect_uri.as_str()) {
        return Err(OAuthError::InvalidRedirect);
    }

    if params.response_type.as_deref() != Some("code") {
        return Err(OAuthError::UnsupportedResponseType);
    }

    Ok(ValidatedAuthorize {
        client_id: client.id.clone(),
        redirect_uri: client.redirect_uri.clone(),
        scope: params.scope.clone().unwrap_or_default(),
        state: params.state.clone(),
    })
}

/// Append `pairs` and `state` to the registered redirect target.
fn client_redirect(
    redirect_uri: &str,
    pairs: &[(&str, &str)],
    state: Option<&str>,
) -> Result<String, OAuthError> {
    let mut url = Url::parse(redirect_uri).map_err(OAuthError::internal)?;
    {
        let mut query = url.query_pairs_mut();
        for (key, value) in pairs {
            query.append_pair(key, value);
        }
        if let Some(state) = state {
            query.append_pair("state", state);
        }
    }
    Ok(url.to_string())
}

#[utoipa::path(
    get,
    path = "/oauth2/authorize",
    params(AuthorizeParams),
    responses(
        (status = 302, description = "Not signed in, redirect to /oauth2/authenticate"),
        (status = 200, description = "Signed in, consent decision point", body = NextStep),
        (status = 400, description = "Invalid redirect_uri or response_type", body = ErrorResponse),
        (status = 401, description = "Unknown client", body = ErrorResponse)
    ),
    tag = "oauth2"
)]
#[instrument(skip(headers, ctx, params))]
pub async fn authorize(
    headers: HeaderMap,
    ctx: Extension<Arc<ServerContext>>,
    params: Result<Query<AuthorizeParams>, QueryRejection>,
) -> Result<Response, OAuthError> {
    let Query(params) = params.map_err(|e| OAuthError::InvalidRequest(e.body_text()))?;

    let validated = validate(ctx.registry(), &params)?;
    debug!(client_id = %validated.client_id, "Authorization request accepted");

    let mut session = open_session(&ctx, &headers)?;
    let (next, transition) = flow::begin(session.data(), params);
    session.replace(next);

    let response = match transition {
        Transition::RedirectToLogin => redirect(AUTHENTICATE_PATH)?,
        Transition::ConsentRequired => next_step(AUTHORIZE_PATH),
        other => {
            return Err(OAuthError::internal(format!(
                "unexpected transition on authorize: {other:?}"
            )));
        }
    };

    Ok(persist_session(&ctx, &session, response))
}

#[utoipa::path(
    post,
    path = "/oauth2/authorize",
    params(AuthorizeParams),
    request_body(content = AuthorizeForm, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 302, description = "Redirect to the client with code and state, or error=access_denied; or back to /oauth2/authenticate without identity"),
        (status = 400, description = "Invalid redirect_uri or response_type", body = ErrorResponse),
        (status = 401, description = "Unknown client", body = ErrorResponse)
    ),
    tag = "oauth2"
)]
#[instrument(skip(headers, ctx, query, form))]
pub async fn decide(
    headers: HeaderMap,
    ctx: Extension<Arc<ServerContext>>,
    query: Option<Query<AuthorizeParams>>,
    form: Option<Form<AuthorizeForm>>,
) -> Result<Response, OAuthError> {
    let (form_params, decision) = form.map(|Form(form)| form.split()).unwrap_or_default();
    let request = form_params.or(query.map(|Query(q)| q).unwrap_or_default());

    let mut session = open_session(&ctx, &headers)?;
    let (restored, params) = flow::restore(session.data(), request);
    session.replace(restored);

    let validated = match validate(ctx.registry(), &params) {
        Ok(validated) => validated,
        Err(err) => {
            // the stash is spent either way
            save_session(&ctx, &session);
            return Err(err);
        }
    };

    let (next, transition) = flow::decide(
        session.data(),
        params,
        Decision::from_form(decision.as_deref()),
    );
    session.replace(next);

    let response = match transition {
        Transition::RedirectToLogin => redirect(AUTHENTICATE_PATH)?,
        Transition::Decided {
            decision: Decision::Granted,
            user_id,
            ..
        } => {
            let grant = ctx
                .store()
                .create_grant(
                    &validated.client_id,
                    &user_id,
                    &validated.redirect_uri,
                    &validated.scope,
                )
                .map_err(OAuthError::internal)?;
            info!(client_id = %grant.client_id, user_id = %grant.user_id, "Authorization code issued");

            redirect(&client_redirect(
                &validated.redirect_uri,
                &[("code", &grant.code)],
                validated.state.as_deref(),
            )?)?
        }
        Transition::Decided {
            decision: Decision::Denied,
            user_id,
            ..
        } => {
            info!(client_id = %validated.client_id, user_id = %user_id, "Authorization denied by user");

            redirect(&client_redirect(
                &validated.redirect_uri,
                &[("error", "access_denied")],
                validated.state.as_deref(),
            )?)?
        }
        other => {
            return Err(OAuthError::internal(format!(
                "unexpected transition on decision: {other:?}"
            )));
        }
    };

    Ok(persist_session(&ctx, &session, response))
}
