use axum::{
    Json,
    extract::{
        Extension, Form, Query,
        rejection::{FormRejection, QueryRejection},
    },
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{AUTHORIZATION, CACHE_CONTROL, PRAGMA},
    },
    response::{IntoResponse, Response},
};
use base64ct::{Base64, Encoding};
use percent_encoding::percent_decode_str;
use std::sync::Arc;
use tracing::{debug, info, instrument};

use crate::grantor::{
    codec::AccessTokenClaims,
    context::ServerContext,
    error::{ErrorResponse, OAuthError},
    store::{AccessToken, RefreshToken, StoreError},
    types::{TokenRequest, TokenResponse},
};

const GRANT_AUTHORIZATION_CODE: &str = "authorization_code";
const GRANT_REFRESH_TOKEN: &str = "refresh_token";

/// Credentials from an `Authorization: Basic` header, if one is present.
fn basic_credentials(headers: &HeaderMap) -> Result<Option<(String, String)>, OAuthError> {
    let Some(value) = headers.get(AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value.to_str().map_err(|_| OAuthError::InvalidClient)?.trim();
    let Some((scheme, encoded)) = value.split_once(' ') else {
        return Ok(None);
    };
    if !scheme.eq_ignore_ascii_case("basic") {
        return Ok(None);
    }

    let decoded = Base64::decode_vec(encoded.trim()).map_err(|_| OAuthError::InvalidClient)?;
    let decoded = String::from_utf8(decoded).map_err(|_| OAuthError::InvalidClient)?;
    let (id, secret) = decoded.split_once(':').ok_or(OAuthError::InvalidClient)?;

    Ok(Some((form_decode(id)?, form_decode(secret)?)))
}

/// Undo `application/x-www-form-urlencoded` encoding of a Basic credential.
fn form_decode(value: &str) -> Result<String, OAuthError> {
    let value = value.replace('+', " ");
    percent_decode_str(&value)
        .decode_utf8()
        .map(|decoded| decoded.into_owned())
        .map_err(|_| OAuthError::InvalidClient)
}

/// Authenticate the calling client via HTTP Basic or the form fields.
fn authenticate_client(
    ctx: &ServerContext,
    headers: &HeaderMap,
    request: &TokenRequest,
) -> Result<String, OAuthError> {
    let (client_id, secret) = match basic_credentials(headers)? {
        Some(credentials) => credentials,
        None => (
            request.client_id.clone().ok_or(OAuthError::InvalidClient)?,
            request.client_secret.clone().unwrap_or_default(),
        ),
    };

    if ctx.registry().verify_secret(&client_id, &secret) {
        Ok(client_id)
    } else {
        debug!(client_id = %client_id, "Client authentication failed");
        Err(OAuthError::InvalidClient)
    }
}

fn required<'a>(value: Option<&'a str>, name: &str) -> Result<&'a str, OAuthError> {
    value
        .filter(|v| !v.is_empty())
        .ok_or_else(|| OAuthError::InvalidRequest(format!("{name} is required")))
}

fn grant_error(kind: &str, err: StoreError) -> OAuthError {
    match err {
        StoreError::Rng(_) => OAuthError::internal(err),
        other => OAuthError::InvalidGrant(format!("{kind} {other}")),
    }
}

/// Sign the access token and render the pair.
fn token_response(
    ctx: &ServerContext,
    access: &AccessToken,
    refresh: &RefreshToken,
) -> Result<Response, OAuthError> {
    let claims = AccessTokenClaims {
        jti: access.token.clone(),
        aud: access.client_id.clone(),
        sub: access.user_id.clone(),
        scope: access.scope.clone(),
        iat: access.issued_at,
        exp: access.expires_at,
    };
    let access_token = ctx.codec().encode(&claims).map_err(OAuthError::internal)?;

    let body = TokenResponse {
        access_token,
        token_type: "bearer".to_string(),
        expires_in: access.expires_at - access.issued_at,
        refresh_token: refresh.token.clone(),
        scope: access.scope.clone(),
    };

    let mut headers = HeaderMap::new();
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
    headers.insert(PRAGMA, HeaderValue::from_static("no-cache"));

    Ok((StatusCode::OK, headers, Json(body)).into_response())
}

fn exchange(
    ctx: &ServerContext,
    headers: &HeaderMap,
    request: &TokenRequest,
) -> Result<Response, OAuthError> {
    let grant_type = required(request.grant_type.as_deref(), "grant_type")?;
    if grant_type != GRANT_AUTHORIZATION_CODE && grant_type != GRANT_REFRESH_TOKEN {
        return Err(OAuthError::UnsupportedGrantType);
    }

    let client_id = authenticate_client(ctx, headers, request)?;

    let (access, refresh) = if grant_type == GRANT_AUTHORIZATION_CODE {
        let code = required(request.code.as_deref(), "code")?;
        let grant = ctx
            .store()
            .consume_grant(code)
            .map_err(|err| grant_error("authorization code", err))?;

        if grant.client_id != client_id {
            return Err(OAuthError::InvalidGrant(
                "authorization code was issued to another client".to_string(),
            ));
        }
        if request.redirect_uri.as_deref() != Some(grant.redirect_uri.as_str()) {
            return Err(OAuthError::InvalidGrant(
                "redirect_uri does not match the authorization request".to_string(),
            ));
        }

        ctx.store()
            .issue_tokens(&grant.client_id, &grant.user_id, &grant.scope)
            .map_err(OAuthError::internal)?
    } else {
        let refresh_token = required(request.refresh_token.as_deref(), "refresh_token")?;
        ctx.store()
            .refresh_tokens(refresh_token, &client_id)
            .map_err(|err| grant_error("refresh token", err))?
    };

    info!(
        client_id = %access.client_id,
        user_id = %access.user_id,
        grant_type,
        "Access token issued"
    );

    token_response(ctx, &access, &refresh)
}

#[utoipa::path(
    post,
    path = "/oauth2/token",
    request_body(content = TokenRequest, content_type = "application/x-www-form-urlencoded"),
    responses(
        (status = 200, description = "Token pair issued", body = TokenResponse),
        (status = 400, description = "Invalid grant or request", body = ErrorResponse),
        (status = 401, description = "Client authentication failed", body = ErrorResponse)
    ),
    tag = "oauth2"
)]
#[instrument(skip(headers, ctx, form))]
pub async fn token(
    headers: HeaderMap,
    ctx: Extension<Arc<ServerContext>>,
    form: Result<Form<TokenRequest>, FormRejection>,
) -> Result<Response, OAuthError> {
    let Form(request) = form.map_err(|e| OAuthError::InvalidRequest(e.body_text()))?;
    exchange(&ctx, &headers, &request)
}

#[utoipa::path(
    get,
    path = "/oauth2/token",
    params(TokenRequest),
    responses(
        (status = 200, description = "Token pair issued", body = TokenResponse),
        (status = 400, description = "Invalid grant or request", body = ErrorResponse),
        (status = 401, description = "Client authentication failed", body = ErrorResponse)
    ),
    tag = "oauth2"
)]
#[instrument(skip(headers, ctx, query))]
pub async fn token_query(
    headers: HeaderMap,
    ctx: Extension<Arc<ServerContext>>,
    query: Result<Query<TokenRequest>, QueryRejection>,
) -> Result<Response, OAuthError> {
    let Query(request) = query.map_err(|e| OAuthError::InvalidRequest(e.body_text()))?;
    exchange(&ctx, &headers, &request)
}
