use anyhow::{Context, Result};
use axum::{
    Router,
    body::{Body, to_bytes},
    http::{
        Request, Response, StatusCode,
        header::{AUTHORIZATION, CACHE_CONTROL, CONTENT_TYPE, COOKIE, LOCATION, SET_COOKIE},
    },
};
use base64ct::{Base64, Encoding};
use grantor::grantor::{
    codec::{Algorithm, TokenCodec},
    context::ServerContext,
    credentials::StaticCredentials,
    registry::ClientRegistry,
    router,
    session::MemorySessionStore,
    store::{CredentialStore, StoreConfig},
};
use secrecy::SecretString;
use std::sync::Arc;
use tower::ServiceExt;
use url::{Url, form_urlencoded};

const CLIENT_ID: &str = "app1";
const CLIENT_SECRET: &str = "s3cr3t";
const REDIRECT_URI: &str = "https://client.example/cb";

fn context() -> Result<Arc<ServerContext>> {
    let mut registry = ClientRegistry::new();
    registry.register(format!("{CLIENT_ID}:{CLIENT_SECRET}:{REDIRECT_URI}").parse()?)?;
    registry.register("app2:other:https://two.example/cb".parse()?)?;

    let mut users = StaticCredentials::new();
    users.add("alice:wonderland")?;

    let codec = TokenCodec::new(
        SecretString::from("signing-key".to_string()),
        Some("k1".to_string()),
        Algorithm::HS512,
    )?;

    Ok(Arc::new(ServerContext::new(
        registry,
        Arc::new(CredentialStore::new(StoreConfig::new())),
        codec,
        Arc::new(MemorySessionStore::default()),
        Arc::new(users),
    )))
}

fn form(pairs: &[(&str, &str)]) -> String {
    form_urlencoded::Serializer::new(String::new())
        .extend_pairs(pairs)
        .finish()
}

fn authorize_query(client_id: &str, redirect_uri: &str) -> String {
    form(&[
        ("response_type", "code"),
        ("client_id", client_id),
        ("redirect_uri", redirect_uri),
        ("scope", "read"),
        ("state", "xyz"),
    ])
}

fn basic(id: &str, secret: &str) -> String {
    format!("Basic {}", Base64::encode_string(format!("{id}:{secret}").as_bytes()))
}

async fn send(app: &Router, request: Request<Body>) -> Result<Response<Body>> {
    Ok(app.clone().oneshot(request).await?)
}

async fn json(response: Response<Body>) -> Result<serde_json::Value> {
    let body = to_bytes(response.into_body(), usize::MAX).await?;
    Ok(serde_json::from_slice(&body)?)
}

fn header<'a>(response: &'a Response<Body>, name: axum::http::HeaderName) -> Result<&'a str> {
    response
        .headers()
        .get(&name)
        .with_context(|| format!("missing {name} header"))?
        .to_str()
        .context("header is not ascii")
}

/// `grantor_session=<key>` out of a Set-Cookie header.
fn session_cookie(response: &Response<Body>) -> Result<String> {
    let set_cookie = header(response, SET_COOKIE)?;
    let pair = set_cookie.split(';').next().context("empty cookie")?;
    Ok(pair.trim().to_string())
}

fn query_param(location: &str, name: &str) -> Result<Option<String>> {
    let url = Url::parse(location)?;
    Ok(url
        .query_pairs()
        .find(|(key, _)| key == name)
        .map(|(_, value)| value.into_owned()))
}

fn post_form(uri: &str, body: &str) -> Result<Request<Body>> {
    Ok(Request::builder()
        .method("POST")
        .uri(uri)
        .header(CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(body.to_string()))?)
}

/// Walk the browser part of the flow and return the redirect back to the client.
async fn obtain_code(app: &Router) -> Result<String> {
    let response = send(
        app,
        Request::builder()
            .uri(format!(
                "/oauth2/authorize?{}",
                authorize_query(CLIENT_ID, REDIRECT_URI)
            ))
            .body(Body::empty())?,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(header(&response, LOCATION)?, "/oauth2/authenticate");
    let cookie = session_cookie(&response)?;
    assert!(cookie.starts_with("grantor_session="));
    assert!(header(&response, SET_COOKIE)?.contains("HttpOnly"));

    let mut request = post_form(
        "/oauth2/authenticate",
        &form(&[("username", "alice"), ("password", "wonderland")]),
    )?;
    request.headers_mut().insert(COOKIE, cookie.parse()?);
    let response = send(app, request).await?;
    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(header(&response, LOCATION)?, "/oauth2/identicate");

    let response = send(
        app,
        Request::builder()
            .uri("/oauth2/identicate")
            .header(COOKIE, &cookie)
            .body(Body::empty())?,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);
    let next = json(response).await?;
    assert_eq!(next["action"], "/oauth2/authorize");
    assert_eq!(next["method"], "POST");

    let mut request = post_form("/oauth2/authorize", &form(&[("decision", "allow")]))?;
    request.headers_mut().insert(COOKIE, cookie.parse()?);
    let response = send(app, request).await?;
    assert_eq!(response.status(), StatusCode::FOUND);
    Ok(header(&response, LOCATION)?.to_string())
}

async fn exchange_code(app: &Router, code: &str) -> Result<Response<Body>> {
    let mut request = post_form(
        "/oauth2/token",
        &form(&[
            ("grant_type", "authorization_code"),
            ("code", code),
            ("redirect_uri", REDIRECT_URI),
        ]),
    )?;
    request
        .headers_mut()
        .insert(AUTHORIZATION, basic(CLIENT_ID, CLIENT_SECRET).parse()?);
    send(app, request).await
}

#[tokio::test]
async fn authorization_code_flow() -> Result<()> {
    let ctx = context()?;
    let app = router(ctx.clone());

    let location = obtain_code(&app).await?;
    assert!(location.starts_with(REDIRECT_URI));
    assert_eq!(query_param(&location, "state")?.as_deref(), Some("xyz"));
    let code = query_param(&location, "code")?.context("no code in redirect")?;

    let response = exchange_code(&app, &code).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(header(&response, CACHE_CONTROL)?, "no-store");
    let tokens = json(response).await?;
    assert_eq!(tokens["token_type"], "bearer");
    assert_eq!(tokens["scope"], "read");
    assert_eq!(tokens["expires_in"], 604_800);

    let access_token = tokens["access_token"].as_str().context("access_token")?;
    let verified = ctx.verify_access_token(access_token)?;
    assert_eq!(verified.client_id, CLIENT_ID);
    assert_eq!(verified.user_id, "alice");
    assert_eq!(verified.scope, "read");

    // the code is single use
    let response = exchange_code(&app, &code).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json(response).await?["error"], "invalid_grant");
    Ok(())
}

#[tokio::test]
async fn refresh_rotates_the_pair() -> Result<()> {
    let ctx = context()?;
    let app = router(ctx.clone());

    let location = obtain_code(&app).await?;
    let code = query_param(&location, "code")?.context("no code in redirect")?;
    let first = json(exchange_code(&app, &code).await?).await?;
    let old_access = first["access_token"].as_str().context("access_token")?;
    let old_refresh = first["refresh_token"].as_str().context("refresh_token")?;

    // client credentials in the form this time
    let refresh_body = form(&[
        ("grant_type", "refresh_token"),
        ("refresh_token", old_refresh),
        ("client_id", CLIENT_ID),
        ("client_secret", CLIENT_SECRET),
    ]);
    let response = send(&app, post_form("/oauth2/token", &refresh_body)?).await?;
    assert_eq!(response.status(), StatusCode::OK);
    let second = json(response).await?;
    let new_access = second["access_token"].as_str().context("access_token")?;

    assert_ne!(new_access, old_access);
    assert!(ctx.verify_access_token(new_access).is_ok());
    assert!(ctx.verify_access_token(old_access).is_err());

    let response = send(&app, post_form("/oauth2/token", &refresh_body)?).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json(response).await?["error"], "invalid_grant");
    Ok(())
}

#[tokio::test]
async fn code_is_bound_to_its_client() -> Result<()> {
    let app = router(context()?);

    let location = obtain_code(&app).await?;
    let code = query_param(&location, "code")?.context("no code in redirect")?;

    let mut request = post_form(
        "/oauth2/token",
        &form(&[
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", "https://two.example/cb"),
        ]),
    )?;
    request
        .headers_mut()
        .insert(AUTHORIZATION, basic("app2", "other").parse()?);
    let response = send(&app, request).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json(response).await?["error"], "invalid_grant");
    Ok(())
}

#[tokio::test]
async fn code_is_bound_to_its_redirect_uri() -> Result<()> {
    let app = router(context()?);

    let location = obtain_code(&app).await?;
    let code = query_param(&location, "code")?.context("no code in redirect")?;

    let mut request = post_form(
        "/oauth2/token",
        &form(&[
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", "https://client.example/other"),
        ]),
    )?;
    request
        .headers_mut()
        .insert(AUTHORIZATION, basic(CLIENT_ID, CLIENT_SECRET).parse()?);
    let response = send(&app, request).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = json(response).await?;
    assert_eq!(body["error"], "invalid_grant");
    assert_eq!(
        body["error_description"],
        "redirect_uri does not match the authorization request"
    );

    // the rejected attempt spent the code
    let response = exchange_code(&app, &code).await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json(response).await?["error"], "invalid_grant");
    Ok(())
}

#[tokio::test]
async fn consent_applies_to_the_latest_request() -> Result<()> {
    let app = router(context()?);

    // start a flow for app1 and sign in, but never decide
    let response = send(
        &app,
        Request::builder()
            .uri(format!(
                "/oauth2/authorize?{}",
                authorize_query(CLIENT_ID, REDIRECT_URI)
            ))
            .body(Body::empty())?,
    )
    .await?;
    let cookie = session_cookie(&response)?;

    let mut request = post_form(
        "/oauth2/authenticate",
        &form(&[("username", "alice"), ("password", "wonderland")]),
    )?;
    request.headers_mut().insert(COOKIE, cookie.parse()?);
    let response = send(&app, request).await?;
    assert_eq!(response.status(), StatusCode::FOUND);

    // then authorize app2 within the same session
    let app2 = [
        ("response_type", "code"),
        ("client_id", "app2"),
        ("redirect_uri", "https://two.example/cb"),
        ("scope", "write"),
        ("state", "second"),
    ];
    let response = send(
        &app,
        Request::builder()
            .uri(format!("/oauth2/authorize?{}", form(&app2)))
            .header(COOKIE, &cookie)
            .body(Body::empty())?,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);

    let mut decision = app2.to_vec();
    decision.push(("decision", "allow"));
    let mut request = post_form("/oauth2/authorize", &form(&decision))?;
    request.headers_mut().insert(COOKIE, cookie.parse()?);
    let response = send(&app, request).await?;
    assert_eq!(response.status(), StatusCode::FOUND);

    let location = header(&response, LOCATION)?;
    assert!(location.starts_with("https://two.example/cb"));
    assert_eq!(query_param(location, "state")?.as_deref(), Some("second"));
    let code = query_param(location, "code")?.context("no code in redirect")?;

    let mut request = post_form(
        "/oauth2/token",
        &form(&[
            ("grant_type", "authorization_code"),
            ("code", code.as_str()),
            ("redirect_uri", "https://two.example/cb"),
        ]),
    )?;
    request
        .headers_mut()
        .insert(AUTHORIZATION, basic("app2", "other").parse()?);
    let response = send(&app, request).await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json(response).await?["scope"], "write");
    Ok(())
}

#[tokio::test]
async fn token_endpoint_errors() -> Result<()> {
    let app = router(context()?);

    let response = send(
        &app,
        post_form("/oauth2/token", &form(&[("grant_type", "password")]))?,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(json(response).await?["error"], "unsupported_grant_type");

    let mut request = post_form(
        "/oauth2/token",
        &form(&[("grant_type", "authorization_code"), ("code", "nope")]),
    )?;
    request
        .headers_mut()
        .insert(AUTHORIZATION, basic(CLIENT_ID, "wrong").parse()?);
    let response = send(&app, request).await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(response.headers().contains_key("www-authenticate"));
    assert_eq!(json(response).await?["error"], "invalid_client");
    Ok(())
}

#[tokio::test]
async fn authorize_rejects_bad_requests_without_redirect() -> Result<()> {
    let app = router(context()?);

    let response = send(
        &app,
        Request::builder()
            .uri(format!(
                "/oauth2/authorize?{}",
                authorize_query(CLIENT_ID, "https://evil.example/cb")
            ))
            .body(Body::empty())?,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert!(response.headers().get(LOCATION).is_none());
    assert_eq!(json(response).await?["error"], "invalid_request");

    let response = send(
        &app,
        Request::builder()
            .uri(format!(
                "/oauth2/authorize?{}",
                authorize_query("unknown", REDIRECT_URI)
            ))
            .body(Body::empty())?,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json(response).await?["error"], "invalid_client");
    Ok(())
}

#[tokio::test]
async fn wrong_password_is_denied() -> Result<()> {
    let app = router(context()?);

    let response = send(
        &app,
        post_form(
            "/oauth2/authenticate",
            &form(&[("username", "alice"), ("password", "nope")]),
        )?,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(json(response).await?["error"], "access_denied");
    Ok(())
}

#[tokio::test]
async fn consent_denied_redirects_with_error() -> Result<()> {
    let app = router(context()?);

    let response = send(
        &app,
        Request::builder()
            .uri(format!(
                "/oauth2/authorize?{}",
                authorize_query(CLIENT_ID, REDIRECT_URI)
            ))
            .body(Body::empty())?,
    )
    .await?;
    let cookie = session_cookie(&response)?;

    let mut request = post_form(
        "/oauth2/authenticate",
        &form(&[("username", "alice"), ("password", "wonderland")]),
    )?;
    request.headers_mut().insert(COOKIE, cookie.parse()?);
    send(&app, request).await?;

    let mut request = post_form("/oauth2/authorize", &form(&[("decision", "deny")]))?;
    request.headers_mut().insert(COOKIE, cookie.parse()?);
    let response = send(&app, request).await?;
    assert_eq!(response.status(), StatusCode::FOUND);
    let location = header(&response, LOCATION)?;
    assert_eq!(
        query_param(location, "error")?.as_deref(),
        Some("access_denied")
    );
    assert_eq!(query_param(location, "state")?.as_deref(), Some("xyz"));
    assert_eq!(query_param(location, "code")?, None);
    Ok(())
}

#[tokio::test]
async fn health_and_request_id() -> Result<()> {
    let app = router(context()?);

    let response = send(
        &app,
        Request::builder().uri("/health").body(Body::empty())?,
    )
    .await?;
    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().contains_key("x-request-id"));
    assert!(response.headers().contains_key("x-app"));
    assert_eq!(json(response).await?["name"], env!("CARGO_PKG_NAME"));
    Ok(())
}
