use anyhow::Result;
use axum::{
    Extension, Router,
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    routing::get,
};
use std::{sync::Arc, time::Duration};
use tokio::{net::TcpListener, task::JoinHandle};
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{Span, debug, error, info, info_span};
use ulid::Ulid;

pub mod codec;
pub mod context;
pub mod credentials;
pub mod error;
pub mod flow;
pub mod handlers;
pub mod registry;
pub mod session;
pub mod store;
pub mod types;
pub mod utils;

mod openapi;
pub use openapi::openapi;

use self::{
    context::ServerContext,
    flow::{AUTHENTICATE_PATH, AUTHORIZE_PATH, IDENTICATE_PATH, TOKEN_PATH},
    handlers::{authenticate, authorize, health, identicate, token},
};

/// Routing table for every endpoint the server exposes.
#[must_use]
pub fn router(ctx: Arc<ServerContext>) -> Router {
    Router::new()
        .route(
            AUTHORIZE_PATH,
            get(authorize::authorize).post(authorize::decide),
        )
        .route(
            AUTHENTICATE_PATH,
            get(authenticate::login_form).post(authenticate::authenticate),
        )
        .route(IDENTICATE_PATH, get(identicate::identicate))
        .route(TOKEN_PATH, get(token::token_query).post(token::token))
        .route("/health", get(health::health).options(health::health))
        .layer(
            ServiceBuilder::new()
                .layer(SetRequestHeaderLayer::if_not_present(
                    HeaderName::from_static("x-request-id"),
                    |_req: &_| HeaderValue::from_str(Ulid::new().to_string().as_str()).ok(),
                ))
                .layer(PropagateRequestIdLayer::new(HeaderName::from_static(
                    "x-request-id",
                )))
                .layer(TraceLayer::new_for_http().make_span_with(make_span))
                .layer(Extension(ctx)),
        )
}

/// Reclaim expired credentials and sessions every `every`.
pub fn spawn_purge_task(ctx: Arc<ServerContext>, every: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(every);
        loop {
            interval.tick().await;
            let credentials = ctx.store().purge_expired();
            let sessions = ctx.sessions().purge_expired();
            if credentials + sessions > 0 {
                debug!(credentials, sessions, "Purged expired entries");
            }
        }
    })
}

/// Start the server
/// # Errors
/// Return error if failed to bind or serve
pub async fn new(port: u16, ctx: Arc<ServerContext>, purge_every: Duration) -> Result<()> {
    let purge = spawn_purge_task(ctx.clone(), purge_every);

    let app = router(ctx);

    let listener = TcpListener::bind(format!("::0:{port}")).await?;

    info!("Listening on [::]:{}", port);

    axum::serve(listener, app.into_make_service())
        .with_graceful_shutdown(async {
            if let Err(err) = tokio::signal::ctrl_c().await {
                error!("Failed to listen for shutdown signal: {err}");
                std::future::pending::<()>().await;
            }
            info!("Gracefully shutdown");
        })
        .await?;

    purge.abort();

    Ok(())
}

fn make_span(request: &Request<Body>) -> Span {
    let request_id = request
        .headers()
        .get("x-request-id")
        .and_then(|val| val.to_str().ok())
        .unwrap_or("none");
    let matched_path = request
        .extensions()
        .get::<MatchedPath>()
        .map_or_else(|| request.uri().path(), MatchedPath::as_str);

    info_span!(
        "http.request",
        http.method = %request.method(),
        http.route = matched_path,
        request_id
    )
}
