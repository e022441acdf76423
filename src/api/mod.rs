use anyhow::{Context, Result};
use axum::{
    body::Body,
    extract::MatchedPath,
    http::{HeaderName, HeaderValue, Request},
    middleware::from_fn_with_state,
    routing::{get, post},
    Extension, Router,
};
use axum_server::{tls_rustls::RustlsConfig, Handle};
use std::{
    net::{Ipv6Addr, SocketAddr},
    sync::Arc,
    time::Duration,
};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::{
    request_id::PropagateRequestIdLayer, set_header::SetRequestHeaderLayer, trace::TraceLayer,
};
use tracing::{error, info, info_span, Span};
use ulid::Ulid;

pub mod cookies;
pub mod handlers;
pub mod middleware;
mod openapi;

pub use handlers::auth::AuthState;
pub use openapi::openapi;

use crate::security::{events::spawn_event_logger, pipeline::Transport};
use handlers::{admin, auth, health};

const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Second listener serving the same routes over TLS.
pub struct HttpsListener {
    pub port: u16,
    pub config: RustlsConfig,
}

/// Every route, wrapped in the security pipeline and request tracing.
#[must_use]
pub fn router(auth_state: Arc<AuthState>) -> Router {
    Router::new()
        .route("/~/api/loginSrp1", post(auth::login::login_srp1))
        .route("/~/api/loginSrp2", post(auth::login::login_srp2))
        .route("/~/api/logout", post(auth::session::logout))
        .route("/~/api/session", get(auth::session::session))
        .route("/~/api/diagnostics", get(admin::diagnostics))
        .route("/~/api/invalidateSessions", post(admin::invalidate_sessions))
        .route("/~/api/openapi.json", get(openapi::openapi_json))
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
                .layer(Extension(auth_state.clone()))
                .layer(from_fn_with_state(auth_state, middleware::security)),
        )
}

/// Serve plain HTTP on `port` and, when configured, HTTPS next to it until
/// ctrl-c.
///
/// # Errors
/// Returns an error if a listener cannot be bound or fails while serving.
pub async fn new(auth_state: Arc<AuthState>, port: u16, https: Option<HttpsListener>) -> Result<()> {
    let _event_logger = spawn_event_logger(auth_state.security().events());

    let https = https.map(|listener| spawn_https(Arc::clone(&auth_state), listener));

    let app = router(auth_state).layer(Extension(Transport::Plain));
    let listener = TcpListener::bind(SocketAddr::from((Ipv6Addr::UNSPECIFIED, port)))
        .await
        .with_context(|| format!("Failed to bind HTTP port {port}"))?;

    info!("Listening on [::]:{}", port);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal())
    .await?;

    if let Some((handle, task)) = https {
        handle.graceful_shutdown(Some(SHUTDOWN_GRACE));
        task.await
            .context("HTTPS listener task failed")?
            .context("HTTPS listener failed")?;
    }

    Ok(())
}

fn spawn_https(
    auth_state: Arc<AuthState>,
    listener: HttpsListener,
) -> (Handle, tokio::task::JoinHandle<std::io::Result<()>>) {
    let handle = Handle::new();
    let status = auth_state.security().https().clone();
    let app = router(auth_state).layer(Extension(Transport::Secure));
    let addr = SocketAddr::from((Ipv6Addr::UNSPECIFIED, listener.port));

    let listening = handle.clone();
    let bound = status.clone();
    tokio::spawn(async move {
        if let Some(addr) = listening.listening().await {
            bound.set_working_port(addr.port());
            info!("HTTPS listening on {}", addr);
        }
    });

    let server = axum_server::bind_rustls(addr, listener.config)
        .handle(handle.clone())
        .serve(app.into_make_service_with_connect_info::<SocketAddr>());
    let task = tokio::spawn(async move {
        let result = server.await;
        status.clear();
        if let Err(err) = &result {
            error!("HTTPS listener stopped: {}", err);
        }
        result
    });

    (handle, task)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", err);
        std::future::pending::<()>().await;
    }
    info!("Gracefully shutdown");
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
