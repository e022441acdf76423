//! Administration endpoints, served to loopback clients only.

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;
use tracing::info;

use super::auth::{types::InvalidateSessionsRequest, AuthState};
use crate::security::{
    diagnostics::DiagnosticsReport,
    pipeline::{ip::is_loopback, RequestState},
};

fn forbidden() -> axum::response::Response {
    (StatusCode::FORBIDDEN, "Forbidden".to_string()).into_response()
}

#[utoipa::path(
    get,
    path = "/~/api/diagnostics",
    responses(
        (status = 200, description = "Proxy and CDN detection state", body = DiagnosticsReport),
        (status = 403, description = "Not a local client", body = String)
    ),
    tag = "admin"
)]
pub async fn diagnostics(
    auth_state: Extension<Arc<AuthState>>,
    Extension(request_state): Extension<RequestState>,
) -> impl IntoResponse {
    if !is_loopback(request_state.ip) {
        return forbidden();
    }
    let ctx = auth_state.security();
    let report = ctx.diagnostics().report(ctx.config().ignore_proxies());
    (StatusCode::OK, Json(report)).into_response()
}

#[utoipa::path(
    post,
    path = "/~/api/invalidateSessions",
    request_body = InvalidateSessionsRequest,
    responses(
        (status = 200, description = "Existing sessions of the user are logged out"),
        (status = 400, description = "Validation error", body = String),
        (status = 403, description = "Not a local client", body = String)
    ),
    tag = "admin"
)]
pub async fn invalidate_sessions(
    auth_state: Extension<Arc<AuthState>>,
    Extension(request_state): Extension<RequestState>,
    payload: Option<Json<InvalidateSessionsRequest>>,
) -> impl IntoResponse {
    if !is_loopback(request_state.ip) {
        return forbidden();
    }
    let Some(Json(request)) = payload else {
        return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response();
    };
    if request.username.trim().is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing username".to_string()).into_response();
    }
    auth_state
        .security()
        .sessions()
        .invalidate_sessions(&request.username);
    info!("Sessions of {} invalidated", request.username.trim());
    StatusCode::OK.into_response()
}
