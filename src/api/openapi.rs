#![allow(clippy::needless_for_each)]

use axum::Json;
use utoipa::OpenApi;

use super::handlers::{admin, auth, health};
use crate::security::diagnostics::{DiagnosticsReport, ProxyDetection};

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health,
        auth::login::login_srp1,
        auth::login::login_srp2,
        auth::session::session,
        auth::session::logout,
        admin::diagnostics,
        admin::invalidate_sessions,
    ),
    components(
        schemas(
            health::Health,
            auth::types::LoginSrp1Request,
            auth::types::LoginSrp1Response,
            auth::types::LoginSrp2Request,
            auth::types::LoginSrp2Response,
            auth::types::SessionResponse,
            auth::types::InvalidateSessionsRequest,
            DiagnosticsReport,
            ProxyDetection,
        )
    ),
    tags(
        (name = "auth", description = "SRP login and sessions"),
        (name = "admin", description = "Local administration"),
        (name = "health", description = "Service status"),
    )
)]
struct ApiDoc;

#[must_use]
pub fn openapi() -> utoipa::openapi::OpenApi {
    ApiDoc::openapi()
}

pub async fn openapi_json() -> Json<utoipa::openapi::OpenApi> {
    Json(openapi())
}
