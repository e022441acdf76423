//! Session endpoints.

use axum::{
    extract::Extension,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use std::sync::Arc;

use super::{state::AuthState, types::SessionResponse};
use crate::api::middleware::SessionSlot;
use crate::security::pipeline::RequestState;

#[utoipa::path(
    get,
    path = "/~/api/session",
    responses(
        (status = 200, description = "Session is active", body = SessionResponse),
        (status = 204, description = "No active session")
    ),
    tag = "auth"
)]
pub async fn session(Extension(request_state): Extension<RequestState>) -> impl IntoResponse {
    match request_state.account {
        Some(account) => {
            let response = SessionResponse {
                username: account.username,
                expire: account.expire,
            };
            (StatusCode::OK, Json(response)).into_response()
        }
        None => StatusCode::NO_CONTENT.into_response(),
    }
}

#[utoipa::path(
    post,
    path = "/~/api/logout",
    responses(
        (status = 200, description = "Session cleared")
    ),
    tag = "auth"
)]
pub async fn logout(
    auth_state: Extension<Arc<AuthState>>,
    Extension(slot): Extension<SessionSlot>,
) -> impl IntoResponse {
    // The cookie is dropped when the response is finalized.
    slot.update(|session| auth_state.security().sessions().terminate_session(session));
    StatusCode::OK
}
