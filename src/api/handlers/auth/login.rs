//! Interactive SRP login endpoints.

use axum::{
    extract::Extension,
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use std::sync::Arc;
use tracing::{debug, error};
use uuid::Uuid;

use super::{
    state::AuthState,
    types::{LoginSrp1Request, LoginSrp1Response, LoginSrp2Request, LoginSrp2Response},
    utils::{decode_base64_field, encode_base64},
};
use crate::api::middleware::SessionSlot;
use crate::security::{
    pipeline::RequestState, AuthEvent, HookDecision, LoginAttempt, LoginVia,
};

fn unauthorized() -> Response {
    (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()).into_response()
}

#[utoipa::path(
    post,
    path = "/~/api/loginSrp1",
    request_body = LoginSrp1Request,
    responses(
        (status = 200, description = "Challenge issued", body = LoginSrp1Response),
        (status = 400, description = "Validation error", body = String),
        (status = 500, description = "Stored credentials are unusable", body = String)
    ),
    tag = "auth"
)]
pub async fn login_srp1(
    auth_state: Extension<Arc<AuthState>>,
    payload: Option<Json<LoginSrp1Request>>,
) -> impl IntoResponse {
    let request: LoginSrp1Request = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let ctx = auth_state.security();
    let username = ctx.accounts().normalize_username(&request.username);
    if username.is_empty() {
        return (StatusCode::BAD_REQUEST, "Missing username".to_string()).into_response();
    }

    // Unknown users and users who cannot log in get a decoy challenge, so the
    // answer does not reveal which accounts exist.
    let account = ctx
        .accounts()
        .get_account(&username)
        .await
        .filter(|account| ctx.accounts().account_can_login(account));

    let verifier = ctx.verifier().clone();
    let decoy_name = username.clone();
    let issued = tokio::task::spawn_blocking(move || match account {
        Some(account) => verifier
            .challenge(&account)
            .map(|(challenge, session)| (challenge, session, true)),
        None => {
            let (challenge, session) = verifier.decoy_challenge(&decoy_name);
            Ok((challenge, session, false))
        }
    })
    .await;

    let (challenge, session, genuine) = match issued {
        Ok(Ok(issued)) => issued,
        Ok(Err(err)) => {
            error!("{err}");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Login failed".to_string()).into_response();
        }
        Err(err) => {
            error!("Challenge task failed: {err}");
            return (StatusCode::INTERNAL_SERVER_ERROR, "Login failed".to_string()).into_response();
        }
    };

    let login_id = auth_state.logins().store(session, username, genuine).await;
    let response = LoginSrp1Response {
        login_id: login_id.to_string(),
        salt: encode_base64(&challenge.salt),
        pub_key: encode_base64(&challenge.server_public),
    };
    (StatusCode::OK, Json(response)).into_response()
}

#[utoipa::path(
    post,
    path = "/~/api/loginSrp2",
    request_body = LoginSrp2Request,
    responses(
        (status = 200, description = "Logged in", body = LoginSrp2Response),
        (status = 400, description = "Validation error", body = String),
        (status = 401, description = "Unauthorized", body = String)
    ),
    tag = "auth"
)]
pub async fn login_srp2(
    auth_state: Extension<Arc<AuthState>>,
    Extension(request_state): Extension<RequestState>,
    Extension(slot): Extension<SessionSlot>,
    payload: Option<Json<LoginSrp2Request>>,
) -> impl IntoResponse {
    let request: LoginSrp2Request = match payload {
        Some(Json(payload)) => payload,
        None => return (StatusCode::BAD_REQUEST, "Missing payload".to_string()).into_response(),
    };

    let Ok(login_id) = Uuid::parse_str(request.login_id.trim()) else {
        return (StatusCode::BAD_REQUEST, "Invalid login id".to_string()).into_response();
    };
    let client_public = match decode_base64_field("pub_key", &request.pub_key) {
        Ok(bytes) => bytes,
        Err(err) => return (StatusCode::BAD_REQUEST, err).into_response(),
    };
    let client_proof = match decode_base64_field("proof", &request.proof) {
        Ok(bytes) => bytes,
        Err(err) => return (StatusCode::BAD_REQUEST, err).into_response(),
    };

    let Some(pending) = auth_state.logins().take(login_id).await else {
        debug!("unknown or expired login id");
        return unauthorized();
    };

    let ctx = auth_state.security();
    let ip = request_state.ip;
    let username = pending.username;
    let attempt = LoginAttempt {
        username: username.clone(),
        ip,
        via: LoginVia::Srp,
    };
    if ctx.events().attempting_login(&attempt).await == HookDecision::Veto {
        debug!("login attempt for {username} vetoed");
        return unauthorized();
    }

    let challenge = pending.challenge;
    let verified = tokio::task::spawn_blocking(move || challenge.finish(&client_public, &client_proof))
        .await
        .ok()
        .and_then(Result::ok);

    let account = if pending.genuine {
        ctx.accounts()
            .get_account(&username)
            .await
            .filter(|account| ctx.accounts().account_can_login(account))
    } else {
        None
    };
    let (Some(server_proof), Some(account)) = (verified, account) else {
        ctx.events().publish(AuthEvent::FailedLogin {
            username,
            ip,
            via: LoginVia::Srp,
        });
        return unauthorized();
    };

    let mut session = slot.snapshot();
    ctx.sessions()
        .establish_session(
            &mut session,
            &account,
            ip,
            request.allow_session_ip_change,
            LoginVia::Srp,
        )
        .await;
    slot.replace(session);

    // First login may have just fixed the expiry.
    let expire = ctx
        .accounts()
        .get_account(&account.username)
        .await
        .and_then(|stored| stored.expire);
    let response = LoginSrp2Response {
        username: account.username,
        proof: encode_base64(&server_proof),
        expire,
    };
    (StatusCode::OK, Json(response)).into_response()
}
