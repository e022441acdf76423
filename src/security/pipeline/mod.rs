//! Request security pipeline.
//!
//! Stages run in a fixed order and any of them may end the request early:
//! session binding, traversal guard, block list, proxy detection, HTTPS
//! upgrade, parameter decoding, identity resolution and the permission gate.

pub mod gate;
pub mod https;
pub mod identity;
pub mod ip;
pub mod params;
pub mod proxy;
pub mod traversal;

use axum::{
    extract::Request,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use std::net::{IpAddr, SocketAddr};
use tracing::debug;

use super::{
    account::Account, blocklist::Connection, events::LoginVia, session::Session, SecurityContext,
};
pub use params::Params;

pub const API_PREFIX: &str = "/~/api/";

/// Which listener accepted the connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Plain,
    Secure,
}

impl Transport {
    #[must_use]
    pub const fn is_secure(self) -> bool {
        matches!(self, Self::Secure)
    }
}

/// Request extension exempting a request from the block list.
#[derive(Debug, Clone, Copy)]
pub struct SkipFilters;

/// Outcome of the pipeline, available to handlers as a request extension.
#[derive(Debug, Clone)]
pub struct RequestState {
    /// Logged-in account, when the permission gate allowed it.
    pub account: Option<Account>,
    pub connection: Connection,
    pub ip: IpAddr,
    /// Path prefix added by a reverse proxy, empty when none.
    pub rev_proxy_path: String,
    pub params: Params,
    /// Set when this very request carried the credentials.
    pub logged_in_via: Option<LoginVia>,
}

/// Run every stage. `Ok` carries the request, with [`RequestState`]
/// attached, on to the handler; `Err` is the final response.
///
/// # Errors
/// Returns the response of the stage that ended the request.
pub async fn run(
    ctx: &SecurityContext,
    request: Request,
    peer: SocketAddr,
    transport: Transport,
    session: &mut Session,
) -> Result<Request, Response> {
    let config = ctx.config();
    let secure = transport.is_secure();
    let ip = ip::client_ip(request.headers(), peer.ip(), config.proxies());

    let check = ctx
        .sessions()
        .validate_on_request(session, ip, secure, config.allow_session_ip_change());
    debug!(?check, "session checked");

    if let Err(err) = traversal::check_path(request.uri().path()) {
        debug!(%ip, "refused {}: {err}", request.uri().path());
        return Err(StatusCode::IM_A_TEAPOT.into_response());
    }

    let connection = Connection {
        peer,
        secure,
    };
    if request.extensions().get::<SkipFilters>().is_none()
        && ctx.block_list().apply_block(&connection, ip)
    {
        let mut response = StatusCode::FORBIDDEN.into_response();
        response
            .headers_mut()
            .insert(header::CONNECTION, HeaderValue::from_static("close"));
        return Err(response);
    }

    proxy::detect(ctx.diagnostics(), &config, request.headers(), ip);

    if let Some(redirect) = https::upgrade(
        &config,
        ctx.https().working_port(),
        request.headers(),
        request.uri(),
        ip,
        secure,
    ) {
        return Err(redirect);
    }

    let (mut request, params) = params::decode(request).await?;

    let rev_proxy_path = proxy::rev_proxy_path(request.headers(), config.proxies());

    let resolved = identity::resolve(
        ctx,
        config.authorization_header(),
        &mut request,
        session,
        ip,
        &params,
        &rev_proxy_path,
    )
    .await?;
    let account = gate::permit(ctx, session, resolved.account, ip);

    request.extensions_mut().insert(RequestState {
        account,
        connection,
        ip,
        rev_proxy_path,
        params,
        logged_in_via: resolved.via,
    });
    Ok(request)
}
