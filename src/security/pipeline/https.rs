use axum::{
    http::{header, HeaderMap, Uri},
    response::{IntoResponse, Redirect, Response},
};
use std::net::IpAddr;
use tracing::debug;
use url::Url;

use super::ip::is_loopback;
use crate::security::config::SecurityConfig;

/// Send plaintext clients to the HTTPS listener. 307 keeps the method and
/// body. Loopback clients are never redirected.
pub fn upgrade(
    config: &SecurityConfig,
    https_port: Option<u16>,
    headers: &HeaderMap,
    uri: &Uri,
    ip: IpAddr,
    secure: bool,
) -> Option<Response> {
    if secure || !config.force_https() || is_loopback(ip) {
        return None;
    }
    let port = https_port?;
    let host = headers
        .get(header::HOST)
        .and_then(|value| value.to_str().ok())
        .or_else(|| uri.authority().map(|authority| authority.as_str()))?;
    let path_and_query = uri.path_and_query().map_or("/", |pq| pq.as_str());
    let location = https_location(host, path_and_query, port)?;
    debug!("redirecting to {location}");
    Some(Redirect::temporary(&location).into_response())
}

#[must_use]
pub fn https_location(host: &str, path_and_query: &str, port: u16) -> Option<String> {
    let mut url = Url::parse(&format!("http://{host}{path_and_query}")).ok()?;
    url.set_scheme("https").ok()?;
    url.set_port(Some(port)).ok()?;
    Some(url.to_string())
}
