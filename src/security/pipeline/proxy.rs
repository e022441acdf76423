use axum::http::HeaderMap;
use std::net::IpAddr;
use tracing::debug;

use super::ip::FORWARDED_FOR;
use crate::security::config::SecurityConfig;
use crate::security::diagnostics::ProxyDiagnostics;

const CDN_RAY: &str = "cf-ray";
pub const FORWARDED_PREFIX: &str = "x-forwarded-prefix";

/// Note forwarded requests that arrive while no proxy is trusted. Never
/// affects the request.
pub fn detect(diagnostics: &ProxyDiagnostics, config: &SecurityConfig, headers: &HeaderMap, source: IpAddr) {
    if config.proxies() == 0 {
        if let Some(forwarded_for) = headers.get(FORWARDED_FOR).and_then(|v| v.to_str().ok()) {
            diagnostics.record_proxy(source, forwarded_for);
        }
    }
    if headers.contains_key(CDN_RAY) {
        diagnostics.record_cdn();
    }
}

/// Path prefix announced by a trusted reverse proxy, without a trailing
/// slash. Empty when no proxy is trusted or the value is not a plain
/// absolute path.
#[must_use]
pub fn rev_proxy_path(headers: &HeaderMap, proxies: usize) -> String {
    if proxies == 0 {
        return String::new();
    }
    let Some(prefix) = headers.get(FORWARDED_PREFIX).and_then(|v| v.to_str().ok()) else {
        return String::new();
    };
    let prefix = prefix.trim().trim_end_matches('/');
    if prefix.is_empty() {
        return String::new();
    }
    if !prefix.starts_with('/') || prefix.contains("//") || prefix.contains('\\') {
        debug!("ignoring forwarded prefix {prefix:?}");
        return String::new();
    }
    prefix.to_string()
}
