use axum::http::HeaderMap;
use std::net::IpAddr;

pub const FORWARDED_FOR: &str = "x-forwarded-for";

/// IPv4-mapped IPv6 addresses become plain IPv4.
#[must_use]
pub fn normalize_ip(ip: IpAddr) -> IpAddr {
    match ip {
        IpAddr::V6(v6) => v6.to_ipv4_mapped().map_or(ip, IpAddr::V4),
        IpAddr::V4(_) => ip,
    }
}

/// Address of the client. With `proxies` trusted hops the address is read
/// from `X-Forwarded-For`, counting hops from the right.
#[must_use]
pub fn client_ip(headers: &HeaderMap, peer: IpAddr, proxies: usize) -> IpAddr {
    if proxies == 0 {
        return normalize_ip(peer);
    }
    let forwarded: Vec<&str> = headers
        .get_all(FORWARDED_FOR)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(','))
        .map(str::trim)
        .filter(|entry| !entry.is_empty())
        .collect();
    let index = forwarded.len().saturating_sub(proxies);
    forwarded
        .get(index)
        .and_then(|entry| entry.parse::<IpAddr>().ok())
        .map_or_else(|| normalize_ip(peer), normalize_ip)
}

#[must_use]
pub fn is_loopback(ip: IpAddr) -> bool {
    normalize_ip(ip).is_loopback()
}
