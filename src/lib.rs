//! # Warden (authentication and request security)
//!
//! `warden` guards a multi-user file server. Every request passes through an
//! ordered security pipeline before any handler runs:
//!
//! 1. client address resolution (trusting a configured number of proxies),
//! 2. session revocation, expiry and IP-binding checks,
//! 3. directory traversal rejection at every percent-encoding depth,
//! 4. block-list filtering,
//! 5. proxy/CDN detection for diagnostics,
//! 6. plain HTTP to HTTPS upgrade,
//! 7. parameter decoding and identity resolution (URL, `Authorization`
//!    header or session),
//! 8. the final login gate (disabled, expired, network restricted accounts).
//!
//! ## Authentication (`SRP`)
//!
//! Passwords are never stored nor sent. Accounts carry an SRP-6a record
//! (`salt|verifier`); interactive logins run the two-step exchange under
//! `/~/api/loginSrp1` and `/~/api/loginSrp2`. Unknown users get a decoy
//! challenge indistinguishable from a real one. Password checks for URL and
//! header logins are single-flight: concurrent identical checks share one
//! computation whose result is kept for a minute.
//!
//! ## Sessions
//!
//! Sessions live in signed cookies, one per scheme (`warden_http`,
//! `warden_https`). A session is bound to the address that created it unless
//! the configuration or the login request allows the address to change, and
//! every session of a user can be revoked at once.

pub mod api;
pub mod cli;
pub mod security;
pub mod tls;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};
