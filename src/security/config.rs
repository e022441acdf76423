//! Runtime security settings. A snapshot is taken per request from a `watch`
//! channel so changes apply to the next request without locking.

use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU16, Ordering};
use std::sync::Arc;
use std::time::Duration;

const DEFAULT_SESSION_DURATION_SECONDS: u64 = 24 * 60 * 60;

/// Whether a logged-in session may move to another client address.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum IpChangePolicy {
    #[default]
    Never,
    Always,
    /// Only when the request arrives over TLS.
    SecureOnly,
}

impl IpChangePolicy {
    #[must_use]
    pub const fn permits(self, secure: bool) -> bool {
        match self {
            Self::Never => false,
            Self::Always => true,
            Self::SecureOnly => secure,
        }
    }

    /// Per-session overrides are plain booleans.
    #[must_use]
    pub const fn from_override(allow: bool) -> Self {
        if allow {
            Self::Always
        } else {
            Self::Never
        }
    }
}

impl FromStr for IpChangePolicy {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_lowercase().as_str() {
            "false" | "no" | "0" => Ok(Self::Never),
            "true" | "yes" | "1" => Ok(Self::Always),
            "https" => Ok(Self::SecureOnly),
            other => Err(format!("invalid ip change policy: {other}")),
        }
    }
}

impl fmt::Display for IpChangePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            Self::Never => "false",
            Self::Always => "true",
            Self::SecureOnly => "https",
        };
        f.write_str(value)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SecurityConfig {
    allow_session_ip_change: IpChangePolicy,
    force_https: bool,
    ignore_proxies: bool,
    authorization_header: bool,
    session_duration: Duration,
    proxies: usize,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            allow_session_ip_change: IpChangePolicy::Never,
            force_https: true,
            ignore_proxies: false,
            authorization_header: true,
            session_duration: Duration::from_secs(DEFAULT_SESSION_DURATION_SECONDS),
            proxies: 0,
        }
    }
}

impl SecurityConfig {
    #[must_use]
    pub fn with_allow_session_ip_change(mut self, policy: IpChangePolicy) -> Self {
        self.allow_session_ip_change = policy;
        self
    }

    #[must_use]
    pub fn with_force_https(mut self, force: bool) -> Self {
        self.force_https = force;
        self
    }

    #[must_use]
    pub fn with_ignore_proxies(mut self, ignore: bool) -> Self {
        self.ignore_proxies = ignore;
        self
    }

    #[must_use]
    pub fn with_authorization_header(mut self, enabled: bool) -> Self {
        self.authorization_header = enabled;
        self
    }

    #[must_use]
    pub fn with_session_duration(mut self, duration: Duration) -> Self {
        self.session_duration = duration;
        self
    }

    /// Number of trusted reverse-proxy hops in front of the server.
    #[must_use]
    pub fn with_proxies(mut self, proxies: usize) -> Self {
        self.proxies = proxies;
        self
    }

    #[must_use]
    pub fn allow_session_ip_change(&self) -> IpChangePolicy {
        self.allow_session_ip_change
    }

    #[must_use]
    pub fn force_https(&self) -> bool {
        self.force_https
    }

    #[must_use]
    pub fn ignore_proxies(&self) -> bool {
        self.ignore_proxies
    }

    #[must_use]
    pub fn authorization_header(&self) -> bool {
        self.authorization_header
    }

    #[must_use]
    pub fn session_duration(&self) -> Duration {
        self.session_duration
    }

    #[must_use]
    pub fn proxies(&self) -> usize {
        self.proxies
    }
}

/// Port of the HTTPS listener while it is bound, shared with the listener task.
#[derive(Clone, Debug, Default)]
pub struct HttpsStatus(Arc<AtomicU16>);

impl HttpsStatus {
    pub fn set_working_port(&self, port: u16) {
        self.0.store(port, Ordering::Release);
    }

    pub fn clear(&self) {
        self.0.store(0, Ordering::Release);
    }

    #[must_use]
    pub fn working_port(&self) -> Option<u16> {
        match self.0.load(Ordering::Acquire) {
            0 => None,
            port => Some(port),
        }
    }
}
