//! One-shot reverse proxy and CDN detection, surfaced to administrators.

use serde::Serialize;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tracing::warn;
use utoipa::ToSchema;

use super::now_millis;

pub const DETECTION_LIFETIME: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ProxyDetection {
    #[schema(value_type = String)]
    pub source: IpAddr,
    pub forwarded_for: String,
    /// Unix milliseconds.
    pub at: i64,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, ToSchema)]
pub struct DiagnosticsReport {
    pub proxy: Option<ProxyDetection>,
    /// Unix milliseconds of the last request carrying a CDN marker.
    pub cdn_detected_at: Option<i64>,
}

#[derive(Debug, Default)]
struct State {
    proxy: Option<ProxyDetection>,
    cdn: Option<i64>,
}

#[derive(Clone, Debug, Default)]
pub struct ProxyDiagnostics {
    state: Arc<Mutex<State>>,
}

impl ProxyDiagnostics {
    /// Remember the latest forwarded request. Only the first detection after
    /// a quiet period is logged.
    pub fn record_proxy(&self, source: IpAddr, forwarded_for: &str) {
        let now = now_millis();
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if !state.proxy.as_ref().is_some_and(|p| is_fresh(p.at, now)) {
            warn!(
                %source,
                forwarded_for,
                "request forwarded by an untrusted proxy; consider configuring the proxies setting"
            );
        }
        state.proxy = Some(ProxyDetection {
            source,
            forwarded_for: forwarded_for.to_string(),
            at: now,
        });
    }

    pub fn record_cdn(&self) {
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        state.cdn = Some(now_millis());
    }

    /// Detections older than [`DETECTION_LIFETIME`] are dropped. Everything
    /// is hidden when proxies are deliberately ignored.
    #[must_use]
    pub fn report(&self, ignore_proxies: bool) -> DiagnosticsReport {
        self.report_at(ignore_proxies, now_millis())
    }

    fn report_at(&self, ignore_proxies: bool, now: i64) -> DiagnosticsReport {
        if ignore_proxies {
            return DiagnosticsReport::default();
        }
        let mut state = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        if state.proxy.as_ref().is_some_and(|p| !is_fresh(p.at, now)) {
            state.proxy = None;
        }
        if state.cdn.is_some_and(|at| !is_fresh(at, now)) {
            state.cdn = None;
        }
        DiagnosticsReport {
            proxy: state.proxy.clone(),
            cdn_detected_at: state.cdn,
        }
    }
}

fn is_fresh(at: i64, now: i64) -> bool {
    let lifetime = i64::try_from(DETECTION_LIFETIME.as_millis()).unwrap_or(i64::MAX);
    now.saturating_sub(at) < lifetime
}
