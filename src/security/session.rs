//! Session lifecycle: login binding, per-request validation and revocation.
//!
//! A [`Session`] lives in the client cookie and is decoded per request; only
//! the [`InvalidationRegistry`] is shared between requests.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::net::IpAddr;
use std::sync::{Arc, Mutex, PoisonError};
use tracing::{debug, error, warn};

use super::account::{Account, AccountPatch, AccountStore};
use super::config::IpChangePolicy;
use super::events::{AuthEvent, EventBus, LoginVia};
use super::netmask::net_matches;
use super::{now_millis, now_seconds};

const SECONDS_PER_DAY: i64 = 24 * 60 * 60;

/// Allow-net mask resolved once per login. `mask: None` means unrestricted.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedMask {
    pub mask: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    /// Login time, unix milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ts: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ip: Option<IpAddr>,
    /// Set only when the login request asked for it explicitly.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_ip_change: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_net: Option<CachedMask>,
    /// Rolling expiry, unix milliseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<i64>,
}

impl Session {
    #[must_use]
    pub fn username(&self) -> Option<&str> {
        self.username.as_deref()
    }

    #[must_use]
    pub fn is_logged_in(&self) -> bool {
        self.username.is_some()
    }

    /// Forget who is logged in; the IP binding stays.
    pub fn clear_identity(&mut self) {
        self.username = None;
        self.ts = None;
        self.allow_ip_change = None;
        self.allow_net = None;
        self.expires_at = None;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionCheck {
    Anonymous,
    Valid,
    /// Logged out by an invalidation issued after the login.
    Revoked,
    IpChanged,
    Expired,
}

/// username → cutoff timestamp (unix ms). Sessions older than the cutoff are
/// treated as logged out.
#[derive(Clone, Debug, Default)]
pub struct InvalidationRegistry {
    cutoffs: Arc<Mutex<HashMap<String, i64>>>,
}

impl InvalidationRegistry {
    pub fn invalidate_before(&self, username: &str, ts: i64) {
        self.cutoffs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(username.to_string(), ts);
    }

    #[must_use]
    pub fn cutoff(&self, username: &str) -> Option<i64> {
        self.cutoffs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(username)
            .copied()
    }

    #[must_use]
    pub fn is_revoked(&self, username: &str, ts: i64) -> bool {
        self.cutoff(username).is_some_and(|cutoff| ts < cutoff)
    }
}

#[derive(Clone)]
pub struct SessionManager {
    accounts: Arc<dyn AccountStore>,
    registry: InvalidationRegistry,
    events: EventBus,
}

impl SessionManager {
    #[must_use]
    pub fn new(accounts: Arc<dyn AccountStore>, events: EventBus) -> Self {
        Self {
            accounts,
            registry: InvalidationRegistry::default(),
            events,
        }
    }

    #[must_use]
    pub fn registry(&self) -> &InvalidationRegistry {
        &self.registry
    }

    /// Bind `session` to `account` after a successful verification.
    pub async fn establish_session(
        &self,
        session: &mut Session,
        account: &Account,
        ip: IpAddr,
        allow_ip_change: Option<bool>,
        via: LoginVia,
    ) {
        let username = self.accounts.normalize_username(&account.username);
        session.username = Some(username.clone());
        session.ts = Some(now_millis());
        session.ip = Some(ip);
        session.allow_ip_change = allow_ip_change;
        session.allow_net = None;
        session.expires_at = None;

        if let (Some(days), None) = (account.days_to_live, account.expire) {
            let patch = AccountPatch {
                first_login_expire: Some(now_seconds() + i64::from(days) * SECONDS_PER_DAY),
            };
            if let Err(err) = self.accounts.update_account(&username, patch).await {
                error!("Failed to store expiry for {username}: {err:#}");
            }
        }

        self.events.publish(AuthEvent::Login { username, ip, via });
    }

    pub fn terminate_session(&self, session: &mut Session) {
        if let Some(username) = session.username.take() {
            self.events.publish(AuthEvent::Logout {
                username,
                ip: session.ip,
            });
        }
        session.clear_identity();
    }

    /// Run before identity resolution on every request.
    pub fn validate_on_request(
        &self,
        session: &mut Session,
        ip: IpAddr,
        secure: bool,
        policy: IpChangePolicy,
    ) -> SessionCheck {
        let Some(username) = session.username.clone() else {
            session.ip = Some(ip);
            return SessionCheck::Anonymous;
        };

        if self
            .registry
            .is_revoked(&username, session.ts.unwrap_or_default())
        {
            debug!("session of {username} was invalidated");
            *session = Session {
                ip: Some(ip),
                ..Session::default()
            };
            return SessionCheck::Revoked;
        }

        if session.expires_at.is_some_and(|at| at <= now_millis()) {
            debug!("session of {username} expired");
            session.clear_identity();
            session.ip = Some(ip);
            return SessionCheck::Expired;
        }

        let policy = session
            .allow_ip_change
            .map_or(policy, IpChangePolicy::from_override);
        let moved = session.ip.is_some_and(|bound| bound != ip);
        session.ip = Some(ip);
        if moved && !policy.permits(secure) {
            warn!(%ip, "session of {username} used from another address, logging out");
            session.clear_identity();
            return SessionCheck::IpChanged;
        }
        SessionCheck::Valid
    }

    /// Whether `ip` falls outside the account's allow-net mask. The mask is
    /// looked up once and cached in the session.
    pub fn fail_allow_net(&self, session: &mut Session, account: &Account, ip: IpAddr) -> bool {
        let cached = match &session.allow_net {
            Some(cached) => cached.clone(),
            None => {
                let resolved = CachedMask {
                    mask: self
                        .accounts
                        .get_from_account(account, &|a: &Account| a.allow_net.clone()),
                };
                session.allow_net = Some(resolved.clone());
                resolved
            }
        };
        cached.mask.is_some_and(|mask| !net_matches(ip, &mask))
    }

    /// Log out every session of `username` created up to now.
    pub fn invalidate_sessions(&self, username: &str) {
        let username = self.accounts.normalize_username(username);
        self.registry.invalidate_before(&username, now_millis());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::account::MemoryAccountStore;

    const IP_A: IpAddr = IpAddr::V4(std::net::Ipv4Addr::new(203, 0, 113, 1));
    const IP_B: IpAddr = IpAddr::V4(std::net::Ipv4Addr::new(198, 51, 100, 7));

    fn alice() -> Account {
        Account {
            username: "alice".to_string(),
            credential: Some("c2FsdA==|dmVyaWZpZXI=".to_string()),
            ..Account::default()
        }
    }

    fn manager(accounts: Vec<Account>) -> (SessionManager, Arc<MemoryAccountStore>) {
        let store = Arc::new(MemoryAccountStore::new(accounts));
        let manager = SessionManager::new(store.clone(), EventBus::default());
        (manager, store)
    }

    #[tokio::test]
    async fn login_binds_username_ip_and_time() {
        let (manager, _) = manager(vec![alice()]);
        let mut events = manager.events.subscribe();
        let mut session = Session::default();
        manager
            .establish_session(&mut session, &alice(), IP_A, None, LoginVia::Srp)
            .await;

        assert_eq!(session.username(), Some("alice"));
        assert_eq!(session.ip, Some(IP_A));
        assert!(session.ts.is_some());
        assert!(matches!(
            events.recv().await,
            Ok(AuthEvent::Login { via: LoginVia::Srp, .. })
        ));
    }

    #[tokio::test]
    async fn days_to_live_sets_expiry_on_first_login() {
        let account = Account {
            days_to_live: Some(2),
            ..alice()
        };
        let (manager, store) = manager(vec![account.clone()]);
        let before = now_seconds();
        manager
            .establish_session(&mut Session::default(), &account, IP_A, None, LoginVia::Url)
            .await;
        let expire = store.get_account("alice").await.and_then(|a| a.expire);
        assert!(expire.is_some_and(|e| e >= before + 2 * SECONDS_PER_DAY));
    }

    #[test]
    fn ip_change_clears_identity() {
        let (manager, _) = manager(vec![alice()]);
        let mut session = Session {
            username: Some("alice".to_string()),
            ts: Some(now_millis()),
            ip: Some(IP_A),
            ..Session::default()
        };
        let check = manager.validate_on_request(&mut session, IP_B, false, IpChangePolicy::Never);
        assert_eq!(check, SessionCheck::IpChanged);
        assert!(!session.is_logged_in());
        assert_eq!(session.ip, Some(IP_B));

        let check = manager.validate_on_request(&mut session, IP_B, false, IpChangePolicy::Never);
        assert_eq!(check, SessionCheck::Anonymous);
    }

    #[test]
    fn ip_change_policy_and_override() {
        let (manager, _) = manager(vec![alice()]);
        let session = Session {
            username: Some("alice".to_string()),
            ts: Some(now_millis()),
            ip: Some(IP_A),
            ..Session::default()
        };

        let mut secure_only = session.clone();
        assert_eq!(
            manager.validate_on_request(&mut secure_only, IP_B, true, IpChangePolicy::SecureOnly),
            SessionCheck::Valid
        );
        let mut plain = session.clone();
        assert_eq!(
            manager.validate_on_request(&mut plain, IP_B, false, IpChangePolicy::SecureOnly),
            SessionCheck::IpChanged
        );

        let mut overridden = Session {
            allow_ip_change: Some(true),
            ..session.clone()
        };
        assert_eq!(
            manager.validate_on_request(&mut overridden, IP_B, false, IpChangePolicy::Never),
            SessionCheck::Valid
        );
        let mut pinned = Session {
            allow_ip_change: Some(false),
            ..session
        };
        assert_eq!(
            manager.validate_on_request(&mut pinned, IP_B, true, IpChangePolicy::Always),
            SessionCheck::IpChanged
        );
    }

    #[test]
    fn session_older_than_cutoff_is_dropped() {
        let (manager, _) = manager(vec![alice()]);
        manager.registry().invalidate_before("alice", 200);
        let mut session = Session {
            username: Some("alice".to_string()),
            ts: Some(100),
            ip: Some(IP_A),
            ..Session::default()
        };
        let check = manager.validate_on_request(&mut session, IP_A, false, IpChangePolicy::Never);
        assert_eq!(check, SessionCheck::Revoked);
        assert!(!session.is_logged_in());
        assert_eq!(session.ts, None);
        assert_eq!(session.ip, Some(IP_A));

        let mut newer = Session {
            username: Some("alice".to_string()),
            ts: Some(200),
            ip: Some(IP_A),
            ..Session::default()
        };
        assert_eq!(
            manager.validate_on_request(&mut newer, IP_A, false, IpChangePolicy::Never),
            SessionCheck::Valid
        );
    }

    #[tokio::test]
    async fn invalidate_sessions_revokes_existing_logins() {
        let (manager, _) = manager(vec![alice()]);
        let mut session = Session {
            username: Some("alice".to_string()),
            ts: Some(now_millis() - 1000),
            ip: Some(IP_A),
            ..Session::default()
        };
        manager.invalidate_sessions("ALICE");
        assert_eq!(
            manager.validate_on_request(&mut session, IP_A, false, IpChangePolicy::Never),
            SessionCheck::Revoked
        );

        let mut fresh = Session::default();
        manager
            .establish_session(&mut fresh, &alice(), IP_A, None, LoginVia::Srp)
            .await;
        assert_eq!(
            manager.validate_on_request(&mut fresh, IP_A, false, IpChangePolicy::Never),
            SessionCheck::Valid
        );
    }

    #[test]
    fn expired_session_is_anonymous() {
        let (manager, _) = manager(vec![alice()]);
        let mut session = Session {
            username: Some("alice".to_string()),
            ts: Some(1),
            ip: Some(IP_A),
            expires_at: Some(2),
            ..Session::default()
        };
        assert_eq!(
            manager.validate_on_request(&mut session, IP_A, false, IpChangePolicy::Never),
            SessionCheck::Expired
        );
        assert!(!session.is_logged_in());
    }

    #[test]
    fn logout_clears_identity_and_mask() {
        let (manager, _) = manager(vec![alice()]);
        let mut events = manager.events.subscribe();
        let mut session = Session {
            username: Some("alice".to_string()),
            ts: Some(1),
            ip: Some(IP_A),
            allow_net: Some(CachedMask::default()),
            ..Session::default()
        };
        manager.terminate_session(&mut session);
        assert!(!session.is_logged_in());
        assert!(session.allow_net.is_none());
        assert!(matches!(events.try_recv(), Ok(AuthEvent::Logout { .. })));
    }

    #[test]
    fn allow_net_is_resolved_once_per_session() {
        let restricted = Account {
            allow_net: Some("203.0.113.0/24".to_string()),
            ..alice()
        };
        let (manager, _) = manager(vec![restricted.clone()]);
        let mut session = Session::default();
        assert!(!manager.fail_allow_net(&mut session, &restricted, IP_A));
        assert!(manager.fail_allow_net(&mut session, &restricted, IP_B));

        // Cached value wins over later account changes.
        let relaxed = Account {
            allow_net: None,
            ..restricted
        };
        assert!(manager.fail_allow_net(&mut session, &relaxed, IP_B));
        assert!(!manager.fail_allow_net(&mut Session::default(), &relaxed, IP_B));
    }

    #[test]
    fn session_round_trips_through_json() -> anyhow::Result<()> {
        let session = Session {
            username: Some("alice".to_string()),
            ts: Some(5),
            ip: Some(IP_A),
            allow_ip_change: Some(true),
            allow_net: Some(CachedMask {
                mask: Some("10.0.0.0/8".to_string()),
            }),
            expires_at: Some(9),
        };
        let json = serde_json::to_string(&session)?;
        assert_eq!(serde_json::from_str::<Session>(&json)?, session);
        assert_eq!(serde_json::to_string(&Session::default())?, "{}");
        Ok(())
    }
}
