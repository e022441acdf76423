//! Authentication engine and request security.
//!
//! [`SecurityContext`] owns everything that is shared between requests: the
//! verification cache, the session invalidation registry and the proxy
//! diagnostics. It is cloned cheaply into every request.

pub mod account;
pub mod blocklist;
pub mod cache;
pub mod config;
pub mod diagnostics;
pub mod error;
pub mod events;
pub mod netmask;
pub mod pipeline;
pub mod session;
pub mod srp;

pub use account::{Account, AccountPatch, AccountStore, MemoryAccountStore};
pub use blocklist::{BlockList, Connection, StaticBlockList};
pub use cache::VerificationCache;
pub use config::{HttpsStatus, IpChangePolicy, SecurityConfig};
pub use diagnostics::ProxyDiagnostics;
pub use error::{CacheError, CredentialError, InputError, ProtocolError};
pub use events::{AuthEvent, EventBus, HookDecision, LoginAttempt, LoginHook, LoginVia};
pub use session::{Session, SessionCheck, SessionManager};
pub use srp::CredentialVerifier;

use sha2::{Digest, Sha256};
use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::watch;
use tracing::{debug, error};

pub(crate) fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_or(0, |elapsed| i64::try_from(elapsed.as_millis()).unwrap_or(i64::MAX))
}

pub(crate) fn now_seconds() -> i64 {
    now_millis() / 1000
}

type CheckOutcome = Result<bool, CredentialError>;

#[derive(Clone)]
pub struct SecurityContext {
    config: watch::Receiver<SecurityConfig>,
    accounts: Arc<dyn AccountStore>,
    block_list: Arc<dyn BlockList>,
    verifier: CredentialVerifier,
    cache: VerificationCache<CheckOutcome>,
    password_checks: Arc<AtomicU64>,
    sessions: SessionManager,
    diagnostics: ProxyDiagnostics,
    events: EventBus,
    https: HttpsStatus,
}

impl SecurityContext {
    #[must_use]
    pub fn new(
        config: watch::Receiver<SecurityConfig>,
        accounts: Arc<dyn AccountStore>,
        block_list: Arc<dyn BlockList>,
    ) -> Self {
        let events = EventBus::default();
        Self {
            config,
            sessions: SessionManager::new(Arc::clone(&accounts), events.clone()),
            accounts,
            block_list,
            verifier: CredentialVerifier::default(),
            cache: VerificationCache::default(),
            password_checks: Arc::new(AtomicU64::new(0)),
            diagnostics: ProxyDiagnostics::default(),
            events,
            https: HttpsStatus::default(),
        }
    }

    /// Current settings; a snapshot is taken once per request.
    #[must_use]
    pub fn config(&self) -> SecurityConfig {
        self.config.borrow().clone()
    }

    #[must_use]
    pub fn accounts(&self) -> &Arc<dyn AccountStore> {
        &self.accounts
    }

    #[must_use]
    pub fn block_list(&self) -> &Arc<dyn BlockList> {
        &self.block_list
    }

    #[must_use]
    pub fn verifier(&self) -> &CredentialVerifier {
        &self.verifier
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    #[must_use]
    pub fn diagnostics(&self) -> &ProxyDiagnostics {
        &self.diagnostics
    }

    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    #[must_use]
    pub fn https(&self) -> &HttpsStatus {
        &self.https
    }

    /// Number of password verifications actually run, cache hits excluded.
    #[must_use]
    pub fn password_checks(&self) -> u64 {
        self.password_checks.load(Ordering::Relaxed)
    }

    /// Verify a plaintext password. Returns the account on success and
    /// `Ok(None)` on any authentication failure.
    ///
    /// Identical concurrent checks share one computation, and the outcome is
    /// reused for a minute.
    ///
    /// # Errors
    /// Returns a [`CredentialError`] when the stored record is unusable.
    pub async fn check_credentials(
        &self,
        username: &str,
        password: &str,
    ) -> Result<Option<Account>, CredentialError> {
        if password.is_empty() {
            return Ok(None);
        }
        let Some(account) = self.accounts.get_account(username).await else {
            debug!("login attempt for unknown account");
            return Ok(None);
        };
        let Some(record) = account.credential.clone() else {
            return Ok(None);
        };

        let key = cache_key(&account.username, password, &record);
        let verifier = self.verifier.clone();
        let candidate = account.clone();
        let password = password.to_string();
        let checks = Arc::clone(&self.password_checks);
        let outcome = self
            .cache
            .try_get_or_compute(&key, move || async move {
                let run = checks.fetch_add(1, Ordering::Relaxed) + 1;
                debug!(run, "verifying password");
                tokio::task::spawn_blocking(move || verifier.check_password(&candidate, &password))
                    .await
                    .map_err(|err| {
                        error!("password verification task failed: {err}");
                        CacheError::Aborted
                    })
            })
            .await;

        match outcome {
            Ok(Ok(true)) => Ok(Some(account)),
            Ok(Ok(false)) => Ok(None),
            Ok(Err(err)) => Err(err),
            Err(err) => {
                error!("credential check failed: {err}");
                Ok(None)
            }
        }
    }
}

/// Length-prefixed so that no two distinct triples hash alike.
fn cache_key(username: &str, password: &str, record: &str) -> String {
    let mut hasher = Sha256::new();
    for part in [username, password, record] {
        hasher.update((part.len() as u64).to_be_bytes());
        hasher.update(part.as_bytes());
    }
    hex::encode(hasher.finalize())
}
