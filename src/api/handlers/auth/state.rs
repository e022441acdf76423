//! Shared handler state and the pending interactive logins.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::api::cookies::CookieStores;
use crate::security::{srp::ChallengeSession, SecurityContext};

pub const DEFAULT_LOGIN_TTL: Duration = Duration::from_secs(5 * 60);

pub(crate) struct PendingLogin {
    pub(crate) challenge: ChallengeSession,
    pub(crate) username: String,
    /// False for decoy challenges, which can never succeed.
    pub(crate) genuine: bool,
    created_at: Instant,
}

/// Challenges issued by the first login step, waiting for the second.
pub struct LoginStates {
    ttl: Duration,
    pending: Mutex<HashMap<Uuid, PendingLogin>>,
}

impl Default for LoginStates {
    fn default() -> Self {
        Self::new(DEFAULT_LOGIN_TTL)
    }
}

impl LoginStates {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            pending: Mutex::new(HashMap::new()),
        }
    }

    pub(crate) async fn store(
        &self,
        challenge: ChallengeSession,
        username: String,
        genuine: bool,
    ) -> Uuid {
        let login_id = Uuid::new_v4();
        let mut pending = self.pending.lock().await;
        pending.retain(|_, entry| entry.created_at.elapsed() < self.ttl);
        pending.insert(
            login_id,
            PendingLogin {
                challenge,
                username,
                genuine,
                created_at: Instant::now(),
            },
        );
        login_id
    }

    /// Each challenge can be answered once.
    pub(crate) async fn take(&self, login_id: Uuid) -> Option<PendingLogin> {
        let mut pending = self.pending.lock().await;
        pending
            .remove(&login_id)
            .filter(|entry| entry.created_at.elapsed() < self.ttl)
    }

    pub async fn len(&self) -> usize {
        self.pending.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

pub struct AuthState {
    security: SecurityContext,
    cookies: CookieStores,
    logins: LoginStates,
}

impl AuthState {
    #[must_use]
    pub fn new(security: SecurityContext, cookies: CookieStores, logins: LoginStates) -> Self {
        Self {
            security,
            cookies,
            logins,
        }
    }

    #[must_use]
    pub fn security(&self) -> &SecurityContext {
        &self.security
    }

    #[must_use]
    pub fn cookies(&self) -> &CookieStores {
        &self.cookies
    }

    #[must_use]
    pub fn logins(&self) -> &LoginStates {
        &self.logins
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::CredentialVerifier;

    #[tokio::test]
    async fn pending_login_is_taken_once() {
        let states = LoginStates::default();
        let (_, challenge) = CredentialVerifier::default().decoy_challenge("ghost");
        let id = states.store(challenge, "ghost".to_string(), false).await;
        assert_eq!(states.len().await, 1);
        assert!(states.take(id).await.is_some_and(|p| !p.genuine));
        assert!(states.take(id).await.is_none());
        assert!(states.is_empty().await);
    }

    #[tokio::test]
    async fn expired_login_is_refused() {
        let states = LoginStates::new(Duration::ZERO);
        let (_, challenge) = CredentialVerifier::default().decoy_challenge("ghost");
        let id = states.store(challenge, "ghost".to_string(), true).await;
        assert!(states.take(id).await.is_none());
    }
}
