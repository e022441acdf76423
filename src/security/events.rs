//! Authentication events.
//!
//! `login`, `logout` and `failed_login` are broadcast and never awaited.
//! `attempting_login` goes through registered hooks, any of which can veto.

use async_trait::async_trait;
use serde::Serialize;
use std::net::IpAddr;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tracing::{info, warn};

const EVENT_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LoginVia {
    Url,
    Header,
    Srp,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    Login {
        username: String,
        ip: IpAddr,
        via: LoginVia,
    },
    Logout {
        username: String,
        ip: Option<IpAddr>,
    },
    FailedLogin {
        username: String,
        ip: IpAddr,
        via: LoginVia,
    },
}

#[derive(Debug, Clone)]
pub struct LoginAttempt {
    pub username: String,
    pub ip: IpAddr,
    pub via: LoginVia,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookDecision {
    Continue,
    Veto,
}

#[async_trait]
pub trait LoginHook: Send + Sync {
    async fn attempting_login(&self, attempt: &LoginAttempt) -> HookDecision;
}

#[derive(Clone)]
pub struct EventBus {
    sender: broadcast::Sender<AuthEvent>,
    hooks: Arc<RwLock<Vec<Arc<dyn LoginHook>>>>,
}

impl Default for EventBus {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            sender,
            hooks: Arc::new(RwLock::new(Vec::new())),
        }
    }
}

impl EventBus {
    /// Publishing with no subscribers is not an error.
    pub fn publish(&self, event: AuthEvent) {
        let _ = self.sender.send(event);
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.sender.subscribe()
    }

    pub fn register_hook(&self, hook: Arc<dyn LoginHook>) {
        self.hooks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(hook);
    }

    /// Run every hook in registration order; the first veto wins.
    pub async fn attempting_login(&self, attempt: &LoginAttempt) -> HookDecision {
        let hooks = self
            .hooks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for hook in hooks {
            if hook.attempting_login(attempt).await == HookDecision::Veto {
                return HookDecision::Veto;
            }
        }
        HookDecision::Continue
    }
}

/// Log every event until the bus goes away.
#[must_use]
pub fn spawn_event_logger(bus: &EventBus) -> JoinHandle<()> {
    let mut events = bus.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(AuthEvent::Login { username, ip, via }) => {
                    info!(%ip, ?via, "login {username}");
                }
                Ok(AuthEvent::Logout { username, ip }) => {
                    info!(ip = ?ip, "logout {username}");
                }
                Ok(AuthEvent::FailedLogin { username, ip, via }) => {
                    warn!(%ip, ?via, "login failed for {username}");
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("event logger skipped {skipped} events");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct DenyUser(&'static str);

    #[async_trait]
    impl LoginHook for DenyUser {
        async fn attempting_login(&self, attempt: &LoginAttempt) -> HookDecision {
            if attempt.username == self.0 {
                HookDecision::Veto
            } else {
                HookDecision::Continue
            }
        }
    }

    struct Counter(Arc<AtomicUsize>);

    #[async_trait]
    impl LoginHook for Counter {
        async fn attempting_login(&self, _: &LoginAttempt) -> HookDecision {
            self.0.fetch_add(1, Ordering::SeqCst);
            HookDecision::Continue
        }
    }

    fn attempt(username: &str) -> LoginAttempt {
        LoginAttempt {
            username: username.to_string(),
            ip: IpAddr::from([127, 0, 0, 1]),
            via: LoginVia::Url,
        }
    }

    #[tokio::test]
    async fn first_veto_stops_remaining_hooks() {
        let bus = EventBus::default();
        let calls = Arc::new(AtomicUsize::new(0));
        bus.register_hook(Arc::new(DenyUser("mallory")));
        bus.register_hook(Arc::new(Counter(Arc::clone(&calls))));

        assert_eq!(bus.attempting_login(&attempt("mallory")).await, HookDecision::Veto);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(bus.attempting_login(&attempt("alice")).await, HookDecision::Continue);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn subscribers_receive_published_events() {
        let bus = EventBus::default();
        let mut events = bus.subscribe();
        bus.publish(AuthEvent::Logout {
            username: "alice".to_string(),
            ip: None,
        });
        let received = events.recv().await;
        assert!(matches!(received, Ok(AuthEvent::Logout { username, .. }) if username == "alice"));
    }

    #[test]
    fn publishing_without_subscribers_is_silent() {
        EventBus::default().publish(AuthEvent::Logout {
            username: "alice".to_string(),
            ip: None,
        });
    }
}
