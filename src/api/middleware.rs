//! Runs the security pipeline around every request and persists the session.

use axum::{
    extract::{ConnectInfo, Request, State},
    middleware::Next,
    response::Response,
    Extension,
};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, PoisonError};

use super::handlers::auth::AuthState;
use crate::security::{pipeline, pipeline::Transport, Session};

/// The request's session, shared with handlers that log in or out.
#[derive(Clone, Debug, Default)]
pub struct SessionSlot(Arc<Mutex<Session>>);

impl SessionSlot {
    #[must_use]
    pub fn new(session: Session) -> Self {
        Self(Arc::new(Mutex::new(session)))
    }

    #[must_use]
    pub fn snapshot(&self) -> Session {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn replace(&self, session: Session) {
        *self.0.lock().unwrap_or_else(PoisonError::into_inner) = session;
    }

    pub fn update(&self, change: impl FnOnce(&mut Session)) {
        change(&mut self.0.lock().unwrap_or_else(PoisonError::into_inner));
    }
}

pub async fn security(
    State(auth_state): State<Arc<AuthState>>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    transport: Option<Extension<Transport>>,
    request: Request,
    next: Next,
) -> Response {
    let transport = transport.map_or(Transport::Plain, |Extension(transport)| transport);
    let ctx = auth_state.security();
    let store = auth_state.cookies().for_transport(transport);
    let duration = ctx.config().session_duration();

    let (jar, stored) = store.load(request.headers());
    let had_cookie = stored.is_some();
    let mut session = stored.unwrap_or_default();

    let response = match pipeline::run(ctx, request, peer, transport, &mut session).await {
        Ok(mut request) => {
            let slot = SessionSlot::new(session);
            request.extensions_mut().insert(slot.clone());
            let response = next.run(request).await;
            session = slot.snapshot();
            response
        }
        Err(response) => response,
    };

    store.finalize(jar, session, had_cookie, duration, response)
}
