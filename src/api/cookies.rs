//! Session cookies.
//!
//! Plain and TLS listeners use differently named cookies, each signed with
//! its own key, so a cookie issued over HTTPS is never replayed over HTTP.

use axum::{
    http::HeaderMap,
    response::{IntoResponse, Response},
};
use axum_extra::extract::cookie::{Cookie, Key, SameSite, SignedCookieJar};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha512};
use std::time::Duration;
use tracing::{debug, error};

use crate::security::{now_millis, pipeline::Transport, Session};

pub const PLAIN_COOKIE: &str = "warden_http";
pub const SECURE_COOKIE: &str = "warden_https";

#[derive(Clone)]
pub struct CookieStore {
    name: &'static str,
    secure: bool,
    key: Key,
}

impl CookieStore {
    #[must_use]
    pub fn new(name: &'static str, secure: bool, secret: &[u8]) -> Self {
        let mut hasher = Sha512::new();
        hasher.update(secret);
        hasher.update(name.as_bytes());
        let derived = hasher.finalize();
        Self {
            name,
            secure,
            key: Key::from(derived.as_slice()),
        }
    }

    #[must_use]
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Signed jar for this request and the session it carries, if any.
    #[must_use]
    pub fn load(&self, headers: &HeaderMap) -> (SignedCookieJar, Option<Session>) {
        let jar = SignedCookieJar::from_headers(headers, self.key.clone());
        let session = jar.get(self.name).and_then(|cookie| decode(cookie.value()));
        (jar, session)
    }

    /// Write the session back with a fresh expiry, or drop the cookie once
    /// nobody is logged in.
    pub fn finalize(
        &self,
        jar: SignedCookieJar,
        mut session: Session,
        had_cookie: bool,
        duration: Duration,
        response: Response,
    ) -> Response {
        if !session.is_logged_in() {
            if !had_cookie {
                return response;
            }
            let removal = Cookie::build(self.name).path("/");
            return (jar.remove(removal), response).into_response();
        }

        let millis = i64::try_from(duration.as_millis()).unwrap_or(i64::MAX);
        session.expires_at = Some(now_millis().saturating_add(millis));
        let Some(value) = encode(&session) else {
            return response;
        };
        let max_age = time::Duration::seconds(i64::try_from(duration.as_secs()).unwrap_or(i64::MAX));
        let cookie = Cookie::build((self.name, value))
            .path("/")
            .http_only(true)
            .same_site(SameSite::Lax)
            .secure(self.secure)
            .max_age(max_age);
        (jar.add(cookie), response).into_response()
    }
}

#[derive(Clone)]
pub struct CookieStores {
    plain: CookieStore,
    secure: CookieStore,
}

impl CookieStores {
    #[must_use]
    pub fn new(secret: &SecretString) -> Self {
        let secret = secret.expose_secret().as_bytes();
        Self {
            plain: CookieStore::new(PLAIN_COOKIE, false, secret),
            secure: CookieStore::new(SECURE_COOKIE, true, secret),
        }
    }

    #[must_use]
    pub fn for_transport(&self, transport: Transport) -> &CookieStore {
        if transport.is_secure() {
            &self.secure
        } else {
            &self.plain
        }
    }
}

fn encode(session: &Session) -> Option<String> {
    match serde_json::to_vec(session) {
        Ok(json) => Some(URL_SAFE_NO_PAD.encode(json)),
        Err(err) => {
            error!("Failed to serialize session: {err}");
            None
        }
    }
}

fn decode(value: &str) -> Option<Session> {
    let json = URL_SAFE_NO_PAD.decode(value).ok()?;
    serde_json::from_slice(&json)
        .map_err(|err| debug!("discarding unreadable session: {err}"))
        .ok()
}
