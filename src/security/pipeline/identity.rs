//! Who is making the request: one-shot URL login, HTTP basic credentials,
//! then the session.

use axum::{
    extract::Request,
    http::{header, HeaderMap, HeaderValue, StatusCode, Uri},
    response::{IntoResponse, Response},
};
use base64::{engine::general_purpose::STANDARD, Engine};
use std::net::IpAddr;
use tracing::{debug, error};

use super::params::{truthy, Params};
use crate::security::{
    account::Account,
    events::{AuthEvent, HookDecision, LoginAttempt, LoginVia},
    session::Session,
    SecurityContext,
};

pub const LOGIN_PARAM: &str = "login";
pub const ALLOW_IP_CHANGE_PARAM: &str = "allow_session_ip_change";
pub const USERNAME_HEADER: &str = "x-username";

#[derive(Debug, Default)]
pub struct Resolved {
    pub account: Option<Account>,
    pub via: Option<LoginVia>,
}

struct Login<'a> {
    ctx: &'a SecurityContext,
    session: &'a mut Session,
    ip: IpAddr,
    allow_ip_change: Option<bool>,
}

impl Login<'_> {
    /// `Ok(None)` covers skipped, vetoed and failed attempts alike.
    async fn attempt(
        &mut self,
        username: &str,
        password: &str,
        via: LoginVia,
    ) -> Result<Option<Account>, Response> {
        let username = self.ctx.accounts().normalize_username(username);
        if username.is_empty() || self.session.username() == Some(username.as_str()) {
            return Ok(None);
        }
        let attempt = LoginAttempt {
            username: username.clone(),
            ip: self.ip,
            via,
        };
        if self.ctx.events().attempting_login(&attempt).await == HookDecision::Veto {
            debug!("login attempt for {username} vetoed");
            return Ok(None);
        }

        match self.ctx.check_credentials(&username, password).await {
            Ok(Some(account)) => {
                self.ctx
                    .sessions()
                    .establish_session(self.session, &account, self.ip, self.allow_ip_change, via)
                    .await;
                Ok(Some(account))
            }
            Ok(None) => {
                self.ctx.events().publish(AuthEvent::FailedLogin {
                    username,
                    ip: self.ip,
                    via,
                });
                Ok(None)
            }
            Err(err) => {
                error!("{err}");
                Err(StatusCode::INTERNAL_SERVER_ERROR.into_response())
            }
        }
    }
}

/// # Errors
/// Returns the response that ends the request: a redirect after a URL login,
/// or 500 when stored credentials are unusable.
pub async fn resolve(
    ctx: &SecurityContext,
    authorization_header: bool,
    request: &mut Request,
    session: &mut Session,
    ip: IpAddr,
    params: &Params,
    rev_proxy_path: &str,
) -> Result<Resolved, Response> {
    let mut login = Login {
        ctx,
        session,
        ip,
        allow_ip_change: params.get(ALLOW_IP_CHANGE_PARAM).map(truthy),
    };

    if let Some(credentials) = query_login(request.uri()) {
        let (username, password) = split_credentials(&credentials);
        if login.attempt(username, password, LoginVia::Url).await?.is_some() {
            let location = format!("{rev_proxy_path}{}", without_login(request.uri()));
            return Err((StatusCode::FOUND, [(header::LOCATION, location)]).into_response());
        }
    }

    if authorization_header {
        if let Some((username, password)) = basic_credentials(request.headers()) {
            if let Some(account) = login.attempt(&username, &password, LoginVia::Header).await? {
                if let Ok(value) = HeaderValue::from_str(&account.username) {
                    request.headers_mut().insert(USERNAME_HEADER, value);
                }
                return Ok(Resolved {
                    account: Some(account),
                    via: Some(LoginVia::Header),
                });
            }
        }
    }

    let account = match login.session.username() {
        Some(username) => ctx.accounts().get_account(username).await,
        None => None,
    };
    Ok(Resolved { account, via: None })
}

fn query_login(uri: &Uri) -> Option<String> {
    let query = uri.query()?;
    url::form_urlencoded::parse(query.as_bytes())
        .find(|(key, _)| key == LOGIN_PARAM)
        .map(|(_, value)| value.into_owned())
        .filter(|value| !value.is_empty())
}

/// Splits at the first `:` so passwords may contain colons.
fn split_credentials(credentials: &str) -> (&str, &str) {
    credentials.split_once(':').unwrap_or((credentials, ""))
}

fn basic_credentials(headers: &HeaderMap) -> Option<(String, String)> {
    let value = headers.get(header::AUTHORIZATION)?.to_str().ok()?;
    let (scheme, encoded) = value.trim().split_once(' ')?;
    if !scheme.eq_ignore_ascii_case("basic") {
        return None;
    }
    let decoded = STANDARD.decode(encoded.trim()).ok()?;
    let decoded = String::from_utf8(decoded).ok()?;
    let (username, password) = split_credentials(&decoded);
    Some((username.to_string(), password.to_string()))
}

/// Path and query with the `login` parameter removed.
fn without_login(uri: &Uri) -> String {
    let remaining: Vec<(String, String)> = uri
        .query()
        .map(|query| {
            url::form_urlencoded::parse(query.as_bytes())
                .filter(|(key, _)| key != LOGIN_PARAM)
                .map(|(key, value)| (key.into_owned(), value.into_owned()))
                .collect()
        })
        .unwrap_or_default();
    if remaining.is_empty() {
        return uri.path().to_string();
    }
    let query = url::form_urlencoded::Serializer::new(String::new())
        .extend_pairs(remaining)
        .finish();
    format!("{}?{query}", uri.path())
}
