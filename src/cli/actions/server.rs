use crate::{
    api::{self, cookies::CookieStores, handlers::auth::LoginStates, AuthState, HttpsListener},
    security::{MemoryAccountStore, SecurityConfig, SecurityContext, StaticBlockList},
    tls::{self, TlsPaths},
};
use anyhow::{Context, Result};
use rand::{distributions::Alphanumeric, Rng};
use secrecy::SecretString;
use std::{path::PathBuf, sync::Arc};
use tokio::sync::watch;
use tracing::{info, warn};

const GENERATED_SECRET_LEN: usize = 48;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub https_port: u16,
    pub tls: Option<TlsPaths>,
    pub accounts: PathBuf,
    pub cookie_secret: Option<SecretString>,
    pub security: SecurityConfig,
    pub block: Vec<String>,
}

/// Execute the server action.
/// # Errors
/// Returns an error if the accounts or TLS material cannot be loaded, or the
/// server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    log_startup_args(&args);

    let accounts = MemoryAccountStore::load(&args.accounts)
        .await
        .context("Could not load accounts")?;
    let block_list = StaticBlockList::from_masks(args.block.iter().map(String::as_str));

    let https = match &args.tls {
        Some(paths) => Some(HttpsListener {
            port: args.https_port,
            config: tls::load_rustls_config(paths).context("Could not load TLS material")?,
        }),
        None => {
            if args.security.force_https() {
                warn!("force-https is set but no TLS certificate is configured");
            }
            None
        }
    };

    let cookie_secret = args.cookie_secret.unwrap_or_else(|| {
        info!("No cookie secret configured, sessions will not survive a restart");
        generated_secret()
    });

    // Held for the lifetime of the server; settings are read per request.
    let (_config_tx, config_rx) = watch::channel(args.security);

    let security = SecurityContext::new(config_rx, Arc::new(accounts), Arc::new(block_list));
    let auth_state = Arc::new(AuthState::new(
        security,
        CookieStores::new(&cookie_secret),
        LoginStates::default(),
    ));

    api::new(auth_state, args.port, https).await
}

fn generated_secret() -> SecretString {
    let secret: String = rand::thread_rng()
        .sample_iter(&Alphanumeric)
        .take(GENERATED_SECRET_LEN)
        .map(char::from)
        .collect();
    SecretString::from(secret)
}

fn log_startup_args(args: &Args) {
    let config = &args.security;
    let https = args.tls.as_ref().map_or_else(
        || "disabled".to_string(),
        |paths| format!("{} ({})", args.https_port, paths.cert_path().display()),
    );
    let entries = [
        ("http_port", args.port.to_string()),
        ("https", https),
        ("accounts", args.accounts.display().to_string()),
        (
            "cookie_secret_set",
            args.cookie_secret.is_some().to_string(),
        ),
        (
            "allow_session_ip_change",
            config.allow_session_ip_change().to_string(),
        ),
        ("force_https", config.force_https().to_string()),
        ("ignore_proxies", config.ignore_proxies().to_string()),
        (
            "authorization_header",
            config.authorization_header().to_string(),
        ),
        (
            "session_duration",
            format!("{}s", config.session_duration().as_secs()),
        ),
        ("proxies", config.proxies().to_string()),
        ("block", args.block.len().to_string()),
    ];
    log_entries("Startup configuration", &entries);
}

fn log_entries(title: &str, entries: &[(&str, String)]) {
    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!("{}\n\n{title}:", warden_banner());
    for (key, value) in entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn warden_banner() -> String {
    let short_hash = short_commit(crate::GIT_COMMIT_HASH);
    WARDEN_BANNER.replace(
        "{VERSION}",
        &format!(" - {} - {}", env!("CARGO_PKG_VERSION"), short_hash),
    )
}

fn short_commit(hash: &str) -> String {
    let trimmed = hash.trim();
    if trimmed.len() > 7 {
        trimmed[..7].to_string()
    } else {
        trimmed.to_string()
    }
}

const WARDEN_BANNER: &str = r"
   _____
  |  |  |
  |--+--|   W A R D E N {VERSION}
  |__|__|";
