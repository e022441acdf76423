use anyhow::Context;
use clap::{builder::ValueParser, Arg, ArgAction, ArgMatches, Command};
use secrecy::SecretString;
use std::{path::PathBuf, time::Duration};

use crate::security::{IpChangePolicy, SecurityConfig};

pub const ARG_ACCOUNTS: &str = "accounts";
pub const ARG_COOKIE_SECRET: &str = "cookie-secret";
pub const ARG_ALLOW_SESSION_IP_CHANGE: &str = "allow-session-ip-change";
pub const ARG_FORCE_HTTPS: &str = "force-https";
pub const ARG_IGNORE_PROXIES: &str = "ignore-proxies";
pub const ARG_AUTHORIZATION_HEADER: &str = "authorization-header";
pub const ARG_SESSION_DURATION: &str = "session-duration";
pub const ARG_PROXIES: &str = "proxies";
pub const ARG_BLOCK: &str = "block";

#[derive(Debug, Clone)]
pub struct Options {
    pub accounts: PathBuf,
    pub cookie_secret: Option<SecretString>,
    pub config: SecurityConfig,
    pub block: Vec<String>,
}

impl Options {
    /// Parse account and request-security arguments from matches.
    ///
    /// # Errors
    /// Returns an error if the accounts file is not given.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let accounts = matches
            .get_one::<String>(ARG_ACCOUNTS)
            .map(PathBuf::from)
            .context("missing required argument: --accounts")?;
        let flag = |id: &str| matches.get_one::<bool>(id).copied();

        let mut config = SecurityConfig::default();
        if let Some(policy) = matches.get_one::<IpChangePolicy>(ARG_ALLOW_SESSION_IP_CHANGE) {
            config = config.with_allow_session_ip_change(*policy);
        }
        if let Some(force) = flag(ARG_FORCE_HTTPS) {
            config = config.with_force_https(force);
        }
        if let Some(ignore) = flag(ARG_IGNORE_PROXIES) {
            config = config.with_ignore_proxies(ignore);
        }
        if let Some(enabled) = flag(ARG_AUTHORIZATION_HEADER) {
            config = config.with_authorization_header(enabled);
        }
        if let Some(seconds) = matches.get_one::<u64>(ARG_SESSION_DURATION) {
            config = config.with_session_duration(Duration::from_secs(*seconds));
        }
        if let Some(proxies) = matches.get_one::<usize>(ARG_PROXIES) {
            config = config.with_proxies(*proxies);
        }

        Ok(Self {
            accounts,
            cookie_secret: matches
                .get_one::<String>(ARG_COOKIE_SECRET)
                .filter(|secret| !secret.is_empty())
                .map(|secret| SecretString::from(secret.clone())),
            config,
            block: matches
                .get_many::<String>(ARG_BLOCK)
                .map(|masks| {
                    masks
                        .map(|mask| mask.trim().to_string())
                        .filter(|mask| !mask.is_empty())
                        .collect()
                })
                .unwrap_or_default(),
        })
    }
}

fn validator_ip_change_policy() -> ValueParser {
    ValueParser::from(move |policy: &str| -> std::result::Result<IpChangePolicy, String> {
        policy.parse()
    })
}

fn switch(id: &'static str, help: &'static str, env: &'static str, default: &'static str) -> Arg {
    Arg::new(id)
        .long(id)
        .help(help)
        .env(env)
        .num_args(0..=1)
        .default_value(default)
        .default_missing_value("true")
        .value_parser(clap::value_parser!(bool))
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_ACCOUNTS)
                .short('a')
                .long(ARG_ACCOUNTS)
                .help("Path to the accounts file (JSON)")
                .env("WARDEN_ACCOUNTS")
                .required(true),
        )
        .arg(
            Arg::new(ARG_COOKIE_SECRET)
                .long(ARG_COOKIE_SECRET)
                .help("Secret for signing session cookies, random per process when absent")
                .env("WARDEN_COOKIE_SECRET")
                .hide_env_values(true),
        )
        .arg(
            Arg::new(ARG_ALLOW_SESSION_IP_CHANGE)
                .long(ARG_ALLOW_SESSION_IP_CHANGE)
                .help("Keep sessions when the client address changes: false, true or https")
                .env("WARDEN_ALLOW_SESSION_IP_CHANGE")
                .default_value("false")
                .value_parser(validator_ip_change_policy()),
        )
        .arg(switch(
            ARG_FORCE_HTTPS,
            "Redirect plain HTTP requests to the HTTPS listener",
            "WARDEN_FORCE_HTTPS",
            "true",
        ))
        .arg(switch(
            ARG_IGNORE_PROXIES,
            "Do not report forwarding proxies in diagnostics",
            "WARDEN_IGNORE_PROXIES",
            "false",
        ))
        .arg(switch(
            ARG_AUTHORIZATION_HEADER,
            "Accept credentials from the Authorization header",
            "WARDEN_AUTHORIZATION_HEADER",
            "true",
        ))
        .arg(
            Arg::new(ARG_SESSION_DURATION)
                .long(ARG_SESSION_DURATION)
                .help("Session lifetime in seconds, renewed on every request")
                .env("WARDEN_SESSION_DURATION")
                .default_value("86400")
                .value_parser(clap::value_parser!(u64)),
        )
        .arg(
            Arg::new(ARG_PROXIES)
                .long(ARG_PROXIES)
                .help("Number of trusted reverse proxies in front of the server")
                .env("WARDEN_PROXIES")
                .default_value("0")
                .value_parser(clap::value_parser!(usize)),
        )
        .arg(
            Arg::new(ARG_BLOCK)
                .long(ARG_BLOCK)
                .help("Comma separated address masks to refuse, e.g. 10.0.0.0/8,192.168.*")
                .env("WARDEN_BLOCK")
                .value_delimiter(',')
                .action(ArgAction::Append),
        )
}
