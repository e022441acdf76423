//! Map validated CLI matches to the action to run.

use crate::cli::actions::{credential, server, Action};
use crate::cli::commands::{security, tls, ARG_PASSWORD, ARG_USERNAME, CMD_CREDENTIAL};
use anyhow::{Context, Result};
use secrecy::SecretString;

/// # Errors
/// Returns an error if required arguments are missing or inconsistent.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    if let Some(sub_m) = matches.subcommand_matches(CMD_CREDENTIAL) {
        let username = sub_m
            .get_one::<String>(ARG_USERNAME)
            .cloned()
            .context("missing required argument: --username")?;
        let password = sub_m
            .get_one::<String>(ARG_PASSWORD)
            .cloned()
            .context("missing required argument: --password")?;
        return Ok(Action::Credential(credential::Args {
            username,
            password: SecretString::from(password),
        }));
    }

    let port = matches.get_one::<u16>("port").copied().unwrap_or(8080);
    let security_opts = security::Options::parse(matches)?;
    let tls_opts = tls::Options::parse(matches)?;

    Ok(Action::Server(server::Args {
        port,
        https_port: tls_opts.https_port,
        tls: tls_opts.paths,
        accounts: security_opts.accounts,
        cookie_secret: security_opts.cookie_secret,
        security: security_opts.config,
        block: security_opts.block,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::IpChangePolicy;
    use std::time::Duration;

    #[test]
    fn server_action_carries_security_settings() {
        temp_env::with_vars(
            [
                ("WARDEN_ACCOUNTS", Some("/tmp/warden-accounts.json")),
                ("WARDEN_ALLOW_SESSION_IP_CHANGE", Some("true")),
                ("WARDEN_SESSION_DURATION", Some("600")),
                ("WARDEN_PROXIES", Some("2")),
                ("WARDEN_TLS_CERT", None),
                ("WARDEN_TLS_KEY", None),
                ("WARDEN_COOKIE_SECRET", None),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec!["warden"]);
                let action = handler(&matches);
                assert!(action.is_ok(), "{:?}", action.as_ref().err());
                let Ok(Action::Server(args)) = action else {
                    panic!("expected server action");
                };
                assert_eq!(args.port, 8080);
                assert!(args.tls.is_none());
                assert!(args.cookie_secret.is_none());
                assert_eq!(
                    args.accounts,
                    std::path::PathBuf::from("/tmp/warden-accounts.json")
                );
                assert_eq!(
                    args.security.allow_session_ip_change(),
                    IpChangePolicy::Always
                );
                assert_eq!(args.security.session_duration(), Duration::from_secs(600));
                assert_eq!(args.security.proxies(), 2);
            },
        );
    }

    #[test]
    fn tls_cert_without_key_is_rejected() {
        temp_env::with_vars(
            [
                ("WARDEN_ACCOUNTS", Some("/tmp/warden-accounts.json")),
                ("WARDEN_TLS_CERT", Some("/tmp/warden-cert.pem")),
                ("WARDEN_TLS_KEY", None),
            ],
            || {
                let matches = crate::cli::commands::new().get_matches_from(vec!["warden"]);
                let result = handler(&matches);
                assert!(result.is_err());
                if let Err(err) = result {
                    assert!(err
                        .to_string()
                        .contains("missing required argument: --tls-key"));
                }
            },
        );
    }

    #[test]
    fn credential_action() {
        temp_env::with_vars([("WARDEN_PASSWORD", Some("hunter2"))], || {
            let matches = crate::cli::commands::new().get_matches_from(vec![
                "warden",
                "credential",
                "--username",
                "alice",
            ]);
            let action = handler(&matches);
            assert!(
                matches!(action, Ok(Action::Credential(ref args)) if args.username == "alice"),
                "{action:?}"
            );
        });
    }
}
