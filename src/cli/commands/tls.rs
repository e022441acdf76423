use clap::{Arg, ArgMatches, Command};

use crate::tls::TlsPaths;

pub const ARG_HTTPS_PORT: &str = "https-port";
pub const ARG_TLS_CERT: &str = "tls-cert";
pub const ARG_TLS_KEY: &str = "tls-key";

pub const DEFAULT_HTTPS_PORT: u16 = 8443;

#[derive(Debug, Clone)]
pub struct Options {
    pub https_port: u16,
    pub paths: Option<TlsPaths>,
}

impl Options {
    /// Parse TLS arguments from matches. Without both a certificate and a
    /// key no HTTPS listener is started.
    ///
    /// # Errors
    /// Returns an error if only one of the certificate and key is given.
    pub fn parse(matches: &ArgMatches) -> anyhow::Result<Self> {
        let read = |id: &str| -> Option<String> {
            matches
                .get_one::<String>(id)
                .cloned()
                .filter(|v| !v.trim().is_empty())
        };

        let paths = match (read(ARG_TLS_CERT), read(ARG_TLS_KEY)) {
            (Some(cert), Some(key)) => Some(TlsPaths::new(cert, key)),
            (None, None) => None,
            (Some(_), None) => anyhow::bail!("missing required argument: --{ARG_TLS_KEY}"),
            (None, Some(_)) => anyhow::bail!("missing required argument: --{ARG_TLS_CERT}"),
        };

        Ok(Self {
            https_port: matches
                .get_one::<u16>(ARG_HTTPS_PORT)
                .copied()
                .unwrap_or(DEFAULT_HTTPS_PORT),
            paths,
        })
    }
}

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_HTTPS_PORT)
                .long(ARG_HTTPS_PORT)
                .help("Port for the HTTPS listener")
                .env("WARDEN_HTTPS_PORT")
                .value_parser(clap::value_parser!(u16)),
        )
        .arg(
            Arg::new(ARG_TLS_CERT)
                .long(ARG_TLS_CERT)
                .help("Path to TLS certificate chain (PEM)")
                .env("WARDEN_TLS_CERT"),
        )
        .arg(
            Arg::new(ARG_TLS_KEY)
                .long(ARG_TLS_KEY)
                .help("Path to TLS private key (PEM)")
                .env("WARDEN_TLS_KEY"),
        )
}
