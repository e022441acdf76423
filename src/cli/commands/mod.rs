pub mod logging;
pub mod security;
pub mod tls;

use clap::{
    builder::styling::{AnsiColor, Effects, Styles},
    Arg, ColorChoice, Command,
};

pub const CMD_CREDENTIAL: &str = "credential";
pub const ARG_USERNAME: &str = "username";
pub const ARG_PASSWORD: &str = "password";

fn credential_command() -> Command {
    Command::new(CMD_CREDENTIAL)
        .about("Print a new SRP credential record for the accounts file")
        .arg(
            Arg::new(ARG_USERNAME)
                .short('u')
                .long(ARG_USERNAME)
                .help("Account name the record is bound to")
                .required(true),
        )
        .arg(
            Arg::new(ARG_PASSWORD)
                .long(ARG_PASSWORD)
                .help("Password to derive the verifier from")
                .env("WARDEN_PASSWORD")
                .hide_env_values(true)
                .required(true),
        )
}

#[must_use]
pub fn new() -> Command {
    let styles = Styles::styled()
        .header(AnsiColor::Yellow.on_default() | Effects::BOLD)
        .usage(AnsiColor::Green.on_default() | Effects::BOLD)
        .literal(AnsiColor::Blue.on_default() | Effects::BOLD)
        .placeholder(AnsiColor::Green.on_default());

    let long_version: &'static str = Box::leak(
        format!("{} - {}", env!("CARGO_PKG_VERSION"), crate::GIT_COMMIT_HASH).into_boxed_str(),
    );

    let command = Command::new("warden")
        .about(env!("CARGO_PKG_DESCRIPTION"))
        .version(env!("CARGO_PKG_VERSION"))
        .long_version(long_version)
        .color(ColorChoice::Auto)
        .styles(styles)
        .subcommand_negates_reqs(true)
        .subcommand(credential_command())
        .arg(
            Arg::new("port")
                .short('p')
                .long("port")
                .help("Port for the plain HTTP listener")
                .default_value("8080")
                .env("WARDEN_PORT")
                .value_parser(clap::value_parser!(u16)),
        );

    let command = tls::with_args(command);
    let command = security::with_args(command);
    logging::with_args(command)
}
