use anyhow::{ensure, Result};
use secrecy::{ExposeSecret, SecretString};

use crate::security::{AccountStore, CredentialVerifier, MemoryAccountStore};

#[derive(Debug)]
pub struct Args {
    pub username: String,
    pub password: SecretString,
}

/// Record for the `srp` field of an account, bound to the normalized name.
///
/// # Errors
/// Returns an error if the username or password is empty.
pub fn record(args: &Args) -> Result<String> {
    let username = MemoryAccountStore::default().normalize_username(&args.username);
    ensure!(!username.is_empty(), "username must not be empty");
    ensure!(
        !args.password.expose_secret().is_empty(),
        "password must not be empty"
    );
    Ok(CredentialVerifier::make_record(
        &username,
        args.password.expose_secret(),
    ))
}

/// Print a fresh credential record.
/// # Errors
/// Returns an error if the arguments are unusable.
pub fn execute(args: &Args) -> Result<()> {
    let record = record(args)?;
    println!("{record}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::security::Account;

    fn args(username: &str, password: &str) -> Args {
        Args {
            username: username.to_string(),
            password: SecretString::from(password.to_string()),
        }
    }

    #[test]
    fn record_verifies_with_normalized_name() -> Result<()> {
        let record = record(&args("  Alice ", "hunter2"))?;
        let account = Account {
            username: "alice".to_string(),
            credential: Some(record),
            ..Account::default()
        };
        let verifier = CredentialVerifier::default();
        assert!(verifier.check_password(&account, "hunter2")?);
        assert!(!verifier.check_password(&account, "hunter3")?);
        Ok(())
    }

    #[test]
    fn empty_values_are_rejected() {
        assert!(record(&args(" ", "pw")).is_err());
        assert!(record(&args("alice", "")).is_err());
    }
}
