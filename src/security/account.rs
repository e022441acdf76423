//! Account collaborator contract and the JSON-file backed default store.
//!
//! The core only reads accounts, with one exception: the expiry derived from
//! `days_to_live` is written back on the first successful login.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{PoisonError, RwLock};
use tracing::{debug, info};

use super::now_seconds;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// Filled from the key of the accounts map.
    #[serde(default, skip_serializing)]
    pub username: String,
    /// `salt|verifier`, both base64.
    #[serde(default, rename = "srp", skip_serializing_if = "Option::is_none")]
    pub credential: Option<String>,
    /// Unix seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expire: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub days_to_live: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allow_net: Option<String>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub disabled: bool,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub belongs: Vec<String>,
}

impl Account {
    #[must_use]
    pub fn has_expired(&self, now_seconds: i64) -> bool {
        self.expire.is_some_and(|expire| expire <= now_seconds)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AccountPatch {
    /// Expiry computed from `days_to_live` at first login. Stores ignore it
    /// when the account already carries an expiry.
    pub first_login_expire: Option<i64>,
}

pub type AccountSelector<'a> = &'a (dyn Fn(&Account) -> Option<String> + Sync);

#[async_trait]
pub trait AccountStore: Send + Sync {
    async fn get_account(&self, username: &str) -> Option<Account>;

    /// # Errors
    /// Returns an error if the change cannot be persisted.
    async fn update_account(&self, username: &str, patch: AccountPatch) -> Result<()>;

    fn normalize_username(&self, username: &str) -> String {
        username.trim().to_lowercase()
    }

    fn account_can_login(&self, account: &Account) -> bool;

    /// First value the selector yields walking the account and then the
    /// groups it belongs to.
    fn get_from_account(&self, account: &Account, selector: AccountSelector<'_>) -> Option<String>;
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct AccountsFile {
    #[serde(default)]
    accounts: BTreeMap<String, Account>,
}

/// Accounts held in memory, optionally persisted to a JSON file of the form
/// `{"accounts": {"alice": {"srp": "...", "belongs": ["staff"]}}}`.
#[derive(Debug, Default)]
pub struct MemoryAccountStore {
    accounts: RwLock<BTreeMap<String, Account>>,
    path: Option<PathBuf>,
}

impl MemoryAccountStore {
    #[must_use]
    pub fn new(accounts: impl IntoIterator<Item = Account>) -> Self {
        let store = Self::default();
        {
            let mut map = store.accounts.write().unwrap_or_else(PoisonError::into_inner);
            for mut account in accounts {
                account.username = store.normalize_username(&account.username);
                map.insert(account.username.clone(), account);
            }
        }
        store
    }

    /// Load accounts from a JSON file; updates are written back to it.
    ///
    /// # Errors
    /// Returns an error if the file cannot be read or parsed.
    pub async fn load(path: &Path) -> Result<Self> {
        let raw = tokio::fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read accounts file: {}", path.display()))?;
        let file: AccountsFile = serde_json::from_str(&raw)
            .with_context(|| format!("Failed to parse accounts file: {}", path.display()))?;

        let store = Self::new(file.accounts.into_iter().map(|(username, mut account)| {
            account.username = username;
            account
        }));
        info!(
            "Loaded {} accounts from {}",
            store.len(),
            path.display()
        );
        Ok(Self {
            path: Some(path.to_path_buf()),
            ..store
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.accounts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    async fn persist(&self) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let file = AccountsFile {
            accounts: self
                .accounts
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        };
        let json = serde_json::to_vec_pretty(&file).context("Failed to serialize accounts")?;
        let tmp = path.with_extension("tmp");
        tokio::fs::write(&tmp, json)
            .await
            .with_context(|| format!("Failed to write accounts file: {}", tmp.display()))?;
        tokio::fs::rename(&tmp, path)
            .await
            .with_context(|| format!("Failed to replace accounts file: {}", path.display()))
    }
}

#[async_trait]
impl AccountStore for MemoryAccountStore {
    async fn get_account(&self, username: &str) -> Option<Account> {
        let username = self.normalize_username(username);
        if username.is_empty() {
            return None;
        }
        self.accounts
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&username)
            .cloned()
    }

    async fn update_account(&self, username: &str, patch: AccountPatch) -> Result<()> {
        let username = self.normalize_username(username);
        let changed = {
            let mut accounts = self.accounts.write().unwrap_or_else(PoisonError::into_inner);
            let account = accounts
                .get_mut(&username)
                .with_context(|| format!("Unknown account: {username}"))?;
            match patch.first_login_expire {
                Some(expire) if account.expire.is_none() => {
                    account.expire = Some(expire);
                    true
                }
                _ => false,
            }
        };
        if changed {
            debug!("Account {username} updated");
            self.persist().await?;
        }
        Ok(())
    }

    fn account_can_login(&self, account: &Account) -> bool {
        !account.disabled && !account.has_expired(now_seconds()) && account.credential.is_some()
    }

    fn get_from_account(&self, account: &Account, selector: AccountSelector<'_>) -> Option<String> {
        let accounts = self.accounts.read().unwrap_or_else(PoisonError::into_inner);
        let mut visited = HashSet::new();
        let mut queue = vec![account.clone()];
        while let Some(current) = queue.pop() {
            if !visited.insert(current.username.clone()) {
                continue;
            }
            if let Some(value) = selector(&current) {
                return Some(value);
            }
            // Groups are searched in declaration order.
            for group in current.belongs.iter().rev() {
                if let Some(parent) = accounts.get(&self.normalize_username(group)) {
                    queue.push(parent.clone());
                }
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account(username: &str) -> Account {
        Account {
            username: username.to_string(),
            credential: Some("c2FsdA==|dmVyaWZpZXI=".to_string()),
            ..Account::default()
        }
    }

    #[tokio::test]
    async fn lookup_is_case_insensitive() {
        let store = MemoryAccountStore::new([account("Alice")]);
        let found = store.get_account("  ALICE ").await;
        assert_eq!(found.map(|a| a.username), Some("alice".to_string()));
        assert!(store.get_account("").await.is_none());
    }

    #[tokio::test]
    async fn first_login_expire_is_written_once() -> Result<()> {
        let store = MemoryAccountStore::new([account("alice")]);
        store
            .update_account(
                "alice",
                AccountPatch {
                    first_login_expire: Some(100),
                },
            )
            .await?;
        store
            .update_account(
                "alice",
                AccountPatch {
                    first_login_expire: Some(200),
                },
            )
            .await?;
        let alice = store.get_account("alice").await;
        assert_eq!(alice.and_then(|a| a.expire), Some(100));
        Ok(())
    }

    #[tokio::test]
    async fn update_unknown_account_fails() {
        let store = MemoryAccountStore::new(Vec::<Account>::new());
        assert!(store
            .update_account("ghost", AccountPatch::default())
            .await
            .is_err());
    }

    #[test]
    fn can_login_rules() {
        let store = MemoryAccountStore::new(Vec::<Account>::new());
        assert!(store.account_can_login(&account("alice")));

        let disabled = Account {
            disabled: true,
            ..account("bob")
        };
        assert!(!store.account_can_login(&disabled));

        let expired = Account {
            expire: Some(1),
            ..account("carol")
        };
        assert!(!store.account_can_login(&expired));

        let group = Account {
            credential: None,
            ..account("staff")
        };
        assert!(!store.account_can_login(&group));
    }

    #[test]
    fn allow_net_is_inherited_from_groups() {
        let staff = Account {
            allow_net: Some("10.0.0.0/8".to_string()),
            credential: None,
            ..account("staff")
        };
        let alice = Account {
            belongs: vec!["Staff".to_string()],
            ..account("alice")
        };
        let store = MemoryAccountStore::new([staff, alice.clone()]);
        let mask = store.get_from_account(&alice, &|a: &Account| a.allow_net.clone());
        assert_eq!(mask.as_deref(), Some("10.0.0.0/8"));
    }

    #[test]
    fn group_cycles_terminate() {
        let a = Account {
            belongs: vec!["b".to_string()],
            ..account("a")
        };
        let b = Account {
            belongs: vec!["a".to_string()],
            ..account("b")
        };
        let store = MemoryAccountStore::new([a.clone(), b]);
        assert!(store
            .get_from_account(&a, &|acc: &Account| acc.allow_net.clone())
            .is_none());
    }

    #[tokio::test]
    async fn load_reads_accounts_file() -> Result<()> {
        let path = std::env::temp_dir().join(format!("warden-accounts-{}.json", uuid::Uuid::new_v4()));
        tokio::fs::write(
            &path,
            r#"{"accounts": {"Alice": {"srp": "c2FsdA==|dmVyaWZpZXI=", "days_to_live": 3}}}"#,
        )
        .await?;
        let store = MemoryAccountStore::load(&path).await?;
        let alice = store.get_account("alice").await;
        assert_eq!(alice.and_then(|a| a.days_to_live), Some(3));

        store
            .update_account(
                "alice",
                AccountPatch {
                    first_login_expire: Some(42),
                },
            )
            .await?;
        let reloaded = MemoryAccountStore::load(&path).await?;
        assert_eq!(
            reloaded.get_account("alice").await.and_then(|a| a.expire),
            Some(42)
        );
        tokio::fs::remove_file(&path).await?;
        Ok(())
    }
}
