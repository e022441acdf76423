//! SRP-6a credential verification (2048-bit group, SHA-256).
//!
//! The account store keeps `salt|verifier` only. A password check either runs
//! interactively (the client sends its public value and proof) or, for
//! credentials supplied in plaintext by the query string or an
//! `Authorization` header, by running the client half here.

use base64::{engine::general_purpose::STANDARD, Engine};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use srp::{client::SrpClient, groups::G_2048, server::SrpServer};

use super::account::Account;
use super::error::{CredentialError, ProtocolError};

const EPHEMERAL_LEN: usize = 32;
const SALT_LEN: usize = 16;
const RECORD_SEPARATOR: char = '|';

/// Decoded `salt|verifier` pair.
#[derive(Clone, PartialEq, Eq)]
pub struct CredentialRecord {
    salt: Vec<u8>,
    verifier: Vec<u8>,
}

impl CredentialRecord {
    /// # Errors
    /// Returns [`CredentialError::MalformedRecord`] unless the record holds
    /// exactly two non-empty base64 parts.
    pub fn parse(username: &str, record: &str) -> Result<Self, CredentialError> {
        let malformed = || CredentialError::MalformedRecord(username.to_string());
        let mut parts = record.split(RECORD_SEPARATOR);
        let (Some(salt), Some(verifier), None) = (parts.next(), parts.next(), parts.next()) else {
            return Err(malformed());
        };
        if salt.trim().is_empty() || verifier.trim().is_empty() {
            return Err(malformed());
        }
        let salt = STANDARD.decode(salt.trim()).map_err(|_| malformed())?;
        let verifier = STANDARD.decode(verifier.trim()).map_err(|_| malformed())?;
        if salt.is_empty() || verifier.is_empty() {
            return Err(malformed());
        }
        Ok(Self { salt, verifier })
    }

    #[must_use]
    pub fn encode(&self) -> String {
        format!(
            "{}{RECORD_SEPARATOR}{}",
            STANDARD.encode(&self.salt),
            STANDARD.encode(&self.verifier)
        )
    }

    #[must_use]
    pub fn salt(&self) -> &[u8] {
        &self.salt
    }
}

impl std::fmt::Debug for CredentialRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialRecord")
            .field("salt", &STANDARD.encode(&self.salt))
            .field("verifier", &"***")
            .finish()
    }
}

/// What the client needs to answer a challenge.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerChallenge {
    pub server_public: Vec<u8>,
    pub salt: Vec<u8>,
}

/// Server side of one verification attempt. Never persisted.
pub struct ChallengeSession {
    secret: Vec<u8>,
    verifier: Vec<u8>,
}

impl ChallengeSession {
    /// Check the client proof and return the server proof (M2).
    ///
    /// # Errors
    /// Returns a [`ProtocolError`] when the client values are unusable or the
    /// proof does not match. Callers must not tell these cases apart.
    pub fn finish(&self, client_public: &[u8], client_proof: &[u8]) -> Result<Vec<u8>, ProtocolError> {
        let server = SrpServer::<Sha256>::new(&G_2048);
        let verifier = server
            .process_reply(&self.secret, &self.verifier, client_public)
            .map_err(|_| ProtocolError::IllegalPublicValue)?;
        verifier
            .verify_client(client_proof)
            .map_err(|_| ProtocolError::BadProof)?;
        Ok(verifier.proof().to_vec())
    }

    #[must_use]
    pub fn complete(&self, client_public: &[u8], client_proof: &[u8]) -> bool {
        self.finish(client_public, client_proof).is_ok()
    }
}

impl std::fmt::Debug for ChallengeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("ChallengeSession(***)")
    }
}

#[derive(Clone)]
pub struct CredentialVerifier {
    decoy_key: [u8; 32],
}

impl Default for CredentialVerifier {
    fn default() -> Self {
        let mut decoy_key = [0u8; 32];
        OsRng.fill_bytes(&mut decoy_key);
        Self::new(decoy_key)
    }
}

impl CredentialVerifier {
    /// `decoy_key` keeps decoy salts stable per username for the process
    /// lifetime, so repeated probes see the same salt as for real accounts.
    #[must_use]
    pub fn new(decoy_key: [u8; 32]) -> Self {
        Self { decoy_key }
    }

    /// Start a verification for `account`.
    ///
    /// # Errors
    /// Returns a [`CredentialError`] when the account has no usable record.
    pub fn challenge(
        &self,
        account: &Account,
    ) -> Result<(ServerChallenge, ChallengeSession), CredentialError> {
        let record = account
            .credential
            .as_deref()
            .ok_or_else(|| CredentialError::MissingRecord(account.username.clone()))?;
        let record = CredentialRecord::parse(&account.username, record)?;
        Ok(start(record.salt, record.verifier))
    }

    /// A challenge indistinguishable from [`Self::challenge`] for a username
    /// that has no usable record. It can never be completed.
    #[must_use]
    pub fn decoy_challenge(&self, username: &str) -> (ServerChallenge, ChallengeSession) {
        let mut hasher = Sha256::new();
        hasher.update(self.decoy_key);
        hasher.update(username.as_bytes());
        let salt = hasher.finalize()[..SALT_LEN].to_vec();

        let mut password = [0u8; EPHEMERAL_LEN];
        OsRng.fill_bytes(&mut password);
        let verifier =
            SrpClient::<Sha256>::new(&G_2048).compute_verifier(username.as_bytes(), &password, &salt);
        start(salt, verifier)
    }

    /// Verify a plaintext password against the stored record by playing the
    /// client side locally. CPU bound; run it off the async executor.
    ///
    /// # Errors
    /// Returns a [`CredentialError`] when the account has no usable record.
    pub fn check_password(&self, account: &Account, password: &str) -> Result<bool, CredentialError> {
        let (challenge, session) = self.challenge(account)?;
        let client = SrpClient::<Sha256>::new(&G_2048);
        let mut secret = [0u8; EPHEMERAL_LEN];
        OsRng.fill_bytes(&mut secret);
        let client_public = client.compute_public_ephemeral(&secret);
        let Ok(client_verifier) = client.process_reply(
            &secret,
            account.username.as_bytes(),
            password.as_bytes(),
            &challenge.salt,
            &challenge.server_public,
        ) else {
            return Ok(false);
        };
        Ok(session.complete(&client_public, client_verifier.proof()))
    }

    /// Fresh `salt|verifier` record for `password`.
    #[must_use]
    pub fn make_record(username: &str, password: &str) -> String {
        let mut salt = vec![0u8; SALT_LEN];
        OsRng.fill_bytes(&mut salt);
        let verifier = SrpClient::<Sha256>::new(&G_2048).compute_verifier(
            username.as_bytes(),
            password.as_bytes(),
            &salt,
        );
        CredentialRecord { salt, verifier }.encode()
    }
}

fn start(salt: Vec<u8>, verifier: Vec<u8>) -> (ServerChallenge, ChallengeSession) {
    let mut secret = vec![0u8; EPHEMERAL_LEN];
    OsRng.fill_bytes(&mut secret);
    let server_public = SrpServer::<Sha256>::new(&G_2048).compute_public_ephemeral(&secret, &verifier);
    (
        ServerChallenge {
            server_public,
            salt,
        },
        ChallengeSession { secret, verifier },
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn account_with_password(username: &str, password: &str) -> Account {
        Account {
            username: username.to_string(),
            credential: Some(CredentialVerifier::make_record(username, password)),
            ..Account::default()
        }
    }

    /// Client side of an interactive login, as a browser would run it.
    fn client_answer(username: &str, password: &str, challenge: &ServerChallenge) -> (Vec<u8>, Vec<u8>) {
        let client = SrpClient::<Sha256>::new(&G_2048);
        let secret = [9u8; EPHEMERAL_LEN];
        let public = client.compute_public_ephemeral(&secret);
        let proof = client
            .process_reply(
                &secret,
                username.as_bytes(),
                password.as_bytes(),
                &challenge.salt,
                &challenge.server_public,
            )
            .map(|verifier| verifier.proof().to_vec())
            .unwrap_or_default();
        (public, proof)
    }

    #[test]
    fn record_requires_two_non_empty_parts() {
        for bad in ["", "|", "c2FsdA==|", "|dmVy", "c2FsdA==", "a|b|c", "***|dmVy"] {
            assert_eq!(
                CredentialRecord::parse("alice", bad),
                Err(CredentialError::MalformedRecord("alice".to_string())),
                "record {bad:?} should be rejected"
            );
        }
        let record = CredentialRecord::parse("alice", "c2FsdA==|dmVyaWZpZXI=");
        assert_eq!(record.map(|r| r.salt().to_vec()), Ok(b"salt".to_vec()));
    }

    #[test]
    fn challenge_requires_record() {
        let verifier = CredentialVerifier::default();
        let account = Account {
            username: "alice".to_string(),
            ..Account::default()
        };
        assert!(matches!(
            verifier.challenge(&account),
            Err(CredentialError::MissingRecord(name)) if name == "alice"
        ));

        let malformed = Account {
            credential: Some("s1|v1|x".to_string()),
            ..account
        };
        assert!(matches!(
            verifier.challenge(&malformed),
            Err(CredentialError::MalformedRecord(_))
        ));
    }

    #[test]
    fn interactive_login_round() {
        let verifier = CredentialVerifier::default();
        let account = account_with_password("alice", "wonderland");

        let Ok((challenge, session)) = verifier.challenge(&account) else {
            panic!("challenge failed");
        };
        let (public, proof) = client_answer("alice", "wonderland", &challenge);
        let server_proof = session.finish(&public, &proof);
        assert!(server_proof.is_ok_and(|m2| !m2.is_empty()));

        let Ok((challenge, session)) = verifier.challenge(&account) else {
            panic!("challenge failed");
        };
        let (public, proof) = client_answer("alice", "looking-glass", &challenge);
        assert!(!session.complete(&public, &proof));
    }

    #[test]
    fn rejects_zero_public_value_and_empty_proof() {
        let verifier = CredentialVerifier::default();
        let account = account_with_password("alice", "wonderland");
        let Ok((_, session)) = verifier.challenge(&account) else {
            panic!("challenge failed");
        };
        assert_eq!(
            session.finish(&[0u8; 1], &[]),
            Err(ProtocolError::IllegalPublicValue)
        );
        let Ok((challenge, session)) = verifier.challenge(&account) else {
            panic!("challenge failed");
        };
        let (public, _) = client_answer("alice", "wonderland", &challenge);
        assert!(!session.complete(&public, &[]));
    }

    #[test]
    fn check_password_runs_both_halves() {
        let verifier = CredentialVerifier::default();
        let account = account_with_password("alice", "wonderland");
        assert_eq!(verifier.check_password(&account, "wonderland"), Ok(true));
        assert_eq!(verifier.check_password(&account, "Wonderland"), Ok(false));
    }

    #[test]
    fn decoy_salt_is_stable_per_username() {
        let verifier = CredentialVerifier::new([1u8; 32]);
        let (first, _) = verifier.decoy_challenge("ghost");
        let (second, _) = verifier.decoy_challenge("ghost");
        let (other, _) = verifier.decoy_challenge("phantom");
        assert_eq!(first.salt, second.salt);
        assert_ne!(first.salt, other.salt);
        assert_ne!(first.server_public, second.server_public);
        assert_eq!(first.salt.len(), SALT_LEN);
    }

    #[test]
    fn decoy_challenge_never_completes() {
        let verifier = CredentialVerifier::default();
        let (challenge, session) = verifier.decoy_challenge("ghost");
        let (public, proof) = client_answer("ghost", "anything", &challenge);
        assert!(!session.complete(&public, &proof));
    }

    #[test]
    fn record_debug_hides_verifier() {
        let record = CredentialRecord::parse("alice", "c2FsdA==|dmVyaWZpZXI=");
        let debug = format!("{record:?}");
        assert!(!debug.contains("dmVyaWZpZXI="));
    }
}
