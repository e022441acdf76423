use thiserror::Error;

/// Stored credential material is unusable. This is an operator problem and
/// is reported as such instead of being folded into a failed login.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CredentialError {
    #[error("account {0} has no credential record")]
    MissingRecord(String),
    #[error("account {0} has a malformed credential record")]
    MalformedRecord(String),
}

/// Client supplied protocol values could not be used. Callers only ever
/// surface this as a generic authentication failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ProtocolError {
    #[error("illegal client public value")]
    IllegalPublicValue,
    #[error("client proof rejected")]
    BadProof,
}

/// Request input that is treated as an attack signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InputError {
    #[error("path escapes its root")]
    Traversal,
    #[error("malformed percent-encoding")]
    MalformedEncoding,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CacheError {
    #[error("verification task ended before producing a result")]
    Aborted,
}
