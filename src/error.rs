// src/error.rs
//! Error types for the keymaster.
//!
//! Every fallible operation returns [`Result`]. Variants carry the offending
//! DID or identity name so front ends can report it without parsing strings,
//! and [`Error::kind`] collapses them onto the small set of categories callers
//! usually branch on.

use thiserror::Error;

/// Coarse error categories exposed to front ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    DuplicateName,
    CryptoFailure,
    LedgerUnavailable,
    RejectedTransaction,
    Internal,
}

/// All errors produced by the keymaster.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed or empty input data
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Seed material is absent or is not a usable mnemonic
    #[error("invalid seed: {0}")]
    InvalidSeed(String),

    /// No such identity, wallet or DID
    #[error("not found: {0}")]
    NotFound(String),

    #[error("no current identity selected")]
    NoCurrentIdentity,

    #[error("already have an identity named {0}")]
    DuplicateName(String),

    /// Signature, hash or key material could not be processed
    #[error("crypto failure: {0}")]
    CryptoFailure(String),

    /// No key rotation index could open the envelope
    #[error("cannot decrypt {did}")]
    DecryptionFailed { did: String },

    #[error("ledger refused key rotation for {did}")]
    RotationFailed { did: String },

    #[error("credential issuer {issuer} is not the current identity")]
    InvalidIssuer { issuer: String },

    #[error("invalid challenge {did}")]
    InvalidChallenge { did: String },

    /// Transport failure reaching the ledger
    #[error("ledger unavailable: {0}")]
    LedgerUnavailable(String),

    /// The ledger declined a signed transaction
    #[error("ledger rejected transaction: {0}")]
    RejectedTransaction(String),

    #[error("wallet store error: {0}")]
    Storage(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("configuration error: {0}")]
    Config(#[from] config::ConfigError),
}

impl Error {
    /// Maps the variant onto its [`ErrorKind`].
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidInput(_)
            | Error::InvalidSeed(_)
            | Error::InvalidIssuer { .. }
            | Error::InvalidChallenge { .. } => ErrorKind::InvalidInput,
            Error::NotFound(_) | Error::NoCurrentIdentity => ErrorKind::NotFound,
            Error::DuplicateName(_) => ErrorKind::DuplicateName,
            Error::CryptoFailure(_) | Error::DecryptionFailed { .. } => ErrorKind::CryptoFailure,
            Error::LedgerUnavailable(_) => ErrorKind::LedgerUnavailable,
            Error::RejectedTransaction(_) | Error::RotationFailed { .. } => {
                ErrorKind::RejectedTransaction
            }
            Error::Storage(_) | Error::Serialization(_) | Error::Config(_) => ErrorKind::Internal,
        }
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::LedgerUnavailable(err.to_string())
    }
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
