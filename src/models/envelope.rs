// src/models/envelope.rs
//! Dual-ciphertext message envelope.
//!
//! The same plaintext is encrypted twice: once for the sender's own key pair
//! and once for the receiver. `cipher_hash` lets two envelopes be compared
//! for equal content without decrypting either.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Envelope {
    /// DID of the encrypting identity
    pub sender: String,
    /// Time of encryption; the sender's key is resolved as of this instant
    pub created: DateTime<Utc>,
    /// Hex SHA-256 of the plaintext
    pub cipher_hash: String,
    pub cipher_sender: String,
    pub cipher_receiver: String,
}

impl Envelope {
    /// Interprets anchored asset data as an envelope, if it is one.
    pub fn from_asset(data: &Value) -> Option<Envelope> {
        if data.get("cipher_hash").is_none() {
            return None;
        }
        serde_json::from_value(data.clone()).ok()
    }
}
