// src/services/envelope_cipher.rs
//! Encrypted messages between identities.
//!
//! A message is sealed into an [`Envelope`] holding two ciphertexts of the
//! same plaintext, one the sender can reopen and one for the receiver, and
//! anchored as an asset. Opening walks the caller's key history backwards
//! so messages sent to a since-rotated key stay readable.

use crate::error::{Error, Result};
use crate::models::envelope::Envelope;
use crate::services::keymaster::{current_keypair, WalletService};
use crate::utils::crypto::{decrypt_message, encrypt_message, hash_message};
use crate::wallet::key_management::{HdKey, KeyPair};
use chrono::Utc;
use k256::PublicKey;
use log::debug;
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Encrypts `plaintext` for both `sender` and `receiver`.
pub fn seal(plaintext: &str, sender_did: &str, sender: &KeyPair, receiver: &PublicKey) -> Result<Envelope> {
    Ok(Envelope {
        sender: sender_did.to_string(),
        created: Utc::now(),
        cipher_hash: hash_message(plaintext),
        cipher_sender: encrypt_message(&sender.public_key(), sender.secret(), plaintext)?,
        cipher_receiver: encrypt_message(receiver, sender.secret(), plaintext)?,
    })
}

/// Decrypts `ciphertext` with the first of the identity's keys that works,
/// newest first.
///
/// # Arguments
/// * `sender_key` - Sender's public key as of the envelope's creation
/// * `hdkey` - Wallet root
/// * `account`, `index` - Coordinates of the opener's current key
fn open(ciphertext: &str, sender_key: &PublicKey, hdkey: &HdKey, account: u32, index: u32) -> Result<Option<String>> {
    for candidate in (0..=index).rev() {
        let keypair = hdkey.derive_identity(account, candidate)?.keypair()?;
        match decrypt_message(sender_key, keypair.secret(), ciphertext) {
            Ok(plaintext) => return Ok(Some(plaintext)),
            Err(_) => debug!("key index {} does not open envelope", candidate),
        }
    }
    Ok(None)
}

impl WalletService {
    /// Encrypts `message` from the current identity to `did` and anchors the
    /// envelope.
    ///
    /// # Returns
    /// DID of the envelope asset
    pub async fn encrypt_message(&self, message: &str, did: &str, registry: Option<&str>) -> Result<String> {
        let wallet = self.load_wallet()?;
        let (identity, keypair) = current_keypair(&wallet)?;

        let receiver = self.resolve_did(did, None).await?.did_document.public_key()?;
        let envelope = seal(message, &identity.did, &keypair, &receiver)?;

        self.create_data(serde_json::to_value(envelope)?, registry).await
    }

    /// Opens the envelope anchored at `did` as the current identity.
    ///
    /// # Errors
    /// - [`Error::InvalidInput`] if `did` does not hold an envelope
    /// - [`Error::DecryptionFailed`] if none of the identity's keys opens it
    pub async fn decrypt_message(&self, did: &str) -> Result<String> {
        let wallet = self.load_wallet()?;
        let (_, identity) = wallet.current_identity()?;

        let envelope = self
            .resolve_asset(did)
            .await?
            .as_ref()
            .and_then(Envelope::from_asset)
            .ok_or_else(|| Error::InvalidInput(format!("{} is not encrypted", did)))?;

        let sender_key = self
            .resolve_did(&envelope.sender, Some(envelope.created))
            .await?
            .did_document
            .public_key()?;

        let ciphertext = if envelope.sender == identity.did {
            &envelope.cipher_sender
        } else {
            &envelope.cipher_receiver
        };

        open(ciphertext, &sender_key, &wallet.hdkey()?, identity.account, identity.index)?
            .ok_or_else(|| Error::DecryptionFailed { did: did.to_string() })
    }

    pub async fn encrypt_json<T: Serialize>(&self, value: &T, did: &str, registry: Option<&str>) -> Result<String> {
        let plaintext = serde_json::to_string(value)?;
        self.encrypt_message(&plaintext, did, registry).await
    }

    pub async fn decrypt_json<T: DeserializeOwned>(&self, did: &str) -> Result<T> {
        let plaintext = self.decrypt_message(did).await?;
        Ok(serde_json::from_str(&plaintext)?)
    }
}
