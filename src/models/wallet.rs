// src/models/wallet.rs
//! Wallet aggregate.
//!
//! The wallet is the whole of the keymaster's secret local state. It is read
//! and written as one unit through a [`crate::storage::wallet_store::WalletStore`]
//! on every mutating call.
//!
//! # Invariants
//! - `counter` never decreases and is the `account` coordinate handed to the
//!   next created identity
//! - identity names are unique keys of `ids`
//! - `current` is either empty or a key of `ids`

use crate::error::{Error, Result};
use crate::utils::crypto::encrypt_message;
use crate::wallet::credential_storage::CredentialSet;
use crate::wallet::key_management::HdKey;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// HD root key material as persisted in the wallet file.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HdKeyJson {
    /// Hex master private key
    pub private_key: String,
    /// Hex master chain code
    pub chain_code: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Seed {
    /// Mnemonic encrypted to the wallet root key pair
    pub mnemonic: String,
    pub hdkey: HdKeyJson,
}

/// A named identity held in the wallet.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Identity {
    pub did: String,
    /// HD account coordinate, fixed at creation
    pub account: u32,
    /// HD index coordinate, bumped by every key rotation
    pub index: u32,
    /// Assets created by this identity
    #[serde(default)]
    pub owned: CredentialSet,
    /// Credentials accepted by this identity, in acceptance order
    #[serde(default)]
    pub held: CredentialSet,
}

impl Identity {
    pub fn new(did: &str, account: u32) -> Self {
        Identity {
            did: did.to_string(),
            account,
            index: 0,
            owned: CredentialSet::new(),
            held: CredentialSet::new(),
        }
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Wallet {
    pub seed: Seed,
    pub counter: u32,
    pub ids: BTreeMap<String, Identity>,
    /// Name of the active identity, empty when none is selected
    #[serde(default)]
    pub current: String,
}

impl Wallet {
    /// Builds an empty wallet rooted at `mnemonic`.
    ///
    /// # Errors
    /// [`Error::InvalidSeed`] if the mnemonic is malformed.
    pub fn from_mnemonic(mnemonic: &str) -> Result<Self> {
        let hdkey = HdKey::from_mnemonic(mnemonic)?;
        let root = hdkey.keypair()?;
        let backup = encrypt_message(&root.public_key(), root.secret(), mnemonic)?;

        Ok(Wallet {
            seed: Seed {
                mnemonic: backup,
                hdkey: hdkey.to_json(),
            },
            counter: 0,
            ids: BTreeMap::new(),
            current: String::new(),
        })
    }

    pub fn hdkey(&self) -> Result<HdKey> {
        HdKey::from_json(&self.seed.hdkey)
    }

    /// Name and record of the active identity.
    pub fn current_identity(&self) -> Result<(&str, &Identity)> {
        self.ids
            .get_key_value(self.current.as_str())
            .map(|(name, id)| (name.as_str(), id))
            .ok_or(Error::NoCurrentIdentity)
    }

    pub fn current_identity_mut(&mut self) -> Result<&mut Identity> {
        self.ids
            .get_mut(self.current.as_str())
            .ok_or(Error::NoCurrentIdentity)
    }
}
