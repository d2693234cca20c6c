// src/services/keymaster.rs
//! Keymaster service core.
//!
//! [`WalletService`] is the public API consumed by front ends. It owns no
//! wallet state of its own: every operation loads the [`Wallet`] aggregate
//! from the injected [`WalletStore`], works on it, and saves it back only
//! after the ledger has acknowledged any transaction involved.
//!
//! This file holds construction, the wallet lifecycle and the signature
//! engine. Identity, asset, envelope, credential and challenge operations
//! live in the sibling modules as further `impl WalletService` blocks.

use crate::config::Settings;
use crate::error::{Error, Result};
use crate::ledger::gatekeeper_client::GatekeeperClient;
use crate::ledger::Ledger;
use crate::models::did::DidResolution;
use crate::models::operation::{Operation, Signature};
use crate::models::wallet::{Identity, Wallet};
use crate::services::schema_faker::{ExampleGenerator, SchemaFaker};
use crate::storage::wallet_store::{JsonFileStore, WalletStore};
use crate::utils::crypto::{decrypt_message, encrypt_message};
use crate::utils::serialization::{canonical_hash, SIGNATURE_FIELD};
use crate::wallet::key_management::{verify_hash, KeyPair};
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Source of fresh mnemonics for wallets created on first use.
///
/// Entropy and wordlist handling are left to the implementor.
pub trait MnemonicSource: Send + Sync {
    fn generate(&self) -> Result<String>;
}

/// Anchored payload of a wallet or identity backup.
#[derive(Serialize, Deserialize)]
pub(crate) struct VaultBackup {
    pub backup: String,
}

/// Keymaster entry point.
///
/// Cheap to clone; clones share the ledger, store and generator handles.
#[derive(Clone)]
pub struct WalletService {
    pub(crate) ledger: Arc<dyn Ledger>,
    store: Arc<dyn WalletStore>,
    pub(crate) examples: Arc<dyn ExampleGenerator>,
    mnemonics: Option<Arc<dyn MnemonicSource>>,
    default_registry: String,
}

impl WalletService {
    /// Creates a service over `ledger` and `store`.
    ///
    /// Credential data is generated by a randomly seeded [`SchemaFaker`]
    /// and new assets go to the "peerbit" registry unless configured
    /// otherwise.
    pub fn new(ledger: Arc<dyn Ledger>, store: Arc<dyn WalletStore>) -> Self {
        WalletService {
            ledger,
            store,
            examples: Arc::new(SchemaFaker::new()),
            mnemonics: None,
            default_registry: crate::config::DEFAULT_REGISTRY.to_string(),
        }
    }

    /// Service talking to the configured gatekeeper, with a JSON wallet file.
    pub fn from_settings(settings: &Settings) -> Result<Self> {
        let ledger = GatekeeperClient::from_settings(settings)?;
        let store = JsonFileStore::new(&settings.wallet_path);
        Ok(WalletService::new(Arc::new(ledger), Arc::new(store))
            .with_default_registry(&settings.default_registry))
    }

    pub fn with_example_generator(mut self, examples: Arc<dyn ExampleGenerator>) -> Self {
        self.examples = examples;
        self
    }

    pub fn with_mnemonic_source(mut self, mnemonics: Arc<dyn MnemonicSource>) -> Self {
        self.mnemonics = Some(mnemonics);
        self
    }

    pub fn with_default_registry(mut self, registry: &str) -> Self {
        self.default_registry = registry.to_string();
        self
    }

    pub fn default_registry(&self) -> &str {
        &self.default_registry
    }

    pub(crate) fn registry_or_default<'a>(&'a self, registry: Option<&'a str>) -> &'a str {
        registry.unwrap_or(&self.default_registry)
    }

    // ------------------------------------------------------------------
    // Wallet lifecycle
    // ------------------------------------------------------------------

    /// Creates and saves an empty wallet rooted at `mnemonic`.
    ///
    /// # Errors
    /// - [`Error::InvalidSeed`] if the mnemonic is malformed
    /// - [`Error::InvalidInput`] if a wallet exists and `overwrite` is false
    pub fn new_wallet(&self, mnemonic: &str, overwrite: bool) -> Result<Wallet> {
        if !overwrite && self.store.load()?.is_some() {
            return Err(Error::InvalidInput("wallet already exists".into()));
        }

        let wallet = Wallet::from_mnemonic(mnemonic)?;
        self.store.save(&wallet)?;
        info!("created new wallet");
        Ok(wallet)
    }

    /// Loads the wallet, creating one from the configured
    /// [`MnemonicSource`] if the store is empty.
    pub fn load_wallet(&self) -> Result<Wallet> {
        if let Some(wallet) = self.store.load()? {
            return Ok(wallet);
        }

        match &self.mnemonics {
            Some(source) => {
                let mnemonic = source.generate()?;
                self.new_wallet(&mnemonic, false)
            }
            None => Err(Error::NotFound("wallet".into())),
        }
    }

    pub(crate) fn save_wallet(&self, wallet: &Wallet) -> Result<()> {
        self.store.save(wallet)
    }

    /// Recovers the plaintext mnemonic stored encrypted in the wallet.
    pub fn decrypt_mnemonic(&self) -> Result<String> {
        let wallet = self.load_wallet()?;
        let root = root_keypair(&wallet)?;
        decrypt_message(&root.public_key(), root.secret(), &wallet.seed.mnemonic)
    }

    /// Anchors the whole wallet, encrypted to the root key pair.
    ///
    /// # Returns
    /// DID of the backup asset (owned by the current identity)
    pub async fn backup_wallet(&self, registry: Option<&str>) -> Result<String> {
        let wallet = self.load_wallet()?;
        let root = root_keypair(&wallet)?;
        let plaintext = serde_json::to_string(&wallet)?;
        let backup = encrypt_message(&root.public_key(), root.secret(), &plaintext)?;

        let did = self
            .create_data(serde_json::to_value(VaultBackup { backup })?, registry)
            .await?;
        info!("backed up wallet to {}", did);
        Ok(did)
    }

    /// Replaces the local wallet with the backup anchored at `did`.
    ///
    /// The current wallet must share the backup's mnemonic, since the root
    /// key pair is what opens the vault.
    pub async fn recover_wallet(&self, did: &str) -> Result<Wallet> {
        let current = self.load_wallet()?;
        let root = root_keypair(&current)?;

        let data = self
            .resolve_asset(did)
            .await?
            .ok_or_else(|| Error::NotFound(format!("wallet backup {}", did)))?;
        let vault: VaultBackup = serde_json::from_value(data)
            .map_err(|_| Error::InvalidInput(format!("{} is not a wallet backup", did)))?;

        let plaintext = decrypt_message(&root.public_key(), root.secret(), &vault.backup)?;
        let wallet: Wallet = serde_json::from_str(&plaintext)?;

        self.save_wallet(&wallet)?;
        info!("recovered wallet from {}", did);
        Ok(wallet)
    }

    // ------------------------------------------------------------------
    // Signature engine
    // ------------------------------------------------------------------

    /// Resolves a DID, optionally as of a past instant.
    pub async fn resolve_did(&self, did: &str, asof: Option<DateTime<Utc>>) -> Result<DidResolution> {
        self.ledger.resolve_did(did, asof).await
    }

    /// Returns `value` with a `signature` block by the current identity.
    ///
    /// # Errors
    /// - [`Error::InvalidInput`] if `value` is not a JSON object
    /// - [`Error::NoCurrentIdentity`] if no identity is selected
    pub fn add_signature(&self, value: Value) -> Result<Value> {
        let wallet = self.load_wallet()?;
        sign_object(&wallet, value)
    }

    /// Checks the signature embedded in `value`.
    ///
    /// The canonical hash is recomputed first. If the signature records a
    /// different hash, the payload is rejected without touching the ledger.
    /// Otherwise the signer's key is
    /// resolved as of the signature's `created` time, which keeps documents
    /// signed before a key rotation verifiable.
    ///
    /// # Returns
    /// - `Ok(true)` if the signature is valid
    /// - `Ok(false)` if it is missing, malformed, or does not match
    /// - `Err` only if the ledger cannot be reached
    pub async fn verify_signature(&self, value: &Value) -> Result<bool> {
        let signature: Signature = match value.get(SIGNATURE_FIELD) {
            Some(sig) => match serde_json::from_value(sig.clone()) {
                Ok(sig) => sig,
                Err(_) => return Ok(false),
            },
            None => return Ok(false),
        };

        let hash = canonical_hash(value);
        if signature.hash.as_deref().map_or(false, |h| h != hash) {
            debug!("signature hash mismatch");
            return Ok(false);
        }

        let signer = match &signature.signer {
            Some(signer) => signer,
            None => return Ok(false),
        };

        let doc = self.ledger.resolve_did(signer, Some(signature.created)).await?;
        let key = match doc.did_document.public_key() {
            Ok(key) => key,
            Err(_) => return Ok(false),
        };

        Ok(verify_hash(&hash, &signature.value, &key))
    }
}

// ----------------------------------------------------------------------
// Key and signing helpers shared by the service modules
// ----------------------------------------------------------------------

/// Key pair of the wallet's HD root.
pub(crate) fn root_keypair(wallet: &Wallet) -> Result<KeyPair> {
    wallet.hdkey()?.keypair()
}

/// Key pair of `identity` at rotation `index`.
pub(crate) fn identity_keypair(wallet: &Wallet, identity: &Identity, index: u32) -> Result<KeyPair> {
    wallet
        .hdkey()?
        .derive_identity(identity.account, index)?
        .keypair()
}

/// Active key pair of the current identity.
pub(crate) fn current_keypair(wallet: &Wallet) -> Result<(Identity, KeyPair)> {
    let (_, identity) = wallet.current_identity()?;
    let keypair = identity_keypair(wallet, identity, identity.index)?;
    Ok((identity.clone(), keypair))
}

/// Signature block over `value` (its own `signature` member excluded).
pub(crate) fn sign_with(keypair: &KeyPair, signer: Option<&str>, value: &Value) -> Result<Signature> {
    let hash = canonical_hash(value);
    Ok(Signature {
        signer: signer.map(str::to_string),
        created: Utc::now(),
        value: keypair.sign_hash(&hash)?,
        hash: Some(hash),
    })
}

/// Adds a signature by the current identity to a JSON object.
pub(crate) fn sign_object(wallet: &Wallet, mut value: Value) -> Result<Value> {
    if !value.is_object() {
        return Err(Error::InvalidInput("only JSON objects can be signed".into()));
    }

    let (identity, keypair) = current_keypair(wallet)?;
    let signature = sign_with(&keypair, Some(&identity.did), &value)?;

    if let Value::Object(map) = &mut value {
        map.insert(SIGNATURE_FIELD.to_string(), serde_json::to_value(signature)?);
    }
    Ok(value)
}

/// Signs a ledger operation with the current identity's active key.
pub(crate) fn sign_operation(wallet: &Wallet, mut operation: Operation) -> Result<Operation> {
    let (identity, keypair) = current_keypair(wallet)?;
    let signature = sign_with(&keypair, Some(&identity.did), &operation.to_value()?)?;
    operation.signature = Some(signature);
    Ok(operation)
}

/// True for data that carries nothing worth anchoring.
pub(crate) fn is_empty_data(data: &Value) -> bool {
    match data {
        Value::Null => true,
        Value::String(s) => s.is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        _ => false,
    }
}
