// src/services/identity_manager.rs
//! Identity lifecycle.
//!
//! Each identity is an agent DID backed by its own HD account. The account
//! coordinate is handed out from the wallet counter at creation; the index
//! coordinate moves forward on every key rotation so earlier keys stay
//! derivable for decrypting old messages.

use crate::error::{Error, Result};
use crate::models::did::DidResolution;
use crate::models::operation::Operation;
use crate::models::wallet::Identity;
use crate::services::keymaster::{
    root_keypair, sign_operation, sign_with, VaultBackup, WalletService,
};
use crate::utils::crypto::{decrypt_message, encrypt_message};
use log::{info, warn};
use serde::{Deserialize, Serialize};

/// Plaintext of an identity vault.
#[derive(Serialize, Deserialize)]
struct IdentityBackup {
    name: String,
    id: Identity,
}

impl WalletService {
    /// Creates a new agent identity and makes it current.
    ///
    /// # Arguments
    /// * `name` - Local name, unique within the wallet
    /// * `registry` - Target registry, the service default when `None`
    ///
    /// # Returns
    /// The new agent DID
    ///
    /// # Errors
    /// - [`Error::DuplicateName`] if `name` is taken
    /// - ledger errors from submitting the create
    pub async fn create_identity(&self, name: &str, registry: Option<&str>) -> Result<String> {
        let mut wallet = self.load_wallet()?;

        if name.trim().is_empty() {
            return Err(Error::InvalidInput("identity name must not be blank".into()));
        }
        if wallet.ids.contains_key(name) {
            return Err(Error::DuplicateName(name.to_string()));
        }

        let account = wallet.counter;
        let keypair = wallet.hdkey()?.derive_identity(account, 0)?.keypair()?;

        let registry = self.registry_or_default(registry);
        let mut operation = Operation::create_agent(registry, keypair.public_jwk.clone());
        // self-certifying: the ledger checks it against the published key
        operation.signature = Some(sign_with(&keypair, None, &operation.to_value()?)?);

        let did = self.ledger.create_did(&operation).await?;

        wallet.ids.insert(name.to_string(), Identity::new(&did, account));
        wallet.counter += 1;
        wallet.current = name.to_string();
        self.save_wallet(&wallet)?;

        info!("created identity {} as {} on {}", name, did, registry);
        Ok(did)
    }

    /// Forgets an identity locally. Its DID stays live on the ledger.
    pub fn remove_identity(&self, name: &str) -> Result<()> {
        let mut wallet = self.load_wallet()?;

        if wallet.ids.remove(name).is_none() {
            return Err(Error::NotFound(format!("identity {}", name)));
        }
        if wallet.current == name {
            wallet.current.clear();
        }

        self.save_wallet(&wallet)
    }

    pub fn use_identity(&self, name: &str) -> Result<()> {
        let mut wallet = self.load_wallet()?;

        if !wallet.ids.contains_key(name) {
            return Err(Error::NotFound(format!("identity {}", name)));
        }
        wallet.current = name.to_string();

        self.save_wallet(&wallet)
    }

    /// Identity names in sorted order.
    pub fn list_identities(&self) -> Result<Vec<String>> {
        Ok(self.load_wallet()?.ids.keys().cloned().collect())
    }

    /// Name and record of the current identity.
    pub fn current_identity(&self) -> Result<(String, Identity)> {
        let wallet = self.load_wallet()?;
        let (name, identity) = wallet.current_identity()?;
        Ok((name.to_string(), identity.clone()))
    }

    /// Current identity's DID document as the ledger sees it now.
    pub async fn resolve_identity(&self) -> Result<DidResolution> {
        let (_, identity) = self.current_identity()?;
        self.resolve_did(&identity.did, None).await
    }

    /// Moves the current identity to its next key.
    ///
    /// The update carrying the new verification method is signed with the
    /// old key. The wallet only records the new index once the ledger has
    /// accepted it.
    ///
    /// # Returns
    /// The updated DID document
    ///
    /// # Errors
    /// - [`Error::NoCurrentIdentity`] if no identity is selected
    /// - [`Error::RotationFailed`] if the ledger declines or rejects the update
    /// - [`Error::LedgerUnavailable`] if the ledger cannot be reached
    pub async fn rotate_keys(&self) -> Result<DidResolution> {
        let mut wallet = self.load_wallet()?;
        let identity = wallet.current_identity()?.1.clone();

        let next = identity.index + 1;
        let keypair = wallet.hdkey()?.derive_identity(identity.account, next)?.keypair()?;

        let mut doc = self.resolve_did(&identity.did, None).await?;
        let method = doc
            .did_document
            .verification_method
            .first_mut()
            .ok_or_else(|| Error::NotFound(format!("verification method of {}", identity.did)))?;
        method.id = format!("#key-{}", next + 1);
        method.public_key_jwk = keypair.public_jwk.clone();
        doc.did_document.authentication = vec![method.id.clone()];

        let operation = sign_operation(&wallet, Operation::update(&identity.did, doc.clone()))?;
        match self.ledger.update_did(&operation).await {
            Ok(true) => {}
            Ok(false) => {
                warn!("ledger declined key rotation for {}", identity.did);
                return Err(Error::RotationFailed { did: identity.did });
            }
            Err(Error::RejectedTransaction(reason)) => {
                warn!("ledger rejected key rotation for {}: {}", identity.did, reason);
                return Err(Error::RotationFailed { did: identity.did });
            }
            Err(e) => return Err(e),
        }

        wallet.current_identity_mut()?.index = next;
        self.save_wallet(&wallet)?;

        info!("rotated keys of {} to index {}", identity.did, next);
        Ok(doc)
    }

    /// Anchors the current identity record in a vault and links the vault
    /// from the identity's DID document.
    ///
    /// # Returns
    /// The ledger's verdict on the linking update
    pub async fn backup_identity(&self) -> Result<bool> {
        let wallet = self.load_wallet()?;
        let (name, identity) = wallet.current_identity()?;
        let did = identity.did.clone();
        let backup = IdentityBackup {
            name: name.to_string(),
            id: identity.clone(),
        };

        let root = root_keypair(&wallet)?;
        let plaintext = serde_json::to_string(&backup)?;
        let backup = VaultBackup {
            backup: encrypt_message(&root.public_key(), root.secret(), &plaintext)?,
        };

        let mut doc = self.resolve_did(&did, None).await?;
        let registry = doc.did_document_metadata.mdip.registry.clone();

        let vault = self
            .create_data(serde_json::to_value(backup)?, Some(&registry))
            .await?;
        doc.did_document_metadata.vault = Some(vault.clone());

        let operation = sign_operation(&wallet, Operation::update(&did, doc))?;
        let accepted = self.ledger.update_did(&operation).await?;

        info!("backed up identity {} to vault {}", did, vault);
        Ok(accepted)
    }

    /// Reinstates an identity from the vault linked in `did`'s document.
    ///
    /// # Returns
    /// The recovered identity name, now current
    ///
    /// # Errors
    /// - [`Error::NotFound`] if the document links no vault
    /// - [`Error::DuplicateName`] if the wallet already has that name
    /// - [`Error::CryptoFailure`] if the vault belongs to another wallet
    pub async fn recover_identity(&self, did: &str) -> Result<String> {
        let mut wallet = self.load_wallet()?;
        let root = root_keypair(&wallet)?;

        let doc = self.resolve_did(did, None).await?;
        let vault = doc
            .did_document_metadata
            .vault
            .ok_or_else(|| Error::NotFound(format!("vault of {}", did)))?;

        let data = self
            .resolve_asset(&vault)
            .await?
            .ok_or_else(|| Error::NotFound(format!("vault {}", vault)))?;
        let vault_data: VaultBackup = serde_json::from_value(data)
            .map_err(|_| Error::InvalidInput(format!("{} is not an identity vault", vault)))?;

        let plaintext = decrypt_message(&root.public_key(), root.secret(), &vault_data.backup)?;
        let IdentityBackup { name, id } = serde_json::from_str(&plaintext)?;

        if wallet.ids.contains_key(&name) {
            return Err(Error::DuplicateName(name));
        }

        wallet.counter = wallet.counter.max(id.account + 1);
        wallet.ids.insert(name.clone(), id);
        wallet.current = name.clone();
        self.save_wallet(&wallet)?;

        info!("recovered identity {} from {}", name, vault);
        Ok(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::memory_ledger::MemoryLedger;
    use crate::ledger::Ledger;
    use crate::storage::wallet_store::MemoryStore;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::Arc;

    const MNEMONIC: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    fn service_on(ledger: Arc<dyn Ledger>) -> WalletService {
        let service = WalletService::new(ledger, Arc::new(MemoryStore::new()));
        service.new_wallet(MNEMONIC, false).unwrap();
        service
    }

    fn service() -> WalletService {
        service_on(Arc::new(MemoryLedger::new()))
    }

    /// How a [`DecliningLedger`] turns down updates.
    #[derive(Clone, Copy)]
    enum Refusal {
        Declined,
        Rejected,
        Unreachable,
    }

    /// Accepts everything except updates.
    struct DecliningLedger(MemoryLedger, Refusal);

    #[async_trait]
    impl Ledger for DecliningLedger {
        async fn create_did(&self, operation: &Operation) -> Result<String> {
            self.0.create_did(operation).await
        }

        async fn resolve_did(&self, did: &str, asof: Option<DateTime<Utc>>) -> Result<DidResolution> {
            self.0.resolve_did(did, asof).await
        }

        async fn update_did(&self, _operation: &Operation) -> Result<bool> {
            match self.1 {
                Refusal::Declined => Ok(false),
                Refusal::Rejected => Err(Error::RejectedTransaction(
                    "500 Internal Server Error: Invalid signature".into(),
                )),
                Refusal::Unreachable => Err(Error::LedgerUnavailable("connection refused".into())),
            }
        }

        async fn delete_did(&self, operation: &Operation) -> Result<bool> {
            self.0.delete_did(operation).await
        }
    }

    #[tokio::test]
    async fn test_create_identity_assigns_accounts() {
        let service = service();
        let alice = service.create_identity("alice", None).await.unwrap();
        let bob = service.create_identity("bob", Some("local")).await.unwrap();
        assert_ne!(alice, bob);

        let wallet = service.load_wallet().unwrap();
        assert_eq!(wallet.counter, 2);
        assert_eq!(wallet.ids["alice"].account, 0);
        assert_eq!(wallet.ids["bob"].account, 1);
        assert_eq!(wallet.current, "bob");

        let doc = service.resolve_identity().await.unwrap();
        assert_eq!(doc.did_document.id, bob);
        assert_eq!(doc.did_document_metadata.mdip.registry, "local");
    }

    #[tokio::test]
    async fn test_duplicate_name_is_rejected() {
        let service = service();
        service.create_identity("alice", None).await.unwrap();
        assert!(matches!(
            service.create_identity("alice", None).await,
            Err(Error::DuplicateName(_))
        ));
        assert_eq!(service.load_wallet().unwrap().counter, 1);
    }

    #[tokio::test]
    async fn test_remove_and_use_identity() {
        let service = service();
        service.create_identity("alice", None).await.unwrap();
        service.create_identity("bob", None).await.unwrap();

        service.use_identity("alice").unwrap();
        assert_eq!(service.current_identity().unwrap().0, "alice");

        service.remove_identity("alice").unwrap();
        assert!(matches!(service.current_identity(), Err(Error::NoCurrentIdentity)));
        assert_eq!(service.list_identities().unwrap(), vec!["bob".to_string()]);

        assert!(matches!(service.use_identity("alice"), Err(Error::NotFound(_))));
        assert!(matches!(service.remove_identity("alice"), Err(Error::NotFound(_))));

        // counter is never reused
        service.create_identity("carol", None).await.unwrap();
        assert_eq!(service.current_identity().unwrap().1.account, 2);
    }

    #[tokio::test]
    async fn test_rotate_keys_updates_document() {
        let service = service();
        service.create_identity("alice", None).await.unwrap();
        let before = service.resolve_identity().await.unwrap();

        let doc = service.rotate_keys().await.unwrap();
        assert_eq!(doc.did_document.authentication, vec!["#key-2".to_string()]);
        assert_ne!(
            doc.did_document.verification_method[0].public_key_jwk,
            before.did_document.verification_method[0].public_key_jwk
        );

        let after = service.resolve_identity().await.unwrap();
        assert_eq!(after.did_document, doc.did_document);
        assert_eq!(service.current_identity().unwrap().1.index, 1);

        // a second rotation is signed by the key from the first
        tokio_test::assert_ok!(service.rotate_keys().await);
        assert_eq!(service.current_identity().unwrap().1.index, 2);
    }

    #[tokio::test]
    async fn test_declined_rotation_keeps_index() {
        for refusal in [Refusal::Declined, Refusal::Rejected] {
            let service = service_on(Arc::new(DecliningLedger(MemoryLedger::new(), refusal)));
            service.create_identity("alice", None).await.unwrap();

            assert!(matches!(
                service.rotate_keys().await,
                Err(Error::RotationFailed { .. })
            ));
            assert_eq!(service.current_identity().unwrap().1.index, 0);
        }
    }

    #[tokio::test]
    async fn test_unreachable_ledger_is_not_a_failed_rotation() {
        let ledger = DecliningLedger(MemoryLedger::new(), Refusal::Unreachable);
        let service = service_on(Arc::new(ledger));
        service.create_identity("alice", None).await.unwrap();

        assert!(matches!(
            service.rotate_keys().await,
            Err(Error::LedgerUnavailable(_))
        ));
        assert_eq!(service.current_identity().unwrap().1.index, 0);
    }

    #[tokio::test]
    async fn test_rotate_requires_identity() {
        assert!(matches!(
            service().rotate_keys().await,
            Err(Error::NoCurrentIdentity)
        ));
    }

    #[tokio::test]
    async fn test_backup_and_recover_identity() {
        let ledger = Arc::new(MemoryLedger::new());
        let service = service_on(ledger.clone());
        let did = service.create_identity("alice", None).await.unwrap();

        assert!(service.backup_identity().await.unwrap());
        let vault = service
            .resolve_identity()
            .await
            .unwrap()
            .did_document_metadata
            .vault;
        assert!(vault.is_some());

        assert!(matches!(
            service.recover_identity(&did).await,
            Err(Error::DuplicateName(_))
        ));

        // same mnemonic, fresh local state
        let restored = service_on(ledger);
        assert_eq!(restored.recover_identity(&did).await.unwrap(), "alice");

        let (name, identity) = restored.current_identity().unwrap();
        assert_eq!(name, "alice");
        assert_eq!(identity.did, did);
        assert_eq!(restored.load_wallet().unwrap().counter, 1);
    }

    #[tokio::test]
    async fn test_recover_without_vault() {
        let service = service();
        let did = service.create_identity("alice", None).await.unwrap();
        assert!(matches!(
            service.recover_identity(&did).await,
            Err(Error::NotFound(_))
        ));
    }
}
