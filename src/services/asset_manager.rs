// src/services/asset_manager.rs
//! Data assets: arbitrary JSON anchored on the ledger under its own DID and
//! controlled by the identity that created it.

use crate::error::{Error, Result};
use crate::models::operation::Operation;
use crate::services::keymaster::{is_empty_data, sign_operation, WalletService};
use log::info;
use serde_json::Value;

impl WalletService {
    /// Anchors `data` as an asset controlled by the current identity.
    ///
    /// # Arguments
    /// * `data` - Any non-empty JSON value
    /// * `registry` - Target registry, the service default when `None`
    ///
    /// # Returns
    /// The new asset DID, also recorded in the identity's owned set
    ///
    /// # Errors
    /// - [`Error::InvalidInput`] for `null`, `""`, `[]` or `{}`
    /// - [`Error::NoCurrentIdentity`] if no identity is selected
    pub async fn create_data(&self, data: Value, registry: Option<&str>) -> Result<String> {
        if is_empty_data(&data) {
            return Err(Error::InvalidInput("data must not be empty".into()));
        }

        let mut wallet = self.load_wallet()?;
        let controller = wallet.current_identity()?.1.did.clone();

        let registry = self.registry_or_default(registry);
        let operation = Operation::create_asset(registry, &controller, data);
        let signed = sign_operation(&wallet, operation)?;

        let did = self.ledger.create_did(&signed).await?;

        wallet.current_identity_mut()?.owned.insert(&did);
        self.save_wallet(&wallet)?;

        info!("created asset {} on {}", did, registry);
        Ok(did)
    }

    /// Data of the asset at `did`, or `None` once it has been deleted.
    pub async fn resolve_asset(&self, did: &str) -> Result<Option<Value>> {
        let doc = self.resolve_did(did, None).await?;
        Ok(doc.asset_data().cloned())
    }

    /// Assets created by the current identity, oldest first.
    pub fn list_owned(&self) -> Result<Vec<String>> {
        let wallet = self.load_wallet()?;
        let (_, identity) = wallet.current_identity()?;
        Ok(identity.owned.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::memory_ledger::MemoryLedger;
    use crate::storage::wallet_store::MemoryStore;
    use serde_json::json;
    use std::sync::Arc;

    const MNEMONIC: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    async fn service_with_identity() -> WalletService {
        let service =
            WalletService::new(Arc::new(MemoryLedger::new()), Arc::new(MemoryStore::new()));
        service.new_wallet(MNEMONIC, false).unwrap();
        service.create_identity("alice", None).await.unwrap();
        service
    }

    #[tokio::test]
    async fn test_create_and_resolve_asset() {
        let service = service_with_identity().await;
        let did = service
            .create_data(json!({"name": "schema"}), Some("local"))
            .await
            .unwrap();

        assert_eq!(
            service.resolve_asset(&did).await.unwrap(),
            Some(json!({"name": "schema"}))
        );
        assert_eq!(service.list_owned().unwrap(), vec![did.clone()]);

        let doc = service.resolve_did(&did, None).await.unwrap();
        assert_eq!(doc.did_document_metadata.mdip.registry, "local");
        assert_eq!(
            doc.did_document.controller.as_deref(),
            Some(service.current_identity().unwrap().1.did.as_str())
        );
    }

    #[tokio::test]
    async fn test_empty_data_is_rejected() {
        let service = service_with_identity().await;
        for empty in [json!({}), json!([]), json!(null)] {
            assert!(matches!(
                service.create_data(empty, None).await,
                Err(Error::InvalidInput(_))
            ));
        }
        assert!(service.list_owned().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_create_data_requires_identity() {
        let service =
            WalletService::new(Arc::new(MemoryLedger::new()), Arc::new(MemoryStore::new()));
        service.new_wallet(MNEMONIC, false).unwrap();

        assert!(matches!(
            service.create_data(json!({"x": 1}), None).await,
            Err(Error::NoCurrentIdentity)
        ));
    }
}
