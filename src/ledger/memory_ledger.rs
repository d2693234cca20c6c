// src/ledger/memory_ledger.rs
//! In-process DID ledger.
//!
//! Keeps every accepted operation per DID in arrival order and rebuilds
//! documents by replaying them, which gives point-in-time (`asof`)
//! resolution for free. Operations are validated the way the gatekeeper
//! does before they are appended:
//! - create agent: signed by the key it publishes
//! - create asset: signed by its controller's current key
//! - update/delete: signed by the controlling agent's current key
//!
//! Used by tests and by embedders that do not need a networked ledger.

use crate::error::{Error, Result};
use crate::ledger::Ledger;
use crate::models::did::{
    DidDocument, DidResolution, DidType, DocumentMetadata, VerificationMethod, DID_CONTEXT,
    DID_RESOLUTION_CONTEXT, MDIP_VERSION, VERIFICATION_METHOD_TYPE,
};
use crate::models::operation::{Operation, OperationType};
use crate::utils::serialization::canonical_hash;
use crate::wallet::key_management::verify_hash;
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use k256::PublicKey;
use log::debug;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Registries accepted when none are configured.
pub const DEFAULT_REGISTRIES: [&str; 5] = ["local", "hyperswarm", "peerbit", "BTC", "tBTC"];

pub const DID_PREFIX: &str = "did:mdip:";

/// An accepted operation with its arrival time.
#[derive(Debug, Clone)]
struct Event {
    received: DateTime<Utc>,
    operation: Operation,
}

#[derive(Default)]
struct LedgerState {
    dids: HashMap<String, Vec<Event>>,
    /// Creation order, for listing
    order: Vec<String>,
    last_received: Option<DateTime<Utc>>,
}

impl LedgerState {
    /// Arrival timestamp, strictly increasing across all operations.
    fn next_timestamp(&mut self) -> DateTime<Utc> {
        let now = Utc::now();
        let stamp = match self.last_received {
            Some(last) if now <= last => last + Duration::nanoseconds(1),
            _ => now,
        };
        self.last_received = Some(stamp);
        stamp
    }

    fn resolve(&self, did: &str, asof: Option<DateTime<Utc>>) -> Result<DidResolution> {
        let events = self
            .dids
            .get(did)
            .ok_or_else(|| Error::NotFound(did.to_string()))?;
        replay(did, events, asof)
    }

    /// Current key of a live agent.
    fn agent_key(&self, did: &str) -> Result<PublicKey> {
        let doc = self.resolve(did, None)?;
        if doc.is_deactivated() {
            return Err(Error::RejectedTransaction(format!("{} is deactivated", did)));
        }
        doc.did_document.public_key()
    }
}

/// In-memory [`Ledger`] implementation.
pub struct MemoryLedger {
    registries: Vec<String>,
    state: Mutex<LedgerState>,
}

impl MemoryLedger {
    /// Creates an empty ledger accepting [`DEFAULT_REGISTRIES`].
    pub fn new() -> Self {
        MemoryLedger::with_registries(&DEFAULT_REGISTRIES)
    }

    pub fn with_registries(registries: &[&str]) -> Self {
        MemoryLedger {
            registries: registries.iter().map(|r| r.to_string()).collect(),
            state: Mutex::new(LedgerState::default()),
        }
    }

    pub fn registries(&self) -> &[String] {
        &self.registries
    }

    /// All DIDs in creation order.
    pub fn list_dids(&self) -> Vec<String> {
        self.lock().order.clone()
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Checks the DID an update or delete targets and returns the agent
    /// allowed to sign for it.
    fn authorized_signer(state: &LedgerState, operation: &Operation) -> Result<(String, String)> {
        let did = operation
            .did
            .clone()
            .ok_or_else(|| Error::RejectedTransaction("operation has no DID".into()))?;
        let current = state.resolve(&did, None)?;

        if current.is_deactivated() {
            return Err(Error::RejectedTransaction(format!("{} is deactivated", did)));
        }

        let signer = match current.did_document_metadata.mdip.did_type {
            DidType::Agent => did.clone(),
            DidType::Asset => current
                .did_document
                .controller
                .clone()
                .ok_or_else(|| Error::RejectedTransaction(format!("{} has no controller", did)))?,
        };

        Ok((did, signer))
    }

    /// Shared body of update and delete: validation, then append.
    fn append_signed(&self, operation: &Operation, expected: OperationType) -> Result<bool> {
        if operation.op != expected {
            return Err(Error::RejectedTransaction(format!(
                "expected {:?} operation, got {:?}",
                expected, operation.op
            )));
        }

        let mut state = self.lock();
        let (did, signer) = Self::authorized_signer(&state, operation)?;

        let declared = operation.signature.as_ref().and_then(|s| s.signer.as_deref());
        if declared != Some(signer.as_str()) {
            debug!("{:?} on {} declined: not signed by controller {}", expected, did, signer);
            return Ok(false);
        }

        let key = state.agent_key(&signer)?;
        if !signature_is_valid(operation, &key)? {
            debug!("{:?} on {} declined: bad signature", expected, did);
            return Ok(false);
        }

        if expected == OperationType::Update && operation.doc.is_none() {
            return Ok(false);
        }

        let received = state.next_timestamp();
        if let Some(events) = state.dids.get_mut(&did) {
            events.push(Event {
                received,
                operation: operation.clone(),
            });
        }

        Ok(true)
    }
}

impl Default for MemoryLedger {
    fn default() -> Self {
        MemoryLedger::new()
    }
}

#[async_trait]
impl Ledger for MemoryLedger {
    async fn create_did(&self, operation: &Operation) -> Result<String> {
        if operation.op != OperationType::Create {
            return Err(Error::RejectedTransaction("not a create operation".into()));
        }

        let mdip = operation
            .mdip
            .as_ref()
            .ok_or_else(|| Error::RejectedTransaction("missing mdip block".into()))?;

        if mdip.version != MDIP_VERSION {
            return Err(Error::RejectedTransaction(format!("unsupported version {}", mdip.version)));
        }

        if !self.registries.contains(&mdip.registry) {
            return Err(Error::RejectedTransaction(format!("unknown registry {}", mdip.registry)));
        }

        let signature = operation
            .signature
            .as_ref()
            .ok_or_else(|| Error::RejectedTransaction("operation is unsigned".into()))?;

        let mut state = self.lock();

        let key = match mdip.did_type {
            DidType::Agent => operation
                .public_jwk
                .as_ref()
                .ok_or_else(|| Error::RejectedTransaction("agent create has no key".into()))?
                .to_public_key()?,
            DidType::Asset => {
                let controller = operation
                    .controller
                    .as_deref()
                    .ok_or_else(|| Error::RejectedTransaction("asset has no controller".into()))?;

                if operation.data.is_none() {
                    return Err(Error::RejectedTransaction("asset has no data".into()));
                }

                if signature.signer.as_deref() != Some(controller) {
                    return Err(Error::RejectedTransaction(
                        "asset must be signed by its controller".into(),
                    ));
                }

                state.agent_key(controller)?
            }
        };

        if !signature_is_valid(operation, &key)? {
            return Err(Error::RejectedTransaction("invalid signature".into()));
        }

        let did = format!("{}{}", DID_PREFIX, canonical_hash_with_signature(operation)?);
        if state.dids.contains_key(&did) {
            return Err(Error::RejectedTransaction(format!("{} already exists", did)));
        }

        let received = state.next_timestamp();
        state.dids.insert(
            did.clone(),
            vec![Event {
                received,
                operation: operation.clone(),
            }],
        );
        state.order.push(did.clone());

        debug!("created {} on {}", did, mdip.registry);
        Ok(did)
    }

    async fn resolve_did(&self, did: &str, asof: Option<DateTime<Utc>>) -> Result<DidResolution> {
        self.lock().resolve(did, asof)
    }

    async fn update_did(&self, operation: &Operation) -> Result<bool> {
        self.append_signed(operation, OperationType::Update)
    }

    async fn delete_did(&self, operation: &Operation) -> Result<bool> {
        self.append_signed(operation, OperationType::Delete)
    }
}

fn signature_is_valid(operation: &Operation, key: &PublicKey) -> Result<bool> {
    let signature = match &operation.signature {
        Some(sig) => sig,
        None => return Ok(false),
    };

    let hash = canonical_hash(&operation.to_value()?);
    let hash_matches = signature.hash.as_deref().map_or(true, |h| h == hash);
    Ok(hash_matches && verify_hash(&hash, &signature.value, key))
}

/// Content address of a create operation, signature included.
fn canonical_hash_with_signature(operation: &Operation) -> Result<String> {
    let value = serde_json::json!({ "operation": operation.to_value()? });
    Ok(canonical_hash(&value))
}

/// Rebuilds a document from its operations received up to `asof`.
fn replay(did: &str, events: &[Event], asof: Option<DateTime<Utc>>) -> Result<DidResolution> {
    let mut visible = events
        .iter()
        .filter(|event| asof.map_or(true, |t| event.received <= t));

    let genesis = visible
        .next()
        .ok_or_else(|| Error::NotFound(format!("{} as of {:?}", did, asof)))?;
    let mut doc = genesis_document(did, genesis)?;

    for event in visible {
        let meta = &mut doc.did_document_metadata;
        meta.updated = Some(event.received);

        match event.operation.op {
            OperationType::Update => {
                if let Some(update) = &event.operation.doc {
                    doc.did_document = update.did_document.clone();
                    doc.did_document.id = did.to_string();
                    let meta = &mut doc.did_document_metadata;
                    meta.vault = update.did_document_metadata.vault.clone();
                    if update.did_document_metadata.data.is_some() {
                        meta.data = update.did_document_metadata.data.clone();
                    }
                }
            }
            OperationType::Delete => {
                meta.deactivated = true;
                meta.data = None;
                doc.did_document.verification_method.clear();
                doc.did_document.authentication.clear();
            }
            OperationType::Create => {}
        }
    }

    Ok(doc)
}

fn genesis_document(did: &str, event: &Event) -> Result<DidResolution> {
    let operation = &event.operation;
    let mdip = operation
        .mdip
        .clone()
        .ok_or_else(|| Error::NotFound(format!("genesis of {}", did)))?;

    let mut document = DidDocument {
        context: vec![DID_CONTEXT.to_string()],
        id: did.to_string(),
        ..DidDocument::default()
    };
    let mut data = None;

    match mdip.did_type {
        DidType::Agent => {
            if let Some(jwk) = &operation.public_jwk {
                document.verification_method.push(VerificationMethod {
                    id: "#key-1".to_string(),
                    controller: did.to_string(),
                    method_type: VERIFICATION_METHOD_TYPE.to_string(),
                    public_key_jwk: jwk.clone(),
                });
                document.authentication.push("#key-1".to_string());
            }
        }
        DidType::Asset => {
            document.controller = operation.controller.clone();
            data = operation.data.clone();
        }
    }

    Ok(DidResolution {
        context: DID_RESOLUTION_CONTEXT.to_string(),
        did_document: document,
        did_document_metadata: DocumentMetadata {
            created: event.received,
            updated: None,
            deactivated: false,
            mdip,
            data,
            vault: None,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::operation::Signature;
    use crate::wallet::key_management::{derive, KeyPair};
    use serde_json::json;

    const SEED: [u8; 16] = [7u8; 16];

    fn sign(mut operation: Operation, signer: Option<&str>, keypair: &KeyPair) -> Operation {
        let hash = canonical_hash(&operation.to_value().unwrap());
        operation.signature = Some(Signature {
            signer: signer.map(str::to_string),
            created: Utc::now(),
            value: keypair.sign_hash(&hash).unwrap(),
            hash: Some(hash),
        });
        operation
    }

    async fn create_agent(ledger: &MemoryLedger, keypair: &KeyPair) -> String {
        let op = Operation::create_agent("local", keypair.public_jwk.clone());
        ledger.create_did(&sign(op, None, keypair)).await.unwrap()
    }

    #[tokio::test]
    async fn test_agent_create_and_resolve() {
        let ledger = MemoryLedger::new();
        let keypair = derive(&SEED, 0, 0).unwrap();
        let did = create_agent(&ledger, &keypair).await;

        assert!(did.starts_with(DID_PREFIX));
        let doc = ledger.resolve_did(&did, None).await.unwrap();
        assert_eq!(doc.did_document.verification_method[0].public_key_jwk, keypair.public_jwk);
        assert_eq!(doc.did_document_metadata.mdip.did_type, DidType::Agent);
        assert_eq!(ledger.list_dids(), vec![did]);
    }

    #[tokio::test]
    async fn test_unsigned_and_forged_creates_are_rejected() {
        let ledger = MemoryLedger::new();
        let keypair = derive(&SEED, 0, 0).unwrap();
        let other = derive(&SEED, 1, 0).unwrap();

        let unsigned = Operation::create_agent("local", keypair.public_jwk.clone());
        assert!(matches!(
            ledger.create_did(&unsigned).await,
            Err(Error::RejectedTransaction(_))
        ));

        let forged = sign(unsigned, None, &other);
        assert!(matches!(
            ledger.create_did(&forged).await,
            Err(Error::RejectedTransaction(_))
        ));
    }

    #[tokio::test]
    async fn test_unknown_registry_is_rejected() {
        let ledger = MemoryLedger::with_registries(&["local"]);
        let keypair = derive(&SEED, 0, 0).unwrap();
        let op = sign(Operation::create_agent("BTC", keypair.public_jwk.clone()), None, &keypair);
        assert!(matches!(ledger.create_did(&op).await, Err(Error::RejectedTransaction(_))));
    }

    #[tokio::test]
    async fn test_asof_resolution_sees_old_key() {
        let ledger = MemoryLedger::new();
        let key0 = derive(&SEED, 0, 0).unwrap();
        let key1 = derive(&SEED, 0, 1).unwrap();
        let did = create_agent(&ledger, &key0).await;

        let before_rotation = Utc::now();

        let mut doc = ledger.resolve_did(&did, None).await.unwrap();
        doc.did_document.verification_method[0].public_key_jwk = key1.public_jwk.clone();
        let update = sign(Operation::update(&did, doc), Some(&did), &key0);
        assert!(ledger.update_did(&update).await.unwrap());

        let now = ledger.resolve_did(&did, None).await.unwrap();
        let then = ledger.resolve_did(&did, Some(before_rotation)).await.unwrap();
        assert_eq!(now.did_document.public_key().unwrap(), key1.public_key());
        assert_eq!(then.did_document.public_key().unwrap(), key0.public_key());
        assert!(now.did_document_metadata.updated.is_some());
    }

    #[tokio::test]
    async fn test_update_signed_by_wrong_key_is_declined() {
        let ledger = MemoryLedger::new();
        let key0 = derive(&SEED, 0, 0).unwrap();
        let stranger = derive(&SEED, 5, 0).unwrap();
        let did = create_agent(&ledger, &key0).await;

        let doc = ledger.resolve_did(&did, None).await.unwrap();
        let update = sign(Operation::update(&did, doc), Some(&did), &stranger);
        assert!(!ledger.update_did(&update).await.unwrap());
    }

    #[tokio::test]
    async fn test_asset_lifecycle() {
        let ledger = MemoryLedger::new();
        let key = derive(&SEED, 0, 0).unwrap();
        let owner = create_agent(&ledger, &key).await;

        let create = sign(
            Operation::create_asset("local", &owner, json!({"x": 1})),
            Some(&owner),
            &key,
        );
        let asset = ledger.create_did(&create).await.unwrap();
        let doc = ledger.resolve_did(&asset, None).await.unwrap();
        assert_eq!(doc.asset_data(), Some(&json!({"x": 1})));

        let delete = sign(Operation::delete(&asset), Some(&owner), &key);
        assert!(ledger.delete_did(&delete).await.unwrap());

        let doc = ledger.resolve_did(&asset, None).await.unwrap();
        assert!(doc.is_deactivated());
        assert!(doc.asset_data().is_none());

        // a deactivated DID cannot be deleted again
        let again = sign(Operation::delete(&asset), Some(&owner), &key);
        assert!(matches!(ledger.delete_did(&again).await, Err(Error::RejectedTransaction(_))));
    }

    #[tokio::test]
    async fn test_resolve_unknown_did() {
        let ledger = MemoryLedger::new();
        let result = ledger.resolve_did("did:mdip:missing", None).await;
        assert!(matches!(result, Err(Error::NotFound(_))));
    }
}
