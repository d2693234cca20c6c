// src/models/operation.rs
//! Ledger transactions and the signature block attached to signed objects.
//!
//! An [`Operation`] is the only thing the keymaster ever submits to the
//! ledger. Once its [`Signature`] is attached it must not be modified: the
//! signature covers the canonical hash of every other field.

use crate::error::Result;
use crate::models::did::{DidResolution, DidType, Mdip, PublicJwk};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Signature block embedded in signed objects under the `signature` key.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Signature {
    /// DID of the signer; absent only on the self-certifying create of an agent
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signer: Option<String>,

    /// When the signature was made; verification resolves the signer's key as of this time
    pub created: DateTime<Utc>,

    /// Hex SHA-256 of the canonical form of the signed object
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,

    /// Hex compact ECDSA signature over `hash`
    pub value: String,
}

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    Create,
    Update,
    Delete,
}

/// A DID transaction.
///
/// Field presence depends on the operation:
/// - create agent: `mdip` + `public_jwk`
/// - create asset: `mdip` + `controller` + `data`
/// - update: `did` + `doc`
/// - delete: `did`
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Operation {
    pub op: OperationType,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub did: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mdip: Option<Mdip>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_jwk: Option<PublicJwk>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc: Option<DidResolution>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
}

impl Operation {
    fn empty(op: OperationType) -> Self {
        Operation {
            op,
            did: None,
            mdip: None,
            public_jwk: None,
            controller: None,
            data: None,
            doc: None,
            signature: None,
        }
    }

    /// Unsigned create of a new agent identity.
    pub fn create_agent(registry: &str, public_jwk: PublicJwk) -> Self {
        Operation {
            mdip: Some(Mdip::new(DidType::Agent, registry)),
            public_jwk: Some(public_jwk),
            ..Operation::empty(OperationType::Create)
        }
    }

    /// Unsigned create of an asset controlled by `controller`.
    pub fn create_asset(registry: &str, controller: &str, data: Value) -> Self {
        Operation {
            mdip: Some(Mdip::new(DidType::Asset, registry)),
            controller: Some(controller.to_string()),
            data: Some(data),
            ..Operation::empty(OperationType::Create)
        }
    }

    /// Unsigned replacement of a DID document.
    pub fn update(did: &str, doc: DidResolution) -> Self {
        Operation {
            did: Some(did.to_string()),
            doc: Some(doc),
            ..Operation::empty(OperationType::Update)
        }
    }

    /// Unsigned deactivation of a DID.
    pub fn delete(did: &str) -> Self {
        Operation {
            did: Some(did.to_string()),
            ..Operation::empty(OperationType::Delete)
        }
    }

    /// JSON value of the operation, the form that is hashed and signed.
    pub fn to_value(&self) -> Result<Value> {
        Ok(serde_json::to_value(self)?)
    }
}
