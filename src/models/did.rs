// src/models/did.rs
//! DID resolution data model.
//!
//! A resolved DID is returned by the ledger as a resolution envelope with
//! three parts, following the [DID Core Specification](https://www.w3.org/TR/did-core/):
//! - `didDocument`: keys and controller of the DID
//! - `didDocumentMetadata`: ledger bookkeeping, anchored asset data and the
//!   vault reference used for identity recovery
//!
//! Agents (identities) carry a verification method with a secp256k1 public
//! key. Assets carry a controller DID and their data in the metadata.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::PublicKey;
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const DID_RESOLUTION_CONTEXT: &str = "https://w3id.org/did-resolution/v1";
pub const DID_CONTEXT: &str = "https://www.w3.org/ns/did/v1";
pub const VERIFICATION_METHOD_TYPE: &str = "EcdsaSecp256k1VerificationKey2019";

/// Protocol version written into every create operation.
pub const MDIP_VERSION: u32 = 1;

/// Kind of DID being created.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DidType {
    /// An identity with its own keys
    Agent,
    /// Data controlled by an agent
    Asset,
}

/// Registration parameters of a DID.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Mdip {
    pub version: u32,
    #[serde(rename = "type")]
    pub did_type: DidType,
    /// Registry the DID is anchored on (e.g. "peerbit", "BTC")
    pub registry: String,
}

impl Mdip {
    pub fn new(did_type: DidType, registry: &str) -> Self {
        Mdip {
            version: MDIP_VERSION,
            did_type,
            registry: registry.to_string(),
        }
    }
}

/// secp256k1 public key in JWK form.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
pub struct PublicJwk {
    pub kty: String,
    pub crv: String,
    /// base64url affine x coordinate
    pub x: String,
    /// base64url affine y coordinate
    pub y: String,
}

impl PublicJwk {
    pub fn from_public_key(key: &PublicKey) -> Self {
        let point = key.to_encoded_point(false);
        let encode = |bytes: Option<&k256::FieldBytes>| {
            bytes
                .map(|b| base64::encode_config(b, base64::URL_SAFE_NO_PAD))
                .unwrap_or_default()
        };

        PublicJwk {
            kty: "EC".to_string(),
            crv: "secp256k1".to_string(),
            x: encode(point.x()),
            y: encode(point.y()),
        }
    }

    /// Parses the JWK back into a curve point.
    ///
    /// # Errors
    /// [`Error::CryptoFailure`] if the coordinates are not a point on secp256k1.
    pub fn to_public_key(&self) -> Result<PublicKey> {
        if self.kty != "EC" || self.crv != "secp256k1" {
            return Err(Error::CryptoFailure(format!(
                "unsupported key type {}/{}",
                self.kty, self.crv
            )));
        }

        let decode = |coord: &str| {
            base64::decode_config(coord, base64::URL_SAFE_NO_PAD)
                .map_err(|e| Error::CryptoFailure(format!("bad JWK coordinate: {}", e)))
        };

        let mut sec1 = vec![0x04];
        sec1.extend(decode(&self.x)?);
        sec1.extend(decode(&self.y)?);

        PublicKey::from_sec1_bytes(&sec1)
            .map_err(|_| Error::CryptoFailure("JWK is not a secp256k1 point".into()))
    }
}

/// A key published in a DID document.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerificationMethod {
    /// Fragment identifier, e.g. "#key-1"
    pub id: String,
    pub controller: String,
    #[serde(rename = "type")]
    pub method_type: String,
    pub public_key_jwk: PublicJwk,
}

/// The DID document proper.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct DidDocument {
    #[serde(rename = "@context", default, skip_serializing_if = "Vec::is_empty")]
    pub context: Vec<String>,

    pub id: String,

    /// Controlling agent, set for assets only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub controller: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub verification_method: Vec<VerificationMethod>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authentication: Vec<String>,
}

impl DidDocument {
    /// Public key of the active verification method.
    ///
    /// # Errors
    /// [`Error::NotFound`] if the document has no key (assets, deactivated DIDs).
    pub fn public_key(&self) -> Result<PublicKey> {
        let method = self
            .verification_method
            .first()
            .ok_or_else(|| Error::NotFound(format!("verification method for {}", self.id)))?;
        method.public_key_jwk.to_public_key()
    }
}

/// Ledger-maintained metadata about a DID.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DocumentMetadata {
    pub created: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated: Option<DateTime<Utc>>,

    #[serde(default)]
    pub deactivated: bool,

    pub mdip: Mdip,

    /// Anchored asset data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,

    /// DID of the encrypted identity backup
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub vault: Option<String>,
}

/// Full resolution result for a DID.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DidResolution {
    #[serde(rename = "@context")]
    pub context: String,
    pub did_document: DidDocument,
    pub did_document_metadata: DocumentMetadata,
}

impl DidResolution {
    pub fn is_deactivated(&self) -> bool {
        self.did_document_metadata.deactivated
    }

    /// Anchored data if this is a live asset.
    pub fn asset_data(&self) -> Option<&Value> {
        if self.is_deactivated() {
            return None;
        }
        self.did_document_metadata.data.as_ref()
    }
}
