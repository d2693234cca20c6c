// src/models/credential.rs
//! Verifiable Credential and challenge-response data model.
//!
//! Follows the [W3C Verifiable Credentials Data Model](https://www.w3.org/TR/vc-data-model-2.0/)
//! loosely: the credential type list carries the DID of the schema asset the
//! credential was bound from, and the generated subject data lives under
//! `credential`.
//!
//! The challenge types describe the verifier side of the protocol:
//! a [`Challenge`] lists [`Requirement`]s, a [`ChallengeIssuance`] addresses
//! it to a subject, and a [`ChallengeResponse`] pairs each matched credential
//! with its re-encrypted presentation.

use crate::models::operation::Signature;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const CREDENTIALS_V2_CONTEXT: &str = "https://www.w3.org/ns/credentials/v2";
pub const CREDENTIALS_EXAMPLES_CONTEXT: &str = "https://www.w3.org/ns/credentials/examples/v2";
pub const VERIFIABLE_CREDENTIAL_TYPE: &str = "VerifiableCredential";

/// The subject a credential is about.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CredentialSubject {
    /// DID of the subject
    pub id: String,
}

/// A Verifiable Credential.
///
/// Built unsigned by `bind_credential`, signed and encrypted to the subject
/// by `attest_credential`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct VerifiableCredential {
    #[serde(rename = "@context")]
    pub context: Vec<String>,

    /// `["VerifiableCredential", <schema DID>]`
    #[serde(rename = "type")]
    pub credential_type: Vec<String>,

    /// DID of the attesting identity
    pub issuer: String,

    pub valid_from: DateTime<Utc>,

    pub valid_until: Option<DateTime<Utc>>,

    pub credential_subject: CredentialSubject,

    /// Subject data instantiated from the schema
    pub credential: Value,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
}

impl VerifiableCredential {
    /// DID of the schema asset the credential was bound from.
    pub fn schema(&self) -> Option<&str> {
        self.credential_type
            .iter()
            .find(|t| t.as_str() != VERIFIABLE_CREDENTIAL_TYPE)
            .map(String::as_str)
    }
}

/// One entry of a challenge.
///
/// A held credential satisfies the requirement when its issuer is one of
/// `attestors` and its type includes `schema`. An absent field is not checked.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Requirement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub attestors: Option<Vec<String>>,
}

/// Requirements document anchored by `create_challenge`.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Default)]
pub struct Challenge {
    pub credentials: Vec<Requirement>,
}

/// A challenge addressed to a subject, signed by the verifier.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChallengeIssuance {
    /// DID of the [`Challenge`] asset
    pub challenge: String,
    pub from: String,
    pub to: String,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<Signature>,
}

/// A credential and its presentation to the verifier.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct CredentialPair {
    /// DID of the credential envelope as attested by the issuer
    pub vc: String,
    /// DID of the same plaintext re-encrypted to the verifier
    pub vp: String,
}

/// Anchored by the subject in reply to a [`ChallengeIssuance`].
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ChallengeResponse {
    /// DID of the issued challenge being answered
    pub challenge: String,
    pub credentials: Vec<CredentialPair>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_schema_is_non_base_type() {
        let vc: VerifiableCredential = serde_json::from_value(json!({
            "@context": [CREDENTIALS_V2_CONTEXT],
            "type": ["VerifiableCredential", "did:mdip:schema"],
            "issuer": "did:mdip:alice",
            "validFrom": "2024-03-01T12:00:00Z",
            "validUntil": null,
            "credentialSubject": { "id": "did:mdip:bob" },
            "credential": { "email": "bob@example.com" }
        }))
        .unwrap();

        assert_eq!(vc.schema(), Some("did:mdip:schema"));
        assert!(vc.signature.is_none());
    }

    #[test]
    fn test_requirement_fields_are_optional() {
        let challenge: Challenge =
            serde_json::from_value(json!({"credentials": [{"schema": "did:mdip:s"}, {}]})).unwrap();
        assert_eq!(challenge.credentials[0].schema.as_deref(), Some("did:mdip:s"));
        assert_eq!(challenge.credentials[1], Requirement::default());
    }
}
