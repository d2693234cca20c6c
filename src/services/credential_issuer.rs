// src/services/credential_issuer.rs
//! Credential Issuer Service
//!
//! Issues, binds, attests, revokes and accepts verifiable credentials.
//!
//! A credential goes through these steps:
//! - the issuer anchors a JSON Schema (`create_credential`)
//! - binds it to a subject, producing an unsigned [`VerifiableCredential`]
//! - attests it: signs and encrypts it to the subject, anchoring the
//!   envelope. The envelope DID is the credential's only ledger footprint
//! - the subject accepts it into its held set
//!
//! Revocation deletes the envelope DID; resolving it afterwards yields no
//! data, which is how verifiers notice.

use crate::error::{Error, Result};
use crate::models::credential::{
    CredentialSubject, VerifiableCredential, CREDENTIALS_EXAMPLES_CONTEXT, CREDENTIALS_V2_CONTEXT,
    VERIFIABLE_CREDENTIAL_TYPE,
};
use crate::models::operation::Operation;
use crate::services::keymaster::{sign_object, sign_operation, WalletService};
use chrono::{DateTime, Utc};
use log::{debug, info};
use serde_json::Value;

impl WalletService {
    /// Anchors a credential schema.
    ///
    /// # Arguments
    /// * `schema` - JSON Schema describing the credential subject data
    /// * `registry` - Target registry, the service default when `None`
    ///
    /// # Returns
    /// DID of the schema asset
    pub async fn create_credential(&self, schema: Value, registry: Option<&str>) -> Result<String> {
        self.create_data(schema, registry).await
    }

    /// Builds an unsigned credential about `subject_did` from the schema at
    /// `schema_did`, issued by the current identity.
    ///
    /// # Arguments
    /// * `schema_did` - DID returned by [`WalletService::create_credential`]
    /// * `subject_did` - Who the credential is about
    /// * `valid_until` - Expiry, if any
    ///
    /// # Errors
    /// - [`Error::NoCurrentIdentity`] if no identity is selected
    /// - [`Error::NotFound`] if the schema asset was deleted
    pub async fn bind_credential(
        &self,
        schema_did: &str,
        subject_did: &str,
        valid_until: Option<DateTime<Utc>>,
    ) -> Result<VerifiableCredential> {
        let (_, issuer) = self.current_identity()?;

        let schema = self
            .resolve_asset(schema_did)
            .await?
            .ok_or_else(|| Error::NotFound(format!("schema {}", schema_did)))?;
        let credential = self.examples.generate(&schema)?;

        Ok(VerifiableCredential {
            context: vec![
                CREDENTIALS_V2_CONTEXT.to_string(),
                CREDENTIALS_EXAMPLES_CONTEXT.to_string(),
            ],
            credential_type: vec![VERIFIABLE_CREDENTIAL_TYPE.to_string(), schema_did.to_string()],
            issuer: issuer.did,
            valid_from: Utc::now(),
            valid_until,
            credential_subject: CredentialSubject {
                id: subject_did.to_string(),
            },
            credential,
            signature: None,
        })
    }

    /// Signs `vc` and sends it encrypted to its subject.
    ///
    /// # Returns
    /// DID of the credential envelope, recorded as owned
    ///
    /// # Errors
    /// [`Error::InvalidIssuer`] if `vc.issuer` is not the current identity
    pub async fn attest_credential(&self, vc: &VerifiableCredential, registry: Option<&str>) -> Result<String> {
        let wallet = self.load_wallet()?;
        let (_, identity) = wallet.current_identity()?;

        if vc.issuer != identity.did {
            return Err(Error::InvalidIssuer {
                issuer: vc.issuer.clone(),
            });
        }

        let signed = sign_object(&wallet, serde_json::to_value(vc)?)?;
        let did = self
            .encrypt_json(&signed, &vc.credential_subject.id, registry)
            .await?;

        info!(
            "attested credential {} for {}",
            did, vc.credential_subject.id
        );
        Ok(did)
    }

    /// Deactivates the credential envelope at `did`.
    ///
    /// # Returns
    /// The ledger's verdict
    pub async fn revoke_credential(&self, did: &str) -> Result<bool> {
        let wallet = self.load_wallet()?;
        let operation = sign_operation(&wallet, Operation::delete(did))?;

        let revoked = self.ledger.delete_did(&operation).await?;
        if revoked {
            info!("revoked credential {}", did);
        }
        Ok(revoked)
    }

    /// Adds the credential at `did` to the current identity's held set.
    ///
    /// Never fails: a credential that cannot be decrypted, cannot be parsed
    /// or is about someone else is simply not accepted.
    pub async fn accept_credential(&self, did: &str) -> bool {
        match self.try_accept_credential(did).await {
            Ok(accepted) => accepted,
            Err(e) => {
                debug!("not accepting {}: {}", did, e);
                false
            }
        }
    }

    async fn try_accept_credential(&self, did: &str) -> Result<bool> {
        let vc: Value = self.decrypt_json(did).await?;

        let mut wallet = self.load_wallet()?;
        let identity = wallet.current_identity_mut()?;

        let subject = vc
            .get("credentialSubject")
            .and_then(|s| s.get("id"))
            .and_then(Value::as_str);
        if subject != Some(identity.did.as_str()) {
            debug!("{} is not about {}", did, identity.did);
            return Ok(false);
        }

        identity.held.insert(did);
        self.save_wallet(&wallet)?;
        Ok(true)
    }

    /// Credentials accepted by the current identity, in acceptance order.
    pub fn list_held(&self) -> Result<Vec<String>> {
        let wallet = self.load_wallet()?;
        let (_, identity) = wallet.current_identity()?;
        Ok(identity.held.to_vec())
    }
}
