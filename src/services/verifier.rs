// src/services/verifier.rs
//! Challenge-response credential verification.
//!
//! The protocol moves through four states, each one an anchored asset:
//! 1. Defined: the verifier anchors a [`Challenge`] listing requirements
//! 2. Issued: the verifier addresses it to a subject, signed and encrypted
//! 3. Responded: the subject picks matching held credentials and
//!    re-encrypts each to the verifier as a presentation
//! 4. Verified: the verifier checks every presentation against the still
//!    live credential it claims to be
//!
//! Verification returns the presentations that passed. Matching them back
//! against the challenge requirements is left to the caller.

use crate::error::{Error, Result};
use crate::models::credential::{
    Challenge, ChallengeIssuance, ChallengeResponse, CredentialPair, Requirement,
    VerifiableCredential,
};
use crate::models::envelope::Envelope;
use crate::models::wallet::Identity;
use crate::services::keymaster::{sign_object, WalletService};
use chrono::{Duration, Utc};
use log::{debug, info, warn};
use serde_json::Value;

/// Validity of an issued challenge when the caller does not choose one.
pub const DEFAULT_CHALLENGE_HOURS: i64 = 24;

impl WalletService {
    /// Anchors a challenge owned by the current identity.
    ///
    /// # Returns
    /// DID of the challenge asset
    pub async fn create_challenge(&self, challenge: &Challenge, registry: Option<&str>) -> Result<String> {
        self.create_data(serde_json::to_value(challenge)?, registry).await
    }

    /// Addresses the challenge at `challenge_did` to `subject_did`.
    ///
    /// # Arguments
    /// * `challenge_did` - DID returned by [`WalletService::create_challenge`]
    /// * `subject_did` - Identity expected to respond
    /// * `expires_in` - Validity window, [`DEFAULT_CHALLENGE_HOURS`] when `None`
    ///
    /// # Returns
    /// DID of the encrypted issuance
    pub async fn issue_challenge(
        &self,
        challenge_did: &str,
        subject_did: &str,
        expires_in: Option<Duration>,
    ) -> Result<String> {
        let wallet = self.load_wallet()?;
        let (_, verifier) = wallet.current_identity()?;

        let valid_from = Utc::now();
        let issuance = ChallengeIssuance {
            challenge: challenge_did.to_string(),
            from: verifier.did.clone(),
            to: subject_did.to_string(),
            valid_from,
            valid_until: valid_from + expires_in.unwrap_or_else(|| Duration::hours(DEFAULT_CHALLENGE_HOURS)),
            signature: None,
        };

        let signed = sign_object(&wallet, serde_json::to_value(issuance)?)?;
        let did = self.encrypt_json(&signed, subject_did, None).await?;

        info!("issued challenge {} to {} as {}", challenge_did, subject_did, did);
        Ok(did)
    }

    /// Answers the issued challenge at `issued_did` as the current identity.
    ///
    /// For each requirement the first matching held credential is
    /// re-encrypted to the verifier. Requirements nothing matches are left
    /// out of the response.
    ///
    /// # Returns
    /// DID of the anchored [`ChallengeResponse`]
    ///
    /// # Errors
    /// [`Error::InvalidChallenge`] if the issuance has no challenge
    /// reference or is addressed to someone else
    pub async fn create_response(&self, issued_did: &str, registry: Option<&str>) -> Result<String> {
        let (_, identity) = self.current_identity()?;
        let invalid = || Error::InvalidChallenge {
            did: issued_did.to_string(),
        };

        let issuance: Value = self.decrypt_json(issued_did).await?;
        let challenge_did = issuance
            .get("challenge")
            .and_then(Value::as_str)
            .ok_or_else(invalid)?;
        if issuance.get("to").and_then(Value::as_str) != Some(identity.did.as_str()) {
            return Err(invalid());
        }
        let verifier = issuance
            .get("from")
            .and_then(Value::as_str)
            .ok_or_else(invalid)?;

        let challenge: Challenge = self
            .resolve_asset(challenge_did)
            .await?
            .and_then(|data| serde_json::from_value(data).ok())
            .ok_or_else(invalid)?;

        let mut credentials = Vec::new();
        for requirement in &challenge.credentials {
            let vc = match self.find_matching_credential(&identity, requirement).await? {
                Some(vc) => vc,
                None => {
                    debug!("no held credential satisfies {:?}", requirement);
                    continue;
                }
            };

            let plaintext = self.decrypt_message(&vc).await?;
            let vp = self.encrypt_message(&plaintext, verifier, registry).await?;
            credentials.push(CredentialPair { vc, vp });
        }

        let response = ChallengeResponse {
            challenge: issued_did.to_string(),
            credentials,
        };
        let did = self
            .create_data(serde_json::to_value(response)?, registry)
            .await?;

        info!("responded to {} with {}", issued_did, did);
        Ok(did)
    }

    /// First held credential of `identity` satisfying `requirement`.
    async fn find_matching_credential(
        &self,
        identity: &Identity,
        requirement: &Requirement,
    ) -> Result<Option<String>> {
        for did in identity.held.iter() {
            let vc: Value = match self.decrypt_json(did).await {
                Ok(vc) => vc,
                Err(e) => {
                    debug!("skipping held credential {}: {}", did, e);
                    continue;
                }
            };

            if satisfies(&vc, &identity.did, requirement) {
                return Ok(Some(did.to_string()));
            }
        }
        Ok(None)
    }

    /// Checks every presentation in the response at `response_did`.
    ///
    /// A pair whose credential was revoked is skipped, as is a pair whose
    /// presentation does not carry the credential's content or whose
    /// signature does not verify.
    ///
    /// # Returns
    /// The presentations that passed, in response order
    pub async fn verify_response(&self, response_did: &str) -> Result<Vec<VerifiableCredential>> {
        let response: ChallengeResponse = self
            .resolve_asset(response_did)
            .await?
            .and_then(|data| serde_json::from_value(data).ok())
            .ok_or_else(|| Error::InvalidInput(format!("{} is not a challenge response", response_did)))?;

        let mut verified = Vec::new();
        for pair in &response.credentials {
            let vc = match self.resolve_asset(&pair.vc).await? {
                Some(vc) => vc,
                None => {
                    info!("credential {} was revoked", pair.vc);
                    continue;
                }
            };
            let vp = match self.resolve_asset(&pair.vp).await? {
                Some(vp) => vp,
                None => continue,
            };

            let same_content = match (Envelope::from_asset(&vc), Envelope::from_asset(&vp)) {
                (Some(vc), Some(vp)) => vc.cipher_hash == vp.cipher_hash,
                _ => false,
            };
            if !same_content {
                warn!("presentation {} does not match credential {}", pair.vp, pair.vc);
                continue;
            }

            let presentation: Value = self.decrypt_json(&pair.vp).await?;
            if !self.verify_signature(&presentation).await? {
                warn!("presentation {} has an invalid signature", pair.vp);
                continue;
            }

            match serde_json::from_value(presentation) {
                Ok(credential) => verified.push(credential),
                Err(e) => warn!("presentation {} is not a credential: {}", pair.vp, e),
            }
        }

        Ok(verified)
    }
}

/// Whether a decrypted credential meets `requirement` for `holder`.
fn satisfies(vc: &Value, holder: &str, requirement: &Requirement) -> bool {
    let issuer = match vc.get("issuer").and_then(Value::as_str) {
        Some(issuer) => issuer,
        None => return false,
    };

    let subject = vc
        .get("credentialSubject")
        .and_then(|s| s.get("id"))
        .and_then(Value::as_str);
    if subject != Some(holder) {
        return false;
    }

    if let Some(attestors) = &requirement.attestors {
        if !attestors.iter().any(|a| a == issuer) {
            return false;
        }
    }

    if let Some(schema) = &requirement.schema {
        let typed = vc
            .get("type")
            .and_then(Value::as_array)
            .map_or(false, |types| types.iter().any(|t| t.as_str() == Some(schema.as_str())));
        if !typed {
            return false;
        }
    }

    true
}
