// src/wallet/credential_storage.rs
//! Ordered DID sets kept per identity.
//!
//! Each identity tracks the DIDs it **owns** (assets it created) and the
//! credentials it **holds** (accepted into its possession). Both are kept
//! in insertion order without duplicates: challenge responses scan held
//! credentials in acceptance order and take the first match, so the order
//! is part of the observable behavior.

use serde::{Deserialize, Serialize};

/// Insertion-ordered set of DIDs.
///
/// Serialized as a plain JSON array so the wallet file stays readable.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq, Default)]
#[serde(transparent)]
pub struct CredentialSet {
    dids: Vec<String>,
}

impl CredentialSet {
    /// Creates a new empty set.
    pub fn new() -> Self {
        CredentialSet { dids: Vec::new() }
    }

    /// Appends a DID unless already present.
    ///
    /// # Returns
    /// `true` if the DID was added, `false` if it was already in the set
    /// (its original position is kept).
    pub fn insert(&mut self, did: &str) -> bool {
        if self.contains(did) {
            return false;
        }
        self.dids.push(did.to_string());
        true
    }

    /// Checks if a DID is in the set.
    pub fn contains(&self, did: &str) -> bool {
        self.dids.iter().any(|d| d == did)
    }

    /// Removes a DID from the set.
    /// Returns true if a DID was removed, false if it was not present.
    pub fn remove(&mut self, did: &str) -> bool {
        let before = self.dids.len();
        self.dids.retain(|d| d != did);
        self.dids.len() != before
    }

    /// Iterates in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.dids.iter().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.dids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dids.is_empty()
    }

    pub fn to_vec(&self) -> Vec<String> {
        self.dids.clone()
    }
}
