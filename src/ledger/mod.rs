// src/ledger/mod.rs
//! DID ledger interface.
//!
//! The ledger (gatekeeper) is the append-only store the keymaster anchors
//! identities and assets on. It is consumed through the [`Ledger`] trait so
//! the wallet logic runs unchanged against the HTTP gatekeeper
//! ([`gatekeeper_client::GatekeeperClient`]) or an in-process ledger
//! ([`memory_ledger::MemoryLedger`]).
//!
//! Ledger calls are not retried here; a failure surfaces to the caller
//! immediately.

pub mod gatekeeper_client;
pub mod memory_ledger;

use crate::error::Result;
use crate::models::did::DidResolution;
use crate::models::operation::Operation;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

#[async_trait]
pub trait Ledger: Send + Sync {
    /// Submits a signed create operation and returns the new DID.
    async fn create_did(&self, operation: &Operation) -> Result<String>;

    /// Resolves a DID, optionally as of a past instant.
    async fn resolve_did(&self, did: &str, asof: Option<DateTime<Utc>>) -> Result<DidResolution>;

    /// Submits a signed document replacement. `Ok(false)` means the ledger declined it.
    async fn update_did(&self, operation: &Operation) -> Result<bool>;

    /// Submits a signed deactivation. `Ok(false)` means the ledger declined it.
    async fn delete_did(&self, operation: &Operation) -> Result<bool>;
}
