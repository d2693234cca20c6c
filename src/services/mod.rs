// src/services/mod.rs
//! The keymaster service.
//!
//! [`keymaster::WalletService`] is defined in `keymaster`; every other module
//! here adds one group of operations to it.

pub mod asset_manager;
pub mod credential_issuer;
pub mod envelope_cipher;
pub mod identity_manager;
pub mod keymaster;
pub mod schema_faker;
pub mod verifier;
