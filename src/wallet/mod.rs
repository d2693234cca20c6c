// src/wallet/mod.rs
//! Key material and the credential sets kept per identity.

pub mod credential_storage;
pub mod key_management;
