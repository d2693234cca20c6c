// src/lib.rs

//! # DID Keymaster
//!
//! Wallet and key management for MDIP decentralized identities. The
//! keymaster holds an HD wallet, creates and rotates agent identities,
//! anchors signed and encrypted assets on a DID ledger, and runs the
//! credential and challenge-response protocols on top of them.
//!
//! ## Architecture Overview
//! 1. **Ledger Layer**: [`Ledger`] trait, HTTP [`GatekeeperClient`] and in-process [`MemoryLedger`]
//! 2. **Services Layer**: [`WalletService`], split into identity, asset, envelope, credential and challenge operations
//! 3. **Storage Layer**: [`WalletStore`] implementations for the local wallet
//! 4. **Cryptography Layer**: HD key derivation, ECDSA signatures and ECDH message encryption
//!
//! ## Environment Variables
//! All optional, see [`Settings`]:
//! - `KEYMASTER_GATEKEEPER_URL`: gatekeeper base URL (default: http://localhost:3000)
//! - `KEYMASTER_WALLET_PATH`: wallet file (default: wallet.json)
//! - `KEYMASTER_DEFAULT_REGISTRY`: registry for new DIDs (default: peerbit)
//! - `KEYMASTER_REQUEST_TIMEOUT_SECS`: ledger request timeout (default: 30)
//!
//! ## Example
//! ```no_run
//! use keymaster::{Settings, WalletService};
//!
//! # async fn run() -> keymaster::Result<()> {
//! let keymaster = WalletService::from_settings(&Settings::load()?)?;
//! keymaster.new_wallet("abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about", false)?;
//! let did = keymaster.create_identity("alice", None).await?;
//! println!("alice is {}", did);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod ledger;
pub mod models;
pub mod services;
pub mod storage;
pub mod utils;
pub mod wallet;

pub use config::Settings;
pub use error::{Error, ErrorKind, Result};
pub use ledger::gatekeeper_client::GatekeeperClient;
pub use ledger::memory_ledger::MemoryLedger;
pub use ledger::Ledger;
pub use services::keymaster::{MnemonicSource, WalletService};
pub use services::schema_faker::{ExampleGenerator, SchemaFaker};
pub use storage::wallet_store::{JsonFileStore, MemoryStore, WalletStore};
