// src/storage/wallet_store.rs
//! Wallet persistence.
//!
//! The keymaster reads and writes the whole [`Wallet`] on every mutating
//! call. Stores only have to make each `save` atomic from the caller's
//! point of view; serializing concurrent writers is the caller's job.

use crate::error::Result;
use crate::models::wallet::Wallet;
use crate::utils::serialization::deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

pub trait WalletStore: Send + Sync {
    /// Returns the stored wallet, or `None` if nothing was saved yet.
    fn load(&self) -> Result<Option<Wallet>>;

    fn save(&self, wallet: &Wallet) -> Result<()>;
}

/// Pretty-printed JSON wallet file.
///
/// Writes go to a sibling temporary file that is renamed over the target,
/// so readers never observe a half-written wallet.
pub struct JsonFileStore {
    path: PathBuf,
}

impl JsonFileStore {
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        JsonFileStore {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn temp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

impl WalletStore for JsonFileStore {
    fn load(&self) -> Result<Option<Wallet>> {
        if !self.path.exists() {
            return Ok(None);
        }

        let json = fs::read_to_string(&self.path)?;
        Ok(Some(deserialize(&json)?))
    }

    fn save(&self, wallet: &Wallet) -> Result<()> {
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir)?;
            }
        }

        let json = serde_json::to_string_pretty(wallet)?;
        let temp = self.temp_path();
        fs::write(&temp, json)?;
        fs::rename(&temp, &self.path)?;
        Ok(())
    }
}

/// Wallet held in memory, for tests and short-lived sessions.
#[derive(Default)]
pub struct MemoryStore {
    wallet: Mutex<Option<Wallet>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        MemoryStore::default()
    }
}

impl WalletStore for MemoryStore {
    fn load(&self) -> Result<Option<Wallet>> {
        Ok(self
            .wallet
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone())
    }

    fn save(&self, wallet: &Wallet) -> Result<()> {
        *self.wallet.lock().unwrap_or_else(PoisonError::into_inner) = Some(wallet.clone());
        Ok(())
    }
}
