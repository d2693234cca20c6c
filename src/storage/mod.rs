// src/storage/mod.rs
pub mod wallet_store;
