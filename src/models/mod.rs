// src/models/mod.rs
//! Data structures shared across the keymaster.

pub mod credential;
pub mod did;
pub mod envelope;
pub mod operation;
pub mod wallet;
