// src/wallet/key_management.rs
//! Cryptographic key management for the DID wallet.
//!
//! Provides deterministic generation and usage of the wallet's keys:
//! - BIP-32 hierarchical derivation from the wallet seed
//! - Per-identity, per-rotation key pairs at `m/44'/0'/{account}'/0/{index}`
//! - ECDSA signing and verification of hex SHA-256 digests
//!
//! Uses the following cryptographic primitives:
//! - secp256k1 curve (via `k256` crate)
//! - HMAC-SHA512 (via `ring`) for child key derivation

use crate::error::{Error, Result};
use crate::models::did::PublicJwk;
use crate::models::wallet::HdKeyJson;
use crate::utils::crypto::mnemonic_to_seed;
use k256::ecdsa::signature::hazmat::{PrehashSigner, PrehashVerifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::elliptic_curve::PrimeField;
use k256::{FieldBytes, PublicKey, Scalar, SecretKey};
use ring::hmac;

/// Offset marking a hardened BIP-32 child index.
const HARDENED: u32 = 0x8000_0000;

/// HMAC key for BIP-32 master key generation.
const MASTER_HMAC_KEY: &[u8] = b"Bitcoin seed";

/// BIP-44 purpose and coin type used for identity keys.
const PURPOSE: u32 = 44;
const COIN_TYPE: u32 = 0;

/// Extended private key: a secp256k1 secret plus its chain code.
#[derive(Clone)]
pub struct HdKey {
    secret_key: SecretKey,
    chain_code: [u8; 32],
}

impl HdKey {
    /// BIP-32 master key from a raw seed.
    ///
    /// # Errors
    /// [`Error::InvalidSeed`] if the seed is empty or yields an invalid key.
    pub fn from_seed(seed: &[u8]) -> Result<Self> {
        if seed.is_empty() {
            return Err(Error::InvalidSeed("empty seed".into()));
        }

        let key = hmac::Key::new(hmac::HMAC_SHA512, MASTER_HMAC_KEY);
        let tag = hmac::sign(&key, seed);
        let (il, ir) = tag.as_ref().split_at(32);

        let secret_key = SecretKey::from_slice(il)
            .map_err(|_| Error::InvalidSeed("seed yields an invalid master key".into()))?;
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(ir);

        Ok(HdKey { secret_key, chain_code })
    }

    pub fn from_mnemonic(mnemonic: &str) -> Result<Self> {
        let seed = mnemonic_to_seed(mnemonic)?;
        HdKey::from_seed(&seed)
    }

    /// Restores the root key persisted in the wallet.
    pub fn from_json(json: &HdKeyJson) -> Result<Self> {
        let secret = hex::decode(&json.private_key)
            .map_err(|e| Error::InvalidSeed(format!("bad root key encoding: {}", e)))?;
        let chain = hex::decode(&json.chain_code)
            .map_err(|e| Error::InvalidSeed(format!("bad chain code encoding: {}", e)))?;

        if chain.len() != 32 {
            return Err(Error::InvalidSeed("chain code must be 32 bytes".into()));
        }

        let secret_key = SecretKey::from_slice(&secret)
            .map_err(|_| Error::InvalidSeed("root key is not a secp256k1 scalar".into()))?;
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&chain);

        Ok(HdKey { secret_key, chain_code })
    }

    pub fn to_json(&self) -> HdKeyJson {
        HdKeyJson {
            private_key: hex::encode(self.secret_key.to_bytes()),
            chain_code: hex::encode(self.chain_code),
        }
    }

    /// Derives one child key (CKDpriv).
    ///
    /// Indices at or above `0x8000_0000` are hardened.
    pub fn derive_child(&self, index: u32) -> Result<HdKey> {
        let mut data = Vec::with_capacity(37);
        if index >= HARDENED {
            data.push(0);
            data.extend_from_slice(&self.secret_key.to_bytes());
        } else {
            let public = self.secret_key.public_key().to_encoded_point(true);
            data.extend_from_slice(public.as_bytes());
        }
        data.extend_from_slice(&index.to_be_bytes());

        let key = hmac::Key::new(hmac::HMAC_SHA512, &self.chain_code);
        let tag = hmac::sign(&key, &data);
        let (il, ir) = tag.as_ref().split_at(32);

        let tweak: Option<Scalar> = Scalar::from_repr(FieldBytes::clone_from_slice(il)).into();
        let tweak = tweak.ok_or_else(|| Error::CryptoFailure(format!("unusable child index {}", index)))?;
        let child = tweak + *self.secret_key.to_nonzero_scalar();

        let secret_key = SecretKey::from_bytes(&child.to_bytes())
            .map_err(|_| Error::CryptoFailure(format!("unusable child index {}", index)))?;
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(ir);

        Ok(HdKey { secret_key, chain_code })
    }

    /// Derives the identity key at `m/44'/0'/{account}'/0/{index}`.
    pub fn derive_identity(&self, account: u32, index: u32) -> Result<HdKey> {
        if account >= HARDENED || index >= HARDENED {
            return Err(Error::InvalidInput(format!(
                "derivation coordinates out of range: {}/{}",
                account, index
            )));
        }

        self.derive_child(PURPOSE | HARDENED)?
            .derive_child(COIN_TYPE | HARDENED)?
            .derive_child(account | HARDENED)?
            .derive_child(0)?
            .derive_child(index)
    }

    /// Signing/encryption key pair of this node.
    pub fn keypair(&self) -> Result<KeyPair> {
        Ok(KeyPair::new(self.secret_key.clone()))
    }
}

/// Derives the key pair for identity coordinate `(account, index)` from a raw seed.
///
/// Identical coordinates always yield the identical key pair for a given
/// seed; distinct coordinates yield unrelated key pairs.
///
/// # Errors
/// [`Error::InvalidSeed`] if the seed is absent or malformed.
pub fn derive(seed: &[u8], account: u32, index: u32) -> Result<KeyPair> {
    HdKey::from_seed(seed)?.derive_identity(account, index)?.keypair()
}

/// secp256k1 key pair with its published JWK.
///
/// # Security Notes
/// - The secret key is never serialized; only the wallet root is persisted
/// - `SecretKey` zeroizes its memory on drop
#[derive(Clone)]
pub struct KeyPair {
    secret_key: SecretKey,
    pub public_jwk: PublicJwk,
}

impl KeyPair {
    pub fn new(secret_key: SecretKey) -> Self {
        let public_jwk = PublicJwk::from_public_key(&secret_key.public_key());
        KeyPair { secret_key, public_jwk }
    }

    pub fn secret(&self) -> &SecretKey {
        &self.secret_key
    }

    pub fn public_key(&self) -> PublicKey {
        self.secret_key.public_key()
    }

    /// Signs a hex SHA-256 digest with ECDSA (secp256k1).
    ///
    /// # Returns
    /// Hex encoded 64-byte compact signature (R || S values)
    ///
    /// # Security
    /// - Uses deterministic ECDSA (RFC 6979)
    /// - The digest is signed as-is; callers hash the canonical payload first
    pub fn sign_hash(&self, hash_hex: &str) -> Result<String> {
        let hash = decode_digest(hash_hex)?;
        let signing_key = SigningKey::from(&self.secret_key);

        let signature: Signature = signing_key
            .sign_prehash(&hash)
            .map_err(|e| Error::CryptoFailure(format!("signing failed: {}", e)))?;

        Ok(hex::encode(signature.to_bytes()))
    }
}

/// Checks a signature produced by [`KeyPair::sign_hash`].
///
/// Malformed digests or signatures verify as `false`.
pub fn verify_hash(hash_hex: &str, signature_hex: &str, public_key: &PublicKey) -> bool {
    let (hash, sig_bytes) = match (decode_digest(hash_hex), hex::decode(signature_hex)) {
        (Ok(hash), Ok(sig)) => (hash, sig),
        _ => return false,
    };

    let signature = match Signature::from_slice(&sig_bytes) {
        Ok(sig) => sig,
        Err(_) => return false,
    };

    VerifyingKey::from(public_key)
        .verify_prehash(&hash, &signature)
        .is_ok()
}

fn decode_digest(hash_hex: &str) -> Result<Vec<u8>> {
    let hash = hex::decode(hash_hex)
        .map_err(|e| Error::CryptoFailure(format!("digest is not hex: {}", e)))?;
    if hash.len() != 32 {
        return Err(Error::CryptoFailure("digest must be 32 bytes".into()));
    }
    Ok(hash)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::crypto::hash_message;

    // BIP-32 test vector 1
    const VECTOR_SEED: &str = "000102030405060708090a0b0c0d0e0f";

    #[test]
    fn test_master_key_matches_bip32_vector() {
        let master = HdKey::from_seed(&hex::decode(VECTOR_SEED).unwrap()).unwrap();
        let json = master.to_json();
        assert_eq!(
            json.private_key,
            "e8f32e723decf4051aefac8e2c93c9c5b214313817cdb01a1494b917c8436b35"
        );
        assert_eq!(
            json.chain_code,
            "873dff81c02f525623fd1fe5167eac3a55a049de3d314bb42ee227ffed37d508"
        );
    }

    #[test]
    fn test_child_derivation_matches_bip32_vector() {
        let master = HdKey::from_seed(&hex::decode(VECTOR_SEED).unwrap()).unwrap();

        // m/0'
        let hardened = master.derive_child(HARDENED).unwrap().to_json();
        assert_eq!(
            hardened.private_key,
            "edb2e14f9ee77d26dd93b4ecede8d16ed408ce149b6cd80b0715a2d911a0afea"
        );

        // m/0'/1
        let normal = master
            .derive_child(HARDENED)
            .unwrap()
            .derive_child(1)
            .unwrap()
            .to_json();
        assert_eq!(
            normal.private_key,
            "3c6cb8d0f6a264c91ea8b5030fadaa8e538b020f0a387421a12de9319dc93368"
        );
    }

    #[test]
    fn test_derive_is_deterministic() {
        let seed = hex::decode(VECTOR_SEED).unwrap();
        let a = derive(&seed, 3, 7).unwrap();
        let b = derive(&seed, 3, 7).unwrap();
        assert_eq!(a.public_jwk, b.public_jwk);
    }

    #[test]
    fn test_coordinates_give_distinct_keys() {
        let seed = hex::decode(VECTOR_SEED).unwrap();
        let base = derive(&seed, 0, 0).unwrap();
        assert_ne!(base.public_jwk, derive(&seed, 0, 1).unwrap().public_jwk);
        assert_ne!(base.public_jwk, derive(&seed, 1, 0).unwrap().public_jwk);
    }

    #[test]
    fn test_empty_seed_is_rejected() {
        assert!(matches!(derive(&[], 0, 0), Err(Error::InvalidSeed(_))));
    }

    #[test]
    fn test_root_key_json_round_trip() {
        let master = HdKey::from_seed(&hex::decode(VECTOR_SEED).unwrap()).unwrap();
        let restored = HdKey::from_json(&master.to_json()).unwrap();
        assert_eq!(
            restored.derive_identity(0, 0).unwrap().keypair().unwrap().public_jwk,
            master.derive_identity(0, 0).unwrap().keypair().unwrap().public_jwk
        );
    }

    #[test]
    fn test_sign_and_verify_hash() {
        let seed = hex::decode(VECTOR_SEED).unwrap();
        let keypair = derive(&seed, 0, 0).unwrap();
        let other = derive(&seed, 0, 1).unwrap();
        let hash = hash_message("payload");

        let sig = keypair.sign_hash(&hash).unwrap();

        assert!(verify_hash(&hash, &sig, &keypair.public_key()));
        assert!(!verify_hash(&hash, &sig, &other.public_key()));
        assert!(!verify_hash(&hash_message("tampered"), &sig, &keypair.public_key()));
        assert!(!verify_hash(&hash, "zz", &keypair.public_key()));
    }
}
