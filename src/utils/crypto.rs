// src/utils/crypto.rs
//! Cryptographic utilities shared by the wallet and the ledger.
//!
//! - SHA-256 content hashing (via `ring`)
//! - BIP-39 mnemonic to seed stretching (PBKDF2-HMAC-SHA512)
//! - Authenticated message encryption between two secp256k1 keys:
//!   ECDH shared secret → SHA-256 → AES-256-GCM with a random nonce
//!
//! Ciphertexts are encoded as base64url(nonce || ciphertext || tag) so they
//! survive the JSON round trip through the ledger and the wallet file.

use crate::error::{Error, Result};
use k256::ecdh::diffie_hellman;
use k256::{PublicKey, SecretKey};
use ring::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use ring::digest::{digest, SHA256};
use ring::pbkdf2;
use ring::rand::{SecureRandom, SystemRandom};
use std::num::NonZeroU32;

/// PBKDF2 rounds mandated by BIP-39.
const PBKDF2_ROUNDS: NonZeroU32 = match NonZeroU32::new(2048) {
    Some(rounds) => rounds,
    None => unreachable!(),
};

/// Word counts accepted for a BIP-39 mnemonic.
const MNEMONIC_WORD_COUNTS: [usize; 5] = [12, 15, 18, 21, 24];

/// BIP-39 seed length in bytes.
pub const SEED_LEN: usize = 64;

/// Computes a SHA-256 hash of the input data.
///
/// # Returns
/// Fixed-size 32-byte array containing the hash.
pub fn hash_data(data: &[u8]) -> [u8; 32] {
    let mut out = [0u8; 32];
    out.copy_from_slice(digest(&SHA256, data).as_ref());
    out
}

/// Hex-encoded SHA-256 of a UTF-8 message.
pub fn hash_message(message: &str) -> String {
    hex::encode(hash_data(message.as_bytes()))
}

/// Normalizes and validates a mnemonic phrase.
///
/// Only the shape is checked: a BIP-39 word count of lowercase ASCII words.
/// Wordlist membership is the concern of whoever generated the phrase.
pub fn normalize_mnemonic(mnemonic: &str) -> Result<String> {
    let words: Vec<&str> = mnemonic.split_whitespace().collect();

    if !MNEMONIC_WORD_COUNTS.contains(&words.len()) {
        return Err(Error::InvalidSeed(format!(
            "mnemonic must have 12, 15, 18, 21 or 24 words, got {}",
            words.len()
        )));
    }

    if words
        .iter()
        .any(|w| !w.chars().all(|c| c.is_ascii_lowercase()))
    {
        return Err(Error::InvalidSeed("mnemonic words must be lowercase letters".into()));
    }

    Ok(words.join(" "))
}

/// Stretches a mnemonic into a 64-byte BIP-39 seed (empty passphrase).
pub fn mnemonic_to_seed(mnemonic: &str) -> Result<[u8; SEED_LEN]> {
    let phrase = normalize_mnemonic(mnemonic)?;
    let mut seed = [0u8; SEED_LEN];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA512,
        PBKDF2_ROUNDS,
        b"mnemonic",
        phrase.as_bytes(),
        &mut seed,
    );
    Ok(seed)
}

/// Derives the symmetric key shared by `secret` and the owner of `public`.
fn shared_key(public: &PublicKey, secret: &SecretKey) -> Result<LessSafeKey> {
    let shared = diffie_hellman(secret.to_nonzero_scalar(), public.as_affine());
    let key_bytes = hash_data(shared.raw_secret_bytes().as_slice());
    let unbound = UnboundKey::new(&AES_256_GCM, &key_bytes)
        .map_err(|_| Error::CryptoFailure("cannot build message key".into()))?;
    Ok(LessSafeKey::new(unbound))
}

/// Encrypts `plaintext` so that the holder of the private key matching
/// `public` (together with the public half of `secret`) can read it.
///
/// Encrypting to one's own public key yields a message only the sender can
/// read back.
pub fn encrypt_message(public: &PublicKey, secret: &SecretKey, plaintext: &str) -> Result<String> {
    let key = shared_key(public, secret)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    SystemRandom::new()
        .fill(&mut nonce_bytes)
        .map_err(|_| Error::CryptoFailure("system RNG failure".into()))?;

    let mut in_out = plaintext.as_bytes().to_vec();
    key.seal_in_place_append_tag(
        Nonce::assume_unique_for_key(nonce_bytes),
        Aad::empty(),
        &mut in_out,
    )
    .map_err(|_| Error::CryptoFailure("encryption failed".into()))?;

    let mut envelope = nonce_bytes.to_vec();
    envelope.extend_from_slice(&in_out);
    Ok(base64::encode_config(envelope, base64::URL_SAFE_NO_PAD))
}

/// Reverses [`encrypt_message`].
///
/// # Errors
/// [`Error::CryptoFailure`] if the ciphertext is malformed or was not
/// produced for this key pair.
pub fn decrypt_message(public: &PublicKey, secret: &SecretKey, ciphertext: &str) -> Result<String> {
    let bytes = base64::decode_config(ciphertext, base64::URL_SAFE_NO_PAD)
        .map_err(|e| Error::CryptoFailure(format!("ciphertext is not base64url: {}", e)))?;

    if bytes.len() < NONCE_LEN {
        return Err(Error::CryptoFailure("ciphertext too short".into()));
    }

    let (nonce_bytes, sealed) = bytes.split_at(NONCE_LEN);
    let nonce = Nonce::try_assume_unique_for_key(nonce_bytes)
        .map_err(|_| Error::CryptoFailure("bad nonce".into()))?;

    let key = shared_key(public, secret)?;
    let mut in_out = sealed.to_vec();
    let plaintext = key
        .open_in_place(nonce, Aad::empty(), &mut in_out)
        .map_err(|_| Error::CryptoFailure("message authentication failed".into()))?;

    String::from_utf8(plaintext.to_vec())
        .map_err(|_| Error::CryptoFailure("plaintext is not UTF-8".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::OsRng;

    const MNEMONIC: &str =
        "abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon abandon about";

    #[test]
    fn test_mnemonic_seed_matches_bip39_vector() {
        // reference BIP-39 seed for the all-"abandon" phrase, empty passphrase
        let seed = mnemonic_to_seed(MNEMONIC).unwrap();
        assert_eq!(
            hex::encode(seed),
            "5eb00bbddcf069084889a8ab9155568165f5c453ccb85e70811aaed6f6da5fc1\
             9a5ac40b389cd370d086206dec8aa6c43daea6690f20ad3d8d48b2d2ce9e38e4"
        );
    }

    #[test]
    fn test_mnemonic_shape_is_validated() {
        assert!(matches!(mnemonic_to_seed(""), Err(Error::InvalidSeed(_))));
        assert!(matches!(mnemonic_to_seed("one two three"), Err(Error::InvalidSeed(_))));
        let shouting = MNEMONIC.to_uppercase();
        assert!(matches!(mnemonic_to_seed(&shouting), Err(Error::InvalidSeed(_))));
        assert_eq!(normalize_mnemonic(&format!("  {}  ", MNEMONIC)).unwrap(), MNEMONIC);
    }

    #[test]
    fn test_message_readable_by_both_parties() {
        let alice = SecretKey::random(&mut OsRng);
        let bob = SecretKey::random(&mut OsRng);

        let cipher = encrypt_message(&bob.public_key(), &alice, "hello bob").unwrap();

        assert_eq!(decrypt_message(&alice.public_key(), &bob, &cipher).unwrap(), "hello bob");
        assert_eq!(decrypt_message(&bob.public_key(), &alice, &cipher).unwrap(), "hello bob");
    }

    #[test]
    fn test_third_party_cannot_decrypt() {
        let alice = SecretKey::random(&mut OsRng);
        let bob = SecretKey::random(&mut OsRng);
        let eve = SecretKey::random(&mut OsRng);

        let cipher = encrypt_message(&bob.public_key(), &alice, "secret").unwrap();
        let result = decrypt_message(&alice.public_key(), &eve, &cipher);
        assert!(matches!(result, Err(Error::CryptoFailure(_))));
    }

    #[test]
    fn test_hash_message_is_hex_sha256() {
        assert_eq!(
            hash_message("abc"),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }
}
