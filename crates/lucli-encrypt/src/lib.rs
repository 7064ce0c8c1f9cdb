//! Authenticated-encryption-at-rest primitives for the LuCLI secret store.
//!
//! PBKDF2-HMAC-SHA256 derives a 256-bit key from a passphrase and a
//! 16-byte salt (§4.6); AES-256-GCM then encrypts/decrypts individual
//! values under that key with a fresh 12-byte nonce per write. Unlike a
//! one-shot `encrypt(bytes, passphrase)` helper, the salt here is derived
//! once per secret-store file and reused across every entry in it, so the
//! key-derivation step is split out from the per-value seal/open step.

use aes_gcm::{
    Aes256Gcm, Nonce,
    aead::{Aead, KeyInit, OsRng, rand_core::RngCore},
};
use anyhow::{Context, Result};
use pbkdf2::pbkdf2_hmac_array;
use sha2::Sha256;

/// Size of the salt for key derivation, in bytes.
pub const SALT_SIZE: usize = 16;
/// Size of the nonce for AES-GCM, in bytes.
pub const NONCE_SIZE: usize = 12;
/// PBKDF2 iteration count (§4.6).
pub const PBKDF2_ITERATIONS: u32 = 120_000;
/// Size of the derived key, in bytes (256 bits for AES-256).
pub const KEY_SIZE: usize = 32;

/// A derived encryption key. Held only in memory, never serialized.
pub struct DerivedKey([u8; KEY_SIZE]);

/// Generate a fresh random salt for a new secret store file.
pub fn generate_salt() -> [u8; SALT_SIZE] {
    let mut salt = [0u8; SALT_SIZE];
    OsRng.fill_bytes(&mut salt);
    salt
}

/// Derive a 256-bit key from a passphrase and salt via PBKDF2-HMAC-SHA256.
pub fn derive_key(passphrase: &str, salt: &[u8]) -> DerivedKey {
    DerivedKey(pbkdf2_hmac_array::<Sha256, KEY_SIZE>(
        passphrase.as_bytes(),
        salt,
        PBKDF2_ITERATIONS,
    ))
}

/// Encrypt `plaintext` under `key`, returning a fresh random nonce and the
/// ciphertext (including the 128-bit authentication tag).
pub fn seal(key: &DerivedKey, plaintext: &[u8]) -> Result<([u8; NONCE_SIZE], Vec<u8>)> {
    let mut nonce_bytes = [0u8; NONCE_SIZE];
    OsRng.fill_bytes(&mut nonce_bytes);

    let cipher = Aes256Gcm::new_from_slice(&key.0).context("failed to initialize AES-256-GCM")?;
    let nonce = Nonce::from_slice(&nonce_bytes);
    let ciphertext = cipher
        .encrypt(nonce, plaintext)
        .map_err(|_| anyhow::anyhow!("encryption failed"))?;

    Ok((nonce_bytes, ciphertext))
}

/// Decrypt `ciphertext` under `key` and `nonce`. A wrong passphrase (and
/// therefore a wrong key) manifests here as an authentication-tag
/// failure, which the caller should report as "passphrase may be
/// incorrect" per §4.6.
pub fn open(key: &DerivedKey, nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>> {
    if nonce.len() != NONCE_SIZE {
        anyhow::bail!("invalid nonce length: expected {NONCE_SIZE}, got {}", nonce.len());
    }
    let cipher = Aes256Gcm::new_from_slice(&key.0).context("failed to initialize AES-256-GCM")?;
    let nonce = Nonce::from_slice(nonce);
    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| anyhow::anyhow!("decryption failed; passphrase may be incorrect"))
}
