//! Whole-file encryption for the secret store at rest.
//!
//! The entire store file is sealed as a single AES-256-GCM blob for
//! distribution and backup outside a running environment. The master key is
//! base64-encoded, supplied from an environment variable, and never stored
//! next to the ciphertext it protects.
//!
//! # Blob format
//!
//! ```text
//! ┌───────┬─────────┬────────────┬──────────────────────┐
//! │ TVLT  │ version │ nonce (12) │ ciphertext + GCM tag │
//! └───────┴─────────┴────────────┴──────────────────────┘
//! ```
//!
//! Authenticated encryption: a wrong key or any modified bit fails the tag
//! check and decryption returns an error instead of garbage plaintext.

use aes_gcm::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Aes256Gcm, Nonce,
};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use std::fmt;

/// Size of the encryption key in bytes (256 bits)
const KEY_SIZE: usize = 32;

/// Size of the nonce in bytes (96 bits, standard for GCM)
const NONCE_SIZE: usize = 12;

/// Magic bytes identifying an encrypted store blob
const MAGIC: &[u8; 4] = b"TVLT";

/// Current blob format version
const VERSION: u8 = 1;

/// Codec failures. `AuthenticationFailed` covers both a wrong key and a
/// tampered/corrupted blob; GCM cannot tell those apart.
#[derive(Debug)]
pub enum CodecError {
    /// Key is not valid base64 or not exactly 32 bytes when decoded
    InvalidKey(String),
    /// Input is not a recognizable encrypted store blob
    InvalidFormat(String),
    /// Integrity check failed: wrong key or modified ciphertext
    AuthenticationFailed,
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CodecError::InvalidKey(msg) => write!(f, "Invalid encryption key: {}", msg),
            CodecError::InvalidFormat(msg) => {
                write!(f, "Not a valid encrypted store blob: {}", msg)
            }
            CodecError::AuthenticationFailed => {
                write!(f, "Decryption failed: wrong key or corrupted data")
            }
        }
    }
}

impl std::error::Error for CodecError {}

/// Generates a fresh random 256-bit key, base64-encoded.
///
/// This key is the sole secret guarding the entire store. Save it somewhere
/// safe; there is no recovery path for a lost key.
pub fn generate_key() -> String {
    let key = Aes256Gcm::generate_key(&mut OsRng);
    BASE64.encode(key)
}

/// Validates that the master key is exactly 32 bytes when base64 decoded.
pub fn validate_key(key_base64: &str) -> Result<Vec<u8>, CodecError> {
    let key_bytes = BASE64
        .decode(key_base64)
        .map_err(|e| CodecError::InvalidKey(format!("not valid base64: {}", e)))?;

    if key_bytes.len() != KEY_SIZE {
        return Err(CodecError::InvalidKey(format!(
            "must be {} bytes (256 bits), got {}",
            KEY_SIZE,
            key_bytes.len()
        )));
    }

    Ok(key_bytes)
}

/// Encrypts the full store file under AES-256-GCM with a random nonce.
///
/// Each call generates a fresh nonce, so encrypting the same plaintext twice
/// produces different blobs. Both decrypt to the original bytes.
pub fn encrypt(plaintext: &[u8], key: &[u8]) -> Result<Vec<u8>, CodecError> {
    let cipher = cipher_for(key)?;

    let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

    let ciphertext = cipher
        .encrypt(&nonce, plaintext)
        .map_err(|e| CodecError::InvalidKey(format!("encryption failed: {}", e)))?;

    let mut blob = Vec::with_capacity(MAGIC.len() + 1 + NONCE_SIZE + ciphertext.len());
    blob.extend_from_slice(MAGIC);
    blob.push(VERSION);
    blob.extend_from_slice(nonce.as_slice());
    blob.extend_from_slice(&ciphertext);

    Ok(blob)
}

/// Decrypts a blob produced by [`encrypt`], recovering the exact original
/// bytes or failing. Never returns partial plaintext.
pub fn decrypt(blob: &[u8], key: &[u8]) -> Result<Vec<u8>, CodecError> {
    let cipher = cipher_for(key)?;

    let header_len = MAGIC.len() + 1 + NONCE_SIZE;
    if blob.len() < header_len {
        return Err(CodecError::InvalidFormat(format!(
            "too short: {} bytes, header alone is {}",
            blob.len(),
            header_len
        )));
    }

    if &blob[..MAGIC.len()] != MAGIC {
        return Err(CodecError::InvalidFormat("bad magic bytes".to_string()));
    }

    let version = blob[MAGIC.len()];
    if version != VERSION {
        return Err(CodecError::InvalidFormat(format!(
            "unsupported version {}",
            version
        )));
    }

    let nonce = Nonce::from_slice(&blob[MAGIC.len() + 1..header_len]);
    let ciphertext = &blob[header_len..];

    cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| CodecError::AuthenticationFailed)
}

fn cipher_for(key: &[u8]) -> Result<Aes256Gcm, CodecError> {
    if key.len() != KEY_SIZE {
        return Err(CodecError::InvalidKey(format!(
            "must be {} bytes, got {}",
            KEY_SIZE,
            key.len()
        )));
    }

    Aes256Gcm::new_from_slice(key)
        .map_err(|e| CodecError::InvalidKey(format!("failed to create cipher: {}", e)))
}
