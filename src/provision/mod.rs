//! Administrative store lifecycle: whole-file encrypt/decrypt with the
//! operational guard rails the codec itself does not enforce.
//!
//! These operations run from the CLI, outside the live issuance path, so the
//! error type here is `anyhow` with context; misconfiguration is fatal, not
//! something a caller branches on.

use crate::codec;
use anyhow::{bail, Context, Result};
use std::fs;
use std::path::Path;
use tracing::info;

/// Environment variable holding the base64 store encryption key.
/// Required for encrypt/decrypt; there is deliberately no default.
pub const DB_KEY_ENV: &str = "TOKENVAULT_DB_KEY";

/// Reads the store encryption key from the environment.
///
/// A missing key is a fatal misconfiguration, surfaced immediately rather
/// than deferred into a confusing codec failure.
pub fn require_db_key() -> Result<String> {
    require_db_key_from(|key| std::env::var(key).ok())
}

/// Key lookup with an injected source, so tests don't mutate process-global
/// environment state.
pub fn require_db_key_from(get: impl Fn(&str) -> Option<String>) -> Result<String> {
    get(DB_KEY_ENV).with_context(|| format!("{} is not set", DB_KEY_ENV))
}

/// Seals the plaintext store into an encrypted blob.
///
/// Guard rails:
/// - refuses when the plaintext store does not exist (nothing to seal)
/// - removes the plaintext after writing the blob unless `keep_plaintext`,
///   so the two forms do not coexist in the distributed layout
pub fn encrypt_store(
    db_path: &Path,
    enc_path: &Path,
    key_base64: &str,
    keep_plaintext: bool,
) -> Result<()> {
    if !db_path.exists() {
        bail!("Plaintext store {} not found, nothing to encrypt", db_path.display());
    }

    let key = codec::validate_key(key_base64)?;

    let plaintext = fs::read(db_path)
        .with_context(|| format!("Failed to read {}", db_path.display()))?;

    let blob = codec::encrypt(&plaintext, &key)?;

    fs::write(enc_path, blob)
        .with_context(|| format!("Failed to write {}", enc_path.display()))?;

    if !keep_plaintext {
        fs::remove_file(db_path)
            .with_context(|| format!("Failed to remove plaintext {}", db_path.display()))?;
    }

    info!(
        store = %db_path.display(),
        blob = %enc_path.display(),
        kept_plaintext = keep_plaintext,
        "Store encrypted"
    );
    Ok(())
}

/// Restores the plaintext store from an encrypted blob.
///
/// Guard rails:
/// - refuses when the blob does not exist
/// - refuses when a plaintext store already exists at the target, so a live
///   generation of secrets is never silently overwritten
pub fn decrypt_store(enc_path: &Path, db_path: &Path, key_base64: &str) -> Result<()> {
    if !enc_path.exists() {
        bail!("Encrypted store {} not found", enc_path.display());
    }

    if db_path.exists() {
        bail!(
            "Plaintext store {} already exists; move it aside before decrypting",
            db_path.display()
        );
    }

    let key = codec::validate_key(key_base64)?;

    let blob = fs::read(enc_path)
        .with_context(|| format!("Failed to read {}", enc_path.display()))?;

    let plaintext = codec::decrypt(&blob, &key)
        .with_context(|| format!("Failed to decrypt {}", enc_path.display()))?;

    fs::write(db_path, plaintext)
        .with_context(|| format!("Failed to write {}", db_path.display()))?;

    info!(
        blob = %enc_path.display(),
        store = %db_path.display(),
        "Store decrypted"
    );
    Ok(())
}
