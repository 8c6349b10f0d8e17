//! Symmetric encryption for broker credentials at rest.
//!
//! The AES-256-GCM key is loaded once from `LEDGER_ENCRYPTION_KEY`
//! (base64, 32 bytes) and held in a process-wide singleton. A key that is
//! unset, undecodable, or the wrong length is a startup-time fatal error;
//! the process never degrades to running without the vault.

use std::sync::OnceLock;

use aes_gcm::aead::{Aead, KeyInit, generic_array::GenericArray};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use thiserror::Error;

pub const KEY_ENV_VAR: &str = "LEDGER_ENCRYPTION_KEY";

const KEY_LENGTH: usize = 32;
const NONCE_LENGTH: usize = 12;

static CIPHER: OnceLock<Aes256Gcm> = OnceLock::new();

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("{KEY_ENV_VAR} is not set")]
    KeyMissing,

    #[error("{KEY_ENV_VAR} is not valid base64")]
    KeyNotBase64,

    #[error("{KEY_ENV_VAR} must decode to exactly {KEY_LENGTH} bytes, got {0}")]
    KeyWrongLength(usize),

    #[error("ciphertext is malformed")]
    MalformedCiphertext,

    #[error("encryption failed")]
    Encrypt,

    #[error("decryption failed (wrong key or corrupted data)")]
    Decrypt,
}

/// Load the key from the environment and cache the cipher.
///
/// Call once at startup. A missing, undecodable, or wrong-length key is an
/// error the caller must treat as fatal.
pub fn init_from_env() -> Result<(), CryptoError> {
    let encoded = std::env::var(KEY_ENV_VAR).map_err(|_| CryptoError::KeyMissing)?;
    let bytes = BASE64
        .decode(encoded.trim())
        .map_err(|_| CryptoError::KeyNotBase64)?;
    if bytes.len() != KEY_LENGTH {
        return Err(CryptoError::KeyWrongLength(bytes.len()));
    }

    CIPHER.get_or_init(|| Aes256Gcm::new(GenericArray::from_slice(&bytes)));
    Ok(())
}

fn cipher() -> Result<&'static Aes256Gcm, CryptoError> {
    CIPHER.get().ok_or(CryptoError::KeyMissing)
}

/// Encrypt a secret, returning `base64(nonce[12] || ciphertext || tag[16])`.
pub fn encrypt_secret(plaintext: &str) -> Result<String, CryptoError> {
    let cipher = cipher()?;

    use rand::Rng;
    let nonce_bytes: [u8; NONCE_LENGTH] = rand::rng().random();
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|_| CryptoError::Encrypt)?;

    let mut out = Vec::with_capacity(NONCE_LENGTH + ciphertext.len());
    out.extend_from_slice(&nonce_bytes);
    out.extend_from_slice(&ciphertext);
    Ok(BASE64.encode(out))
}

/// Decrypt a token produced by [`encrypt_secret`].
pub fn decrypt_secret(encoded: &str) -> Result<String, CryptoError> {
    let cipher = cipher()?;

    let data = BASE64
        .decode(encoded)
        .map_err(|_| CryptoError::MalformedCiphertext)?;
    if data.len() < NONCE_LENGTH + 16 {
        return Err(CryptoError::MalformedCiphertext);
    }

    let nonce = Nonce::from_slice(&data[..NONCE_LENGTH]);
    let plaintext = cipher
        .decrypt(nonce, &data[NONCE_LENGTH..])
        .map_err(|_| CryptoError::Decrypt)?;

    String::from_utf8(plaintext).map_err(|_| CryptoError::Decrypt)
}

/// Generate a fresh key in the encoding `init_from_env` expects.
pub fn generate_key() -> String {
    use rand::Rng;
    let bytes: [u8; KEY_LENGTH] = rand::rng().random();
    BASE64.encode(bytes)
}
