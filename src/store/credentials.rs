//! Encrypted broker-credential storage. Secrets are AES-GCM tokens produced
//! by [`crate::crypto`]; plaintext never reaches the database.

use rusqlite::{Connection, OptionalExtension, params};

use crate::context::Ctx;
use crate::crypto::{self, CryptoError};

#[derive(Debug, thiserror::Error)]
pub enum CredentialError {
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error("database error: {0}")]
    Db(#[from] rusqlite::Error),

    #[error("no credential stored for provider `{0}`")]
    NotFound(String),
}

pub fn save_credential(
    conn: &Connection,
    ctx: &Ctx,
    provider: &str,
    secret: &str,
) -> Result<(), CredentialError> {
    let encrypted = crypto::encrypt_secret(secret)?;
    conn.execute(
        "INSERT INTO user_credentials (user_id, provider, encrypted_secret)
         VALUES (?1, ?2, ?3)
         ON CONFLICT (user_id, provider) DO UPDATE SET encrypted_secret = excluded.encrypted_secret",
        params![ctx.user_id, provider, encrypted],
    )?;
    Ok(())
}

pub fn load_credential(
    conn: &Connection,
    ctx: &Ctx,
    provider: &str,
) -> Result<String, CredentialError> {
    let encrypted: Option<String> = conn
        .query_row(
            "SELECT encrypted_secret FROM user_credentials
             WHERE user_id = ?1 AND provider = ?2",
            params![ctx.user_id, provider],
            |row| row.get(0),
        )
        .optional()?;

    let encrypted = encrypted.ok_or_else(|| CredentialError::NotFound(provider.to_string()))?;
    Ok(crypto::decrypt_secret(&encrypted)?)
}

pub fn delete_credential(
    conn: &Connection,
    ctx: &Ctx,
    provider: &str,
) -> Result<bool, CredentialError> {
    let changed = conn.execute(
        "DELETE FROM user_credentials WHERE user_id = ?1 AND provider = ?2",
        params![ctx.user_id, provider],
    )?;
    Ok(changed > 0)
}
