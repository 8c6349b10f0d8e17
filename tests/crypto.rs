//! Credential-vault round trip against the env-loaded key.
//!
//! The cipher is a process-wide singleton, so everything runs in one test:
//! key setup must happen exactly once per process.

mod common;

use common::{ctx, test_db};

use trade_ledger::crypto;
use trade_ledger::store::credentials;

#[test]
fn vault_round_trip_with_env_key() {
    // SAFETY: single-threaded at this point; the env var is settled before
    // the cipher singleton initializes.
    unsafe { std::env::remove_var(crypto::KEY_ENV_VAR) };
    assert!(matches!(
        crypto::init_from_env(),
        Err(crypto::CryptoError::KeyMissing)
    ));

    unsafe { std::env::set_var(crypto::KEY_ENV_VAR, crypto::generate_key()) };
    crypto::init_from_env().expect("valid key");

    // Encrypt/decrypt round trip; ciphertext must not leak the plaintext.
    let token = crypto::encrypt_secret("refresh-token-123").unwrap();
    assert!(!token.contains("refresh-token-123"));
    assert_eq!(crypto::decrypt_secret(&token).unwrap(), "refresh-token-123");

    // Distinct nonces: same plaintext, different ciphertext.
    let token2 = crypto::encrypt_secret("refresh-token-123").unwrap();
    assert_ne!(token, token2);

    // Tampered ciphertext fails to authenticate.
    let mut tampered = token.clone();
    tampered.truncate(tampered.len() - 4);
    assert!(crypto::decrypt_secret(&tampered).is_err());

    // Stored credentials are encrypted at rest.
    let conn = test_db();
    let ctx = ctx();
    credentials::save_credential(&conn, &ctx, "broker", "super-secret").unwrap();

    let raw: String = conn
        .query_row(
            "SELECT encrypted_secret FROM user_credentials WHERE provider = 'broker'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert!(!raw.contains("super-secret"));

    assert_eq!(
        credentials::load_credential(&conn, &ctx, "broker").unwrap(),
        "super-secret"
    );

    // Upsert replaces, delete removes.
    credentials::save_credential(&conn, &ctx, "broker", "rotated").unwrap();
    assert_eq!(
        credentials::load_credential(&conn, &ctx, "broker").unwrap(),
        "rotated"
    );
    assert!(credentials::delete_credential(&conn, &ctx, "broker").unwrap());
    assert!(matches!(
        credentials::load_credential(&conn, &ctx, "broker"),
        Err(credentials::CredentialError::NotFound(_))
    ));
}
