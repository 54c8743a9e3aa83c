use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Vault is locked; unlock with password first")]
    VaultLocked,

    #[error("Wrong vault password")]
    WrongPassword,

    #[error("Crypto error: {0}")]
    Crypto(#[from] sc_crypto::CryptoError),

    #[error("Corrupt record: {0}")]
    Corrupt(String),

    #[error("Migration error: {0}")]
    Migration(String),
}
