//! Database row models mapped to/from SQL rows.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct VaultMetaRow {
    pub id: i64,
    /// Hex-encoded 16-byte Argon2id salt
    pub salt_hex: String,
    /// Vault-encrypted known constant, used to reject a wrong password early
    pub check_enc: String,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PrivateKeyRow {
    pub user_id: String,
    /// Base64 X25519 public key
    pub public_key: String,
    /// Encrypted (vault) X25519 secret key
    pub secret_enc: String,
    pub created_at: DateTime<Utc>,
}
