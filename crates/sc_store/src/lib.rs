//! sc_store — Local custody storage for Secure Chat private keys
//!
//! # Encryption strategy
//! SQLite does NOT natively encrypt.  We use application-level encryption:
//! - The private key column is AES-256-GCM ciphertext, base64-encoded.
//! - The vault key is derived from the user password via Argon2id and held
//!   in memory only while the vault is unlocked.
//! - Public keys and timestamps are stored in plaintext.
//!
//! # Migration
//! SQLx migrations in `migrations/` are run on first open.

pub mod db;
pub mod error;
pub mod key_store;
pub mod models;
pub mod vault;

pub use db::Store;
pub use error::StoreError;
pub use key_store::{MemoryKeyStore, PrivateKeyStore, SqliteKeyStore, StoredKey};
pub use vault::Vault;
