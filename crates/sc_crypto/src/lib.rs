//! sc_crypto — Secure Chat message cryptography
//!
//! # Design principles
//! - NO custom crypto; all primitives come from audited Rust crates.
//! - Zeroize all secret material on drop.
//! - Every IV is drawn fresh inside the encrypting call; no API accepts one.
//!
//! # Module layout
//! - `keys`        — per-user X25519 keypair, per-message symmetric key
//! - `envelope`    — seal/open a message for a set of recipients
//! - `attachment`  — seal/open binary payloads under a message key
//! - `wrap`        — wrap a message key to one recipient public key
//! - `aead`        — AES-256-GCM helpers
//! - `kdf`         — HKDF / Argon2id key derivation
//! - `random`      — OS randomness, `CryptoUnavailable` on failure
//! - `error`       — unified error type

pub mod aead;
pub mod attachment;
pub mod envelope;
pub mod error;
pub mod kdf;
pub mod keys;
pub mod random;
pub mod wrap;

pub use attachment::{AttachmentEncryption, SealedAttachment};
pub use envelope::{Envelope, Opened, Recipient, RecipientKey, Sealed};
pub use error::CryptoError;
pub use keys::{KeyPair, MessageKey, PrivateKey, PublicKey};
