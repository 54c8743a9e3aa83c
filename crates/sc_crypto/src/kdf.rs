//! Key derivation functions
//!
//! `vault_key_from_password`: Argon2id, derives the 32-byte key that
//!   encrypts private keys at rest in the local store.
//!
//! `wrap_key_from_dh`: HKDF-SHA256 over an X25519 shared secret, yields the
//!   key-encryption key used to wrap a message key for one recipient.

use argon2::{Argon2, Params, Version};
use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{ZeroizeOnDrop, Zeroizing};

use crate::{error::CryptoError, random};

// ── Vault key (Argon2id) ──────────────────────────────────────────────────────

/// 32-byte vault key derived from user password. Zeroized on drop.
#[derive(ZeroizeOnDrop)]
pub struct VaultKey(pub [u8; 32]);

pub const SALT_LEN: usize = 16;

/// Argon2id parameters, tuned for interactive (desktop) use.
fn argon2_params() -> Result<Params, CryptoError> {
    Params::new(
        64 * 1024, // m_cost: 64 MiB
        3,         // t_cost: 3 iterations
        1,         // p_cost: 1 thread
        Some(32),  // output len
    )
    .map_err(|e| CryptoError::KeyDerivation(e.to_string()))
}

/// Derive a vault key from a user password + 16-byte salt.
/// The salt is stored alongside the encrypted data (not secret).
pub fn vault_key_from_password(password: &[u8], salt: &[u8; SALT_LEN]) -> Result<VaultKey, CryptoError> {
    let argon2 = Argon2::new(argon2::Algorithm::Argon2id, Version::V0x13, argon2_params()?);
    let mut output = [0u8; 32];
    argon2
        .hash_password_into(password, salt, &mut output)
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(VaultKey(output))
}

/// Generate a fresh random salt (call once on first run; store in DB).
pub fn generate_salt() -> Result<[u8; SALT_LEN], CryptoError> {
    random::array::<SALT_LEN>()
}

// ── HKDF-SHA256 ───────────────────────────────────────────────────────────────

const WRAP_SALT: &[u8] = b"sc-secure-chat-v1";
const WRAP_INFO: &[u8] = b"sc-key-wrap-v1";

/// KEK = HKDF(salt, ikm = dh, info = "sc-key-wrap-v1" || eph_pub || recipient_pub)
pub fn wrap_key_from_dh(
    dh_output: &[u8; 32],
    ephemeral_pub: &[u8; 32],
    recipient_pub: &[u8; 32],
) -> Result<Zeroizing<[u8; 32]>, CryptoError> {
    let mut info = Vec::with_capacity(WRAP_INFO.len() + 64);
    info.extend_from_slice(WRAP_INFO);
    info.extend_from_slice(ephemeral_pub);
    info.extend_from_slice(recipient_pub);

    let hk = Hkdf::<Sha256>::new(Some(WRAP_SALT), dh_output);
    let mut kek = Zeroizing::new([0u8; 32]);
    hk.expand(&info, &mut kek[..])
        .map_err(|e| CryptoError::KeyDerivation(e.to_string()))?;
    Ok(kek)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wrap_key_depends_on_every_input() {
        let base = wrap_key_from_dh(&[1; 32], &[2; 32], &[3; 32]).unwrap();
        assert_ne!(*base, *wrap_key_from_dh(&[9; 32], &[2; 32], &[3; 32]).unwrap());
        assert_ne!(*base, *wrap_key_from_dh(&[1; 32], &[9; 32], &[3; 32]).unwrap());
        assert_ne!(*base, *wrap_key_from_dh(&[1; 32], &[2; 32], &[9; 32]).unwrap());
    }

    #[test]
    fn vault_key_is_deterministic_per_salt() {
        let salt = [4u8; SALT_LEN];
        let a = vault_key_from_password(b"hunter2", &salt).unwrap();
        let b = vault_key_from_password(b"hunter2", &salt).unwrap();
        let c = vault_key_from_password(b"hunter2", &[5u8; SALT_LEN]).unwrap();
        assert_eq!(a.0, b.0);
        assert_ne!(a.0, c.0);
    }
}
