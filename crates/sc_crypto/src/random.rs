//! OS randomness with failure surfaced as `CryptoUnavailable`.
//!
//! Every key and IV in this crate is drawn through here; there is no API
//! that accepts a caller-supplied IV for encryption.

use rand::{rngs::OsRng, RngCore};

use crate::error::CryptoError;

pub fn fill(buf: &mut [u8]) -> Result<(), CryptoError> {
    OsRng
        .try_fill_bytes(buf)
        .map_err(|e| CryptoError::CryptoUnavailable(e.to_string()))
}

pub fn array<const N: usize>() -> Result<[u8; N], CryptoError> {
    let mut out = [0u8; N];
    fill(&mut out)?;
    Ok(out)
}

/// Check the random source once. Used at session start to decide whether
/// encryption features can be offered at all.
pub fn is_available() -> bool {
    array::<16>().is_ok()
}
