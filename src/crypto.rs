//! Low-level randomness and digest helpers.
//!
//! This module is the only place in the crate that imports `ring`. Every
//! symmetric key, IV and salt is drawn from `SystemRandom` here; nothing in
//! the crate gathers its own entropy.

use ring::digest;
use ring::rand::{SecureRandom, SystemRandom};
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};

/// Size of the salt appended to every wrapped symmetric key.
pub const SALT_LEN: usize = 8;

/// Fill a fresh buffer of `len` bytes from the system CSPRNG.
///
/// The buffer is zeroised on drop since it usually holds key material.
pub fn random_bytes(len: usize) -> CryptoResult<Zeroizing<Vec<u8>>> {
    let mut buf = Zeroizing::new(vec![0u8; len]);
    if len == 0 {
        return Ok(buf);
    }
    SystemRandom::new()
        .fill(&mut buf)
        .map_err(|_| CryptoError::RandomnessFailure)?;
    Ok(buf)
}

/// Generate a random salt for the wrapped key block.
pub fn generate_salt() -> CryptoResult<Zeroizing<Vec<u8>>> {
    random_bytes(SALT_LEN)
}

/// SHA-1 over `data`. Only used for RFC 2440 style key fingerprints, which
/// are identifiers, not a security boundary.
pub fn legacy_fingerprint(data: &[u8]) -> Vec<u8> {
    digest::digest(&digest::SHA1_FOR_LEGACY_USE_ONLY, data)
        .as_ref()
        .to_vec()
}
