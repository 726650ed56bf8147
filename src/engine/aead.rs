//! Authenticated stream and block ciphers.
//!
//! The IV column of the registry is the AEAD nonce. The authentication tag
//! is appended to the ciphertext, so a tampered body fails to decrypt instead
//! of producing garbage.

use aes_gcm::Aes256Gcm;
use chacha20poly1305::ChaCha20Poly1305;

use super::{CipherKind, CipherParams, Engine, EngineError};

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

/// AEAD engine providing AES-256-GCM and ChaCha20-Poly1305.
#[derive(Debug, Default, Clone, Copy)]
pub struct AeadEngine;

impl AeadEngine {
    pub fn new() -> Self {
        Self
    }
}

fn check_lengths(key: &[u8], nonce: &[u8]) -> Result<(), EngineError> {
    if key.len() != KEY_LEN {
        return Err(EngineError::new(format!(
            "key must be {KEY_LEN} bytes, got {}",
            key.len()
        )));
    }
    if nonce.len() != NONCE_LEN {
        return Err(EngineError::new(format!(
            "nonce must be {NONCE_LEN} bytes, got {}",
            nonce.len()
        )));
    }
    Ok(())
}

fn gcm_seal(key: &[u8], nonce: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, EngineError> {
    use aes_gcm::aead::{Aead, KeyInit};

    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EngineError::new("invalid key"))?;
    cipher
        .encrypt(aes_gcm::Nonce::from_slice(nonce), plaintext)
        .map_err(|_| EngineError::new("AES-GCM encryption failed"))
}

fn gcm_open(key: &[u8], nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, EngineError> {
    use aes_gcm::aead::{Aead, KeyInit};

    let cipher = Aes256Gcm::new_from_slice(key).map_err(|_| EngineError::new("invalid key"))?;
    cipher
        .decrypt(aes_gcm::Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| EngineError::new("authentication failed (wrong key or tampered data)"))
}

fn chacha_seal(key: &[u8], nonce: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, EngineError> {
    use chacha20poly1305::aead::{Aead, KeyInit};

    let cipher =
        ChaCha20Poly1305::new_from_slice(key).map_err(|_| EngineError::new("invalid key"))?;
    cipher
        .encrypt(chacha20poly1305::Nonce::from_slice(nonce), plaintext)
        .map_err(|_| EngineError::new("ChaCha20-Poly1305 encryption failed"))
}

fn chacha_open(key: &[u8], nonce: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, EngineError> {
    use chacha20poly1305::aead::{Aead, KeyInit};

    let cipher =
        ChaCha20Poly1305::new_from_slice(key).map_err(|_| EngineError::new("invalid key"))?;
    cipher
        .decrypt(chacha20poly1305::Nonce::from_slice(nonce), ciphertext)
        .map_err(|_| EngineError::new("authentication failed (wrong key or tampered data)"))
}

impl Engine for AeadEngine {
    fn name(&self) -> &'static str {
        "aead"
    }

    fn url(&self) -> &'static str {
        "https://github.com/RustCrypto/AEADs"
    }

    fn kind(&self) -> CipherKind {
        CipherKind::Symmetric
    }

    fn list_ciphers(&self) -> Vec<CipherParams> {
        vec![
            CipherParams::new("aes-256-gcm", KEY_LEN, NONCE_LEN, "gcm"),
            CipherParams::new("chacha20-poly1305", KEY_LEN, NONCE_LEN, "poly1305"),
        ]
    }

    fn encrypt(
        &self,
        cipher: &str,
        key: &[u8],
        plaintext: &[u8],
        iv: &[u8],
    ) -> Result<Vec<u8>, EngineError> {
        check_lengths(key, iv)?;
        match cipher {
            "aes-256-gcm" => gcm_seal(key, iv, plaintext),
            "chacha20-poly1305" => chacha_seal(key, iv, plaintext),
            _ => Err(EngineError::unsupported(self.name(), cipher)),
        }
    }

    fn decrypt(
        &self,
        cipher: &str,
        key: &[u8],
        ciphertext: &[u8],
        iv: &[u8],
    ) -> Result<Vec<u8>, EngineError> {
        check_lengths(key, iv)?;
        match cipher {
            "aes-256-gcm" => gcm_open(key, iv, ciphertext),
            "chacha20-poly1305" => chacha_open(key, iv, ciphertext),
            _ => Err(EngineError::unsupported(self.name(), cipher)),
        }
    }
}
