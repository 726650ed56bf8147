//! RSA engine.
//!
//! Keys are handed over as PEM key pairs. Input longer than one RSA block is
//! split into chunks that fit the padding scheme; the ciphertext is the
//! concatenation of fixed-size blocks of the modulus length.
//!
//! Parsed key pairs are cached by the SHA-256 digest of their PEM text, so a
//! size check followed by an operation on the same key parses it once.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rand::rngs::OsRng;
use rsa::{Oaep, Pkcs1v15Encrypt, RsaPrivateKey, RsaPublicKey};
use sha2::{Digest, Sha256};

use super::{CipherKind, CipherParams, Engine, EngineError};
use crate::config::MAX_RSA_KEY_BITS;
use crate::keys::KeyPair;

/// RSA with PKCS#1 v1.5 padding, the historical key-wrapping cipher.
pub const RSA_PKCS1: &str = "rsa";

/// RSA with OAEP (SHA-256) padding.
pub const RSA_OAEP: &str = "rsa-oaep";

/// Parsed key pairs kept before the cache is flushed.
const KEY_CACHE_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Padding {
    Pkcs1,
    Oaep,
}

impl Padding {
    fn of(cipher: &str) -> Result<Self, EngineError> {
        match cipher {
            RSA_PKCS1 => Ok(Self::Pkcs1),
            RSA_OAEP => Ok(Self::Oaep),
            _ => Err(EngineError::unsupported("rsa", cipher)),
        }
    }

    /// Bytes of each block consumed by the padding.
    fn overhead(self) -> usize {
        match self {
            Self::Pkcs1 => 11,
            Self::Oaep => 2 * 32 + 2,
        }
    }

    fn seal(self, key: &RsaPublicKey, chunk: &[u8]) -> rsa::Result<Vec<u8>> {
        match self {
            Self::Pkcs1 => key.encrypt(&mut OsRng, Pkcs1v15Encrypt, chunk),
            Self::Oaep => key.encrypt(&mut OsRng, Oaep::new::<Sha256>(), chunk),
        }
    }

    fn open(self, key: &RsaPrivateKey, block: &[u8]) -> rsa::Result<Vec<u8>> {
        match self {
            Self::Pkcs1 => key.decrypt_blinded(&mut OsRng, Pkcs1v15Encrypt, block),
            Self::Oaep => key.decrypt_blinded(&mut OsRng, Oaep::new::<Sha256>(), block),
        }
    }
}

/// Asymmetric engine backed by the `rsa` crate.
pub struct RsaEngine {
    max_key_bytes: usize,
    parsed: RwLock<HashMap<[u8; 32], Arc<KeyPair>>>,
}

impl RsaEngine {
    /// An engine that accepts key pairs of up to `max_key_bits` bits.
    pub fn new(max_key_bits: usize) -> Self {
        Self {
            max_key_bytes: max_key_bits.div_ceil(8),
            parsed: RwLock::new(HashMap::new()),
        }
    }

    fn key_pair(&self, key: &[u8]) -> Result<Arc<KeyPair>, EngineError> {
        let digest: [u8; 32] = Sha256::digest(key).into();
        if let Some(pair) = self.parsed.read().get(&digest) {
            return Ok(Arc::clone(pair));
        }

        let pair = Arc::new(parse_key_pair(key)?);
        let mut parsed = self.parsed.write();
        if parsed.len() >= KEY_CACHE_CAPACITY {
            parsed.clear();
        }
        parsed.insert(digest, Arc::clone(&pair));
        Ok(pair)
    }

    #[cfg(test)]
    fn cached_pairs(&self) -> usize {
        self.parsed.read().len()
    }
}

impl fmt::Debug for RsaEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RsaEngine")
            .field("max_key_bytes", &self.max_key_bytes)
            .finish_non_exhaustive()
    }
}

impl Default for RsaEngine {
    fn default() -> Self {
        Self::new(MAX_RSA_KEY_BITS)
    }
}

fn parse_key_pair(key: &[u8]) -> Result<KeyPair, EngineError> {
    let pem = std::str::from_utf8(key)
        .map_err(|_| EngineError::new("key pair is not PEM text"))?;
    KeyPair::from_pem(pem).map_err(|e| EngineError::new(e.to_string()))
}

impl Engine for RsaEngine {
    fn name(&self) -> &'static str {
        "rsa"
    }

    fn url(&self) -> &'static str {
        "https://github.com/RustCrypto/RSA"
    }

    fn kind(&self) -> CipherKind {
        CipherKind::Asymmetric
    }

    fn list_ciphers(&self) -> Vec<CipherParams> {
        vec![
            CipherParams::new(RSA_PKCS1, self.max_key_bytes, 0, ""),
            CipherParams::new(RSA_OAEP, self.max_key_bytes, 0, ""),
        ]
    }

    fn key_size(&self, _cipher: &str, key: &[u8]) -> Result<usize, EngineError> {
        Ok(self.key_pair(key)?.size_bytes())
    }

    fn encrypt(
        &self,
        cipher: &str,
        key: &[u8],
        plaintext: &[u8],
        _iv: &[u8],
    ) -> Result<Vec<u8>, EngineError> {
        let padding = Padding::of(cipher)?;
        let pair = self.key_pair(key)?;
        let block_len = pair.size_bytes();
        let chunk_len = block_len.saturating_sub(padding.overhead());
        if chunk_len == 0 {
            return Err(EngineError::new(format!(
                "{}-bit key is too small for {cipher} padding",
                pair.bits()
            )));
        }

        let chunks: Vec<&[u8]> = if plaintext.is_empty() {
            vec![plaintext]
        } else {
            plaintext.chunks(chunk_len).collect()
        };
        let mut out = Vec::with_capacity(chunks.len() * block_len);
        for chunk in chunks {
            let block = padding
                .seal(pair.public_key(), chunk)
                .map_err(|e| EngineError::new(e.to_string()))?;
            out.extend_from_slice(&block);
        }
        Ok(out)
    }

    fn decrypt(
        &self,
        cipher: &str,
        key: &[u8],
        ciphertext: &[u8],
        _iv: &[u8],
    ) -> Result<Vec<u8>, EngineError> {
        let padding = Padding::of(cipher)?;
        let pair = self.key_pair(key)?;
        let block_len = pair.size_bytes();
        if ciphertext.is_empty() || ciphertext.len() % block_len != 0 {
            return Err(EngineError::new(format!(
                "ciphertext length {} is not a multiple of the {block_len}-byte RSA block",
                ciphertext.len()
            )));
        }

        let mut out = Vec::with_capacity(ciphertext.len());
        for block in ciphertext.chunks_exact(block_len) {
            let chunk = padding
                .open(pair.private_key(), block)
                .map_err(|e| EngineError::new(e.to_string()))?;
            out.extend_from_slice(&chunk);
        }
        Ok(out)
    }
}
