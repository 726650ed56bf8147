//! Pluggable cryptographic engines.
//!
//! An engine is a backend that provides the raw operations for one or more
//! named ciphers. The registry asks each engine which ciphers it offers and
//! dispatches to it by cipher identifier; engines hold no per-call state.

use serde::{Deserialize, Serialize};
use thiserror::Error;

mod aead;
mod asymmetric;
mod block;
mod plain;

pub use self::aead::AeadEngine;
pub use self::asymmetric::{RsaEngine, RSA_OAEP, RSA_PKCS1};
pub use self::block::BlockEngine;
pub use self::plain::{PlaintextEngine, PLAIN_CIPHER};

/// Whether a cipher uses one shared key or a key pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CipherKind {
    Symmetric,
    Asymmetric,
}

/// A cipher as advertised by its engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherParams {
    pub id: String,
    /// Key size in bytes. For asymmetric ciphers, the largest modulus.
    pub key_size: usize,
    pub iv_size: usize,
    /// Mode written into headlines (`cbc`, `gcm`, ...); empty when the
    /// cipher has none.
    pub mode: String,
}

impl CipherParams {
    pub fn new(id: &str, key_size: usize, iv_size: usize, mode: &str) -> Self {
        Self {
            id: id.to_string(),
            key_size,
            iv_size,
            mode: mode.to_string(),
        }
    }
}

/// Failure reported by an engine. The message is the engine's diagnostic.
#[derive(Debug, Clone, Error)]
#[error("{0}")]
pub struct EngineError(pub String);

impl EngineError {
    pub fn new(msg: impl Into<String>) -> Self {
        Self(msg.into())
    }

    pub(crate) fn unsupported(engine: &str, cipher: &str) -> Self {
        Self(format!("engine {engine} does not provide cipher {cipher}"))
    }
}

/// The operation table every engine implements.
pub trait Engine: Send + Sync {
    /// Unique engine name.
    fn name(&self) -> &'static str;

    /// Where the backing implementation lives.
    fn url(&self) -> &'static str {
        ""
    }

    fn kind(&self) -> CipherKind;

    /// One-time setup and self test, run when the engine is registered.
    fn init(&self) -> Result<(), EngineError> {
        Ok(())
    }

    /// Ciphers this engine provides.
    fn list_ciphers(&self) -> Vec<CipherParams>;

    /// Effective size of the supplied key material, compared against the
    /// declared key size. For asymmetric engines `key` is a PEM key pair.
    fn key_size(&self, _cipher: &str, key: &[u8]) -> Result<usize, EngineError> {
        Ok(key.len())
    }

    fn iv_size(&self, cipher: &str) -> Result<usize, EngineError> {
        self.list_ciphers()
            .into_iter()
            .find(|params| params.id == cipher)
            .map(|params| params.iv_size)
            .ok_or_else(|| EngineError::unsupported(self.name(), cipher))
    }

    fn encrypt(
        &self,
        cipher: &str,
        key: &[u8],
        plaintext: &[u8],
        iv: &[u8],
    ) -> Result<Vec<u8>, EngineError>;

    fn decrypt(
        &self,
        cipher: &str,
        key: &[u8],
        ciphertext: &[u8],
        iv: &[u8],
    ) -> Result<Vec<u8>, EngineError>;
}
