//! No-op engine. The `plain` cipher passes text through untouched and its
//! bodies are written unarmored, which makes cryptograms readable in tests.

use super::{CipherKind, CipherParams, Engine, EngineError};

/// Identifier of the no-op cipher.
pub const PLAIN_CIPHER: &str = "plain";

#[derive(Debug, Default, Clone, Copy)]
pub struct PlaintextEngine;

impl PlaintextEngine {
    pub fn new() -> Self {
        Self
    }

    fn check(&self, cipher: &str) -> Result<(), EngineError> {
        if cipher == PLAIN_CIPHER {
            Ok(())
        } else {
            Err(EngineError::unsupported(self.name(), cipher))
        }
    }
}

impl Engine for PlaintextEngine {
    fn name(&self) -> &'static str {
        "plaintext"
    }

    fn kind(&self) -> CipherKind {
        CipherKind::Symmetric
    }

    fn list_ciphers(&self) -> Vec<CipherParams> {
        vec![CipherParams::new(PLAIN_CIPHER, 0, 0, "")]
    }

    fn encrypt(
        &self,
        cipher: &str,
        _key: &[u8],
        plaintext: &[u8],
        _iv: &[u8],
    ) -> Result<Vec<u8>, EngineError> {
        self.check(cipher)?;
        Ok(plaintext.to_vec())
    }

    fn decrypt(
        &self,
        cipher: &str,
        _key: &[u8],
        ciphertext: &[u8],
        _iv: &[u8],
    ) -> Result<Vec<u8>, EngineError> {
        self.check(cipher)?;
        Ok(ciphertext.to_vec())
    }
}
