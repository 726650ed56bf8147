//! Raw encrypt/decrypt by cipher identifier.
//!
//! [`Cipher`] looks the cipher up in the registry, checks the supplied key
//! and IV against the declared sizes, and dispatches to the engine. It knows
//! nothing about headers, armor or key stores.

use std::fmt;
use std::sync::Arc;

use tracing::warn;
use zeroize::Zeroizing;

use crate::crypto;
use crate::engine::Engine;
use crate::error::{CryptoError, CryptoResult};
use crate::registry::{CipherRegistry, CipherSpec};

/// Output of [`Cipher::encrypt`].
pub struct Enciphered {
    /// Identifier of the cipher that was used.
    pub cipher: String,
    pub ciphertext: Vec<u8>,
    /// The symmetric key actually used, at its declared size. Empty for
    /// asymmetric ciphers.
    pub key: Zeroizing<Vec<u8>>,
    /// The IV actually used. Empty when the cipher takes none.
    pub iv: Zeroizing<Vec<u8>>,
}

impl fmt::Debug for Enciphered {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Enciphered")
            .field("cipher", &self.cipher)
            .field("ciphertext_len", &self.ciphertext.len())
            .field("key_len", &self.key.len())
            .field("iv_len", &self.iv.len())
            .finish()
    }
}

#[derive(Clone, Copy)]
enum Material {
    Key,
    Iv,
}

#[derive(Clone, Copy)]
enum Direction {
    Encrypt,
    Decrypt,
}

impl Direction {
    fn fail(self, cipher: &str, reason: impl fmt::Display) -> CryptoError {
        match self {
            Self::Encrypt => CryptoError::EncryptionFailed(format!("{cipher}: {reason}")),
            Self::Decrypt => CryptoError::DecryptionFailed(format!("{cipher}: {reason}")),
        }
    }
}

/// Cipher façade over a shared registry.
#[derive(Clone)]
pub struct Cipher {
    registry: Arc<CipherRegistry>,
}

impl Cipher {
    pub fn new(registry: Arc<CipherRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &CipherRegistry {
        &self.registry
    }

    /// Encrypt `plaintext` with a cipher enabled for encryption.
    ///
    /// Symmetric ciphers draw a random key and IV of the declared sizes when
    /// none is supplied. For asymmetric ciphers `key` is a PEM key pair and
    /// `iv` is ignored.
    pub fn encrypt(
        &self,
        cipher_id: &str,
        key: Option<&[u8]>,
        plaintext: &[u8],
        iv: Option<&[u8]>,
    ) -> CryptoResult<Enciphered> {
        let spec = self.registry.require(cipher_id)?;
        if !self.registry.is_usable_for_encryption(&spec.id) {
            return Err(CryptoError::CipherNotEncryptable(spec.id.clone()));
        }
        self.encrypt_with(spec, key, plaintext, iv)
    }

    /// Encrypt with any registered cipher, enabled for encryption or not.
    /// Used to wrap symmetric keys with the configured key cipher.
    pub(crate) fn wrap(
        &self,
        cipher_id: &str,
        key: &[u8],
        plaintext: &[u8],
    ) -> CryptoResult<Vec<u8>> {
        let spec = self.registry.require(cipher_id)?;
        Ok(self.encrypt_with(spec, Some(key), plaintext, None)?.ciphertext)
    }

    /// Decrypt with any registered cipher.
    pub fn decrypt(
        &self,
        cipher_id: &str,
        key: &[u8],
        ciphertext: &[u8],
        iv: &[u8],
    ) -> CryptoResult<Vec<u8>> {
        let spec = self.registry.require(cipher_id)?;
        let engine = self.registry.engine_for(spec)?;
        let direction = Direction::Decrypt;

        if spec.is_asymmetric() {
            self.check_key_pair(engine.as_ref(), spec, key, direction)?;
            return engine
                .decrypt(&spec.id, key, ciphertext, &[])
                .map_err(|e| direction.fail(&spec.id, e));
        }

        let key = fit(spec, engine.as_ref(), Material::Key, key, direction)?;
        let iv = fit(spec, engine.as_ref(), Material::Iv, iv, direction)?;
        engine
            .decrypt(&spec.id, &key, ciphertext, &iv)
            .map_err(|e| direction.fail(&spec.id, e))
    }

    fn encrypt_with(
        &self,
        spec: &CipherSpec,
        key: Option<&[u8]>,
        plaintext: &[u8],
        iv: Option<&[u8]>,
    ) -> CryptoResult<Enciphered> {
        let engine = self.registry.engine_for(spec)?;
        let direction = Direction::Encrypt;

        if spec.is_asymmetric() {
            let key = key.ok_or_else(|| direction.fail(&spec.id, "no key pair supplied"))?;
            self.check_key_pair(engine.as_ref(), spec, key, direction)?;
            let ciphertext = engine
                .encrypt(&spec.id, key, plaintext, &[])
                .map_err(|e| direction.fail(&spec.id, e))?;
            return Ok(Enciphered {
                cipher: spec.id.clone(),
                ciphertext,
                key: Zeroizing::new(Vec::new()),
                iv: Zeroizing::new(Vec::new()),
            });
        }

        let key = match key {
            Some(key) => fit(spec, engine.as_ref(), Material::Key, key, direction)?,
            None => crypto::random_bytes(spec.key_size)?,
        };
        let iv = match iv {
            Some(iv) => fit(spec, engine.as_ref(), Material::Iv, iv, direction)?,
            None => crypto::random_bytes(spec.iv_size)?,
        };
        let ciphertext = engine
            .encrypt(&spec.id, &key, plaintext, &iv)
            .map_err(|e| direction.fail(&spec.id, e))?;
        Ok(Enciphered {
            cipher: spec.id.clone(),
            ciphertext,
            key,
            iv,
        })
    }

    /// The modulus of a PEM key pair must fit the declared size.
    fn check_key_pair(
        &self,
        engine: &dyn Engine,
        spec: &CipherSpec,
        key: &[u8],
        direction: Direction,
    ) -> CryptoResult<()> {
        let actual = engine
            .key_size(&spec.id, key)
            .map_err(|e| direction.fail(&spec.id, e))?;
        if actual > spec.key_size {
            return Err(CryptoError::KeyTooLarge {
                cipher: spec.id.clone(),
                actual,
                limit: spec.key_size,
            });
        }
        Ok(())
    }
}

impl fmt::Debug for Cipher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Cipher").finish_non_exhaustive()
    }
}

/// Bring supplied key or IV material to the declared size.
///
/// Oversized material is rejected. Undersized material is zero-padded on the
/// right, which is what earlier releases did implicitly inside the engines.
fn fit(
    spec: &CipherSpec,
    engine: &dyn Engine,
    material: Material,
    supplied: &[u8],
    direction: Direction,
) -> CryptoResult<Zeroizing<Vec<u8>>> {
    let (actual, limit) = match material {
        Material::Key => (
            engine
                .key_size(&spec.id, supplied)
                .map_err(|e| direction.fail(&spec.id, e))?,
            spec.key_size,
        ),
        Material::Iv => (supplied.len(), spec.iv_size),
    };
    if actual > limit {
        let cipher = spec.id.clone();
        return Err(match material {
            Material::Key => CryptoError::KeyTooLarge {
                cipher,
                actual,
                limit,
            },
            Material::Iv => CryptoError::IvTooLarge {
                cipher,
                actual,
                limit,
            },
        });
    }

    let mut fitted = Zeroizing::new(supplied.to_vec());
    if fitted.len() < limit {
        warn!(
            cipher = %spec.id,
            material = match material {
                Material::Key => "key",
                Material::Iv => "iv",
            },
            supplied = fitted.len(),
            declared = limit,
            "short material zero-padded to declared size"
        );
        fitted.resize(limit, 0);
    }
    Ok(fitted)
}
