//! Hybrid encryption protocol.
//!
//! ## Encrypt
//!
//! Symmetric body cipher: the body is encrypted under a fresh random key and
//! IV. `key ‖ iv ‖ salt` is then wrapped with the default key pair using the
//! key cipher, and the header records both ciphers, the default key's ID and
//! the key and IV sizes needed to slice the unwrapped blob.
//!
//! Asymmetric body cipher: the body is encrypted directly with the lite key
//! pair and there is no key blob.
//!
//! ## Decrypt
//!
//! The header names the key pair by ID, so cryptograms wrapped by a retired
//! default key still open as long as its PEM file is in the key directory.
//! Headerless cryptograms are single PKCS#1 RSA blobs, tried against the
//! compat key and then the default key.
//!
//! Every call is independent. An `Encryptor` is cheap to clone and can be
//! shared between threads.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::cipher::Cipher;
use crate::codec::{self, Cryptogram, Header};
use crate::crypto;
use crate::engine::RSA_PKCS1;
use crate::error::{CryptoError, CryptoResult};
use crate::keys::KeyPair;
use crate::keystore::KeyStore;
use crate::registry::{normalize_cipher_name, CipherRegistry, CipherSpec};

/// Cipher of headerless cryptograms.
const LEGACY_CIPHER: &str = RSA_PKCS1;

#[derive(Clone)]
pub struct Encryptor {
    cipher: Cipher,
    keys: Arc<KeyStore>,
    key_cipher: String,
}

impl Encryptor {
    /// An encryptor wrapping symmetric keys with PKCS#1 RSA.
    pub fn new(registry: Arc<CipherRegistry>, keys: Arc<KeyStore>) -> Self {
        Self {
            cipher: Cipher::new(registry),
            keys,
            key_cipher: RSA_PKCS1.to_string(),
        }
    }

    /// Use `cipher` to wrap symmetric keys. It must be a registered
    /// asymmetric cipher; [`verify`](Self::verify) checks this.
    pub fn with_key_cipher(mut self, cipher: &str) -> Self {
        self.key_cipher = normalize_cipher_name(cipher);
        self
    }

    pub fn key_cipher(&self) -> &str {
        &self.key_cipher
    }

    pub fn registry(&self) -> &CipherRegistry {
        self.cipher.registry()
    }

    pub fn key_store(&self) -> &KeyStore {
        &self.keys
    }

    /// Check that the key cipher can wrap keys.
    pub fn verify(&self) -> CryptoResult<()> {
        let spec = self
            .registry()
            .lookup(&self.key_cipher)
            .ok_or_else(|| CryptoError::Config(format!("unknown key cipher {}", self.key_cipher)))?;
        if !spec.is_asymmetric() {
            return Err(CryptoError::Config(format!(
                "key cipher {} is not asymmetric",
                spec.id
            )));
        }
        Ok(())
    }

    /// Encrypt text with `cipher`, or with the preferred cipher when `None`.
    pub fn encrypt(&self, plaintext: &str, cipher: Option<&str>) -> CryptoResult<String> {
        self.encrypt_bytes(plaintext.as_bytes(), cipher)
    }

    pub fn encrypt_bytes(&self, plaintext: &[u8], cipher: Option<&str>) -> CryptoResult<String> {
        let spec = self.registry().resolve_for_encryption(cipher)?;
        let sealed = if spec.is_asymmetric() {
            self.seal_direct(spec, plaintext)
        } else {
            self.seal_hybrid(spec, plaintext)
        };
        sealed.map_err(|e| match e {
            CryptoError::EncryptionFailed(_) | CryptoError::RandomnessFailure => e,
            other => {
                warn!(cipher = %spec.id, error = %other, "encryption failed");
                CryptoError::EncryptionFailed(other.to_string())
            }
        })
    }

    /// Decrypt a cryptogram holding UTF-8 text.
    pub fn decrypt(&self, cryptogram: &str) -> CryptoResult<String> {
        let plaintext = self.decrypt_bytes(cryptogram)?;
        String::from_utf8(plaintext)
            .map_err(|_| CryptoError::DecryptionFailed("plaintext is not UTF-8".to_string()))
    }

    pub fn decrypt_bytes(&self, cryptogram: &str) -> CryptoResult<Vec<u8>> {
        let opened = codec::decode(cryptogram).and_then(|parsed| match parsed {
            Cryptogram::Native {
                header,
                key_blob,
                body,
            } => self.open_native(&header, &key_blob, &body),
            Cryptogram::Headerless { body } => self.open_headerless(&body),
        });
        opened.map_err(|e| {
            warn!(error = %e, "cannot decrypt cryptogram");
            match e {
                CryptoError::HeaderCorrupted(_)
                | CryptoError::InvalidArmor(_)
                | CryptoError::KeyNotFound(_)
                | CryptoError::UnknownCipher(_)
                | CryptoError::DecryptionFailed(_) => e,
                other => CryptoError::DecryptionFailed(other.to_string()),
            }
        })
    }

    fn seal_hybrid(&self, spec: &CipherSpec, plaintext: &[u8]) -> CryptoResult<String> {
        self.verify()?;
        let enciphered = self.cipher.encrypt(&spec.id, None, plaintext, None)?;
        let salt = crypto::generate_salt()?;

        let mut blob = Zeroizing::new(Vec::with_capacity(
            enciphered.key.len() + enciphered.iv.len() + salt.len(),
        ));
        blob.extend_from_slice(&enciphered.key);
        blob.extend_from_slice(&enciphered.iv);
        blob.extend_from_slice(&salt);

        let default = self.keys.default_key_pair();
        let wrapped = self
            .cipher
            .wrap(&self.key_cipher, default.pem().as_bytes(), &blob)?;

        let header = Header::new(
            &self.key_cipher,
            default.id().as_str(),
            &spec.id,
            &spec.mode,
            enciphered.key.len(),
            enciphered.iv.len(),
        );
        debug!(
            cipher = %spec.id,
            key_id = %default.id(),
            bytes = plaintext.len(),
            "hybrid encryption"
        );
        codec::encode(&header, &wrapped, &enciphered.ciphertext)
    }

    fn seal_direct(&self, spec: &CipherSpec, plaintext: &[u8]) -> CryptoResult<String> {
        let lite = self.keys.lite_key_pair();
        let enciphered = self
            .cipher
            .encrypt(&spec.id, Some(lite.pem().as_bytes()), plaintext, None)?;

        let header = Header::new(
            &spec.id,
            lite.id().as_str(),
            &spec.id,
            &spec.mode,
            lite.size_bytes(),
            0,
        );
        debug!(
            cipher = %spec.id,
            key_id = %lite.id(),
            bytes = plaintext.len(),
            "asymmetric encryption"
        );
        codec::encode(&header, &[], &enciphered.ciphertext)
    }

    fn open_native(&self, header: &Header, key_blob: &[u8], body: &[u8]) -> CryptoResult<Vec<u8>> {
        let pair = self.keys.key_pair_by_id(&header.key_id)?;
        let body_spec = self.registry().require(&header.body_cipher)?;
        debug!(
            cipher = %body_spec.id,
            key_id = %pair.id(),
            "decrypting cryptogram"
        );

        if body_spec.is_asymmetric() {
            return self
                .cipher
                .decrypt(&body_spec.id, pair.pem().as_bytes(), body, &[]);
        }

        check_header_sizes(header, body_spec)?;
        let key_spec = self.registry().require(&header.key_cipher)?;
        if !key_spec.is_asymmetric() {
            return Err(CryptoError::DecryptionFailed(format!(
                "key cipher {} cannot unwrap keys",
                key_spec.id
            )));
        }
        let unwrapped = Zeroizing::new(self.cipher.decrypt(
            &key_spec.id,
            pair.pem().as_bytes(),
            key_blob,
            &[],
        )?);

        let fits = header
            .key_size
            .checked_add(header.iv_size)
            .is_some_and(|needed| needed <= unwrapped.len());
        if !fits {
            return Err(CryptoError::DecryptionFailed(format!(
                "key blob holds {} bytes, header needs {} + {}",
                unwrapped.len(),
                header.key_size,
                header.iv_size
            )));
        }
        let (key, rest) = unwrapped.split_at(header.key_size);
        let iv = &rest[..header.iv_size];
        self.cipher.decrypt(&body_spec.id, key, body, iv)
    }

    fn open_headerless(&self, body: &[u8]) -> CryptoResult<Vec<u8>> {
        let candidates: Vec<&KeyPair> = self
            .keys
            .compat_key_pair()
            .into_iter()
            .chain(std::iter::once(self.keys.default_key_pair()))
            .collect();

        for pair in candidates {
            match self
                .cipher
                .decrypt(LEGACY_CIPHER, pair.pem().as_bytes(), body, &[])
            {
                Ok(plaintext) => {
                    debug!(key_id = %pair.id(), "opened headerless cryptogram");
                    return Ok(plaintext);
                }
                Err(e) => debug!(key_id = %pair.id(), error = %e, "headerless attempt failed"),
            }
        }
        Err(CryptoError::DecryptionFailed(
            "no key pair opens the headerless cryptogram".to_string(),
        ))
    }
}

/// Header sizes slice the unwrapped key blob, so they may not exceed what
/// the body cipher declares.
fn check_header_sizes(header: &Header, body_spec: &CipherSpec) -> CryptoResult<()> {
    if header.key_size > body_spec.key_size || header.iv_size > body_spec.iv_size {
        return Err(CryptoError::HeaderCorrupted(format!(
            "sizes {},{} exceed {},{} for {}",
            header.key_size, header.iv_size, body_spec.key_size, body_spec.iv_size, body_spec.id
        )));
    }
    Ok(())
}

impl fmt::Debug for Encryptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Encryptor")
            .field("key_cipher", &self.key_cipher)
            .field("keys", &self.keys)
            .finish_non_exhaustive()
    }
}
