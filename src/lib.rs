//! # ppp-crypto
//!
//! Hybrid multi-cipher encryption core for protected wiki pages.
//!
//! A page fragment is encrypted with a fast symmetric cipher under a fresh
//! random key. That key is wrapped with an RSA key pair from an on-disk key
//! heap, and the result is written as an armored cryptogram whose header
//! says exactly how to decrypt it:
//!
//! ```text
//! --- BEGIN KEY: RSA,3f2a9c01,CHACHA20-POLY1305,poly1305,32,12 ---
//! <base64 wrapped key>
//! --- END KEY ---
//! <base64 body>
//! ```
//!
//! ## Public API
//!
//! Most callers need only [`open`] and the returned [`Encryptor`]. The
//! building blocks are public for callers that assemble their own registry
//! or engines:
//!
//! - [`CipherRegistry`] catalogs engines and their ciphers.
//! - [`KeyStore`] owns the RSA key pairs on disk.
//! - [`Cipher`] performs raw encryption by cipher identifier.
//! - [`codec`] reads and writes the cryptogram format.

// Module declarations.
pub mod cipher;
pub mod codec;
pub mod config;
pub(crate) mod crypto;
pub mod encryptor;
pub mod engine;
pub mod error;
pub mod keys;
pub mod keystore;
pub mod registry;

use std::sync::Arc;

pub use cipher::{Cipher, Enciphered};
pub use codec::{Cryptogram, Header, HeaderStatus};
pub use config::Config;
pub use encryptor::Encryptor;
pub use engine::{CipherKind, Engine};
pub use error::{CryptoError, CryptoResult};
pub use keys::{KeyId, KeyPair};
pub use keystore::KeyStore;
pub use registry::{CipherRegistry, CipherSpec};

/// Build the registry, open the key store and return a ready encryptor.
///
/// Call this once at startup and share the result; key pairs missing from
/// the key directory are generated here. Every error returned is fatal.
pub fn open(config: &Config) -> CryptoResult<Encryptor> {
    let registry = Arc::new(CipherRegistry::with_default_engines(config)?);
    let keys = Arc::new(KeyStore::open(config)?);
    let encryptor = Encryptor::new(registry, keys).with_key_cipher(&config.key_cipher);
    encryptor.verify()?;
    Ok(encryptor)
}
