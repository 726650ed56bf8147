//! Error types for ppp-crypto.
//!
//! Every variant is a distinct failure mode of the encryption core. Messages
//! say *what* failed and carry the engine's diagnostic where there is one,
//! but never plaintext or key material.

use std::path::PathBuf;

use thiserror::Error;

/// Result type for all ppp-crypto operations.
pub type CryptoResult<T> = Result<T, CryptoError>;

/// The single error type for all ppp-crypto operations.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The cipher identifier is not in the registry.
    #[error("unknown cipher: {0}")]
    UnknownCipher(String),

    /// The cipher is known (and may be used to decrypt) but is not enabled
    /// for encryption.
    #[error("cipher {0} is not supported for encryption")]
    CipherNotEncryptable(String),

    /// No cipher was requested and the preferred list is empty.
    #[error("no cipher is enabled for encryption")]
    NoUsableCipher,

    /// Two engines were registered under the same name.
    #[error("engine already registered: {0}")]
    DuplicateEngine(String),

    /// Two engines advertise the same cipher identifier.
    #[error("cipher {cipher} is provided by both {first} and {second}")]
    DuplicateCipher {
        cipher: String,
        first: String,
        second: String,
    },

    /// An engine refused to initialize.
    #[error("engine {engine} failed to initialize: {reason}")]
    EngineInit { engine: String, reason: String },

    /// Supplied key material is bigger than the cipher accepts.
    #[error("key size {actual} is bigger than {limit} for the algorithm {cipher}")]
    KeyTooLarge {
        cipher: String,
        actual: usize,
        limit: usize,
    },

    /// Supplied IV is bigger than the cipher accepts.
    #[error("IV size {actual} is bigger than {limit} for the algorithm {cipher}")]
    IvTooLarge {
        cipher: String,
        actual: usize,
        limit: usize,
    },

    /// The key directory or a key file could not be created, read or written.
    #[error("key store I/O error at {}: {reason}", path.display())]
    KeyStoreIo { path: PathBuf, reason: String },

    /// A PEM file in the key directory could not be parsed.
    #[error("invalid key file {}: {reason}", path.display())]
    InvalidKeyFile { path: PathBuf, reason: String },

    /// A PEM key pair handed to an operation could not be parsed.
    #[error("invalid key pair: {0}")]
    InvalidKey(String),

    /// RSA key pair generation failed.
    #[error("key generation failed: {0}")]
    KeyGeneration(String),

    /// A cryptogram references a key pair that is not in the store.
    #[error("key pair {0} not found in key store")]
    KeyNotFound(String),

    /// The cryptogram carries a header that cannot be parsed.
    #[error("header corrupted: {0}")]
    HeaderCorrupted(String),

    /// Base64 armor could not be decoded.
    #[error("invalid armor: {0}")]
    InvalidArmor(String),

    /// Encryption failed.
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    /// Decryption failed: wrong key, damaged ciphertext, or an engine error.
    #[error("decryption failed: {0}")]
    DecryptionFailed(String),

    /// The system's random number generator failed to produce bytes.
    #[error("randomness source failed")]
    RandomnessFailure,

    /// The configuration is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),
}

impl CryptoError {
    /// Returns true for errors that leave the process unable to serve
    /// requests. These belong to startup; everything else concerns a single
    /// message and should be reported to the caller as "cannot decrypt" or
    /// "cannot encrypt".
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::KeyStoreIo { .. }
                | Self::InvalidKeyFile { .. }
                | Self::KeyGeneration(_)
                | Self::EngineInit { .. }
                | Self::DuplicateEngine(_)
                | Self::DuplicateCipher { .. }
                | Self::RandomnessFailure
                | Self::Config(_)
        )
    }

    pub(crate) fn key_store_io(path: impl Into<PathBuf>, err: std::io::Error) -> Self {
        Self::KeyStoreIo {
            path: path.into(),
            reason: err.to_string(),
        }
    }
}
