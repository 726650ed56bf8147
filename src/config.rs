//! Encryption core configuration.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{CryptoError, CryptoResult};

/// Largest RSA modulus the key heap will generate or accept.
pub const MAX_RSA_KEY_BITS: usize = 4096;

/// Smallest RSA modulus the key heap will generate.
pub const MIN_RSA_KEY_BITS: usize = 512;

/// Configuration for the cipher registry and the key heap.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Directory holding the PEM key pairs.
    pub key_dir: PathBuf,

    /// Modulus size of the default key pair, used to wrap symmetric keys.
    pub default_key_bits: usize,

    /// Modulus size of the lite key pair, used for pure-asymmetric messages.
    pub lite_key_bits: usize,

    /// File name of the default key pair inside `key_dir`.
    pub default_key_file: String,

    /// File name of the lite key pair inside `key_dir`.
    pub lite_key_file: String,

    /// File name the legacy key pair is imported to inside `key_dir`.
    pub compat_key_file: String,

    /// Legacy PEM file to import once into `compat_key_file`.
    pub compat_source: Option<PathBuf>,

    /// Ciphers enabled for encryption, most preferred first.
    pub preferred_ciphers: Vec<String>,

    /// Asymmetric cipher used to wrap symmetric keys.
    pub key_cipher: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            key_dir: PathBuf::from("keys"),
            default_key_bits: 2048,
            lite_key_bits: 512,
            default_key_file: "default.pem".to_string(),
            lite_key_file: "lite.pem".to_string(),
            compat_key_file: "compat.pem".to_string(),
            compat_source: None,
            preferred_ciphers: [
                "chacha20-poly1305",
                "aes-256-gcm",
                "aes-256",
                "aes-192",
                "aes-128",
                "twofish",
                "blowfish",
                "cast-128",
                "tripledes",
                "rsa",
            ]
            .iter()
            .map(|c| c.to_string())
            .collect(),
            key_cipher: "rsa".to_string(),
        }
    }
}

impl Config {
    /// Default configuration rooted at `key_dir`.
    pub fn with_key_dir(key_dir: impl Into<PathBuf>) -> Self {
        Self {
            key_dir: key_dir.into(),
            ..Self::default()
        }
    }

    /// Parse a JSON configuration. Missing fields take their defaults.
    pub fn from_json_str(json: &str) -> CryptoResult<Self> {
        let config: Self =
            serde_json::from_str(json).map_err(|e| CryptoError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a JSON configuration file.
    pub fn from_file(path: impl AsRef<Path>) -> CryptoResult<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)
            .map_err(|e| CryptoError::Config(format!("{}: {e}", path.display())))?;
        Self::from_json_str(&json)
    }

    /// Check the settings that would otherwise only fail deep inside key
    /// generation or file handling.
    pub fn validate(&self) -> CryptoResult<()> {
        for (name, bits) in [
            ("default_key_bits", self.default_key_bits),
            ("lite_key_bits", self.lite_key_bits),
        ] {
            if !(MIN_RSA_KEY_BITS..=MAX_RSA_KEY_BITS).contains(&bits) || bits % 8 != 0 {
                return Err(CryptoError::Config(format!(
                    "{name} must be a multiple of 8 between {MIN_RSA_KEY_BITS} and {MAX_RSA_KEY_BITS}, got {bits}"
                )));
            }
        }
        if self.lite_key_bits > self.default_key_bits {
            return Err(CryptoError::Config(
                "lite_key_bits must not exceed default_key_bits".to_string(),
            ));
        }
        for (name, file) in [
            ("default_key_file", &self.default_key_file),
            ("lite_key_file", &self.lite_key_file),
            ("compat_key_file", &self.compat_key_file),
        ] {
            if !is_plain_pem_name(file) {
                return Err(CryptoError::Config(format!(
                    "{name} must be a bare *.pem file name, got {file:?}"
                )));
            }
        }
        if self.default_key_file == self.lite_key_file {
            return Err(CryptoError::Config(
                "default and lite key files must differ".to_string(),
            ));
        }
        if self.key_cipher.trim().is_empty() {
            return Err(CryptoError::Config("key_cipher must be set".to_string()));
        }
        Ok(())
    }
}

fn is_plain_pem_name(name: &str) -> bool {
    let path = Path::new(name);
    name.ends_with(".pem")
        && name.len() > ".pem".len()
        && path.file_name().and_then(|n| n.to_str()) == Some(name)
}
