#![allow(dead_code)]

use std::path::Path;

use ppp_crypto::{Config, Encryptor};

/// Small keys keep key generation fast. The lite key is just big enough for
/// PKCS#1 padding.
pub fn config(dir: &Path) -> Config {
    let mut config = Config::with_key_dir(dir.join("keys"));
    config.default_key_bits = 1024;
    config.lite_key_bits = 512;
    config.preferred_ciphers.push("plain".to_string());
    config
}

pub fn encryptor(dir: &Path) -> Encryptor {
    ppp_crypto::open(&config(dir)).unwrap()
}

/// The headline of a cryptogram, lower-cased.
pub fn headline(cryptogram: &str) -> String {
    cryptogram.lines().next().unwrap_or_default().to_ascii_lowercase()
}
