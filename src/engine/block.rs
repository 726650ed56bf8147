//! CBC-mode block ciphers.
//!
//! Plaintext is zero-padded to the block size and trailing NUL bytes are
//! stripped after decryption, so a plaintext that itself ends in NUL bytes
//! loses them. Cryptograms written by earlier releases depend on this layout.

use aes::{Aes128, Aes192, Aes256};
use blowfish::Blowfish;
use cast5::Cast5;
use cbc::cipher::block_padding::{NoPadding, ZeroPadding};
use cbc::cipher::{BlockCipher, BlockDecryptMut, BlockEncryptMut, KeyInit, KeyIvInit};
use des::TdesEde3;
use twofish::Twofish;

use super::{CipherKind, CipherParams, Engine, EngineError};

const MODE: &str = "cbc";

type EncryptFn = fn(&[u8], &[u8], &[u8]) -> Result<Vec<u8>, EngineError>;
type DecryptFn = fn(&[u8], &[u8], &[u8]) -> Result<Vec<u8>, EngineError>;

/// Block cipher engine backed by the RustCrypto block cipher crates.
#[derive(Debug, Default, Clone, Copy)]
pub struct BlockEngine;

impl BlockEngine {
    pub fn new() -> Self {
        Self
    }

    fn ops(&self, cipher: &str) -> Result<(EncryptFn, DecryptFn), EngineError> {
        let ops: (EncryptFn, DecryptFn) = match cipher {
            "aes-128" => (cbc_encrypt::<Aes128>, cbc_decrypt::<Aes128>),
            "aes-192" => (cbc_encrypt::<Aes192>, cbc_decrypt::<Aes192>),
            "aes-256" => (cbc_encrypt::<Aes256>, cbc_decrypt::<Aes256>),
            "tripledes" => (cbc_encrypt::<TdesEde3>, cbc_decrypt::<TdesEde3>),
            "blowfish" => (cbc_encrypt::<Blowfish>, cbc_decrypt::<Blowfish>),
            "twofish" => (cbc_encrypt::<Twofish>, cbc_decrypt::<Twofish>),
            "cast-128" => (cbc_encrypt::<Cast5>, cbc_decrypt::<Cast5>),
            _ => return Err(EngineError::unsupported(self.name(), cipher)),
        };
        Ok(ops)
    }
}

impl Engine for BlockEngine {
    fn name(&self) -> &'static str {
        "block"
    }

    fn url(&self) -> &'static str {
        "https://github.com/RustCrypto/block-ciphers"
    }

    fn kind(&self) -> CipherKind {
        CipherKind::Symmetric
    }

    fn list_ciphers(&self) -> Vec<CipherParams> {
        vec![
            CipherParams::new("aes-128", 16, 16, MODE),
            CipherParams::new("aes-192", 24, 16, MODE),
            CipherParams::new("aes-256", 32, 16, MODE),
            CipherParams::new("tripledes", 24, 8, MODE),
            CipherParams::new("blowfish", 56, 8, MODE),
            CipherParams::new("twofish", 32, 16, MODE),
            CipherParams::new("cast-128", 16, 8, MODE),
        ]
    }

    fn encrypt(
        &self,
        cipher: &str,
        key: &[u8],
        plaintext: &[u8],
        iv: &[u8],
    ) -> Result<Vec<u8>, EngineError> {
        let (encrypt, _) = self.ops(cipher)?;
        encrypt(key, iv, plaintext)
    }

    fn decrypt(
        &self,
        cipher: &str,
        key: &[u8],
        ciphertext: &[u8],
        iv: &[u8],
    ) -> Result<Vec<u8>, EngineError> {
        let (_, decrypt) = self.ops(cipher)?;
        decrypt(key, iv, ciphertext)
    }
}

fn cbc_encrypt<C>(key: &[u8], iv: &[u8], plaintext: &[u8]) -> Result<Vec<u8>, EngineError>
where
    C: BlockCipher + BlockEncryptMut + KeyInit,
{
    let encryptor = cbc::Encryptor::<C>::new_from_slices(key, iv)
        .map_err(|_| EngineError::new("invalid key or IV length"))?;
    Ok(encryptor.encrypt_padded_vec_mut::<ZeroPadding>(plaintext))
}

fn cbc_decrypt<C>(key: &[u8], iv: &[u8], ciphertext: &[u8]) -> Result<Vec<u8>, EngineError>
where
    C: BlockCipher + BlockDecryptMut + KeyInit,
{
    let decryptor = cbc::Decryptor::<C>::new_from_slices(key, iv)
        .map_err(|_| EngineError::new("invalid key or IV length"))?;
    let mut plaintext = decryptor
        .decrypt_padded_vec_mut::<NoPadding>(ciphertext)
        .map_err(|_| EngineError::new("ciphertext is not a whole number of blocks"))?;
    let len = plaintext
        .iter()
        .rposition(|&b| b != 0)
        .map_or(0, |last| last + 1);
    plaintext.truncate(len);
    Ok(plaintext)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn material(params: &CipherParams) -> (Vec<u8>, Vec<u8>) {
        (vec![0x42; params.key_size], vec![0x24; params.iv_size])
    }

    #[test]
    fn test_every_cipher_roundtrips() {
        let engine = BlockEngine::new();
        let plaintext = b"the quick brown fox jumps over the lazy dog";
        for params in engine.list_ciphers() {
            let (key, iv) = material(&params);
            let ciphertext = engine.encrypt(&params.id, &key, plaintext, &iv).unwrap();
            assert_ne!(&ciphertext[..plaintext.len()], &plaintext[..], "{}", params.id);
            let recovered = engine.decrypt(&params.id, &key, &ciphertext, &iv).unwrap();
            assert_eq!(recovered, plaintext, "{}", params.id);
        }
    }

    #[test]
    fn test_trailing_nul_padding_is_stripped() {
        let engine = BlockEngine::new();
        let key = [7u8; 32];
        let iv = [9u8; 16];
        let ciphertext = engine.encrypt("aes-256", &key, b"abc", &iv).unwrap();
        assert_eq!(ciphertext.len(), 16);
        assert_eq!(engine.decrypt("aes-256", &key, &ciphertext, &iv).unwrap(), b"abc");
    }

    #[test]
    fn test_truncated_ciphertext_fails() {
        let engine = BlockEngine::new();
        let key = [7u8; 16];
        let iv = [9u8; 16];
        let ciphertext = engine.encrypt("aes-128", &key, b"some text", &iv).unwrap();
        assert!(engine
            .decrypt("aes-128", &key, &ciphertext[..ciphertext.len() - 3], &iv)
            .is_err());
    }

    #[test]
    fn test_unknown_cipher() {
        let engine = BlockEngine::new();
        assert!(engine.encrypt("rijndael-512", &[0; 32], b"x", &[0; 16]).is_err());
        assert!(engine.iv_size("rijndael-512").is_err());
        assert_eq!(engine.iv_size("blowfish").unwrap(), 8);
        assert_eq!(engine.key_size("blowfish", &[1u8; 20]).unwrap(), 20);
    }
}
