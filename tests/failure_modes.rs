mod support;

use std::sync::Arc;

use ppp_crypto::codec;
use ppp_crypto::{Cipher, CipherRegistry, CryptoError, Cryptogram};

#[test]
fn test_unknown_cipher() {
    let tmp = tempfile::tempdir().unwrap();
    let encryptor = support::encryptor(tmp.path());
    let err = encryptor
        .encrypt("anything", Some("not-a-real-cipher"))
        .unwrap_err();
    assert!(matches!(err, CryptoError::UnknownCipher(ref id) if id == "not-a-real-cipher"));
    assert!(!err.is_fatal());
}

#[test]
fn test_cipher_not_enabled_for_encryption() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = support::config(tmp.path());
    config.preferred_ciphers = vec!["aes-256".to_string(), "tripledes".to_string()];
    let encryptor = ppp_crypto::open(&config).unwrap();

    assert!(matches!(
        encryptor.encrypt("x", Some("chacha20-poly1305")),
        Err(CryptoError::CipherNotEncryptable(_))
    ));

    // A cryptogram written while the cipher was enabled still decrypts.
    let permissive = support::encryptor(tmp.path());
    let cryptogram = permissive.encrypt("older page", Some("chacha20-poly1305")).unwrap();
    assert_eq!(encryptor.decrypt(&cryptogram).unwrap(), "older page");
}

#[test]
fn test_key_larger_than_declared() {
    let tmp = tempfile::tempdir().unwrap();
    let config = support::config(tmp.path());
    let cipher = Cipher::new(Arc::new(
        CipherRegistry::with_default_engines(&config).unwrap(),
    ));
    let err = cipher
        .encrypt("aes-256", Some(&[7u8; 33]), b"payload", None)
        .unwrap_err();
    assert_eq!(
        err.to_string(),
        "key size 33 is bigger than 32 for the algorithm aes-256"
    );
    assert!(matches!(
        cipher.encrypt("tripledes", None, b"payload", Some(&[0u8; 9])),
        Err(CryptoError::IvTooLarge { .. })
    ));
}

#[test]
fn test_corrupted_headers() {
    let tmp = tempfile::tempdir().unwrap();
    let encryptor = support::encryptor(tmp.path());
    let cryptogram = encryptor.encrypt("fragile", Some("aes-192")).unwrap();

    let without_end: String = cryptogram
        .lines()
        .filter(|line| *line != codec::END_KEY_MARKER)
        .collect::<Vec<_>>()
        .join("\n");
    let five_fields = cryptogram.replacen(",cbc,", ",", 1);
    let truncated = "--- BEGIN KEY: RSA,0a1b";

    for text in [without_end.as_str(), five_fields.as_str(), truncated] {
        assert!(
            matches!(encryptor.decrypt(text), Err(CryptoError::HeaderCorrupted(_))),
            "{text}"
        );
    }
}

#[test]
fn test_garbage_is_invalid_armor() {
    let tmp = tempfile::tempdir().unwrap();
    let encryptor = support::encryptor(tmp.path());
    assert!(matches!(
        encryptor.decrypt("this is just a wiki sentence."),
        Err(CryptoError::InvalidArmor(_))
    ));
    assert!(matches!(encryptor.decrypt(""), Err(CryptoError::InvalidArmor(_))));
}

#[test]
fn test_missing_key_pair_is_key_not_found() {
    let elsewhere = tempfile::tempdir().unwrap();
    let cryptogram = support::encryptor(elsewhere.path())
        .encrypt("from another wiki", Some("aes-256"))
        .unwrap();

    let tmp = tempfile::tempdir().unwrap();
    let encryptor = support::encryptor(tmp.path());
    let err = encryptor.decrypt(&cryptogram).unwrap_err();
    assert!(matches!(err, CryptoError::KeyNotFound(_)));
    assert!(!err.is_fatal());
}

#[test]
fn test_tampered_aead_body_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let encryptor = support::encryptor(tmp.path());
    let cryptogram = encryptor
        .encrypt("integrity matters", Some("chacha20-poly1305"))
        .unwrap();

    let Cryptogram::Native { header, key_blob, mut body } = codec::decode(&cryptogram).unwrap()
    else {
        panic!("expected a native cryptogram");
    };
    body[0] ^= 0x01;
    let tampered = codec::encode(&header, &key_blob, &body).unwrap();
    assert!(matches!(
        encryptor.decrypt(&tampered),
        Err(CryptoError::DecryptionFailed(_))
    ));
}

#[test]
fn test_damaged_key_blob_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let encryptor = support::encryptor(tmp.path());
    let cryptogram = encryptor.encrypt("blob", Some("aes-256")).unwrap();

    let Cryptogram::Native { header, mut key_blob, body } = codec::decode(&cryptogram).unwrap()
    else {
        panic!("expected a native cryptogram");
    };
    key_blob.truncate(key_blob.len() - 1);
    let damaged = codec::encode(&header, &key_blob, &body).unwrap();
    assert!(matches!(
        encryptor.decrypt(&damaged),
        Err(CryptoError::DecryptionFailed(_))
    ));
}

#[test]
fn test_invalid_config_is_fatal() {
    let tmp = tempfile::tempdir().unwrap();
    let mut config = support::config(tmp.path());
    config.key_cipher = "aes-256".to_string();
    let err = ppp_crypto::open(&config).unwrap_err();
    assert!(matches!(err, CryptoError::Config(_)));
    assert!(err.is_fatal());
}
