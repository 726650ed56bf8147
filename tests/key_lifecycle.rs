mod support;

use std::fs;
use std::sync::Arc;

use ppp_crypto::codec;
use ppp_crypto::{Cipher, CipherRegistry, CryptoError, Encryptor, KeyPair, KeyStore};

/// Encrypt the way releases before the cryptogram header did: one PKCS#1
/// RSA blob, base64-armored, nothing else.
fn legacy_blob(registry: Arc<CipherRegistry>, pair: &KeyPair, text: &str) -> String {
    let cipher = Cipher::new(registry);
    let out = cipher
        .encrypt("rsa", Some(pair.pem().as_bytes()), text.as_bytes(), None)
        .unwrap();
    codec::armor(&out.ciphertext)
}

#[test]
fn test_headerless_blob_opens_with_default_key() {
    let tmp = tempfile::tempdir().unwrap();
    let config = support::config(tmp.path());
    let registry = Arc::new(CipherRegistry::with_default_engines(&config).unwrap());
    let store = Arc::new(KeyStore::open(&config).unwrap());
    let encryptor = Encryptor::new(Arc::clone(&registry), Arc::clone(&store));

    let blob = legacy_blob(registry, store.default_key_pair(), "legacy page");
    assert!(!blob.starts_with("---"));
    assert_eq!(
        codec::decode(&blob).unwrap().status(),
        ppp_crypto::HeaderStatus::NotFound
    );
    assert_eq!(encryptor.decrypt(&blob).unwrap(), "legacy page");
}

#[test]
fn test_headerless_blob_opens_with_imported_compat_key() {
    let tmp = tempfile::tempdir().unwrap();
    let legacy = KeyPair::generate(1024).unwrap();
    let legacy_path = tmp.path().join("old-install-key.pem");
    fs::write(&legacy_path, legacy.pem()).unwrap();

    let mut config = support::config(tmp.path());
    config.compat_source = Some(legacy_path);
    let encryptor = ppp_crypto::open(&config).unwrap();
    assert_eq!(encryptor.key_store().compat_key_id(), Some(legacy.id()));
    assert!(config.key_dir.join("compat.pem").is_file());

    let registry = Arc::new(CipherRegistry::with_default_engines(&config).unwrap());
    let blob = legacy_blob(registry, &legacy, "written by the old install");
    assert_eq!(encryptor.decrypt(&blob).unwrap(), "written by the old install");
}

#[test]
fn test_headerless_blob_from_unknown_key_fails() {
    let tmp = tempfile::tempdir().unwrap();
    let config = support::config(tmp.path());
    let encryptor = ppp_crypto::open(&config).unwrap();

    let stranger = KeyPair::generate(1024).unwrap();
    let registry = Arc::new(CipherRegistry::with_default_engines(&config).unwrap());
    let blob = legacy_blob(registry, &stranger, "not ours");
    assert!(matches!(
        encryptor.decrypt(&blob),
        Err(CryptoError::DecryptionFailed(_))
    ));
}

#[test]
fn test_rotation_in_place() {
    let tmp = tempfile::tempdir().unwrap();
    let config = support::config(tmp.path());
    let registry = Arc::new(CipherRegistry::with_default_engines(&config).unwrap());
    let mut store = Arc::new(KeyStore::open(&config).unwrap());

    let before = Encryptor::new(Arc::clone(&registry), Arc::clone(&store))
        .encrypt("before rotation", Some("aes-256"))
        .unwrap();
    let old_id = store.default_key_id().clone();

    let new_id = Arc::get_mut(&mut store)
        .expect("no other handle to the key store")
        .rotate_default()
        .unwrap();
    assert_ne!(new_id, old_id);

    let encryptor = Encryptor::new(registry, store);
    let after = encryptor.encrypt("after rotation", Some("aes-256")).unwrap();
    assert!(support::headline(&after).contains(&format!("rsa,{new_id},")));
    assert_eq!(encryptor.decrypt(&before).unwrap(), "before rotation");
    assert_eq!(encryptor.decrypt(&after).unwrap(), "after rotation");
}

#[test]
fn test_rotated_key_survives_restart() {
    let tmp = tempfile::tempdir().unwrap();
    let config = support::config(tmp.path());

    let cryptogram = ppp_crypto::open(&config)
        .unwrap()
        .encrypt("archived", Some("twofish"))
        .unwrap();

    let mut store = KeyStore::open(&config).unwrap();
    let old_id = store.default_key_id().clone();
    store.rotate_default().unwrap();
    drop(store);

    let encryptor = ppp_crypto::open(&config).unwrap();
    assert_ne!(encryptor.key_store().default_key_id(), &old_id);
    assert!(encryptor.key_store().key_ids().contains(&&old_id));
    assert_eq!(encryptor.decrypt(&cryptogram).unwrap(), "archived");
}

#[test]
fn test_deleted_key_is_key_not_found() {
    let tmp = tempfile::tempdir().unwrap();
    let config = support::config(tmp.path());
    let cryptogram = ppp_crypto::open(&config)
        .unwrap()
        .encrypt("orphaned", Some("aes-128"))
        .unwrap();

    let mut store = KeyStore::open(&config).unwrap();
    store.rotate_default().unwrap();
    drop(store);
    for entry in fs::read_dir(&config.key_dir).unwrap() {
        let path = entry.unwrap().path();
        let name = path.file_name().unwrap().to_string_lossy().into_owned();
        if name.starts_with("default-") {
            fs::remove_file(path).unwrap();
        }
    }

    let encryptor = ppp_crypto::open(&config).unwrap();
    assert!(matches!(
        encryptor.decrypt(&cryptogram),
        Err(CryptoError::KeyNotFound(_))
    ));
}
