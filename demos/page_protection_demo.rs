//! Minimal example: protecting a wiki page fragment.
//!
//! Opens a key directory under the system temp dir, encrypts a fragment
//! with the preferred cipher and with pure RSA, then decrypts both.
//! Run with: `RUST_LOG=debug cargo run --example page_protection_demo`

use std::path::PathBuf;

use ppp_crypto::Config;
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    // 1. Setup: the key pairs are generated on the first run only.
    let key_dir: PathBuf = std::env::temp_dir().join("ppp_demo_keys");
    let config = Config::with_key_dir(&key_dir);
    let encryptor = ppp_crypto::open(&config)?;

    let store = encryptor.key_store();
    println!("Key directory: {}", store.dir().display());
    println!("  default key {} ({} bits)", store.default_key_id(), store.default_key_pair().bits());
    println!("  lite key    {} ({} bits)", store.lite_key_id(), store.lite_key_pair().bits());

    // 2. Available ciphers, most preferred first.
    let usable: Vec<&str> = encryptor
        .registry()
        .list_usable_ciphers(None)
        .into_iter()
        .map(|spec| spec.id.as_str())
        .collect();
    println!("Usable ciphers: {}", usable.join(", "));

    // 3. Hybrid encryption with the default cipher.
    let fragment = "Only members of the curators group may read this paragraph.";
    let cryptogram = encryptor.encrypt(fragment, None)?;
    println!("\n{cryptogram}\n");
    assert_eq!(encryptor.decrypt(&cryptogram)?, fragment);

    // 4. Pure-asymmetric mode with the lite key.
    let direct = encryptor.encrypt("short secret", Some("rsa"))?;
    println!("{direct}\n");
    assert_eq!(encryptor.decrypt(&direct)?, "short secret");

    println!("Both cryptograms decrypted.");
    Ok(())
}
