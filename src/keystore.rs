//! On-disk RSA key heap.
//!
//! The key directory holds one PEM key pair per file:
//!
//! - `default.pem` wraps the symmetric key of every hybrid cryptogram.
//! - `lite.pem` is a small key for pure-asymmetric cryptograms.
//! - `compat.pem` is an optional legacy key, imported once, kept only for
//!   decrypting headerless cryptograms.
//! - Any other `*.pem` (typically a rotated-out default key) is indexed too,
//!   so cryptograms that name it keep decrypting.
//!
//! The store is loaded once at startup and read-only afterwards. Only
//! [`KeyStore::rotate_default`] mutates it, and it takes `&mut self`.

use std::collections::HashMap;
use std::fmt;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::Utc;
use tempfile::Builder;
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::{CryptoError, CryptoResult};
use crate::keys::{KeyId, KeyPair};

const PEM_EXTENSION: &str = "pem";

/// Timestamp format appended to rotated-out default key files.
const ROTATION_STAMP: &str = "%Y%m%dT%H%M%S%.3fZ";

pub struct KeyStore {
    dir: PathBuf,
    default_file: String,
    default_bits: usize,
    default: Arc<KeyPair>,
    lite: Arc<KeyPair>,
    compat: Option<Arc<KeyPair>>,
    keys: HashMap<KeyId, Arc<KeyPair>>,
}

impl KeyStore {
    /// Open the key directory, creating it and any missing named key pair.
    ///
    /// Any I/O failure or unparsable PEM file is fatal: the store cannot
    /// serve requests without its key material.
    pub fn open(config: &Config) -> CryptoResult<Self> {
        config.validate()?;
        let dir = config.key_dir.clone();
        fs::create_dir_all(&dir).map_err(|e| CryptoError::key_store_io(&dir, e))?;

        let compat_path = dir.join(&config.compat_key_file);
        if let Some(source) = &config.compat_source {
            import_compat(source, &compat_path)?;
        }

        let default = Arc::new(load_or_generate(
            &dir.join(&config.default_key_file),
            config.default_key_bits,
        )?);
        let lite = Arc::new(load_or_generate(
            &dir.join(&config.lite_key_file),
            config.lite_key_bits,
        )?);
        let compat = if compat_path.is_file() {
            Some(Arc::new(read_pair(&compat_path)?))
        } else {
            None
        };

        let named = [
            config.default_key_file.as_str(),
            config.lite_key_file.as_str(),
            config.compat_key_file.as_str(),
        ];
        let mut keys = scan(&dir, &named)?;
        for pair in [Some(&default), Some(&lite), compat.as_ref()]
            .into_iter()
            .flatten()
        {
            keys.insert(pair.id().clone(), Arc::clone(pair));
        }

        info!(
            dir = %dir.display(),
            default = %default.id(),
            lite = %lite.id(),
            compat = ?compat.as_ref().map(|pair| pair.id().to_string()),
            keys = keys.len(),
            "key store opened"
        );

        Ok(Self {
            dir,
            default_file: config.default_key_file.clone(),
            default_bits: config.default_key_bits,
            default,
            lite,
            compat,
            keys,
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn default_key_pair(&self) -> &KeyPair {
        &self.default
    }

    pub fn lite_key_pair(&self) -> &KeyPair {
        &self.lite
    }

    pub fn compat_key_pair(&self) -> Option<&KeyPair> {
        self.compat.as_deref()
    }

    pub fn default_key_id(&self) -> &KeyId {
        self.default.id()
    }

    pub fn lite_key_id(&self) -> &KeyId {
        self.lite.id()
    }

    pub fn compat_key_id(&self) -> Option<&KeyId> {
        self.compat.as_ref().map(|pair| pair.id())
    }

    /// Look a key pair up by the identifier written in a header.
    pub fn key_pair_by_id(&self, id: &str) -> CryptoResult<&KeyPair> {
        let id = KeyId::new(id);
        self.keys
            .get(&id)
            .map(Arc::as_ref)
            .ok_or_else(|| CryptoError::KeyNotFound(id.to_string()))
    }

    /// Modulus size of a stored key pair.
    pub fn key_size_bits(&self, id: &str) -> CryptoResult<usize> {
        Ok(self.key_pair_by_id(id)?.bits())
    }

    /// Every indexed identifier, sorted.
    pub fn key_ids(&self) -> Vec<&KeyId> {
        let mut ids: Vec<&KeyId> = self.keys.keys().collect();
        ids.sort();
        ids
    }

    pub fn count_keys(&self) -> usize {
        self.keys.len()
    }

    /// Retire the default key pair and generate a new one.
    ///
    /// The current default file is renamed to `<stem>-<UTC timestamp>.pem`
    /// and stays indexed, so cryptograms it wrapped still decrypt. Returns
    /// the identifier of the new default key pair.
    pub fn rotate_default(&mut self) -> CryptoResult<KeyId> {
        let current = self.dir.join(&self.default_file);
        let stem = self
            .default_file
            .strip_suffix(".pem")
            .unwrap_or(&self.default_file);
        let stamp = Utc::now().format(ROTATION_STAMP);
        let archived = self.dir.join(format!("{stem}-{stamp}.pem"));
        if archived.exists() {
            return Err(CryptoError::key_store_io(
                &archived,
                io::Error::from(io::ErrorKind::AlreadyExists),
            ));
        }
        fs::rename(&current, &archived).map_err(|e| CryptoError::key_store_io(&current, e))?;

        let fresh = Arc::new(load_or_generate(&current, self.default_bits)?);
        let retired = std::mem::replace(&mut self.default, Arc::clone(&fresh));
        self.keys.insert(retired.id().clone(), retired.clone());
        self.keys.insert(fresh.id().clone(), fresh);

        info!(
            retired = %retired.id(),
            archived = %archived.display(),
            default = %self.default.id(),
            "default key pair rotated"
        );
        Ok(self.default.id().clone())
    }
}

impl fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyStore")
            .field("dir", &self.dir)
            .field("default", self.default.id())
            .field("lite", self.lite.id())
            .field("keys", &self.key_ids())
            .finish()
    }
}

fn read_pair(path: &Path) -> CryptoResult<KeyPair> {
    let pem = fs::read_to_string(path).map_err(|e| CryptoError::key_store_io(path, e))?;
    KeyPair::from_pem(&pem).map_err(|e| CryptoError::InvalidKeyFile {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })
}

/// Load the key pair at `path`, generating and writing it if absent.
///
/// When two processes race to create the same file, the loser reads the
/// winner's key instead of overwriting it. A zero-length file holds no key
/// and is replaced.
fn load_or_generate(path: &Path, bits: usize) -> CryptoResult<KeyPair> {
    match fs::metadata(path) {
        Ok(meta) if meta.len() == 0 => {
            warn!(path = %path.display(), "empty key file, replacing it");
            match fs::remove_file(path) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(CryptoError::key_store_io(path, e)),
            }
        }
        Ok(_) => return read_pair(path),
        Err(e) if e.kind() == io::ErrorKind::NotFound => {}
        Err(e) => return Err(CryptoError::key_store_io(path, e)),
    }

    info!(path = %path.display(), bits, "generating RSA key pair");
    let pair = KeyPair::generate(bits)?;
    if write_new_pem(path, pair.pem())? {
        info!(path = %path.display(), id = %pair.id(), "key pair written");
        Ok(pair)
    } else {
        debug!(path = %path.display(), "key file appeared concurrently, loading it");
        read_pair(path)
    }
}

/// Publish `pem` at `path` with owner-only permissions. Returns `false` if
/// the file already exists.
///
/// The key is written and synced to a temporary file in the same directory
/// first, so `path` never exists with partial contents.
fn write_new_pem(path: &Path, pem: &str) -> CryptoResult<bool> {
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    // Temporary files are created with mode 0600 on unix.
    let mut staged = Builder::new()
        .prefix(".key-")
        .suffix(".tmp")
        .tempfile_in(dir)
        .map_err(|e| CryptoError::key_store_io(dir, e))?;
    staged
        .write_all(pem.as_bytes())
        .and_then(|()| staged.as_file().sync_all())
        .map_err(|e| CryptoError::key_store_io(staged.path(), e))?;

    match staged.persist_noclobber(path) {
        Ok(_) => Ok(true),
        Err(e) if e.error.kind() == io::ErrorKind::AlreadyExists => Ok(false),
        Err(e) => Err(CryptoError::key_store_io(path, e.error)),
    }
}

/// Copy a legacy key pair into the key directory, once.
fn import_compat(source: &Path, dest: &Path) -> CryptoResult<()> {
    if dest.exists() {
        debug!(path = %dest.display(), "compat key already imported");
        return Ok(());
    }
    if !source.is_file() {
        debug!(source = %source.display(), "no legacy key to import");
        return Ok(());
    }

    let pair = read_pair(source)?;
    if write_new_pem(dest, pair.pem())? {
        info!(
            source = %source.display(),
            id = %pair.id(),
            "legacy key pair imported"
        );
    }
    Ok(())
}

/// Parse every `*.pem` in `dir` except the `skip`ped file names.
fn scan(dir: &Path, skip: &[&str]) -> CryptoResult<HashMap<KeyId, Arc<KeyPair>>> {
    let entries = fs::read_dir(dir).map_err(|e| CryptoError::key_store_io(dir, e))?;
    let mut paths = Vec::new();
    for entry in entries {
        let path = entry.map_err(|e| CryptoError::key_store_io(dir, e))?.path();
        let is_pem = path.extension().and_then(|ext| ext.to_str()) == Some(PEM_EXTENSION);
        let skipped = path
            .file_name()
            .and_then(|name| name.to_str())
            .is_some_and(|name| skip.contains(&name));
        if is_pem && !skipped && path.is_file() {
            paths.push(path);
        }
    }
    paths.sort();

    let mut keys = HashMap::with_capacity(paths.len() + skip.len());
    for path in paths {
        let pair = read_pair(&path)?;
        debug!(path = %path.display(), id = %pair.id(), "indexed key pair");
        keys.entry(pair.id().clone()).or_insert_with(|| Arc::new(pair));
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(dir: &Path) -> Config {
        let mut config = Config::with_key_dir(dir.join("keys"));
        config.default_key_bits = 512;
        config.lite_key_bits = 512;
        config
    }

    #[test]
    fn test_open_generates_then_reloads() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(tmp.path());

        let first = KeyStore::open(&config).unwrap();
        assert!(config.key_dir.join("default.pem").is_file());
        assert!(config.key_dir.join("lite.pem").is_file());
        assert!(first.compat_key_pair().is_none());
        assert_ne!(first.default_key_id(), first.lite_key_id());
        assert_eq!(first.count_keys(), 2);

        let second = KeyStore::open(&config).unwrap();
        assert_eq!(second.default_key_id(), first.default_key_id());
        assert_eq!(second.lite_key_id(), first.lite_key_id());
        assert_eq!(second.key_size_bits(first.default_key_id().as_str()).unwrap(), 512);
    }

    #[cfg(unix)]
    #[test]
    fn test_key_files_are_private() {
        use std::os::unix::fs::PermissionsExt;

        let tmp = tempfile::tempdir().unwrap();
        let config = config(tmp.path());
        KeyStore::open(&config).unwrap();
        let mode = fs::metadata(config.key_dir.join("default.pem"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_empty_key_file_is_replaced() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(tmp.path());
        fs::create_dir_all(&config.key_dir).unwrap();
        let default_path = config.key_dir.join("default.pem");
        fs::write(&default_path, "").unwrap();

        let first = KeyStore::open(&config).unwrap();
        let written = fs::read_to_string(&default_path).unwrap();
        assert_eq!(written, first.default_key_pair().pem());

        let second = KeyStore::open(&config).unwrap();
        assert_eq!(second.default_key_id(), first.default_key_id());
    }

    #[test]
    fn test_existing_key_file_is_not_overwritten() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("default.pem");
        let winner = KeyPair::generate(512).unwrap();
        let loser = KeyPair::generate(512).unwrap();

        assert!(write_new_pem(&path, winner.pem()).unwrap());
        assert!(!write_new_pem(&path, loser.pem()).unwrap());
        assert_eq!(fs::read_to_string(&path).unwrap(), winner.pem());
        assert_eq!(load_or_generate(&path, 512).unwrap().id(), winner.id());

        // No staging files are left behind.
        let leftovers: Vec<_> = fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(|entry| entry.ok()?.file_name().into_string().ok())
            .filter(|name| name != "default.pem")
            .collect();
        assert!(leftovers.is_empty(), "{leftovers:?}");
    }

    #[test]
    fn test_extra_pem_files_are_indexed() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(tmp.path());
        fs::create_dir_all(&config.key_dir).unwrap();
        let old = KeyPair::generate(512).unwrap();
        fs::write(config.key_dir.join("2019-default.pem"), old.pem()).unwrap();
        fs::write(config.key_dir.join("notes.txt"), "not a key").unwrap();

        let store = KeyStore::open(&config).unwrap();
        assert_eq!(store.count_keys(), 3);
        assert_eq!(
            store.key_pair_by_id(old.id().as_str()).unwrap().id(),
            old.id()
        );
        // Lookups are case-insensitive.
        let upper = old.id().as_str().to_ascii_uppercase();
        assert!(store.key_pair_by_id(&upper).is_ok());
    }

    #[test]
    fn test_unknown_id_is_key_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let store = KeyStore::open(&config(tmp.path())).unwrap();
        assert!(matches!(
            store.key_pair_by_id("00000000"),
            Err(CryptoError::KeyNotFound(id)) if id == "00000000"
        ));
    }

    #[test]
    fn test_unparsable_pem_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(tmp.path());
        fs::create_dir_all(&config.key_dir).unwrap();
        fs::write(config.key_dir.join("broken.pem"), "-----BEGIN GARBAGE-----\n").unwrap();

        let err = KeyStore::open(&config).unwrap_err();
        assert!(matches!(err, CryptoError::InvalidKeyFile { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_unusable_directory_is_fatal() {
        let tmp = tempfile::tempdir().unwrap();
        let blocker = tmp.path().join("keys");
        fs::write(&blocker, "a file, not a directory").unwrap();

        let err = KeyStore::open(&config(tmp.path())).unwrap_err();
        assert!(matches!(err, CryptoError::KeyStoreIo { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_compat_import_happens_once() {
        let tmp = tempfile::tempdir().unwrap();
        let legacy = KeyPair::generate(512).unwrap();
        let source = tmp.path().join("legacy.pem");
        fs::write(&source, legacy.pem()).unwrap();

        let mut config = config(tmp.path());
        config.compat_source = Some(source.clone());
        let store = KeyStore::open(&config).unwrap();
        assert_eq!(store.compat_key_id(), Some(legacy.id()));
        assert_eq!(store.count_keys(), 3);

        // Replacing the legacy file does not re-import it.
        let other = KeyPair::generate(512).unwrap();
        fs::write(&source, other.pem()).unwrap();
        let store = KeyStore::open(&config).unwrap();
        assert_eq!(store.compat_key_id(), Some(legacy.id()));
    }

    #[test]
    fn test_missing_compat_source_is_ignored() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = config(tmp.path());
        config.compat_source = Some(tmp.path().join("does-not-exist.pem"));
        let store = KeyStore::open(&config).unwrap();
        assert!(store.compat_key_id().is_none());
    }

    #[test]
    fn test_rotation_keeps_old_key() {
        let tmp = tempfile::tempdir().unwrap();
        let config = config(tmp.path());
        let mut store = KeyStore::open(&config).unwrap();
        let old = store.default_key_id().clone();

        let new = store.rotate_default().unwrap();
        assert_ne!(new, old);
        assert_eq!(store.default_key_id(), &new);
        assert!(store.key_pair_by_id(old.as_str()).is_ok());
        assert_eq!(store.count_keys(), 3);

        let archived: Vec<_> = fs::read_dir(&config.key_dir)
            .unwrap()
            .filter_map(|entry| entry.ok()?.file_name().into_string().ok())
            .filter(|name| name.starts_with("default-") && name.ends_with(".pem"))
            .collect();
        assert_eq!(archived.len(), 1);

        let reopened = KeyStore::open(&config).unwrap();
        assert_eq!(reopened.default_key_id(), &new);
        assert!(reopened.key_pair_by_id(old.as_str()).is_ok());
    }
}
