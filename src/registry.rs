//! Engine registry and cipher catalog.
//!
//! The registry is built once at startup and shared read-only behind an
//! `Arc`. It knows three things:
//!
//! 1. Which engines are registered, in registration order.
//! 2. Which ciphers those engines provide. Every cipher belongs to exactly
//!    one engine; two engines advertising the same identifier is an error.
//! 3. Which ciphers are enabled for encryption, most preferred first. Any
//!    registered cipher may still be used to decrypt.

use std::collections::BTreeMap;
use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::config::{Config, MAX_RSA_KEY_BITS};
use crate::engine::{
    AeadEngine, BlockEngine, CipherKind, Engine, PlaintextEngine, RsaEngine,
};
use crate::error::{CryptoError, CryptoResult};

/// A cataloged cipher. Immutable once registered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CipherSpec {
    pub id: String,
    /// Name of the engine that provides the cipher.
    pub engine: String,
    pub kind: CipherKind,
    /// Declared key size in bytes.
    pub key_size: usize,
    /// Declared IV size in bytes.
    pub iv_size: usize,
    pub mode: String,
}

impl CipherSpec {
    pub fn is_asymmetric(&self) -> bool {
        self.kind == CipherKind::Asymmetric
    }
}

/// Canonical form of a cipher name: trimmed, lower-case, `_` replaced by `-`.
pub fn normalize_cipher_name(name: &str) -> String {
    name.trim().to_ascii_lowercase().replace('_', "-")
}

/// The form a cipher name takes in a headline.
pub fn display_name(id: &str) -> String {
    normalize_cipher_name(id).to_ascii_uppercase()
}

/// Catalog of engines and the ciphers they provide.
#[derive(Default)]
pub struct CipherRegistry {
    engines: Vec<Arc<dyn Engine>>,
    ciphers: BTreeMap<String, CipherSpec>,
    preferred: Vec<String>,
}

impl CipherRegistry {
    /// An empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the stock engines, their ciphers, and the preference
    /// order from `config`.
    pub fn with_default_engines(config: &Config) -> CryptoResult<Self> {
        let mut registry = Self::new();
        registry.register_engine(Arc::new(PlaintextEngine::new()))?;
        registry.register_engine(Arc::new(BlockEngine::new()))?;
        registry.register_engine(Arc::new(AeadEngine::new()))?;
        registry.register_engine(Arc::new(RsaEngine::new(
            MAX_RSA_KEY_BITS.max(config.default_key_bits),
        )))?;
        registry.register_ciphers()?;
        registry.set_preferred_ciphers(&config.preferred_ciphers);

        info!(
            engines = registry.engines.len(),
            ciphers = registry.ciphers.len(),
            preferred = ?registry.preferred,
            "cipher registry ready"
        );
        Ok(registry)
    }

    /// Add an engine. Its `init` runs here; the engine's ciphers are not
    /// cataloged until [`register_ciphers`](Self::register_ciphers).
    pub fn register_engine(&mut self, engine: Arc<dyn Engine>) -> CryptoResult<()> {
        let name = engine.name();
        if self.has_engine(name) {
            return Err(CryptoError::DuplicateEngine(name.to_string()));
        }
        engine.init().map_err(|e| CryptoError::EngineInit {
            engine: name.to_string(),
            reason: e.to_string(),
        })?;
        debug!(engine = name, "engine registered");
        self.engines.push(engine);
        Ok(())
    }

    /// Rebuild the cipher catalog from every registered engine.
    ///
    /// Preferred ciphers that are no longer provided are dropped.
    pub fn register_ciphers(&mut self) -> CryptoResult<()> {
        let mut catalog: BTreeMap<String, CipherSpec> = BTreeMap::new();
        for engine in &self.engines {
            for params in engine.list_ciphers() {
                let id = normalize_cipher_name(&params.id);
                if let Some(existing) = catalog.get(&id) {
                    return Err(CryptoError::DuplicateCipher {
                        cipher: id,
                        first: existing.engine.clone(),
                        second: engine.name().to_string(),
                    });
                }
                catalog.insert(
                    id.clone(),
                    CipherSpec {
                        id,
                        engine: engine.name().to_string(),
                        kind: engine.kind(),
                        key_size: params.key_size,
                        iv_size: params.iv_size,
                        mode: params.mode.to_ascii_lowercase(),
                    },
                );
            }
        }
        self.ciphers = catalog;
        let ciphers = &self.ciphers;
        self.preferred.retain(|id| ciphers.contains_key(id));
        Ok(())
    }

    /// Set the ciphers enabled for encryption, most preferred first.
    ///
    /// Names that are not registered are skipped with a warning, and
    /// repeated names keep their first position.
    pub fn set_preferred_ciphers<S: AsRef<str>>(&mut self, names: &[S]) {
        let mut preferred = Vec::with_capacity(names.len());
        for name in names {
            let id = normalize_cipher_name(name.as_ref());
            if !self.ciphers.contains_key(&id) {
                warn!(cipher = %id, "preferred cipher is not registered, skipping");
                continue;
            }
            if !preferred.contains(&id) {
                preferred.push(id);
            }
        }
        self.preferred = preferred;
    }

    pub fn lookup(&self, id: &str) -> Option<&CipherSpec> {
        self.ciphers.get(&normalize_cipher_name(id))
    }

    /// Like [`lookup`](Self::lookup), failing with `UnknownCipher`.
    pub fn require(&self, id: &str) -> CryptoResult<&CipherSpec> {
        self.lookup(id)
            .ok_or_else(|| CryptoError::UnknownCipher(normalize_cipher_name(id)))
    }

    pub fn is_usable_for_encryption(&self, id: &str) -> bool {
        let id = normalize_cipher_name(id);
        self.preferred.contains(&id)
    }

    /// The default cipher for encryption, if any cipher is enabled.
    pub fn preferred_cipher(&self) -> Option<&CipherSpec> {
        self.preferred.first().and_then(|id| self.ciphers.get(id))
    }

    /// Pick the cipher for an encryption request. `None` or a blank name
    /// selects the preferred default.
    pub fn resolve_for_encryption(&self, requested: Option<&str>) -> CryptoResult<&CipherSpec> {
        match requested.map(str::trim).filter(|name| !name.is_empty()) {
            Some(name) => {
                let spec = self.require(name)?;
                if !self.is_usable_for_encryption(&spec.id) {
                    return Err(CryptoError::CipherNotEncryptable(spec.id.clone()));
                }
                Ok(spec)
            }
            None => self.preferred_cipher().ok_or(CryptoError::NoUsableCipher),
        }
    }

    pub fn has_engine(&self, name: &str) -> bool {
        self.engines.iter().any(|engine| engine.name() == name)
    }

    /// Registered engine names, in registration order.
    pub fn list_engines(&self) -> Vec<&'static str> {
        self.engines.iter().map(|engine| engine.name()).collect()
    }

    pub fn engine_url(&self, name: &str) -> Option<&'static str> {
        self.find_engine(name).map(|engine| engine.url())
    }

    /// Every cataloged cipher, optionally restricted to one engine, sorted
    /// by identifier.
    pub fn list_ciphers(&self, engine: Option<&str>) -> Vec<&CipherSpec> {
        self.ciphers
            .values()
            .filter(|spec| engine.map_or(true, |name| spec.engine == name))
            .collect()
    }

    /// Ciphers enabled for encryption, optionally restricted to one engine,
    /// in preference order.
    pub fn list_usable_ciphers(&self, engine: Option<&str>) -> Vec<&CipherSpec> {
        self.preferred
            .iter()
            .filter_map(|id| self.ciphers.get(id))
            .filter(|spec| engine.map_or(true, |name| spec.engine == name))
            .collect()
    }

    /// The engine providing `spec`.
    pub(crate) fn engine_for(&self, spec: &CipherSpec) -> CryptoResult<&Arc<dyn Engine>> {
        self.find_engine(&spec.engine)
            .ok_or_else(|| CryptoError::UnknownCipher(spec.id.clone()))
    }

    fn find_engine(&self, name: &str) -> Option<&Arc<dyn Engine>> {
        self.engines.iter().find(|engine| engine.name() == name)
    }
}

impl std::fmt::Debug for CipherRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CipherRegistry")
            .field("engines", &self.list_engines())
            .field("ciphers", &self.ciphers.keys().collect::<Vec<_>>())
            .field("preferred", &self.preferred)
            .finish()
    }
}
