//! Key Authority - identity lifecycle and capability facade
//!
//! Owns one identity key pair for one application id: loads it from the key
//! store or mines a new one by proof-of-work, and exposes encrypt / decrypt /
//! sign / verify on top of it. Capability calls read an immutable snapshot of
//! the identity; replacing the identity publishes a new snapshot atomically.

use crate::backend::{CryptoBackend, KeyPair, KeyScheme};
use crate::config::KeyAuthorityConfig;
use crate::error::{KeyError, Result};
use crate::hash;
use crate::keystore::{DirectoryResolver, KeyStore};
use crate::pow::{CancellationToken, ProofOfWorkKeyGenerator};
use arc_swap::ArcSwap;
use keyauth_common::{log_info, log_warn, Component, Logger};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

/// Lifecycle of an authority's identity.
///
/// After construction the state is `Ready`. A later `generate_new` moves it
/// through `Generating` and `Generated`, and an import through `Loading` and
/// `Loaded`, back to `Ready`. These intermediate states describe the
/// replacement in progress: capability calls keep working throughout, against
/// the identity that was current when they started.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthorityState {
    Uninitialized,
    Loading,
    Loaded,
    Generating,
    Generated,
    Ready,
}

impl fmt::Display for AuthorityState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// How the current identity came to be
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IdentityOrigin {
    /// Read from the key store
    Loaded,
    /// Mined by proof-of-work
    Generated,
    /// Taken from a private key file
    Imported,
}

/// A key pair together with its identifier
pub struct Identity {
    key_pair: KeyPair,
    key_id: String,
    origin: IdentityOrigin,
}

impl Identity {
    pub fn key_id(&self) -> &str {
        &self.key_id
    }

    pub fn public_key(&self) -> &[u8] {
        self.key_pair.public_key()
    }

    pub fn scheme(&self) -> KeyScheme {
        self.key_pair.scheme()
    }

    pub fn difficulty(&self) -> u32 {
        hash::difficulty(&self.key_id)
    }

    pub fn origin(&self) -> IdentityOrigin {
        self.origin
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Identity")
            .field("key_id", &self.key_id)
            .field("scheme", &self.scheme())
            .field("origin", &self.origin)
            .finish_non_exhaustive()
    }
}

pub struct KeyAuthority {
    config: KeyAuthorityConfig,
    backend: Arc<dyn CryptoBackend>,
    store: KeyStore,
    generator: ProofOfWorkKeyGenerator,
    identity: ArcSwap<Identity>,
    state: Mutex<AuthorityState>,
    // serializes generate_new / load_from_file
    mutation: Mutex<()>,
    logger: Logger,
}

impl KeyAuthority {
    /// Load the identity for `config.app_id` or generate one at `config.difficulty`
    pub fn new(
        config: KeyAuthorityConfig,
        resolver: &dyn DirectoryResolver,
        logger: &Logger,
    ) -> Result<Self> {
        let store = KeyStore::new(resolver, &config.namespace, logger)?;
        Self::with_store(config, store, logger, &CancellationToken::new())
    }

    /// Same as [`KeyAuthority::new`] with an explicit store and a way to abort
    /// the initial proof-of-work search
    pub fn with_store(
        config: KeyAuthorityConfig,
        store: KeyStore,
        logger: &Logger,
        cancel: &CancellationToken,
    ) -> Result<Self> {
        let logger = logger
            .with_component(Component::Authority)
            .with_instance(config.instance_label());
        let backend = config.scheme.backend(&logger);
        let generator = ProofOfWorkKeyGenerator::new(config.pow.clone(), &logger);

        let mut state = AuthorityState::Uninitialized;
        let identity = Self::bootstrap(
            &config,
            backend.as_ref(),
            &store,
            &generator,
            &logger,
            cancel,
            &mut state,
        )?;
        transition(&logger, &mut state, AuthorityState::Ready);
        log_info!(
            logger,
            "Identity ready: {} key {} (difficulty {})",
            identity.scheme(),
            identity.key_id,
            identity.difficulty()
        );

        Ok(Self {
            config,
            backend,
            store,
            generator,
            identity: ArcSwap::from_pointee(identity),
            state: Mutex::new(state),
            mutation: Mutex::new(()),
            logger,
        })
    }

    fn bootstrap(
        config: &KeyAuthorityConfig,
        backend: &dyn CryptoBackend,
        store: &KeyStore,
        generator: &ProofOfWorkKeyGenerator,
        logger: &Logger,
        cancel: &CancellationToken,
        state: &mut AuthorityState,
    ) -> Result<Identity> {
        transition(logger, state, AuthorityState::Loading);
        let app_id = config.app_id.as_deref();

        match store.load(backend, app_id) {
            Ok(key_pair) => {
                let key_id = backend.identifier(key_pair.public_key())?;
                let difficulty = hash::difficulty(&key_id);
                if difficulty >= config.difficulty {
                    transition(logger, state, AuthorityState::Loaded);
                    return Ok(Identity {
                        key_pair,
                        key_id,
                        origin: IdentityOrigin::Loaded,
                    });
                }
                if !config.enforce_difficulty_on_load {
                    log_warn!(
                        logger,
                        "Stored key has difficulty {} below configured {}; keeping it",
                        difficulty,
                        config.difficulty
                    );
                    transition(logger, state, AuthorityState::Loaded);
                    return Ok(Identity {
                        key_pair,
                        key_id,
                        origin: IdentityOrigin::Loaded,
                    });
                }
                log_warn!(
                    logger,
                    "Stored key has difficulty {} below required {}; regenerating",
                    difficulty,
                    config.difficulty
                );
            }
            Err(KeyError::KeyNotFound(_)) => {
                log_info!(logger, "No stored identity, generating a new one");
            }
            Err(KeyError::MalformedKey(reason)) => {
                log_warn!(logger, "Stored private key rejected ({}); regenerating", reason);
            }
            Err(e) => return Err(e),
        }

        transition(logger, state, AuthorityState::Generating);
        let key_pair = generator.search_with_cancel(backend, config.difficulty, cancel)?;
        let key_id = backend.identifier(key_pair.public_key())?;
        store.save(backend, &key_pair, app_id)?;
        transition(logger, state, AuthorityState::Generated);
        Ok(Identity {
            key_pair,
            key_id,
            origin: IdentityOrigin::Generated,
        })
    }

    pub fn config(&self) -> &KeyAuthorityConfig {
        &self.config
    }

    pub fn scheme(&self) -> KeyScheme {
        self.backend.scheme()
    }

    /// Current lifecycle state; see [`AuthorityState`]
    pub fn state(&self) -> AuthorityState {
        *lock(&self.state)
    }

    pub fn key_store(&self) -> &KeyStore {
        &self.store
    }

    /// Current identity snapshot; stays valid after the identity is replaced
    pub fn identity(&self) -> Arc<Identity> {
        self.identity.load_full()
    }

    pub fn get_public_key(&self) -> Vec<u8> {
        self.identity.load().public_key().to_vec()
    }

    pub fn get_key_id(&self) -> String {
        self.identity.load().key_id.clone()
    }

    /// Difficulty of `key_id`, or of this authority's own identifier
    pub fn get_difficulty(&self, key_id: Option<&str>) -> u32 {
        match key_id {
            Some(key_id) => hash::difficulty(key_id),
            None => self.identity.load().difficulty(),
        }
    }

    pub fn encrypt(&self, data: &[u8], public_key: Option<&[u8]>) -> Result<Vec<u8>> {
        let identity = self.identity.load();
        self.backend.encrypt(&identity.key_pair, data, public_key)
    }

    pub fn decrypt(&self, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let identity = self.identity.load();
        self.backend.decrypt(&identity.key_pair, ciphertext)
    }

    pub fn sign(&self, data: &[u8]) -> Result<Vec<u8>> {
        let identity = self.identity.load();
        self.backend.sign(&identity.key_pair, data)
    }

    pub fn verify(&self, signature: &[u8], data: &[u8], public_key: Option<&[u8]>) -> bool {
        let identity = self.identity.load();
        self.backend
            .verify(&identity.key_pair, signature, data, public_key)
    }

    /// Replace the identity with a freshly mined key pair
    pub fn generate_new(&self, difficulty: u32) -> Result<()> {
        self.generate_new_with_cancel(difficulty, &CancellationToken::new())
    }

    pub fn generate_new_with_cancel(
        &self,
        difficulty: u32,
        cancel: &CancellationToken,
    ) -> Result<()> {
        let _guard = lock(&self.mutation);
        self.set_state(AuthorityState::Generating);

        let outcome = self
            .generator
            .search_with_cancel(self.backend.as_ref(), difficulty, cancel)
            .and_then(|key_pair| self.install(key_pair, IdentityOrigin::Generated));
        match outcome {
            Ok(()) => {
                self.set_state(AuthorityState::Generated);
                self.set_state(AuthorityState::Ready);
                Ok(())
            }
            Err(e) => {
                log_warn!(self.logger, "New identity not generated: {}", e);
                self.set_state(AuthorityState::Ready);
                Err(e)
            }
        }
    }

    /// Import a private key file and make it the identity.
    ///
    /// Returns `false` and leaves memory and disk untouched when the file is
    /// missing, unreadable or not a key of this authority's scheme.
    pub fn load_from_file(&self, path: impl AsRef<Path>) -> bool {
        let path = path.as_ref();
        match self.import_private_key(path) {
            Ok(()) => true,
            Err(e) => {
                log_warn!(self.logger, "Key not loaded from {}: {}", path.display(), e);
                false
            }
        }
    }

    /// Fallible form of [`KeyAuthority::load_from_file`]
    pub fn import_private_key(&self, path: &Path) -> Result<()> {
        let _guard = lock(&self.mutation);
        self.set_state(AuthorityState::Loading);
        match self.read_and_install(path) {
            Ok(()) => {
                self.set_state(AuthorityState::Loaded);
                self.set_state(AuthorityState::Ready);
                log_info!(self.logger, "Imported identity from {}", path.display());
                Ok(())
            }
            Err(e) => {
                self.set_state(AuthorityState::Ready);
                Err(e)
            }
        }
    }

    fn read_and_install(&self, path: &Path) -> Result<()> {
        if !path.is_file() {
            return Err(KeyError::KeyNotFound(format!(
                "{} is not a file",
                path.display()
            )));
        }
        let bytes = zeroize::Zeroizing::new(fs::read(path)?);
        let key_pair = self.backend.import_private(&bytes)?;
        self.install(key_pair, IdentityOrigin::Imported)
    }

    /// Export the current pair to arbitrary paths; `false` on any I/O failure
    pub fn save_to_files(
        &self,
        private_key_path: impl AsRef<Path>,
        public_key_path: impl AsRef<Path>,
    ) -> bool {
        let identity = self.identity.load();
        match self.store.save_to(
            self.backend.as_ref(),
            &identity.key_pair,
            private_key_path.as_ref(),
            public_key_path.as_ref(),
        ) {
            Ok(()) => true,
            Err(e) => {
                log_warn!(self.logger, "Key pair not exported: {}", e);
                false
            }
        }
    }

    // Persist to the default location, then publish. Memory is only touched
    // once the pair is on disk.
    fn install(&self, key_pair: KeyPair, origin: IdentityOrigin) -> Result<()> {
        let key_id = self.backend.identifier(key_pair.public_key())?;
        self.store
            .save(self.backend.as_ref(), &key_pair, self.config.app_id.as_deref())?;
        self.identity.store(Arc::new(Identity {
            key_pair,
            key_id,
            origin,
        }));
        Ok(())
    }

    fn set_state(&self, next: AuthorityState) {
        let mut state = lock(&self.state);
        transition(&self.logger, &mut state, next);
    }
}

impl fmt::Debug for KeyAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyAuthority")
            .field("scheme", &self.scheme())
            .field("app_id", &self.config.app_id)
            .field("identity", &*self.identity.load())
            .finish_non_exhaustive()
    }
}

fn transition(logger: &Logger, state: &mut AuthorityState, next: AuthorityState) {
    logger.debug_args(format_args!("State {state} -> {next}"));
    *state = next;
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    // guarded values are replaced whole, never left half-updated
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keystore::FixedDirResolver;
    use tempfile::TempDir;

    fn logger() -> Logger {
        Logger::new_root(Component::Authority, "authority-test")
    }

    #[test]
    fn test_state_after_construction() {
        let dir = TempDir::new().unwrap();
        let authority = KeyAuthority::new(
            KeyAuthorityConfig::new(KeyScheme::Ecc),
            &FixedDirResolver::new(dir.path()),
            &logger(),
        )
        .unwrap();
        assert_eq!(authority.state(), AuthorityState::Ready);
        assert_eq!(authority.scheme(), KeyScheme::Ecc);
    }

    #[test]
    fn test_snapshot_survives_replacement() {
        let dir = TempDir::new().unwrap();
        let authority = KeyAuthority::new(
            KeyAuthorityConfig::new(KeyScheme::Ecc),
            &FixedDirResolver::new(dir.path()),
            &logger(),
        )
        .unwrap();
        let old = authority.identity();
        authority.generate_new(1).unwrap();
        let new = authority.identity();
        assert_ne!(old.key_id(), new.key_id());
        assert!(new.difficulty() >= 1);
        // the old snapshot is still a complete identity
        assert_eq!(old.key_id(), hex::encode(old.public_key()));
        assert_eq!(authority.get_key_id(), new.key_id());
        assert_eq!(authority.state(), AuthorityState::Ready);
    }

    #[test]
    fn test_cancelled_generate_new_keeps_identity() {
        let dir = TempDir::new().unwrap();
        let authority = KeyAuthority::new(
            KeyAuthorityConfig::new(KeyScheme::Ecc),
            &FixedDirResolver::new(dir.path()),
            &logger(),
        )
        .unwrap();
        let before = authority.get_key_id();
        let cancel = CancellationToken::new();
        cancel.cancel();
        assert!(matches!(
            authority.generate_new_with_cancel(64, &cancel),
            Err(KeyError::Cancelled)
        ));
        assert_eq!(authority.get_key_id(), before);
        assert_eq!(authority.state(), AuthorityState::Ready);
    }

    #[test]
    fn test_get_difficulty_of_foreign_id() {
        let dir = TempDir::new().unwrap();
        let authority = KeyAuthority::new(
            KeyAuthorityConfig::new(KeyScheme::Ecc),
            &FixedDirResolver::new(dir.path()),
            &logger(),
        )
        .unwrap();
        let own = authority.get_key_id();
        assert_eq!(authority.get_difficulty(None), hash::difficulty(&own));
        assert_eq!(
            authority.get_difficulty(Some("peer")),
            hash::difficulty("peer")
        );
    }

    #[test]
    fn test_state_tracks_replacement_in_progress() {
        let dir = TempDir::new().unwrap();
        let authority = Arc::new(
            KeyAuthority::new(
                KeyAuthorityConfig::new(KeyScheme::Ecc),
                &FixedDirResolver::new(dir.path()),
                &logger(),
            )
            .unwrap(),
        );
        assert_eq!(authority.identity().origin(), IdentityOrigin::Generated);

        let cancel = CancellationToken::new();
        let handle = {
            let authority = Arc::clone(&authority);
            let cancel = cancel.clone();
            std::thread::spawn(move || authority.generate_new_with_cancel(200, &cancel))
        };
        while authority.state() != AuthorityState::Generating {
            std::thread::yield_now();
        }
        // the current identity stays usable while a replacement is mined
        let signature = authority.sign(b"during").unwrap();
        assert!(authority.verify(&signature, b"during", None));

        cancel.cancel();
        assert!(matches!(handle.join().unwrap(), Err(KeyError::Cancelled)));
        assert_eq!(authority.state(), AuthorityState::Ready);
    }

    #[test]
    fn test_import_returns_to_ready() {
        let dir = TempDir::new().unwrap();
        let authority = KeyAuthority::new(
            KeyAuthorityConfig::new(KeyScheme::Ecc),
            &FixedDirResolver::new(dir.path()),
            &logger(),
        )
        .unwrap();

        assert!(!authority.load_from_file(dir.path().join("absent.pem")));
        assert_eq!(authority.state(), AuthorityState::Ready);

        let source = KeyScheme::Ecc.backend(&logger()).generate().unwrap();
        let key_file = dir.path().join("import.pem");
        fs::write(&key_file, hex::encode(source.public_key()).as_bytes()).unwrap();
        // a public key is not a private key
        assert!(!authority.load_from_file(&key_file));

        let backend = KeyScheme::Ecc.backend(&logger());
        fs::write(&key_file, &*backend.export_private(&source).unwrap()).unwrap();
        assert!(authority.load_from_file(&key_file));
        assert_eq!(authority.state(), AuthorityState::Ready);
        let identity = authority.identity();
        assert_eq!(identity.origin(), IdentityOrigin::Imported);
        assert_eq!(identity.public_key(), source.public_key());
    }
}
