//! On-disk persistence of identity key pairs.
//!
//! Each application id owns two files under the resolved base directory:
//! `private_key{app_id}.pem` and `public_key{app_id}.pubkey`. Both halves are
//! written to temporaries first and renamed into place only once both writes
//! succeeded.

use crate::backend::{CryptoBackend, KeyPair};
use crate::error::{KeyError, KeyHalf, Result};
use keyauth_common::{log_debug, log_info, log_warn, Component, Logger};
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

pub const PRIVATE_KEY_PREFIX: &str = "private_key";
pub const PUBLIC_KEY_PREFIX: &str = "public_key";
pub const PRIVATE_KEY_EXT: &str = "pem";
pub const PUBLIC_KEY_EXT: &str = "pubkey";

/// Namespace handed to the resolver when the caller does not pick one
pub const DEFAULT_NAMESPACE: &str = "keyauth";

/// Supplies the base directory keys are kept in.
pub trait DirectoryResolver: Send + Sync {
    fn base_dir(&self, namespace: &str) -> Result<PathBuf>;
}

/// Always returns the same directory
#[derive(Debug, Clone)]
pub struct FixedDirResolver {
    path: PathBuf,
}

impl FixedDirResolver {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

impl DirectoryResolver for FixedDirResolver {
    fn base_dir(&self, _namespace: &str) -> Result<PathBuf> {
        Ok(self.path.clone())
    }
}

/// `<user data dir>/<namespace>/keys`
#[derive(Debug, Clone, Default)]
pub struct AppDataDirResolver;

impl DirectoryResolver for AppDataDirResolver {
    fn base_dir(&self, namespace: &str) -> Result<PathBuf> {
        let data_dir = dirs::data_dir().ok_or_else(|| {
            KeyError::InvalidOperation("could not determine user data directory".to_string())
        })?;
        Ok(data_dir.join(namespace).join("keys"))
    }
}

/// Resolved locations of both halves of a key pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyPaths {
    pub private_key: PathBuf,
    pub public_key: PathBuf,
}

pub struct KeyStore {
    base_dir: PathBuf,
    logger: Logger,
}

impl KeyStore {
    /// Resolve the base directory once and keep it for the store's lifetime
    pub fn new(resolver: &dyn DirectoryResolver, namespace: &str, logger: &Logger) -> Result<Self> {
        let base_dir = resolver.base_dir(namespace)?;
        Ok(Self::with_base_dir(base_dir, logger))
    }

    pub fn with_base_dir(base_dir: impl Into<PathBuf>, logger: &Logger) -> Self {
        Self {
            base_dir: base_dir.into(),
            logger: logger.with_component(Component::KeyStore),
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn resolve_paths(&self, app_id: Option<&str>) -> KeyPaths {
        let suffix = app_id.unwrap_or("");
        KeyPaths {
            private_key: self
                .base_dir
                .join(format!("{PRIVATE_KEY_PREFIX}{suffix}.{PRIVATE_KEY_EXT}")),
            public_key: self
                .base_dir
                .join(format!("{PUBLIC_KEY_PREFIX}{suffix}.{PUBLIC_KEY_EXT}")),
        }
    }

    /// Load the pair for `app_id`; `KeyNotFound` unless both files exist.
    ///
    /// The private file is authoritative. `MalformedKey` means the private
    /// key itself is unusable; a public file that is damaged or belongs to
    /// another key is rewritten from the private key.
    pub fn load(&self, backend: &dyn CryptoBackend, app_id: Option<&str>) -> Result<KeyPair> {
        let paths = self.resolve_paths(app_id);
        if !paths.private_key.is_file() || !paths.public_key.is_file() {
            return Err(KeyError::KeyNotFound(format!(
                "no key pair stored in {}",
                self.base_dir.display()
            )));
        }
        let private = zeroize::Zeroizing::new(fs::read(&paths.private_key)?);
        let public = fs::read(&paths.public_key)?;

        let key_pair = match backend.from_parts(&private, &public) {
            Ok(key_pair) => key_pair,
            Err(KeyError::MalformedKey(reason)) => {
                let key_pair = backend.import_private(&private)?;
                log_warn!(
                    self.logger,
                    "Public key at {} rejected ({}); restoring it from the private key",
                    paths.public_key.display(),
                    reason
                );
                if let Err(e) = self.restore_public(backend, &key_pair, &paths.public_key) {
                    log_warn!(self.logger, "Public key not restored: {}", e);
                }
                key_pair
            }
            Err(e) => return Err(e),
        };
        log_debug!(
            self.logger,
            "Loaded {} key pair from {}",
            key_pair.scheme(),
            paths.private_key.display()
        );
        Ok(key_pair)
    }

    fn restore_public(
        &self,
        backend: &dyn CryptoBackend,
        key_pair: &KeyPair,
        public_path: &Path,
    ) -> Result<()> {
        let tmp = tmp_path(public_path);
        write_file(&tmp, &backend.export_public(key_pair), false)
            .and_then(|_| fs::rename(&tmp, public_path))
            .map_err(|source| {
                discard(&tmp);
                KeyError::Persist {
                    half: KeyHalf::Public,
                    source,
                }
            })
    }

    /// Persist the pair under the paths resolved for `app_id`
    pub fn save(
        &self,
        backend: &dyn CryptoBackend,
        key_pair: &KeyPair,
        app_id: Option<&str>,
    ) -> Result<KeyPaths> {
        let paths = self.resolve_paths(app_id);
        self.save_to(backend, key_pair, &paths.private_key, &paths.public_key)?;
        Ok(paths)
    }

    /// Persist the pair to arbitrary locations
    pub fn save_to(
        &self,
        backend: &dyn CryptoBackend,
        key_pair: &KeyPair,
        private_path: &Path,
        public_path: &Path,
    ) -> Result<()> {
        let private = backend.export_private(key_pair)?;
        let public = backend.export_public(key_pair);

        let private_tmp = tmp_path(private_path);
        let public_tmp = tmp_path(public_path);
        let staged = write_file(&private_tmp, &private, true)
            .map_err(|source| KeyError::Persist {
                half: KeyHalf::Private,
                source,
            })
            .and_then(|_| {
                write_file(&public_tmp, &public, false).map_err(|source| KeyError::Persist {
                    half: KeyHalf::Public,
                    source,
                })
            });
        if let Err(e) = staged {
            discard(&private_tmp);
            discard(&public_tmp);
            log_warn!(self.logger, "Key pair not saved: {}", e);
            return Err(e);
        }

        if let Err(source) = fs::rename(&private_tmp, private_path) {
            discard(&private_tmp);
            discard(&public_tmp);
            return Err(KeyError::Persist {
                half: KeyHalf::Private,
                source,
            });
        }
        if let Err(source) = fs::rename(&public_tmp, public_path) {
            discard(&public_tmp);
            log_warn!(
                self.logger,
                "Private key committed to {} but public key failed: {}",
                private_path.display(),
                source
            );
            return Err(KeyError::Persist {
                half: KeyHalf::Public,
                source,
            });
        }

        log_info!(
            self.logger,
            "Saved {} key pair to {}",
            key_pair.scheme(),
            private_path.display()
        );
        Ok(())
    }
}

fn tmp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

fn discard(path: &Path) {
    let _ = fs::remove_file(path);
}

fn create_private_dir(dir: &Path) -> io::Result<()> {
    if dir.as_os_str().is_empty() || dir.is_dir() {
        return Ok(());
    }
    let mut builder = fs::DirBuilder::new();
    builder.recursive(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::DirBuilderExt;
        builder.mode(0o700);
    }
    builder.create(dir)
}

fn write_file(path: &Path, bytes: &[u8], secret: bool) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        create_private_dir(parent)?;
    }
    let mut options = fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(if secret { 0o600 } else { 0o644 });
    }
    #[cfg(not(unix))]
    let _ = secret;
    let mut f = options.open(path)?;
    f.write_all(bytes)?;
    f.flush()?;
    f.sync_all()?;
    Ok(())
}
