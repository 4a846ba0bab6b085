//! Identity commands
//!
//! Each command opens the key authority described by the CLI configuration,
//! which loads the stored identity or mines one on first use.

use anyhow::{bail, Context, Result};
use keyauth_common::{log_debug, log_info, Component, Logger};
use keyauth_keys::{difficulty, IdentityOrigin, KeyAuthority, KeyAuthorityConfig, KeyScheme};
use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::CliConfig;

/// What `show` and friends report about the current identity
#[derive(Debug, Clone, Serialize)]
pub struct IdentitySummary {
    pub scheme: KeyScheme,
    pub key_id: String,
    pub difficulty: u32,
    pub origin: IdentityOrigin,
    pub public_key: String,
    pub key_dir: PathBuf,
}

impl fmt::Display for IdentitySummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "scheme:     {}", self.scheme)?;
        writeln!(f, "key id:     {}", self.key_id)?;
        writeln!(f, "difficulty: {}", self.difficulty)?;
        writeln!(f, "origin:     {:?}", self.origin)?;
        writeln!(f, "key dir:    {}", self.key_dir.display())?;
        write!(f, "public key: {}", self.public_key)
    }
}

pub struct KeyCommand {
    config_dir: PathBuf,
    config: CliConfig,
    logger: Logger,
}

impl KeyCommand {
    pub fn new(config_dir: PathBuf, config: CliConfig, logger: &Logger) -> Self {
        Self {
            config_dir,
            config,
            logger: logger.with_component(Component::Cli),
        }
    }

    pub fn config(&self) -> &CliConfig {
        &self.config
    }

    pub fn open(&self) -> Result<KeyAuthority> {
        self.open_with(self.config.authority_config())
    }

    fn open_with(&self, config: KeyAuthorityConfig) -> Result<KeyAuthority> {
        log_debug!(
            self.logger,
            "Opening {} authority (app id {:?})",
            config.scheme,
            config.app_id
        );
        let resolver = self.config.resolver();
        KeyAuthority::new(config, resolver.as_ref(), &self.logger)
            .context("Failed to open key authority")
    }

    /// Write the config file and create the identity.
    ///
    /// Returns `None` when a config already exists and `force` is not set.
    pub fn init(&self, force: bool) -> Result<Option<IdentitySummary>> {
        if CliConfig::exists(&self.config_dir) && !force {
            return Ok(None);
        }
        std::fs::create_dir_all(&self.config_dir).with_context(|| {
            format!("Failed to create config directory: {:?}", self.config_dir)
        })?;
        self.config.save(&self.config_dir)?;
        log_info!(self.logger, "Configuration written to {:?}", self.config_dir);

        let authority = self.open()?;
        Ok(Some(summarize(&authority)))
    }

    pub fn show(&self) -> Result<IdentitySummary> {
        Ok(summarize(&self.open()?))
    }

    /// Replace the identity with a new one of at least `target` difficulty
    pub fn generate(&self, target: Option<u32>) -> Result<IdentitySummary> {
        let target = target.unwrap_or(self.config.difficulty);
        let authority = self.open_with(self.config.authority_config().with_difficulty(target))?;
        if authority.identity().origin() == IdentityOrigin::Generated {
            // opening just mined an identity at this target
            return Ok(summarize(&authority));
        }
        log_info!(self.logger, "Generating new identity with difficulty {}", target);
        authority
            .generate_new(target)
            .context("Failed to generate a new identity")?;
        Ok(summarize(&authority))
    }

    pub fn import(&self, private_key: &Path) -> Result<IdentitySummary> {
        let authority = self.open()?;
        authority
            .import_private_key(private_key)
            .with_context(|| format!("Failed to import private key from {private_key:?}"))?;
        Ok(summarize(&authority))
    }

    pub fn export(&self, private_key: &Path, public_key: &Path) -> Result<()> {
        let authority = self.open()?;
        if !authority.save_to_files(private_key, public_key) {
            bail!("Failed to export key pair to {private_key:?} and {public_key:?}");
        }
        Ok(())
    }
}

/// Difficulty of an arbitrary identifier; needs no authority
pub fn key_difficulty(key_id: &str) -> u32 {
    difficulty(key_id)
}

fn summarize(authority: &KeyAuthority) -> IdentitySummary {
    let identity = authority.identity();
    let public_key = match identity.scheme() {
        KeyScheme::Rsa => String::from_utf8_lossy(identity.public_key()).trim().to_string(),
        KeyScheme::Ecc => hex::encode(identity.public_key()),
    };
    IdentitySummary {
        scheme: identity.scheme(),
        key_id: identity.key_id().to_string(),
        difficulty: identity.difficulty(),
        origin: identity.origin(),
        public_key,
        key_dir: authority.key_store().base_dir().to_path_buf(),
    }
}
