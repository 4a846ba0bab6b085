//! Configuration management for the keyauth CLI
//!
//! The CLI keeps its settings as pretty-printed JSON in `keyauth.json` inside
//! the config directory. Command-line flags override what the file says.

use anyhow::{Context, Result};
use keyauth_keys::{
    AppDataDirResolver, DirectoryResolver, FixedDirResolver, KeyAuthorityConfig, KeyScheme,
    PowConfig,
};
use serde::{Deserialize, Serialize};
use serde_json::{from_str, to_string_pretty};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_FILE: &str = "keyauth.json";

/// Settings stored in the config file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CliConfig {
    pub scheme: KeyScheme,

    /// Application id selecting which key files are used
    pub app_id: Option<String>,

    /// Difficulty for newly generated identities
    pub difficulty: u32,

    /// Proof-of-work worker threads
    pub workers: usize,

    /// Abort proof-of-work after this many seconds
    pub timeout_secs: Option<u64>,

    pub enforce_difficulty_on_load: bool,

    /// Key directory; the per-user data directory when unset
    pub key_dir: Option<PathBuf>,
}

impl Default for CliConfig {
    fn default() -> Self {
        Self {
            scheme: KeyScheme::Ecc,
            app_id: None,
            difficulty: 0,
            workers: 1,
            timeout_secs: None,
            enforce_difficulty_on_load: false,
            key_dir: None,
        }
    }
}

impl CliConfig {
    /// Load configuration from file
    pub fn load(config_dir: &Path) -> Result<Self> {
        let config_file = config_dir.join(CONFIG_FILE);

        if !config_file.exists() {
            return Err(anyhow::anyhow!(
                "Configuration file not found: {:?}",
                config_file
            ));
        }

        let config_content = std::fs::read_to_string(&config_file)
            .with_context(|| format!("Failed to read config file: {config_file:?}"))?;

        let config: CliConfig = from_str(&config_content)
            .with_context(|| format!("Failed to parse config file: {config_file:?}"))?;

        Ok(config)
    }

    /// The stored configuration, or defaults when there is none yet
    pub fn load_or_default(config_dir: &Path) -> Result<Self> {
        if Self::exists(config_dir) {
            Self::load(config_dir)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, config_dir: &Path) -> Result<()> {
        let config_file = config_dir.join(CONFIG_FILE);

        let config_content = to_string_pretty(self).context("Failed to serialize config")?;

        std::fs::write(&config_file, config_content)
            .with_context(|| format!("Failed to write config file: {config_file:?}"))?;

        Ok(())
    }

    /// Check if configuration exists
    pub fn exists(config_dir: &Path) -> bool {
        config_dir.join(CONFIG_FILE).exists()
    }

    pub fn authority_config(&self) -> KeyAuthorityConfig {
        let mut pow = PowConfig::default().with_workers(self.workers);
        if let Some(secs) = self.timeout_secs {
            pow = pow.with_timeout(Duration::from_secs(secs));
        }
        let mut config = KeyAuthorityConfig::new(self.scheme)
            .with_difficulty(self.difficulty)
            .with_pow(pow)
            .with_enforced_difficulty(self.enforce_difficulty_on_load);
        if let Some(app_id) = &self.app_id {
            config = config.with_app_id(app_id.clone());
        }
        config
    }

    pub fn resolver(&self) -> Box<dyn DirectoryResolver> {
        match &self.key_dir {
            Some(dir) => Box::new(FixedDirResolver::new(dir.clone())),
            None => Box::new(AppDataDirResolver),
        }
    }
}
