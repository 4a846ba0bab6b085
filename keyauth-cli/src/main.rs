//! keyauth - identity key management
//!
//! Creates, inspects and replaces the proof-of-work identity key pair of a
//! node.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use keyauth_cli::{key_difficulty, CliConfig, KeyCommand};
use keyauth_common::{Component, Logger};
use keyauth_keys::KeyScheme;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "keyauth")]
#[command(about = "Identity key authority - create and manage proof-of-work identity keys")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Configuration directory (default: ~/.keyauth)
    #[arg(short, long, global = true)]
    config_dir: Option<PathBuf>,

    /// Application id selecting the key files
    #[arg(long, global = true)]
    app_id: Option<String>,

    /// Key scheme: rsa or ecc
    #[arg(long, global = true)]
    scheme: Option<KeyScheme>,

    /// Difficulty for newly generated identities
    #[arg(long, global = true)]
    difficulty: Option<u32>,

    /// Proof-of-work worker threads
    #[arg(long, global = true)]
    workers: Option<usize>,
}

#[derive(Subcommand)]
enum Commands {
    /// Write the config file and create the identity
    #[command(name = "init")]
    Init {
        /// Overwrite an existing configuration
        #[arg(short, long)]
        force: bool,
    },
    /// Print the current identity
    #[command(name = "show")]
    Show,
    /// Replace the identity with a freshly mined one at --difficulty
    #[command(name = "generate")]
    Generate,
    /// Make a private key file the identity
    #[command(name = "import")]
    Import { private_key: PathBuf },
    /// Write the current key pair to the given files
    #[command(name = "export")]
    Export {
        private_key: PathBuf,
        public_key: PathBuf,
    },
    /// Print the difficulty of a key id
    #[command(name = "difficulty")]
    Difficulty { key_id: String },
}

impl Cli {
    fn apply_overrides(&self, config: &mut CliConfig) {
        if let Some(scheme) = self.scheme {
            config.scheme = scheme;
        }
        if let Some(app_id) = &self.app_id {
            config.app_id = Some(app_id.clone());
        }
        if let Some(difficulty) = self.difficulty {
            config.difficulty = difficulty;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize logging
    let default_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .init();

    let logger = Logger::new_root(Component::Cli, "main");

    // Determine config directory
    let config_dir = match &cli.config_dir {
        Some(dir) => dir.clone(),
        None => dirs::home_dir()
            .context("Could not determine home directory")?
            .join(".keyauth"),
    };

    let mut config = CliConfig::load_or_default(&config_dir)?;
    cli.apply_overrides(&mut config);
    let command = KeyCommand::new(config_dir.clone(), config, &logger);

    match cli.command {
        Some(Commands::Init { force }) => match command.init(force)? {
            Some(summary) => println!("{summary}"),
            None => {
                println!("Configuration already exists in {config_dir:?}");
                println!("Use --force to overwrite it.");
            }
        },
        Some(Commands::Show) => println!("{}", command.show()?),
        Some(Commands::Generate) => println!("{}", command.generate(cli.difficulty)?),
        Some(Commands::Import { private_key }) => println!("{}", command.import(&private_key)?),
        Some(Commands::Export {
            private_key,
            public_key,
        }) => {
            command.export(&private_key, &public_key)?;
            println!("Exported key pair to {private_key:?} and {public_key:?}");
        }
        Some(Commands::Difficulty { key_id }) => println!("{}", key_difficulty(&key_id)),
        None => {
            if CliConfig::exists(&config_dir) {
                println!("Configuration found. Use 'keyauth show' to print the identity.");
            } else {
                println!("No configuration found. Use 'keyauth init' to create an identity.");
            }
        }
    }

    Ok(())
}
