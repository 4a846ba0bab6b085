//! keyauth CLI library
//!
//! Configuration handling and the identity commands behind the `keyauth`
//! binary.

pub mod commands;
pub mod config;

pub use commands::{key_difficulty, IdentitySummary, KeyCommand};
pub use config::CliConfig;

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
