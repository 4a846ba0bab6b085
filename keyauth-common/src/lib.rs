//! Keyauth Common
//!
//! Component-based structured logging shared by the keyauth crates.

#[macro_use]
mod macros;

pub mod logging;

pub use logging::{Component, Logger};

// Used by the exported log_* macros
#[doc(hidden)]
pub use log as __log;
