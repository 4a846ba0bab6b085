//! Identity key authority
//!
//! A node's identity is an asymmetric key pair (RSA-2048 or secp256k1) whose
//! identifier must meet a proof-of-work difficulty. This crate loads or mines
//! that key pair, keeps it on disk, and exposes encrypt / decrypt / sign /
//! verify on top of it.
//!
//! ```no_run
//! use keyauth_common::{Component, Logger};
//! use keyauth_keys::{AppDataDirResolver, KeyAuthority, KeyAuthorityConfig, KeyScheme};
//!
//! # fn main() -> keyauth_keys::Result<()> {
//! let logger = Logger::new_root(Component::Authority, "node");
//! let config = KeyAuthorityConfig::new(KeyScheme::Ecc).with_difficulty(8);
//! let authority = KeyAuthority::new(config, &AppDataDirResolver, &logger)?;
//! let signature = authority.sign(b"hello")?;
//! assert!(authority.verify(&signature, b"hello", None));
//! # Ok(())
//! # }
//! ```

pub mod authority;
pub mod backend;
pub mod config;
pub mod error;
pub mod hash;
pub mod keystore;
pub mod pow;

pub use authority::{AuthorityState, Identity, IdentityOrigin, KeyAuthority};
pub use backend::{CryptoBackend, EccBackend, KeyPair, KeyScheme, RsaBackend};
pub use config::KeyAuthorityConfig;
pub use error::{KeyError, KeyHalf, Result};
pub use hash::{difficulty, meets_difficulty, numeric_hash, sha3_256, NumericHash, MAX_DIFFICULTY};
pub use keystore::{AppDataDirResolver, DirectoryResolver, FixedDirResolver, KeyPaths, KeyStore};
pub use pow::{CancellationToken, PowConfig, ProofOfWorkKeyGenerator};
