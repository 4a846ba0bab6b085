//! Pluggable asymmetric schemes behind one capability contract.
//!
//! A backend is stateless apart from its logger: key material lives in
//! [`KeyPair`] values which the caller owns and hands to each operation.

use crate::error::{KeyError, Result};
use keyauth_common::Logger;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use zeroize::Zeroizing;

pub mod ecc;
pub mod rsa;

pub use ecc::EccBackend;
pub use rsa::RsaBackend;

/// Asymmetric scheme an authority is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum KeyScheme {
    /// RSA with a 2048-bit modulus
    Rsa,
    /// ECDSA / ECIES over secp256k1
    Ecc,
}

impl KeyScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            KeyScheme::Rsa => "rsa",
            KeyScheme::Ecc => "ecc",
        }
    }

    /// Instantiate the backend for this scheme
    pub fn backend(&self, logger: &Logger) -> Arc<dyn CryptoBackend> {
        match self {
            KeyScheme::Rsa => Arc::new(RsaBackend::new(logger)),
            KeyScheme::Ecc => Arc::new(EccBackend::new(logger)),
        }
    }
}

impl fmt::Display for KeyScheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for KeyScheme {
    type Err = KeyError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "rsa" => Ok(KeyScheme::Rsa),
            "ecc" | "secp256k1" => Ok(KeyScheme::Ecc),
            other => Err(KeyError::InvalidOperation(format!(
                "unknown key scheme '{other}'"
            ))),
        }
    }
}

pub(crate) enum SecretMaterial {
    Rsa(openssl::rsa::Rsa<openssl::pkey::Private>),
    Ecc(k256::SecretKey),
}

/// A private key together with its canonical public key export.
///
/// Not `Clone`: the private half has exactly one owner.
pub struct KeyPair {
    secret: SecretMaterial,
    public_key: Vec<u8>,
}

impl KeyPair {
    pub(crate) fn new(secret: SecretMaterial, public_key: Vec<u8>) -> Self {
        Self { secret, public_key }
    }

    pub(crate) fn secret(&self) -> &SecretMaterial {
        &self.secret
    }

    pub fn scheme(&self) -> KeyScheme {
        match self.secret {
            SecretMaterial::Rsa(_) => KeyScheme::Rsa,
            SecretMaterial::Ecc(_) => KeyScheme::Ecc,
        }
    }

    /// Public key in the scheme's canonical export format
    pub fn public_key(&self) -> &[u8] {
        &self.public_key
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("scheme", &self.scheme())
            .field("public_key", &hex::encode(&self.public_key))
            .finish_non_exhaustive()
    }
}

/// Capability contract shared by every scheme.
pub trait CryptoBackend: Send + Sync {
    fn scheme(&self) -> KeyScheme;

    /// Fresh random key pair, no difficulty filtering
    fn generate(&self) -> Result<KeyPair>;

    /// Deterministic identifier derived from a canonical public key export
    fn identifier(&self, public_key: &[u8]) -> Result<String>;

    /// Encrypt for `public_key`, or for the key pair's own public key when `None`
    fn encrypt(&self, key_pair: &KeyPair, data: &[u8], public_key: Option<&[u8]>)
        -> Result<Vec<u8>>;

    fn decrypt(&self, key_pair: &KeyPair, ciphertext: &[u8]) -> Result<Vec<u8>>;

    fn sign(&self, key_pair: &KeyPair, data: &[u8]) -> Result<Vec<u8>>;

    /// Never fails: malformed keys or signatures yield `false`
    fn verify(
        &self,
        key_pair: &KeyPair,
        signature: &[u8],
        data: &[u8],
        public_key: Option<&[u8]>,
    ) -> bool;

    /// Canonical private key export
    fn export_private(&self, key_pair: &KeyPair) -> Result<Zeroizing<Vec<u8>>>;

    /// Canonical public key export
    fn export_public(&self, key_pair: &KeyPair) -> Vec<u8> {
        key_pair.public_key().to_vec()
    }

    /// Parse a private key and derive its public half
    fn import_private(&self, private_key: &[u8]) -> Result<KeyPair>;

    /// Rebuild a persisted pair, rejecting halves that do not belong together
    fn from_parts(&self, private_key: &[u8], public_key: &[u8]) -> Result<KeyPair>;
}

pub(crate) fn scheme_mismatch(expected: KeyScheme, key_pair: &KeyPair) -> KeyError {
    KeyError::InvalidOperation(format!(
        "{} backend cannot use a {} key pair",
        expected,
        key_pair.scheme()
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_parsing() {
        assert_eq!("rsa".parse::<KeyScheme>().unwrap(), KeyScheme::Rsa);
        assert_eq!("ECC".parse::<KeyScheme>().unwrap(), KeyScheme::Ecc);
        assert_eq!("secp256k1".parse::<KeyScheme>().unwrap(), KeyScheme::Ecc);
        assert!("dsa".parse::<KeyScheme>().is_err());
        assert_eq!(KeyScheme::Ecc.to_string(), "ecc");
    }
}
