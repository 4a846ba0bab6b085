use std::fmt;
use thiserror::Error;

/// Which half of a key pair a persistence failure refers to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyHalf {
    Private,
    Public,
}

impl fmt::Display for KeyHalf {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyHalf::Private => write!(f, "private"),
            KeyHalf::Public => write!(f, "public"),
        }
    }
}

/// Error types for the keyauth-keys crate
#[derive(Error, Debug)]
pub enum KeyError {
    #[error("Key not found: {0}")]
    KeyNotFound(String),

    #[error("Malformed key: {0}")]
    MalformedKey(String),

    #[error("Encryption error: {0}")]
    EncryptionError(String),

    #[error("Decryption error: {0}")]
    DecryptionError(String),

    #[error("Signature error: {0}")]
    SignatureError(String),

    #[error("Crypto error: {0}")]
    CryptoError(String),

    #[error("Failed to persist {half} key: {source}")]
    Persist {
        half: KeyHalf,
        #[source]
        source: std::io::Error,
    },

    #[error("Proof-of-work search cancelled")]
    Cancelled,

    #[error("Proof-of-work search timed out after {attempts} attempts")]
    PowTimeout { attempts: u64 },

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl From<openssl::error::ErrorStack> for KeyError {
    fn from(err: openssl::error::ErrorStack) -> Self {
        KeyError::CryptoError(format!("OpenSSL error: {err}"))
    }
}

impl From<k256::elliptic_curve::Error> for KeyError {
    fn from(_: k256::elliptic_curve::Error) -> Self {
        KeyError::MalformedKey("invalid secp256k1 key material".to_string())
    }
}

impl From<k256::ecdsa::Error> for KeyError {
    fn from(err: k256::ecdsa::Error) -> Self {
        KeyError::SignatureError(err.to_string())
    }
}

impl From<hkdf::InvalidLength> for KeyError {
    fn from(err: hkdf::InvalidLength) -> Self {
        KeyError::CryptoError(format!("HKDF error: {err}"))
    }
}

impl From<hex::FromHexError> for KeyError {
    fn from(err: hex::FromHexError) -> Self {
        KeyError::MalformedKey(format!("invalid hex encoding: {err}"))
    }
}

/// Result type for keyauth-keys operations
pub type Result<T> = std::result::Result<T, KeyError>;
