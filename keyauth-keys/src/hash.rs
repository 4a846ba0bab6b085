//! Hash primitives and the identity difficulty score.
//!
//! `difficulty(id)` is the largest `d` such that `numeric_hash(id) <= 2^(256 - d)`.
//! Since the hash is a 256-bit value this is its count of leading zero bits,
//! plus one when the hash is exactly a power of two (the `<=` boundary).

use sha2::Sha256;
use sha3::{Digest, Sha3_256};
use std::fmt;

/// Highest score any identifier can reach (only the all-zero hash gets there).
pub const MAX_DIFFICULTY: u32 = 256;

/// SHA3-256 digest of `data`
pub fn sha3_256(data: &[u8]) -> [u8; 32] {
    let mut hasher = Sha3_256::new();
    hasher.update(data);
    hasher.finalize().into()
}

/// SHA-256 of `data` read as an unsigned big-endian 256-bit integer
pub fn numeric_hash(data: &[u8]) -> NumericHash {
    let mut hasher = Sha256::new();
    hasher.update(data);
    NumericHash(hasher.finalize().into())
}

/// Unsigned 256-bit integer stored big-endian.
///
/// Byte-wise ordering of the big-endian representation is numeric ordering,
/// so the derived `Ord` compares values.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct NumericHash([u8; 32]);

impl NumericHash {
    pub const fn from_be_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_be_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn leading_zeros(&self) -> u32 {
        let mut zeros = 0;
        for byte in self.0 {
            if byte == 0 {
                zeros += 8;
            } else {
                return zeros + byte.leading_zeros();
            }
        }
        zeros
    }

    pub fn count_ones(&self) -> u32 {
        self.0.iter().map(|b| b.count_ones()).sum()
    }

    /// `self <= 2^(256 - difficulty)`
    pub fn meets_difficulty(&self, difficulty: u32) -> bool {
        if difficulty == 0 {
            // every 256-bit value is below 2^256
            return true;
        }
        if difficulty > MAX_DIFFICULTY {
            return false;
        }
        // below 2^(256-d) exactly when the top d bits are clear
        self.leading_zeros() >= difficulty || self.is_power_of_two_at(MAX_DIFFICULTY - difficulty)
    }

    /// Score of this hash, floored at 0.
    pub fn difficulty(&self) -> u32 {
        let zeros = self.leading_zeros();
        if zeros == MAX_DIFFICULTY {
            return MAX_DIFFICULTY;
        }
        if self.count_ones() == 1 {
            // value is 2^(255 - zeros), which also satisfies d = zeros + 1
            zeros + 1
        } else {
            zeros
        }
    }

    fn is_power_of_two_at(&self, exponent: u32) -> bool {
        if exponent >= MAX_DIFFICULTY {
            return false;
        }
        self.count_ones() == 1 && self.leading_zeros() == MAX_DIFFICULTY - 1 - exponent
    }
}

impl fmt::Debug for NumericHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NumericHash({})", hex::encode(self.0))
    }
}

impl fmt::Display for NumericHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

/// Difficulty of an identifier string.
pub fn difficulty(key_id: &str) -> u32 {
    numeric_hash(key_id.as_bytes()).difficulty()
}

/// Whether an identifier satisfies a difficulty target without scoring it.
pub fn meets_difficulty(key_id: &str, target: u32) -> bool {
    numeric_hash(key_id.as_bytes()).meets_difficulty(target)
}
