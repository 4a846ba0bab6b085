//! secp256k1 backend: ECIES for encryption, ECDSA for signatures.
//!
//! Keys are exported raw: 32 bytes of private scalar and 64 bytes of public
//! point (uncompressed SEC1 without the `0x04` tag). The identifier is the hex
//! encoding of the public key. Peer public keys may be passed raw, as 128 hex
//! characters, or as SEC1 bytes.

use super::{scheme_mismatch, CryptoBackend, KeyPair, KeyScheme, SecretMaterial};
use crate::error::{KeyError, Result};
use crate::hash::sha3_256;
use aes_gcm::aead::Aead;
use aes_gcm::{Aes256Gcm, KeyInit, Nonce};
use hkdf::Hkdf;
use k256::ecdh::{diffie_hellman, EphemeralSecret};
use k256::ecdsa::signature::hazmat::PrehashVerifier;
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use k256::elliptic_curve::sec1::ToEncodedPoint;
use k256::{FieldBytes, PublicKey, SecretKey};
use keyauth_common::{Component, Logger};
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

pub const PRIVATE_KEY_LEN: usize = 32;
pub const PUBLIC_KEY_LEN: usize = 64;
pub const PUBLIC_KEY_HEX_LEN: usize = 2 * PUBLIC_KEY_LEN;

/// Uncompressed SEC1 point carried in front of every ECIES ciphertext
pub const EPHEMERAL_KEY_LEN: usize = 65;
pub const NONCE_LEN: usize = 12;
/// `r || s || recovery id`
pub const SIGNATURE_LEN: usize = 65;

const ECIES_INFO: &[u8] = b"keyauth-ecies-v1";

pub struct EccBackend {
    logger: Logger,
}

impl EccBackend {
    pub fn new(logger: &Logger) -> Self {
        Self {
            logger: logger.with_component(Component::Crypto),
        }
    }

    fn secret_key<'a>(&self, key_pair: &'a KeyPair) -> Result<&'a SecretKey> {
        match key_pair.secret() {
            SecretMaterial::Ecc(secret) => Ok(secret),
            _ => Err(scheme_mismatch(KeyScheme::Ecc, key_pair)),
        }
    }

    fn wrap(secret: SecretKey) -> KeyPair {
        let public = raw_public_key(&secret.public_key());
        KeyPair::new(SecretMaterial::Ecc(secret), public)
    }
}

fn raw_public_key(public: &PublicKey) -> Vec<u8> {
    public.to_encoded_point(false).as_bytes()[1..].to_vec()
}

/// Parse a peer public key given raw (64), hex (128) or SEC1 (33/65) bytes.
pub fn parse_public_key(bytes: &[u8]) -> Result<PublicKey> {
    let decoded;
    let bytes = if bytes.len() == PUBLIC_KEY_HEX_LEN {
        decoded = hex::decode(bytes)?;
        decoded.as_slice()
    } else {
        bytes
    };
    let parsed = if bytes.len() == PUBLIC_KEY_LEN {
        let mut sec1 = Vec::with_capacity(EPHEMERAL_KEY_LEN);
        sec1.push(0x04);
        sec1.extend_from_slice(bytes);
        PublicKey::from_sec1_bytes(&sec1)
    } else {
        PublicKey::from_sec1_bytes(bytes)
    };
    parsed.map_err(|_| KeyError::MalformedKey("not a secp256k1 public key".to_string()))
}

fn parse_secret_key(bytes: &[u8]) -> Result<SecretKey> {
    let decoded;
    let bytes = if bytes.len() == 2 * PRIVATE_KEY_LEN {
        decoded = Zeroizing::new(hex::decode(bytes)?);
        decoded.as_slice()
    } else {
        bytes
    };
    if bytes.len() != PRIVATE_KEY_LEN {
        return Err(KeyError::MalformedKey(format!(
            "secp256k1 private key must be {PRIVATE_KEY_LEN} bytes, got {}",
            bytes.len()
        )));
    }
    Ok(SecretKey::from_bytes(FieldBytes::from_slice(bytes))?)
}

fn derive_ecies_key(shared_secret: &[u8]) -> Result<Zeroizing<[u8; 32]>> {
    let hk = Hkdf::<Sha256>::new(None, shared_secret);
    let mut key = Zeroizing::new([0u8; 32]);
    hk.expand(ECIES_INFO, &mut key[..])?;
    Ok(key)
}

impl CryptoBackend for EccBackend {
    fn scheme(&self) -> KeyScheme {
        KeyScheme::Ecc
    }

    fn generate(&self) -> Result<KeyPair> {
        Ok(Self::wrap(SecretKey::random(&mut OsRng)))
    }

    fn identifier(&self, public_key: &[u8]) -> Result<String> {
        let public = parse_public_key(public_key)?;
        Ok(hex::encode(raw_public_key(&public)))
    }

    fn encrypt(
        &self,
        key_pair: &KeyPair,
        data: &[u8],
        public_key: Option<&[u8]>,
    ) -> Result<Vec<u8>> {
        let recipient = parse_public_key(public_key.unwrap_or(key_pair.public_key()))?;

        let ephemeral_secret = EphemeralSecret::random(&mut OsRng);
        let ephemeral_public = ephemeral_secret.public_key();
        let shared_secret = ephemeral_secret.diffie_hellman(&recipient);
        let key = derive_ecies_key(shared_secret.raw_secret_bytes().as_slice())?;

        let cipher = Aes256Gcm::new_from_slice(&key[..])
            .map_err(|e| KeyError::EncryptionError(format!("Failed to create cipher: {e}")))?;
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);
        let ciphertext = cipher
            .encrypt(Nonce::from_slice(&nonce), data)
            .map_err(|e| KeyError::EncryptionError(format!("AES-GCM encryption failed: {e}")))?;

        let mut out = ephemeral_public.to_encoded_point(false).as_bytes().to_vec();
        out.extend_from_slice(&nonce);
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decrypt(&self, key_pair: &KeyPair, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let secret = self.secret_key(key_pair)?;
        if ciphertext.len() < EPHEMERAL_KEY_LEN + NONCE_LEN {
            return Err(KeyError::DecryptionError(
                "Encrypted data too short for ECIES".to_string(),
            ));
        }
        let (ephemeral, rest) = ciphertext.split_at(EPHEMERAL_KEY_LEN);
        let (nonce, payload) = rest.split_at(NONCE_LEN);

        let ephemeral_public = PublicKey::from_sec1_bytes(ephemeral).map_err(|_| {
            KeyError::DecryptionError("Failed to parse ephemeral public key".to_string())
        })?;
        let shared_secret =
            diffie_hellman(secret.to_nonzero_scalar(), ephemeral_public.as_affine());
        let key = derive_ecies_key(shared_secret.raw_secret_bytes().as_slice())?;

        let cipher = Aes256Gcm::new_from_slice(&key[..])
            .map_err(|e| KeyError::DecryptionError(format!("Failed to create cipher: {e}")))?;
        cipher
            .decrypt(Nonce::from_slice(nonce), payload)
            .map_err(|_| KeyError::DecryptionError("AES-GCM decryption failed".to_string()))
    }

    fn sign(&self, key_pair: &KeyPair, data: &[u8]) -> Result<Vec<u8>> {
        let signing_key = SigningKey::from(self.secret_key(key_pair)?);
        let digest = sha3_256(data);
        let (signature, recovery_id) = signing_key.sign_prehash_recoverable(&digest)?;
        let mut out = signature.to_bytes().to_vec();
        out.push(recovery_id.to_byte());
        Ok(out)
    }

    fn verify(
        &self,
        key_pair: &KeyPair,
        signature: &[u8],
        data: &[u8],
        public_key: Option<&[u8]>,
    ) -> bool {
        let public = match parse_public_key(public_key.unwrap_or(key_pair.public_key())) {
            Ok(public) => public,
            Err(_) => {
                self.logger.info("Wrong key format");
                return false;
            }
        };
        let signature = match signature.len() {
            64 | SIGNATURE_LEN => match Signature::from_slice(&signature[..64]) {
                Ok(signature) => signature,
                Err(_) => {
                    self.logger.debug("Malformed ECDSA signature");
                    return false;
                }
            },
            len => {
                self.logger
                    .debug(format!("ECDSA signature has unexpected length {len}"));
                return false;
            }
        };
        VerifyingKey::from(&public)
            .verify_prehash(&sha3_256(data), &signature)
            .is_ok()
    }

    fn export_private(&self, key_pair: &KeyPair) -> Result<Zeroizing<Vec<u8>>> {
        Ok(Zeroizing::new(
            self.secret_key(key_pair)?.to_bytes().to_vec(),
        ))
    }

    fn import_private(&self, private_key: &[u8]) -> Result<KeyPair> {
        Ok(Self::wrap(parse_secret_key(private_key)?))
    }

    fn from_parts(&self, private_key: &[u8], public_key: &[u8]) -> Result<KeyPair> {
        let key_pair = self.import_private(private_key)?;
        let stored = parse_public_key(public_key)?;
        if raw_public_key(&stored) != key_pair.public_key() {
            return Err(KeyError::MalformedKey(
                "stored secp256k1 public key does not match private key".to_string(),
            ));
        }
        Ok(key_pair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> EccBackend {
        EccBackend::new(&Logger::new_root(Component::Crypto, "ecc-test"))
    }

    #[test]
    fn test_key_shapes_and_identifier() {
        let backend = backend();
        let key_pair = backend.generate().unwrap();
        assert_eq!(key_pair.public_key().len(), PUBLIC_KEY_LEN);
        assert_eq!(backend.export_private(&key_pair).unwrap().len(), PRIVATE_KEY_LEN);

        let id = backend.identifier(key_pair.public_key()).unwrap();
        assert_eq!(id, hex::encode(key_pair.public_key()));
        // the identifier itself is an accepted public key encoding
        assert_eq!(backend.identifier(id.as_bytes()).unwrap(), id);
    }

    #[test]
    fn test_ecies_round_trip_with_hex_and_raw_keys() {
        let backend = backend();
        let alice = backend.generate().unwrap();
        let bob = backend.generate().unwrap();
        let bob_hex = hex::encode(bob.public_key());

        let from_raw = backend.encrypt(&alice, b"hello bob", Some(bob.public_key())).unwrap();
        let from_hex = backend.encrypt(&alice, b"hello bob", Some(bob_hex.as_bytes())).unwrap();
        assert_ne!(from_raw, from_hex);
        assert_eq!(backend.decrypt(&bob, &from_raw).unwrap(), b"hello bob");
        assert_eq!(backend.decrypt(&bob, &from_hex).unwrap(), b"hello bob");
        assert!(matches!(
            backend.decrypt(&alice, &from_raw),
            Err(KeyError::DecryptionError(_))
        ));
    }

    #[test]
    fn test_decrypt_rejects_garbage() {
        let backend = backend();
        let key_pair = backend.generate().unwrap();
        assert!(backend.decrypt(&key_pair, &[]).is_err());
        assert!(backend.decrypt(&key_pair, &[0u8; 100]).is_err());

        let mut ct = backend.encrypt(&key_pair, b"payload", None).unwrap();
        let last = ct.len() - 1;
        ct[last] ^= 0xff;
        assert!(matches!(
            backend.decrypt(&key_pair, &ct),
            Err(KeyError::DecryptionError(_))
        ));
    }

    #[test]
    fn test_sign_verify_recoverable_layout() {
        let backend = backend();
        let key_pair = backend.generate().unwrap();
        let sig = backend.sign(&key_pair, b"message").unwrap();
        assert_eq!(sig.len(), SIGNATURE_LEN);
        assert!(backend.verify(&key_pair, &sig, b"message", None));
        assert!(backend.verify(&key_pair, &sig[..64], b"message", None));
        assert!(!backend.verify(&key_pair, &sig, b"other", None));

        let other = backend.generate().unwrap();
        assert!(!backend.verify(&key_pair, &sig, b"message", Some(other.public_key())));
    }

    #[test]
    fn test_verify_never_fails_on_malformed_input() {
        let backend = backend();
        let key_pair = backend.generate().unwrap();
        let sig = backend.sign(&key_pair, b"m").unwrap();
        assert!(!backend.verify(&key_pair, &sig, b"m", Some(&[1, 2, 3])));
        assert!(!backend.verify(&key_pair, &sig, b"m", Some(&[0u8; 64])));
        assert!(!backend.verify(&key_pair, &[0u8; 65], b"m", None));
        assert!(!backend.verify(&key_pair, &[7u8; 10], b"m", None));
    }

    #[test]
    fn test_import_and_parts() {
        let backend = backend();
        let key_pair = backend.generate().unwrap();
        let private = backend.export_private(&key_pair).unwrap();

        let imported = backend.import_private(&private).unwrap();
        assert_eq!(imported.public_key(), key_pair.public_key());
        let from_hex = backend.import_private(hex::encode(&*private).as_bytes()).unwrap();
        assert_eq!(from_hex.public_key(), key_pair.public_key());

        assert!(backend.from_parts(&private, key_pair.public_key()).is_ok());
        let other = backend.generate().unwrap();
        assert!(backend.from_parts(&private, other.public_key()).is_err());

        assert!(backend.import_private(&[0u8; 32]).is_err());
        assert!(backend.import_private(b"not a key").is_err());
    }
}
