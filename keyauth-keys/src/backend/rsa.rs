//! RSA-2048 backend on OpenSSL.
//!
//! Private keys are exported as PKCS#1 PEM, public keys as SubjectPublicKeyInfo
//! PEM. Encryption uses OAEP padding, signatures PKCS#1 v1.5 over SHA-256.
//!
//! The identifier is the SHA-1 hex digest of the OpenSSH public key line with
//! its `"ssh-rsa "` header removed, i.e. of `base64(ssh wire blob)`.

use super::{scheme_mismatch, CryptoBackend, KeyPair, KeyScheme, SecretMaterial};
use crate::error::{KeyError, Result};
use base64::Engine;
use keyauth_common::{Component, Logger};
use openssl::bn::BigNumRef;
use openssl::hash::MessageDigest;
use openssl::pkey::{PKey, Private, Public};
use openssl::rsa::{Padding, Rsa};
use openssl::sign::{Signer, Verifier};
use sha1::{Digest, Sha1};
use zeroize::Zeroizing;

pub const RSA_MODULUS_BITS: u32 = 2048;

/// OAEP with SHA-1 costs 2 * 20 + 2 bytes of the modulus
pub const OAEP_OVERHEAD: usize = 42;

const SSH_RSA_TAG: &str = "ssh-rsa";

pub struct RsaBackend {
    logger: Logger,
}

impl RsaBackend {
    pub fn new(logger: &Logger) -> Self {
        Self {
            logger: logger.with_component(Component::Crypto),
        }
    }

    fn private_key<'a>(&self, key_pair: &'a KeyPair) -> Result<&'a Rsa<Private>> {
        match key_pair.secret() {
            SecretMaterial::Rsa(rsa) => Ok(rsa),
            _ => Err(scheme_mismatch(KeyScheme::Rsa, key_pair)),
        }
    }

    fn wrap(&self, rsa: Rsa<Private>) -> Result<KeyPair> {
        let public_pem = rsa.public_key_to_pem()?;
        Ok(KeyPair::new(SecretMaterial::Rsa(rsa), public_pem))
    }

    /// Largest plaintext accepted by `encrypt` for the given key
    pub fn max_payload(public_key: &Rsa<Public>) -> usize {
        (public_key.size() as usize).saturating_sub(OAEP_OVERHEAD)
    }
}

/// Parse a public key in SPKI PEM, falling back to PKCS#1 PEM.
pub fn parse_public_key(pem: &[u8]) -> Result<Rsa<Public>> {
    Rsa::public_key_from_pem(pem)
        .or_else(|_| Rsa::public_key_from_pem_pkcs1(pem))
        .map_err(|_| KeyError::MalformedKey("not an RSA public key PEM".to_string()))
}

/// OpenSSH public key line: `ssh-rsa <base64 wire blob>`
pub fn openssh_public_key(public_key: &Rsa<Public>) -> String {
    let mut wire = Vec::new();
    put_ssh_string(&mut wire, SSH_RSA_TAG.as_bytes());
    put_ssh_mpint(&mut wire, public_key.e());
    put_ssh_mpint(&mut wire, public_key.n());
    format!(
        "{SSH_RSA_TAG} {}",
        base64::engine::general_purpose::STANDARD.encode(wire)
    )
}

fn put_ssh_string(out: &mut Vec<u8>, bytes: &[u8]) {
    out.extend_from_slice(&(bytes.len() as u32).to_be_bytes());
    out.extend_from_slice(bytes);
}

fn put_ssh_mpint(out: &mut Vec<u8>, n: &BigNumRef) {
    let mut bytes = n.to_vec();
    // positive values whose top bit is set need a leading zero byte
    if bytes.first().is_some_and(|b| b & 0x80 != 0) {
        bytes.insert(0, 0);
    }
    put_ssh_string(out, &bytes);
}

impl CryptoBackend for RsaBackend {
    fn scheme(&self) -> KeyScheme {
        KeyScheme::Rsa
    }

    fn generate(&self) -> Result<KeyPair> {
        self.wrap(Rsa::generate(RSA_MODULUS_BITS)?)
    }

    fn identifier(&self, public_key: &[u8]) -> Result<String> {
        let rsa = parse_public_key(public_key)?;
        let line = openssh_public_key(&rsa);
        // drop the 8-byte "ssh-rsa " framing
        let mut hasher = Sha1::new();
        hasher.update(&line.as_bytes()[SSH_RSA_TAG.len() + 1..]);
        Ok(hex::encode(hasher.finalize()))
    }

    fn encrypt(
        &self,
        key_pair: &KeyPair,
        data: &[u8],
        public_key: Option<&[u8]>,
    ) -> Result<Vec<u8>> {
        let recipient = parse_public_key(public_key.unwrap_or(key_pair.public_key()))?;
        let max = Self::max_payload(&recipient);
        if data.len() > max {
            return Err(KeyError::EncryptionError(format!(
                "payload of {} bytes exceeds RSA-OAEP limit of {max}",
                data.len()
            )));
        }
        let mut out = vec![0u8; recipient.size() as usize];
        let len = recipient
            .public_encrypt(data, &mut out, Padding::PKCS1_OAEP)
            .map_err(|_| KeyError::EncryptionError("RSA-OAEP encryption failed".to_string()))?;
        out.truncate(len);
        Ok(out)
    }

    fn decrypt(&self, key_pair: &KeyPair, ciphertext: &[u8]) -> Result<Vec<u8>> {
        let rsa = self.private_key(key_pair)?;
        if ciphertext.len() != rsa.size() as usize {
            return Err(KeyError::DecryptionError(
                "ciphertext length does not match modulus".to_string(),
            ));
        }
        let mut out = vec![0u8; rsa.size() as usize];
        let len = rsa
            .private_decrypt(ciphertext, &mut out, Padding::PKCS1_OAEP)
            .map_err(|_| KeyError::DecryptionError("RSA-OAEP decryption failed".to_string()))?;
        out.truncate(len);
        Ok(out)
    }

    fn sign(&self, key_pair: &KeyPair, data: &[u8]) -> Result<Vec<u8>> {
        let pkey = PKey::from_rsa(self.private_key(key_pair)?.clone())?;
        let mut signer = Signer::new(MessageDigest::sha256(), &pkey)?;
        signer.update(data)?;
        signer
            .sign_to_vec()
            .map_err(|e| KeyError::SignatureError(e.to_string()))
    }

    fn verify(
        &self,
        key_pair: &KeyPair,
        signature: &[u8],
        data: &[u8],
        public_key: Option<&[u8]>,
    ) -> bool {
        let rsa = match parse_public_key(public_key.unwrap_or(key_pair.public_key())) {
            Ok(rsa) => rsa,
            Err(_) => {
                self.logger.info("Wrong key format");
                return false;
            }
        };
        let outcome = PKey::from_rsa(rsa).and_then(|pkey| {
            let mut verifier = Verifier::new(MessageDigest::sha256(), &pkey)?;
            verifier.update(data)?;
            verifier.verify(signature)
        });
        match outcome {
            Ok(valid) => valid,
            Err(e) => {
                self.logger.debug(format!("RSA signature rejected: {e}"));
                false
            }
        }
    }

    fn export_private(&self, key_pair: &KeyPair) -> Result<Zeroizing<Vec<u8>>> {
        Ok(Zeroizing::new(
            self.private_key(key_pair)?.private_key_to_pem()?,
        ))
    }

    fn import_private(&self, private_key: &[u8]) -> Result<KeyPair> {
        // PKey accepts both PKCS#1 and PKCS#8 PEM
        let rsa = PKey::private_key_from_pem(private_key)
            .and_then(|pkey| pkey.rsa())
            .map_err(|_| KeyError::MalformedKey("not an RSA private key PEM".to_string()))?;
        if !rsa.check_key().unwrap_or(false) {
            return Err(KeyError::MalformedKey(
                "RSA private key failed consistency check".to_string(),
            ));
        }
        self.wrap(rsa)
    }

    fn from_parts(&self, private_key: &[u8], public_key: &[u8]) -> Result<KeyPair> {
        let key_pair = self.import_private(private_key)?;
        let stored = parse_public_key(public_key)?;
        let rsa = self.private_key(&key_pair)?;
        if stored.n() != rsa.n() || stored.e() != rsa.e() {
            return Err(KeyError::MalformedKey(
                "stored RSA public key does not match private key".to_string(),
            ));
        }
        Ok(key_pair)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn backend() -> RsaBackend {
        RsaBackend::new(&Logger::new_root(Component::Crypto, "rsa-test"))
    }

    #[test]
    fn test_identifier_is_deterministic_sha1_hex() {
        let backend = backend();
        let key_pair = backend.generate().unwrap();
        let a = backend.identifier(key_pair.public_key()).unwrap();
        let b = backend.identifier(&backend.export_public(&key_pair)).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 40);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn test_openssh_line_shape() {
        let backend = backend();
        let key_pair = backend.generate().unwrap();
        let rsa = parse_public_key(key_pair.public_key()).unwrap();
        let line = openssh_public_key(&rsa);
        assert!(line.starts_with("ssh-rsa AAAAB3NzaC1yc2E"));
    }

    #[test]
    fn test_encrypt_decrypt_round_trip_max_payload() {
        let backend = backend();
        let key_pair = backend.generate().unwrap();
        let data = vec![0xa5u8; 2048 / 8 - OAEP_OVERHEAD];
        let ct = backend.encrypt(&key_pair, &data, None).unwrap();
        assert_eq!(backend.decrypt(&key_pair, &ct).unwrap(), data);

        let too_long = vec![0u8; data.len() + 1];
        assert!(matches!(
            backend.encrypt(&key_pair, &too_long, None),
            Err(KeyError::EncryptionError(_))
        ));
    }

    #[test]
    fn test_decrypt_with_wrong_key_fails() {
        let backend = backend();
        let alice = backend.generate().unwrap();
        let bob = backend.generate().unwrap();
        let ct = backend
            .encrypt(&alice, b"for bob", Some(bob.public_key()))
            .unwrap();
        assert_eq!(backend.decrypt(&bob, &ct).unwrap(), b"for bob");
        assert!(matches!(
            backend.decrypt(&alice, &ct),
            Err(KeyError::DecryptionError(_))
        ));
        assert!(matches!(
            backend.decrypt(&alice, b"short"),
            Err(KeyError::DecryptionError(_))
        ));
    }

    #[test]
    fn test_sign_verify() {
        let backend = backend();
        let key_pair = backend.generate().unwrap();
        let sig = backend.sign(&key_pair, b"message").unwrap();
        assert!(backend.verify(&key_pair, &sig, b"message", None));
        assert!(!backend.verify(&key_pair, &sig, b"massage", None));
        assert!(!backend.verify(&key_pair, b"garbage", b"message", None));
        assert!(!backend.verify(&key_pair, &sig, b"message", Some(b"not a pem")));
    }

    #[test]
    fn test_pem_round_trip_and_mismatch() {
        let backend = backend();
        let key_pair = backend.generate().unwrap();
        let private = backend.export_private(&key_pair).unwrap();
        let restored = backend.from_parts(&private, key_pair.public_key()).unwrap();
        assert_eq!(restored.public_key(), key_pair.public_key());

        let other = backend.generate().unwrap();
        assert!(matches!(
            backend.from_parts(&private, other.public_key()),
            Err(KeyError::MalformedKey(_))
        ));
        assert!(matches!(
            backend.import_private(b"-----BEGIN NOTHING-----"),
            Err(KeyError::MalformedKey(_))
        ));
    }
}
