//! Credentials envelope: AES-256-GCM with a 12-byte nonce prepended to the
//! ciphertext, base64 outer encoding. The key is derived from the process
//! environment and is never persisted alongside ciphertext.

use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use rand::RngCore;
use sha2::{Digest, Sha256};

use crate::{ExecutorError, ExecutorResult};

/// Environment variable holding the master key material.
pub const ENCRYPTION_KEY_ENV: &str = "VERDICT_ENCRYPTION_KEY";

const NONCE_LEN: usize = 12;

/// AES-256-GCM cipher for exchange credentials.
pub struct CredentialsCipher {
    key: [u8; 32],
}

impl CredentialsCipher {
    /// Derive the key from `VERDICT_ENCRYPTION_KEY`.
    pub fn from_env() -> ExecutorResult<Self> {
        let master = std::env::var(ENCRYPTION_KEY_ENV)
            .map_err(|_| ExecutorError::MissingEncryptionKey(ENCRYPTION_KEY_ENV))?;
        if master.is_empty() {
            return Err(ExecutorError::MissingEncryptionKey(ENCRYPTION_KEY_ENV));
        }
        Ok(Self::new(&master))
    }

    /// Derive a 32-byte key from arbitrary master material via SHA-256.
    #[must_use]
    pub fn new(master: &str) -> Self {
        let digest = Sha256::digest(master.as_bytes());
        let mut key = [0u8; 32];
        key.copy_from_slice(&digest);
        Self { key }
    }

    fn cipher(&self) -> ExecutorResult<Aes256Gcm> {
        Aes256Gcm::new_from_slice(&self.key)
            .map_err(|err| ExecutorError::Crypto(format!("invalid key length: {err}")))
    }

    /// Encrypt a secret. Output is base64(`nonce || ciphertext`).
    pub fn encrypt(&self, plaintext: &str) -> ExecutorResult<String> {
        if plaintext.is_empty() {
            return Ok(String::new());
        }
        let cipher = self.cipher()?;
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);
        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|err| ExecutorError::Crypto(format!("encryption failed: {err}")))?;
        let mut envelope = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        envelope.extend_from_slice(&nonce_bytes);
        envelope.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(envelope))
    }

    /// Decrypt an envelope produced by [`encrypt`].
    ///
    /// [`encrypt`]: Self::encrypt
    pub fn decrypt(&self, encoded: &str) -> ExecutorResult<String> {
        if encoded.is_empty() {
            return Ok(String::new());
        }
        let envelope = BASE64
            .decode(encoded)
            .map_err(|err| ExecutorError::Crypto(format!("invalid base64: {err}")))?;
        if envelope.len() <= NONCE_LEN {
            return Err(ExecutorError::Crypto("envelope too short".into()));
        }
        let (nonce_bytes, ciphertext) = envelope.split_at(NONCE_LEN);
        let cipher = self.cipher()?;
        let plaintext = cipher
            .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
            .map_err(|err| ExecutorError::Crypto(format!("decryption failed: {err}")))?;
        String::from_utf8(plaintext)
            .map_err(|err| ExecutorError::Crypto(format!("invalid utf-8: {err}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_restores_the_plaintext() {
        let cipher = CredentialsCipher::new("unit-test-master-key");
        let secret = "api-key-abc123";
        let envelope = cipher.encrypt(secret).unwrap();
        assert_ne!(envelope, secret);
        assert_eq!(cipher.decrypt(&envelope).unwrap(), secret);
    }

    #[test]
    fn nonces_are_unique_per_encryption() {
        let cipher = CredentialsCipher::new("unit-test-master-key");
        let a = cipher.encrypt("same-secret").unwrap();
        let b = cipher.encrypt("same-secret").unwrap();
        assert_ne!(a, b);
        assert_eq!(cipher.decrypt(&a).unwrap(), cipher.decrypt(&b).unwrap());
    }

    #[test]
    fn wrong_key_fails_to_decrypt() {
        let cipher = CredentialsCipher::new("key-one");
        let envelope = cipher.encrypt("secret").unwrap();
        let other = CredentialsCipher::new("key-two");
        assert!(other.decrypt(&envelope).is_err());
    }

    #[test]
    fn tampered_envelopes_are_rejected() {
        let cipher = CredentialsCipher::new("key");
        let envelope = cipher.encrypt("secret").unwrap();
        let mut bytes = BASE64.decode(&envelope).unwrap();
        let last = bytes.len() - 1;
        bytes[last] ^= 0x01;
        let tampered = BASE64.encode(bytes);
        assert!(cipher.decrypt(&tampered).is_err());
    }

    #[test]
    fn empty_strings_pass_through() {
        let cipher = CredentialsCipher::new("key");
        assert_eq!(cipher.encrypt("").unwrap(), "");
        assert_eq!(cipher.decrypt("").unwrap(), "");
    }
}
