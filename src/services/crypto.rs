//! Symmetric encryption for configuration blobs stored at rest.
//!
//! Blobs are AES-256-GCM encrypted and encoded as `base64(nonce):base64(ciphertext)`.
//! The key is the SHA-256 digest of the configured secret, so any secret
//! length is accepted.

use aes_gcm::aead::{Aead, AeadCore, KeyInit, OsRng};
use aes_gcm::{Aes256Gcm, Key, Nonce};
use anyhow::Context;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use sha2::{Digest, Sha256};

const NONCE_LEN: usize = 12;

#[derive(Clone)]
pub struct ConfigCipher {
    cipher: Aes256Gcm,
}

impl std::fmt::Debug for ConfigCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConfigCipher")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

impl ConfigCipher {
    pub fn new(secret: &str) -> Self {
        let key = Sha256::digest(secret.as_bytes());
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(&key)),
        }
    }

    pub fn encrypt(&self, plaintext: &str) -> anyhow::Result<String> {
        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);
        let ciphertext = self
            .cipher
            .encrypt(&nonce, plaintext.as_bytes())
            .map_err(|e| anyhow::anyhow!("encryption failed: {e}"))?;

        Ok(format!(
            "{}:{}",
            BASE64.encode(nonce),
            BASE64.encode(ciphertext)
        ))
    }

    /// Legacy plaintext (a JSON document, or text without a `:` separator)
    /// is returned unchanged.
    pub fn decrypt(&self, blob: &str) -> anyhow::Result<String> {
        if blob.trim_start().starts_with(['{', '[']) {
            return Ok(blob.to_string());
        }
        let Some((nonce_b64, ciphertext_b64)) = blob.split_once(':') else {
            return Ok(blob.to_string());
        };

        let nonce_bytes = BASE64
            .decode(nonce_b64)
            .context("invalid nonce encoding")?;
        if nonce_bytes.len() != NONCE_LEN {
            anyhow::bail!("invalid nonce length: {}", nonce_bytes.len());
        }
        let ciphertext = BASE64
            .decode(ciphertext_b64)
            .context("invalid ciphertext encoding")?;

        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), ciphertext.as_slice())
            .map_err(|_| anyhow::anyhow!("decryption failed: wrong key or corrupted data"))?;

        String::from_utf8(plaintext).context("decrypted data is not valid UTF-8")
    }
}
