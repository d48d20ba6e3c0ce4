//! Short-message encryption with RSA-OAEP.
//!
//! OAEP caps the plaintext at `k - 2*hLen - 2` bytes (190 for a 2048-bit key
//! with SHA-256). Longer input is refused before any padding work happens.

use std::sync::Arc;

use base64::{engine::general_purpose, Engine as _};
use tracing::debug;

use crate::error::{CryptoError, Result, WhisprError};
use crate::provider::CryptoProvider;

#[derive(Clone)]
pub struct MessageCipher {
    provider: Arc<dyn CryptoProvider>,
}

impl MessageCipher {
    pub fn new(provider: Arc<dyn CryptoProvider>) -> Self {
        Self { provider }
    }

    pub fn max_plaintext_len(&self, recipient_public_pem: &str) -> Result<usize> {
        Ok(self.provider.max_plaintext_len(recipient_public_pem)?)
    }

    /// Encrypt for the holder of `recipient_public_pem`; returns base64.
    pub fn encrypt(&self, plaintext: &str, recipient_public_pem: &str) -> Result<String> {
        let max = self.provider.max_plaintext_len(recipient_public_pem)?;
        if plaintext.len() > max {
            return Err(WhisprError::PayloadTooLarge {
                len: plaintext.len(),
                max,
            });
        }
        let ciphertext = self
            .provider
            .encrypt(recipient_public_pem, plaintext.as_bytes())?;
        debug!(plaintext_len = plaintext.len(), "message encrypted");
        Ok(general_purpose::STANDARD.encode(ciphertext))
    }

    pub fn decrypt(&self, ciphertext_b64: &str, owner_private_pem: &str) -> Result<String> {
        let ciphertext = general_purpose::STANDARD
            .decode(ciphertext_b64.trim())
            .map_err(CryptoError::from)?;
        let plaintext = self.provider.decrypt(owner_private_pem, &ciphertext)?;
        let text = String::from_utf8(plaintext).map_err(|_| CryptoError::Decrypt)?;
        debug!(plaintext_len = text.len(), "message decrypted");
        Ok(text)
    }
}
