use aes_gcm::{
    aead::{Aead, KeyInit},
    Aes256Gcm, Nonce,
};
use base64::Engine as _;
use rand::RngCore;

use crate::error::TokenStoreError;

const NONCE_LEN: usize = 12;

/// Seals token values before they are written and opens them after they are read.
///
/// Without a key the cipher is a pass-through. Switching a populated table
/// between modes makes existing rows unreadable until the next `store`.
#[derive(Clone, Default)]
pub struct TokenCipher {
    cipher: Option<Aes256Gcm>,
}

impl TokenCipher {
    /// A cipher that stores values verbatim.
    pub fn plaintext() -> Self {
        Self { cipher: None }
    }

    /// Create a sealing cipher from a base64-encoded 32-byte key.
    pub fn from_base64_key(key_b64: &str) -> Result<Self, TokenStoreError> {
        let key = base64::engine::general_purpose::STANDARD
            .decode(key_b64.trim())
            .map_err(|e| {
                TokenStoreError::Configuration(format!("Invalid TOKEN_ENCRYPTION_KEY base64: {e}"))
            })?;

        if key.len() != 32 {
            return Err(TokenStoreError::Configuration(format!(
                "TOKEN_ENCRYPTION_KEY must be 32 bytes, got {}",
                key.len()
            )));
        }

        let cipher = Aes256Gcm::new_from_slice(&key)
            .map_err(|e| TokenStoreError::Crypto(format!("Failed to init AES cipher: {e}")))?;

        Ok(Self {
            cipher: Some(cipher),
        })
    }

    /// Build from an optional configured key.
    pub fn from_config_key(key_b64: Option<&str>) -> Result<Self, TokenStoreError> {
        match key_b64 {
            Some(key) => Self::from_base64_key(key),
            None => Ok(Self::plaintext()),
        }
    }

    pub fn is_sealing(&self) -> bool {
        self.cipher.is_some()
    }

    /// Returns base64(nonce || ciphertext), or the input unchanged in plaintext mode.
    pub fn seal(&self, plaintext: &str) -> Result<String, TokenStoreError> {
        let Some(cipher) = &self.cipher else {
            return Ok(plaintext.to_owned());
        };

        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce_bytes);
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, plaintext.as_bytes())
            .map_err(|e| TokenStoreError::Crypto(format!("Encryption failed: {e}")))?;

        let mut combined = nonce_bytes.to_vec();
        combined.extend_from_slice(&ciphertext);

        Ok(base64::engine::general_purpose::STANDARD.encode(&combined))
    }

    /// Reverse of [`TokenCipher::seal`].
    pub fn open(&self, stored: &str) -> Result<String, TokenStoreError> {
        let Some(cipher) = &self.cipher else {
            return Ok(stored.to_owned());
        };

        let combined = base64::engine::general_purpose::STANDARD
            .decode(stored)
            .map_err(|e| TokenStoreError::Crypto(format!("Invalid base64: {e}")))?;

        if combined.len() < NONCE_LEN {
            return Err(TokenStoreError::Crypto("Ciphertext too short".into()));
        }

        let (nonce_bytes, ciphertext) = combined.split_at(NONCE_LEN);
        let nonce = Nonce::from_slice(nonce_bytes);

        let plaintext = cipher
            .decrypt(nonce, ciphertext)
            .map_err(|e| TokenStoreError::Crypto(format!("Decryption failed: {e}")))?;

        String::from_utf8(plaintext)
            .map_err(|e| TokenStoreError::Crypto(format!("Invalid UTF-8 after decrypt: {e}")))
    }
}

impl std::fmt::Debug for TokenCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCipher")
            .field("sealing", &self.is_sealing())
            .finish()
    }
}
