use argon2::Argon2;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::RngCore;
use thiserror::Error;

/// Fixed salt for stretching the configured key. The key itself is the secret.
const KEY_SALT: &[u8] = b"leadpulse-persisted-state-v1";

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

#[derive(Error, Debug)]
pub enum CipherError {
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    #[error("Encryption failed")]
    Encrypt,

    #[error("Decryption failed (wrong key or corrupted data)")]
    Decrypt,

    #[error("Ciphertext is not valid base64: {0}")]
    Encoding(#[from] base64::DecodeError),

    #[error("Ciphertext too short: {0} bytes")]
    Truncated(usize),
}

/// Symmetric AEAD used for persisted state.
///
/// Output text is `base64(nonce || ciphertext || tag)` with a fresh random
/// nonce per call, so encrypting the same state twice yields different text.
#[derive(Clone)]
pub struct StateCipher {
    cipher: ChaCha20Poly1305,
}

impl StateCipher {
    pub fn from_key(key: &[u8; 32]) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(key)),
        }
    }

    /// Stretch a configuration-supplied passphrase into a cipher key with Argon2id.
    pub fn from_passphrase(passphrase: &str) -> Result<Self, CipherError> {
        if passphrase.is_empty() {
            return Err(CipherError::KeyDerivation("empty passphrase".to_string()));
        }
        let mut key = [0u8; 32];
        Argon2::default()
            .hash_password_into(passphrase.as_bytes(), KEY_SALT, &mut key)
            .map_err(|e| CipherError::KeyDerivation(e.to_string()))?;
        Ok(Self::from_key(&key))
    }

    pub fn encrypt(&self, plaintext: &[u8]) -> Result<String, CipherError> {
        let mut nonce = [0u8; NONCE_LEN];
        rand::thread_rng().fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), plaintext)
            .map_err(|_| CipherError::Encrypt)?;

        let mut blob = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        blob.extend_from_slice(&nonce);
        blob.extend_from_slice(&ciphertext);
        Ok(BASE64.encode(blob))
    }

    pub fn decrypt(&self, text: &str) -> Result<Vec<u8>, CipherError> {
        let blob = BASE64.decode(text.trim())?;
        if blob.len() < NONCE_LEN + TAG_LEN {
            return Err(CipherError::Truncated(blob.len()));
        }
        let (nonce, ciphertext) = blob.split_at(NONCE_LEN);
        self.cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CipherError::Decrypt)
    }
}
