//! Sealing of user ids into the identity cookie.

use base64::engine::general_purpose::{STANDARD, URL_SAFE_NO_PAD};
use base64::Engine;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use thiserror::Error;

const KEY_LEN: usize = 32;
const NONCE_LEN: usize = 12;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum CipherError {
    #[error("secret key must be {KEY_LEN} bytes encoded as hex or base64")]
    InvalidKey,
    #[error("token is not valid base64url")]
    Encoding,
    #[error("token is too short")]
    Truncated,
    #[error("token failed authentication")]
    Rejected,
    #[error("sealing failed")]
    Seal,
}

/// Authenticated encryption of user ids.
///
/// A token is `base64url(nonce || ciphertext)` with a random 96-bit nonce per
/// seal, so sealing the same id twice yields different tokens.
#[derive(Clone)]
pub struct UserCipher {
    cipher: ChaCha20Poly1305,
}

impl std::fmt::Debug for UserCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UserCipher").finish_non_exhaustive()
    }
}

impl UserCipher {
    pub fn new(key: [u8; KEY_LEN]) -> Self {
        Self {
            cipher: ChaCha20Poly1305::new(Key::from_slice(&key)),
        }
    }

    /// A cipher with a fresh key. Tokens it issues die with the process.
    pub fn random() -> Self {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        Self::new(key)
    }

    /// Parses a 32-byte key given as hex or base64.
    pub fn from_secret(secret: &str) -> Result<Self, CipherError> {
        let secret = secret.trim();
        let bytes = hex::decode(secret)
            .ok()
            .or_else(|| STANDARD.decode(secret).ok())
            .or_else(|| URL_SAFE_NO_PAD.decode(secret).ok())
            .ok_or(CipherError::InvalidKey)?;

        let key: [u8; KEY_LEN] = bytes.try_into().map_err(|_| CipherError::InvalidKey)?;
        Ok(Self::new(key))
    }

    pub fn seal(&self, user_id: &str) -> Result<String, CipherError> {
        let mut nonce = [0u8; NONCE_LEN];
        OsRng.fill_bytes(&mut nonce);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce), user_id.as_bytes())
            .map_err(|_| CipherError::Seal)?;

        let mut token = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        token.extend_from_slice(&nonce);
        token.extend_from_slice(&ciphertext);
        Ok(URL_SAFE_NO_PAD.encode(token))
    }

    pub fn open(&self, token: &str) -> Result<String, CipherError> {
        let raw = URL_SAFE_NO_PAD
            .decode(token.as_bytes())
            .map_err(|_| CipherError::Encoding)?;
        if raw.len() <= NONCE_LEN {
            return Err(CipherError::Truncated);
        }

        let (nonce, ciphertext) = raw.split_at(NONCE_LEN);
        let plain = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|_| CipherError::Rejected)?;

        String::from_utf8(plain).map_err(|_| CipherError::Rejected)
    }
}
