use base64::engine::general_purpose::URL_SAFE;
use base64::Engine;
use chacha20poly1305::{
    aead::{Aead, KeyInit, OsRng},
    ChaCha20Poly1305, Key, Nonce,
};
use rand::RngCore;

use crate::error::VaultError;

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Encrypts `plaintext` under `key`, returning URL-safe base64 of `nonce || ciphertext`.
///
/// A fresh nonce is drawn for every call, so encrypting the same plaintext
/// twice yields two different secrets.
pub fn encrypt(key: &[u8], plaintext: &str) -> Result<String, VaultError> {
    let cipher = cipher_for(key)?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|_| VaultError::Encryption)?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);

    Ok(URL_SAFE.encode(sealed))
}

pub fn decrypt(key: &[u8], secret: &str) -> Result<String, VaultError> {
    let cipher = cipher_for(key)?;

    let sealed = URL_SAFE
        .decode(secret.trim())
        .map_err(|e| VaultError::InvalidCiphertext(e.to_string()))?;

    if sealed.len() < NONCE_LEN + TAG_LEN {
        return Err(VaultError::InvalidCiphertext(format!(
            "{} bytes is shorter than nonce and tag",
            sealed.len()
        )));
    }

    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);
    let plaintext = cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| VaultError::Decryption)?;

    String::from_utf8(plaintext).map_err(|_| VaultError::Decryption)
}

fn cipher_for(key: &[u8]) -> Result<ChaCha20Poly1305, VaultError> {
    if key.len() != KEY_LEN {
        return Err(VaultError::InvalidKeySize(key.len()));
    }
    Ok(ChaCha20Poly1305::new(Key::from_slice(key)))
}

/// Holds the process-wide credential key, injected from configuration at startup.
#[derive(Clone)]
pub struct CredentialVault {
    key: [u8; KEY_LEN],
}

impl CredentialVault {
    pub fn new(key: &[u8]) -> Result<Self, VaultError> {
        let key: [u8; KEY_LEN] = key
            .try_into()
            .map_err(|_| VaultError::InvalidKeySize(key.len()))?;
        Ok(Self { key })
    }

    pub fn from_hex(key_hex: &str) -> Result<Self, VaultError> {
        let bytes = hex::decode(key_hex.trim())
            .map_err(|_| VaultError::InvalidKeySize(key_hex.trim().len() / 2))?;
        Self::new(&bytes)
    }

    pub fn generate_key_hex() -> String {
        let mut key = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut key);
        hex::encode(key)
    }

    pub fn encrypt(&self, plaintext: &str) -> Result<String, VaultError> {
        encrypt(&self.key, plaintext)
    }

    pub fn decrypt(&self, secret: &str) -> Result<String, VaultError> {
        decrypt(&self.key, secret)
    }
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVault")
            .field("key", &"***")
            .finish()
    }
}
