//! Reversible credential storage.
//!
//! Credentials are stored encrypted rather than hashed so that operators can
//! recover them. The stored form is `hex(nonce):hex(ciphertext)`.

use anyhow::{Context, Result, anyhow};
use chacha20poly1305::{
    ChaCha20Poly1305, Key, Nonce,
    aead::{Aead, KeyInit, Payload},
};
use rand::{RngCore, rngs::OsRng};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};

const NONCE_LEN: usize = 12;
const AAD: &[u8] = b"tessera-credential:v1";

pub trait CredentialCipher: Send + Sync {
    /// # Errors
    /// Returns an error if encryption fails.
    fn encrypt(&self, plaintext: &str) -> Result<String>;

    /// # Errors
    /// Returns an error if the input is not a value produced by `encrypt`
    /// with the same key.
    fn decrypt(&self, stored: &str) -> Result<SecretString>;
}

/// ChaCha20-Poly1305 with a key derived from a configured passphrase.
pub struct ChaChaCredentialCipher {
    cipher: ChaCha20Poly1305,
}

impl ChaChaCredentialCipher {
    #[must_use]
    pub fn new(passphrase: &SecretString) -> Self {
        let digest = Sha256::digest(passphrase.expose_secret().as_bytes());
        let key = Key::from_slice(&digest);
        Self {
            cipher: ChaCha20Poly1305::new(key),
        }
    }
}

impl CredentialCipher for ChaChaCredentialCipher {
    #[allow(deprecated)]
    fn encrypt(&self, plaintext: &str) -> Result<String> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        OsRng
            .try_fill_bytes(&mut nonce_bytes)
            .context("failed to generate nonce")?;
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(
                nonce,
                Payload {
                    msg: plaintext.as_bytes(),
                    aad: AAD,
                },
            )
            .map_err(|e| anyhow!("Encryption failure: {e}"))?;

        Ok(format!(
            "{}:{}",
            hex::encode(nonce_bytes),
            hex::encode(ciphertext)
        ))
    }

    #[allow(deprecated)]
    fn decrypt(&self, stored: &str) -> Result<SecretString> {
        let (nonce_hex, ciphertext_hex) = stored
            .split_once(':')
            .ok_or_else(|| anyhow!("Invalid credential format"))?;
        let nonce_bytes = hex::decode(nonce_hex).context("Invalid credential nonce")?;
        if nonce_bytes.len() != NONCE_LEN {
            return Err(anyhow!("Invalid credential nonce length"));
        }
        let ciphertext = hex::decode(ciphertext_hex).context("Invalid credential ciphertext")?;

        let plaintext = self
            .cipher
            .decrypt(
                Nonce::from_slice(&nonce_bytes),
                Payload {
                    msg: &ciphertext,
                    aad: AAD,
                },
            )
            .map_err(|e| anyhow!("Decryption failure: {e}"))?;

        let plaintext = String::from_utf8(plaintext).context("credential is not UTF-8")?;
        Ok(SecretString::from(plaintext))
    }
}

impl std::fmt::Debug for ChaChaCredentialCipher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChaChaCredentialCipher")
            .finish_non_exhaustive()
    }
}
