//! Credential vault for RDP secrets at rest.
//!
//! A single symmetric key is derived from the master secret with Argon2id
//! and a fixed salt, so the same master secret yields the same key after a
//! restart without storing the key anywhere. Each secret is sealed with
//! ChaCha20-Poly1305 under a fresh random nonce.
//!
//! Stored form: `v1:` followed by base64url (no padding) of
//! `nonce (12 bytes) || ciphertext || tag (16 bytes)`. Values without the
//! `v1:` tag predate encryption and are returned as [`Plaintext::Legacy`].

use argon2::{Algorithm, Argon2, Params, Version};
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chacha20poly1305::aead::{Aead, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::RngCore;
use rand::rngs::OsRng;
use zeroize::Zeroize;

use crate::error::VaultError;

/// Tag that marks a stored value as an encrypted envelope.
pub const ENVELOPE_PREFIX: &str = "v1:";

/// Fixed KDF salt. Changing it makes every stored secret unreadable.
const KDF_SALT: &[u8] = b"thinboot-credential-vault-salt-v1";

/// Argon2id cost: 19 MiB, 2 passes, 1 lane.
const KDF_MEMORY_KIB: u32 = 19 * 1024;
const KDF_ITERATIONS: u32 = 2;
const KDF_LANES: u32 = 1;

const KEY_SIZE: usize = 32;
const NONCE_SIZE: usize = 12;
const TAG_SIZE: usize = 16;

/// Result of opening a stored secret.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Plaintext {
    /// Value was a valid envelope and authenticated.
    Decrypted(String),
    /// Value was stored before encryption was introduced.
    Legacy(String),
}

impl Plaintext {
    pub fn into_inner(self) -> String {
        match self {
            Self::Decrypted(s) | Self::Legacy(s) => s,
        }
    }

    pub const fn is_legacy(&self) -> bool {
        matches!(self, Self::Legacy(_))
    }
}

/// Encrypts and decrypts RDP secrets with a key derived once per process.
pub struct CredentialVault {
    cipher: ChaCha20Poly1305,
}

impl std::fmt::Debug for CredentialVault {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialVault").finish_non_exhaustive()
    }
}

impl CredentialVault {
    /// Derive the vault key from the master secret.
    pub fn derive(master_secret: &[u8]) -> Result<Self, VaultError> {
        let params = Params::new(KDF_MEMORY_KIB, KDF_ITERATIONS, KDF_LANES, Some(KEY_SIZE))
            .map_err(|e| VaultError::KeyDerivationFailed(e.to_string()))?;
        Self::derive_with_params(master_secret, params)
    }

    /// Cheap KDF parameters so tests do not spend seconds per vault.
    #[cfg(any(test, feature = "test-utils"))]
    pub fn derive_for_tests(master_secret: &[u8]) -> Result<Self, VaultError> {
        let params = Params::new(64, 1, 1, Some(KEY_SIZE))
            .map_err(|e| VaultError::KeyDerivationFailed(e.to_string()))?;
        Self::derive_with_params(master_secret, params)
    }

    fn derive_with_params(master_secret: &[u8], params: Params) -> Result<Self, VaultError> {
        if master_secret.is_empty() {
            return Err(VaultError::KeyDerivationFailed(
                "master secret is empty".to_string(),
            ));
        }

        let mut key_bytes = [0u8; KEY_SIZE];
        Argon2::new(Algorithm::Argon2id, Version::V0x13, params)
            .hash_password_into(master_secret, KDF_SALT, &mut key_bytes)
            .map_err(|e| VaultError::KeyDerivationFailed(e.to_string()))?;

        let cipher = ChaCha20Poly1305::new(Key::from_slice(&key_bytes));
        key_bytes.zeroize();

        Ok(Self { cipher })
    }

    /// Seal a secret into a `v1:` envelope.
    pub fn encrypt(&self, plaintext: &str) -> Result<String, VaultError> {
        let mut nonce_bytes = [0u8; NONCE_SIZE];
        OsRng.fill_bytes(&mut nonce_bytes);

        let ciphertext = self
            .cipher
            .encrypt(Nonce::from_slice(&nonce_bytes), plaintext.as_bytes())
            .map_err(|e| VaultError::EncryptionFailed(e.to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&ciphertext);

        Ok(format!("{ENVELOPE_PREFIX}{}", URL_SAFE_NO_PAD.encode(sealed)))
    }

    /// Open a stored value.
    ///
    /// Untagged values are legacy plaintext and come back unchanged. A tagged
    /// value that does not decode or fails authentication is an error; it is
    /// never handed back as plaintext.
    ///
    /// A legacy plaintext that itself begins with `v1:` cannot be told apart
    /// from a damaged envelope, so it also fails here and the secret has to be
    /// set again.
    pub fn decrypt(&self, stored: &str) -> Result<Plaintext, VaultError> {
        let Some(body) = stored.strip_prefix(ENVELOPE_PREFIX) else {
            return Ok(Plaintext::Legacy(stored.to_string()));
        };

        let sealed = URL_SAFE_NO_PAD
            .decode(body)
            .map_err(|e| VaultError::MalformedEnvelope(e.to_string()))?;

        if sealed.len() < NONCE_SIZE + TAG_SIZE {
            return Err(VaultError::MalformedEnvelope(format!(
                "envelope too short: {} bytes",
                sealed.len()
            )));
        }

        let (nonce, ciphertext) = sealed.split_at(NONCE_SIZE);
        let plaintext = self
            .cipher
            .decrypt(Nonce::from_slice(nonce), ciphertext)
            .map_err(|e| VaultError::DecryptionFailed(e.to_string()))?;

        String::from_utf8(plaintext)
            .map(Plaintext::Decrypted)
            .map_err(|e| VaultError::DecryptionFailed(e.to_string()))
    }

    /// Whether a stored value is already an encrypted envelope.
    pub fn is_envelope(stored: &str) -> bool {
        stored.starts_with(ENVELOPE_PREFIX)
    }
}
