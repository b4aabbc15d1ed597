//! Thinboot credential crypto
//!
//! ## Primitives
//!
//! - **Vault key**: Argon2id over the process master secret with a fixed salt,
//!   derived once per process
//! - **Secrets at rest**: ChaCha20-Poly1305 AEAD, random 12-byte nonce per
//!   value, stored as a versioned text envelope (`v1:...`)
//! - **Boot tokens**: 32 bytes from the OS RNG, base64url without padding

pub mod error;
pub mod token;
pub mod vault;

pub use error::VaultError;
pub use token::{BootToken, TOKEN_ENTROPY_BYTES, log_prefix};
pub use vault::{CredentialVault, ENVELOPE_PREFIX, Plaintext};
