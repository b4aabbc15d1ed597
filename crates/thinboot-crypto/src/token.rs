//! Opaque one-time boot tokens.
//!
//! A token is a bearer credential handed to a device inside its boot script
//! and redeemed once for the device's RDP credentials. It carries no
//! structure: 32 random bytes, base64url encoded (43 characters).

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use rand::RngCore;
use rand::rngs::OsRng;

/// Bytes of entropy per token, before encoding.
pub const TOKEN_ENTROPY_BYTES: usize = 32;

/// Characters of a token that may appear in logs.
const LOG_PREFIX_LEN: usize = 8;

/// A freshly issued boot token and its expiry (Unix seconds).
#[derive(Clone, PartialEq, Eq)]
pub struct BootToken {
    value: String,
    expires_at: i64,
}

impl BootToken {
    /// Generate a token valid for `ttl_secs` after `now`.
    pub fn generate(now: i64, ttl_secs: i64) -> Self {
        let mut bytes = [0u8; TOKEN_ENTROPY_BYTES];
        OsRng.fill_bytes(&mut bytes);
        Self {
            value: URL_SAFE_NO_PAD.encode(bytes),
            expires_at: now + ttl_secs.max(1),
        }
    }

    pub fn value(&self) -> &str {
        &self.value
    }

    pub const fn expires_at(&self) -> i64 {
        self.expires_at
    }
}

impl std::fmt::Debug for BootToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BootToken")
            .field("value", &log_prefix(&self.value))
            .field("expires_at", &self.expires_at)
            .finish()
    }
}

/// Shortened form of a token for log lines, e.g. `Xk3v9QaB...`.
pub fn log_prefix(token: &str) -> String {
    let prefix: String = token.chars().take(LOG_PREFIX_LEN).collect();
    format!("{prefix}...")
}
