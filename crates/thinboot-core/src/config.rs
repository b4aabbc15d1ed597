//! Configuration resolution for Thinboot.
//!
//! Resolution order (lowest to highest priority):
//! 1. Built-in defaults
//! 2. JSON config file (`--config`)
//! 3. Environment variables

use std::path::{Path, PathBuf};

use rand::RngCore;
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::error::{Error, Result};

/// Placeholder value that must never be used as a real master secret.
const PLACEHOLDER_SECRET: &str = "change-me";

/// Minimum length of a master secret read from disk.
const MIN_SECRET_LEN: usize = 32;

/// Complete server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address thin clients use to reach this server (kernel/initrd downloads).
    pub server_ip: String,
    /// Default RDP server for clients without their own.
    pub rds_server: String,
    pub ntp_server: String,
    /// Directory holding the initramfs images.
    pub initrd_dir: PathBuf,
    /// Where device diagnostic reports are written.
    pub diagnostic_dir: PathBuf,
    /// Version string printed by boot scripts.
    pub version: String,
    pub boot_rate_limit: u32,
    pub ingest_rate_limit: u32,
    pub rate_window_secs: u64,
    pub token_ttl_secs: i64,
    pub sweep_interval_secs: u64,
    pub sweep_timeout_secs: u64,
    /// Where the generated master secret is persisted.
    pub secret_key_file: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            server_ip: "127.0.0.1".to_string(),
            rds_server: "localhost".to_string(),
            ntp_server: "pool.ntp.org".to_string(),
            initrd_dir: PathBuf::from("/var/www/thinclient/initrds"),
            diagnostic_dir: PathBuf::from("/var/log/thinclient/diagnostics"),
            version: env!("CARGO_PKG_VERSION").to_string(),
            boot_rate_limit: 100,
            ingest_rate_limit: 60,
            rate_window_secs: 60,
            token_ttl_secs: 600, // 10 minutes
            sweep_interval_secs: 60,
            sweep_timeout_secs: 10,
            secret_key_file: PathBuf::from("/opt/thinboot/.secret_key"),
        }
    }
}

impl ServerConfig {
    /// Load configuration from an optional JSON file, then apply env overrides.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut config = match path {
            Some(path) => load_config_file(path)?,
            None => Self::default(),
        };
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(val) = std::env::var("THINBOOT_SERVER_IP") {
            self.server_ip = val;
        }
        if let Ok(val) = std::env::var("THINBOOT_RDS_SERVER") {
            self.rds_server = val;
        }
        if let Ok(val) = std::env::var("THINBOOT_NTP_SERVER") {
            self.ntp_server = val;
        }
        if let Ok(val) = std::env::var("THINBOOT_INITRD_DIR") {
            self.initrd_dir = PathBuf::from(val);
        }
        if let Ok(val) = std::env::var("THINBOOT_DIAGNOSTIC_DIR") {
            self.diagnostic_dir = PathBuf::from(val);
        }
    }
}

fn load_config_file(path: &Path) -> Result<ServerConfig> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        Error::Config(format!("Failed to read config file {}: {}", path.display(), e))
    })?;
    serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Failed to parse config file {}: {}", path.display(), e))
    })
}

/// Resolve the master secret used to derive the credential vault key.
///
/// Uses `env_value` when set to something other than the placeholder, then
/// the secret file, and finally generates a new secret and tries to persist it.
pub fn resolve_master_secret(env_value: Option<&str>, secret_file: &Path) -> Result<String> {
    if let Some(secret) = env_value.filter(|s| !s.is_empty() && *s != PLACEHOLDER_SECRET) {
        return Ok(secret.to_string());
    }

    match std::fs::read_to_string(secret_file) {
        Ok(content) => {
            let secret = content.trim();
            if secret.len() >= MIN_SECRET_LEN {
                return Ok(secret.to_string());
            }
            warn!(path = %secret_file.display(), "Secret file too short, generating a new secret");
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => {
            warn!(path = %secret_file.display(), error = %e, "Could not read secret file");
        }
    }

    let mut bytes = [0u8; 32];
    OsRng.fill_bytes(&mut bytes);
    let secret = hex::encode(bytes);

    if let Err(e) = persist_secret(secret_file, &secret) {
        warn!(
            path = %secret_file.display(),
            error = %e,
            "Could not persist master secret; stored credentials will be unreadable after restart"
        );
    } else {
        info!(path = %secret_file.display(), "Generated new master secret");
    }

    Ok(secret)
}

fn persist_secret(path: &Path, secret: &str) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, secret)?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))?;
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_boot_protocol() {
        let config = ServerConfig::default();
        assert_eq!(config.boot_rate_limit, 100);
        assert_eq!(config.ingest_rate_limit, 60);
        assert_eq!(config.rate_window_secs, 60);
        assert_eq!(config.token_ttl_secs, 600);
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"server_ip": "10.0.0.1", "boot_rate_limit": 5}"#).unwrap();

        let config = load_config_file(&path).unwrap();
        assert_eq!(config.server_ip, "10.0.0.1");
        assert_eq!(config.boot_rate_limit, 5);
        assert_eq!(config.ntp_server, "pool.ntp.org");
        assert_eq!(
            config.diagnostic_dir,
            PathBuf::from("/var/log/thinclient/diagnostics")
        );
    }

    #[test]
    fn malformed_file_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{not json").unwrap();
        assert!(matches!(load_config_file(&path), Err(Error::Config(_))));
    }

    #[test]
    fn env_secret_wins_unless_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("secret");
        assert_eq!(resolve_master_secret(Some("from-env"), &file).unwrap(), "from-env");

        let generated = resolve_master_secret(Some(PLACEHOLDER_SECRET), &file).unwrap();
        assert_ne!(generated, PLACEHOLDER_SECRET);
        assert_eq!(generated.len(), 64);
    }

    #[test]
    fn generated_secret_is_reused_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("nested").join("secret");
        let first = resolve_master_secret(None, &file).unwrap();
        let second = resolve_master_secret(None, &file).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn short_secret_file_is_replaced() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("secret");
        std::fs::write(&file, "short").unwrap();
        let secret = resolve_master_secret(None, &file).unwrap();
        assert_eq!(secret.len(), 64);
        assert_eq!(std::fs::read_to_string(&file).unwrap(), secret);
    }
}
