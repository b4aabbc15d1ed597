//! Data models for Thinboot storage.

use serde::{Deserialize, Serialize};
use thinboot_core::MacAddress;

/// Liveness state of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum ClientStatus {
    Offline,
    Booting,
    Online,
}

impl ClientStatus {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Offline => "offline",
            Self::Booting => "booting",
            Self::Online => "online",
        }
    }
}

impl std::fmt::Display for ClientStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Peripheral and feature toggles. Opaque to the boot protocol; passed
/// straight through to the boot script.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, sqlx::FromRow)]
pub struct Peripherals {
    pub sound_enabled: bool,
    pub printer_enabled: bool,
    pub print_server_enabled: bool,
    pub usb_redirect: bool,
    pub drives_redirect: bool,
    pub clipboard_enabled: bool,
    pub compression_enabled: bool,
    pub multimon_enabled: bool,
    /// Explicit X.org driver; `None` or `"auto"` means detect from the MAC.
    pub video_driver: Option<String>,
    pub ssh_enabled: bool,
    #[serde(skip_serializing)]
    pub ssh_password: Option<String>,
    pub debug_mode: bool,
}

impl Default for Peripherals {
    fn default() -> Self {
        Self {
            sound_enabled: true,
            printer_enabled: false,
            print_server_enabled: false,
            usb_redirect: false,
            drives_redirect: false,
            clipboard_enabled: true,
            compression_enabled: true,
            multimon_enabled: false,
            video_driver: None,
            ssh_enabled: false,
            ssh_password: None,
            debug_mode: false,
        }
    }
}

/// One row per physical device.
#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct Client {
    pub id: i64,
    #[sqlx(try_from = "String")]
    pub mac: MacAddress,
    pub hostname: Option<String>,
    pub location: Option<String>,

    pub rdp_server: Option<String>,
    pub rdp_domain: Option<String>,
    pub rdp_username: Option<String>,
    /// Sealed vault envelope (or legacy plaintext). Never serialized.
    #[serde(skip_serializing)]
    pub rdp_password: Option<String>,

    pub resolution: Option<String>,
    pub rdp_width: Option<i64>,
    pub rdp_height: Option<i64>,

    #[sqlx(flatten)]
    pub peripherals: Peripherals,

    pub status: ClientStatus,
    pub boot_count: i64,
    pub last_boot: Option<i64>,
    pub last_seen: Option<i64>,
    pub last_ip: Option<String>,

    #[serde(skip_serializing)]
    pub boot_token: Option<String>,
    pub boot_token_expires: Option<i64>,

    pub cpu_usage: Option<f64>,
    pub mem_usage: Option<f64>,
    pub rx_bytes: Option<i64>,
    pub tx_bytes: Option<i64>,

    pub is_active: bool,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Fields needed to insert a client row.
#[derive(Debug, Clone)]
pub struct NewClient<'a> {
    pub mac: MacAddress,
    pub hostname: &'a str,
    pub rdp_server: Option<&'a str>,
    pub last_ip: &'a str,
}

/// Latest performance snapshot reported by a device.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MetricsSnapshot {
    pub cpu_usage: Option<f64>,
    pub mem_usage: Option<f64>,
    pub rx_bytes: Option<i64>,
    pub tx_bytes: Option<i64>,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct ClientEvent {
    pub id: i64,
    pub client_id: i64,
    pub level: String,
    pub category: String,
    pub details: String,
    pub ip_address: Option<String>,
    pub created_at: i64,
}

#[derive(Debug, Clone, Serialize, sqlx::FromRow)]
pub struct AuditEvent {
    pub id: i64,
    pub actor: String,
    pub action: String,
    pub details: String,
    pub ip_address: Option<String>,
    pub created_at: i64,
}
