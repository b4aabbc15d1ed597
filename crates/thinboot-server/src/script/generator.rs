//! iPXE boot script rendering.
//!
//! Rendering reads the client row and the server settings and nothing else
//! (apart from asking the catalog which images exist). Identical inputs give
//! byte-identical scripts.

use std::fmt::Write as _;
use std::sync::Arc;

use thinboot_core::ServerConfig;
use tracing::{debug, error, warn};

use super::catalog::InitrdCatalog;
use super::drivers::{DriverHints, MINIMAL_INITRD, initrd_for_driver, is_auto};
use super::ScriptError;
use crate::storage::Client;

/// Server-wide values baked into every script.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptSettings {
    pub server_ip: String,
    pub rds_server: String,
    pub ntp_server: String,
    pub version: String,
}

impl From<&ServerConfig> for ScriptSettings {
    fn from(config: &ServerConfig) -> Self {
        Self {
            server_ip: config.server_ip.clone(),
            rds_server: config.rds_server.clone(),
            ntp_server: config.ntp_server.clone(),
            version: config.version.clone(),
        }
    }
}

/// How the booted system gets its RDP password.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Credential<'a> {
    /// One-time token redeemable at the credentials endpoint.
    Token(&'a str),
    /// The password itself. Only used when no token could be issued.
    LegacyPassword(&'a str),
    /// No credential in the script.
    Withheld,
}

/// Renders boot scripts.
#[derive(Clone)]
pub struct ScriptGenerator {
    settings: ScriptSettings,
    hints: Arc<dyn DriverHints>,
    catalog: Arc<dyn InitrdCatalog>,
}

impl ScriptGenerator {
    pub fn new(
        settings: ScriptSettings,
        hints: Arc<dyn DriverHints>,
        catalog: Arc<dyn InitrdCatalog>,
    ) -> Self {
        Self {
            settings,
            hints,
            catalog,
        }
    }

    pub const fn settings(&self) -> &ScriptSettings {
        &self.settings
    }

    /// Render the boot script for `client`.
    pub fn render(&self, client: &Client, credential: Credential<'_>) -> Result<String, ScriptError> {
        let initrd = self.select_initrd(client)?;
        let params = self.kernel_params(client, credential);
        let s = &self.settings;

        let mut script = String::from("#!ipxe\n\n");
        script.push_str("echo ========================================\n");
        let _ = writeln!(script, "echo Thinboot thin client v{}", s.version);
        let _ = writeln!(script, "echo MAC: {}", client.mac);
        let _ = writeln!(
            script,
            "echo Hostname: {}",
            non_empty(client.hostname.as_deref()).unwrap_or("N/A")
        );
        let _ = writeln!(
            script,
            "echo Location: {}",
            non_empty(client.location.as_deref()).unwrap_or("Unknown")
        );
        let _ = writeln!(script, "echo RDS Server: {}", self.rdp_server(client));
        let _ = writeln!(script, "echo Using initramfs: {initrd}");
        script.push_str("echo ========================================\n\n");
        let _ = writeln!(script, "kernel http://{}/kernels/vmlinuz {params}", s.server_ip);
        let _ = writeln!(script, "initrd http://{}/initrds/{initrd}", s.server_ip);
        script.push_str("boot\n");

        Ok(script)
    }

    /// Pick the initramfs image: explicit driver, else the hardware hint,
    /// else the minimal image. A missing choice falls back to minimal; a
    /// missing minimal image is fatal.
    pub fn select_initrd(&self, client: &Client) -> Result<&'static str, ScriptError> {
        let driver = client.peripherals.video_driver.as_deref();
        let wanted = if is_auto(driver) {
            self.hints
                .driver_for(&client.mac)
                .map_or(MINIMAL_INITRD, initrd_for_driver)
        } else {
            driver.map_or(MINIMAL_INITRD, |d| initrd_for_driver(d.trim()))
        };

        if self.catalog.contains(wanted) {
            debug!(mac = %client.mac, initrd = wanted, driver = ?driver, "Initramfs selected");
            return Ok(wanted);
        }

        warn!(
            mac = %client.mac,
            initrd = wanted,
            location = %self.catalog.location(),
            "Initramfs missing, using minimal image"
        );
        if self.catalog.contains(MINIMAL_INITRD) {
            return Ok(MINIMAL_INITRD);
        }

        let location = self.catalog.location();
        error!(location = %location, "No initramfs images available");
        Err(ScriptError::NoInitramfs { location })
    }

    /// Kernel command line: `key=value` pairs in a fixed order.
    pub fn kernel_params(&self, client: &Client, credential: Credential<'_>) -> String {
        let s = &self.settings;
        let p = &client.peripherals;
        let mut params = vec![
            "init=/init".to_string(),
            "rw".to_string(),
            format!("serverip={}", s.server_ip),
            format!("rdserver={}", self.rdp_server(client)),
            format!("ntpserver={}", s.ntp_server),
        ];

        if let Some(domain) = non_empty(client.rdp_domain.as_deref()) {
            params.push(format!("rdpdomain={domain}"));
        }
        if let Some(user) = non_empty(client.rdp_username.as_deref()) {
            params.push(format!("rdpuser={user}"));
        }
        match credential {
            Credential::Token(token) => params.push(format!("boottoken={token}")),
            Credential::LegacyPassword(pass) if !pass.is_empty() => {
                params.push(format!("rdppass={pass}"));
            }
            Credential::LegacyPassword(_) | Credential::Withheld => {}
        }

        params.push(format!("resolution={}", resolution(client)));
        params.push(flag("sound", p.sound_enabled));
        params.push(flag("printer", p.printer_enabled));
        params.push(flag("usb", p.usb_redirect));
        params.push(flag("clipboard", p.clipboard_enabled));
        params.push(flag("drives", p.drives_redirect));
        params.push(flag("compression", p.compression_enabled));
        params.push(flag("multimon", p.multimon_enabled));
        params.push(flag("printserver", p.print_server_enabled));

        let driver = p.video_driver.as_deref().map(str::trim);
        if let Some(d) = driver.filter(|d| !is_auto(Some(*d)) && *d != "modesetting") {
            params.push(format!("videodriver={d}"));
        }
        if let Some(pass) = non_empty(p.ssh_password.as_deref()).filter(|_| p.ssh_enabled) {
            params.push(format!("sshpass={pass}"));
        }
        if p.debug_mode {
            params.push("verbose=yes".to_string());
        }

        params.join(" ")
    }

    fn rdp_server<'a>(&'a self, client: &'a Client) -> &'a str {
        non_empty(client.rdp_server.as_deref()).unwrap_or(&self.settings.rds_server)
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.filter(|v| !v.trim().is_empty())
}

fn flag(name: &str, on: bool) -> String {
    format!("{name}={}", if on { "yes" } else { "no" })
}

/// Explicit resolution string, else `WIDTHxHEIGHT`, else fullscreen.
fn resolution(client: &Client) -> String {
    if let Some(res) = non_empty(client.resolution.as_deref()) {
        return res.to_string();
    }
    match (client.rdp_width, client.rdp_height) {
        (Some(w), Some(h)) if w > 0 && h > 0 => format!("{w}x{h}"),
        _ => "fullscreen".to_string(),
    }
}
