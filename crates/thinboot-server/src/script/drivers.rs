//! Video driver selection and the initramfs image each driver needs.

use std::collections::HashMap;

use thinboot_core::MacAddress;

/// Image that must always be present; every other choice falls back to it.
pub const MINIMAL_INITRD: &str = "initrd-minimal.img";

/// Driver values that mean "detect from the hardware".
pub fn is_auto(driver: Option<&str>) -> bool {
    matches!(driver.map(str::trim), None | Some("" | "auto"))
}

/// Initramfs image for an X.org driver name.
pub fn initrd_for_driver(driver: &str) -> &'static str {
    match driver {
        "intel" => "initrd-intel.img",
        "amd" => "initrd-amd.img",
        "nvidia" => "initrd-nvidia.img",
        "vmware" => "initrd-vmware.img",
        "modesetting" | "generic" => "initrd-generic.img",
        _ => MINIMAL_INITRD,
    }
}

/// Guesses a video driver from a hardware address.
pub trait DriverHints: Send + Sync {
    /// Driver name for `mac`, or `None` when nothing is known about it.
    fn driver_for(&self, mac: &MacAddress) -> Option<&str>;
}

/// Vendor prefix lookup table.
#[derive(Debug, Clone)]
pub struct OuiTable {
    entries: HashMap<[u8; 3], String>,
}

impl OuiTable {
    pub fn empty() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Add or replace the driver for a vendor prefix.
    #[must_use]
    pub fn with(mut self, oui: [u8; 3], driver: &str) -> Self {
        self.entries.insert(oui, driver.to_string());
        self
    }
}

impl Default for OuiTable {
    /// Known virtual platforms and desktop vendors.
    fn default() -> Self {
        Self::empty()
            // VMware
            .with([0x00, 0x0C, 0x29], "vmware")
            .with([0x00, 0x50, 0x56], "vmware")
            .with([0x00, 0x05, 0x69], "vmware")
            // VirtualBox
            .with([0x08, 0x00, 0x27], "generic")
            .with([0x0A, 0x00, 0x27], "generic")
            // Dell
            .with([0x00, 0x14, 0x22], "intel")
            .with([0x00, 0x1A, 0xA0], "intel")
            // HP
            .with([0x00, 0x1B, 0x78], "intel")
            .with([0x00, 0x21, 0x5A], "intel")
            // Lenovo
            .with([0x00, 0x21, 0xCC], "intel")
            .with([0x54, 0xEE, 0x75], "intel")
    }
}

impl DriverHints for OuiTable {
    fn driver_for(&self, mac: &MacAddress) -> Option<&str> {
        let [a, b, c, ..] = mac.octets();
        self.entries.get(&[a, b, c]).map(String::as_str)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn mac(s: &str) -> MacAddress {
        MacAddress::parse(s).unwrap()
    }

    #[test]
    fn default_table_knows_common_vendors() {
        let table = OuiTable::default();
        assert_eq!(table.driver_for(&mac("00:0C:29:01:02:03")), Some("vmware"));
        assert_eq!(table.driver_for(&mac("08:00:27:01:02:03")), Some("generic"));
        assert_eq!(table.driver_for(&mac("54:EE:75:01:02:03")), Some("intel"));
        assert_eq!(table.driver_for(&mac("00:11:22:01:02:03")), None);
    }

    #[test]
    fn table_entries_can_be_replaced() {
        let table = OuiTable::default().with([0x00, 0x0C, 0x29], "nvidia");
        assert_eq!(table.driver_for(&mac("00:0C:29:01:02:03")), Some("nvidia"));
    }

    #[test]
    fn driver_images() {
        assert_eq!(initrd_for_driver("intel"), "initrd-intel.img");
        assert_eq!(initrd_for_driver("modesetting"), "initrd-generic.img");
        assert_eq!(initrd_for_driver("fbdev"), MINIMAL_INITRD);
    }

    #[test]
    fn auto_detection_values() {
        assert!(is_auto(None));
        assert!(is_auto(Some("auto")));
        assert!(is_auto(Some("")));
        assert!(!is_auto(Some("intel")));
    }
}
