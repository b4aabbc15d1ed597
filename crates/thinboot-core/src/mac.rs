//! MAC address parsing.
//!
//! Devices are keyed by their MAC address in canonical form: six uppercase
//! hex octets separated by colons (`00:11:22:AA:BB:CC`). Input may use `:` or
//! `-` separators (mixed is fine) or none at all. The all-zero and broadcast
//! addresses never identify a real device and are rejected.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

const NULL_MAC: [u8; 6] = [0x00; 6];
const BROADCAST_MAC: [u8; 6] = [0xFF; 6];

/// A validated hardware address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct MacAddress([u8; 6]);

impl MacAddress {
    /// Parse and normalize a MAC address.
    pub fn parse(input: &str) -> Result<Self, Error> {
        let hex: String = input
            .trim()
            .chars()
            .filter(|c| *c != ':' && *c != '-')
            .collect();

        if hex.len() != 12 || !hex.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(Error::InvalidMac(input.to_string()));
        }

        let mut octets = [0u8; 6];
        hex::decode_to_slice(&hex, &mut octets)
            .map_err(|_| Error::InvalidMac(input.to_string()))?;

        if octets == NULL_MAC || octets == BROADCAST_MAC {
            return Err(Error::InvalidMac(input.to_string()));
        }

        Ok(Self(octets))
    }

    pub const fn octets(&self) -> [u8; 6] {
        self.0
    }

    /// Vendor prefix (first three octets), e.g. `00:0C:29`.
    pub fn oui(&self) -> String {
        format!("{:02X}:{:02X}:{:02X}", self.0[0], self.0[1], self.0[2])
    }

    /// Hostname assigned to devices registered without one: `tc-` plus the
    /// last six hex digits.
    pub fn default_hostname(&self) -> String {
        format!("tc-{:02X}{:02X}{:02X}", self.0[3], self.0[4], self.0[5])
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let [a, b, c, d, e, g] = self.0;
        write!(f, "{a:02X}:{b:02X}:{c:02X}:{d:02X}:{e:02X}:{g:02X}")
    }
}

impl FromStr for MacAddress {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for MacAddress {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<MacAddress> for String {
    fn from(mac: MacAddress) -> Self {
        mac.to_string()
    }
}
