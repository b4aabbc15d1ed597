//! Client registry: device identity, registration and RDP secrets.

mod clients;

pub use clients::{ClientRegistry, RdpCredentials, RegistryError};
