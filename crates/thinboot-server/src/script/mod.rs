//! Boot script generation: initramfs selection and kernel parameters.

mod catalog;
mod drivers;
mod generator;

pub use catalog::{DirCatalog, InitrdCatalog};
pub use drivers::{DriverHints, MINIMAL_INITRD, OuiTable, initrd_for_driver};
pub use generator::{Credential, ScriptGenerator, ScriptSettings};

/// Errors from script generation.
#[derive(Debug, thiserror::Error)]
pub enum ScriptError {
    /// Not even the minimal initramfs exists. A deployment problem, not a
    /// client one.
    #[error("No initramfs images available in {location}")]
    NoInitramfs { location: String },
}
