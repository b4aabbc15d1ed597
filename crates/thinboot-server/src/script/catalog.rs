//! Which initramfs images are available to serve.

use std::path::PathBuf;

/// Answers whether an initramfs image can be served.
pub trait InitrdCatalog: Send + Sync {
    fn contains(&self, file: &str) -> bool;

    /// Where images are looked up, for error messages.
    fn location(&self) -> String;
}

/// Images stored as files in one directory.
#[derive(Debug, Clone)]
pub struct DirCatalog {
    dir: PathBuf,
}

impl DirCatalog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }
}

impl InitrdCatalog for DirCatalog {
    fn contains(&self, file: &str) -> bool {
        self.dir.join(file).is_file()
    }

    fn location(&self) -> String {
        self.dir.display().to_string()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn finds_files_only() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("initrd-minimal.img"), b"img").unwrap();
        std::fs::create_dir(dir.path().join("initrd-intel.img")).unwrap();

        let catalog = DirCatalog::new(dir.path());
        assert!(catalog.contains("initrd-minimal.img"));
        assert!(!catalog.contains("initrd-intel.img"));
        assert!(!catalog.contains("initrd-amd.img"));
        assert_eq!(catalog.location(), dir.path().display().to_string());
    }
}
