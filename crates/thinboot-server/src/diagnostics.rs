//! On-disk store for device diagnostic reports.
//!
//! One text file per report, named `<MAC without separators>_<unix time>.txt`
//! with a short header in front of the body the device sent.

use std::io::ErrorKind;
use std::path::PathBuf;

use thinboot_core::MacAddress;
use tokio::io::AsyncWriteExt;
use tracing::debug;

/// Reports for one device within the same second get a numeric suffix; this
/// bounds how many such files are tried.
const MAX_SAME_SECOND_REPORTS: u32 = 100;

/// Writes diagnostic reports under a fixed directory.
#[derive(Debug, Clone)]
pub struct DiagnosticStore {
    dir: PathBuf,
}

impl DiagnosticStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    /// Persist one report and return the path it was written to.
    ///
    /// Never overwrites an earlier report.
    pub async fn save(
        &self,
        mac: &MacAddress,
        ip: &str,
        now: i64,
        report: &str,
    ) -> std::io::Result<PathBuf> {
        tokio::fs::create_dir_all(&self.dir).await?;

        let stem = format!("{}_{now}", mac.to_string().replace(':', ""));
        for attempt in 0..MAX_SAME_SECOND_REPORTS {
            let name = if attempt == 0 {
                format!("{stem}.txt")
            } else {
                format!("{stem}-{attempt}.txt")
            };
            let path = self.dir.join(name);

            let mut file = match tokio::fs::OpenOptions::new()
                .write(true)
                .create_new(true)
                .open(&path)
                .await
            {
                Ok(file) => file,
                Err(e) if e.kind() == ErrorKind::AlreadyExists => continue,
                Err(e) => return Err(e),
            };

            let header = format!(
                "Thinboot Diagnostic Report\nMAC: {mac}\nTimestamp: {now}\nRemote IP: {ip}\n{}\n\n",
                "=".repeat(60)
            );
            file.write_all(header.as_bytes()).await?;
            file.write_all(report.as_bytes()).await?;
            file.flush().await?;

            debug!(mac = %mac, path = %path.display(), "Diagnostic report written");
            return Ok(path);
        }

        Err(std::io::Error::new(
            ErrorKind::AlreadyExists,
            format!("too many reports for {mac} at {now}"),
        ))
    }
}
