//! Transient on-disk staging of uploads while they are processed.

use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::NamedTempFile;
use tracing::debug;

/// Directory where uploads are staged under unique names.
#[derive(Debug, Clone)]
pub struct UploadStaging {
    dir: PathBuf,
}

impl UploadStaging {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `bytes` to a fresh file in the staging directory. The file is
    /// removed when the returned guard is dropped.
    pub fn stage(&self, filename: &str, bytes: &[u8]) -> std::io::Result<StagedUpload> {
        std::fs::create_dir_all(&self.dir)?;

        let suffix = Path::new(filename)
            .extension()
            .and_then(|e| e.to_str())
            .filter(|e| !e.is_empty() && e.chars().all(|c| c.is_ascii_alphanumeric()))
            .map(|e| format!(".{}", e.to_ascii_lowercase()))
            .unwrap_or_default();

        let mut file = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(&suffix)
            .tempfile_in(&self.dir)?;
        file.write_all(bytes)?;
        file.flush()?;

        debug!("Staged {} as {}", filename, file.path().display());
        Ok(StagedUpload {
            file,
            original_name: filename.to_string(),
        })
    }
}

/// A staged upload; deleted on drop.
#[derive(Debug)]
pub struct StagedUpload {
    file: NamedTempFile,
    original_name: String,
}

impl StagedUpload {
    pub fn path(&self) -> &Path {
        self.file.path()
    }

    pub fn original_name(&self) -> &str {
        &self.original_name
    }

    pub fn read(&self) -> std::io::Result<Vec<u8>> {
        std::fs::read(self.file.path())
    }

    /// Delete now, reporting any error instead of ignoring it on drop.
    pub fn discard(self) -> std::io::Result<()> {
        self.file.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entries(dir: &Path) -> usize {
        std::fs::read_dir(dir).map(|d| d.count()).unwrap_or(0)
    }

    #[test]
    fn test_stage_and_drop() {
        let dir = tempfile::tempdir().unwrap();
        let staging = UploadStaging::new(dir.path().join("uploads"));

        let staged = staging.stage("Invoice March.PDF", b"%PDF-1.4").unwrap();
        assert_eq!(staged.read().unwrap(), b"%PDF-1.4");
        assert_eq!(staged.original_name(), "Invoice March.PDF");
        assert!(staged.path().starts_with(staging.dir()));
        assert_eq!(staged.path().extension().unwrap(), "pdf");
        assert_eq!(entries(staging.dir()), 1);

        drop(staged);
        assert_eq!(entries(staging.dir()), 0);
    }

    #[test]
    fn test_same_name_gets_distinct_paths() {
        let dir = tempfile::tempdir().unwrap();
        let staging = UploadStaging::new(dir.path());

        let a = staging.stage("scan.png", b"a").unwrap();
        let b = staging.stage("scan.png", b"b").unwrap();
        assert_ne!(a.path(), b.path());
        assert_eq!(a.read().unwrap(), b"a");

        a.discard().unwrap();
        b.discard().unwrap();
        assert_eq!(entries(dir.path()), 0);
    }

    #[test]
    fn test_unsafe_extension_dropped() {
        let dir = tempfile::tempdir().unwrap();
        let staging = UploadStaging::new(dir.path());

        let staged = staging.stage("../../etc/passwd", b"x").unwrap();
        assert!(staged.path().starts_with(dir.path()));
        assert!(staged.path().extension().is_none());
    }
}
