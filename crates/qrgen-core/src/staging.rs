use std::path::{Path, PathBuf};

use log::{debug, warn};
use tempfile::TempDir;

const STAGING_PREFIX: &str = ".tmp";

/// Scratch directory owned by a single update attempt.
///
/// Stale areas left behind by a crashed attempt are purged before a new one
/// is created, so a leftover download is never mistaken for a current one.
#[derive(Debug)]
pub struct StagingArea {
    dir: TempDir,
}

impl StagingArea {
    /// Create a fresh staging area under `base`.
    ///
    /// # Errors
    /// Returns an error when `base` or the new directory cannot be created.
    pub fn create(base: &Path) -> std::io::Result<Self> {
        std::fs::create_dir_all(base)?;
        cleanup_stale_staging(base);
        let dir = tempfile::Builder::new()
            .prefix(STAGING_PREFIX)
            .tempdir_in(base)?;
        debug!("Created update staging area {}", dir.path().display());
        Ok(Self { dir })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    #[must_use]
    pub fn artifact_path(&self, file_name: &str) -> PathBuf {
        self.dir.path().join(file_name)
    }

    /// Keep the directory on disk after this value is dropped. Used when an
    /// external installer still needs the downloaded file.
    #[must_use]
    pub fn keep(self) -> PathBuf {
        self.dir.keep()
    }
}

/// Remove staging areas left over from earlier attempts.
pub fn cleanup_stale_staging(base: &Path) {
    let Ok(entries) = std::fs::read_dir(base) else {
        return;
    };
    for entry in entries.flatten() {
        let path = entry.path();
        if path.is_dir() && entry.file_name().to_string_lossy().starts_with(STAGING_PREFIX) {
            debug!("Cleaning up stale update staging area: {}", path.display());
            if let Err(error) = std::fs::remove_dir_all(&path) {
                warn!("Failed to remove {}: {error}", path.display());
            }
        }
    }
}
