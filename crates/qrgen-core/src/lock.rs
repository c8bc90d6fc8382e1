use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::Path;

use fs2::FileExt;
use log::{debug, warn};
use thiserror::Error;

use crate::install::cleanup_stale_backups;
use crate::staging::cleanup_stale_staging;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("another update is already in progress")]
    AlreadyHeld,
    #[error("{context}: {source}")]
    Io {
        context: &'static str,
        #[source]
        source: std::io::Error,
    },
}

impl LockError {
    fn io(context: &'static str, source: std::io::Error) -> Self {
        Self::Io { context, source }
    }
}

/// Advisory lock that keeps two running instances from installing into the
/// same directory at once. Released when dropped.
#[derive(Debug)]
pub struct UpdateLock {
    _file: File,
}

impl UpdateLock {
    /// Try to take the lock without waiting.
    ///
    /// # Errors
    /// Returns [`LockError::AlreadyHeld`] when another holder exists, or an I/O
    /// error when the lock file cannot be opened or written.
    pub fn try_acquire(path: &Path) -> Result<Self, LockError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|error| LockError::io("failed to create lock directory", error))?;
        }

        let mut lock_file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|error| LockError::io("failed to open update lock file", error))?;

        match lock_file.try_lock_exclusive() {
            Ok(()) => {}
            Err(error) if error.kind() == fs2::lock_contended_error().kind() => {
                return Err(LockError::AlreadyHeld);
            }
            Err(error) => {
                return Err(LockError::io("failed to acquire update lock", error));
            }
        }

        lock_file
            .set_len(0)
            .and_then(|()| lock_file.seek(SeekFrom::Start(0)).map(|_| ()))
            .and_then(|()| writeln!(lock_file, "{}", std::process::id()))
            .map_err(|error| LockError::io("failed to write update lock metadata", error))?;

        Ok(Self { _file: lock_file })
    }
}

/// Remove staging areas and mirror backups left by an interrupted attempt.
///
/// The sweep only runs while holding the update lock, so a second instance
/// never deletes files that a running attempt still needs.
pub fn sweep_stale_update_files(
    lock_file: &Path,
    staging_dir: &Path,
    install_root: Option<&Path>,
) {
    let _lock = match UpdateLock::try_acquire(lock_file) {
        Ok(lock) => lock,
        Err(LockError::AlreadyHeld) => {
            debug!("Update in progress elsewhere, leaving update leftovers alone");
            return;
        }
        Err(error) => {
            warn!("Skipping cleanup of update leftovers: {error}");
            return;
        }
    };

    cleanup_stale_staging(staging_dir);
    if let Some(root) = install_root {
        cleanup_stale_backups(root);
    }
}

#[cfg(test)]
mod tests {
    use super::{LockError, UpdateLock, sweep_stale_update_files};

    #[test]
    fn second_acquire_is_rejected_until_first_is_dropped() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let path = temp.path().join("data").join("update.lock");

        let first = UpdateLock::try_acquire(&path).expect("first acquire should succeed");
        assert!(matches!(
            UpdateLock::try_acquire(&path),
            Err(LockError::AlreadyHeld)
        ));

        drop(first);
        UpdateLock::try_acquire(&path).expect("lock should be free after drop");
    }

    #[test]
    fn lock_file_records_process_id() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let path = temp.path().join("update.lock");

        let _lock = UpdateLock::try_acquire(&path).expect("acquire should succeed");

        let contents = std::fs::read_to_string(&path).expect("lock file should be readable");
        assert_eq!(contents.trim(), std::process::id().to_string());
    }

    fn leftovers(root: &std::path::Path) -> (std::path::PathBuf, std::path::PathBuf) {
        let staged = root.join("updates").join(".tmpAb12Cd");
        std::fs::create_dir_all(&staged).expect("staging dir should be created");
        std::fs::write(staged.join("app.zip"), b"partial").expect("artifact written");
        let install = root.join("install");
        std::fs::create_dir_all(&install).expect("install dir should be created");
        std::fs::write(install.join("app.bin"), b"current app").expect("app written");
        let backup = install.join(".app.bin.qrgen-old");
        std::fs::write(&backup, b"previous app").expect("backup written");
        (staged, backup)
    }

    #[test]
    fn sweep_leaves_files_alone_while_update_is_running() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let root = temp.path();
        let lock_path = root.join("update.lock");
        let (staged, backup) = leftovers(root);

        let _running = UpdateLock::try_acquire(&lock_path).expect("acquire should succeed");
        sweep_stale_update_files(&lock_path, &root.join("updates"), Some(&root.join("install")));

        assert!(staged.join("app.zip").exists());
        assert!(backup.exists());
    }

    #[test]
    fn sweep_removes_leftovers_and_releases_lock() {
        let temp = tempfile::tempdir().expect("tempdir should be created");
        let root = temp.path();
        let lock_path = root.join("update.lock");
        let (staged, backup) = leftovers(root);

        sweep_stale_update_files(&lock_path, &root.join("updates"), Some(&root.join("install")));

        assert!(!staged.exists());
        assert!(!backup.exists());
        UpdateLock::try_acquire(&lock_path).expect("lock should be free after sweep");
    }
}
