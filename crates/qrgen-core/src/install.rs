//! Archive installation: clean extract into the staging area, then mirror the
//! extracted tree onto the installation root.
//!
//! Mirroring runs in two phases so that a failure never leaves a mixed-version
//! tree behind:
//!
//! 1. *prepare*: every file is copied to a hidden temporary sibling of its
//!    destination (same directory, so the same filesystem). A failure here
//!    deletes the temporaries and any directories created for them.
//! 2. *commit*: each destination is renamed aside to a backup and the
//!    temporary is renamed into place. A failed rename rolls back every file
//!    committed so far.
//!
//! Destination files that the payload does not mention are never touched.

use std::fmt;
use std::path::{Path, PathBuf};

use log::{debug, info, warn};
use tempfile::TempPath;
use thiserror::Error;
use tokio::sync::mpsc;
use walkdir::WalkDir;

use crate::progress::UpdateProgress;

const NEW_SUFFIX: &str = ".qrgen-new";
const BACKUP_SUFFIX: &str = ".qrgen-old";
const EXTRACT_DIR_NAME: &str = "extracted";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStage {
    Extract,
    Prepare,
    Commit,
}

impl fmt::Display for InstallStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Extract => "extract",
            Self::Prepare => "prepare",
            Self::Commit => "commit",
        })
    }
}

#[derive(Debug, Error)]
pub enum InstallError {
    #[error("{stage}: {context} ({}): {source}", .path.display())]
    Io {
        stage: InstallStage,
        context: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("extract: {context}: {source}")]
    Zip {
        context: &'static str,
        #[source]
        source: zip::result::ZipError,
    },
    #[error("{stage}: {} is a directory and cannot be replaced by a file", .path.display())]
    DirectoryInTheWay { stage: InstallStage, path: PathBuf },
    #[error("{source}; rollback could not restore {} file(s)", .unrestored.len())]
    RollbackIncomplete {
        #[source]
        source: Box<InstallError>,
        unrestored: Vec<PathBuf>,
    },
}

impl InstallError {
    fn io(
        stage: InstallStage,
        context: &'static str,
        path: &Path,
        source: std::io::Error,
    ) -> Self {
        Self::Io {
            stage,
            context,
            path: path.to_path_buf(),
            source,
        }
    }

    fn zip(context: &'static str, source: zip::result::ZipError) -> Self {
        Self::Zip { context, source }
    }

    #[must_use]
    pub fn stage(&self) -> InstallStage {
        match self {
            Self::Io { stage, .. } | Self::DirectoryInTheWay { stage, .. } => *stage,
            Self::Zip { .. } => InstallStage::Extract,
            Self::RollbackIncomplete { source, .. } => source.stage(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InstallReport {
    pub files_installed: usize,
    pub backups_left: usize,
}

/// Extract `archive_path` into `staging_dir` and mirror the result onto
/// `install_root`. Blocking.
///
/// # Errors
/// Returns an error naming the stage and path that failed. On error the
/// installation root holds exactly the files it held before the call.
pub fn stage_and_install(
    archive_path: &Path,
    staging_dir: &Path,
    install_root: &Path,
    progress: Option<&mpsc::Sender<UpdateProgress>>,
) -> Result<InstallReport, InstallError> {
    let extract_dir = staging_dir.join(EXTRACT_DIR_NAME);
    if let Some(progress) = progress {
        let _ = progress.try_send(UpdateProgress::Extracting);
    }
    extract_zip(archive_path, &extract_dir)?;
    if let Some(progress) = progress {
        let _ = progress.try_send(UpdateProgress::Applying);
    }
    mirror_tree(&extract_dir, install_root)
}

/// Extract a zip archive into `dest`, clearing any previous contents first.
///
/// # Errors
/// Returns an error if the archive cannot be read or a file cannot be written.
pub fn extract_zip(zip_path: &Path, dest: &Path) -> Result<(), InstallError> {
    const STAGE: InstallStage = InstallStage::Extract;

    if dest.exists() {
        std::fs::remove_dir_all(dest).map_err(|error| {
            InstallError::io(STAGE, "failed to clear extraction directory", dest, error)
        })?;
    }
    std::fs::create_dir_all(dest).map_err(|error| {
        InstallError::io(STAGE, "failed to create extraction directory", dest, error)
    })?;

    let file = std::fs::File::open(zip_path)
        .map_err(|error| InstallError::io(STAGE, "failed to open zip file", zip_path, error))?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|error| InstallError::zip("failed to read zip archive", error))?;

    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|error| InstallError::zip("failed to read zip entry", error))?;
        let Some(name) = entry.enclosed_name() else {
            warn!("Skipping zip entry with unsafe path: {}", entry.name());
            continue;
        };
        let out_path = dest.join(name);

        if entry.is_dir() {
            std::fs::create_dir_all(&out_path).map_err(|error| {
                InstallError::io(STAGE, "failed to create extraction directory", &out_path, error)
            })?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            std::fs::create_dir_all(parent).map_err(|error| {
                InstallError::io(
                    STAGE,
                    "failed to create extraction parent directory",
                    parent,
                    error,
                )
            })?;
        }
        let mut outfile = std::fs::File::create(&out_path).map_err(|error| {
            InstallError::io(STAGE, "failed to create extracted file", &out_path, error)
        })?;
        std::io::copy(&mut entry, &mut outfile).map_err(|error| {
            InstallError::io(STAGE, "failed to extract archive entry", &out_path, error)
        })?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            if let Some(mode) = entry.unix_mode() {
                let _ = std::fs::set_permissions(&out_path, std::fs::Permissions::from_mode(mode));
            }
        }
    }

    debug!("Extraction complete to {}", dest.display());
    Ok(())
}

/// Mirror every file under `source` onto the same relative path under
/// `install_root`. Blocking.
///
/// # Errors
/// Returns an error if a file cannot be staged or committed. See the module
/// docs for the rollback guarantees.
pub fn mirror_tree(source: &Path, install_root: &Path) -> Result<InstallReport, InstallError> {
    if !install_root.is_dir() {
        return Err(InstallError::io(
            InstallStage::Prepare,
            "installation root is not a directory",
            install_root,
            std::io::Error::from(std::io::ErrorKind::NotFound),
        ));
    }

    let files = collect_files(source)?;
    info!(
        "Mirroring {} file(s) from {} into {}",
        files.len(),
        source.display(),
        install_root.display()
    );

    let mut created_dirs = Vec::new();
    let prepared = match prepare_all(source, install_root, &files, &mut created_dirs) {
        Ok(prepared) => prepared,
        Err(error) => {
            remove_created_dirs(&created_dirs);
            return Err(error);
        }
    };

    let committed = match commit_all(prepared) {
        Ok(committed) => committed,
        Err(error) => {
            remove_created_dirs(&created_dirs);
            return Err(error);
        }
    };

    let files_installed = committed.len();
    let backups_left = committed
        .into_iter()
        .filter_map(|file| file.backup)
        .filter(|backup| match std::fs::remove_file(backup) {
            Ok(()) => false,
            Err(error) => {
                warn!(
                    "Leaving backup {} for cleanup on next launch: {error}",
                    backup.display()
                );
                true
            }
        })
        .count();

    info!("Installed {files_installed} file(s)");
    Ok(InstallReport {
        files_installed,
        backups_left,
    })
}

fn collect_files(source: &Path) -> Result<Vec<PathBuf>, InstallError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(source).sort_by_file_name() {
        let entry = entry.map_err(|error| {
            let path = error.path().unwrap_or(source).to_path_buf();
            InstallError::io(
                InstallStage::Prepare,
                "failed to walk extracted tree",
                &path,
                error.into(),
            )
        })?;
        if entry.file_type().is_file() {
            if let Ok(relative) = entry.path().strip_prefix(source) {
                files.push(relative.to_path_buf());
            }
        } else if !entry.file_type().is_dir() {
            warn!("Skipping non-regular file {}", entry.path().display());
        }
    }
    Ok(files)
}

#[derive(Debug)]
struct PreparedFile {
    temp: TempPath,
    target: PathBuf,
}

#[derive(Debug)]
struct CommittedFile {
    target: PathBuf,
    backup: Option<PathBuf>,
}

fn prepare_all(
    source: &Path,
    install_root: &Path,
    files: &[PathBuf],
    created_dirs: &mut Vec<PathBuf>,
) -> Result<Vec<PreparedFile>, InstallError> {
    // Temporaries still in this vector are deleted on drop if we bail out.
    let mut prepared = Vec::with_capacity(files.len());
    for relative in files {
        let target = install_root.join(relative);
        let parent = target.parent().unwrap_or(install_root);
        ensure_dir(install_root, parent, created_dirs)?;
        prepared.push(prepare_file(&source.join(relative), &target)?);
    }
    Ok(prepared)
}

fn ensure_dir(
    install_root: &Path,
    dir: &Path,
    created_dirs: &mut Vec<PathBuf>,
) -> Result<(), InstallError> {
    let mut missing = Vec::new();
    let mut current = dir;
    while !current.is_dir() && current != install_root {
        missing.push(current.to_path_buf());
        match current.parent() {
            Some(parent) => current = parent,
            None => break,
        }
    }

    for path in missing.into_iter().rev() {
        std::fs::create_dir(&path).map_err(|error| {
            InstallError::io(InstallStage::Prepare, "failed to create directory", &path, error)
        })?;
        created_dirs.push(path);
    }
    Ok(())
}

fn prepare_file(source: &Path, target: &Path) -> Result<PreparedFile, InstallError> {
    const STAGE: InstallStage = InstallStage::Prepare;

    if target.is_dir() {
        return Err(InstallError::DirectoryInTheWay {
            stage: STAGE,
            path: target.to_path_buf(),
        });
    }

    let parent = target.parent().ok_or_else(|| {
        InstallError::io(
            STAGE,
            "destination has no parent directory",
            target,
            std::io::Error::from(std::io::ErrorKind::InvalidInput),
        )
    })?;
    let prefix = format!(".{}.", file_name_lossy(target));
    let temp = tempfile::Builder::new()
        .prefix(&prefix)
        .suffix(NEW_SUFFIX)
        .tempfile_in(parent)
        .map_err(|error| InstallError::io(STAGE, "failed to create staged file", target, error))?
        .into_temp_path();

    std::fs::copy(source, &temp)
        .map_err(|error| InstallError::io(STAGE, "failed to stage file", target, error))?;

    Ok(PreparedFile {
        temp,
        target: target.to_path_buf(),
    })
}

/// Moves a backup back over its target.
type RestoreFn = fn(&Path, &Path) -> std::io::Result<()>;

fn restore_backup(backup: &Path, target: &Path) -> std::io::Result<()> {
    std::fs::rename(backup, target)
}

/// A failed commit, plus the target it left missing when the backup could
/// not be moved back.
#[derive(Debug)]
struct CommitFailure {
    error: InstallError,
    unrestored: Option<PathBuf>,
}

fn commit_all(prepared: Vec<PreparedFile>) -> Result<Vec<CommittedFile>, InstallError> {
    commit_all_with(prepared, restore_backup)
}

fn commit_all_with(
    prepared: Vec<PreparedFile>,
    restore: RestoreFn,
) -> Result<Vec<CommittedFile>, InstallError> {
    let mut committed: Vec<CommittedFile> = Vec::with_capacity(prepared.len());

    for PreparedFile { temp, target } in prepared {
        match commit_file(temp, &target, restore) {
            Ok(backup) => committed.push(CommittedFile { target, backup }),
            Err(CommitFailure { error, unrestored: failed }) => {
                warn!("Commit failed, rolling back {} file(s): {error}", committed.len());
                let mut unrestored: Vec<PathBuf> = failed.into_iter().collect();
                unrestored.extend(rollback(committed, restore));
                if unrestored.is_empty() {
                    return Err(error);
                }
                return Err(InstallError::RollbackIncomplete {
                    source: Box::new(error),
                    unrestored,
                });
            }
        }
    }

    Ok(committed)
}

fn commit_file(
    temp: TempPath,
    target: &Path,
    restore: RestoreFn,
) -> Result<Option<PathBuf>, CommitFailure> {
    const STAGE: InstallStage = InstallStage::Commit;

    let backup = if std::fs::symlink_metadata(target).is_ok() {
        let backup = backup_path(target);
        std::fs::rename(target, &backup).map_err(|error| CommitFailure {
            error: InstallError::io(STAGE, "failed to move existing file aside", target, error),
            unrestored: None,
        })?;
        Some(backup)
    } else {
        None
    };

    if let Err(error) = temp.persist(target) {
        let mut unrestored = None;
        if let Some(backup) = &backup
            && let Err(restore_error) = restore(backup, target)
        {
            warn!(
                "Failed to restore {} from {}: {restore_error}",
                target.display(),
                backup.display()
            );
            unrestored = Some(target.to_path_buf());
        }
        return Err(CommitFailure {
            error: InstallError::io(
                STAGE,
                "failed to move staged file into place",
                target,
                error.error,
            ),
            unrestored,
        });
    }

    Ok(backup)
}

fn rollback(committed: Vec<CommittedFile>, restore: RestoreFn) -> Vec<PathBuf> {
    let mut unrestored = Vec::new();
    for CommittedFile { target, backup } in committed.into_iter().rev() {
        let removed = match std::fs::remove_file(&target) {
            Ok(()) => true,
            Err(error) => error.kind() == std::io::ErrorKind::NotFound,
        };
        let restored = removed
            && backup
                .as_ref()
                .is_none_or(|backup| restore(backup, &target).is_ok());
        if !restored {
            warn!("Could not roll back {}", target.display());
            unrestored.push(target);
        }
    }
    unrestored
}

fn remove_created_dirs(created_dirs: &[PathBuf]) {
    for dir in created_dirs.iter().rev() {
        if let Err(error) = std::fs::remove_dir(dir) {
            debug!("Leaving directory {}: {error}", dir.display());
        }
    }
}

fn backup_path(target: &Path) -> PathBuf {
    let name = file_name_lossy(target);
    let mut candidate = target.with_file_name(format!(".{name}{BACKUP_SUFFIX}"));
    let mut attempt = 1_u32;
    while std::fs::symlink_metadata(&candidate).is_ok() && std::fs::remove_file(&candidate).is_err()
    {
        candidate = target.with_file_name(format!(".{name}.{attempt}{BACKUP_SUFFIX}"));
        attempt += 1;
    }
    candidate
}

fn file_name_lossy(path: &Path) -> String {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default()
}

/// Remove backups and staged temporaries left in `install_root` by an
/// earlier update (for example a replaced executable that was still running).
/// A backup whose original file is missing is moved back instead.
pub fn cleanup_stale_backups(install_root: &Path) {
    for entry in WalkDir::new(install_root).into_iter().flatten() {
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry.file_name().to_string_lossy();
        let ours =
            name.starts_with('.') && (name.ends_with(BACKUP_SUFFIX) || name.ends_with(NEW_SUFFIX));
        if !ours {
            continue;
        }
        if let Some(original) = backup_original(entry.path())
            && std::fs::symlink_metadata(&original).is_err()
        {
            match std::fs::rename(entry.path(), &original) {
                Ok(()) => info!("Restored {} from stale backup", original.display()),
                Err(error) => warn!("Could not restore {}: {error}", original.display()),
            }
            continue;
        }
        match std::fs::remove_file(entry.path()) {
            Ok(()) => debug!("Removed stale update file {}", entry.path().display()),
            Err(error) => debug!("Could not remove {}: {error}", entry.path().display()),
        }
    }
}

/// `dir/.name.qrgen-old` belongs to `dir/name`.
fn backup_original(backup: &Path) -> Option<PathBuf> {
    let name = backup.file_name()?.to_str()?;
    let original = name.strip_prefix('.')?.strip_suffix(BACKUP_SUFFIX)?;
    (!original.is_empty()).then(|| backup.with_file_name(original))
}
