use std::path::{Path, PathBuf};

use log::info;
use thiserror::Error;

use crate::progress::ApplyResult;

#[derive(Debug, Error)]
#[error("failed to launch installer {}: {source}", .path.display())]
pub struct LaunchError {
    pub path: PathBuf,
    #[source]
    pub source: std::io::Error,
}

/// Start a downloaded installer as a separate process.
///
/// The installer is spawned directly, without a shell and without asking for
/// elevation; it inherits this process's privileges and nothing more. The
/// caller is expected to exit afterwards so the installer can replace files.
///
/// # Errors
/// Returns an error when the file cannot be made executable or the process
/// cannot be spawned.
pub fn launch_installer(path: &Path) -> Result<ApplyResult, LaunchError> {
    let launch_error = |source| LaunchError {
        path: path.to_path_buf(),
        source,
    };

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755))
            .map_err(launch_error)?;
    }

    info!("Launching installer: {}", path.display());
    std::process::Command::new(path)
        .spawn()
        .map_err(launch_error)?;

    Ok(ApplyResult::ExitForInstaller)
}
