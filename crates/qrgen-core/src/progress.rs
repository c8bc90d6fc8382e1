use std::path::Path;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateProgress {
    Downloading { downloaded: u64, total: u64 },
    Verifying,
    Extracting,
    Applying,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyResult {
    /// New files are in place; they take effect on the next launch.
    RestartRequired,
    /// An external installer was started and expects this process to exit.
    ExitForInstaller,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArtifactKind {
    Archive,
    Executable,
}

impl ArtifactKind {
    /// Infer the payload type from the artifact URL. Response headers are not
    /// consulted.
    #[must_use]
    pub fn from_url(url: &str) -> Self {
        let file_name = artifact_file_name(url);
        let is_zip = Path::new(file_name)
            .extension()
            .is_some_and(|ext| ext.eq_ignore_ascii_case("zip"));
        if is_zip { Self::Archive } else { Self::Executable }
    }
}

/// Local file name for a downloaded artifact, taken from the last URL path
/// segment and falling back to a fixed name when that segment is unusable.
#[must_use]
pub fn artifact_file_name(url: &str) -> &str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let raw_name = path.rsplit('/').next().unwrap_or("update-download");
    Path::new(raw_name)
        .file_name()
        .and_then(|n| n.to_str())
        .filter(|n| !n.is_empty() && !n.contains(".."))
        .unwrap_or("update-download")
}
