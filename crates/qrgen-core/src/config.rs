use std::path::PathBuf;
use std::time::Duration;

use qrgen_platform::AppPaths;

use crate::progress::ArtifactKind;
use crate::version::VersionIdentifier;

pub const DEFAULT_CHECK_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(20);
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Everything an update attempt needs, fixed at startup.
#[derive(Debug, Clone)]
pub struct UpdateConfig {
    pub current_version: VersionIdentifier,
    pub version_url: String,
    pub artifact_url: String,
    /// `sha256sum`-style manifest. When set, the artifact must match it.
    pub checksum_url: Option<String>,
    pub check_timeout: Duration,
    pub download_timeout: Duration,
    pub connect_timeout: Duration,
    pub install_root: PathBuf,
    pub staging_dir: PathBuf,
    /// Cross-process lock file. `None` relies on the in-process guard only.
    pub lock_file: Option<PathBuf>,
}

impl UpdateConfig {
    #[must_use]
    pub fn new(
        current_version: VersionIdentifier,
        version_url: impl Into<String>,
        artifact_url: impl Into<String>,
        paths: &AppPaths,
        install_root: PathBuf,
    ) -> Self {
        Self {
            current_version,
            version_url: version_url.into(),
            artifact_url: artifact_url.into(),
            checksum_url: None,
            check_timeout: DEFAULT_CHECK_TIMEOUT,
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
            connect_timeout: DEFAULT_CONNECT_TIMEOUT,
            install_root,
            staging_dir: paths.update_staging_dir(),
            lock_file: Some(paths.update_lock_file()),
        }
    }

    #[must_use]
    pub fn with_checksum_url(mut self, checksum_url: Option<String>) -> Self {
        self.checksum_url = checksum_url;
        self
    }

    #[must_use]
    pub fn with_timeouts(mut self, check: Duration, download: Duration) -> Self {
        self.check_timeout = check;
        self.download_timeout = download;
        self
    }

    #[must_use]
    pub fn artifact_kind(&self) -> ArtifactKind {
        ArtifactKind::from_url(&self.artifact_url)
    }

    /// HTTP client shared by the check and download stages. Per-request
    /// timeouts are applied by each stage.
    ///
    /// # Errors
    /// Returns an error if the TLS backend cannot be initialised.
    pub fn http_client(&self) -> Result<reqwest::Client, reqwest::Error> {
        reqwest::Client::builder()
            .connect_timeout(self.connect_timeout)
            .user_agent(format!("qrgen/{}", self.current_version))
            .build()
    }
}
