//! Drives one update attempt: check, confirm, fetch, install, then ask the
//! host to exit.

use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use log::{info, warn};
use thiserror::Error;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;

use crate::check::{CheckError, UpdateDecision, check_for_update};
use crate::config::UpdateConfig;
use crate::fetch::{FetchError, fetch, fetch_expected_checksum, verify_checksum};
use crate::install::{InstallError, InstallStage, stage_and_install};
use crate::launch::{LaunchError, launch_installer};
use crate::lock::{LockError, UpdateLock};
use crate::progress::{ApplyResult, ArtifactKind, UpdateProgress, artifact_file_name};
use crate::staging::StagingArea;
use crate::version::VersionIdentifier;

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("update check failed: {0}")]
    CheckFailed(#[source] CheckError),
    #[error("update download failed: {0}")]
    FetchFailed(#[source] FetchError),
    #[error("update install failed: {0}")]
    InstallFailed(#[source] InstallError),
    #[error("{0}")]
    LaunchFailed(#[source] LaunchError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateStage {
    Check,
    Fetch,
    Install,
    Launch,
}

impl UpdateError {
    #[must_use]
    pub fn stage(&self) -> UpdateStage {
        match self {
            Self::CheckFailed(_) => UpdateStage::Check,
            Self::FetchFailed(_) => UpdateStage::Fetch,
            Self::InstallFailed(_) => UpdateStage::Install,
            Self::LaunchFailed(_) => UpdateStage::Launch,
        }
    }

    /// Dialog title shown to the user for this kind of failure.
    #[must_use]
    pub fn title(&self) -> &'static str {
        match self {
            Self::CheckFailed(_) => "Update check failed",
            Self::FetchFailed(_) => "Download failed",
            Self::InstallFailed(_) => "Install failed",
            Self::LaunchFailed(_) => "Installer failed to start",
        }
    }

    /// One user-facing message per failure kind.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::CheckFailed(_) => "Cannot contact update server.".to_string(),
            Self::FetchFailed(error) => format!("Download failed: {error}"),
            Self::InstallFailed(error @ InstallError::RollbackIncomplete { unrestored, .. }) => {
                let files: Vec<String> = unrestored
                    .iter()
                    .map(|path| path.display().to_string())
                    .collect();
                format!(
                    "Install failed during {}: {error}. Reinstall manually; these files could not be restored: {}",
                    error.stage(),
                    files.join(", ")
                )
            }
            Self::InstallFailed(error) => format!(
                "Install failed during {}: {error}. Your current installation was left unchanged.",
                error.stage()
            ),
            Self::LaunchFailed(error) => format!("Could not start installer: {error}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum UpdateState {
    #[default]
    Idle,
    Checking,
    AwaitingConfirmation {
        latest: VersionIdentifier,
    },
    Fetching {
        downloaded: u64,
        total: u64,
    },
    Installing,
    RestartRequested(ApplyResult),
    Failed {
        stage: UpdateStage,
        message: String,
    },
}

#[derive(Debug)]
pub enum UpdateOutcome {
    UpToDate,
    Declined,
    Cancelled,
    /// Another attempt is already running in this or another process.
    Busy,
    Applied(ApplyResult),
    Failed(UpdateError),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    UpToDate { current: String },
    Error { title: &'static str, message: String },
    RestartRequired { version: String },
    InstallerLaunched { version: String },
}

/// User-facing side of the workflow. Implementations must not block the
/// async runtime; dialog-based hosts should hop to their UI thread.
#[async_trait]
pub trait UpdatePrompt: Send + Sync {
    /// Ask whether to install `latest`. Nothing is downloaded or written until
    /// this returns `true`.
    async fn confirm_update(&self, current: &VersionIdentifier, latest: &VersionIdentifier)
    -> bool;

    async fn notify(&self, notice: Notice);
}

pub struct UpdateOrchestrator<P> {
    config: UpdateConfig,
    client: reqwest::Client,
    prompt: P,
    in_flight: AtomicBool,
    state: watch::Sender<UpdateState>,
    progress: Option<mpsc::Sender<UpdateProgress>>,
}

struct AttemptGuard<'a>(&'a AtomicBool);

impl<'a> AttemptGuard<'a> {
    fn try_new(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for AttemptGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<P: UpdatePrompt> UpdateOrchestrator<P> {
    pub fn new(config: UpdateConfig, client: reqwest::Client, prompt: P) -> Self {
        let (state, _) = watch::channel(UpdateState::Idle);
        Self {
            config,
            client,
            prompt,
            in_flight: AtomicBool::new(false),
            state,
            progress: None,
        }
    }

    /// Forward download/extract progress to `progress`. Delivery is best
    /// effort; a full channel drops updates rather than stalling the attempt.
    #[must_use]
    pub fn with_progress(mut self, progress: mpsc::Sender<UpdateProgress>) -> Self {
        self.progress = Some(progress);
        self
    }

    #[must_use]
    pub fn config(&self) -> &UpdateConfig {
        &self.config
    }

    #[must_use]
    pub fn state(&self) -> UpdateState {
        self.state.borrow().clone()
    }

    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<UpdateState> {
        self.state.subscribe()
    }

    fn set_state(&self, state: UpdateState) {
        self.state.send_replace(state);
    }

    fn report(&self, progress: UpdateProgress) {
        if let Some(sender) = &self.progress {
            let _ = sender.try_send(progress);
        }
    }

    /// Ask the server for the latest version without starting an attempt.
    pub async fn check(&self) -> UpdateDecision {
        check_for_update(
            &self.client,
            &self.config.current_version,
            &self.config.version_url,
            self.config.check_timeout,
        )
        .await
    }

    /// Run a full update attempt.
    ///
    /// Every failure is logged, shown once through the prompt, and returned as
    /// [`UpdateOutcome::Failed`]; the state then goes back to idle. Only a
    /// successful install leaves the state at `RestartRequested`.
    pub async fn run(&self, cancel: &CancellationToken) -> UpdateOutcome {
        let Some(_guard) = AttemptGuard::try_new(&self.in_flight) else {
            info!("Update attempt rejected: one is already running");
            return UpdateOutcome::Busy;
        };

        let _lock = match self.config.lock_file.as_deref().map(UpdateLock::try_acquire) {
            Some(Ok(lock)) => Some(lock),
            Some(Err(LockError::AlreadyHeld)) => {
                info!("Update attempt rejected: another instance holds the update lock");
                return UpdateOutcome::Busy;
            }
            Some(Err(error)) => {
                warn!("Continuing without cross-process update lock: {error}");
                None
            }
            None => None,
        };

        match self.attempt(cancel).await {
            Ok(outcome) => {
                if !matches!(outcome, UpdateOutcome::Applied(_)) {
                    self.set_state(UpdateState::Idle);
                }
                outcome
            }
            Err(error) => {
                warn!("Update failed at {:?} stage: {error}", error.stage());
                self.set_state(UpdateState::Failed {
                    stage: error.stage(),
                    message: error.user_message(),
                });
                self.prompt
                    .notify(Notice::Error {
                        title: error.title(),
                        message: error.user_message(),
                    })
                    .await;
                self.set_state(UpdateState::Idle);
                UpdateOutcome::Failed(error)
            }
        }
    }

    async fn attempt(&self, cancel: &CancellationToken) -> Result<UpdateOutcome, UpdateError> {
        let current = &self.config.current_version;

        self.set_state(UpdateState::Checking);
        let latest = match self.check().await {
            UpdateDecision::UpToDate => {
                self.prompt
                    .notify(Notice::UpToDate {
                        current: current.to_string(),
                    })
                    .await;
                return Ok(UpdateOutcome::UpToDate);
            }
            UpdateDecision::CheckFailed(error) => return Err(UpdateError::CheckFailed(error)),
            UpdateDecision::UpdateAvailable(latest) => latest,
        };
        if cancel.is_cancelled() {
            return Ok(UpdateOutcome::Cancelled);
        }

        self.set_state(UpdateState::AwaitingConfirmation {
            latest: latest.clone(),
        });
        if !self.prompt.confirm_update(current, &latest).await {
            info!("Update to {latest} declined");
            return Ok(UpdateOutcome::Declined);
        }
        if cancel.is_cancelled() {
            return Ok(UpdateOutcome::Cancelled);
        }

        self.set_state(UpdateState::Fetching {
            downloaded: 0,
            total: 0,
        });
        let staging = StagingArea::create(&self.config.staging_dir).map_err(|source| {
            UpdateError::FetchFailed(FetchError::Io {
                context: "failed to prepare staging area",
                source,
            })
        })?;
        let file_name = artifact_file_name(&self.config.artifact_url);
        let artifact = staging.artifact_path(file_name);
        self.download(&artifact).await?;
        self.verify(file_name, &artifact).await?;
        if cancel.is_cancelled() {
            return Ok(UpdateOutcome::Cancelled);
        }

        // Past this point the attempt runs to completion or rollback.
        self.set_state(UpdateState::Installing);
        let result = match self.config.artifact_kind() {
            ArtifactKind::Archive => {
                let install_root = self.config.install_root.clone();
                let progress = self.progress.clone();
                let report = tokio::task::spawn_blocking(move || {
                    stage_and_install(&artifact, staging.path(), &install_root, progress.as_ref())
                })
                .await
                .map_err(|error| {
                    UpdateError::InstallFailed(InstallError::Io {
                        stage: InstallStage::Prepare,
                        context: "install task failed",
                        path: self.config.install_root.clone(),
                        source: std::io::Error::other(error.to_string()),
                    })
                })?
                .map_err(UpdateError::InstallFailed)?;
                info!(
                    "Installed {} file(s) into {}",
                    report.files_installed,
                    self.config.install_root.display()
                );
                self.prompt
                    .notify(Notice::RestartRequired {
                        version: latest.to_string(),
                    })
                    .await;
                ApplyResult::RestartRequired
            }
            ArtifactKind::Executable => {
                self.report(UpdateProgress::Applying);
                let result = launch_installer(&artifact).map_err(UpdateError::LaunchFailed)?;
                let kept = staging.keep();
                info!("Installer staged in {} left for the installer", kept.display());
                self.prompt
                    .notify(Notice::InstallerLaunched {
                        version: latest.to_string(),
                    })
                    .await;
                result
            }
        };

        self.set_state(UpdateState::RestartRequested(result));
        Ok(UpdateOutcome::Applied(result))
    }

    async fn download(&self, artifact: &std::path::Path) -> Result<u64, UpdateError> {
        let (tx, mut rx) = mpsc::channel(64);
        let download = async move {
            let result = fetch(
                &self.client,
                &self.config.artifact_url,
                artifact,
                self.config.download_timeout,
                Some(&tx),
            )
            .await;
            drop(tx);
            result
        };
        let track = async {
            while let Some(progress) = rx.recv().await {
                if let UpdateProgress::Downloading { downloaded, total } = progress {
                    self.set_state(UpdateState::Fetching { downloaded, total });
                }
                self.report(progress);
            }
        };

        let (result, ()) = tokio::join!(download, track);
        result.map_err(UpdateError::FetchFailed)
    }

    async fn verify(&self, file_name: &str, artifact: &std::path::Path) -> Result<(), UpdateError> {
        let Some(checksum_url) = &self.config.checksum_url else {
            warn!("No checksum source configured; installing {file_name} unverified");
            return Ok(());
        };

        self.report(UpdateProgress::Verifying);
        let expected = fetch_expected_checksum(
            &self.client,
            checksum_url,
            file_name,
            self.config.check_timeout,
        )
        .await
        .map_err(UpdateError::FetchFailed)?;

        let path = artifact.to_path_buf();
        let name = file_name.to_string();
        let verified = tokio::task::spawn_blocking(move || verify_checksum(&path, &name, &expected))
            .await
            .map_err(|error| {
                UpdateError::FetchFailed(FetchError::Io {
                    context: "checksum task failed",
                    source: std::io::Error::other(error.to_string()),
                })
            })?;

        if let Err(error) = verified {
            let _ = tokio::fs::remove_file(artifact).await;
            return Err(UpdateError::FetchFailed(error));
        }
        Ok(())
    }
}
