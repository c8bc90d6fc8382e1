use std::sync::{Arc, Mutex, PoisonError};

use log::{info, warn};
use qrgen_core::{
    UpdateConfig, UpdateDecision, UpdateOrchestrator, UpdateOutcome, VersionIdentifier,
};
use qrgen_platform::AppPaths;
use tokio_util::sync::CancellationToken;

use crate::error::AppError;
use crate::progress::spawn_progress_bar;
use crate::prompt::TerminalPrompt;
use crate::settings::AppSettings;

pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");
pub const DEFAULT_UPDATE_URL: &str =
    "https://raw.githubusercontent.com/Minea0/QRGenerator/main/latest_version.txt";
pub const DEFAULT_ARTIFACT_URL: &str =
    "https://github.com/Minea0/QRGenerator/releases/latest/download/QRGeneratorSetup.exe";

/// Endpoint overrides from the command line or environment. They win over
/// the settings file, which wins over the built-in defaults.
#[derive(Debug, Clone, Default)]
pub struct UpdateSources {
    pub update_url: Option<String>,
    pub artifact_url: Option<String>,
}

pub fn build_config(
    paths: &AppPaths,
    settings: &AppSettings,
    sources: &UpdateSources,
) -> Result<UpdateConfig, AppError> {
    let current = VersionIdentifier::parse(APP_VERSION)
        .map_err(|error| AppError::update_setup_failed("read current version", error))?;
    let install_root = qrgen_platform::install_root()
        .map_err(|error| AppError::update_setup_failed("locate install root", error))?;

    let version_url = sources
        .update_url
        .clone()
        .or_else(|| settings.update_url.clone())
        .unwrap_or_else(|| DEFAULT_UPDATE_URL.to_string());
    let artifact_url = sources
        .artifact_url
        .clone()
        .or_else(|| settings.artifact_url.clone())
        .unwrap_or_else(|| DEFAULT_ARTIFACT_URL.to_string());

    Ok(
        UpdateConfig::new(current, version_url, artifact_url, paths, install_root)
            .with_checksum_url(settings.checksum_url.clone())
            .with_timeouts(settings.check_timeout(), settings.download_timeout()),
    )
}

fn orchestrator(
    config: UpdateConfig,
    assume_yes: bool,
) -> Result<UpdateOrchestrator<TerminalPrompt>, AppError> {
    let client = config
        .http_client()
        .map_err(|error| AppError::update_setup_failed("create HTTP client", error))?;
    Ok(UpdateOrchestrator::new(
        config,
        client,
        TerminalPrompt::new(assume_yes),
    ))
}

/// Check only; nothing is downloaded.
pub async fn check_only(config: UpdateConfig) -> Result<UpdateDecision, AppError> {
    let orchestrator = orchestrator(config, false)?;
    Ok(orchestrator.check().await)
}

/// Process-wide Ctrl-C routing. The signal handler is registered once:
/// while an update runs Ctrl-C cancels it at the next stage boundary,
/// otherwise the process exits the way an unhandled interrupt would.
#[derive(Debug, Clone, Default)]
pub struct Interrupts {
    active: Arc<Mutex<Option<CancellationToken>>>,
}

impl Interrupts {
    pub fn install() -> Self {
        let interrupts = Self::default();
        let router = interrupts.clone();
        tokio::spawn(async move {
            while tokio::signal::ctrl_c().await.is_ok() {
                if !router.cancel_active() {
                    std::process::exit(130);
                }
            }
        });
        interrupts
    }

    fn begin(&self) -> CancellationToken {
        let token = CancellationToken::new();
        *self.active.lock().unwrap_or_else(PoisonError::into_inner) = Some(token.clone());
        token
    }

    fn finish(&self) {
        self.active
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    fn cancel_active(&self) -> bool {
        let active = self.active.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(token) = active.as_ref() else {
            return false;
        };
        info!("Interrupt received, cancelling update at next stage boundary");
        token.cancel();
        true
    }
}

/// Run one full update attempt with a progress bar. Ctrl-C cancels at the
/// next stage boundary; an install already under way is finished or rolled
/// back first.
pub async fn run_update(
    config: UpdateConfig,
    assume_yes: bool,
    interrupts: &Interrupts,
) -> Result<UpdateOutcome, AppError> {
    let (progress_tx, progress_rx) = tokio::sync::mpsc::channel(64);
    let orchestrator = orchestrator(config, assume_yes)?.with_progress(progress_tx);
    let bar = spawn_progress_bar(progress_rx);

    let cancel = interrupts.begin();
    let outcome = orchestrator.run(&cancel).await;
    interrupts.finish();
    drop(orchestrator);
    if let Err(error) = bar.await {
        warn!("Progress display task failed: {error}");
    }

    if matches!(outcome, UpdateOutcome::Cancelled) {
        println!("Update cancelled.");
    } else if matches!(outcome, UpdateOutcome::Busy) {
        println!("Another update is already in progress.");
    }
    Ok(outcome)
}
