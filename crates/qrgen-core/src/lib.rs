//! Self-update engine for qrgen.
//!
//! This crate holds everything that is independent of the user interface:
//! - Version marker parsing and comparison.
//! - Remote version checks and artifact downloads with checksum verification.
//! - Staging areas, archive extraction and rollback-safe mirroring onto the
//!   installation root.
//! - The orchestrator that sequences an update attempt behind a confirmation
//!   prompt.

mod check;
mod config;
mod fetch;
mod install;
mod launch;
mod lock;
mod orchestrator;
mod progress;
mod staging;
mod version;

/// Version-check client and per-check decision.
pub use check::{CheckError, UpdateDecision, check_for_update, fetch_latest_version};
/// Immutable update settings and timeout defaults.
pub use config::{
    DEFAULT_CHECK_TIMEOUT, DEFAULT_CONNECT_TIMEOUT, DEFAULT_DOWNLOAD_TIMEOUT, UpdateConfig,
};
/// Artifact download and integrity checks.
pub use fetch::{FetchError, fetch, fetch_expected_checksum, verify_checksum};
/// Archive extraction and installation-root mirroring.
pub use install::{
    InstallError, InstallReport, InstallStage, cleanup_stale_backups, extract_zip, mirror_tree,
    stage_and_install,
};
pub use launch::{LaunchError, launch_installer};
pub use lock::{LockError, UpdateLock, sweep_stale_update_files};
/// Update workflow driver and its prompt seam.
pub use orchestrator::{
    Notice, UpdateError, UpdateOrchestrator, UpdateOutcome, UpdatePrompt, UpdateStage,
    UpdateState,
};
pub use progress::{ApplyResult, ArtifactKind, UpdateProgress, artifact_file_name};
pub use staging::{StagingArea, cleanup_stale_staging};
pub use version::{Comparison, ParseVersionError, VersionIdentifier, compare};
