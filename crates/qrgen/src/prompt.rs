use async_trait::async_trait;
use dialoguer::Confirm;
use log::warn;
use qrgen_core::{Notice, UpdatePrompt, VersionIdentifier};

/// Asks on the terminal. `assume_yes` skips the question for unattended
/// `update --yes` runs.
#[derive(Debug, Clone, Copy, Default)]
pub struct TerminalPrompt {
    assume_yes: bool,
}

impl TerminalPrompt {
    pub fn new(assume_yes: bool) -> Self {
        Self { assume_yes }
    }
}

pub fn notice_text(notice: &Notice) -> String {
    match notice {
        Notice::UpToDate { current } => {
            format!("You already have the latest version (v{current}).")
        }
        Notice::Error { title, message } => format!("{title}: {message}"),
        Notice::RestartRequired { version } => {
            format!("Version {version} has been installed. Restart qrgen to use it.")
        }
        Notice::InstallerLaunched { version } => {
            format!("The installer for version {version} has been started. qrgen will now exit.")
        }
    }
}

#[async_trait]
impl UpdatePrompt for TerminalPrompt {
    async fn confirm_update(
        &self,
        current: &VersionIdentifier,
        latest: &VersionIdentifier,
    ) -> bool {
        if self.assume_yes {
            println!("Updating from {current} to {latest}.");
            return true;
        }

        let question = format!("A new version ({latest}) is available. Install now?");
        let answer = tokio::task::spawn_blocking(move || {
            Confirm::new()
                .with_prompt(question)
                .default(false)
                .interact()
        })
        .await;

        match answer {
            Ok(Ok(confirmed)) => confirmed,
            Ok(Err(error)) => {
                warn!("Update confirmation prompt failed: {error}");
                false
            }
            Err(error) => {
                warn!("Update confirmation task failed: {error}");
                false
            }
        }
    }

    async fn notify(&self, notice: Notice) {
        match notice {
            Notice::Error { .. } => eprintln!("{}", notice_text(&notice)),
            _ => println!("{}", notice_text(&notice)),
        }
    }
}
