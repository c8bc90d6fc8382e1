use indicatif::{ProgressBar, ProgressStyle};
use qrgen_core::UpdateProgress;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Draw update progress until the sender side is dropped.
pub fn spawn_progress_bar(mut progress: mpsc::Receiver<UpdateProgress>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let bar = ProgressBar::new(0);
        if let Ok(style) =
            ProgressStyle::with_template("  {msg} [{bar:30}] {bytes}/{total_bytes} {bytes_per_sec}")
        {
            bar.set_style(style.progress_chars("=> "));
        }

        while let Some(update) = progress.recv().await {
            bar.set_message(stage_label(&update));
            if let UpdateProgress::Downloading { downloaded, total } = update {
                if total > 0 {
                    bar.set_length(total);
                }
                bar.set_position(downloaded);
            }
        }
        bar.finish_and_clear();
    })
}

fn stage_label(update: &UpdateProgress) -> &'static str {
    match update {
        UpdateProgress::Downloading { .. } => "Downloading",
        UpdateProgress::Verifying => "Verifying",
        UpdateProgress::Extracting => "Extracting",
        UpdateProgress::Applying => "Applying",
    }
}

#[cfg(test)]
mod tests {
    use qrgen_core::UpdateProgress;

    use super::{spawn_progress_bar, stage_label};

    #[test]
    fn labels_follow_stages() {
        assert_eq!(
            stage_label(&UpdateProgress::Downloading {
                downloaded: 1,
                total: 2
            }),
            "Downloading"
        );
        assert_eq!(stage_label(&UpdateProgress::Applying), "Applying");
    }

    #[tokio::test]
    async fn bar_task_ends_when_sender_is_dropped() {
        let (tx, rx) = tokio::sync::mpsc::channel(8);
        let handle = spawn_progress_bar(rx);

        tx.send(UpdateProgress::Downloading {
            downloaded: 10,
            total: 100,
        })
        .await
        .expect("progress should be accepted");
        drop(tx);

        handle.await.expect("progress task should finish");
    }
}
