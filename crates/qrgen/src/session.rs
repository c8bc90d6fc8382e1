//! Editing state for one QR code. Every parameter change arrives as a
//! [`Message`]; a message that actually changes something regenerates the
//! code exactly once.

use std::path::{Path, PathBuf};

use log::debug;

use crate::error::AppError;
use crate::render::{
    BORDER_RANGE, BOX_SIZE_RANGE, EcLevel, OutputFormat, QrSettings, RenderError, RenderedCode,
    render,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    TextChanged(String),
    EcLevelChanged(EcLevel),
    BoxSizeChanged(u32),
    BorderChanged(u32),
    FormatChanged(OutputFormat),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveOutcome {
    Saved(PathBuf),
    NothingToSave,
}

#[derive(Debug, Default)]
pub struct Session {
    text: String,
    settings: QrSettings,
    current: Option<RenderedCode>,
    renders: usize,
}

impl Session {
    pub fn new(settings: QrSettings) -> Self {
        Self {
            settings,
            ..Self::default()
        }
    }

    pub fn settings(&self) -> &QrSettings {
        &self.settings
    }

    pub fn current(&self) -> Option<&RenderedCode> {
        self.current.as_ref()
    }

    pub fn render_count(&self) -> usize {
        self.renders
    }

    /// Apply `message`. Out-of-range values are rejected and leave the
    /// session untouched. Returns whether a regeneration happened.
    pub fn update(&mut self, message: Message) -> Result<bool, RenderError> {
        let mut next = self.settings;
        let mut text = None;

        match message {
            Message::TextChanged(value) => {
                if value.trim() == self.text.trim() {
                    return Ok(false);
                }
                text = Some(value);
            }
            Message::EcLevelChanged(level) => next.ec_level = level,
            Message::BoxSizeChanged(size) => {
                if !BOX_SIZE_RANGE.contains(&size) {
                    return Err(RenderError::BoxSizeOutOfRange(size));
                }
                next.box_size = size;
            }
            Message::BorderChanged(border) => {
                if !BORDER_RANGE.contains(&border) {
                    return Err(RenderError::BorderOutOfRange(border));
                }
                next.border = border;
            }
            Message::FormatChanged(format) => next.format = format,
        }

        if text.is_none() && next == self.settings {
            return Ok(false);
        }

        let text_ref = text.as_deref().unwrap_or(&self.text);
        let rendered = render(text_ref, &next)?;
        if let Some(value) = text {
            self.text = value;
        }
        self.settings = next;
        self.current = rendered;
        self.renders += 1;
        debug!(
            "Regenerated QR code ({:?}, box {}, border {}, {:?})",
            self.settings.ec_level,
            self.settings.box_size,
            self.settings.border,
            self.settings.format
        );
        Ok(true)
    }

    /// Write the current code to `path`, adding the format's extension when
    /// the path has none.
    pub fn save(&self, path: &Path) -> Result<SaveOutcome, AppError> {
        let Some(code) = &self.current else {
            return Ok(SaveOutcome::NothingToSave);
        };

        let mut path = path.to_path_buf();
        if path.extension().is_none() {
            path.set_extension(code.format.extension());
        }
        std::fs::write(&path, &code.bytes).map_err(|error| AppError::save_failed(&path, error))?;
        Ok(SaveOutcome::Saved(path))
    }
}

#[cfg(test)]
mod tests {
    use super::{Message, SaveOutcome, Session};
    use crate::render::{EcLevel, OutputFormat, QrSettings, RenderError};

    fn session_with_text(text: &str) -> Session {
        let mut session = Session::new(QrSettings::default());
        session
            .update(Message::TextChanged(text.to_string()))
            .expect("text should render");
        session
    }

    #[test]
    fn each_parameter_change_regenerates_once() {
        let mut session = session_with_text("example.com");
        assert_eq!(session.render_count(), 1);

        session
            .update(Message::EcLevelChanged(EcLevel::H))
            .expect("ec change should render");
        session
            .update(Message::BoxSizeChanged(20))
            .expect("box change should render");
        session
            .update(Message::BorderChanged(2))
            .expect("border change should render");
        session
            .update(Message::FormatChanged(OutputFormat::Svg))
            .expect("format change should render");

        assert_eq!(session.render_count(), 5);
        assert_eq!(
            session.current().map(|code| code.format),
            Some(OutputFormat::Svg)
        );
    }

    #[test]
    fn unchanged_values_do_not_regenerate() {
        let mut session = session_with_text("example.com");

        let rendered = session
            .update(Message::BoxSizeChanged(10))
            .expect("same value should be accepted");
        let same_text = session
            .update(Message::TextChanged(" example.com ".to_string()))
            .expect("same text should be accepted");

        assert!(!rendered);
        assert!(!same_text);
        assert_eq!(session.render_count(), 1);
    }

    #[test]
    fn out_of_range_values_leave_session_untouched() {
        let mut session = session_with_text("example.com");

        assert!(matches!(
            session.update(Message::BoxSizeChanged(51)),
            Err(RenderError::BoxSizeOutOfRange(51))
        ));
        assert!(matches!(
            session.update(Message::BorderChanged(0)),
            Err(RenderError::BorderOutOfRange(0))
        ));
        assert_eq!(session.settings().box_size, 10);
        assert_eq!(session.settings().border, 4);
        assert_eq!(session.render_count(), 1);
    }

    #[test]
    fn empty_text_clears_current_code() {
        let mut session = session_with_text("example.com");
        assert!(session.current().is_some());

        session
            .update(Message::TextChanged(String::new()))
            .expect("clearing should succeed");

        assert!(session.current().is_none());
    }

    #[test]
    fn save_without_code_is_a_no_op() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let session = Session::new(QrSettings::default());
        let target = temp_dir.path().join("code.png");

        let outcome = session.save(&target).expect("save should not fail");

        assert_eq!(outcome, SaveOutcome::NothingToSave);
        assert!(!target.exists());
    }

    #[test]
    fn save_adds_extension_for_current_format() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let mut session = session_with_text("https://example.com");
        session
            .update(Message::FormatChanged(OutputFormat::Svg))
            .expect("format change should render");

        let outcome = session
            .save(&temp_dir.path().join("code"))
            .expect("save should succeed");

        let expected = temp_dir.path().join("code.svg");
        assert_eq!(outcome, SaveOutcome::Saved(expected.clone()));
        let written = std::fs::read_to_string(&expected).expect("saved file should be readable");
        assert!(written.contains("<svg"));
    }

    #[test]
    fn save_into_missing_directory_reports_path() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let session = session_with_text("example.com");
        let target = temp_dir.path().join("missing").join("code.png");

        let error = session
            .save(&target)
            .expect_err("save into a missing directory should fail");

        assert!(error.to_string().contains("code.png"));
    }
}
