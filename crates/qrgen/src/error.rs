use std::path::PathBuf;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppErrorDetail {
    Message(String),
    Io {
        kind: std::io::ErrorKind,
        message: String,
    },
}

impl std::fmt::Display for AppErrorDetail {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Message(message) => write!(f, "{message}"),
            Self::Io { kind, message } => write!(f, "{kind}: {message}"),
        }
    }
}

impl From<String> for AppErrorDetail {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

impl From<&str> for AppErrorDetail {
    fn from(value: &str) -> Self {
        Self::Message(value.to_string())
    }
}

impl From<std::io::Error> for AppErrorDetail {
    fn from(error: std::io::Error) -> Self {
        Self::Io {
            kind: error.kind(),
            message: error.to_string(),
        }
    }
}

impl From<crate::render::RenderError> for AppErrorDetail {
    fn from(value: crate::render::RenderError) -> Self {
        Self::Message(value.to_string())
    }
}

impl From<qrgen_platform::AppPathsError> for AppErrorDetail {
    fn from(value: qrgen_platform::AppPathsError) -> Self {
        Self::Message(value.to_string())
    }
}

impl From<qrgen_core::ParseVersionError> for AppErrorDetail {
    fn from(value: qrgen_core::ParseVersionError) -> Self {
        Self::Message(value.to_string())
    }
}

impl From<reqwest::Error> for AppErrorDetail {
    fn from(value: reqwest::Error) -> Self {
        Self::Message(value.to_string())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AppError {
    Message(String),
    RenderFailed {
        details: AppErrorDetail,
    },
    SaveFailed {
        path: PathBuf,
        details: AppErrorDetail,
    },
    SettingsSaveFailed {
        details: AppErrorDetail,
    },
    EnvironmentUnavailable {
        reason: AppErrorDetail,
    },
    UpdateSetupFailed {
        step: &'static str,
        details: AppErrorDetail,
    },
    UpdateCheckFailed {
        message: String,
    },
    UpdateFailed {
        title: &'static str,
        message: String,
    },
}

impl AppError {
    pub fn render_failed(details: impl Into<AppErrorDetail>) -> Self {
        Self::RenderFailed {
            details: details.into(),
        }
    }

    pub fn save_failed(path: impl Into<PathBuf>, details: impl Into<AppErrorDetail>) -> Self {
        Self::SaveFailed {
            path: path.into(),
            details: details.into(),
        }
    }

    pub fn settings_save_failed(details: impl Into<AppErrorDetail>) -> Self {
        Self::SettingsSaveFailed {
            details: details.into(),
        }
    }

    pub fn environment_unavailable(reason: impl Into<AppErrorDetail>) -> Self {
        Self::EnvironmentUnavailable {
            reason: reason.into(),
        }
    }

    pub fn update_setup_failed(step: &'static str, details: impl Into<AppErrorDetail>) -> Self {
        Self::UpdateSetupFailed {
            step,
            details: details.into(),
        }
    }
}

impl From<qrgen_core::UpdateError> for AppError {
    fn from(error: qrgen_core::UpdateError) -> Self {
        Self::UpdateFailed {
            title: error.title(),
            message: error.user_message(),
        }
    }
}

impl From<String> for AppError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}

impl From<&str> for AppError {
    fn from(value: &str) -> Self {
        Self::Message(value.to_string())
    }
}

impl std::fmt::Display for AppError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Message(message) => write!(f, "{message}"),
            Self::RenderFailed { details } => write!(f, "Failed to render QR code: {details}"),
            Self::SaveFailed { path, details } => {
                write!(f, "Failed to save {}: {details}", path.display())
            }
            Self::SettingsSaveFailed { details } => {
                write!(f, "Failed to save settings: {details}")
            }
            Self::EnvironmentUnavailable { reason } => write!(f, "{reason}"),
            Self::UpdateSetupFailed { step, details } => {
                write!(f, "Update setup failed ({step}): {details}")
            }
            Self::UpdateCheckFailed { message } => write!(f, "Update check failed: {message}"),
            Self::UpdateFailed { title, message } => write!(f, "{title}: {message}"),
        }
    }
}

impl std::error::Error for AppError {}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;

    use super::{AppError, AppErrorDetail};
    use crate::render::RenderError;

    #[test]
    fn message_variant_and_display_match() {
        let error = AppError::from("something failed");
        assert_eq!(error, AppError::Message("something failed".to_string()));
        assert_eq!(error.to_string(), "something failed");
    }

    #[test]
    fn save_failed_includes_path_and_io_kind() {
        let error = AppError::save_failed(
            "out/code.png",
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "denied"),
        );

        assert!(matches!(
            &error,
            AppError::SaveFailed {
                path,
                details: AppErrorDetail::Io {
                    kind: std::io::ErrorKind::PermissionDenied,
                    ..
                }
            } if path == &PathBuf::from("out/code.png")
        ));
        assert_eq!(
            error.to_string(),
            "Failed to save out/code.png: permission denied: denied"
        );
    }

    #[test]
    fn render_and_setup_constructors_include_context() {
        let render = AppError::render_failed(RenderError::BorderOutOfRange(0));
        let setup = AppError::update_setup_failed("locate install root", "no parent directory");

        assert_eq!(
            render.to_string(),
            "Failed to render QR code: border 0 is outside 1..=10"
        );
        assert_eq!(
            setup,
            AppError::UpdateSetupFailed {
                step: "locate install root",
                details: AppErrorDetail::from("no parent directory")
            }
        );
        assert_eq!(
            setup.to_string(),
            "Update setup failed (locate install root): no parent directory"
        );
    }

    #[test]
    fn update_error_keeps_user_facing_title_and_message() {
        let error = AppError::from(qrgen_core::UpdateError::CheckFailed(
            qrgen_core::CheckError::Timeout {
                timeout: std::time::Duration::from_secs(5),
            },
        ));

        assert_eq!(
            error,
            AppError::UpdateFailed {
                title: "Update check failed",
                message: "Cannot contact update server.".to_string()
            }
        );
        assert_eq!(
            error.to_string(),
            "Update check failed: Cannot contact update server."
        );
    }
}
