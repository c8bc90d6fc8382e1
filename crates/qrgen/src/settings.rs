use std::path::Path;
use std::time::Duration;

use qrgen_platform::AppPaths;
use serde::{Deserialize, Serialize};

use crate::render::QrSettings;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppSettings {
    #[serde(default)]
    pub qr: QrSettings,

    #[serde(default)]
    pub debug_logging: bool,

    #[serde(default = "default_check_timeout")]
    pub check_timeout_secs: u64,

    #[serde(default = "default_download_timeout")]
    pub download_timeout_secs: u64,

    #[serde(default = "default_max_log_size_bytes")]
    pub max_log_size_bytes: u64,

    #[serde(default)]
    pub update_url: Option<String>,

    #[serde(default)]
    pub artifact_url: Option<String>,

    #[serde(default)]
    pub checksum_url: Option<String>,
}

const MIN_TIMEOUT_SECS: u64 = 1;

fn default_check_timeout() -> u64 {
    5
}

fn default_download_timeout() -> u64 {
    20
}

fn default_max_log_size_bytes() -> u64 {
    5 * 1024 * 1024
}

impl Default for AppSettings {
    fn default() -> Self {
        Self {
            qr: QrSettings::default(),
            debug_logging: false,
            check_timeout_secs: default_check_timeout(),
            download_timeout_secs: default_download_timeout(),
            max_log_size_bytes: default_max_log_size_bytes(),
            update_url: None,
            artifact_url: None,
            checksum_url: None,
        }
    }
}

impl AppSettings {
    pub fn load(paths: &AppPaths) -> Self {
        Self::load_from(&paths.settings_file())
    }

    /// Read settings from `path`, falling back to defaults when the file is
    /// missing or unreadable.
    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            return Self::default();
        }
        match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|error| {
                log::warn!("Ignoring malformed settings file {}: {error}", path.display());
                Self::default()
            }),
            Err(_) => Self::default(),
        }
    }

    pub fn save(&self, paths: &AppPaths) -> Result<(), std::io::Error> {
        paths.ensure_dirs()?;
        self.save_to(&paths.settings_file())
    }

    pub fn save_to(&self, path: &Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)
    }

    /// Both timeouts are at least one second.
    pub fn check_timeout(&self) -> Duration {
        Duration::from_secs(self.check_timeout_secs.max(MIN_TIMEOUT_SECS))
    }

    pub fn download_timeout(&self) -> Duration {
        Duration::from_secs(self.download_timeout_secs.max(MIN_TIMEOUT_SECS))
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::AppSettings;
    use crate::render::{EcLevel, OutputFormat};

    #[test]
    fn app_settings_defaults_match_expected_timeouts() {
        let settings = AppSettings::default();

        assert_eq!(settings.check_timeout_secs, 5);
        assert_eq!(settings.download_timeout_secs, 20);
        assert_eq!(settings.max_log_size_bytes, 5 * 1024 * 1024);
        assert!(!settings.debug_logging);
        assert!(settings.update_url.is_none());
        assert_eq!(settings.qr.box_size, 10);
    }

    #[test]
    fn partial_json_fills_missing_fields_with_defaults() {
        let value = json!({
            "qr": { "ec_level": "H", "format": "svg" },
            "check_timeout_secs": 2
        });

        let settings: AppSettings =
            serde_json::from_value(value).expect("settings JSON should deserialize");

        assert_eq!(settings.qr.ec_level, EcLevel::H);
        assert_eq!(settings.qr.format, OutputFormat::Svg);
        assert_eq!(settings.qr.border, 4);
        assert_eq!(settings.check_timeout_secs, 2);
        assert_eq!(settings.download_timeout_secs, 20);
    }

    #[test]
    fn malformed_file_falls_back_to_defaults() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let path = temp_dir.path().join("settings.json");
        std::fs::write(&path, "{ not json").expect("settings file should be written");

        assert_eq!(AppSettings::load_from(&path), AppSettings::default());
        assert_eq!(
            AppSettings::load_from(&temp_dir.path().join("missing.json")),
            AppSettings::default()
        );
    }

    #[test]
    fn save_then_load_preserves_overrides() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let path = temp_dir.path().join("settings.json");
        let mut settings = AppSettings::default();
        settings.qr.box_size = 25;
        settings.checksum_url = Some("https://example.com/SHA256SUMS".to_string());

        settings.save_to(&path).expect("settings should save");

        assert_eq!(AppSettings::load_from(&path), settings);
    }

    #[test]
    fn zero_timeouts_are_raised_to_one_second() {
        let settings: AppSettings = serde_json::from_value(json!({
            "check_timeout_secs": 0,
            "download_timeout_secs": 0
        }))
        .expect("settings JSON should deserialize");

        assert_eq!(settings.check_timeout(), Duration::from_secs(1));
        assert_eq!(settings.download_timeout(), Duration::from_secs(1));
        assert_eq!(AppSettings::default().download_timeout(), Duration::from_secs(20));
    }
}
