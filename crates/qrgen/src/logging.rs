//! Log sink setup: a debug-level file log in the data directory, mirrored to
//! stderr at warning level in debug builds.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, PoisonError};

#[cfg(debug_assertions)]
use simplelog::{ColorChoice, TermLogger, TerminalMode};
use simplelog::{CombinedLogger, ConfigBuilder, LevelFilter, SharedLogger, WriteLogger};

use qrgen_platform::AppPaths;

fn open_append(path: &Path) -> io::Result<File> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    OpenOptions::new().create(true).append(true).open(path)
}

/// Log file handle that is reopened when the file disappears underneath it,
/// e.g. when the user clears the log directory while qrgen runs.
struct LogFile {
    path: PathBuf,
    handle: Mutex<Option<File>>,
}

impl LogFile {
    fn open(path: PathBuf) -> io::Result<Self> {
        let file = open_append(&path)?;
        Ok(Self {
            path,
            handle: Mutex::new(Some(file)),
        })
    }

    fn with_file<T>(&self, action: impl FnOnce(&mut File) -> io::Result<T>) -> io::Result<T> {
        let mut handle = self.handle.lock().unwrap_or_else(PoisonError::into_inner);
        if handle.is_none() || !self.path.exists() {
            *handle = Some(open_append(&self.path)?);
        }
        let Some(file) = handle.as_mut() else {
            return Err(io::Error::other("log file not available"));
        };
        action(file)
    }
}

impl Write for LogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.with_file(|file| file.write(buf))
    }

    fn flush(&mut self) -> io::Result<()> {
        self.with_file(Write::flush)
    }
}

/// Shrink the log to the most recent `max_log_size / 2` bytes, cut at a line
/// start, once it grows past `max_log_size`.
pub fn trim_log(log_path: &Path, max_log_size: u64) {
    let Ok(contents) = std::fs::read(log_path) else {
        return;
    };
    let len = contents.len() as u64;
    if len <= max_log_size {
        return;
    }

    let cut = usize::try_from(len - max_log_size / 2).unwrap_or(contents.len());
    let tail = &contents[cut..];
    let start = tail
        .iter()
        .position(|&byte| byte == b'\n')
        .map_or(0, |newline| newline + 1);
    if let Err(error) = std::fs::write(log_path, &tail[start..]) {
        log::warn!("Could not trim {}: {error}", log_path.display());
    }
}

/// Install the global logger and return the log file path. Safe to call
/// before settings are read so that settings problems get logged.
pub fn init_logging(paths: &AppPaths, debug_enabled: bool) -> PathBuf {
    let log_path = paths.log_file();
    let config = ConfigBuilder::new()
        .set_time_format_rfc3339()
        .add_filter_allow_str("qrgen")
        .build();

    let mut loggers: Vec<Box<dyn SharedLogger>> = Vec::new();
    #[cfg(debug_assertions)]
    loggers.push(TermLogger::new(
        LevelFilter::Warn,
        config.clone(),
        TerminalMode::Stderr,
        ColorChoice::Auto,
    ));
    if let Ok(file) = LogFile::open(log_path.clone()) {
        loggers.push(WriteLogger::new(LevelFilter::Debug, config, file));
    }
    let _ = CombinedLogger::init(loggers);

    set_debug_logging(debug_enabled);
    log::info!(
        "qrgen {} started, logging to {}",
        env!("CARGO_PKG_VERSION"),
        log_path.display()
    );
    log_path
}

pub fn set_debug_logging(enabled: bool) {
    let level = if enabled {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    log::set_max_level(level);
}

#[cfg(test)]
mod tests {
    use std::io::Write as _;

    use super::{LogFile, set_debug_logging, trim_log};

    #[test]
    fn log_file_comes_back_after_directory_is_removed() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let log_path = temp_dir.path().join("logs").join("qrgen.log");
        let mut log = LogFile::open(log_path.clone()).expect("log file should open");

        log.write_all(b"before\n").expect("first write should succeed");
        std::fs::remove_dir_all(temp_dir.path().join("logs"))
            .expect("log directory should be removable");
        log.write_all(b"after\n").expect("write should reopen the log file");

        assert_eq!(
            std::fs::read_to_string(&log_path).expect("log file should be readable"),
            "after\n"
        );
    }

    #[test]
    fn oversized_log_keeps_whole_recent_lines() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let log_path = temp_dir.path().join("qrgen.log");
        std::fs::write(&log_path, "entry-1\nentry-2\nentry-3\nentry-4\nentry-5\n")
            .expect("log file should be written");

        trim_log(&log_path, 20);

        let trimmed = std::fs::read_to_string(&log_path).expect("log file should be readable");
        assert_eq!(trimmed, "entry-5\n");
    }

    #[test]
    fn log_within_limit_is_untouched() {
        let temp_dir = tempfile::tempdir().expect("temporary directory should be created");
        let log_path = temp_dir.path().join("qrgen.log");
        std::fs::write(&log_path, "short\n").expect("log file should be written");

        trim_log(&log_path, 1024);
        trim_log(&temp_dir.path().join("missing.log"), 1);

        assert_eq!(
            std::fs::read_to_string(&log_path).expect("log file should be readable"),
            "short\n"
        );
    }

    #[test]
    fn debug_flag_switches_between_debug_and_info() {
        set_debug_logging(true);
        assert_eq!(log::max_level(), log::LevelFilter::Debug);

        set_debug_logging(false);
        assert_eq!(log::max_level(), log::LevelFilter::Info);
    }
}
