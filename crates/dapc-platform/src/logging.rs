//! Log-file helpers.
//!
//! Resolves the default log path, rotates oversized logs and opens the file
//! the binary hands to `tracing-subscriber`. Subscriber setup itself lives
//! in the binary crate (`src/main.rs`).

use std::fs::{self, File, OpenOptions};
use std::io;
use std::path::{Path, PathBuf};

use crate::error::PlatformError;
use crate::paths::PlatformPaths;

/// Maximum size of a single log file before rotation (10 MB).
pub const DEFAULT_MAX_LOG_SIZE: u64 = 10 * 1024 * 1024;

/// Maximum number of rotated log files to retain.
pub const DEFAULT_MAX_LOG_FILES: u32 = 5;

/// File name of the log inside the log directory.
pub const LOG_FILE_NAME: &str = "dapc.log";

/// Return the default log file path: `<log_dir>/dapc.log`.
pub fn default_log_file_path(paths: &dyn PlatformPaths) -> PathBuf {
    paths.log_dir().join(LOG_FILE_NAME)
}

/// Ensure the parent directory of a log file exists, creating it if necessary.
pub fn ensure_log_dir(log_path: &Path) -> io::Result<()> {
    if let Some(parent) = log_path.parent() {
        if !parent.as_os_str().is_empty() && !parent.exists() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(())
}

/// Rotate log files when the current file exceeds `max_size` bytes.
///
/// ```text
///   dapc.log   → dapc.log.1
///   dapc.log.1 → dapc.log.2
///   …
///   dapc.log.<max_files> is deleted
/// ```
///
/// Does nothing when the file does not exist or is smaller than `max_size`.
pub fn rotate_log_files(log_path: &Path, max_size: u64, max_files: u32) -> io::Result<()> {
    if !log_path.exists() {
        return Ok(());
    }
    let metadata = fs::metadata(log_path)?;
    if metadata.len() < max_size {
        return Ok(());
    }

    let oldest = rotated_path(log_path, max_files);
    if oldest.exists() {
        fs::remove_file(&oldest)?;
    }

    for i in (1..max_files).rev() {
        let from = rotated_path(log_path, i);
        let to = rotated_path(log_path, i + 1);
        if from.exists() {
            fs::rename(&from, &to)?;
        }
    }

    fs::rename(log_path, rotated_path(log_path, 1))?;
    tracing::debug!(path = %log_path.display(), max_files, "rotated log file");
    Ok(())
}

/// Prepare and open a log file for appending.
///
/// Creates the parent directory, rotates with the default limits, then
/// opens (or creates) the file in append mode.
///
/// # Errors
///
/// Returns [`PlatformError::Io`] if any filesystem step fails.
pub fn open_log_file(log_path: &Path) -> Result<File, PlatformError> {
    ensure_log_dir(log_path)?;
    rotate_log_files(log_path, DEFAULT_MAX_LOG_SIZE, DEFAULT_MAX_LOG_FILES)?;
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)?;
    Ok(file)
}

/// Convert a log level name (case-insensitive) to a `tracing`-compatible
/// filter string. Returns `"info"` for unrecognised values.
pub fn log_level_to_filter(level: &str) -> &'static str {
    match level.to_ascii_lowercase().as_str() {
        "trace" => "trace",
        "debug" => "debug",
        "info" => "info",
        "warn" => "warn",
        "error" => "error",
        _ => "info",
    }
}

// ── internal helpers ────────────────────────────────────────────────────────

fn rotated_path(base: &Path, index: u32) -> PathBuf {
    let name = base.file_name().unwrap_or_default().to_string_lossy();
    let parent = base.parent().unwrap_or_else(|| Path::new("."));
    parent.join(format!("{}.{}", name, index))
}

// ── tests ───────────────────────────────────────────────────────────────────
