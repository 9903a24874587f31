//! Logging configuration
//!
//! Initializes tracing for the application. `RUST_LOG` takes precedence over
//! the configured level.

use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tracing_subscriber::{EnvFilter, fmt};

fn filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Initializes logging to stderr with the specified level
///
/// Does nothing if a global subscriber is already installed.
pub fn init_logging(level: &str) {
    let _ = fmt()
        .with_env_filter(filter(level))
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_line_number(true)
        .try_init();
}

/// Default log file used while the full-screen UI owns the terminal
#[must_use]
pub fn default_log_path() -> Option<PathBuf> {
    dirs::state_dir()
        .or_else(dirs::cache_dir)
        .map(|dir| dir.join("jcli").join("jcli.log"))
}

/// Initializes logging into `path`, appending to it
///
/// # Errors
///
/// Returns an I/O error if the file or its directory cannot be created.
pub fn init_file_logging(level: &str, path: &Path) -> std::io::Result<()> {
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir)?;
    }
    let file = OpenOptions::new().create(true).append(true).open(path)?;

    let _ = fmt()
        .with_env_filter(filter(level))
        .with_writer(Mutex::new(file))
        .with_ansi(false)
        .with_target(false)
        .try_init();
    tracing::info!(version = crate::VERSION, "jcli starting");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_init_logging() {
        // Just verify it doesn't panic, even when called twice
        init_logging("debug");
        init_logging("info");
    }

    #[test]
    fn test_file_logging_creates_directory() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("jcli.log");
        init_file_logging("info", &path).unwrap();
        assert!(path.exists());
    }
}
