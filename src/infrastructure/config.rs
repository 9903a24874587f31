//! Configuration management
//!
//! Settings live in a YAML file under the user's configuration directory.
//! Every key is optional; a missing file means "all defaults".

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::build::{DEFAULT_JOB_TEMPLATE, PollPolicy};

/// Errors raised while loading configuration
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The file exists but could not be read
    #[error("Failed to read {path}: {source}")]
    Read {
        /// Path of the file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// The file is not valid YAML for [`Config`]
    #[error("Failed to parse {path}: {source}")]
    Parse {
        /// Path of the file.
        path: PathBuf,
        /// Underlying YAML error.
        source: serde_yaml::Error,
    },
}

/// Application configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Jenkins server URL used when `--address` is not given
    pub address: Option<String>,
    /// Jenkins user used when `--user` is not given
    pub user: Option<String>,
    /// Log level
    pub log_level: String,
    /// Pause between queue polls
    pub queue_poll_interval_ms: u64,
    /// Queue polls before giving up
    pub queue_poll_max_attempts: u32,
    /// Pause between console fetches
    pub log_poll_interval_ms: u64,
    /// Per-request timeout
    pub request_timeout_secs: u64,
    /// Hide `[Pipeline]` step-tracing lines
    pub filter_pipeline_markers: bool,
    /// `config.xml` used to create missing jobs
    pub job_template: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            address: None,
            user: None,
            log_level: "info".to_string(),
            queue_poll_interval_ms: 1000,
            queue_poll_max_attempts: 300,
            log_poll_interval_ms: 3000,
            request_timeout_secs: 30,
            filter_pipeline_markers: true,
            job_template: None,
        }
    }
}

impl Config {
    /// Default location, `<config_dir>/jcli/config.yaml`
    #[must_use]
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("jcli").join("config.yaml"))
    }

    /// Loads the configuration, falling back to defaults if the file is absent
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file exists but cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = match std::fs::read_to_string(path) {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No configuration file, using defaults");
                return Ok(Self::default());
            }
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        Self::from_yaml(&text).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parses configuration from YAML text
    ///
    /// # Errors
    ///
    /// Returns the YAML error if the text does not describe a [`Config`].
    pub fn from_yaml(text: &str) -> Result<Self, serde_yaml::Error> {
        if text.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(text)
    }

    /// Queue polling policy
    #[must_use]
    pub fn poll_policy(&self) -> PollPolicy {
        PollPolicy::new(
            Duration::from_millis(self.queue_poll_interval_ms),
            self.queue_poll_max_attempts,
        )
    }

    /// Pause between console fetches
    #[must_use]
    pub fn log_poll_interval(&self) -> Duration {
        Duration::from_millis(self.log_poll_interval_ms)
    }

    /// Per-request timeout
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Job template text, read from `job_template` when set
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Read`] if the template file cannot be read.
    pub fn job_template(&self) -> Result<String, ConfigError> {
        match &self.job_template {
            Some(path) => std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.clone(),
                source,
            }),
            None => Ok(DEFAULT_JOB_TEMPLATE.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_config_default() {
        let config = Config::default();
        assert_eq!(config.log_level, "info");
        assert_eq!(config.poll_policy(), PollPolicy::default());
        assert_eq!(config.log_poll_interval(), Duration::from_secs(3));
        assert!(config.filter_pipeline_markers);
    }

    #[test]
    fn test_partial_yaml_keeps_defaults() {
        let config = Config::from_yaml(
            "address: https://ci.example.com\nqueue_poll_max_attempts: 20\n",
        )
        .unwrap();
        assert_eq!(config.address.as_deref(), Some("https://ci.example.com"));
        assert_eq!(config.queue_poll_max_attempts, 20);
        assert_eq!(config.request_timeout_secs, 30);
    }

    #[test]
    fn test_empty_yaml_is_default() {
        assert_eq!(Config::from_yaml("").unwrap(), Config::default());
    }

    #[test]
    fn test_missing_file_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("absent.yaml")).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_invalid_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "queue_poll_max_attempts: lots\n").unwrap();
        assert!(matches!(Config::load(&path), Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_job_template_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("job.xml");
        std::fs::write(&path, "<flow-definition/>").unwrap();

        let config = Config {
            job_template: Some(path),
            ..Config::default()
        };
        assert_eq!(config.job_template().unwrap(), "<flow-definition/>");
        assert_eq!(Config::default().job_template().unwrap(), DEFAULT_JOB_TEMPLATE);
    }
}
