//! Infrastructure layer
//!
//! Configuration, logging, credential storage and the browser opener.

mod browser;
mod config;
mod credentials;
mod logging;

pub use browser::{BrowserError, open_in_browser};
pub use config::{Config, ConfigError};
pub use credentials::{
    API_KEY_ENV, CredentialError, CredentialStore, EnvOverride, FileCredentialStore,
};
pub use logging::{default_log_path, init_file_logging, init_logging};
