//! Server session
//!
//! Address and credentials of the Jenkins server a process talks to.

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use url::Url;

use super::errors::ApiError;

/// Immutable connection details shared by every request
#[derive(Clone, PartialEq, Eq)]
pub struct ServerSession {
    base_url: Url,
    username: String,
    api_key: String,
}

impl ServerSession {
    /// Creates a session, validating the base address
    ///
    /// The address must be an absolute `http` or `https` URL. A context path
    /// (`https://ci.example.com/jenkins`) is kept and always ends with `/`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidUrl`] when the address cannot be parsed or
    /// uses another scheme.
    pub fn new(
        address: &str,
        username: impl Into<String>,
        api_key: impl Into<String>,
    ) -> Result<Self, ApiError> {
        let mut base_url = Url::parse(address.trim()).map_err(|e| ApiError::InvalidUrl {
            url: address.to_string(),
            reason: e.to_string(),
        })?;

        if !matches!(base_url.scheme(), "http" | "https") {
            return Err(ApiError::InvalidUrl {
                url: address.to_string(),
                reason: format!("unsupported scheme '{}'", base_url.scheme()),
            });
        }

        if !base_url.path().ends_with('/') {
            let path = format!("{}/", base_url.path());
            base_url.set_path(&path);
        }
        base_url.set_query(None);
        base_url.set_fragment(None);

        Ok(Self {
            base_url,
            username: username.into(),
            api_key: api_key.into(),
        })
    }

    /// Base URL, always ending with `/`
    #[must_use]
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Address without the trailing slash, as typed by the operator
    #[must_use]
    pub fn address(&self) -> &str {
        self.base_url.as_str().trim_end_matches('/')
    }

    /// User name used for basic authentication
    #[must_use]
    pub fn username(&self) -> &str {
        &self.username
    }

    /// Value of the `Authorization` header for this session
    #[must_use]
    pub fn authorization(&self) -> String {
        let credentials = format!("{}:{}", self.username, self.api_key);
        format!("Basic {}", STANDARD.encode(credentials))
    }
}

impl std::fmt::Debug for ServerSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ServerSession")
            .field("base_url", &self.base_url.as_str())
            .field("username", &self.username)
            .field("api_key", &"<redacted>")
            .finish()
    }
}
