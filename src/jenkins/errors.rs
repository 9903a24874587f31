//! Error types for the Jenkins API client

use thiserror::Error;

/// Errors surfaced by every request made against a Jenkins server
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ApiError {
    /// Transport-level failure (DNS, connection refused, timeout)
    #[error("Could not connect to Jenkins at {url}: {reason}")]
    Connection {
        /// URL the request was sent to.
        url: String,
        /// Transport error message.
        reason: String,
    },

    /// Jenkins rejected the credentials
    #[error("Access denied by Jenkins (HTTP {status}); check the user and API token")]
    Auth {
        /// Status code returned (401 or 403).
        status: u16,
    },

    /// Response status the caller did not expect
    #[error("Unexpected HTTP {status} from {url}")]
    UnexpectedStatus {
        /// Status code returned.
        status: u16,
        /// URL the request was sent to.
        url: String,
    },

    /// A URL could not be built or parsed
    #[error("Invalid URL '{url}': {reason}")]
    InvalidUrl {
        /// The offending URL or fragment.
        url: String,
        /// Parser error message.
        reason: String,
    },

    /// Response body did not match the expected shape
    #[error("Could not decode response from {url}: {reason}")]
    Decode {
        /// URL the response came from.
        url: String,
        /// Decoder error message.
        reason: String,
    },
}

impl ApiError {
    /// Returns true for errors that must terminate the whole session
    #[must_use]
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }

    /// Returns true for transport failures a caller may choose to retry
    #[must_use]
    pub fn is_connection(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auth_error_is_fatal() {
        assert!(ApiError::Auth { status: 401 }.is_fatal());
        assert!(
            !ApiError::Connection {
                url: "http://jenkins/".to_string(),
                reason: "refused".to_string(),
            }
            .is_fatal()
        );
    }

    #[test]
    fn test_error_messages() {
        let err = ApiError::UnexpectedStatus {
            status: 500,
            url: "http://jenkins/job/demo/api/json".to_string(),
        };
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("job/demo"));

        let err = ApiError::Auth { status: 403 };
        assert!(err.to_string().contains("403"));
    }
}
