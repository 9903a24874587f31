//! Error types for build orchestration

use thiserror::Error;

use super::patch::PatchError;
use crate::jenkins::ApiError;

/// Errors that abort an orchestration attempt
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BuildError {
    /// Request-level failure from the API client
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The job configuration could not be patched
    #[error(transparent)]
    Patch(#[from] PatchError),

    /// Creating a missing job failed
    #[error("Could not create job '{job}': HTTP {status}")]
    JobCreation {
        /// Name of the job.
        job: String,
        /// Status returned by `createItem`.
        status: u16,
    },

    /// Jenkins refused the patched configuration
    #[error("Could not upload config.xml for job '{job}': HTTP {status}")]
    ConfigUpload {
        /// Name of the job.
        job: String,
        /// Status returned by the upload.
        status: u16,
    },

    /// The job declares build parameters
    #[error("Job '{job}' is parameterized; parameterized jobs must be run manually")]
    UnsupportedParameterizedJob {
        /// Name of the job.
        job: String,
    },

    /// Job metadata did not decode
    #[error("Could not read metadata of job '{job}': {reason}")]
    MetadataDecode {
        /// Name of the job.
        job: String,
        /// Decoder error message.
        reason: String,
    },

    /// Triggering the build failed
    #[error("Could not trigger build for job '{job}': {reason}")]
    Trigger {
        /// Name of the job.
        job: String,
        /// What went wrong.
        reason: String,
    },

    /// The queue item never left the queue within the polling budget
    #[error("Build did not leave the queue after {attempts} polls of {location}")]
    QueuePollTimeout {
        /// Number of polls issued.
        attempts: u32,
        /// Queue item location.
        location: String,
    },

    /// The queue item was cancelled on the server
    #[error("Queued build was cancelled on the server ({location})")]
    QueueItemCancelled {
        /// Queue item location.
        location: String,
    },
}

impl BuildError {
    /// Returns true when the failure comes from rejected credentials
    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Api(ApiError::Auth { .. }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parameterized_message() {
        let err = BuildError::UnsupportedParameterizedJob {
            job: "demo".to_string(),
        };
        assert!(err.to_string().contains("parameterized"));
        assert!(err.to_string().contains("demo"));
    }

    #[test]
    fn test_wrapped_errors_are_transparent() {
        let err = BuildError::from(PatchError::MissingScriptElement);
        assert_eq!(err.to_string(), PatchError::MissingScriptElement.to_string());

        let err = BuildError::from(ApiError::Auth { status: 401 });
        assert!(err.is_auth());
    }
}
