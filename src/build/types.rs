//! Build orchestration types

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// A build request waiting in the Jenkins queue
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueItem {
    /// Poll URL returned in the trigger response's `Location` header
    pub location: String,
    /// Why the item is still queued; `None` once it has left the queue
    pub reason: Option<String>,
}

impl QueueItem {
    /// Creates a freshly triggered queue item
    #[must_use]
    pub fn new(location: impl Into<String>) -> Self {
        Self {
            location: location.into(),
            reason: None,
        }
    }

    /// URL of the item's JSON API (`{location}api/json`)
    #[must_use]
    pub fn api_url(&self) -> String {
        let location = self.location.trim();
        if location.ends_with('/') {
            format!("{location}api/json")
        } else {
            format!("{location}/api/json")
        }
    }
}

/// A build that has left the queue
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct BuildReference {
    url: String,
}

impl BuildReference {
    /// Wraps a build URL as reported by Jenkins
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }

    /// The build URL
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// The build URL with a guaranteed trailing slash
    #[must_use]
    pub fn base(&self) -> String {
        if self.url.ends_with('/') {
            self.url.clone()
        } else {
            format!("{}/", self.url)
        }
    }

    /// Web page of the build console
    #[must_use]
    pub fn console_url(&self) -> String {
        format!("{}console", self.base())
    }
}

impl fmt::Display for BuildReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.url)
    }
}

/// Bounds on how the queue is polled
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Delay between two polls
    pub interval: Duration,
    /// Maximum number of polls before giving up
    pub max_attempts: u32,
    /// Optional wall-clock limit across all polls
    pub deadline: Option<Duration>,
}

impl PollPolicy {
    /// Policy with the given interval and attempt budget
    #[must_use]
    pub fn new(interval: Duration, max_attempts: u32) -> Self {
        Self {
            interval,
            max_attempts: max_attempts.max(1),
            deadline: None,
        }
    }

    /// Adds a wall-clock deadline
    #[must_use]
    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = Some(deadline);
        self
    }
}

impl Default for PollPolicy {
    fn default() -> Self {
        Self::new(Duration::from_secs(1), 300)
    }
}

/// Progress of an orchestration attempt, reported to the UI
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStage {
    /// Checking that the job exists
    EnsuringJob,
    /// The job was missing and has been created
    JobCreated,
    /// Fetching and patching `config.xml`
    PatchingConfig,
    /// Uploading the patched configuration
    UploadingConfig,
    /// Posting the build trigger
    Triggering,
    /// Waiting in the queue
    Queued {
        /// Reason reported by Jenkins
        reason: String,
    },
    /// The build is running
    Running {
        /// Build URL
        url: String,
    },
}

impl fmt::Display for BuildStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::EnsuringJob => f.write_str("Checking job"),
            Self::JobCreated => f.write_str("Created job"),
            Self::PatchingConfig => f.write_str("Patching pipeline script"),
            Self::UploadingConfig => f.write_str("Uploading config.xml"),
            Self::Triggering => f.write_str("Triggering build"),
            Self::Queued { reason } => write!(f, "Queued: {reason}"),
            Self::Running { url } => write!(f, "Running: {url}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_queue_api_url() {
        assert_eq!(
            QueueItem::new("http://jenkins/queue/item/7/").api_url(),
            "http://jenkins/queue/item/7/api/json"
        );
        assert_eq!(
            QueueItem::new("http://jenkins/queue/item/7").api_url(),
            "http://jenkins/queue/item/7/api/json"
        );
    }

    #[test]
    fn test_build_reference_urls() {
        let build = BuildReference::new("http://host/job/demo/7/");
        assert_eq!(build.console_url(), "http://host/job/demo/7/console");

        let build = BuildReference::new("http://host/job/demo/7");
        assert_eq!(build.base(), "http://host/job/demo/7/");
        assert_eq!(build.to_string(), "http://host/job/demo/7");
    }

    #[test]
    fn test_poll_policy_needs_one_attempt() {
        let policy = PollPolicy::new(Duration::ZERO, 0);
        assert_eq!(policy.max_attempts, 1);
    }
}
