//! Build orchestrator
//!
//! Drives a job from "script on disk" to "build running":
//!
//! ```text
//! EnsureJobExists -> FetchConfig -> PatchConfig -> UploadConfig
//!     -> TriggerBuild -> PollQueue -> Running
//! ```
//!
//! Every step is exposed on its own so callers and tests can drive the
//! machine piecewise; [`BuildOrchestrator::launch`] runs them in order and
//! stops at the first failure.

use std::time::Instant;

use http::StatusCode;
use serde::Deserialize;
use tokio::sync::mpsc::UnboundedSender;
use url::Url;

use super::errors::BuildError;
use super::patch::JobConfig;
use super::types::{BuildReference, BuildStage, PollPolicy, QueueItem};
use crate::jenkins::{ApiError, HttpResponse, JenkinsClient};

/// Template used when the target job does not exist yet
pub const DEFAULT_JOB_TEMPLATE: &str = include_str!("../../templates/pipeline-job.xml");

const XML_CONTENT_TYPE: &str = "text/xml";

/// Whether [`BuildOrchestrator::ensure_job_exists`] had to create the job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPresence {
    /// The job was already there
    Existing,
    /// The job was created from the template
    Created,
}

/// Subset of `/job/{name}/api/json` needed to detect build parameters
#[derive(Debug, Default, Deserialize)]
struct JobMetadata {
    #[serde(default)]
    property: Vec<Option<JobProperty>>,
}

#[derive(Debug, Default, Deserialize)]
struct JobProperty {
    #[serde(default, rename = "parameterDefinitions")]
    parameter_definitions: Option<Vec<serde_json::Value>>,
}

impl JobMetadata {
    fn is_parameterized(&self) -> bool {
        self.property.iter().flatten().any(|property| {
            property
                .parameter_definitions
                .as_ref()
                .is_some_and(|definitions| !definitions.is_empty())
        })
    }
}

/// Subset of `{queueLocation}api/json`
#[derive(Debug, Default, Deserialize)]
struct QueueItemStatus {
    #[serde(default)]
    why: Option<String>,
    #[serde(default)]
    cancelled: bool,
    #[serde(default)]
    executable: Option<Executable>,
}

#[derive(Debug, Default, Deserialize)]
struct Executable {
    #[serde(default)]
    url: Option<String>,
}

/// Prepares a job and starts a build of it
#[derive(Debug, Clone)]
pub struct BuildOrchestrator {
    client: JenkinsClient,
    policy: PollPolicy,
    job_template: String,
    progress: Option<UnboundedSender<BuildStage>>,
}

impl BuildOrchestrator {
    /// Creates an orchestrator with the default poll policy and job template
    #[must_use]
    pub fn new(client: JenkinsClient) -> Self {
        Self {
            client,
            policy: PollPolicy::default(),
            job_template: DEFAULT_JOB_TEMPLATE.to_string(),
            progress: None,
        }
    }

    /// Sets how the queue is polled
    #[must_use]
    pub fn with_poll_policy(mut self, policy: PollPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Sets the configuration used to create missing jobs
    #[must_use]
    pub fn with_job_template(mut self, template: impl Into<String>) -> Self {
        self.job_template = template.into();
        self
    }

    /// Reports each stage transition on the given channel
    #[must_use]
    pub fn with_progress(mut self, progress: UnboundedSender<BuildStage>) -> Self {
        self.progress = Some(progress);
        self
    }

    /// Runs the whole state machine and returns the running build
    ///
    /// # Errors
    ///
    /// Returns the [`BuildError`] of the first step that fails.
    pub async fn launch(&self, job: &str, script: &str) -> Result<BuildReference, BuildError> {
        tracing::info!(job = %job, address = %self.client.session().address(), "Launching build");

        self.report(BuildStage::EnsuringJob);
        if self.ensure_job_exists(job).await? == JobPresence::Created {
            self.report(BuildStage::JobCreated);
        }

        self.report(BuildStage::PatchingConfig);
        let config = self.fetch_config(job).await?;
        let patched = config.with_script(script)?;

        self.report(BuildStage::UploadingConfig);
        self.upload_config(job, patched).await?;

        self.report(BuildStage::Triggering);
        let mut item = self.trigger_build(job).await?;

        let build = self.poll_queue(&mut item).await?;
        self.report(BuildStage::Running {
            url: build.url().to_string(),
        });
        Ok(build)
    }

    /// Returns whether the job exists (404 means absent)
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Api`] on transport, auth or unexpected status.
    pub async fn job_exists(&self, job: &str) -> Result<bool, BuildError> {
        let url = self.client.job_endpoint(job, &["api", "json"])?;
        let response = self.client.get(url.clone()).await?;
        match response.status {
            StatusCode::OK => Ok(true),
            StatusCode::NOT_FOUND => Ok(false),
            status => Err(unexpected(status, &url).into()),
        }
    }

    /// Creates the job from the template if it does not exist
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::JobCreation`] if `createItem` is refused.
    pub async fn ensure_job_exists(&self, job: &str) -> Result<JobPresence, BuildError> {
        if self.job_exists(job).await? {
            tracing::debug!(job = %job, "Job exists");
            return Ok(JobPresence::Existing);
        }

        tracing::info!(job = %job, "Job not found, creating it from template");
        let url = self.create_item_url(job)?;
        let response = self
            .client
            .post(url, Some((self.job_template.clone(), XML_CONTENT_TYPE)))
            .await?;

        if !response.status.is_success() {
            return Err(BuildError::JobCreation {
                job: job.to_string(),
                status: response.status.as_u16(),
            });
        }
        Ok(JobPresence::Created)
    }

    /// Fetches the job's current `config.xml`
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::Api`] unless Jenkins answers 200.
    pub async fn fetch_config(&self, job: &str) -> Result<JobConfig, BuildError> {
        let url = self.client.job_endpoint(job, &["config.xml"])?;
        let response = self.client.get(url.clone()).await?;
        if response.status != StatusCode::OK {
            return Err(unexpected(response.status, &url).into());
        }
        tracing::debug!(job = %job, bytes = response.body.len(), "Fetched job configuration");
        Ok(JobConfig::new(response.body))
    }

    /// Uploads a new `config.xml`
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::ConfigUpload`] on a non-2xx response.
    pub async fn upload_config(&self, job: &str, config: String) -> Result<(), BuildError> {
        let url = self.client.job_endpoint(job, &["config.xml"])?;
        let response = self.client.post(url, Some((config, XML_CONTENT_TYPE))).await?;
        if !response.status.is_success() {
            return Err(BuildError::ConfigUpload {
                job: job.to_string(),
                status: response.status.as_u16(),
            });
        }
        tracing::info!(job = %job, "Uploaded pipeline script");
        Ok(())
    }

    /// Returns whether the job declares build parameters
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::MetadataDecode`] when the metadata JSON does not
    /// decode; an undecodable document is never treated as "no parameters".
    pub async fn is_parameterized(&self, job: &str) -> Result<bool, BuildError> {
        let url = self.client.job_endpoint(job, &["api", "json"])?;
        let response = self.client.get(url.clone()).await?;
        if response.status != StatusCode::OK {
            return Err(unexpected(response.status, &url).into());
        }
        let metadata: JobMetadata =
            serde_json::from_str(&response.body).map_err(|e| BuildError::MetadataDecode {
                job: job.to_string(),
                reason: e.to_string(),
            })?;
        Ok(metadata.is_parameterized())
    }

    /// Triggers a build and returns its queue item
    ///
    /// Parameterized jobs are refused before any trigger request is sent.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::UnsupportedParameterizedJob`] for parameterized
    /// jobs and [`BuildError::Trigger`] when the trigger is not accepted.
    pub async fn trigger_build(&self, job: &str) -> Result<QueueItem, BuildError> {
        if self.is_parameterized(job).await? {
            return Err(BuildError::UnsupportedParameterizedJob {
                job: job.to_string(),
            });
        }

        let mut url = self.client.job_endpoint(job, &["build"])?;
        url.query_pairs_mut().append_pair("delay", "0sec");

        let trigger_error = |reason: String| BuildError::Trigger {
            job: job.to_string(),
            reason,
        };

        let response = match self.client.post(url, None).await {
            Ok(response) => response,
            Err(ApiError::Connection { reason, .. }) => return Err(trigger_error(reason)),
            Err(e) => return Err(e.into()),
        };

        if response.status != StatusCode::CREATED {
            return Err(trigger_error(format!(
                "expected HTTP 201, got {}",
                response.status.as_u16()
            )));
        }

        let location = response
            .header("Location")
            .filter(|location| !location.is_empty())
            .ok_or_else(|| trigger_error("response has no Location header".to_string()))?;

        tracing::info!(job = %job, queue = %location, "Build queued");
        Ok(QueueItem::new(location))
    }

    /// Polls a queue item until it turns into a running build
    ///
    /// Returns on the first poll whose `why` is empty and whose
    /// `executable.url` is set. `item.reason` tracks the last reported `why`.
    /// Transport failures use up an attempt; auth failures abort immediately.
    ///
    /// # Errors
    ///
    /// Returns [`BuildError::QueuePollTimeout`] when the attempt budget or the
    /// deadline runs out, and [`BuildError::QueueItemCancelled`] if the item
    /// is cancelled on the server.
    pub async fn poll_queue(&self, item: &mut QueueItem) -> Result<BuildReference, BuildError> {
        let url = self.client.resolve(&item.api_url())?;
        let started = Instant::now();
        let mut attempts = 0;

        while attempts < self.policy.max_attempts {
            if self
                .policy
                .deadline
                .is_some_and(|deadline| started.elapsed() >= deadline)
            {
                break;
            }
            if attempts > 0 && !self.policy.interval.is_zero() {
                tokio::time::sleep(self.policy.interval).await;
            }
            attempts += 1;

            let response = match self.client.get(url.clone()).await {
                Ok(response) => response,
                Err(e) if e.is_fatal() => return Err(e.into()),
                Err(e) => {
                    tracing::warn!(attempt = attempts, error = %e, "Queue poll failed");
                    continue;
                }
            };

            if response.status != StatusCode::OK {
                tracing::warn!(
                    attempt = attempts,
                    status = response.status.as_u16(),
                    "Unexpected queue poll status"
                );
                continue;
            }

            let status = decode_queue_status(&response, &url)?;
            if status.cancelled {
                return Err(BuildError::QueueItemCancelled {
                    location: item.location.clone(),
                });
            }

            match status.why.filter(|why| !why.is_empty()) {
                Some(reason) => {
                    tracing::debug!(attempt = attempts, reason = %reason, "Build still queued");
                    item.reason = Some(reason.clone());
                    self.report(BuildStage::Queued { reason });
                }
                None => {
                    item.reason = None;
                    let build_url = status
                        .executable
                        .and_then(|executable| executable.url)
                        .filter(|url| !url.is_empty());
                    if let Some(build_url) = build_url {
                        tracing::info!(attempt = attempts, build = %build_url, "Build left the queue");
                        return Ok(BuildReference::new(build_url));
                    }
                    tracing::debug!(attempt = attempts, "Queue item has no executable yet");
                }
            }
        }

        Err(BuildError::QueuePollTimeout {
            attempts,
            location: item.location.clone(),
        })
    }

    fn create_item_url(&self, job: &str) -> Result<Url, ApiError> {
        let job = job.trim_matches('/');
        let (mut url, name) = match job.rsplit_once('/') {
            Some((folder, name)) => (self.client.job_endpoint(folder, &["createItem"])?, name),
            None => (self.client.endpoint(&["createItem"])?, job),
        };
        url.query_pairs_mut()
            .append_pair("name", name)
            .append_pair("mode", "create");
        Ok(url)
    }

    fn report(&self, stage: BuildStage) {
        if let Some(progress) = &self.progress {
            // The receiver may already be gone when the user quit.
            let _ = progress.send(stage);
        }
    }
}

fn decode_queue_status(response: &HttpResponse, url: &Url) -> Result<QueueItemStatus, ApiError> {
    serde_json::from_str(&response.body).map_err(|e| ApiError::Decode {
        url: url.to_string(),
        reason: e.to_string(),
    })
}

fn unexpected(status: StatusCode, url: &Url) -> ApiError {
    ApiError::UnexpectedStatus {
        status: status.as_u16(),
        url: url.to_string(),
    }
}
