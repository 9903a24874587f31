//! # jcli - push a pipeline script to Jenkins and watch it run
//!
//! jcli installs a local pipeline script into a Jenkins job, triggers a
//! build, waits for it to leave the queue and streams its console output.
//!
//! ## Layers
//!
//! - [`jenkins`]: authenticated HTTP client over a swappable [`Transport`]
//! - [`build`]: `config.xml` patching and the build orchestrator
//! - [`console`]: progressive console fetching and delta computation
//! - [`session`]: the session state machine with full-screen and plain runtimes
//! - [`infrastructure`]: configuration, logging, credentials, browser opener
//!
//! ## Example
//!
//! ```no_run
//! use std::time::Duration;
//!
//! use jcli::{BuildOrchestrator, JenkinsClient, LogStreamer, ServerSession};
//!
//! # async fn demo() -> anyhow::Result<()> {
//! let session = ServerSession::new("https://ci.example.com", "alice", "api-token")?;
//! let client = JenkinsClient::with_timeout(session, Duration::from_secs(30))?;
//!
//! let build = BuildOrchestrator::new(client.clone())
//!     .launch("demo", "pipeline { agent any; stages { stage('x') { steps { echo 'hi' } } } }")
//!     .await?;
//!
//! let mut streamer = LogStreamer::new(client, build);
//! loop {
//!     let chunk = streamer.fetch_next().await?;
//!     print!("{}", chunk.text);
//!     if chunk.complete {
//!         break;
//!     }
//!     tokio::time::sleep(Duration::from_secs(3)).await;
//! }
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

pub mod build;
pub mod console;
pub mod infrastructure;
pub mod jenkins;
pub mod session;

// Re-export commonly used types
pub use build::{
    BuildError, BuildOrchestrator, BuildReference, BuildStage, PatchError, PollPolicy, QueueItem,
    patch_pipeline_script,
};
pub use console::{LogChunk, LogStreamer, compute_delta, strip_pipeline_markers};
pub use infrastructure::{Config, CredentialStore, FileCredentialStore};
pub use jenkins::{ApiError, JenkinsClient, ServerSession, Transport};
pub use session::{SessionDriver, SessionOutcome, SessionSummary};

/// Version of the jcli crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
