//! Session state machine
//!
//! The driver owns everything the screen shows and decides what network
//! work runs next. It never performs I/O itself: the runtime asks for the
//! next [`Work`] item, runs it wherever it likes, and feeds the resulting
//! [`Outcome`] back. Only one work item is in flight at a time, which keeps
//! console fetches for a build strictly sequential.
//!
//! ```text
//! AwaitingBuildUrl --Launched(Ok)--> Streaming --complete--> Done
//!        |                               |
//!        +--Launched(Err)--> Failed <----+ (auth rejected)
//!
//! any phase --Quit--> Quit
//! ```

use std::time::Duration;

use tokio::sync::mpsc::{UnboundedReceiver, unbounded_channel};

use crate::build::{BuildError, BuildOrchestrator, BuildReference, BuildStage};
use crate::console::{LogChunk, LogStreamer};
use crate::jenkins::{ApiError, JenkinsClient};

use super::view::LogView;

/// Pause between console fetches while a build is running
pub const DEFAULT_FETCH_INTERVAL: Duration = Duration::from_secs(3);

/// Where the session is
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Waiting for the orchestrator to hand over a running build
    AwaitingBuildUrl,
    /// Fetching console output
    Streaming,
    /// The build finished and its whole log is shown
    Done,
    /// Orchestration or streaming failed for good
    Failed,
    /// The user asked to leave
    Quit,
}

/// User intent decoded from a key press
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    /// Scroll towards older output by this many lines
    ScrollUp(usize),
    /// Scroll towards newer output by this many lines
    ScrollDown(usize),
    /// Scroll one screen up
    PageUp,
    /// Scroll one screen down
    PageDown,
    /// Show the first line
    JumpToTop,
    /// Show the newest line and resume following
    JumpToBottom,
    /// Flip auto-follow
    ToggleFollow,
    /// Open the build's console page in a browser
    OpenInBrowser,
    /// Leave the session
    Quit,
}

/// Side effect the runtime performs on the driver's behalf
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Open this URL in the user's browser
    OpenBrowser(String),
}

/// Everything needed to start the build
#[derive(Debug, Clone)]
pub struct LaunchPlan {
    /// Orchestrator bound to the target server
    pub orchestrator: BuildOrchestrator,
    /// Job to run
    pub job: String,
    /// Pipeline script to install
    pub script: String,
}

/// Network work requested by the driver
#[derive(Debug)]
pub enum Work {
    /// Run the orchestrator until the build is running
    Launch(LaunchPlan),
    /// Wait `delay`, then fetch the next console chunk
    Fetch {
        /// Streamer of the build, moved out of the driver while in flight
        streamer: LogStreamer,
        /// Pause before the request
        delay: Duration,
    },
}

impl Work {
    /// Performs the work and packages the result
    pub async fn run(self) -> Outcome {
        match self {
            Self::Launch(plan) => {
                Outcome::Launched(plan.orchestrator.launch(&plan.job, &plan.script).await)
            }
            Self::Fetch {
                mut streamer,
                delay,
            } => {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                let result = streamer.fetch_next().await;
                Outcome::Fetched { streamer, result }
            }
        }
    }
}

/// Result of a [`Work`] item, or an intermediate progress report
#[derive(Debug)]
pub enum Outcome {
    /// The orchestrator moved to a new stage
    Progress(BuildStage),
    /// [`Work::Launch`] finished
    Launched(Result<BuildReference, BuildError>),
    /// [`Work::Fetch`] finished; the streamer is handed back
    Fetched {
        /// The streamer that performed the fetch
        streamer: LogStreamer,
        /// Chunk or fetch error
        result: Result<LogChunk, ApiError>,
    },
}

/// Tunables of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverSettings {
    /// Pause between console fetches after the first one
    pub fetch_interval: Duration,
    /// Drop `[Pipeline]` marker lines
    pub filter_markers: bool,
}

impl Default for DriverSettings {
    fn default() -> Self {
        Self {
            fetch_interval: DEFAULT_FETCH_INTERVAL,
            filter_markers: true,
        }
    }
}

/// Severity of the status line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(missing_docs)]
pub enum StatusLevel {
    Info,
    Warning,
    Error,
}

/// One-line message shown under the console
#[derive(Debug, Clone, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct Status {
    pub level: StatusLevel,
    pub message: String,
}

/// How the session ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionOutcome {
    /// The build's whole log was received
    Finished,
    /// Something failed and the session could not continue
    Failed(String),
    /// The user left before the log was complete
    Cancelled,
}

/// What the caller needs once the session is over
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    /// The build, if the launch got that far
    pub build: Option<BuildReference>,
    /// Final result
    pub outcome: SessionOutcome,
}

/// The session state machine
#[derive(Debug)]
pub struct SessionDriver {
    client: JenkinsClient,
    title: String,
    settings: DriverSettings,
    plan: Option<LaunchPlan>,
    phase: Phase,
    build: Option<BuildReference>,
    streamer: Option<LogStreamer>,
    in_flight: bool,
    fetches: u64,
    stage: Option<BuildStage>,
    view: LogView,
    status: Option<Status>,
    failure: Option<String>,
    finished: bool,
}

impl SessionDriver {
    /// Creates a session that first launches the build described by `plan`
    #[must_use]
    pub fn launch(client: JenkinsClient, plan: LaunchPlan, settings: DriverSettings) -> Self {
        let title = plan.job.clone();
        Self::with_plan(client, title, settings, Some(plan))
    }

    /// Creates a session that streams a build which is already running
    #[must_use]
    pub fn follow(client: JenkinsClient, build: BuildReference, settings: DriverSettings) -> Self {
        let title = build.url().to_string();
        let mut driver = Self::with_plan(client, title, settings, None);
        driver.start_streaming(build);
        driver
    }

    fn with_plan(
        client: JenkinsClient,
        title: String,
        settings: DriverSettings,
        plan: Option<LaunchPlan>,
    ) -> Self {
        Self {
            client,
            title,
            settings,
            plan,
            phase: Phase::AwaitingBuildUrl,
            build: None,
            streamer: None,
            in_flight: false,
            fetches: 0,
            stage: None,
            view: LogView::new(),
            status: None,
            failure: None,
            finished: false,
        }
    }

    /// Routes orchestrator progress into a channel the runtime can watch
    ///
    /// Returns `None` when the session has nothing to launch.
    pub fn progress_channel(&mut self) -> Option<UnboundedReceiver<BuildStage>> {
        let plan = self.plan.take()?;
        let (tx, rx) = unbounded_channel();
        self.plan = Some(LaunchPlan {
            orchestrator: plan.orchestrator.with_progress(tx),
            ..plan
        });
        Some(rx)
    }

    /// Current phase
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Job name, or the build URL when following
    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    /// The running build, once known
    #[must_use]
    pub fn build(&self) -> Option<&BuildReference> {
        self.build.as_ref()
    }

    /// Latest orchestration stage, while waiting for the build
    #[must_use]
    pub fn stage(&self) -> Option<&BuildStage> {
        self.stage.as_ref()
    }

    /// Console view
    #[must_use]
    pub fn view(&self) -> &LogView {
        &self.view
    }

    /// Console view, for viewport updates from the renderer
    pub fn view_mut(&mut self) -> &mut LogView {
        &mut self.view
    }

    /// Status line, if any
    #[must_use]
    pub fn status(&self) -> Option<&Status> {
        self.status.as_ref()
    }

    /// Whether a work item is running
    #[must_use]
    pub fn is_busy(&self) -> bool {
        self.in_flight
    }

    /// Whether the user asked to leave
    #[must_use]
    pub fn is_quit(&self) -> bool {
        self.phase == Phase::Quit
    }

    /// Next work item, if one should start now
    ///
    /// Returns `None` while another item is in flight and in every phase
    /// that needs no network.
    pub fn next_work(&mut self) -> Option<Work> {
        if self.in_flight {
            return None;
        }
        let work = match self.phase {
            Phase::AwaitingBuildUrl => Work::Launch(self.plan.clone()?),
            Phase::Streaming => {
                let streamer = self.streamer.take()?;
                let delay = if self.fetches == 0 {
                    Duration::ZERO
                } else {
                    self.settings.fetch_interval
                };
                Work::Fetch { streamer, delay }
            }
            Phase::Done | Phase::Failed | Phase::Quit => return None,
        };
        self.in_flight = true;
        Some(work)
    }

    /// Applies the result of a work item
    ///
    /// Results that arrive after the user quit are dropped.
    pub fn on_outcome(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Progress(stage) => {
                if self.phase == Phase::AwaitingBuildUrl {
                    self.stage = Some(stage);
                }
            }
            Outcome::Launched(result) => {
                self.in_flight = false;
                if self.is_quit() {
                    return;
                }
                match result {
                    Ok(build) => self.start_streaming(build),
                    Err(e) => {
                        tracing::error!(job = %self.title, error = %e, "Build launch failed");
                        self.fail(e.to_string());
                    }
                }
            }
            Outcome::Fetched { streamer, result } => {
                self.in_flight = false;
                if self.is_quit() {
                    return;
                }
                self.fetches += 1;
                self.streamer = Some(streamer);
                match result {
                    Ok(chunk) => self.apply_chunk(chunk),
                    Err(e) if e.is_fatal() => {
                        tracing::error!(error = %e, "Console streaming rejected");
                        self.fail(e.to_string());
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "Console fetch failed, retrying");
                        self.set_status(StatusLevel::Warning, format!("{e}; retrying"));
                    }
                }
            }
        }
    }

    /// Applies a user action and returns any side effect to perform
    pub fn on_action(&mut self, action: Action) -> Option<Effect> {
        match action {
            Action::ScrollUp(lines) => self.view.scroll_up(lines),
            Action::ScrollDown(lines) => self.view.scroll_down(lines),
            Action::PageUp => self.view.page_up(),
            Action::PageDown => self.view.page_down(),
            Action::JumpToTop => self.view.jump_to_top(),
            Action::JumpToBottom => self.view.jump_to_bottom(),
            Action::ToggleFollow => self.view.toggle_follow(),
            Action::OpenInBrowser => {
                return match &self.build {
                    Some(build) => Some(Effect::OpenBrowser(build.console_url())),
                    None => {
                        self.set_status(StatusLevel::Info, "No build to open yet".to_string());
                        None
                    }
                };
            }
            Action::Quit => {
                tracing::debug!(phase = ?self.phase, "Session quit requested");
                self.phase = Phase::Quit;
            }
        }
        None
    }

    /// Records the result of an [`Effect`] performed by the runtime
    pub fn on_effect_result(&mut self, effect: &Effect, result: Result<(), String>) {
        let Effect::OpenBrowser(url) = effect;
        match result {
            Ok(()) => self.set_status(StatusLevel::Info, format!("Opened {url}")),
            Err(reason) => {
                tracing::warn!(url = %url, reason = %reason, "Could not open browser");
                self.set_status(
                    StatusLevel::Warning,
                    format!("Could not open browser: {reason}"),
                );
            }
        }
    }

    /// How the session ended so far
    #[must_use]
    pub fn summary(&self) -> SessionSummary {
        let outcome = match (&self.failure, self.finished) {
            (Some(reason), _) => SessionOutcome::Failed(reason.clone()),
            (None, true) => SessionOutcome::Finished,
            (None, false) => SessionOutcome::Cancelled,
        };
        SessionSummary {
            build: self.build.clone(),
            outcome,
        }
    }

    fn start_streaming(&mut self, build: BuildReference) {
        tracing::info!(build = %build, "Streaming console output");
        let streamer = LogStreamer::new(self.client.clone(), build.clone())
            .with_marker_filter(self.settings.filter_markers);
        self.stage = None;
        self.status = None;
        self.streamer = Some(streamer);
        self.fetches = 0;
        self.build = Some(build);
        self.phase = Phase::Streaming;
    }

    fn apply_chunk(&mut self, chunk: LogChunk) {
        if chunk.replaced {
            self.view.replace(&chunk.text);
            self.set_status(
                StatusLevel::Warning,
                "Console log was rewritten on the server; showing full output".to_string(),
            );
        } else {
            self.view.append(&chunk.text);
            if self
                .status
                .as_ref()
                .is_some_and(|status| status.level == StatusLevel::Warning)
            {
                self.status = None;
            }
        }

        if chunk.complete {
            self.finished = true;
            self.phase = Phase::Done;
            self.set_status(StatusLevel::Info, "Build finished".to_string());
        }
    }

    fn fail(&mut self, reason: String) {
        self.set_status(StatusLevel::Error, reason.clone());
        self.failure = Some(reason);
        self.phase = Phase::Failed;
    }

    fn set_status(&mut self, level: StatusLevel, message: String) {
        self.status = Some(Status { level, message });
    }
}

/// Receives from an optional progress channel, pending forever without one
pub(crate) async fn recv_progress(
    progress: &mut Option<UnboundedReceiver<BuildStage>>,
) -> Option<BuildStage> {
    match progress {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}
