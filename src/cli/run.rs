//! `jcli run` and `jcli follow`
//!
//! `run` reads a pipeline script, installs it into the job named after the
//! file and follows the resulting build. `follow` attaches to a build that
//! is already running.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};

use jcli::build::{BuildOrchestrator, BuildReference};
use jcli::session::{
    DriverSettings, LaunchPlan, SessionDriver, SessionOutcome, SessionSummary, run_plain, run_tui,
};

use super::Target;

const SCRIPT_EXTENSIONS: [&str; 2] = ["groovy", "gvy"];
const JENKINSFILE: &str = "Jenkinsfile";

/// Options of `jcli run`
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Pipeline script to install
    pub file: PathBuf,
    /// Job name override
    pub job: Option<String>,
    /// Use the full-screen view
    pub tui: bool,
    /// Drop `[Pipeline]` marker lines
    pub filter_markers: bool,
}

/// Whether the file looks like a pipeline script
pub fn is_pipeline_script(path: &Path) -> bool {
    let is_jenkinsfile = path
        .file_name()
        .and_then(|name| name.to_str())
        .is_some_and(|name| name.starts_with(JENKINSFILE));
    let has_extension = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| SCRIPT_EXTENSIONS.contains(&ext));
    is_jenkinsfile || has_extension
}

/// Job name derived from the script's file name without extension
///
/// # Errors
///
/// Returns an error if the path has no usable file name.
pub fn job_name_from_path(path: &Path) -> Result<String> {
    path.file_stem()
        .and_then(|stem| stem.to_str())
        .filter(|stem| !stem.is_empty())
        .map(str::to_string)
        .with_context(|| format!("Cannot derive a job name from {}", path.display()))
}

/// Installs the script, builds the job and follows the build
///
/// # Errors
///
/// Returns an error if the script cannot be read, no credentials are
/// stored, or the session ends in failure.
pub async fn run_pipeline(target: &Target, options: RunOptions) -> Result<()> {
    if !options.file.is_file() {
        bail!("Pipeline script not found: {}", options.file.display());
    }
    if !is_pipeline_script(&options.file) {
        tracing::warn!(
            file = %options.file.display(),
            "File is not a .groovy, .gvy or Jenkinsfile script"
        );
        eprintln!(
            "Warning: {} does not look like a pipeline script",
            options.file.display()
        );
    }

    let script = std::fs::read_to_string(&options.file)
        .with_context(|| format!("Failed to read {}", options.file.display()))?;
    let job = match options.job {
        Some(job) => job,
        None => job_name_from_path(&options.file)?,
    };

    let client = target.client()?;
    let orchestrator = BuildOrchestrator::new(client.clone())
        .with_poll_policy(target.config.poll_policy())
        .with_job_template(target.config.job_template()?);
    let plan = LaunchPlan {
        orchestrator,
        job,
        script,
    };

    let driver = SessionDriver::launch(client, plan, settings(target, options.filter_markers));
    let summary = run_session(driver, options.tui).await?;
    report(summary)
}

/// Streams the console of an existing build
///
/// # Errors
///
/// Returns an error if no credentials are stored or streaming fails.
pub async fn follow_build(target: &Target, url: &str, tui: bool, filter_markers: bool) -> Result<()> {
    let client = target.client()?;
    let build = BuildReference::new(url);
    let driver = SessionDriver::follow(client, build, settings(target, filter_markers));
    let summary = run_session(driver, tui).await?;
    report(summary)
}

fn settings(target: &Target, filter_markers: bool) -> DriverSettings {
    DriverSettings {
        fetch_interval: target.config.log_poll_interval(),
        filter_markers,
    }
}

async fn run_session(driver: SessionDriver, tui: bool) -> Result<SessionSummary> {
    if tui {
        run_tui(driver).await
    } else {
        run_plain(driver, &mut std::io::stdout(), &mut std::io::stderr()).await
    }
}

fn report(summary: SessionSummary) -> Result<()> {
    match summary.outcome {
        SessionOutcome::Finished => {
            if let Some(build) = summary.build {
                eprintln!("Build finished: {}", build.console_url());
            }
            Ok(())
        }
        SessionOutcome::Cancelled => {
            if let Some(build) = summary.build {
                eprintln!("Stopped following {}", build.console_url());
            }
            Ok(())
        }
        SessionOutcome::Failed(reason) => bail!(reason),
    }
}
