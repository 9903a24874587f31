//! Line-oriented session runtime
//!
//! Used when stdout is not a terminal or `--plain` is given. Console text is
//! written to `out` as it arrives, progress goes to `err`, and Ctrl-C stops
//! following without waiting for the in-flight request.

use std::io::Write;

use anyhow::{Context, Result};

use super::driver::{Action, Outcome, SessionDriver, SessionSummary, recv_progress};

/// Runs the session without a terminal UI
///
/// # Errors
///
/// Returns an error if writing to `out` or `err` fails, or a work task
/// panics.
pub async fn run_plain<O, E>(
    mut driver: SessionDriver,
    out: &mut O,
    err: &mut E,
) -> Result<SessionSummary>
where
    O: Write,
    E: Write,
{
    let mut progress = driver.progress_channel();

    while let Some(work) = driver.next_work() {
        let mut task = tokio::spawn(work.run());
        let outcome = loop {
            tokio::select! {
                joined = &mut task => break joined.context("Session task failed")?,
                Some(stage) = recv_progress(&mut progress) => {
                    writeln!(err, "{stage}")?;
                }
                _ = tokio::signal::ctrl_c() => {
                    writeln!(err, "Interrupted")?;
                    driver.on_action(Action::Quit);
                    return Ok(driver.summary());
                }
            }
        };

        match &outcome {
            Outcome::Launched(Ok(build)) => writeln!(err, "Build started: {}", build.console_url())?,
            Outcome::Fetched {
                result: Ok(chunk), ..
            } => {
                if chunk.replaced {
                    writeln!(err, "Console log was rewritten on the server; full output follows")?;
                }
                out.write_all(chunk.text.as_bytes())?;
                out.flush()?;
            }
            Outcome::Fetched { result: Err(e), .. } if !e.is_fatal() => {
                writeln!(err, "{e}; retrying")?;
            }
            _ => {}
        }
        driver.on_outcome(outcome);
    }

    Ok(driver.summary())
}
