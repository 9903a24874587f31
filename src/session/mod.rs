//! Interactive session
//!
//! Couples the build orchestrator and the console streamer to a screen.
//! [`SessionDriver`] is the pure state machine; [`run_tui`] and
//! [`run_plain`] are the two runtimes that execute its work.

mod driver;
mod plain;
mod tui;
mod view;

pub use driver::{
    Action, DEFAULT_FETCH_INTERVAL, DriverSettings, Effect, LaunchPlan, Outcome, Phase,
    SessionDriver, SessionOutcome, SessionSummary, Status, StatusLevel, Work,
};
pub use plain::run_plain;
pub use tui::{action_for_key, run_tui};
pub use view::LogView;
