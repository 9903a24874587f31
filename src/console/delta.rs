//! Console text filtering and diffing

use once_cell::sync::Lazy;
use regex::Regex;

/// Whole lines starting with `[Pipeline]`, including their line break
static PIPELINE_MARKER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^\[Pipeline\][^\n]*(?:\n|\z)").expect("marker pattern is valid"));

/// Removes Jenkins' `[Pipeline] ...` step-tracing lines
#[must_use]
pub fn strip_pipeline_markers(raw: &str) -> String {
    PIPELINE_MARKER.replace_all(raw, "").into_owned()
}

/// How a new snapshot relates to the previous one
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeltaKind {
    /// First snapshot; the delta is the whole text
    Initial,
    /// The new snapshot extends the previous one
    Appended,
    /// The new snapshot does not start with the previous one; the delta is
    /// the whole new text and replaces what was shown
    Replaced,
}

/// Output produced between two snapshots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogDelta {
    /// Newly produced text
    pub text: String,
    /// Relationship between the two snapshots
    pub kind: DeltaKind,
}

/// Computes what `current` adds on top of `previous`
///
/// Only a strict prefix relationship yields an append. Anything else is
/// reported as a full replacement instead of guessing which part is new.
#[must_use]
pub fn compute_delta(previous: &str, current: &str) -> LogDelta {
    if previous.is_empty() {
        return LogDelta {
            text: current.to_string(),
            kind: DeltaKind::Initial,
        };
    }
    match current.strip_prefix(previous) {
        Some(suffix) => LogDelta {
            text: suffix.to_string(),
            kind: DeltaKind::Appended,
        },
        None => LogDelta {
            text: current.to_string(),
            kind: DeltaKind::Replaced,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_strip_pipeline_markers() {
        let raw = "[Pipeline] Start of Pipeline\n[Pipeline] node\nRunning on agent\n[Pipeline] {\nhello [Pipeline] world\n[Pipeline] End of Pipeline";
        assert_eq!(
            strip_pipeline_markers(raw),
            "Running on agent\nhello [Pipeline] world\n"
        );
    }

    #[test]
    fn test_strip_keeps_crlf_lines() {
        assert_eq!(strip_pipeline_markers("[Pipeline] sh\r\nok\r\n"), "ok\r\n");
    }

    #[test]
    fn test_initial_delta_is_whole_text() {
        let delta = compute_delta("", "A\n");
        assert_eq!(delta.text, "A\n");
        assert_eq!(delta.kind, DeltaKind::Initial);
    }

    #[test]
    fn test_appended_delta_is_suffix() {
        let delta = compute_delta("A\n", "A\nB\n");
        assert_eq!(delta.text, "B\n");
        assert_eq!(delta.kind, DeltaKind::Appended);
    }

    #[test]
    fn test_repeated_text_is_not_dropped() {
        // A substring removal would also eat the second "A\n".
        let delta = compute_delta("A\n", "A\nA\n");
        assert_eq!(delta.text, "A\n");
        assert_eq!(delta.kind, DeltaKind::Appended);
    }

    #[test]
    fn test_non_prefix_is_replacement() {
        let delta = compute_delta("A\nB\n", "X\nA\nB\nC\n");
        assert_eq!(delta.text, "X\nA\nB\nC\n");
        assert_eq!(delta.kind, DeltaKind::Replaced);
    }

    #[test]
    fn test_unchanged_snapshot_is_empty_append() {
        let delta = compute_delta("A\n", "A\n");
        assert_eq!(delta.text, "");
        assert_eq!(delta.kind, DeltaKind::Appended);
    }
}
