//! Progressive console streaming
//!
//! Jenkins' `logText/progressiveText` endpoint returns the whole log produced
//! so far plus an `X-More-Data` header. The streamer turns those snapshots
//! into incremental chunks. It never sleeps; pacing is the caller's job.

use http::StatusCode;
use url::Url;

use super::delta::{DeltaKind, LogDelta, compute_delta, strip_pipeline_markers};
use crate::build::BuildReference;
use crate::jenkins::{ApiError, JenkinsClient};

const MORE_DATA_HEADER: &str = "X-More-Data";

/// Accumulated console output of one build
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConsoleLogState {
    accumulated: String,
    complete: bool,
}

impl ConsoleLogState {
    /// Filtered text seen so far
    #[must_use]
    pub fn accumulated_text(&self) -> &str {
        &self.accumulated
    }

    /// Whether the build has finished producing output
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    fn advance(&mut self, snapshot: ProgressiveSnapshot) -> LogDelta {
        self.accumulated = snapshot.full_text;
        self.complete = snapshot.complete;
        snapshot.delta
    }
}

/// Result of one progressive fetch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProgressiveSnapshot {
    /// Filtered full text returned by this fetch, cut after the last line
    /// break while the build is still running
    pub full_text: String,
    /// What changed since the previous snapshot
    pub delta: LogDelta,
    /// True when `X-More-Data` is absent or not `true`
    pub complete: bool,
}

/// Chunk handed to the renderer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogChunk {
    /// New text to display
    pub text: String,
    /// The chunk replaces everything shown so far
    pub replaced: bool,
    /// The build has finished; no more chunks follow
    pub complete: bool,
}

/// URL of the progressive console endpoint of a build
///
/// # Errors
///
/// Returns [`ApiError::InvalidUrl`] if the build URL does not parse.
pub fn progressive_text_url(
    client: &JenkinsClient,
    build: &BuildReference,
) -> Result<Url, ApiError> {
    let base = client.resolve(&build.base())?;
    base.join("logText/progressiveText")
        .map_err(|e| ApiError::InvalidUrl {
            url: build.url().to_string(),
            reason: e.to_string(),
        })
}

/// Fetches the console once and diffs it against `previous_full_text`
///
/// # Errors
///
/// Returns [`ApiError`] on transport failure, rejected credentials, or any
/// status other than 200.
pub async fn fetch_progressive(
    client: &JenkinsClient,
    build: &BuildReference,
    previous_full_text: &str,
    filter_markers: bool,
) -> Result<ProgressiveSnapshot, ApiError> {
    let url = progressive_text_url(client, build)?;
    let response = client.get(url.clone()).await?;
    if response.status != StatusCode::OK {
        return Err(ApiError::UnexpectedStatus {
            status: response.status.as_u16(),
            url: url.to_string(),
        });
    }

    let complete = response.header(MORE_DATA_HEADER) != Some("true");
    let mut body = response.body;
    if !complete {
        body.truncate(terminated_len(&body));
    }
    let full_text = if filter_markers {
        strip_pipeline_markers(&body)
    } else {
        body
    };
    let delta = compute_delta(previous_full_text, &full_text);

    Ok(ProgressiveSnapshot {
        full_text,
        delta,
        complete,
    })
}

/// Length of `text` up to and including its last line break
///
/// A running build's snapshot may end inside a line; that fragment is left
/// for the next fetch, which returns it again in full.
fn terminated_len(text: &str) -> usize {
    text.rfind('\n').map_or(0, |newline| newline + 1)
}

/// Streams one build's console as incremental chunks
///
/// The streamer owns its [`ConsoleLogState`]; a fetch takes `&mut self`, so
/// two fetches for the same build can never overlap.
#[derive(Debug)]
pub struct LogStreamer {
    client: JenkinsClient,
    build: BuildReference,
    state: ConsoleLogState,
    filter_markers: bool,
}

impl LogStreamer {
    /// Creates a streamer that filters `[Pipeline]` marker lines
    #[must_use]
    pub fn new(client: JenkinsClient, build: BuildReference) -> Self {
        Self {
            client,
            build,
            state: ConsoleLogState::default(),
            filter_markers: true,
        }
    }

    /// Enables or disables marker filtering
    #[must_use]
    pub fn with_marker_filter(mut self, enabled: bool) -> Self {
        self.filter_markers = enabled;
        self
    }

    /// The build being streamed
    #[must_use]
    pub fn build(&self) -> &BuildReference {
        &self.build
    }

    /// Current accumulated state
    #[must_use]
    pub fn state(&self) -> &ConsoleLogState {
        &self.state
    }

    /// Fetches the next chunk
    ///
    /// Once the log is complete this returns an empty, complete chunk without
    /// touching the network. On error the state is left unchanged so the
    /// next call diffs against the last good snapshot.
    ///
    /// # Errors
    ///
    /// See [`fetch_progressive`].
    pub async fn fetch_next(&mut self) -> Result<LogChunk, ApiError> {
        if self.state.is_complete() {
            return Ok(LogChunk {
                text: String::new(),
                replaced: false,
                complete: true,
            });
        }

        let snapshot = fetch_progressive(
            &self.client,
            &self.build,
            self.state.accumulated_text(),
            self.filter_markers,
        )
        .await?;
        let complete = snapshot.complete;
        let delta = self.state.advance(snapshot);

        if delta.kind == DeltaKind::Replaced {
            tracing::warn!(
                build = %self.build,
                "Console log no longer extends the previous snapshot; replacing output"
            );
        }
        tracing::debug!(
            build = %self.build,
            bytes = delta.text.len(),
            complete,
            "Fetched console output"
        );

        Ok(LogChunk {
            text: delta.text,
            replaced: delta.kind == DeltaKind::Replaced,
            complete,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::jenkins::ServerSession;
    use crate::jenkins::testing::ScriptedTransport;
    use pretty_assertions::assert_eq;

    fn streamer(transport: &Arc<ScriptedTransport>) -> LogStreamer {
        let session = ServerSession::new("http://host", "alice", "secret").unwrap();
        let client = JenkinsClient::new(session, transport.clone());
        LogStreamer::new(client, BuildReference::new("http://host/job/demo/7/"))
    }

    #[tokio::test]
    async fn test_deltas_and_completion() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .respond_with_headers(200, &[("X-More-Data", "true")], "[Pipeline] start\nA\n")
            .respond(200, "[Pipeline] start\nA\nB\n");
        let mut streamer = streamer(&transport);

        let first = streamer.fetch_next().await.unwrap();
        assert_eq!(first.text, "A\n");
        assert!(!first.complete);

        let second = streamer.fetch_next().await.unwrap();
        assert_eq!(second.text, "B\n");
        assert!(second.complete);

        assert_eq!(streamer.state().accumulated_text(), "A\nB\n");
        assert!(streamer.state().is_complete());
        assert_eq!(
            transport.request_lines(),
            vec![
                "GET http://host/job/demo/7/logText/progressiveText",
                "GET http://host/job/demo/7/logText/progressiveText",
            ]
        );
    }

    #[tokio::test]
    async fn test_complete_state_is_terminal() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(200, "done\n");
        let mut streamer = streamer(&transport);

        streamer.fetch_next().await.unwrap();
        let again = streamer.fetch_next().await.unwrap();
        assert_eq!(again.text, "");
        assert!(again.complete);
        assert_eq!(transport.requests().len(), 1);
    }

    #[tokio::test]
    async fn test_more_data_must_be_true() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond_with_headers(200, &[("X-More-Data", "false")], "x\n");
        let mut streamer = streamer(&transport);

        assert!(streamer.fetch_next().await.unwrap().complete);
    }

    #[tokio::test]
    async fn test_error_leaves_state_unchanged() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .respond_with_headers(200, &[("X-More-Data", "true")], "A\n")
            .fail("connection reset")
            .respond_with_headers(200, &[("X-More-Data", "true")], "A\nB\n");
        let mut streamer = streamer(&transport);

        streamer.fetch_next().await.unwrap();
        let err = streamer.fetch_next().await.unwrap_err();
        assert!(err.is_connection());
        assert_eq!(streamer.state().accumulated_text(), "A\n");

        let chunk = streamer.fetch_next().await.unwrap();
        assert_eq!(chunk.text, "B\n");
    }

    #[tokio::test]
    async fn test_unexpected_status() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(404, "");
        let mut streamer = streamer(&transport);

        let err = streamer.fetch_next().await.unwrap_err();
        assert!(matches!(err, ApiError::UnexpectedStatus { status: 404, .. }));
        assert!(!streamer.state().is_complete());
    }

    #[tokio::test]
    async fn test_unfiltered_stream() {
        let transport = Arc::new(ScriptedTransport::new());
        transport.respond(200, "[Pipeline] node\nA\n");
        let mut streamer = streamer(&transport).with_marker_filter(false);

        let chunk = streamer.fetch_next().await.unwrap();
        assert_eq!(chunk.text, "[Pipeline] node\nA\n");
    }

    #[tokio::test]
    async fn test_rewritten_log_is_flagged() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .respond_with_headers(200, &[("X-More-Data", "true")], "A\n")
            .respond_with_headers(200, &[("X-More-Data", "true")], "Z\nA\n");
        let mut streamer = streamer(&transport);

        streamer.fetch_next().await.unwrap();
        let chunk = streamer.fetch_next().await.unwrap();
        assert!(chunk.replaced);
        assert_eq!(chunk.text, "Z\nA\n");
    }

    #[tokio::test]
    async fn test_partial_marker_line_is_held_back() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .respond_with_headers(200, &[("X-More-Data", "true")], "A\n[Pipel")
            .respond(200, "A\n[Pipeline] sh\nB\n");
        let mut streamer = streamer(&transport);

        let first = streamer.fetch_next().await.unwrap();
        assert_eq!(first.text, "A\n");
        assert_eq!(streamer.state().accumulated_text(), "A\n");

        let second = streamer.fetch_next().await.unwrap();
        assert!(!second.replaced);
        assert_eq!(second.text, "B\n");
        assert!(second.complete);
    }

    #[tokio::test]
    async fn test_partial_line_appears_once_terminated() {
        let transport = Arc::new(ScriptedTransport::new());
        transport
            .respond_with_headers(200, &[("X-More-Data", "true")], "Build")
            .respond_with_headers(200, &[("X-More-Data", "true")], "Building\nSte")
            .respond(200, "Building\nStep 1");
        let mut streamer = streamer(&transport);

        assert_eq!(streamer.fetch_next().await.unwrap().text, "");
        assert_eq!(streamer.fetch_next().await.unwrap().text, "Building\n");
        let last = streamer.fetch_next().await.unwrap();
        assert_eq!(last.text, "Step 1");
        assert!(!last.replaced);
        assert!(last.complete);
    }

    #[test]
    fn test_terminated_len() {
        assert_eq!(terminated_len(""), 0);
        assert_eq!(terminated_len("abc"), 0);
        assert_eq!(terminated_len("a\nb"), 2);
        assert_eq!(terminated_len("a\nb\n"), 4);
    }

    #[test]
    fn test_progressive_url_without_trailing_slash() {
        let transport = Arc::new(ScriptedTransport::new());
        let session = ServerSession::new("http://host", "alice", "secret").unwrap();
        let client = JenkinsClient::new(session, transport);
        let url =
            progressive_text_url(&client, &BuildReference::new("http://host/job/demo/7")).unwrap();
        assert_eq!(url.as_str(), "http://host/job/demo/7/logText/progressiveText");
    }
}
