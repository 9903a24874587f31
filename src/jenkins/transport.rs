//! HTTP transport
//!
//! The wire layer underneath [`JenkinsClient`](super::JenkinsClient). The
//! client only ever sees [`HttpRequest`] / [`HttpResponse`], so tests can
//! swap the network for a scripted transport.

use std::time::Duration;

use async_trait::async_trait;
use http::{HeaderMap, Method, StatusCode};
use thiserror::Error;
use url::Url;

/// A fully built request
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// HTTP method
    pub method: Method,
    /// Absolute target URL
    pub url: Url,
    /// Request headers, including authorization
    pub headers: HeaderMap,
    /// Optional request body
    pub body: Option<String>,
}

/// A response with its body fully read
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// Status code
    pub status: StatusCode,
    /// Response headers
    pub headers: HeaderMap,
    /// Response body decoded as text
    pub body: String,
}

impl HttpResponse {
    /// Returns a header value if present and valid UTF-8
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }
}

/// Transport-level failure (no HTTP response was received)
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct TransportError(pub String);

/// Sends requests to the network
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends a request and reads the whole response
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError>;
}

/// Transport backed by `reqwest`
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Creates a transport with the given per-request timeout
    ///
    /// # Errors
    ///
    /// Returns an error if the TLS backend cannot be initialized.
    pub fn new(timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("jcli/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| TransportError(e.to_string()))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
        let mut builder = self
            .client
            .request(request.method, request.url)
            .headers(request.headers);
        if let Some(body) = request.body {
            builder = builder.body(body);
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError(format!("request timed out: {e}"))
            } else {
                TransportError(e.to_string())
            }
        })?;

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .text()
            .await
            .map_err(|e| TransportError(format!("failed to read response body: {e}")))?;

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted in-memory transport for tests

    use std::collections::VecDeque;
    use std::sync::Mutex;

    use http::header::{HeaderName, HeaderValue};

    use super::*;

    enum Reply {
        Response(HttpResponse),
        Failure(String),
    }

    /// Replays canned responses in order and records every request
    #[derive(Default)]
    pub struct ScriptedTransport {
        replies: Mutex<VecDeque<Reply>>,
        requests: Mutex<Vec<HttpRequest>>,
    }

    impl ScriptedTransport {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn respond(&self, status: u16, body: &str) -> &Self {
            self.respond_with_headers(status, &[], body)
        }

        pub fn respond_with_headers(
            &self,
            status: u16,
            headers: &[(&str, &str)],
            body: &str,
        ) -> &Self {
            let mut map = HeaderMap::new();
            for (name, value) in headers {
                map.insert(
                    HeaderName::from_bytes(name.as_bytes()).unwrap(),
                    HeaderValue::from_str(value).unwrap(),
                );
            }
            self.replies
                .lock()
                .unwrap()
                .push_back(Reply::Response(HttpResponse {
                    status: StatusCode::from_u16(status).unwrap(),
                    headers: map,
                    body: body.to_string(),
                }));
            self
        }

        pub fn fail(&self, reason: &str) -> &Self {
            self.replies
                .lock()
                .unwrap()
                .push_back(Reply::Failure(reason.to_string()));
            self
        }

        pub fn requests(&self) -> Vec<HttpRequest> {
            self.requests.lock().unwrap().clone()
        }

        pub fn request_lines(&self) -> Vec<String> {
            self.requests()
                .iter()
                .map(|r| format!("{} {}", r.method, r.url))
                .collect()
        }

        pub fn remaining(&self) -> usize {
            self.replies.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl Transport for ScriptedTransport {
        async fn send(&self, request: HttpRequest) -> Result<HttpResponse, TransportError> {
            self.requests.lock().unwrap().push(request);
            match self.replies.lock().unwrap().pop_front() {
                Some(Reply::Response(response)) => Ok(response),
                Some(Reply::Failure(reason)) => Err(TransportError(reason)),
                None => Err(TransportError("no scripted response left".to_string())),
            }
        }
    }
}
