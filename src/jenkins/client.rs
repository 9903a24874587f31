//! Jenkins API client
//!
//! Authenticated requests against a single Jenkins server. Status handling is
//! uniform: transport failures become [`ApiError::Connection`], 401/403 become
//! [`ApiError::Auth`], and every other status is handed back to the caller.

use std::sync::Arc;
use std::time::Duration;

use http::header::{AUTHORIZATION, CONTENT_TYPE, HeaderValue};
use http::{HeaderMap, Method, StatusCode};
use url::Url;

use super::errors::ApiError;
use super::session::ServerSession;
use super::transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport};

/// Cheap-to-clone client bound to one [`ServerSession`]
#[derive(Clone)]
pub struct JenkinsClient {
    session: Arc<ServerSession>,
    transport: Arc<dyn Transport>,
}

impl JenkinsClient {
    /// Creates a client over an arbitrary transport
    #[must_use]
    pub fn new(session: ServerSession, transport: Arc<dyn Transport>) -> Self {
        Self {
            session: Arc::new(session),
            transport,
        }
    }

    /// Creates a client over the default `reqwest` transport
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Connection`] if the HTTP stack cannot be set up.
    pub fn with_timeout(session: ServerSession, timeout: Duration) -> Result<Self, ApiError> {
        let transport = ReqwestTransport::new(timeout).map_err(|e| ApiError::Connection {
            url: session.address().to_string(),
            reason: e.to_string(),
        })?;
        Ok(Self::new(session, Arc::new(transport)))
    }

    /// Session this client authenticates with
    #[must_use]
    pub fn session(&self) -> &ServerSession {
        &self.session
    }

    /// Builds a URL below the base address from raw path segments
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidUrl`] if the base address cannot carry a path.
    pub fn endpoint(&self, segments: &[&str]) -> Result<Url, ApiError> {
        let mut url = self.session.base_url().clone();
        url.path_segments_mut()
            .map_err(|()| ApiError::InvalidUrl {
                url: self.session.base_url().to_string(),
                reason: "address cannot be a base URL".to_string(),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// Builds a URL below a job, e.g. `job/demo/config.xml`
    ///
    /// Folder jobs are written `folder/name` and map to `job/folder/job/name`.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidUrl`] if the base address cannot carry a path.
    pub fn job_endpoint(&self, job: &str, tail: &[&str]) -> Result<Url, ApiError> {
        let mut segments = job_segments(job);
        segments.extend_from_slice(tail);
        self.endpoint(&segments)
    }

    /// Resolves a URL handed out by Jenkins (queue location, build URL)
    ///
    /// Absolute URLs are used as-is; relative ones are joined to the base.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::InvalidUrl`] if the target does not parse.
    pub fn resolve(&self, target: &str) -> Result<Url, ApiError> {
        self.session
            .base_url()
            .join(target.trim())
            .map_err(|e| ApiError::InvalidUrl {
                url: target.to_string(),
                reason: e.to_string(),
            })
    }

    /// Issues an authenticated GET
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Connection`] on transport failure and
    /// [`ApiError::Auth`] on 401/403.
    pub async fn get(&self, url: Url) -> Result<HttpResponse, ApiError> {
        self.execute(Method::GET, url, None).await
    }

    /// Issues an authenticated POST with an optional typed body
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Connection`] on transport failure and
    /// [`ApiError::Auth`] on 401/403.
    pub async fn post(
        &self,
        url: Url,
        body: Option<(String, &'static str)>,
    ) -> Result<HttpResponse, ApiError> {
        self.execute(Method::POST, url, body).await
    }

    /// Checks that the server answers and accepts the credentials
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Connection`] if the server is unreachable and
    /// [`ApiError::Auth`] if the credentials are rejected.
    pub async fn check_access(&self) -> Result<StatusCode, ApiError> {
        let url = self.session.base_url().clone();
        let response = self.get(url).await?;
        tracing::info!(
            address = %self.session.address(),
            status = response.status.as_u16(),
            "Jenkins server reachable"
        );
        Ok(response.status)
    }

    async fn execute(
        &self,
        method: Method,
        url: Url,
        body: Option<(String, &'static str)>,
    ) -> Result<HttpResponse, ApiError> {
        let mut headers = HeaderMap::new();
        let authorization =
            HeaderValue::from_str(&self.session.authorization()).map_err(|e| ApiError::InvalidUrl {
                url: url.to_string(),
                reason: format!("credentials cannot form a header: {e}"),
            })?;
        headers.insert(AUTHORIZATION, authorization);

        let body = body.map(|(content, content_type)| {
            headers.insert(CONTENT_TYPE, HeaderValue::from_static(content_type));
            content
        });

        tracing::debug!(method = %method, url = %url, "Sending Jenkins request");

        let request = HttpRequest {
            method,
            url: url.clone(),
            headers,
            body,
        };
        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| ApiError::Connection {
                url: url.to_string(),
                reason: e.to_string(),
            })?;

        tracing::debug!(url = %url, status = response.status.as_u16(), "Jenkins responded");

        match response.status {
            StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(ApiError::Auth {
                status: response.status.as_u16(),
            }),
            _ => Ok(response),
        }
    }
}

impl std::fmt::Debug for JenkinsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("JenkinsClient")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

/// Splits `folder/name` into `["job", "folder", "job", "name"]`
fn job_segments(job: &str) -> Vec<&str> {
    job.split('/')
        .filter(|part| !part.is_empty())
        .flat_map(|part| ["job", part])
        .collect()
}
