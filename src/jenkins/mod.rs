//! Jenkins REST API access
//!
//! This module contains the session, the authenticated client and the
//! transport it sends requests through.

mod client;
mod errors;
mod session;
mod transport;

pub use client::JenkinsClient;
pub use errors::ApiError;
pub use session::ServerSession;
pub use transport::{HttpRequest, HttpResponse, ReqwestTransport, Transport, TransportError};

#[cfg(test)]
pub(crate) use transport::testing;
