//! The HTTP transport collaborator.
//!
//! [`Transport`] is the only place where bytes leave the process. The default
//! [`ReqwestTransport`] wraps a [`reqwest::Client`]; tests plug an in-memory
//! implementation to count and inspect calls.

use std::future::Future;

use bytes::Bytes;
use http::HeaderMap;
use tracing::debug;

/// Raw response as returned by a [`Transport`].
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response headers.
    pub headers: HeaderMap,
    /// Raw body bytes.
    pub body: Bytes,
}

impl RawResponse {
    /// Creates a response without headers.
    pub fn new(status: u16, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }
}

/// Transport-level failure: timeout, refused connection, TLS error...
#[derive(Debug, derive_more::Error, derive_more::Display, derive_more::From)]
pub enum TransportError {
    /// Failure reported by reqwest.
    Reqwest(reqwest::Error),

    /// Failure reported by another transport implementation.
    #[display("{message}")]
    #[from(skip)]
    Other {
        /// Description of the failure.
        message: String,
    },
}

/// Performs exactly one HTTP exchange per call.
///
/// Returning `Ok(None)` means the transport completed without producing any
/// response; callers treat it as a hard error, never as a retryable nothing.
pub trait Transport: Send + Sync + 'static {
    /// Sends the request and returns the raw response.
    fn send(
        &self,
        request: reqwest::Request,
    ) -> impl Future<Output = Result<Option<RawResponse>, TransportError>> + Send;
}

/// [`Transport`] backed by a [`reqwest::Client`].
///
/// No timeout and no retry are configured by default; use
/// [`ReqwestTransport::new`] with a custom client to change that.
#[derive(Debug, Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
}

impl ReqwestTransport {
    /// Wraps an existing client.
    pub fn new(client: reqwest::Client) -> Self {
        Self { client }
    }
}

impl Transport for ReqwestTransport {
    async fn send(&self, request: reqwest::Request) -> Result<Option<RawResponse>, TransportError> {
        debug!(method = %request.method(), url = %request.url(), "sending...");
        let response = self.client.execute(request).await?;

        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.bytes().await?;
        debug!(status, length = body.len(), "...receiving");

        Ok(Some(RawResponse {
            status,
            headers,
            body,
        }))
    }
}
