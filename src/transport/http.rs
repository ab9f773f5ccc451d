//! HTTP request/response values and the sender boundary
//!
//! The forwarder never speaks HTTP itself. It only rewrites where a request
//! goes and hands it to a [`RequestSender`] supplied by the embedding
//! application.

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use url::Url;

/// Outgoing HTTP(S) request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    /// Request method, e.g. `GET`
    pub method: String,
    /// Target URL
    pub url: Url,
    /// Header fields in order
    pub headers: Vec<(String, String)>,
    /// Request body
    pub body: Bytes,
}

impl HttpRequest {
    /// Create a request without headers or body
    pub fn new(method: impl Into<String>, url: Url) -> Self {
        HttpRequest {
            method: method.into(),
            url,
            headers: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Append a header field
    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    /// Replace the body
    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    /// First value of a header, matched case-insensitively
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

/// Response metadata and body
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code
    pub status: u16,
    /// Header fields in order
    pub headers: Vec<(String, String)>,
    /// Response body
    pub body: Bytes,
}

/// Issues HTTP requests on behalf of the adapter
///
/// Implementations are expected to stop work promptly once `cancel` fires.
#[async_trait]
pub trait RequestSender: Send + Sync + 'static {
    /// Send a request and wait for its response
    async fn send(&self, request: HttpRequest, cancel: CancellationToken) -> Result<HttpResponse>;
}

/// Shared senders, so callers can keep a handle on the sender they pass in
#[async_trait]
impl<T: RequestSender + ?Sized> RequestSender for Arc<T> {
    async fn send(&self, request: HttpRequest, cancel: CancellationToken) -> Result<HttpResponse> {
        (**self).send(request, cancel).await
    }
}
