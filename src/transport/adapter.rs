//! Request adapter
//!
//! Points outgoing HTTP(S) requests at the local forwarding listener,
//! starting the proxy on first use.
//!
//! Each send gets a [`CancellationToken`] before anything is issued. While
//! the proxy is starting the token guards the wait; once the rewritten
//! request is handed to the sender, a child of that token travels with it,
//! so cancelling the handle reaches whichever step is currently running.

use super::http::{HttpRequest, HttpResponse, RequestSender};
use crate::error::TransportError;
use crate::proxy::ForwardingProxy;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

/// Redirect a request to the local listener on `port`
///
/// Only the host and port change. Method, path, query, headers and body are
/// left as they are.
pub fn rewrite_request(mut request: HttpRequest, port: u16) -> HttpRequest {
    let original = request.url.clone();

    if request
        .url
        .set_ip_host(IpAddr::V4(Ipv4Addr::LOCALHOST))
        .is_err()
        || request.url.set_port(Some(port)).is_err()
    {
        warn!("Cannot redirect {} to the local listener", original);
        request.url = original;
    }

    request
}

/// HTTP transport that routes every request through a [`ForwardingProxy`]
pub struct ProxiedTransport<S> {
    proxy: ForwardingProxy,
    sender: Arc<S>,
}

impl<S> Clone for ProxiedTransport<S> {
    fn clone(&self) -> Self {
        ProxiedTransport {
            proxy: self.proxy.clone(),
            sender: self.sender.clone(),
        }
    }
}

impl<S: RequestSender> ProxiedTransport<S> {
    /// Wrap `sender` so that its requests go through `proxy`
    pub fn new(proxy: ForwardingProxy, sender: S) -> Self {
        ProxiedTransport {
            proxy,
            sender: Arc::new(sender),
        }
    }

    /// The proxy requests are routed through
    pub fn proxy(&self) -> &ForwardingProxy {
        &self.proxy
    }

    /// Send a request through the local listener
    ///
    /// Returns immediately. If the proxy cannot be started the response is
    /// the start error and the sender is never called.
    pub fn send(&self, request: HttpRequest) -> RequestHandle {
        let cancel = CancellationToken::new();
        let task = tokio::spawn(execute(
            self.proxy.clone(),
            self.sender.clone(),
            request,
            cancel.clone(),
        ));

        RequestHandle { cancel, task }
    }
}

async fn execute<S: RequestSender>(
    proxy: ForwardingProxy,
    sender: Arc<S>,
    request: HttpRequest,
    cancel: CancellationToken,
) -> Result<HttpResponse, TransportError> {
    let port = tokio::select! {
        biased;
        _ = cancel.cancelled() => {
            debug!("Request cancelled while waiting for the proxy");
            return Err(TransportError::Cancelled);
        }
        result = proxy.start() => result?,
    };

    let request = rewrite_request(request, port);
    debug!("{} {}", request.method, request.url);

    let inner = cancel.child_token();
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(TransportError::Cancelled),
        result = sender.send(request, inner) => result.map_err(TransportError::Send),
    }
}

/// Handle to an in-flight request
#[derive(Debug)]
pub struct RequestHandle {
    cancel: CancellationToken,
    task: JoinHandle<Result<HttpResponse, TransportError>>,
}

impl RequestHandle {
    /// Cancel the request
    ///
    /// Before the proxy has started this prevents the request from ever
    /// being sent; afterwards it cancels the token handed to the sender.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Whether [`cancel`](Self::cancel) has been called
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Wait for the response
    pub async fn response(self) -> Result<HttpResponse, TransportError> {
        match self.task.await {
            Ok(result) => result,
            Err(e) if e.is_cancelled() => Err(TransportError::Cancelled),
            Err(e) => Err(TransportError::Send(anyhow::anyhow!(
                "request task failed: {}",
                e
            ))),
        }
    }
}
