//! Forwarding proxy lifecycle
//!
//! [`ForwardingProxy`] owns a loopback listener on an OS-assigned port. Every
//! connection accepted there is tunnelled through the configured SOCKS5 proxy
//! to the configured remote endpoint.
//!
//! ```text
//! Stopped --start--> Starting --listener ready--> Started
//!    ^                  |                            |
//!    +------stop--------+-----stop / failure---------+
//! ```
//!
//! All state lives in one task; the handle only enqueues requests, so calls
//! made from any thread are applied in the order they were issued.

mod actor;
mod listener;
mod state;
mod stats;

pub use state::{CloseReason, ConnectionId, ConnectionSnapshot, ConnectionState};
pub use stats::{ProxyStats, ProxyStatsSnapshot};

use crate::config::ForwarderConfig;
use crate::error::ProxyError;
use crate::helper::loopback_ephemeral;
use crate::socks::ConnectionContext;
use actor::ProxyActor;
use state::{Command, Event};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::sync::mpsc::{self, error::SendError, UnboundedSender};
use tokio::sync::oneshot;

/// Handle to a local SOCKS5 forwarding proxy
///
/// Cheap to clone. The proxy shuts down, closing its listener and all
/// connections, once the last handle is dropped.
#[derive(Clone)]
pub struct ForwardingProxy {
    commands: UnboundedSender<Command>,
    stats: Arc<ProxyStats>,
}

impl ForwardingProxy {
    /// Create a stopped proxy
    ///
    /// Must be called from within a Tokio runtime.
    pub fn new(config: ForwarderConfig) -> Self {
        Self::spawn(config, loopback_ephemeral()).0
    }

    pub(crate) fn spawn(
        config: ForwarderConfig,
        listen_addr: SocketAddr,
    ) -> (Self, UnboundedSender<Event>) {
        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let (event_tx, event_rx) = mpsc::unbounded_channel();
        let stats = Arc::new(ProxyStats::new());

        let actor = ProxyActor::new(
            listen_addr,
            ConnectionContext::from_config(&config),
            stats.clone(),
            event_tx.clone(),
        );
        tokio::spawn(actor.run(command_rx, event_rx));

        let proxy = ForwardingProxy {
            commands: command_tx,
            stats,
        };
        (proxy, event_tx)
    }

    /// Request the listener to start
    ///
    /// `completion` receives the bound port once the proxy is started, or
    /// the error that prevented it. Requests made while a start is already in
    /// progress share its outcome and complete in the order they were made.
    pub fn start_with<F>(&self, completion: F)
    where
        F: FnOnce(Result<u16, ProxyError>) + Send + 'static,
    {
        if let Err(SendError(Command::Start(completion))) =
            self.commands.send(Command::Start(Box::new(completion)))
        {
            completion(Err(ProxyError::Shutdown));
        }
    }

    /// Start the listener and wait for its port
    pub async fn start(&self) -> Result<u16, ProxyError> {
        let (tx, rx) = oneshot::channel();
        self.start_with(move |result| {
            let _ = tx.send(result);
        });
        rx.await.unwrap_or(Err(ProxyError::Shutdown))
    }

    /// Request the listener to stop
    ///
    /// Pending starts fail with [`ProxyError::CancelledDuringStartup`] and
    /// every open connection is closed before `completion` runs. Stopping a
    /// stopped proxy only runs `completion`.
    pub fn stop_with<F>(&self, completion: F)
    where
        F: FnOnce() + Send + 'static,
    {
        if let Err(SendError(Command::Stop(completion))) =
            self.commands.send(Command::Stop(Box::new(completion)))
        {
            completion();
        }
    }

    /// Stop the listener and wait until it is closed
    pub async fn stop(&self) {
        let (tx, rx) = oneshot::channel();
        self.stop_with(move || {
            let _ = tx.send(());
        });
        let _ = rx.await;
    }

    /// Port of the listener while started
    pub async fn current_port(&self) -> Option<u16> {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::CurrentPort(tx)).is_err() {
            return None;
        }
        rx.await.ok().flatten()
    }

    /// Blocking variant of [`current_port`](Self::current_port)
    ///
    /// Panics when called from within an async context.
    pub fn current_port_blocking(&self) -> Option<u16> {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::CurrentPort(tx)).is_err() {
            return None;
        }
        rx.blocking_recv().ok().flatten()
    }

    /// Register the handler for listener failures after startup
    ///
    /// Replaces any previous handler. After a failure is reported the proxy
    /// is stopped and can be started again.
    pub fn set_error_handler<F>(&self, handler: F)
    where
        F: Fn(ProxyError) + Send + Sync + 'static,
    {
        let _ = self.commands.send(Command::SetErrorHandler(Arc::new(handler)));
    }

    /// Currently open connections, ordered by id
    pub async fn connections(&self) -> Vec<ConnectionSnapshot> {
        let (tx, rx) = oneshot::channel();
        if self.commands.send(Command::Connections(tx)).is_err() {
            return Vec::new();
        }
        rx.await.unwrap_or_default()
    }

    /// Proxy counters
    pub fn stats(&self) -> &ProxyStats {
        &self.stats
    }
}

impl std::fmt::Debug for ForwardingProxy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ForwardingProxy")
            .field("stats", &self.stats.snapshot())
            .finish()
    }
}
