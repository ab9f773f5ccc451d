//! Proxy lifecycle state and the messages that drive it

use crate::error::{ProxyError, Socks5Error};
use crate::socks::RelayStats;
use std::collections::HashMap;
use std::fmt;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Completion of a `start` request
pub type StartCompletion = Box<dyn FnOnce(Result<u16, ProxyError>) + Send + 'static>;

/// Completion of a `stop` request
pub type StopCompletion = Box<dyn FnOnce() + Send + 'static>;

/// Handler for listener failures after the proxy has started
pub type ErrorHandler = Arc<dyn Fn(ProxyError) + Send + Sync + 'static>;

/// Identifier of one forwarded connection, unique for the proxy's lifetime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ConnectionId(pub(crate) u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Why a connection was closed
#[derive(Debug, Clone)]
pub enum CloseReason {
    /// Both directions finished
    Normal,
    /// Closed by `stop` or by a listener failure
    Cancelled,
    /// Negotiation or relay failed
    Failed(Arc<Socks5Error>),
}

/// Lifecycle of one forwarded connection
#[derive(Debug, Clone)]
pub enum ConnectionState {
    /// Talking to the SOCKS5 proxy
    Negotiating,
    /// Handshake done, bytes flowing
    Relaying,
    /// Terminal
    Closed(CloseReason),
}

/// Point-in-time view of an open connection
#[derive(Debug, Clone)]
pub struct ConnectionSnapshot {
    /// Connection identifier
    pub id: ConnectionId,
    /// Address of the local client
    pub peer: SocketAddr,
    /// Current state
    pub state: ConnectionState,
}

/// Bookkeeping for an open connection
pub(crate) struct ConnectionHandle {
    pub(crate) peer: SocketAddr,
    pub(crate) state: ConnectionState,
    pub(crate) task: JoinHandle<()>,
}

/// Proxy lifecycle
pub(crate) enum ProxyState {
    Stopped,
    Starting {
        generation: u64,
        bind_task: JoinHandle<()>,
        pending: Vec<StartCompletion>,
    },
    Started {
        generation: u64,
        port: u16,
        accept_task: JoinHandle<()>,
        connections: HashMap<ConnectionId, ConnectionHandle>,
    },
}

impl ProxyState {
    /// Port of the listener, only while started
    pub(crate) fn port(&self) -> Option<u16> {
        match self {
            ProxyState::Started { port, .. } => Some(*port),
            _ => None,
        }
    }

    pub(crate) fn name(&self) -> &'static str {
        match self {
            ProxyState::Stopped => "stopped",
            ProxyState::Starting { .. } => "starting",
            ProxyState::Started { .. } => "started",
        }
    }
}

/// Requests from [`ForwardingProxy`](super::ForwardingProxy) handles
pub(crate) enum Command {
    Start(StartCompletion),
    Stop(StopCompletion),
    CurrentPort(oneshot::Sender<Option<u16>>),
    Connections(oneshot::Sender<Vec<ConnectionSnapshot>>),
    SetErrorHandler(ErrorHandler),
}

/// Reports from listener and connection tasks
pub(crate) enum Event {
    ListenerReady {
        generation: u64,
        listener: TcpListener,
    },
    ListenerFailed {
        generation: u64,
        error: io::Error,
    },
    Accepted {
        generation: u64,
        stream: TcpStream,
        peer: SocketAddr,
    },
    AcceptFailed {
        generation: u64,
        error: io::Error,
    },
    ConnectionRelaying {
        id: ConnectionId,
    },
    ConnectionClosed {
        id: ConnectionId,
        result: Result<RelayStats, Socks5Error>,
    },
}
