//! Per-connection SOCKS5 negotiation
//!
//! Drives one accepted local socket through the handshake against the remote
//! SOCKS5 proxy, then hands both sockets to the relay.
//!
//! # Protocol Flow
//!
//! 1. TCP connect to the proxy
//! 2. Greeting and method selection
//! 3. Username/password authentication (if selected)
//! 4. CONNECT to the remote server
//! 5. Bidirectional relay
//!
//! Every step fails fast. A failure closes both sockets of this connection
//! and nothing else.

use super::auth::{authenticate, negotiate_method, Greeting};
use super::command::{read_connect_reply, ConnectReply, ConnectRequest};
use super::tcp_relay::{relay, RelayStats};
use super::types::{AuthMethod, Endpoint};
use crate::config::{ForwarderConfig, Socks5Configuration};
use crate::error::Socks5Error;
use crate::transport::SocketOpts;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tokio::net::TcpStream;
use tracing::debug;

/// Everything a connection task needs, shared by all connections of a proxy
#[derive(Debug, Clone)]
pub struct ConnectionContext {
    socks: Socks5Configuration,
    remote_endpoint: Endpoint,
    connect_timeout: Duration,
    half_close_timeout: Duration,
    socket_opts: SocketOpts,
}

impl ConnectionContext {
    /// Build the context from the forwarder configuration
    pub fn from_config(config: &ForwarderConfig) -> Self {
        ConnectionContext {
            socks: config.socks.clone(),
            remote_endpoint: config.remote_endpoint,
            connect_timeout: config.connect_timeout(),
            half_close_timeout: config.half_close_timeout(),
            socket_opts: SocketOpts::from_tcp_config(&config.tcp),
        }
    }

    /// SOCKS5 proxy settings
    pub fn socks(&self) -> &Socks5Configuration {
        &self.socks
    }

    /// Endpoint named in every CONNECT request
    pub fn remote_endpoint(&self) -> Endpoint {
        self.remote_endpoint
    }
}

/// Perform the SOCKS5 handshake on an established proxy connection
///
/// On success the stream is positioned right after the CONNECT reply and
/// carries the tunnelled connection to `target`.
pub async fn negotiate<S>(
    stream: &mut S,
    socks: &Socks5Configuration,
    target: Endpoint,
) -> Result<ConnectReply, Socks5Error>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let credentials = socks.credentials()?;

    let greeting = Greeting::new(credentials.is_some());
    let method = negotiate_method(stream, &greeting).await?;
    debug!("Proxy selected method {:?}", method);

    if method == AuthMethod::Password {
        let credentials = credentials.as_ref().ok_or(Socks5Error::InvalidCredentials)?;
        authenticate(stream, credentials).await?;
    }

    stream.write_all(&ConnectRequest::new(target).encode()).await?;
    stream.flush().await?;

    let reply = read_connect_reply(stream).await?;
    debug!("CONNECT to {} succeeded, proxy bound {}", target, reply.bound);

    Ok(reply)
}

/// Open the TCP connection to the SOCKS5 proxy
async fn connect_proxy(context: &ConnectionContext) -> Result<TcpStream, Socks5Error> {
    let addr = context.socks.proxy_endpoint.socket_addr();

    let stream = tokio::time::timeout(context.connect_timeout, TcpStream::connect(addr))
        .await
        .map_err(|_| Socks5Error::ConnectTimeout)??;

    context.socket_opts.hint(&stream);
    debug!("Connected to SOCKS5 proxy {}", addr);

    Ok(stream)
}

/// Serve one accepted local socket until it closes
///
/// `on_relaying` is called once the handshake succeeded and the relay is
/// about to start.
pub async fn run_connection<F>(
    local: TcpStream,
    context: &ConnectionContext,
    on_relaying: F,
) -> Result<RelayStats, Socks5Error>
where
    F: FnOnce(),
{
    context.socket_opts.hint(&local);

    let mut remote = connect_proxy(context).await?;
    negotiate(&mut remote, &context.socks, context.remote_endpoint).await?;

    on_relaying();

    let stats = relay(local, remote, context.half_close_timeout).await?;
    debug!(
        "Relay finished: {} bytes up, {} bytes down",
        stats.upstream, stats.downstream
    );

    Ok(stats)
}
