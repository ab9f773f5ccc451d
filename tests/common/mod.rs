//! Test utilities and mocks for socks-forwarder
//!
//! This module provides common test utilities used across integration tests.

#![allow(dead_code)]

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use socks_forwarder::config::{ForwarderConfig, Socks5Configuration};
use socks_forwarder::{HttpRequest, HttpResponse, RequestSender};
use std::net::{Ipv4Addr, Ipv6Addr, SocketAddr, SocketAddrV4, SocketAddrV6};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

/// Remote endpoint used throughout the tests
pub const REMOTE: &str = "198.51.100.7:443";

/// Create a test TCP listener on an available port
pub async fn create_test_listener() -> (TcpListener, SocketAddr) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    (listener, addr)
}

/// Address nothing is listening on
pub async fn closed_port() -> SocketAddr {
    let (listener, addr) = create_test_listener().await;
    drop(listener);
    addr
}

/// Forwarder configuration pointing at `proxy`
pub fn forwarder_config(proxy: SocketAddr, credentials: Option<(&str, &str)>) -> ForwarderConfig {
    let mut socks = Socks5Configuration::new(proxy.into());
    if let Some((username, password)) = credentials {
        socks = socks.with_credentials(username, password);
    }

    let mut config = ForwarderConfig::new(socks, REMOTE.parse().unwrap());
    config.connect_timeout = 2;
    config.half_close_timeout_ms = 200;
    config
}

/// Minimal SOCKS5 server that echoes tunnelled bytes back
///
/// CONNECT targets are recorded on `targets`. `reply_for` picks the CONNECT
/// reply code from the index of the connection, in accept order.
pub struct FakeSocksServer {
    /// Address the server listens on
    pub addr: SocketAddr,
    /// Targets named in CONNECT requests
    pub targets: mpsc::UnboundedReceiver<SocketAddr>,
    /// Connections accepted so far
    pub accepted: Arc<AtomicUsize>,
}

/// Behaviour of a [`FakeSocksServer`]
#[derive(Clone)]
pub struct FakeServerOptions {
    /// Required username/password, if any
    pub credentials: Option<(String, String)>,
    /// CONNECT reply code by connection index
    pub reply_for: fn(usize) -> u8,
}

impl Default for FakeServerOptions {
    fn default() -> Self {
        FakeServerOptions {
            credentials: None,
            reply_for: |_| 0x00,
        }
    }
}

impl FakeSocksServer {
    /// Start a server accepting any client
    pub async fn start() -> Self {
        Self::start_with(FakeServerOptions::default()).await
    }

    /// Start a server with the given behaviour
    pub async fn start_with(options: FakeServerOptions) -> Self {
        let (listener, addr) = create_test_listener().await;
        let (targets_tx, targets) = mpsc::unbounded_channel();
        let accepted = Arc::new(AtomicUsize::new(0));

        let counter = accepted.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let index = counter.fetch_add(1, Ordering::SeqCst);
                let options = options.clone();
                let targets_tx = targets_tx.clone();
                tokio::spawn(async move {
                    let _ = serve_socks(stream, index, options, targets_tx).await;
                });
            }
        });

        FakeSocksServer {
            addr,
            targets,
            accepted,
        }
    }
}

async fn serve_socks(
    mut stream: TcpStream,
    index: usize,
    options: FakeServerOptions,
    targets: mpsc::UnboundedSender<SocketAddr>,
) -> std::io::Result<()> {
    let mut header = [0u8; 2];
    stream.read_exact(&mut header).await?;
    assert_eq!(header[0], 0x05);
    let mut methods = vec![0u8; header[1] as usize];
    stream.read_exact(&mut methods).await?;

    match &options.credentials {
        Some((username, password)) => {
            if !methods.contains(&0x02) {
                stream.write_all(&[0x05, 0xFF]).await?;
                return Ok(());
            }
            stream.write_all(&[0x05, 0x02]).await?;

            let mut version = [0u8; 2];
            stream.read_exact(&mut version).await?;
            assert_eq!(version[0], 0x01);
            let mut user = vec![0u8; version[1] as usize];
            stream.read_exact(&mut user).await?;
            let mut plen = [0u8; 1];
            stream.read_exact(&mut plen).await?;
            let mut pass = vec![0u8; plen[0] as usize];
            stream.read_exact(&mut pass).await?;

            if user != username.as_bytes() || pass != password.as_bytes() {
                stream.write_all(&[0x01, 0x01]).await?;
                return Ok(());
            }
            stream.write_all(&[0x01, 0x00]).await?;
        }
        None => stream.write_all(&[0x05, 0x00]).await?,
    }

    let mut request = [0u8; 4];
    stream.read_exact(&mut request).await?;
    assert_eq!(&request[..3], &[0x05, 0x01, 0x00]);
    let target = match request[3] {
        0x01 => {
            let mut addr = [0u8; 6];
            stream.read_exact(&mut addr).await?;
            let ip = Ipv4Addr::new(addr[0], addr[1], addr[2], addr[3]);
            SocketAddr::V4(SocketAddrV4::new(ip, u16::from_be_bytes([addr[4], addr[5]])))
        }
        0x04 => {
            let mut addr = [0u8; 18];
            stream.read_exact(&mut addr).await?;
            let mut octets = [0u8; 16];
            octets.copy_from_slice(&addr[..16]);
            let port = u16::from_be_bytes([addr[16], addr[17]]);
            SocketAddr::V6(SocketAddrV6::new(Ipv6Addr::from(octets), port, 0, 0))
        }
        other => panic!("unexpected address type {}", other),
    };
    let _ = targets.send(target);

    let reply = (options.reply_for)(index);
    stream
        .write_all(&[0x05, reply, 0x00, 0x01, 127, 0, 0, 1, 0x04, 0x38])
        .await?;
    if reply != 0x00 {
        return Ok(());
    }

    let (mut reader, mut writer) = stream.split();
    tokio::io::copy(&mut reader, &mut writer).await?;
    Ok(())
}

/// Request sender that writes a request line to the rewritten URL and reads
/// back whatever arrives until EOF
#[derive(Default)]
pub struct RawSender {
    /// Requests seen by the sender
    pub requests: Mutex<Vec<HttpRequest>>,
}

#[async_trait]
impl RequestSender for RawSender {
    async fn send(&self, request: HttpRequest, cancel: CancellationToken) -> Result<HttpResponse> {
        self.requests.lock().unwrap().push(request.clone());

        let host = request.url.host_str().unwrap_or_default().to_string();
        let port = request.url.port_or_known_default().unwrap_or_default();

        let exchange = async {
            let mut stream = TcpStream::connect((host.as_str(), port)).await?;
            let line = format!("{} {} HTTP/1.1\r\n\r\n", request.method, request.url.path());
            stream.write_all(line.as_bytes()).await?;
            stream.write_all(&request.body).await?;
            stream.shutdown().await?;

            let mut body = Vec::new();
            stream.read_to_end(&mut body).await?;
            anyhow::Ok(body)
        };

        tokio::select! {
            _ = cancel.cancelled() => anyhow::bail!("cancelled"),
            body = exchange => Ok(HttpResponse {
                status: 200,
                headers: Vec::new(),
                body: Bytes::from(body?),
            }),
        }
    }
}

/// Poll `check` until it returns true or a second has passed
pub async fn eventually<F, Fut>(mut check: F) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
