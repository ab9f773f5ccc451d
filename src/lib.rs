//! # socks-forwarder - Local SOCKS5 Forwarding Proxy
//!
//! Exposes a loopback TCP listener on an OS-assigned port and tunnels every
//! connection made to it through a remote SOCKS5 proxy to one fixed remote
//! endpoint. An HTTP(S) client that cannot speak SOCKS5 itself is pointed at
//! the listener by rewriting the host and port of its requests.
//!
//! ## Features
//!
//! - **Lazy listener**: started on first use, concurrent starts share one listener
//! - **SOCKS5 client**: greeting, RFC 1929 username/password, CONNECT (RFC 1928)
//! - **Isolated connections**: a failed handshake closes only its own sockets
//! - **Request adapter**: rewrites requests to `127.0.0.1:<port>` with chained cancellation
//!
//! ## Usage
//!
//! ```rust,ignore
//! use socks_forwarder::config::{ForwarderConfig, Socks5Configuration};
//! use socks_forwarder::ForwardingProxy;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let socks = Socks5Configuration::new("203.0.113.1:1080".parse()?)
//!         .with_credentials("user", "secret");
//!     let proxy = ForwardingProxy::new(ForwarderConfig::new(socks, "198.51.100.7:443".parse()?));
//!
//!     let port = proxy.start().await?;
//!     println!("forwarding 127.0.0.1:{} to 198.51.100.7:443", port);
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! HTTP client -> 127.0.0.1:<port> -> SOCKS5 proxy -> remote endpoint
//! ```

#![warn(missing_docs)]
#![warn(rust_2018_idioms)]

pub mod config;
pub mod error;
pub mod helper;
pub mod proxy;
pub mod socks;
pub mod transport;

// Re-export commonly used items
pub use config::{load_config, ForwarderConfig, Socks5Configuration};
pub use error::{ProxyError, Socks5Error, TransportError};
pub use proxy::ForwardingProxy;
pub use socks::Endpoint;
pub use transport::{HttpRequest, HttpResponse, ProxiedTransport, RequestSender};

/// Version of the library
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Name of the application
pub const NAME: &str = env!("CARGO_PKG_NAME");
