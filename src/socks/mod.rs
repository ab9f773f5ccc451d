//! SOCKS5 client module
//!
//! This module implements the client role of the SOCKS5 protocol: the
//! greeting, RFC 1929 username/password authentication and the CONNECT
//! command, plus the byte relay that runs once a connection is established.
//!
//! Every fixed-size message is read with exactly the number of bytes it
//! occupies and validated field by field before it is trusted.

pub mod auth;
pub mod command;
pub mod consts;
mod negotiator;
mod tcp_relay;
mod types;

pub use auth::{AuthReply, AuthRequest, Greeting};
pub use command::{BoundAddress, ConnectReply, ConnectRequest};
pub use negotiator::{negotiate, run_connection, ConnectionContext};
pub use tcp_relay::{relay, RelayStats};
pub use types::{AuthMethod, Credentials, Endpoint};

use crate::error::Socks5Error;
use tokio::io::{AsyncRead, AsyncReadExt};

/// Read exactly `N` bytes, mapping a premature EOF to
/// [`Socks5Error::UnexpectedEndOfStream`]
pub(crate) async fn read_fixed<S, const N: usize>(stream: &mut S) -> Result<[u8; N], Socks5Error>
where
    S: AsyncRead + Unpin,
{
    let mut buf = [0u8; N];
    stream.read_exact(&mut buf).await?;
    Ok(buf)
}

/// Check that a fixed-size message has exactly `expected` bytes
pub(crate) fn check_len(bytes: &[u8], expected: usize) -> Result<(), Socks5Error> {
    if bytes.len() < expected {
        return Err(Socks5Error::UnexpectedEndOfStream);
    }
    if bytes.len() > expected {
        return Err(Socks5Error::MessageSizeMismatch {
            expected,
            actual: bytes.len(),
        });
    }
    Ok(())
}
