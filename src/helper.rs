//! Helper utilities
//!
//! Shared defaults and small helpers used across the crate.

use std::net::{Ipv4Addr, SocketAddr};
use std::time::Duration;

/// Default timeout for connecting to the SOCKS5 proxy, in seconds
pub const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default linger after one relay direction reaches EOF, in milliseconds
pub const DEFAULT_HALF_CLOSE_TIMEOUT_MS: u64 = 5000;

/// Backlog of the local listener
pub const LISTEN_BACKLOG: i32 = 1024;

/// Pause before accepting again after running out of descriptors or memory
pub const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Address the local listener binds to; port 0 lets the OS pick
pub fn loopback_ephemeral() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 0))
}

/// Whether an accept error only concerns the connection being accepted
///
/// These are raised when a peer goes away between SYN and `accept`, when
/// the call was interrupted, or when the process is temporarily out of
/// resources; the listener itself is still usable.
pub fn is_transient_accept_error(err: &std::io::Error) -> bool {
    matches!(
        err.kind(),
        std::io::ErrorKind::ConnectionAborted
            | std::io::ErrorKind::ConnectionReset
            | std::io::ErrorKind::Interrupted
            | std::io::ErrorKind::WouldBlock
    ) || is_resource_exhaustion(err)
}

/// Whether an error means the descriptor table or kernel memory is full
///
/// Accepting again right away fails the same way, so callers back off for
/// [`ACCEPT_BACKOFF`] first.
pub fn is_resource_exhaustion(err: &std::io::Error) -> bool {
    if err.kind() == std::io::ErrorKind::OutOfMemory {
        return true;
    }

    #[cfg(unix)]
    {
        if let Some(code) = err.raw_os_error() {
            return matches!(
                code,
                libc::EMFILE | libc::ENFILE | libc::ENOBUFS | libc::ENOMEM
            );
        }
    }

    false
}
