//! TCP relay between the local client socket and the SOCKS5 proxy socket
//!
//! Bytes are copied in both directions without interpretation. When one
//! direction reaches EOF its write half on the far side is shut down, and the
//! opposite direction gets at most `linger` to finish before both streams are
//! dropped.

use std::io;
use std::time::Duration;
use tokio::io::{AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::debug;

/// Byte counts of a finished relay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelayStats {
    /// Bytes copied from the local client to the proxy
    pub upstream: u64,
    /// Bytes copied from the proxy to the local client
    pub downstream: u64,
}

/// Copy one direction and propagate EOF as a write shutdown
async fn pump<R, W>(reader: &mut R, writer: &mut W) -> io::Result<u64>
where
    R: AsyncRead + Unpin + ?Sized,
    W: AsyncWrite + Unpin + ?Sized,
{
    let copied = tokio::io::copy(reader, writer).await?;
    if let Err(e) = writer.shutdown().await {
        debug!("Shutdown after EOF failed: {}", e);
    }
    Ok(copied)
}

/// Relay data bidirectionally between two streams
///
/// Returns when both directions have finished, or when one direction has
/// finished and the other did not follow within `linger`. Any I/O error on
/// either side ends the relay with that error; both streams are closed when
/// this function returns.
pub async fn relay<A, B>(local: A, remote: B, linger: Duration) -> io::Result<RelayStats>
where
    A: AsyncRead + AsyncWrite + Unpin,
    B: AsyncRead + AsyncWrite + Unpin,
{
    let (mut local_read, mut local_write) = tokio::io::split(local);
    let (mut remote_read, mut remote_write) = tokio::io::split(remote);

    let upstream = pump(&mut local_read, &mut remote_write);
    let downstream = pump(&mut remote_read, &mut local_write);
    tokio::pin!(upstream);
    tokio::pin!(downstream);

    let mut stats = RelayStats::default();

    tokio::select! {
        result = &mut upstream => {
            stats.upstream = result?;
            debug!("Local->proxy finished: {} bytes", stats.upstream);
            match tokio::time::timeout(linger, &mut downstream).await {
                Ok(result) => stats.downstream = result?,
                Err(_) => debug!("Proxy->local still open after {:?}, closing", linger),
            }
        }
        result = &mut downstream => {
            stats.downstream = result?;
            debug!("Proxy->local finished: {} bytes", stats.downstream);
            match tokio::time::timeout(linger, &mut upstream).await {
                Ok(result) => stats.upstream = result?,
                Err(_) => debug!("Local->proxy still open after {:?}, closing", linger),
            }
        }
    }

    Ok(stats)
}
