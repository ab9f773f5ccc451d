//! Local listener tasks
//!
//! Both tasks report back to the proxy context through [`Event`]s tagged
//! with the generation they were spawned for.

use super::state::Event;
use crate::helper::{
    is_resource_exhaustion, is_transient_accept_error, ACCEPT_BACKOFF, LISTEN_BACKLOG,
};
use std::io;
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, warn};

/// Create a non-blocking listening socket on `addr`
pub(crate) fn create_listener(addr: SocketAddr) -> io::Result<std::net::TcpListener> {
    let socket = socket2::Socket::new(
        socket2::Domain::for_address(addr),
        socket2::Type::STREAM,
        Some(socket2::Protocol::TCP),
    )?;

    socket.set_nonblocking(true)?;
    socket.bind(&addr.into())?;
    socket.listen(LISTEN_BACKLOG)?;

    Ok(socket.into())
}

/// Create the listener off the context and report the outcome
pub(crate) async fn bind(addr: SocketAddr, generation: u64, events: UnboundedSender<Event>) {
    let result = match tokio::task::spawn_blocking(move || create_listener(addr)).await {
        Ok(result) => result.and_then(TcpListener::from_std),
        Err(e) => Err(io::Error::new(io::ErrorKind::Other, e)),
    };

    let event = match result {
        Ok(listener) => Event::ListenerReady {
            generation,
            listener,
        },
        Err(error) => Event::ListenerFailed { generation, error },
    };

    if events.send(event).is_err() {
        debug!("Proxy context gone, dropping listener result");
    }
}

/// Accept connections until the listener fails or the context goes away
pub(crate) async fn accept_loop(
    listener: TcpListener,
    generation: u64,
    events: UnboundedSender<Event>,
) {
    loop {
        match listener.accept().await {
            Ok((stream, peer)) => {
                let event = Event::Accepted {
                    generation,
                    stream,
                    peer,
                };
                if events.send(event).is_err() {
                    break;
                }
            }
            Err(e) if is_resource_exhaustion(&e) => {
                warn!("Out of resources accepting connections, backing off: {}", e);
                tokio::time::sleep(ACCEPT_BACKOFF).await;
            }
            Err(e) if is_transient_accept_error(&e) => {
                debug!("Ignoring transient accept error: {}", e);
            }
            Err(error) => {
                warn!("Local listener failed: {}", error);
                let _ = events.send(Event::AcceptFailed { generation, error });
                break;
            }
        }
    }
}
