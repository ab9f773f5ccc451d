//! The proxy's serialized context
//!
//! A single task owns [`ProxyState`] and processes commands from handles and
//! events from listener and connection tasks one at a time. Nothing else
//! touches the state, so every transition is atomic with respect to the
//! others.

use super::listener;
use super::state::{
    CloseReason, Command, ConnectionHandle, ConnectionId, ConnectionSnapshot, ConnectionState,
    ErrorHandler, Event, ProxyState, StartCompletion,
};
use super::stats::ProxyStats;
use crate::error::{ProxyError, Socks5Error};
use crate::socks::{run_connection, ConnectionContext, RelayStats};
use std::collections::HashMap;
use std::io;
use std::mem;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender};
use tracing::{debug, info, warn};

pub(crate) struct ProxyActor {
    listen_addr: SocketAddr,
    context: Arc<ConnectionContext>,
    state: ProxyState,
    generation: u64,
    next_connection_id: u64,
    error_handler: Option<ErrorHandler>,
    events: UnboundedSender<Event>,
    stats: Arc<ProxyStats>,
}

impl ProxyActor {
    pub(crate) fn new(
        listen_addr: SocketAddr,
        context: ConnectionContext,
        stats: Arc<ProxyStats>,
        events: UnboundedSender<Event>,
    ) -> Self {
        ProxyActor {
            listen_addr,
            context: Arc::new(context),
            state: ProxyState::Stopped,
            generation: 0,
            next_connection_id: 0,
            error_handler: None,
            events,
            stats,
        }
    }

    /// Run until every handle has been dropped
    ///
    /// Commands take priority over events, so requests queued back to back
    /// by a caller are all applied before any listener outcome is observed.
    pub(crate) async fn run(
        mut self,
        mut commands: UnboundedReceiver<Command>,
        mut events: UnboundedReceiver<Event>,
    ) {
        loop {
            tokio::select! {
                biased;
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                Some(event) = events.recv() => self.handle_event(event).await,
            }
        }

        self.stop().await;
        debug!("Forwarding proxy context exited");
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start(completion) => self.start(completion),
            Command::Stop(completion) => {
                self.stop().await;
                completion();
            }
            Command::CurrentPort(reply) => {
                let _ = reply.send(self.state.port());
            }
            Command::Connections(reply) => {
                let _ = reply.send(self.snapshot());
            }
            Command::SetErrorHandler(handler) => self.error_handler = Some(handler),
        }
    }

    async fn handle_event(&mut self, event: Event) {
        match event {
            Event::ListenerReady {
                generation,
                listener,
            } => self.on_listener_ready(generation, listener),
            Event::ListenerFailed { generation, error } => {
                self.on_listener_failed(generation, error)
            }
            Event::Accepted {
                generation,
                stream,
                peer,
            } => self.on_accepted(generation, stream, peer),
            Event::AcceptFailed { generation, error } => {
                self.on_accept_failed(generation, error).await
            }
            Event::ConnectionRelaying { id } => self.on_relaying(id),
            Event::ConnectionClosed { id, result } => self.on_closed(id, result),
        }
    }

    fn start(&mut self, completion: StartCompletion) {
        match &mut self.state {
            ProxyState::Started { port, .. } => {
                completion(Ok(*port));
                return;
            }
            ProxyState::Starting { pending, .. } => {
                pending.push(completion);
                debug!("Start joined pending startup ({} waiting)", pending.len());
                return;
            }
            ProxyState::Stopped => {}
        }

        self.generation += 1;
        let generation = self.generation;
        let bind_task = tokio::spawn(listener::bind(
            self.listen_addr,
            generation,
            self.events.clone(),
        ));
        self.stats.record_listener_created();
        info!("Starting local listener on {}", self.listen_addr);

        self.state = ProxyState::Starting {
            generation,
            bind_task,
            pending: vec![completion],
        };
    }

    /// Return to `Stopped`, closing every open connection first
    async fn stop(&mut self) {
        debug!("Stop requested while {}", self.state.name());
        match mem::replace(&mut self.state, ProxyState::Stopped) {
            ProxyState::Stopped => {}
            ProxyState::Starting {
                bind_task, pending, ..
            } => {
                bind_task.abort();
                let _ = bind_task.await;
                info!(
                    "Stopped during startup, cancelling {} start request(s)",
                    pending.len()
                );
                for completion in pending {
                    completion(Err(ProxyError::CancelledDuringStartup));
                }
            }
            ProxyState::Started {
                port,
                accept_task,
                connections,
                ..
            } => {
                accept_task.abort();
                let _ = accept_task.await;
                self.close_connections(connections).await;
                info!("Local listener on port {} stopped", port);
            }
        }
    }

    async fn close_connections(&mut self, connections: HashMap<ConnectionId, ConnectionHandle>) {
        let mut tasks = Vec::with_capacity(connections.len());

        for (id, mut handle) in connections {
            handle.task.abort();
            handle.state = ConnectionState::Closed(CloseReason::Cancelled);
            self.stats.record_cancelled();
            debug!("Connection {} from {} {:?}", id, handle.peer, handle.state);
            tasks.push(handle.task);
        }

        // Sockets are owned by the tasks and released once they are dropped
        futures::future::join_all(tasks).await;
    }

    fn on_listener_ready(&mut self, generation: u64, listener: TcpListener) {
        let pending = match mem::replace(&mut self.state, ProxyState::Stopped) {
            ProxyState::Starting {
                generation: current,
                pending,
                ..
            } if current == generation => pending,
            other => {
                self.state = other;
                debug!("Discarding stale listener (generation {})", generation);
                return;
            }
        };

        let port = match listener.local_addr() {
            Ok(addr) => addr.port(),
            Err(error) => return self.fail_pending(pending, error),
        };

        let accept_task = tokio::spawn(listener::accept_loop(
            listener,
            generation,
            self.events.clone(),
        ));

        self.state = ProxyState::Started {
            generation,
            port,
            accept_task,
            connections: HashMap::new(),
        };
        info!("Forwarding proxy listening on 127.0.0.1:{}", port);

        for completion in pending {
            completion(Ok(port));
        }
    }

    fn on_listener_failed(&mut self, generation: u64, error: io::Error) {
        match mem::replace(&mut self.state, ProxyState::Stopped) {
            ProxyState::Starting {
                generation: current,
                pending,
                ..
            } if current == generation => self.fail_pending(pending, error),
            other => {
                self.state = other;
                debug!("Ignoring stale listener failure: {}", error);
            }
        }
    }

    fn fail_pending(&self, pending: Vec<StartCompletion>, error: io::Error) {
        warn!("Failed to create local listener: {}", error);
        let error = ProxyError::listener_creation(error);
        for completion in pending {
            completion(Err(error.clone()));
        }
    }

    fn on_accepted(&mut self, generation: u64, stream: TcpStream, peer: SocketAddr) {
        let connections = match &mut self.state {
            ProxyState::Started {
                generation: current,
                connections,
                ..
            } if *current == generation => connections,
            _ => {
                debug!("Dropping connection from {} accepted by a stale listener", peer);
                return;
            }
        };

        self.next_connection_id += 1;
        let id = ConnectionId(self.next_connection_id);
        self.stats.record_accepted();

        let task = tokio::spawn(serve(
            id,
            stream,
            self.context.clone(),
            self.events.clone(),
        ));
        connections.insert(
            id,
            ConnectionHandle {
                peer,
                state: ConnectionState::Negotiating,
                task,
            },
        );
        debug!("Accepted connection {} from {}", id, peer);
    }

    async fn on_accept_failed(&mut self, generation: u64, error: io::Error) {
        match mem::replace(&mut self.state, ProxyState::Stopped) {
            ProxyState::Started {
                generation: current,
                port,
                accept_task,
                connections,
            } if current == generation => {
                accept_task.abort();
                let _ = accept_task.await;
                self.close_connections(connections).await;
                warn!("Local listener on port {} failed, proxy stopped", port);

                let error = ProxyError::runtime_failure(error);
                match &self.error_handler {
                    Some(handler) => handler(error),
                    None => warn!("No error handler registered for: {}", error),
                }
            }
            other => {
                self.state = other;
                debug!("Ignoring stale accept failure: {}", error);
            }
        }
    }

    fn on_relaying(&mut self, id: ConnectionId) {
        if let ProxyState::Started { connections, .. } = &mut self.state {
            if let Some(handle) = connections.get_mut(&id) {
                handle.state = ConnectionState::Relaying;
                self.stats.record_relaying();
                debug!("Connection {} relaying", id);
            }
        }
    }

    fn on_closed(&mut self, id: ConnectionId, result: Result<RelayStats, Socks5Error>) {
        let ProxyState::Started { connections, .. } = &mut self.state else {
            return;
        };
        let Some(mut handle) = connections.remove(&id) else {
            return;
        };

        let reason = match result {
            Ok(stats) => {
                self.stats.record_transfer(&stats);
                CloseReason::Normal
            }
            Err(e) => {
                warn!("Connection {} from {} failed: {}", id, handle.peer, e);
                self.stats.record_failed();
                CloseReason::Failed(Arc::new(e))
            }
        };
        handle.state = ConnectionState::Closed(reason);
        debug!("Connection {} {:?}", id, handle.state);
    }

    fn snapshot(&self) -> Vec<ConnectionSnapshot> {
        let ProxyState::Started { connections, .. } = &self.state else {
            return Vec::new();
        };

        let mut snapshot: Vec<_> = connections
            .iter()
            .map(|(id, handle)| ConnectionSnapshot {
                id: *id,
                peer: handle.peer,
                state: handle.state.clone(),
            })
            .collect();
        snapshot.sort_by_key(|connection| connection.id);
        snapshot
    }
}

/// Connection task: negotiate, relay, then report back
async fn serve(
    id: ConnectionId,
    stream: TcpStream,
    context: Arc<ConnectionContext>,
    events: UnboundedSender<Event>,
) {
    let relaying = events.clone();
    let result = run_connection(stream, &context, move || {
        let _ = relaying.send(Event::ConnectionRelaying { id });
    })
    .await;

    let _ = events.send(Event::ConnectionClosed { id, result });
}
