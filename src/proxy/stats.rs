//! Proxy counters
//!
//! Updated from the proxy's serialized context only; readers take a
//! [`ProxyStatsSnapshot`].

use crate::socks::RelayStats;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Statistics for the forwarding proxy
#[derive(Debug, Default)]
pub struct ProxyStats {
    /// Listeners created, one per Stopped to Starting transition
    pub listeners_created: AtomicUsize,
    /// Local connections accepted
    pub connections_accepted: AtomicUsize,
    /// Connections that completed the handshake and reached the relay
    pub connections_relayed: AtomicUsize,
    /// Connections closed because of an error
    pub connections_failed: AtomicUsize,
    /// Connections force-closed by `stop` or a listener failure
    pub connections_cancelled: AtomicUsize,
    /// Bytes sent from local clients to the proxy
    pub bytes_upstream: AtomicU64,
    /// Bytes sent from the proxy to local clients
    pub bytes_downstream: AtomicU64,
}

impl ProxyStats {
    /// Create new proxy stats
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a listener creation
    pub fn record_listener_created(&self) {
        self.listeners_created.fetch_add(1, Ordering::Relaxed);
    }

    /// Record an accepted connection
    pub fn record_accepted(&self) {
        self.connections_accepted.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a connection entering the relay
    pub fn record_relaying(&self) {
        self.connections_relayed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a failed connection
    pub fn record_failed(&self) {
        self.connections_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a force-closed connection
    pub fn record_cancelled(&self) {
        self.connections_cancelled.fetch_add(1, Ordering::Relaxed);
    }

    /// Add the byte counts of a finished relay
    pub fn record_transfer(&self, stats: &RelayStats) {
        self.bytes_upstream
            .fetch_add(stats.upstream, Ordering::Relaxed);
        self.bytes_downstream
            .fetch_add(stats.downstream, Ordering::Relaxed);
    }

    /// Get current stats snapshot
    pub fn snapshot(&self) -> ProxyStatsSnapshot {
        ProxyStatsSnapshot {
            listeners_created: self.listeners_created.load(Ordering::Relaxed),
            connections_accepted: self.connections_accepted.load(Ordering::Relaxed),
            connections_relayed: self.connections_relayed.load(Ordering::Relaxed),
            connections_failed: self.connections_failed.load(Ordering::Relaxed),
            connections_cancelled: self.connections_cancelled.load(Ordering::Relaxed),
            bytes_upstream: self.bytes_upstream.load(Ordering::Relaxed),
            bytes_downstream: self.bytes_downstream.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of proxy statistics
#[derive(Debug, Clone, Default, PartialEq, Eq)]
#[allow(missing_docs)]
pub struct ProxyStatsSnapshot {
    pub listeners_created: usize,
    pub connections_accepted: usize,
    pub connections_relayed: usize,
    pub connections_failed: usize,
    pub connections_cancelled: usize,
    pub bytes_upstream: u64,
    pub bytes_downstream: u64,
}
