//! Process-wide counters across all KCP sessions

use kcp_engine::KcpStats;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::time::Duration;

/// Global performance metrics collector
#[derive(Debug, Default)]
pub struct GlobalMetrics {
    /// Sessions started
    pub sessions_opened: AtomicU64,
    /// Sessions currently running
    pub active_sessions: AtomicUsize,
    /// Sessions ended by the dead-link check
    pub sessions_lost: AtomicU64,
    /// Application bytes sent by finished sessions
    pub total_bytes_sent: AtomicU64,
    /// Application bytes received by finished sessions
    pub total_bytes_received: AtomicU64,
    /// Datagrams sent
    pub total_packets_sent: AtomicU64,
    /// Datagrams received
    pub total_packets_received: AtomicU64,
    /// Timeout and fast retransmissions
    pub total_retransmissions: AtomicU64,
}

impl GlobalMetrics {
    /// Record a new session
    pub fn session_opened(&self) {
        self.sessions_opened.fetch_add(1, Ordering::Relaxed);
        self.active_sessions.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a session ending, folding in its final counters
    pub fn session_closed(&self, stats: &KcpStats, lost: bool) {
        self.active_sessions.fetch_sub(1, Ordering::Relaxed);
        if lost {
            self.sessions_lost.fetch_add(1, Ordering::Relaxed);
        }
        self.total_bytes_sent
            .fetch_add(stats.bytes_sent, Ordering::Relaxed);
        self.total_bytes_received
            .fetch_add(stats.bytes_received, Ordering::Relaxed);
        self.total_packets_sent
            .fetch_add(stats.packets_sent, Ordering::Relaxed);
        self.total_packets_received
            .fetch_add(stats.packets_received, Ordering::Relaxed);
        self.total_retransmissions.fetch_add(
            stats.retransmissions + stats.fast_retransmissions,
            Ordering::Relaxed,
        );
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            sessions_opened: self.sessions_opened.load(Ordering::Relaxed),
            active_sessions: self.active_sessions.load(Ordering::Relaxed),
            sessions_lost: self.sessions_lost.load(Ordering::Relaxed),
            total_bytes_sent: self.total_bytes_sent.load(Ordering::Relaxed),
            total_bytes_received: self.total_bytes_received.load(Ordering::Relaxed),
            total_packets_sent: self.total_packets_sent.load(Ordering::Relaxed),
            total_packets_received: self.total_packets_received.load(Ordering::Relaxed),
            total_retransmissions: self.total_retransmissions.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone, Default)]
pub struct MetricsSnapshot {
    pub sessions_opened: u64,
    pub active_sessions: usize,
    pub sessions_lost: u64,
    pub total_bytes_sent: u64,
    pub total_bytes_received: u64,
    pub total_packets_sent: u64,
    pub total_packets_received: u64,
    pub total_retransmissions: u64,
}

impl MetricsSnapshot {
    /// Retransmissions per datagram sent
    pub fn retransmission_rate(&self) -> f64 {
        if self.total_packets_sent == 0 {
            0.0
        } else {
            self.total_retransmissions as f64 / self.total_packets_sent as f64
        }
    }

    /// Calculate total throughput in bytes per second
    pub fn throughput_bps(&self, duration: Duration) -> f64 {
        let total_bytes = self.total_bytes_sent + self.total_bytes_received;
        total_bytes as f64 / duration.as_secs_f64()
    }
}

/// Global metrics instance
pub static GLOBAL_METRICS: std::sync::LazyLock<GlobalMetrics> =
    std::sync::LazyLock::new(GlobalMetrics::default);

/// Get global metrics
pub fn global_metrics() -> &'static GlobalMetrics {
    &GLOBAL_METRICS
}

/// Format metrics for human-readable display
pub fn format_metrics(snapshot: &MetricsSnapshot) -> String {
    format!(
        "KCP Metrics:\n\
         Sessions: {} opened, {} active, {} lost\n\
         Traffic: {} bytes sent, {} bytes received\n\
         Packets: {} sent, {} received\n\
         Retransmissions: {} ({:.2}% of packets)",
        snapshot.sessions_opened,
        snapshot.active_sessions,
        snapshot.sessions_lost,
        snapshot.total_bytes_sent,
        snapshot.total_bytes_received,
        snapshot.total_packets_sent,
        snapshot.total_packets_received,
        snapshot.total_retransmissions,
        snapshot.retransmission_rate() * 100.0,
    )
}
