//! Observability and Metrics
//!
//! Counters for connection churn, packet traffic and session registry
//! activity on both ends of the relay.
//!
//! Uses atomic counters for thread-safe metrics collection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;
use tracing::{debug, info};

/// Global metrics collector for relay operations
#[derive(Debug)]
pub struct Metrics {
    /// Total connections established (accepted or dialed)
    pub connections_total: AtomicU64,
    /// Currently active connections
    pub connections_active: AtomicU64,
    /// Connections refused by the server's connection limit
    pub connections_rejected: AtomicU64,
    /// Total packets decoded
    pub packets_received: AtomicU64,
    /// Total packets written
    pub packets_sent: AtomicU64,
    /// Codes handed out by the registry
    pub codes_allocated: AtomicU64,
    /// Random draws that hit a live code and were redrawn
    pub allocation_collisions: AtomicU64,
    /// Tickets stored through NewCodeComplete
    pub tickets_completed: AtomicU64,
    /// Records removed because they outlived the TTL
    pub sessions_evicted: AtomicU64,
    /// Client reconnect attempts after the first
    pub reconnect_attempts: AtomicU64,
    /// Connection errors
    pub connection_errors: AtomicU64,
    /// Protocol errors
    pub protocol_errors: AtomicU64,
    /// Connections closed for read inactivity
    pub read_timeouts: AtomicU64,
    /// Start time for uptime calculation
    start_time: Instant,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            connections_total: AtomicU64::new(0),
            connections_active: AtomicU64::new(0),
            connections_rejected: AtomicU64::new(0),
            packets_received: AtomicU64::new(0),
            packets_sent: AtomicU64::new(0),
            codes_allocated: AtomicU64::new(0),
            allocation_collisions: AtomicU64::new(0),
            tickets_completed: AtomicU64::new(0),
            sessions_evicted: AtomicU64::new(0),
            reconnect_attempts: AtomicU64::new(0),
            connection_errors: AtomicU64::new(0),
            protocol_errors: AtomicU64::new(0),
            read_timeouts: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a new connection
    pub fn connection_established(&self) {
        self.connections_total.fetch_add(1, Ordering::Relaxed);
        self.connections_active.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a connection closed
    pub fn connection_closed(&self) {
        self.connections_active.fetch_sub(1, Ordering::Relaxed);
    }

    pub fn connection_rejected(&self) {
        self.connections_rejected.fetch_add(1, Ordering::Relaxed);
    }

    pub fn packet_received(&self) {
        self.packets_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn packet_sent(&self) {
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a successful allocation and the collisions it took to get there
    pub fn code_allocated(&self, collisions: u64) {
        self.codes_allocated.fetch_add(1, Ordering::Relaxed);
        if collisions > 0 {
            self.allocation_collisions
                .fetch_add(collisions, Ordering::Relaxed);
        }
    }

    pub fn ticket_completed(&self) {
        self.tickets_completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sessions_evicted(&self, count: u64) {
        self.sessions_evicted.fetch_add(count, Ordering::Relaxed);
    }

    pub fn reconnect_attempt(&self) {
        self.reconnect_attempts.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a connection error
    pub fn connection_error(&self) {
        self.connection_errors.fetch_add(1, Ordering::Relaxed);
    }

    /// Record a protocol error
    pub fn protocol_error(&self) {
        self.protocol_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn read_timeout(&self) {
        self.read_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            connections_total: self.connections_total.load(Ordering::Relaxed),
            connections_active: self.connections_active.load(Ordering::Relaxed),
            connections_rejected: self.connections_rejected.load(Ordering::Relaxed),
            packets_received: self.packets_received.load(Ordering::Relaxed),
            packets_sent: self.packets_sent.load(Ordering::Relaxed),
            codes_allocated: self.codes_allocated.load(Ordering::Relaxed),
            allocation_collisions: self.allocation_collisions.load(Ordering::Relaxed),
            tickets_completed: self.tickets_completed.load(Ordering::Relaxed),
            sessions_evicted: self.sessions_evicted.load(Ordering::Relaxed),
            reconnect_attempts: self.reconnect_attempts.load(Ordering::Relaxed),
            connection_errors: self.connection_errors.load(Ordering::Relaxed),
            protocol_errors: self.protocol_errors.load(Ordering::Relaxed),
            read_timeouts: self.read_timeouts.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            connections_total = snapshot.connections_total,
            connections_active = snapshot.connections_active,
            connections_rejected = snapshot.connections_rejected,
            packets_received = snapshot.packets_received,
            packets_sent = snapshot.packets_sent,
            codes_allocated = snapshot.codes_allocated,
            allocation_collisions = snapshot.allocation_collisions,
            tickets_completed = snapshot.tickets_completed,
            sessions_evicted = snapshot.sessions_evicted,
            reconnect_attempts = snapshot.reconnect_attempts,
            connection_errors = snapshot.connection_errors,
            protocol_errors = snapshot.protocol_errors,
            read_timeouts = snapshot.read_timeouts,
            uptime_seconds = snapshot.uptime_seconds,
            "Relay metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub connections_total: u64,
    pub connections_active: u64,
    pub connections_rejected: u64,
    pub packets_received: u64,
    pub packets_sent: u64,
    pub codes_allocated: u64,
    pub allocation_collisions: u64,
    pub tickets_completed: u64,
    pub sessions_evicted: u64,
    pub reconnect_attempts: u64,
    pub connection_errors: u64,
    pub protocol_errors: u64,
    pub read_timeouts: u64,
    pub uptime_seconds: u64,
}

/// Global metrics instance (lazy static for simplicity)
static METRICS: once_cell::sync::Lazy<Metrics> = once_cell::sync::Lazy::new(Metrics::new);

/// Get the global metrics instance
pub fn global_metrics() -> &'static Metrics {
    &METRICS
}

/// Initialize metrics collection (call once at startup)
pub fn init_metrics() {
    let _ = global_metrics();
    info!("Metrics collection initialized");
}

/// Timer for measuring operation duration
pub struct Timer {
    start: Instant,
    operation: &'static str,
}

impl Timer {
    /// Start timing an operation
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        debug!(
            operation = self.operation,
            duration_ms = duration.as_millis(),
            "Operation completed"
        );
    }
}
