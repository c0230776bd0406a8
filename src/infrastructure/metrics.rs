//! Stream health tracking
//!
//! Lock-free counters written by the listener loop only.
//! Any task holding the `Arc` can read a snapshot for staleness checks.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant, SystemTime};

/// Listener loop state shared with observers
pub struct StreamHealth {
    /// Loop is between start and cancellation
    running: AtomicBool,
    /// Session currently delivering messages
    connected: AtomicBool,
    /// Last message pushed to the output queue (Unix millis, 0 = never)
    last_recv_time: AtomicU64,
    /// Messages pushed to the output queue
    messages: AtomicU64,
    /// Completed reconnect cycles
    reconnects: AtomicU64,
    /// Start time for uptime calculation
    start_time: Instant,
}

/// Health snapshot for export
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthSnapshot {
    pub running: bool,
    pub connected: bool,
    pub last_recv_ms: u64,
    pub messages: u64,
    pub reconnects: u64,
    pub message_rate: f64, // messages per second
    pub uptime_seconds: u64,
}

impl StreamHealth {
    pub fn new() -> Self {
        Self {
            running: AtomicBool::new(false),
            connected: AtomicBool::new(false),
            last_recv_time: AtomicU64::new(0),
            messages: AtomicU64::new(0),
            reconnects: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    /// Record a message delivered to the output queue
    #[inline]
    pub fn record_message(&self) {
        self.messages.fetch_add(1, Ordering::Relaxed);
        self.last_recv_time.store(now_millis(), Ordering::Relaxed);
    }

    #[inline]
    pub fn record_reconnect(&self) {
        self.reconnects.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_running(&self, running: bool) {
        self.running.store(running, Ordering::Relaxed);
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Relaxed);
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Relaxed)
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Relaxed)
    }

    /// Unix millis of the last delivered message, 0 if none yet
    pub fn last_recv_ms(&self) -> u64 {
        self.last_recv_time.load(Ordering::Relaxed)
    }

    /// Time since the last delivered message, `None` if none yet
    pub fn since_last_message(&self) -> Option<Duration> {
        let last = self.last_recv_ms();
        if last == 0 {
            return None;
        }
        Some(Duration::from_millis(now_millis().saturating_sub(last)))
    }

    /// No message delivered within `max_idle`
    ///
    /// A stream that has never delivered counts as stale once it has been
    /// running longer than `max_idle`.
    pub fn is_stale(&self, max_idle: Duration) -> bool {
        match self.since_last_message() {
            Some(idle) => idle > max_idle,
            None => self.start_time.elapsed() > max_idle,
        }
    }

    pub fn snapshot(&self) -> HealthSnapshot {
        let total = self.messages.load(Ordering::Relaxed);
        let uptime = self.start_time.elapsed().as_secs();
        let rate = if uptime > 0 {
            total as f64 / uptime as f64
        } else {
            0.0
        };

        HealthSnapshot {
            running: self.is_running(),
            connected: self.is_connected(),
            last_recv_ms: self.last_recv_ms(),
            messages: total,
            reconnects: self.reconnects.load(Ordering::Relaxed),
            message_rate: rate,
            uptime_seconds: uptime,
        }
    }
}

impl Default for StreamHealth {
    fn default() -> Self {
        Self::new()
    }
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}
