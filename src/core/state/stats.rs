// src/core/state/stats.rs

//! Contains state definitions and logic for broker statistics.

use std::sync::atomic::{AtomicU64, Ordering};

/// Holds all state and logic related to broker-wide statistics and monitoring.
#[derive(Debug)]
pub struct StatsState {
    /// The total number of sessions established since startup.
    total_sessions: AtomicU64,
    /// The total number of client requests relayed to the module since startup.
    total_requests: AtomicU64,
}

impl Default for StatsState {
    fn default() -> Self {
        Self::new()
    }
}

impl StatsState {
    /// Creates a new `StatsState` with initialized counters.
    pub fn new() -> Self {
        Self {
            total_sessions: AtomicU64::new(0),
            total_requests: AtomicU64::new(0),
        }
    }

    /// Atomically increments the total number of sessions established.
    pub fn increment_total_sessions(&self) {
        self.total_sessions.fetch_add(1, Ordering::Relaxed);
    }

    /// Gets the total number of sessions established.
    pub fn get_total_sessions(&self) -> u64 {
        self.total_sessions.load(Ordering::Relaxed)
    }

    /// Atomically increments the total number of requests relayed.
    pub fn increment_total_requests(&self) {
        self.total_requests.fetch_add(1, Ordering::Relaxed);
    }

    /// Gets the total number of requests relayed.
    pub fn get_total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }
}
