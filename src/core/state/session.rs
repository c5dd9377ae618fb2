// src/core/state/session.rs

//! Type definitions for tracking live control sessions.

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::broadcast;

/// A sender used to signal a single session's service task to terminate.
pub type SessionSender = broadcast::Sender<()>;

/// A map of all live sessions, keyed by connection id. Stores the kill switch
/// for targeted session termination.
pub type SessionMap = Arc<DashMap<u64, SessionSender>>;
