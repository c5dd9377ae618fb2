// src/core/state/mod.rs

//! Defines the central `BrokerState` struct and all related state components.

mod core;
mod session;
mod stats;

pub use core::BrokerState;
pub use session::*;
pub use stats::StatsState;
