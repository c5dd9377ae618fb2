// src/core/mod.rs

//! The central module containing the core logic and data structures of secmux.

pub mod connection;
pub mod errors;
pub mod handles;
pub mod lifecycle;
pub mod module;
pub mod pipe;
pub mod registry;
pub mod state;

pub use connection::{ClientEndpoint, Connection};
pub use errors::BrokerError;
pub use lifecycle::{ConnectionManager, OpenedConnection};
pub use registry::ConnectionRegistry;
