// src/connection/mod.rs

//! Manages the lifecycle of a single client session: readiness-driven request
//! I/O on the handed-off channel and cleanup of all session resources.

// Declare the private sub-modules of the `connection` module.
mod guard;
mod handler;

// Publicly re-export the primary types from the sub-modules.
// This creates a clean public API for the `connection` module, hiding the
// internal file structure from the rest of the crate.
pub use guard::ConnectionGuard;
pub use handler::SessionHandler;
