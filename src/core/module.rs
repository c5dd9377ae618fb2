// src/core/module.rs

//! The channel to the shared security module.
//!
//! The broker owns exactly one physical channel to the hardware, so the
//! daemon serializes all access through a single `ModuleChannel` behind an
//! async mutex. Command encoding for real hardware lives behind this trait
//! and stays out of the broker core.

use crate::core::errors::BrokerError;
use async_trait::async_trait;
use bytes::Bytes;

/// One request/response exchange with the security module.
#[async_trait]
pub trait ModuleChannel: Send {
    async fn exchange(&mut self, request: &[u8]) -> Result<Bytes, BrokerError>;
}

/// A module channel that echoes every request back unchanged. Used by the
/// daemon when no hardware backend is configured, and by tests.
#[derive(Debug, Default)]
pub struct LoopbackModule;

#[async_trait]
impl ModuleChannel for LoopbackModule {
    async fn exchange(&mut self, request: &[u8]) -> Result<Bytes, BrokerError> {
        Ok(Bytes::copy_from_slice(request))
    }
}
