//! Infrastructure layer module
//!
//! Configuration loading and logging setup for the binary. The cache core
//! only emits `tracing` events; installing a subscriber is left to the host.

pub mod config;
pub mod logging;
