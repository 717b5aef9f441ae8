// crates/bridge/src/lib.rs
//! HTTP transport to the engine bridge process.
//!
//! The bridge is the external job executor: it accepts submissions, reports
//! job status, honors cancellation, and serves result payloads. This crate
//! is the single-purpose adapter over that surface — stateless between
//! calls, no timers, no bookkeeping. Scheduling lives in `forgeview-jobs`.

pub mod client;
pub mod config;
pub mod error;

pub use client::BridgeClient;
pub use config::BridgeConfig;
pub use error::BridgeError;
