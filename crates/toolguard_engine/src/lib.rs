//! TOOLGUARD Engine
//!
//! Turns a batch of proposed tool calls into one verdict per call. A
//! [`Snapshot`] bundles the schema registry, compiled policy and settings;
//! [`SharedEngine`] swaps snapshots atomically on reload.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod correct;
pub mod aggregate;
pub mod engine;

pub use config::{ConfigError, CorrectionConfig, EngineConfig, GuardConfig};
pub use correct::{Correction, CorrectionSynthesizer};
pub use aggregate::{Aggregator, CallState};
pub use engine::{Settings, SharedEngine, Snapshot, ValidationEngine, ValidationRequest};
