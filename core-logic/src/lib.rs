//! # Core Logic - Shared Utilities for Spammer Bots
//!
//! This crate provides the chain-agnostic pieces used by every spammer
//! binary in the workspace: loop configuration, typed errors, logging,
//! metrics, retry/backoff helpers and the interrupt-aware runner.
//!
//! ## Modules
//!
//! - [`config`] - Loop settings shared by all spammers
//! - [`error`] - Typed error handling with thiserror
//! - [`metrics`] - Per-operation metrics collection
//! - [`traits`] - Core trait definitions
//! - [`utils`] - Utility modules (logger, retry, runner)

// Module declarations - internal modules marked pub(crate)
pub mod config;
pub mod error;
pub mod metrics;
pub mod traits;
pub(crate) mod utils;

// Selective exports - only public API types
pub use config::SpamConfig;
pub use error::ConfigError;
pub use metrics::{MetricsCollector, MetricsSnapshot, OperationMetrics};
pub use traits::{Spammer, SpammerStats};

// Utils are pub(crate) - only export specific public utilities
pub use utils::{setup_logger, setup_logger_with_file, WorkerRunner, STATUS_TARGET};

// Export retry utilities for testing
pub use utils::retry::{is_transient_error, with_retry, RetryConfig};
