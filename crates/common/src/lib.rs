//! Semantic influence common library
//!
//! Shared code for the influence engine and its drivers:
//! - Error types and handling
//! - Configuration management
//! - Metrics and observability
//! - Tracing setup

pub mod config;
pub mod errors;
pub mod metrics;
pub mod telemetry;

// Re-export commonly used types
pub use config::AppConfig;
pub use errors::{ErrorCode, InfluenceError, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
