//! # Utility Modules
//!
//! - **Trace**: caller-supplied sink for non-fatal diagnostics
//! - **Logging**: `tracing-subscriber` setup driven by [`LoggingConfig`](crate::config::LoggingConfig)

pub mod logging;
pub mod trace;

pub use trace::{Silent, Trace, TracingSink};
