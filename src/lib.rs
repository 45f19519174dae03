//! `sensorbug-listener` library.
//!
//! The binary (`src/main.rs`) is responsible for CLI parsing, logging setup and
//! process exit codes. The decoder ([`crate::decoder`]) and change tracking
//! ([`crate::state`]) are pure; [`crate::app`] ties them to an injected scanner,
//! metrics sink and output streams so the whole loop can be tested
//! deterministically.

pub mod app;
pub mod decoder;
pub mod duration;
pub mod metrics;
pub mod output;
pub mod reading;
pub mod scanner;
pub mod state;

#[cfg(test)]
mod test_utils;

// Re-export commonly used types at the crate root
pub use decoder::{DecodeError, decode};
pub use metrics::{MetricsSink, NoopMetrics, PrometheusMetrics};
pub use output::OutputFormatter;
pub use output::summary::SummaryFormatter;
pub use reading::{Field, LightDescriptor, Reading};
pub use scanner::{Discovery, ScanError};
pub use state::{Observation, StateStore};
