//! Output formatters for SensorBug readings.
//!
//! The reporter renders every reading through an [`OutputFormatter`] before
//! handing it to the state store, so the formatted text doubles as the value
//! used for change detection.

pub mod summary;

use crate::reading::Reading;

/// Trait for formatting readings into output strings.
pub trait OutputFormatter: Send + Sync {
    /// Format a reading.
    ///
    /// Equal readings must produce equal strings.
    fn format(&self, reading: &Reading) -> String;
}
