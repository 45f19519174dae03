//! Compact one-line summary of a reading.
//!
//! ```text
//! batt:50% light:true/1/2/4660 temp:25.0°C
//! ```
//!
//! Battery always comes first; the remaining fields follow in the order their
//! records appeared in the advertisement.

use crate::output::OutputFormatter;
use crate::reading::{Field, LightDescriptor, Reading};
use std::fmt::{self, Write};

/// Formatter producing the `batt:..% ...` summary line.
#[derive(Debug, Default, Clone, Copy)]
pub struct SummaryFormatter;

impl SummaryFormatter {
    pub fn new() -> Self {
        Self
    }
}

fn write_light(out: &mut String, light: &LightDescriptor) -> fmt::Result {
    write!(
        out,
        " light:{}/{}/{}/{}",
        light.is_ir, light.resolution, light.range, light.value
    )
}

fn write_summary(out: &mut String, reading: &Reading) -> fmt::Result {
    write!(out, "batt:{}%", reading.battery)?;
    for field in &reading.fields {
        match field {
            Field::Light(light) => write_light(out, light)?,
            Field::Temperature(celsius) => write!(out, " temp:{celsius:.1}°C")?,
        }
    }
    Ok(())
}

impl OutputFormatter for SummaryFormatter {
    fn format(&self, reading: &Reading) -> String {
        let mut out = String::with_capacity(48);
        // Writing into a String cannot fail
        let _ = write_summary(&mut out, reading);
        out
    }
}
