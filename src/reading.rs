//! SensorBug reading data structure.

/// Ambient light descriptor carried by a light record.
///
/// The resolution and range values are the raw two-bit codes reported by the
/// sensor; they are not converted to lux.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightDescriptor {
    /// Measurement taken with the IR channel
    pub is_ir: bool,
    /// Resolution code (0-3)
    pub resolution: u8,
    /// Range code (0-3)
    pub range: u8,
    /// Raw intensity value
    pub value: u16,
}

/// A typed field decoded from the record stream.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Field {
    Light(LightDescriptor),
    /// Temperature in degrees Celsius
    Temperature(f64),
}

/// A decoded SensorBug advertisement.
///
/// Fields are kept in the order their records appeared in the payload, which
/// is also the order they are rendered in the summary line.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    /// Battery level in percent (0-100)
    pub battery: u8,
    /// Typed fields in encounter order
    pub fields: Vec<Field>,
}

impl Reading {
    pub fn new(battery: u8) -> Self {
        Self {
            battery,
            fields: Vec::new(),
        }
    }

    /// Last temperature seen in the payload, in degrees Celsius.
    pub fn temperature(&self) -> Option<f64> {
        self.fields.iter().rev().find_map(|field| match field {
            Field::Temperature(celsius) => Some(*celsius),
            Field::Light(_) => None,
        })
    }

    /// Last light descriptor seen in the payload.
    pub fn light(&self) -> Option<LightDescriptor> {
        self.fields.iter().rev().find_map(|field| match field {
            Field::Light(light) => Some(*light),
            Field::Temperature(_) => None,
        })
    }
}
