//! SensorBug manufacturer data decoder.
//!
//! A SensorBug advertisement starts with a fixed 7-byte header followed by a
//! stream of self-describing records. Each record opens with a control byte:
//!
//! ```text
//!  bit  7      6       5..0
//!     alert  data   data type
//! ```
//!
//! An alert flag is followed by one uninterpreted alert byte. Records without
//! the data flag end right there; otherwise a type-specific payload follows.
//! Data type `0x3f` marks the start of encrypted data and ends the stream
//! regardless of its flags.

use crate::reading::{Field, LightDescriptor, Reading};
use thiserror::Error;

/// BlueBite company identifier, the first two manufacturer data bytes (little-endian).
pub const SENSORBUG_COMPANY_ID: u16 = 0x0085;

/// Magic prefix identifying a SensorBug payload.
pub const SENSORBUG_PREFIX: [u8; 5] = [0x85, 0x00, 0x02, 0x00, 0x3c];

/// Header length: prefix, battery byte and one reserved byte.
pub const HEADER_LEN: usize = 7;

/// Temperature is reported in units of 1/16 °C.
const TEMPERATURE_SCALE: f64 = 0.0625;

/// Errors raised while walking the record stream.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum DecodeError {
    /// A record declared more bytes than the payload holds
    #[error("Truncated record at offset {offset}: needed {needed} more byte(s)")]
    Truncated { offset: usize, needed: usize },
    /// The record shape is unknown so the stream cannot be followed further
    #[error("Unknown data type 0x{data_type:02x} at offset {offset}")]
    UnknownDataType { data_type: u8, offset: usize },
    /// Light value length code other than 1 or 2
    #[error("Invalid light value length code {0}")]
    InvalidLightLength(u8),
}

/// The fixed part of a SensorBug payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    /// Battery level in percent
    pub battery: u8,
}

/// Record data type, the low six bits of a control byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    /// Accelerometer alert state, two payload bytes
    Motion,
    /// Ambient light descriptor and value
    Light,
    /// Signed temperature, two payload bytes
    Temperature,
    /// Pairing notice, one payload byte
    Pairing,
    /// Start of encrypted data, terminates the stream
    Encryption,
    Unknown(u8),
}

impl From<u8> for DataType {
    fn from(code: u8) -> Self {
        match code {
            0x01 => DataType::Motion,
            0x02 => DataType::Light,
            0x03 => DataType::Temperature,
            0x2f => DataType::Pairing,
            0x3f => DataType::Encryption,
            other => DataType::Unknown(other),
        }
    }
}

/// A record control byte split into its bit fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ControlByte {
    pub data_type: DataType,
    pub has_data: bool,
    pub has_alert: bool,
}

impl From<u8> for ControlByte {
    fn from(byte: u8) -> Self {
        Self {
            data_type: DataType::from(byte & 0b0011_1111),
            has_data: byte & 0b0100_0000 != 0,
            has_alert: byte & 0b1000_0000 != 0,
        }
    }
}

/// Bit fields of a light record's descriptor byte.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LightHeader {
    pub is_ir: bool,
    pub resolution: u8,
    pub range: u8,
    /// Number of value bytes following the descriptor
    pub length_code: u8,
}

impl From<u8> for LightHeader {
    fn from(byte: u8) -> Self {
        Self {
            is_ir: byte & 0b1000_0000 != 0,
            resolution: (byte & 0b0011_0000) >> 4,
            range: (byte & 0b0000_1100) >> 2,
            length_code: byte & 0b0000_0011,
        }
    }
}

/// Bounds-checked reader over the payload.
///
/// Offsets are absolute positions in the manufacturer data so errors point at
/// the byte that could not be read.
struct Cursor<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(data: &'a [u8], pos: usize) -> Self {
        Self { data, pos }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.data.len()
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        let available = self.data.len().saturating_sub(self.pos);
        if available < len {
            return Err(DecodeError::Truncated {
                offset: self.pos,
                needed: len - available,
            });
        }
        let bytes = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(bytes)
    }

    fn skip(&mut self, len: usize) -> Result<(), DecodeError> {
        self.take(len).map(|_| ())
    }

    fn u8(&mut self) -> Result<u8, DecodeError> {
        Ok(self.take(1)?[0])
    }

    fn u16_le(&mut self) -> Result<u16, DecodeError> {
        let bytes = self.take(2)?;
        Ok(u16::from_le_bytes([bytes[0], bytes[1]]))
    }

    fn i16_le(&mut self) -> Result<i16, DecodeError> {
        let bytes = self.take(2)?;
        Ok(i16::from_le_bytes([bytes[0], bytes[1]]))
    }
}

/// Validate the fixed header.
///
/// Returns `None` when the data is too short or the prefix does not match,
/// meaning the advertisement belongs to some other device.
pub fn parse_header(data: &[u8]) -> Option<Header> {
    if data.len() < HEADER_LEN || data[..SENSORBUG_PREFIX.len()] != SENSORBUG_PREFIX {
        return None;
    }
    Some(Header { battery: data[5] })
}

/// Decode SensorBug manufacturer data (including the leading company id bytes).
///
/// # Returns
/// - `Ok(None)` if the data is not a SensorBug payload
/// - `Ok(Some(reading))` once the stream ends or the encryption marker is reached
/// - `Err(_)` if a record is truncated or of unknown shape
pub fn decode(data: &[u8]) -> Result<Option<Reading>, DecodeError> {
    let Some(header) = parse_header(data) else {
        return Ok(None);
    };

    let mut reading = Reading::new(header.battery);
    let mut cursor = Cursor::new(data, HEADER_LEN);

    while !cursor.is_empty() {
        let offset = cursor.pos;
        let control = ControlByte::from(cursor.u8()?);

        if control.has_alert {
            cursor.skip(1)?;
        }
        // The marker ends the stream whatever its data flag says
        if control.data_type == DataType::Encryption {
            break;
        }
        if !control.has_data {
            continue;
        }

        match control.data_type {
            DataType::Motion => cursor.skip(2)?,
            DataType::Light => reading.fields.push(Field::Light(decode_light(&mut cursor)?)),
            DataType::Temperature => {
                let raw = cursor.i16_le()?;
                reading
                    .fields
                    .push(Field::Temperature(f64::from(raw) * TEMPERATURE_SCALE));
            }
            DataType::Pairing => cursor.skip(1)?,
            DataType::Encryption => break,
            DataType::Unknown(data_type) => {
                return Err(DecodeError::UnknownDataType { data_type, offset });
            }
        }
    }

    Ok(Some(reading))
}

fn decode_light(cursor: &mut Cursor<'_>) -> Result<LightDescriptor, DecodeError> {
    let header = LightHeader::from(cursor.u8()?);
    let value = match header.length_code {
        1 => u16::from(cursor.u8()?),
        2 => cursor.u16_le()?,
        other => return Err(DecodeError::InvalidLightLength(other)),
    };

    Ok(LightDescriptor {
        is_ir: header.is_ir,
        resolution: header.resolution,
        range: header.range,
        value,
    })
}
