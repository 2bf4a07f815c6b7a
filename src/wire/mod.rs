//! Opaque wire containers exchanged with the remote endpoint.
//!
//! A [`WireValue`] is what the remote side sees: a type tag, the dimensions
//! actually carried and a little-endian payload. Codecs and formats turn it
//! into native [`Value`](crate::types::Value)s and back.
//!
//! Payload layout:
//! ```text
//! numbers   fixed-width little-endian, one after another
//! boolean   1 byte, 0 or 1
//! string    u32 LE length + UTF-8 bytes
//! state     u32 LE
//! encoded   string(format) + u32 LE length + bytes
//! ```

pub mod tag;

use std::fmt;
use std::time::SystemTime;

use bytes::Bytes;

use crate::error::DeviceFailure;

pub use tag::{FormatTag, TypeTag};

/// Untyped value container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireValue {
    tag: TypeTag,
    dim_x: usize,
    dim_y: usize,
    payload: Bytes,
}

impl WireValue {
    /// Creates an empty container carrying no value.
    #[must_use]
    pub const fn empty() -> Self {
        Self {
            tag: TypeTag::VOID,
            dim_x: 0,
            dim_y: 0,
            payload: Bytes::new(),
        }
    }

    /// Creates a container from its raw parts.
    #[must_use]
    pub const fn new(tag: TypeTag, dim_x: usize, dim_y: usize, payload: Bytes) -> Self {
        Self {
            tag,
            dim_x,
            dim_y,
            payload,
        }
    }

    /// Replaces the contents of the container.
    pub fn set(&mut self, tag: TypeTag, dim_x: usize, dim_y: usize, payload: Bytes) {
        self.tag = tag;
        self.dim_x = dim_x;
        self.dim_y = dim_y;
        self.payload = payload;
    }

    /// Returns the element type tag.
    #[must_use]
    pub const fn tag(&self) -> TypeTag {
        self.tag
    }

    /// Returns the number of columns (or elements for a sequence).
    #[must_use]
    pub const fn dim_x(&self) -> usize {
        self.dim_x
    }

    /// Returns the number of rows (0 unless the value is an image).
    #[must_use]
    pub const fn dim_y(&self) -> usize {
        self.dim_y
    }

    /// Returns the raw payload.
    #[must_use]
    pub const fn payload(&self) -> &Bytes {
        &self.payload
    }

    /// Returns true if no value has been inserted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tag == TypeTag::VOID && self.payload.is_empty()
    }
}

impl Default for WireValue {
    fn default() -> Self {
        Self::empty()
    }
}

/// Attribute quality reported alongside every read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Quality {
    /// The value is valid.
    #[default]
    Valid = 0,
    /// The value must not be trusted.
    Invalid = 1,
    /// The value is outside its alarm limits.
    Alarm = 2,
    /// The value is moving towards a new setpoint.
    Changing = 3,
    /// The value is outside its warning limits.
    Warning = 4,
}

impl Quality {
    /// Converts the protocol byte to a quality.
    #[must_use]
    pub const fn from_byte(byte: u8) -> Option<Self> {
        match byte {
            0 => Some(Self::Valid),
            1 => Some(Self::Invalid),
            2 => Some(Self::Alarm),
            3 => Some(Self::Changing),
            4 => Some(Self::Warning),
            _ => None,
        }
    }
}

impl fmt::Display for Quality {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Valid => "VALID",
            Self::Invalid => "INVALID",
            Self::Alarm => "ALARM",
            Self::Changing => "CHANGING",
            Self::Warning => "WARNING",
        };
        f.write_str(name)
    }
}

/// Attribute container as returned by a remote read or sent by a write.
///
/// A read can succeed at the transport level and still carry a device
/// failure; check [`failure`](Self::failure) before touching the value.
#[derive(Debug, Clone, PartialEq)]
pub struct WireAttributeValue {
    /// Attribute name.
    pub name: String,
    /// Carried value.
    pub value: WireValue,
    /// Acquisition time.
    pub timestamp: SystemTime,
    /// Quality indicator.
    pub quality: Quality,
    /// Failure embedded by the device, if any.
    pub failure: Option<DeviceFailure>,
}

impl WireAttributeValue {
    /// Creates an empty container for the named attribute.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: WireValue::empty(),
            timestamp: SystemTime::now(),
            quality: Quality::Valid,
            failure: None,
        }
    }

    /// Creates a container carrying only a device failure.
    #[must_use]
    pub fn failed(name: impl Into<String>, failure: DeviceFailure) -> Self {
        Self {
            failure: Some(failure),
            quality: Quality::Invalid,
            ..Self::new(name)
        }
    }

    /// Sets the carried value.
    #[must_use]
    pub fn with_value(mut self, value: WireValue) -> Self {
        self.value = value;
        self
    }

    /// Sets the quality.
    #[must_use]
    pub const fn with_quality(mut self, quality: Quality) -> Self {
        self.quality = quality;
        self
    }

    /// Sets the acquisition time.
    #[must_use]
    pub const fn with_timestamp(mut self, timestamp: SystemTime) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Returns the embedded failure, if the read failed on the device.
    #[must_use]
    pub const fn failure(&self) -> Option<&DeviceFailure> {
        self.failure.as_ref()
    }
}
