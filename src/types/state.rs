//! Device state and encoded-data types.

use std::fmt;

/// Operational state reported by a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum DevState {
    On = 0,
    Off = 1,
    Close = 2,
    Open = 3,
    Insert = 4,
    Extract = 5,
    Moving = 6,
    Standby = 7,
    Fault = 8,
    Init = 9,
    Running = 10,
    Alarm = 11,
    Disable = 12,
    Unknown = 13,
}

impl DevState {
    /// Converts the protocol value to a state.
    #[must_use]
    pub const fn from_u32(value: u32) -> Option<Self> {
        let state = match value {
            0 => Self::On,
            1 => Self::Off,
            2 => Self::Close,
            3 => Self::Open,
            4 => Self::Insert,
            5 => Self::Extract,
            6 => Self::Moving,
            7 => Self::Standby,
            8 => Self::Fault,
            9 => Self::Init,
            10 => Self::Running,
            11 => Self::Alarm,
            12 => Self::Disable,
            13 => Self::Unknown,
            _ => return None,
        };
        Some(state)
    }

    /// Returns the protocol value.
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self as u32
    }
}

impl fmt::Display for DevState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::On => "ON",
            Self::Off => "OFF",
            Self::Close => "CLOSE",
            Self::Open => "OPEN",
            Self::Insert => "INSERT",
            Self::Extract => "EXTRACT",
            Self::Moving => "MOVING",
            Self::Standby => "STANDBY",
            Self::Fault => "FAULT",
            Self::Init => "INIT",
            Self::Running => "RUNNING",
            Self::Alarm => "ALARM",
            Self::Disable => "DISABLE",
            Self::Unknown => "UNKNOWN",
        };
        f.write_str(name)
    }
}

/// Opaque bytes tagged with an encoding name (e.g. "JPEG_RGB").
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Encoded {
    /// Encoding name.
    pub format: String,
    /// Encoded bytes.
    pub data: Vec<u8>,
}

impl Encoded {
    /// Creates a new encoded value.
    pub fn new(format: impl Into<String>, data: impl Into<Vec<u8>>) -> Self {
        Self {
            format: format.into(),
            data: data.into(),
        }
    }
}

impl fmt::Display for Encoded {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.format, hex::encode(&self.data))
    }
}
