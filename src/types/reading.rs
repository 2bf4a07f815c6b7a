//! Attribute read results.

use std::time::SystemTime;

use crate::error::CodecError;
use crate::types::value::{FromValue, Value};
use crate::wire::Quality;

/// Result of an attribute read: value, acquisition time and quality.
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeReading {
    /// Extracted value.
    pub value: Value,
    /// Acquisition time reported by the device.
    pub timestamp: SystemTime,
    /// Quality reported by the device.
    pub quality: Quality,
}

impl AttributeReading {
    /// Converts the value to a native type, keeping time and quality.
    pub fn into_typed<T: FromValue>(self) -> Result<Reading<T>, CodecError> {
        Ok(Reading {
            value: T::from_value(self.value)?,
            timestamp: self.timestamp,
            quality: self.quality,
        })
    }
}

/// Typed attribute read result.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading<T> {
    /// Extracted value.
    pub value: T,
    /// Acquisition time reported by the device.
    pub timestamp: SystemTime,
    /// Quality reported by the device.
    pub quality: Quality,
}

impl<T> Reading<T> {
    /// Returns the value and time pair.
    pub fn into_value_and_time(self) -> (T, SystemTime) {
        (self.value, self.timestamp)
    }
}
