//! Native data types.
//!
//! This module contains the values application code works with:
//! - Scalars, spectra and images
//! - Device state and encoded payloads
//! - Read results with time and quality

pub mod reading;
pub mod state;
pub mod value;

pub use reading::{AttributeReading, Reading};
pub use state::{DevState, Encoded};
pub use value::{FromValue, Image, IntoValue, Scalar, ScalarKind, Value};
