//! Format dispatch for attribute shapes.
//!
//! A [`Format`] knows how a shape (scalar, spectrum, image) is laid out in a
//! [`WireValue`] and delegates each element to the attribute's [`Codec`].
//! [`for_tag`] resolves the remote shape tag to its strategy.

use std::fmt;

use crate::codec::{Codec, check_tag, decode_elements, encode_elements};
use crate::error::CodecError;
use crate::types::{Image, Value};
use crate::wire::{FormatTag, WireValue};

/// Declared maximum dimensions of an attribute.
///
/// Read counts are runtime values; these bounds only gate insertion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Bounds {
    /// Maximum number of columns (elements for a spectrum).
    pub max_dim_x: usize,
    /// Maximum number of rows.
    pub max_dim_y: usize,
}

/// Strategy for reading and writing one shape.
pub trait Format: Send + Sync + fmt::Debug {
    /// Shape tag this strategy handles.
    fn tag(&self) -> FormatTag;

    /// Extracts a value, sized by the counts the container reports.
    fn extract(&self, wire: &WireValue, codec: &Codec) -> Result<Value, CodecError>;

    /// Inserts a value, rejecting anything larger than `bounds`.
    fn insert(
        &self,
        wire: &mut WireValue,
        value: &Value,
        codec: &Codec,
        bounds: Bounds,
    ) -> Result<(), CodecError>;
}

/// Single element.
#[derive(Debug, Clone, Copy, Default)]
pub struct ScalarFormat;

impl Format for ScalarFormat {
    fn tag(&self) -> FormatTag {
        FormatTag::SCALAR
    }

    fn extract(&self, wire: &WireValue, codec: &Codec) -> Result<Value, CodecError> {
        check_tag(codec.tag(), wire)?;
        let mut items = decode_elements(codec.require_element()?, wire.payload(), 1)?;
        Ok(Value::Scalar(items.remove(0)))
    }

    fn insert(
        &self,
        wire: &mut WireValue,
        value: &Value,
        codec: &Codec,
        _bounds: Bounds,
    ) -> Result<(), CodecError> {
        let Value::Scalar(item) = value else {
            return Err(CodecError::insertion("scalar", value.describe()));
        };
        let element = codec.insert_element(value)?;
        let payload = encode_elements(element, std::slice::from_ref(item))?;
        wire.set(codec.tag(), 1, 0, payload);
        Ok(())
    }
}

/// One-dimensional sequence.
#[derive(Debug, Clone, Copy, Default)]
pub struct SpectrumFormat;

impl Format for SpectrumFormat {
    fn tag(&self) -> FormatTag {
        FormatTag::SPECTRUM
    }

    fn extract(&self, wire: &WireValue, codec: &Codec) -> Result<Value, CodecError> {
        check_tag(codec.tag(), wire)?;
        decode_elements(codec.require_element()?, wire.payload(), wire.dim_x()).map(Value::Spectrum)
    }

    fn insert(
        &self,
        wire: &mut WireValue,
        value: &Value,
        codec: &Codec,
        bounds: Bounds,
    ) -> Result<(), CodecError> {
        let Value::Spectrum(items) = value else {
            return Err(CodecError::insertion("spectrum", value.describe()));
        };
        if items.len() > bounds.max_dim_x {
            return Err(CodecError::DimensionExceeded {
                axis: 'x',
                len: items.len(),
                max: bounds.max_dim_x,
            });
        }
        let payload = encode_elements(codec.insert_element(value)?, items)?;
        wire.set(codec.tag(), items.len(), 0, payload);
        Ok(())
    }
}

/// Two-dimensional row-major grid.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageFormat;

impl Format for ImageFormat {
    fn tag(&self) -> FormatTag {
        FormatTag::IMAGE
    }

    fn extract(&self, wire: &WireValue, codec: &Codec) -> Result<Value, CodecError> {
        check_tag(codec.tag(), wire)?;
        let (width, height) = (wire.dim_x(), wire.dim_y());
        let count = width.checked_mul(height).ok_or_else(|| {
            CodecError::mismatch("image", format!("dimensions {width}x{height} overflow"))
        })?;
        let items = decode_elements(codec.require_element()?, wire.payload(), count)?;
        let image = Image::new(width, height, items).ok_or_else(|| {
            CodecError::mismatch("image", format!("element count does not match {width}x{height}"))
        })?;
        Ok(Value::Image(image))
    }

    fn insert(
        &self,
        wire: &mut WireValue,
        value: &Value,
        codec: &Codec,
        bounds: Bounds,
    ) -> Result<(), CodecError> {
        let Value::Image(image) = value else {
            return Err(CodecError::insertion("image", value.describe()));
        };
        if image.width() > bounds.max_dim_x {
            return Err(CodecError::DimensionExceeded {
                axis: 'x',
                len: image.width(),
                max: bounds.max_dim_x,
            });
        }
        if image.height() > bounds.max_dim_y {
            return Err(CodecError::DimensionExceeded {
                axis: 'y',
                len: image.height(),
                max: bounds.max_dim_y,
            });
        }
        let payload = encode_elements(codec.insert_element(value)?, image.data())?;
        wire.set(codec.tag(), image.width(), image.height(), payload);
        Ok(())
    }
}

static FORMATS: [&dyn Format; 3] = [&ScalarFormat, &SpectrumFormat, &ImageFormat];

/// Resolves the strategy for a remote shape tag.
pub fn for_tag(tag: FormatTag) -> Result<&'static dyn Format, CodecError> {
    FORMATS
        .iter()
        .copied()
        .find(|format| format.tag() == tag)
        .ok_or(CodecError::UnsupportedFormat(tag))
}
