//! Resolved attribute and command descriptors.

use crate::codec::{Codec, CodecRegistry};
use crate::error::CodecError;
use crate::format::{self, Bounds, Format};
use crate::remote::{AccessMode, AttrMeta, CmdMeta};
use crate::types::Value;
use crate::wire::{FormatTag, WireValue};

/// Attribute metadata combined with its resolved format and codec.
///
/// Built once per attribute name and immutable afterwards.
#[derive(Debug, Clone)]
pub struct AttributeDescriptor {
    meta: AttrMeta,
    format: &'static dyn Format,
    codec: Codec,
}

impl AttributeDescriptor {
    /// Resolves format and codec for the reported metadata.
    pub fn new(meta: AttrMeta, codecs: &CodecRegistry) -> Result<Self, CodecError> {
        let format = format::for_tag(meta.format)?;
        let codec = codecs.lookup(meta.data_type)?;
        Ok(Self {
            meta,
            format,
            codec,
        })
    }

    /// Attribute name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    /// Metadata reported by the device.
    #[must_use]
    pub const fn meta(&self) -> &AttrMeta {
        &self.meta
    }

    /// Resolved format strategy.
    #[must_use]
    pub fn format(&self) -> &'static dyn Format {
        self.format
    }

    /// Resolved element codec.
    #[must_use]
    pub const fn codec(&self) -> &Codec {
        &self.codec
    }

    /// Access mode.
    #[must_use]
    pub const fn access(&self) -> AccessMode {
        self.meta.access
    }

    /// Declared maximum dimensions.
    #[must_use]
    pub const fn bounds(&self) -> Bounds {
        self.meta.bounds()
    }

    /// Name of the native type a read produces, e.g. `Vec<f64>`.
    #[must_use]
    pub fn native_name(&self) -> String {
        let element = self.codec.kind().map_or("()", |kind| kind.native_name());
        match self.meta.format {
            FormatTag::SPECTRUM => format!("Vec<{element}>"),
            FormatTag::IMAGE => format!("Image<{element}>"),
            _ => element.to_owned(),
        }
    }

    /// Extracts a native value from a read container.
    pub fn extract(&self, wire: &WireValue) -> Result<Value, CodecError> {
        self.format.extract(wire, &self.codec)
    }

    /// Inserts a native value into a write container.
    pub fn insert(&self, wire: &mut WireValue, value: &Value) -> Result<(), CodecError> {
        self.format.insert(wire, value, &self.codec, self.bounds())
    }
}

/// Command metadata combined with its input and output codecs.
#[derive(Debug, Clone)]
pub struct CommandDescriptor {
    meta: CmdMeta,
    input: Codec,
    output: Codec,
}

impl CommandDescriptor {
    /// Resolves both codecs for the reported metadata.
    pub fn new(meta: CmdMeta, codecs: &CodecRegistry) -> Result<Self, CodecError> {
        let input = codecs.lookup(meta.in_type)?;
        let output = codecs.lookup(meta.out_type)?;
        Ok(Self {
            meta,
            input,
            output,
        })
    }

    /// Command name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.meta.name
    }

    /// Metadata reported by the device.
    #[must_use]
    pub const fn meta(&self) -> &CmdMeta {
        &self.meta
    }

    /// Input codec.
    #[must_use]
    pub const fn input(&self) -> &Codec {
        &self.input
    }

    /// Output codec.
    #[must_use]
    pub const fn output(&self) -> &Codec {
        &self.output
    }

    /// Native type accepted as input.
    #[must_use]
    pub fn argin_name(&self) -> String {
        self.input.native_name()
    }

    /// Native type returned as output.
    #[must_use]
    pub fn argout_name(&self) -> String {
        self.output.native_name()
    }
}
