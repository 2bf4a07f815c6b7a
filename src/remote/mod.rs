//! Remote endpoint contract.
//!
//! The proxy never talks to the network itself. It consumes a
//! [`RemoteEndpoint`], which performs the actual calls against one device.
//! [`memory::MemoryEndpoint`] is an in-process implementation.

pub mod memory;

use std::fmt;
use std::sync::Arc;

use futures::future::BoxFuture;

use crate::error::RemoteError;
use crate::event::EventKind;
use crate::format::Bounds;
use crate::wire::{FormatTag, TypeTag, WireAttributeValue, WireValue};

/// Read/write access of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AccessMode {
    /// Read only.
    #[default]
    Read,
    /// Readable and writable.
    ReadWrite,
    /// Read value paired with a separate write attribute.
    ReadWithWrite,
    /// Write only.
    Write,
}

impl AccessMode {
    /// Returns true if the attribute accepts writes.
    #[must_use]
    pub const fn is_writable(self) -> bool {
        !matches!(self, Self::Read)
    }
}

/// Attribute metadata as reported by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttrMeta {
    /// Attribute name.
    pub name: String,
    /// Shape tag.
    pub format: FormatTag,
    /// Element type tag.
    pub data_type: TypeTag,
    /// Access mode.
    pub access: AccessMode,
    /// Maximum number of columns (elements for a spectrum).
    pub max_dim_x: usize,
    /// Maximum number of rows.
    pub max_dim_y: usize,
    /// Free-text description.
    pub description: String,
    /// Unit label.
    pub unit: String,
}

impl AttrMeta {
    /// Metadata for a scalar attribute.
    pub fn scalar(name: impl Into<String>, data_type: TypeTag, access: AccessMode) -> Self {
        Self {
            name: name.into(),
            format: FormatTag::SCALAR,
            data_type,
            access,
            max_dim_x: 1,
            max_dim_y: 0,
            description: String::new(),
            unit: String::new(),
        }
    }

    /// Metadata for a spectrum attribute holding at most `max_len` elements.
    pub fn spectrum(
        name: impl Into<String>,
        data_type: TypeTag,
        access: AccessMode,
        max_len: usize,
    ) -> Self {
        Self {
            format: FormatTag::SPECTRUM,
            max_dim_x: max_len,
            ..Self::scalar(name, data_type, access)
        }
    }

    /// Metadata for an image attribute of at most `max_x` columns and `max_y` rows.
    pub fn image(
        name: impl Into<String>,
        data_type: TypeTag,
        access: AccessMode,
        max_x: usize,
        max_y: usize,
    ) -> Self {
        Self {
            format: FormatTag::IMAGE,
            max_dim_x: max_x,
            max_dim_y: max_y,
            ..Self::scalar(name, data_type, access)
        }
    }

    /// Sets the unit label.
    #[must_use]
    pub fn with_unit(mut self, unit: impl Into<String>) -> Self {
        self.unit = unit.into();
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Declared maximum dimensions.
    #[must_use]
    pub const fn bounds(&self) -> Bounds {
        Bounds {
            max_dim_x: self.max_dim_x,
            max_dim_y: self.max_dim_y,
        }
    }
}

/// Command metadata as reported by the device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CmdMeta {
    /// Command name.
    pub name: String,
    /// Input type tag.
    pub in_type: TypeTag,
    /// Output type tag.
    pub out_type: TypeTag,
    /// Description of the input.
    pub in_description: String,
    /// Description of the output.
    pub out_description: String,
}

impl CmdMeta {
    /// Creates command metadata without descriptions.
    pub fn new(name: impl Into<String>, in_type: TypeTag, out_type: TypeTag) -> Self {
        Self {
            name: name.into(),
            in_type,
            out_type,
            in_description: String::new(),
            out_description: String::new(),
        }
    }
}

/// Identifier of a raw subscription, returned by the endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RawHandle(pub u64);

impl fmt::Display for RawHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "raw#{}", self.0)
    }
}

/// Callback the endpoint invokes for each raw event, on its own thread.
pub type RawEventCallback =
    Arc<dyn Fn(Result<WireAttributeValue, RemoteError>) + Send + Sync + 'static>;

/// Untyped remote call interface of one device.
///
/// Implementations own transport, timeouts and retries; the proxy propagates
/// whatever outcome they produce.
pub trait RemoteEndpoint: Send + Sync {
    /// Name of the device behind this endpoint.
    fn device_name(&self) -> &str;

    /// Reads an attribute.
    fn read<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<WireAttributeValue, RemoteError>>;

    /// Writes an attribute.
    fn write(&self, value: WireAttributeValue) -> BoxFuture<'_, Result<(), RemoteError>>;

    /// Fetches attribute metadata.
    fn describe_attribute<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, Result<AttrMeta, RemoteError>>;

    /// Fetches command metadata.
    fn describe_command<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<CmdMeta, RemoteError>>;

    /// Executes a command.
    fn invoke<'a>(
        &'a self,
        name: &'a str,
        input: WireValue,
    ) -> BoxFuture<'a, Result<WireValue, RemoteError>>;

    /// Opens a raw event subscription.
    fn subscribe<'a>(
        &'a self,
        name: &'a str,
        kind: EventKind,
        filters: &'a [String],
        callback: RawEventCallback,
    ) -> BoxFuture<'a, Result<RawHandle, RemoteError>>;

    /// Closes a raw event subscription.
    fn unsubscribe(&self, handle: RawHandle) -> BoxFuture<'_, Result<(), RemoteError>>;
}
