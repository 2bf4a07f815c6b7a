//! Error types for the devproxy library.

use std::fmt;

use thiserror::Error;

use crate::wire::{FormatTag, TypeTag};

/// The main error type for proxy operations.
///
/// Every failure surfaced by [`DeviceProxy`](crate::DeviceProxy) is normalized
/// into this type; the specific cause is kept as the source.
#[derive(Debug, Error)]
pub enum Error {
    /// Attribute or command metadata could not be resolved.
    #[error("metadata error: {0}")]
    MetadataFetch(#[from] MetadataError),

    /// Value conversion failed on either side of the wire.
    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    /// The remote endpoint reported a failure.
    #[error("{operation} '{name}' failed: {source}")]
    Remote {
        operation: &'static str,
        name: String,
        #[source]
        source: RemoteError,
    },

    /// Raw subscribe or unsubscribe failed.
    #[error("subscription to {key} failed: {source}")]
    Subscription {
        key: String,
        #[source]
        source: RemoteError,
    },

    /// The attribute is read-only.
    #[error("attribute '{name}' is not writable")]
    NotWritable { name: String },
}

impl Error {
    /// Returns true if the error means the name does not exist on the device.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::MetadataFetch(e) => matches!(e, MetadataError::NotFound { .. }),
            Self::Remote { source, .. } | Self::Subscription { source, .. } => {
                source.is_not_found()
            }
            _ => false,
        }
    }

    /// Returns true if retrying the same call later may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::MetadataFetch(MetadataError::Transient { .. }) => true,
            Self::Remote { source, .. } | Self::Subscription { source, .. } => {
                source.is_transient()
            }
            _ => false,
        }
    }

    pub(crate) fn remote(operation: &'static str, name: &str, source: RemoteError) -> Self {
        Self::Remote {
            operation,
            name: name.to_owned(),
            source,
        }
    }
}

/// Failure carried by a delivered event instead of a reading.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventError {
    /// The device or transport reported a failure for this event.
    #[error("event carries a remote failure: {0}")]
    Remote(#[from] RemoteError),

    /// The event payload could not be converted.
    #[error("event payload not decodable: {0}")]
    Codec(#[from] CodecError),
}

/// Metadata lookup failures.
#[derive(Debug, Clone, Error)]
pub enum MetadataError {
    /// The device has no attribute or command with this name.
    #[error("'{name}' not found on device")]
    NotFound { name: String },

    /// The describe call failed for a reason unrelated to the name.
    #[error("describe '{name}' failed: {source}")]
    Transient {
        name: String,
        #[source]
        source: RemoteError,
    },
}

/// Conversion failures between wire containers and native values.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CodecError {
    /// The wire container cannot produce the expected native value.
    #[error("type mismatch: expected {expected}, {reason}")]
    TypeMismatch {
        expected: &'static str,
        reason: String,
    },

    /// No codec is registered for the type tag.
    #[error("unsupported type tag {0}")]
    UnsupportedType(TypeTag),

    /// No format strategy is registered for the shape tag.
    #[error("unsupported format tag {0}")]
    UnsupportedFormat(FormatTag),

    /// The native value does not fit the declared wire type.
    #[error("cannot insert {found} as {expected}")]
    TypeInsertion {
        expected: &'static str,
        found: String,
    },

    /// A spectrum or image exceeds the declared maximum bounds.
    #[error("dimension {axis} of length {len} exceeds maximum {max}")]
    DimensionExceeded {
        axis: char,
        len: usize,
        max: usize,
    },
}

impl CodecError {
    pub(crate) fn mismatch(expected: &'static str, reason: impl Into<String>) -> Self {
        Self::TypeMismatch {
            expected,
            reason: reason.into(),
        }
    }

    pub(crate) fn insertion(expected: &'static str, found: impl fmt::Display) -> Self {
        Self::TypeInsertion {
            expected,
            found: found.to_string(),
        }
    }
}

/// Failures produced by a [`RemoteEndpoint`](crate::remote::RemoteEndpoint).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RemoteError {
    /// The named attribute or command does not exist.
    #[error("'{name}' does not exist")]
    NotFound { name: String },

    /// Connection, timeout or other transport failure.
    #[error("transport error: {message}")]
    Transport { message: String },

    /// The device executed the call and reported a failure.
    #[error("{0}")]
    Device(DeviceFailure),

    /// The call was cancelled before it completed.
    #[error("call cancelled")]
    Cancelled,
}

impl RemoteError {
    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a not-found error.
    pub fn not_found(name: impl Into<String>) -> Self {
        Self::NotFound { name: name.into() }
    }

    /// Returns true for a stable "does not exist" answer.
    #[must_use]
    pub const fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }

    /// Returns true if the failure may go away on retry.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Transport { .. } | Self::Cancelled)
    }
}

/// One entry of a device-side failure stack.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ErrorFrame {
    /// Where the failure was raised.
    pub origin: String,
    /// Short machine-readable reason.
    pub reason: String,
    /// Human-readable description.
    pub description: String,
}

impl ErrorFrame {
    /// Creates a new frame.
    pub fn new(
        origin: impl Into<String>,
        reason: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            origin: origin.into(),
            reason: reason.into(),
            description: description.into(),
        }
    }
}

/// Failure stack reported by the device.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceFailure {
    /// Frames, outermost first.
    pub frames: Vec<ErrorFrame>,
}

impl DeviceFailure {
    /// Creates a failure with a single frame.
    pub fn single(
        origin: impl Into<String>,
        reason: impl Into<String>,
        description: impl Into<String>,
    ) -> Self {
        Self {
            frames: vec![ErrorFrame::new(origin, reason, description)],
        }
    }
}

impl fmt::Display for DeviceFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Device threw an exception:")?;
        for frame in &self.frames {
            writeln!(
                f,
                "{}:{}({})",
                frame.origin, frame.reason, frame.description
            )?;
        }
        Ok(())
    }
}

/// Result type alias for devproxy operations.
pub type Result<T> = std::result::Result<T, Error>;
