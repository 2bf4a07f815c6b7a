//! # devproxy
//!
//! Typed client-side proxy for remote device-control endpoints.
//!
//! The remote side only speaks names and opaque wire containers. This library
//! turns that into typed attribute reads and writes, command invocations and
//! event subscriptions.
//!
//! ## Features
//!
//! - Async/await based API using Tokio
//! - Open registry mapping wire type tags to native values
//! - Scalar, spectrum and image attributes with bounds checking
//! - Metadata fetched once per name, safe under concurrent access
//! - Many listeners per attribute sharing one remote subscription
//!
//! ## Quick Start
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use devproxy::remote::memory::MemoryEndpoint;
//! use devproxy::{DeviceProxy, EventKind};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), devproxy::Error> {
//!     let endpoint = Arc::new(MemoryEndpoint::new("sr/motor/7"));
//!     let proxy = DeviceProxy::new(endpoint);
//!
//!     let position = proxy.read::<f64>("Position").await?;
//!     println!("position {} ({})", position.value, position.quality);
//!
//!     proxy.write("Position", 10.0f64).await?;
//!
//!     let (handle, mut events) = proxy.event_stream("Position", EventKind::Change, &[]).await?;
//!     if let Some(event) = events.recv().await {
//!         println!("{:?}", event.result);
//!     }
//!     proxy.unsubscribe(&handle).await?;
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - [`wire`] - Wire containers and type/format tags
//! - [`types`] - Native values, device state and read results
//! - [`codec`] - Type tag to element codec registry
//! - [`format`] - Scalar, spectrum and image strategies
//! - [`metadata`] - Descriptor cache
//! - [`event`] - Shared event subscriptions
//! - [`remote`] - Endpoint contract and an in-memory device
//! - [`proxy`] - High-level [`DeviceProxy`]

pub mod codec;
pub mod error;
pub mod event;
pub mod format;
pub mod metadata;
pub mod proxy;
pub mod remote;
pub mod types;
pub mod wire;

// Re-exports for convenience
pub use codec::{Codec, CodecRegistry};
pub use error::{CodecError, DeviceFailure, Error, EventError, MetadataError, RemoteError, Result};
pub use event::{DeviceEvent, EventKey, EventKind, EventStream, SubscriptionHandle};
pub use metadata::{AttributeDescriptor, CommandDescriptor};
pub use proxy::{DeviceProxy, ProxyConfig};
pub use remote::{AccessMode, AttrMeta, CmdMeta, RemoteEndpoint};
pub use types::{
    AttributeReading, DevState, Encoded, FromValue, Image, IntoValue, Reading, Scalar, Value,
};
pub use wire::{FormatTag, Quality, TypeTag, WireAttributeValue, WireValue};
