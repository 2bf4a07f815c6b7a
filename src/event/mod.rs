//! Event subscription system.
//!
//! Any number of listeners can watch one attribute for one kind of event.
//! All of them share a single raw subscription on the remote endpoint: the
//! [`EventRegistry`] keeps one [`EventDispatcher`] per [`EventKey`], opens the
//! raw subscription for the first listener and releases it when the last one
//! leaves.
//!
//! Events are delivered synchronously on whatever thread the endpoint uses.

pub mod registry;
pub mod stream;

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock, Weak};

use crate::error::{EventError, RemoteError};
use crate::metadata::AttributeDescriptor;
use crate::remote::{RawEventCallback, RawHandle};
use crate::types::AttributeReading;
use crate::wire::WireAttributeValue;

pub use registry::EventRegistry;
pub use stream::EventStream;

/// Category of asynchronous notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// Value changed beyond the configured threshold.
    Change,
    /// Fired at a fixed period.
    Periodic,
    /// Fired when the archiving criteria are met.
    Archive,
    /// Pushed explicitly by the device.
    User,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Change => "change",
            Self::Periodic => "periodic",
            Self::Archive => "archive",
            Self::User => "user",
        };
        f.write_str(name)
    }
}

/// Identity of a shared subscription.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct EventKey {
    device: String,
    attribute: String,
    kind: EventKind,
}

impl EventKey {
    /// Creates a key.
    pub fn new(device: impl Into<String>, attribute: impl Into<String>, kind: EventKind) -> Self {
        Self {
            device: device.into(),
            attribute: attribute.into(),
            kind,
        }
    }

    /// Device name.
    #[must_use]
    pub fn device(&self) -> &str {
        &self.device
    }

    /// Attribute name.
    #[must_use]
    pub fn attribute(&self) -> &str {
        &self.attribute
    }

    /// Event kind.
    #[must_use]
    pub const fn kind(&self) -> EventKind {
        self.kind
    }
}

impl fmt::Display for EventKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}.{}", self.device, self.attribute, self.kind)
    }
}

/// Event delivered to listeners.
#[derive(Debug, Clone)]
pub struct DeviceEvent {
    /// Subscription the event belongs to.
    pub key: EventKey,
    /// Decoded reading, or the failure the event carries.
    pub result: Result<AttributeReading, EventError>,
}

impl DeviceEvent {
    /// Returns the reading if the event carries one.
    #[must_use]
    pub fn reading(&self) -> Option<&AttributeReading> {
        self.result.as_ref().ok()
    }

    /// Returns the failure if the event carries one.
    #[must_use]
    pub fn error(&self) -> Option<&EventError> {
        self.result.as_ref().err()
    }
}

/// Callback receiving events.
pub type Listener = Arc<dyn Fn(&DeviceEvent) + Send + Sync + 'static>;

/// Identifier of a registered listener, unique within a registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

/// Returned by a successful subscribe; pass it back to unsubscribe.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SubscriptionHandle {
    key: EventKey,
    listener: ListenerId,
}

impl SubscriptionHandle {
    /// Subscription key.
    #[must_use]
    pub const fn key(&self) -> &EventKey {
        &self.key
    }

    /// Listener this handle removes.
    #[must_use]
    pub const fn listener(&self) -> ListenerId {
        self.listener
    }
}

/// Lifecycle of the raw subscription behind a dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SubscriptionState {
    /// Installed in the table, raw subscribe not done yet.
    Pending,
    /// Raw subscription open.
    Active(RawHandle),
    /// Removed from the table; never reused.
    Closed,
}

/// Fans the events of one key out to its listeners.
pub struct EventDispatcher {
    key: EventKey,
    descriptor: Arc<AttributeDescriptor>,
    listeners: RwLock<Vec<(ListenerId, Listener)>>,
    pub(crate) state: tokio::sync::Mutex<SubscriptionState>,
}

impl EventDispatcher {
    pub(crate) fn new(key: EventKey, descriptor: Arc<AttributeDescriptor>) -> Self {
        Self {
            key,
            descriptor,
            listeners: RwLock::new(Vec::new()),
            state: tokio::sync::Mutex::new(SubscriptionState::Pending),
        }
    }

    /// Key served by this dispatcher.
    #[must_use]
    pub const fn key(&self) -> &EventKey {
        &self.key
    }

    /// Number of registered listeners.
    #[must_use]
    pub fn listener_count(&self) -> usize {
        self.listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Raw handle if the remote subscription is open.
    pub async fn raw_handle(&self) -> Option<RawHandle> {
        match *self.state.lock().await {
            SubscriptionState::Active(handle) => Some(handle),
            _ => None,
        }
    }

    pub(crate) fn attach(&self, id: ListenerId, listener: Listener) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
    }

    pub(crate) fn detach(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    pub(crate) fn detach_all(&self) -> usize {
        let mut listeners = self.listeners.write().unwrap_or_else(PoisonError::into_inner);
        let removed = listeners.len();
        listeners.clear();
        removed
    }

    /// Callback handed to the endpoint. Holds only a weak reference.
    pub(crate) fn raw_callback(self: &Arc<Self>) -> RawEventCallback {
        let dispatcher = Arc::downgrade(self);
        Arc::new(move |raw: Result<WireAttributeValue, RemoteError>| {
            if let Some(dispatcher) = Weak::upgrade(&dispatcher) {
                dispatcher.dispatch(raw);
            }
        })
    }

    /// Decodes a raw event and delivers it to every listener in order.
    ///
    /// A panicking listener is logged and skipped.
    pub fn dispatch(&self, raw: Result<WireAttributeValue, RemoteError>) {
        let event = DeviceEvent {
            key: self.key.clone(),
            result: self.decode(raw),
        };

        let listeners: Vec<(ListenerId, Listener)> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        for (id, listener) in listeners {
            let delivered = panic::catch_unwind(AssertUnwindSafe(|| listener(&event)));
            if delivered.is_err() {
                tracing::warn!("listener {:?} on {} panicked", id, self.key);
            }
        }
    }

    fn decode(
        &self,
        raw: Result<WireAttributeValue, RemoteError>,
    ) -> Result<AttributeReading, EventError> {
        let attr = raw?;
        if let Some(failure) = attr.failure {
            return Err(RemoteError::Device(failure).into());
        }
        let value = self
            .descriptor
            .extract(&attr.value)
            .inspect_err(|e| tracing::warn!("undecodable event on {}: {}", self.key, e))?;
        Ok(AttributeReading {
            value,
            timestamp: attr.timestamp,
            quality: attr.quality,
        })
    }
}

impl fmt::Debug for EventDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EventDispatcher")
            .field("key", &self.key)
            .field("listeners", &self.listener_count())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;

    use bytes::Bytes;

    use super::*;
    use crate::codec::CodecRegistry;
    use crate::error::DeviceFailure;
    use crate::remote::{AccessMode, AttrMeta};
    use crate::types::IntoValue;
    use crate::wire::{Quality, TypeTag, WireValue};

    fn dispatcher() -> Arc<EventDispatcher> {
        let meta = AttrMeta::scalar("Temperature", TypeTag::LONG, AccessMode::Read);
        let descriptor = AttributeDescriptor::new(meta, &CodecRegistry::standard()).unwrap();
        let key = EventKey::new("lab/oven/1", "Temperature", EventKind::Change);
        Arc::new(EventDispatcher::new(key, Arc::new(descriptor)))
    }

    fn raw(value: i32) -> WireAttributeValue {
        let payload = Bytes::copy_from_slice(&value.to_le_bytes());
        WireAttributeValue::new("Temperature")
            .with_value(WireValue::new(TypeTag::LONG, 1, 0, payload))
            .with_quality(Quality::Alarm)
    }

    fn recorder(log: &Arc<Mutex<Vec<String>>>, name: &'static str) -> Listener {
        let log = Arc::clone(log);
        Arc::new(move |event: &DeviceEvent| {
            let entry = match &event.result {
                Ok(reading) => format!("{name}:{}", reading.value.describe()),
                Err(_) => format!("{name}:error"),
            };
            log.lock().unwrap().push(entry);
        })
    }

    #[test]
    fn test_key_display() {
        let key = EventKey::new("lab/oven/1", "Temperature", EventKind::Periodic);
        assert_eq!(key.to_string(), "lab/oven/1/Temperature.periodic");
    }

    #[test]
    fn test_dispatch_in_insertion_order() {
        let dispatcher = dispatcher();
        let log = Arc::new(Mutex::new(Vec::new()));
        dispatcher.attach(ListenerId(1), recorder(&log, "a"));
        dispatcher.attach(ListenerId(2), recorder(&log, "b"));

        dispatcher.dispatch(Ok(raw(451)));

        assert_eq!(*log.lock().unwrap(), vec!["a:i32 scalar", "b:i32 scalar"]);
    }

    #[test]
    fn test_decoded_reading() {
        let dispatcher = dispatcher();
        let seen = Arc::new(Mutex::new(None));
        let slot = Arc::clone(&seen);
        dispatcher.attach(
            ListenerId(1),
            Arc::new(move |event: &DeviceEvent| {
                *slot.lock().unwrap() = event.reading().cloned();
            }),
        );

        dispatcher.dispatch(Ok(raw(-40)));

        let reading = seen.lock().unwrap().take().unwrap();
        assert_eq!(reading.value, (-40i32).into_value());
        assert_eq!(reading.quality, Quality::Alarm);
    }

    #[test]
    fn test_failures_become_error_events() {
        let dispatcher = dispatcher();
        let errors = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&errors);
        dispatcher.attach(
            ListenerId(1),
            Arc::new(move |event: &DeviceEvent| {
                sink.lock().unwrap().push(event.error().cloned());
            }),
        );

        dispatcher.dispatch(Err(RemoteError::transport("heartbeat lost")));
        let failure = DeviceFailure::single("Oven", "API_Overheat", "sensor fault");
        dispatcher.dispatch(Ok(WireAttributeValue::failed("Temperature", failure.clone())));
        dispatcher.dispatch(Ok(WireAttributeValue::new("Temperature")));

        let errors = errors.lock().unwrap();
        assert!(matches!(errors[0], Some(EventError::Remote(RemoteError::Transport { .. }))));
        assert_eq!(errors[1], Some(EventError::Remote(RemoteError::Device(failure))));
        assert!(matches!(errors[2], Some(EventError::Codec(_))));
    }

    #[test]
    fn test_panicking_listener_isolated() {
        let dispatcher = dispatcher();
        let log = Arc::new(Mutex::new(Vec::new()));
        dispatcher.attach(ListenerId(1), recorder(&log, "first"));
        dispatcher.attach(ListenerId(2), Arc::new(|_: &DeviceEvent| panic!("listener bug")));
        dispatcher.attach(ListenerId(3), recorder(&log, "last"));

        dispatcher.dispatch(Ok(raw(1)));
        dispatcher.dispatch(Ok(raw(2)));

        assert_eq!(log.lock().unwrap().len(), 4);
        assert_eq!(dispatcher.listener_count(), 3);
    }

    #[test]
    fn test_detach() {
        let dispatcher = dispatcher();
        let log = Arc::new(Mutex::new(Vec::new()));
        dispatcher.attach(ListenerId(7), recorder(&log, "a"));

        assert!(dispatcher.detach(ListenerId(7)));
        assert!(!dispatcher.detach(ListenerId(7)));

        dispatcher.dispatch(Ok(raw(3)));
        assert!(log.lock().unwrap().is_empty());
    }

    #[test]
    fn test_raw_callback_does_not_keep_dispatcher_alive() {
        let dispatcher = dispatcher();
        let callback = dispatcher.raw_callback();
        let weak = Arc::downgrade(&dispatcher);
        drop(dispatcher);

        assert!(weak.upgrade().is_none());
        callback(Ok(raw(5)));
    }
}
