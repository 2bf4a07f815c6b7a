//! In-memory remote endpoint.
//!
//! [`MemoryEndpoint`] simulates one device entirely in process: attributes
//! hold wire values, commands run closures, and subscriptions receive events
//! pushed with [`MemoryEndpoint::push_event`]. Failures and latency can be
//! injected, and every remote call is counted.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, SystemTime};

use futures::future::BoxFuture;

use crate::codec::CodecRegistry;
use crate::error::{CodecError, DeviceFailure, RemoteError};
use crate::event::EventKind;
use crate::metadata::AttributeDescriptor;
use crate::remote::{AttrMeta, CmdMeta, RawEventCallback, RawHandle, RemoteEndpoint};
use crate::types::IntoValue;
use crate::wire::{Quality, WireAttributeValue, WireValue};

/// Handler executed for a command invocation.
pub type CommandHandler =
    Arc<dyn Fn(WireValue) -> Result<WireValue, RemoteError> + Send + Sync + 'static>;

struct AttributeSlot {
    meta: AttrMeta,
    value: WireValue,
    quality: Quality,
    timestamp: SystemTime,
    failure: Option<DeviceFailure>,
}

impl AttributeSlot {
    fn snapshot(&self) -> WireAttributeValue {
        match &self.failure {
            Some(failure) => WireAttributeValue::failed(&self.meta.name, failure.clone()),
            None => WireAttributeValue::new(&self.meta.name)
                .with_value(self.value.clone())
                .with_quality(self.quality)
                .with_timestamp(self.timestamp),
        }
    }
}

struct CommandSlot {
    meta: CmdMeta,
    handler: CommandHandler,
}

struct SubscriptionSlot {
    attribute: String,
    kind: EventKind,
    filters: Vec<String>,
    callback: RawEventCallback,
}

#[derive(Default)]
struct DeviceState {
    attributes: HashMap<String, AttributeSlot>,
    commands: HashMap<String, CommandSlot>,
    subscriptions: HashMap<RawHandle, SubscriptionSlot>,
    describe_faults: HashMap<String, VecDeque<RemoteError>>,
    subscribe_faults: VecDeque<RemoteError>,
    push_on_subscribe: bool,
    offline: bool,
    latency: Duration,
}

#[derive(Default)]
struct Counters {
    read: AtomicUsize,
    write: AtomicUsize,
    describe_attribute: AtomicUsize,
    describe_command: AtomicUsize,
    invoke: AtomicUsize,
    subscribe: AtomicUsize,
    unsubscribe: AtomicUsize,
}

/// Simulated device reachable without a network.
pub struct MemoryEndpoint {
    name: String,
    state: Mutex<DeviceState>,
    counters: Counters,
    next_handle: AtomicU64,
}

impl MemoryEndpoint {
    /// Creates a device with no attributes or commands.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: Mutex::new(DeviceState::default()),
            counters: Counters::default(),
            next_handle: AtomicU64::new(1),
        }
    }

    fn state(&self) -> MutexGuard<'_, DeviceState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Counts the call, applies latency and fails if the device is offline.
    async fn enter(&self, counter: &AtomicUsize) -> Result<(), RemoteError> {
        counter.fetch_add(1, Ordering::SeqCst);
        let (latency, offline) = {
            let state = self.state();
            (state.latency, state.offline)
        };
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        if offline {
            return Err(RemoteError::transport(format!("{} is unreachable", self.name)));
        }
        Ok(())
    }

    // ==================== Device Setup ====================

    /// Defines an attribute holding `initial`, encoded per its metadata.
    pub fn define_attribute(
        &self,
        meta: AttrMeta,
        initial: impl IntoValue,
    ) -> Result<(), CodecError> {
        let descriptor = AttributeDescriptor::new(meta.clone(), &CodecRegistry::shared())?;
        let mut value = WireValue::empty();
        descriptor.insert(&mut value, &initial.into_value())?;
        self.define_raw_attribute(meta, value);
        Ok(())
    }

    /// Defines an attribute holding an already-encoded value.
    pub fn define_raw_attribute(&self, meta: AttrMeta, value: WireValue) {
        let slot = AttributeSlot {
            meta,
            value,
            quality: Quality::Valid,
            timestamp: SystemTime::now(),
            failure: None,
        };
        self.state().attributes.insert(slot.meta.name.clone(), slot);
    }

    /// Defines a command.
    pub fn define_command<F>(&self, meta: CmdMeta, handler: F)
    where
        F: Fn(WireValue) -> Result<WireValue, RemoteError> + Send + Sync + 'static,
    {
        let slot = CommandSlot {
            meta,
            handler: Arc::new(handler),
        };
        self.state().commands.insert(slot.meta.name.clone(), slot);
    }

    /// Replaces the stored value of an attribute without notifying subscribers.
    pub fn set_raw_value(&self, name: &str, value: WireValue) -> bool {
        match self.state().attributes.get_mut(name) {
            Some(slot) => {
                slot.value = value;
                slot.timestamp = SystemTime::now();
                true
            }
            None => false,
        }
    }

    /// Sets the quality reported for an attribute.
    pub fn set_quality(&self, name: &str, quality: Quality) {
        if let Some(slot) = self.state().attributes.get_mut(name) {
            slot.quality = quality;
        }
    }

    /// Makes reads of an attribute carry an embedded failure.
    pub fn fail_reads(&self, name: &str, failure: DeviceFailure) {
        if let Some(slot) = self.state().attributes.get_mut(name) {
            slot.failure = Some(failure);
        }
    }

    /// Restores normal reads of an attribute.
    pub fn clear_read_failure(&self, name: &str) {
        if let Some(slot) = self.state().attributes.get_mut(name) {
            slot.failure = None;
        }
    }

    /// Makes the next describe call for `name` fail with `error`.
    pub fn fail_next_describe(&self, name: &str, error: RemoteError) {
        self.state()
            .describe_faults
            .entry(name.to_owned())
            .or_default()
            .push_back(error);
    }

    /// Makes the next raw subscribe call fail with `error`.
    pub fn fail_next_subscribe(&self, error: RemoteError) {
        self.state().subscribe_faults.push_back(error);
    }

    /// Delivers the current value to each new subscription before subscribe returns.
    pub fn push_on_subscribe(&self, enabled: bool) {
        self.state().push_on_subscribe = enabled;
    }

    /// Makes every call fail with a transport error while `offline` is true.
    pub fn set_offline(&self, offline: bool) {
        self.state().offline = offline;
    }

    /// Delays every call by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        self.state().latency = latency;
    }

    // ==================== Events ====================

    /// Delivers the current value of an attribute to matching subscriptions.
    ///
    /// Returns the number of callbacks invoked.
    pub fn push_event(&self, name: &str, kind: EventKind) -> usize {
        let (snapshot, callbacks) = {
            let state = self.state();
            let Some(slot) = state.attributes.get(name) else {
                return 0;
            };
            (slot.snapshot(), Self::callbacks(&state, name, kind))
        };
        for callback in &callbacks {
            callback(Ok(snapshot.clone()));
        }
        callbacks.len()
    }

    /// Delivers an error event to matching subscriptions.
    pub fn push_error(&self, name: &str, kind: EventKind, error: RemoteError) -> usize {
        let callbacks = Self::callbacks(&self.state(), name, kind);
        for callback in &callbacks {
            callback(Err(error.clone()));
        }
        callbacks.len()
    }

    fn callbacks(state: &DeviceState, name: &str, kind: EventKind) -> Vec<RawEventCallback> {
        state
            .subscriptions
            .values()
            .filter(|sub| sub.attribute == name && sub.kind == kind)
            .map(|sub| Arc::clone(&sub.callback))
            .collect()
    }

    // ==================== Inspection ====================

    /// Returns the stored value of an attribute.
    #[must_use]
    pub fn stored_value(&self, name: &str) -> Option<WireValue> {
        self.state().attributes.get(name).map(|slot| slot.value.clone())
    }

    /// Number of open raw subscriptions.
    #[must_use]
    pub fn active_subscriptions(&self) -> usize {
        self.state().subscriptions.len()
    }

    /// Filters passed when the given subscription was opened.
    #[must_use]
    pub fn subscription_filters(&self, handle: RawHandle) -> Option<Vec<String>> {
        self.state()
            .subscriptions
            .get(&handle)
            .map(|sub| sub.filters.clone())
    }

    /// Number of read calls received.
    #[must_use]
    pub fn read_calls(&self) -> usize {
        self.counters.read.load(Ordering::SeqCst)
    }

    /// Number of write calls received.
    #[must_use]
    pub fn write_calls(&self) -> usize {
        self.counters.write.load(Ordering::SeqCst)
    }

    /// Number of attribute describe calls received.
    #[must_use]
    pub fn describe_attribute_calls(&self) -> usize {
        self.counters.describe_attribute.load(Ordering::SeqCst)
    }

    /// Number of command describe calls received.
    #[must_use]
    pub fn describe_command_calls(&self) -> usize {
        self.counters.describe_command.load(Ordering::SeqCst)
    }

    /// Number of command invocations received.
    #[must_use]
    pub fn invoke_calls(&self) -> usize {
        self.counters.invoke.load(Ordering::SeqCst)
    }

    /// Number of raw subscribe calls received.
    #[must_use]
    pub fn subscribe_calls(&self) -> usize {
        self.counters.subscribe.load(Ordering::SeqCst)
    }

    /// Number of raw unsubscribe calls received.
    #[must_use]
    pub fn unsubscribe_calls(&self) -> usize {
        self.counters.unsubscribe.load(Ordering::SeqCst)
    }
}

impl RemoteEndpoint for MemoryEndpoint {
    fn device_name(&self) -> &str {
        &self.name
    }

    fn read<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, Result<WireAttributeValue, RemoteError>> {
        Box::pin(async move {
            self.enter(&self.counters.read).await?;
            self.state()
                .attributes
                .get(name)
                .map(AttributeSlot::snapshot)
                .ok_or_else(|| RemoteError::not_found(name))
        })
    }

    fn write(&self, value: WireAttributeValue) -> BoxFuture<'_, Result<(), RemoteError>> {
        Box::pin(async move {
            self.enter(&self.counters.write).await?;
            let (snapshot, callbacks) = {
                let mut state = self.state();
                let slot = state
                    .attributes
                    .get_mut(&value.name)
                    .ok_or_else(|| RemoteError::not_found(&value.name))?;
                if !slot.meta.access.is_writable() {
                    return Err(RemoteError::Device(DeviceFailure::single(
                        &self.name,
                        "API_AttrNotWritable",
                        format!("attribute {} is read only", value.name),
                    )));
                }
                slot.value = value.value;
                slot.timestamp = SystemTime::now();
                let snapshot = slot.snapshot();
                (snapshot, Self::callbacks(&state, &value.name, EventKind::Change))
            };
            tracing::trace!("{} written, notifying {} listeners", value.name, callbacks.len());
            for callback in callbacks {
                callback(Ok(snapshot.clone()));
            }
            Ok(())
        })
    }

    fn describe_attribute<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, Result<AttrMeta, RemoteError>> {
        Box::pin(async move {
            self.enter(&self.counters.describe_attribute).await?;
            let mut state = self.state();
            if let Some(error) = state.describe_faults.get_mut(name).and_then(VecDeque::pop_front) {
                return Err(error);
            }
            state
                .attributes
                .get(name)
                .map(|slot| slot.meta.clone())
                .ok_or_else(|| RemoteError::not_found(name))
        })
    }

    fn describe_command<'a>(
        &'a self,
        name: &'a str,
    ) -> BoxFuture<'a, Result<CmdMeta, RemoteError>> {
        Box::pin(async move {
            self.enter(&self.counters.describe_command).await?;
            let mut state = self.state();
            if let Some(error) = state.describe_faults.get_mut(name).and_then(VecDeque::pop_front) {
                return Err(error);
            }
            state
                .commands
                .get(name)
                .map(|slot| slot.meta.clone())
                .ok_or_else(|| RemoteError::not_found(name))
        })
    }

    fn invoke<'a>(
        &'a self,
        name: &'a str,
        input: WireValue,
    ) -> BoxFuture<'a, Result<WireValue, RemoteError>> {
        Box::pin(async move {
            self.enter(&self.counters.invoke).await?;
            let handler = self
                .state()
                .commands
                .get(name)
                .map(|slot| Arc::clone(&slot.handler))
                .ok_or_else(|| RemoteError::not_found(name))?;
            handler(input)
        })
    }

    fn subscribe<'a>(
        &'a self,
        name: &'a str,
        kind: EventKind,
        filters: &'a [String],
        callback: RawEventCallback,
    ) -> BoxFuture<'a, Result<RawHandle, RemoteError>> {
        Box::pin(async move {
            self.enter(&self.counters.subscribe).await?;
            let (handle, initial) = {
                let mut state = self.state();
                if let Some(error) = state.subscribe_faults.pop_front() {
                    return Err(error);
                }
                let snapshot = match state.attributes.get(name) {
                    Some(slot) => slot.snapshot(),
                    None => return Err(RemoteError::not_found(name)),
                };
                let handle = RawHandle(self.next_handle.fetch_add(1, Ordering::SeqCst));
                let initial = state
                    .push_on_subscribe
                    .then(|| (Arc::clone(&callback), snapshot));
                state.subscriptions.insert(
                    handle,
                    SubscriptionSlot {
                        attribute: name.to_owned(),
                        kind,
                        filters: filters.to_vec(),
                        callback,
                    },
                );
                (handle, initial)
            };
            tracing::trace!("opened {} for {}.{}", handle, name, kind);
            if let Some((callback, snapshot)) = initial {
                callback(Ok(snapshot));
            }
            Ok(handle)
        })
    }

    fn unsubscribe(&self, handle: RawHandle) -> BoxFuture<'_, Result<(), RemoteError>> {
        Box::pin(async move {
            self.enter(&self.counters.unsubscribe).await?;
            self.state()
                .subscriptions
                .remove(&handle)
                .map(|_| ())
                .ok_or_else(|| RemoteError::not_found(handle.to_string()))
        })
    }
}
