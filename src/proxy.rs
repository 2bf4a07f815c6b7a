//! Typed device proxy.
//!
//! [`DeviceProxy`] combines the metadata cache, the format and codec layers
//! and the event registry on top of one [`RemoteEndpoint`].

use std::sync::Arc;

use crate::codec::CodecRegistry;
use crate::error::{Error, RemoteError, Result};
use crate::event::{
    DeviceEvent, EventKey, EventKind, EventRegistry, EventStream, Listener, SubscriptionHandle,
};
use crate::metadata::{AttributeDescriptor, CommandDescriptor, MetadataCache};
use crate::remote::RemoteEndpoint;
use crate::types::{AttributeReading, FromValue, IntoValue, Reading, Value};
use crate::wire::{WireAttributeValue, WireValue};

/// Default capacity of event stream buffers.
pub const DEFAULT_EVENT_BUFFER: usize = 256;

/// Proxy configuration.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    /// Capacity of each [`EventStream`] buffer.
    pub event_buffer: usize,
    /// Reject writes to read-only attributes before calling the device.
    pub enforce_access_mode: bool,
    /// Registry resolving type tags.
    pub codecs: Arc<CodecRegistry>,
}

impl ProxyConfig {
    /// Creates a configuration with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self {
            event_buffer: DEFAULT_EVENT_BUFFER,
            enforce_access_mode: true,
            codecs: CodecRegistry::shared(),
        }
    }

    /// Sets the event stream buffer capacity.
    #[must_use]
    pub const fn event_buffer(mut self, capacity: usize) -> Self {
        self.event_buffer = capacity;
        self
    }

    /// Enables or disables the client-side access mode check.
    #[must_use]
    pub const fn enforce_access_mode(mut self, enforce: bool) -> Self {
        self.enforce_access_mode = enforce;
        self
    }

    /// Sets the codec registry.
    #[must_use]
    pub fn codecs(mut self, codecs: Arc<CodecRegistry>) -> Self {
        self.codecs = codecs;
        self
    }
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self::new()
    }
}

/// Typed client for one remote device.
///
/// All operations take `&self` and may run concurrently from many tasks.
pub struct DeviceProxy<E: ?Sized> {
    config: ProxyConfig,
    metadata: MetadataCache,
    events: EventRegistry,
    endpoint: Arc<E>,
}

impl<E: RemoteEndpoint + ?Sized> DeviceProxy<E> {
    /// Creates a proxy with default configuration.
    #[must_use]
    pub fn new(endpoint: Arc<E>) -> Self {
        Self::with_config(endpoint, ProxyConfig::default())
    }

    /// Creates a proxy with the given configuration.
    #[must_use]
    pub fn with_config(endpoint: Arc<E>, config: ProxyConfig) -> Self {
        Self {
            metadata: MetadataCache::new(Arc::clone(&config.codecs)),
            events: EventRegistry::new(),
            config,
            endpoint,
        }
    }

    /// Device name.
    #[must_use]
    pub fn name(&self) -> &str {
        self.endpoint.device_name()
    }

    /// Underlying endpoint.
    #[must_use]
    pub const fn endpoint(&self) -> &Arc<E> {
        &self.endpoint
    }

    /// Active configuration.
    #[must_use]
    pub const fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Event registry of this proxy.
    #[must_use]
    pub const fn events(&self) -> &EventRegistry {
        &self.events
    }

    // ==================== Metadata ====================

    /// Returns the descriptor of an attribute.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MetadataFetch`] if the attribute does not exist or the
    /// describe call failed, [`Error::Codec`] if its tags are unsupported.
    pub async fn attribute_info(&self, name: &str) -> Result<Arc<AttributeDescriptor>> {
        self.metadata.attribute(self.endpoint.as_ref(), name).await
    }

    /// Returns the descriptor of a command.
    ///
    /// # Errors
    ///
    /// Same as [`attribute_info`](Self::attribute_info).
    pub async fn command_info(&self, name: &str) -> Result<Arc<CommandDescriptor>> {
        self.metadata.command(self.endpoint.as_ref(), name).await
    }

    /// Returns true if the device has the attribute.
    ///
    /// # Errors
    ///
    /// Returns an error if the describe call failed for any reason other than
    /// the attribute not existing.
    pub async fn has_attribute(&self, name: &str) -> Result<bool> {
        self.metadata.has_attribute(self.endpoint.as_ref(), name).await
    }

    /// Returns true if the device has the command.
    ///
    /// # Errors
    ///
    /// Returns an error if the describe call failed for any reason other than
    /// the command not existing.
    pub async fn has_command(&self, name: &str) -> Result<bool> {
        self.metadata.has_command(self.endpoint.as_ref(), name).await
    }

    // ==================== Attributes ====================

    /// Reads an attribute.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Remote`] if the call fails or the device reports a
    /// failure for this attribute, [`Error::Codec`] if the value cannot be
    /// extracted.
    pub async fn read_attribute(&self, name: &str) -> Result<AttributeReading> {
        let descriptor = self.attribute_info(name).await?;

        tracing::trace!("read {}/{}", self.name(), name);
        let attr = self
            .endpoint
            .read(name)
            .await
            .map_err(|e| Error::remote("read", name, e))?;

        if let Some(failure) = attr.failure {
            return Err(Error::remote("read", name, RemoteError::Device(failure)));
        }

        let value = descriptor.extract(&attr.value)?;
        Ok(AttributeReading {
            value,
            timestamp: attr.timestamp,
            quality: attr.quality,
        })
    }

    /// Reads an attribute as a native type, with timestamp and quality.
    ///
    /// # Errors
    ///
    /// Same as [`read_attribute`](Self::read_attribute), plus
    /// [`Error::Codec`] if the value is not a `T`.
    pub async fn read<T: FromValue>(&self, name: &str) -> Result<Reading<T>> {
        Ok(self.read_attribute(name).await?.into_typed()?)
    }

    /// Reads only the value of an attribute as a native type.
    ///
    /// # Errors
    ///
    /// Same as [`read`](Self::read).
    pub async fn read_value<T: FromValue>(&self, name: &str) -> Result<T> {
        Ok(self.read::<T>(name).await?.value)
    }

    /// Writes an attribute.
    ///
    /// Validation happens before the remote call: nothing is sent for a value
    /// of the wrong kind or one exceeding the declared dimensions.
    ///
    /// # Errors
    ///
    /// Returns [`Error::NotWritable`] for read-only attributes,
    /// [`Error::Codec`] if the value does not fit, [`Error::Remote`] if the
    /// write fails.
    pub async fn write_attribute(&self, name: &str, value: &Value) -> Result<()> {
        let mut attr = WireAttributeValue::new(name);
        let descriptor = self.attribute_info(name).await?;

        if self.config.enforce_access_mode && !descriptor.access().is_writable() {
            return Err(Error::NotWritable {
                name: name.to_owned(),
            });
        }
        descriptor.insert(&mut attr.value, value)?;

        tracing::trace!("write {}/{} = {}", self.name(), name, value.describe());
        self.endpoint
            .write(attr)
            .await
            .map_err(|e| Error::remote("write", name, e))
    }

    /// Writes a native value to an attribute.
    ///
    /// # Errors
    ///
    /// Same as [`write_attribute`](Self::write_attribute).
    pub async fn write<T: IntoValue>(&self, name: &str, value: T) -> Result<()> {
        self.write_attribute(name, &value.into_value()).await
    }

    // ==================== Commands ====================

    /// Executes a command.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Codec`] if the input or output does not match the
    /// command's types, [`Error::Remote`] if the call fails.
    pub async fn invoke_command(&self, name: &str, input: &Value) -> Result<Value> {
        let descriptor = self.command_info(name).await?;

        let mut argin = WireValue::empty();
        descriptor.input().insert(&mut argin, input)?;

        tracing::trace!("invoke {}/{}", self.name(), name);
        let argout = self
            .endpoint
            .invoke(name, argin)
            .await
            .map_err(|e| Error::remote("invoke", name, e))?;

        Ok(descriptor.output().extract(&argout)?)
    }

    /// Executes a command with native input and output types.
    ///
    /// # Errors
    ///
    /// Same as [`invoke_command`](Self::invoke_command).
    pub async fn invoke<I: IntoValue, O: FromValue>(&self, name: &str, input: I) -> Result<O> {
        let output = self.invoke_command(name, &input.into_value()).await?;
        Ok(O::from_value(output)?)
    }

    // ==================== Events ====================

    fn event_key(&self, name: &str, kind: EventKind) -> EventKey {
        EventKey::new(self.name(), name, kind)
    }

    /// Registers `listener` for events of `kind` on an attribute.
    ///
    /// Listeners of the same attribute and kind share one remote
    /// subscription; `filters` only apply when that subscription is opened.
    ///
    /// # Errors
    ///
    /// Returns [`Error::MetadataFetch`] for unknown attributes and
    /// [`Error::Subscription`] if the remote subscribe fails.
    pub async fn subscribe<F>(
        &self,
        name: &str,
        kind: EventKind,
        filters: &[String],
        listener: F,
    ) -> Result<SubscriptionHandle>
    where
        F: Fn(&DeviceEvent) + Send + Sync + 'static,
    {
        self.subscribe_listener(name, kind, filters, Arc::new(listener))
            .await
    }

    async fn subscribe_listener(
        &self,
        name: &str,
        kind: EventKind,
        filters: &[String],
        listener: Listener,
    ) -> Result<SubscriptionHandle> {
        let descriptor = self.attribute_info(name).await?;
        self.events
            .subscribe(
                self.endpoint.as_ref(),
                self.event_key(name, kind),
                descriptor,
                filters,
                listener,
            )
            .await
    }

    /// Subscribes and returns a buffered stream of events.
    ///
    /// # Errors
    ///
    /// Same as [`subscribe`](Self::subscribe).
    pub async fn event_stream(
        &self,
        name: &str,
        kind: EventKind,
        filters: &[String],
    ) -> Result<(SubscriptionHandle, EventStream)> {
        let (listener, stream) = EventStream::channel(self.config.event_buffer);
        let handle = self.subscribe_listener(name, kind, filters, listener).await?;
        Ok((handle, stream))
    }

    /// Removes one listener. The remote subscription is released with the
    /// last listener. Unknown handles are ignored.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Subscription`] if the remote unsubscribe fails.
    pub async fn unsubscribe(&self, handle: &SubscriptionHandle) -> Result<()> {
        self.events
            .unsubscribe(self.endpoint.as_ref(), handle)
            .await
    }

    /// Removes every listener for an attribute and kind.
    ///
    /// Returns the number of listeners removed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Subscription`] if the remote unsubscribe fails.
    pub async fn unsubscribe_all(&self, name: &str, kind: EventKind) -> Result<usize> {
        self.events
            .unsubscribe_all(self.endpoint.as_ref(), &self.event_key(name, kind))
            .await
    }

    /// Releases every remote subscription held by this proxy.
    ///
    /// # Errors
    ///
    /// Returns the first unsubscribe failure; all keys are still attempted.
    pub async fn close(&self) -> Result<()> {
        self.events.close(self.endpoint.as_ref()).await
    }
}

impl<E: ?Sized> Drop for DeviceProxy<E> {
    fn drop(&mut self) {
        if !self.events.is_empty() {
            tracing::debug!(
                "proxy dropped with {} open subscriptions; call close() to release them",
                self.events.len()
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use bytes::{Bytes, BytesMut};
    use futures::future::join_all;

    use super::*;
    use crate::codec::{Arity, ElementCodec, scalar::DoubleCodec};
    use crate::error::{CodecError, DeviceFailure, MetadataError};
    use crate::remote::memory::MemoryEndpoint;
    use crate::remote::{AccessMode, AttrMeta, CmdMeta};
    use crate::types::{DevState, Encoded, Image, Scalar, ScalarKind};
    use crate::wire::{Quality, TypeTag};

    fn init_tracing() {
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    }

    fn motor() -> Arc<MemoryEndpoint> {
        init_tracing();
        let device = MemoryEndpoint::new("sr/motor/7");
        device
            .define_attribute(
                AttrMeta::scalar("Position", TypeTag::DOUBLE, AccessMode::ReadWrite)
                    .with_unit("mm"),
                12.5f64,
            )
            .unwrap();
        device
            .define_attribute(
                AttrMeta::scalar("State", TypeTag::STATE, AccessMode::Read),
                DevState::Standby,
            )
            .unwrap();
        device
            .define_attribute(
                AttrMeta::spectrum("Trajectory", TypeTag::DOUBLE, AccessMode::ReadWrite, 4),
                vec![0.0f64, 1.0],
            )
            .unwrap();
        device
            .define_attribute(
                AttrMeta::image("Frame", TypeTag::USHORT, AccessMode::ReadWrite, 3, 2),
                Image::new(1, 1, vec![0u16]).unwrap(),
            )
            .unwrap();
        device
            .define_attribute(
                AttrMeta::scalar("Config", TypeTag::ENCODED, AccessMode::ReadWrite),
                Encoded::new("json", b"{}".to_vec()),
            )
            .unwrap();
        device.define_command(
            CmdMeta::new("Scale", TypeTag::VAR_DOUBLE_ARRAY, TypeTag::VAR_DOUBLE_ARRAY),
            |input| {
                let values: Vec<f64> = input
                    .payload()
                    .chunks_exact(8)
                    .map(|c| f64::from_le_bytes(c.try_into().unwrap()) * 2.0)
                    .collect();
                let payload: Vec<u8> = values.iter().flat_map(|v| v.to_le_bytes()).collect();
                Ok(WireValue::new(
                    TypeTag::VAR_DOUBLE_ARRAY,
                    values.len(),
                    0,
                    Bytes::from(payload),
                ))
            },
        );
        device.define_command(CmdMeta::new("Stop", TypeTag::VOID, TypeTag::VOID), |_| {
            Ok(WireValue::empty())
        });
        device.define_command(CmdMeta::new("Home", TypeTag::VOID, TypeTag::VOID), |_| {
            Err(RemoteError::Device(DeviceFailure::single(
                "Motor::home",
                "API_LimitSwitch",
                "limit switch engaged",
            )))
        });
        Arc::new(device)
    }

    fn proxy(device: &Arc<MemoryEndpoint>) -> DeviceProxy<MemoryEndpoint> {
        DeviceProxy::new(Arc::clone(device))
    }

    // ==================== Reads and writes ====================

    #[tokio::test]
    async fn test_read_carries_time_and_quality() {
        let device = motor();
        device.set_quality("Position", Quality::Changing);
        let proxy = proxy(&device);

        let reading = proxy.read::<f64>("Position").await.unwrap();
        assert_eq!(reading.value, 12.5);
        assert_eq!(reading.quality, Quality::Changing);

        let state: DevState = proxy.read_value("State").await.unwrap();
        assert_eq!(state, DevState::Standby);
    }

    #[tokio::test]
    async fn test_scalar_round_trip() {
        let device = motor();
        let proxy = proxy(&device);

        proxy.write("Position", -3.25f64).await.unwrap();
        assert_eq!(proxy.read_value::<f64>("Position").await.unwrap(), -3.25);

        // Integers widen into a double attribute.
        proxy.write("Position", 7i32).await.unwrap();
        assert_eq!(proxy.read_value::<f64>("Position").await.unwrap(), 7.0);

        let config = Encoded::new("json", br#"{"speed":3}"#.to_vec());
        proxy.write("Config", config.clone()).await.unwrap();
        assert_eq!(proxy.read_value::<Encoded>("Config").await.unwrap(), config);
    }

    #[tokio::test]
    async fn test_spectrum_and_image_round_trip() {
        let device = motor();
        let proxy = proxy(&device);

        let trajectory = vec![4.0f64, 3.0, 2.0, 1.0];
        proxy.write("Trajectory", trajectory.clone()).await.unwrap();
        assert_eq!(proxy.read_value::<Vec<f64>>("Trajectory").await.unwrap(), trajectory);

        let frame = Image::from_rows(vec![vec![1u16, 2, 3], vec![4, 5, 6]]).unwrap();
        proxy.write("Frame", frame.clone()).await.unwrap();
        let read: Image<u16> = proxy.read_value("Frame").await.unwrap();
        assert_eq!(read, frame);
        assert_eq!(read.get(0, 1), Some(&4));
    }

    #[tokio::test]
    async fn test_spectrum_over_bounds_not_sent() {
        let device = motor();
        let proxy = proxy(&device);

        let err = proxy
            .write("Trajectory", vec![0.0f64; 5])
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Codec(CodecError::DimensionExceeded { axis: 'x', len: 5, max: 4 })
        ));
        assert_eq!(device.write_calls(), 0);
    }

    #[tokio::test]
    async fn test_wrong_shape_not_sent() {
        let device = motor();
        let proxy = proxy(&device);

        let err = proxy.write("Position", vec![1.0f64]).await.unwrap_err();
        assert!(matches!(err, Error::Codec(CodecError::TypeInsertion { .. })));

        let err = proxy.read_value::<i32>("Position").await.unwrap_err();
        assert!(matches!(err, Error::Codec(CodecError::TypeMismatch { .. })));
        assert_eq!(device.write_calls(), 0);
    }

    #[tokio::test]
    async fn test_read_only_rejected_locally() {
        let device = motor();
        let proxy = proxy(&device);

        let err = proxy.write("State", DevState::On).await.unwrap_err();
        assert!(matches!(err, Error::NotWritable { .. }));
        assert_eq!(device.write_calls(), 0);

        let lax = DeviceProxy::with_config(
            Arc::clone(&device),
            ProxyConfig::new().enforce_access_mode(false),
        );
        let err = lax.write("State", DevState::On).await.unwrap_err();
        assert!(matches!(err, Error::Remote { source: RemoteError::Device(_), .. }));
        assert_eq!(device.write_calls(), 1);
    }

    #[tokio::test]
    async fn test_unknown_attribute() {
        let device = motor();
        let proxy = proxy(&device);

        assert!(proxy.read_attribute("Velocity").await.unwrap_err().is_not_found());
        assert!(!proxy.has_attribute("Velocity").await.unwrap());
        assert!(proxy.has_attribute("Position").await.unwrap());
        assert_eq!(device.read_calls(), 0);
    }

    #[tokio::test]
    async fn test_transport_failure_normalized() {
        let device = motor();
        let proxy = proxy(&device);
        proxy.attribute_info("Position").await.unwrap();

        device.set_offline(true);
        let err = proxy.read_attribute("Position").await.unwrap_err();
        assert!(err.is_transient());
        assert!(matches!(err, Error::Remote { operation: "read", .. }));
    }

    // ==================== Embedded failures ====================

    #[derive(Debug)]
    struct CountingDouble(Arc<AtomicUsize>);

    impl ElementCodec for CountingDouble {
        fn kind(&self) -> ScalarKind {
            ScalarKind::Double
        }

        fn decode(&self, buf: &mut Bytes) -> std::result::Result<Scalar, CodecError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            DoubleCodec.decode(buf)
        }

        fn encode(
            &self,
            value: &Scalar,
            buf: &mut BytesMut,
        ) -> std::result::Result<(), CodecError> {
            DoubleCodec.encode(value, buf)
        }
    }

    #[tokio::test]
    async fn test_embedded_failure_skips_codec() {
        let device = motor();
        let decodes = Arc::new(AtomicUsize::new(0));
        let mut codecs = CodecRegistry::standard();
        codecs.register(TypeTag::DOUBLE, Arity::Scalar, CountingDouble(Arc::clone(&decodes)));
        let proxy = DeviceProxy::with_config(
            Arc::clone(&device),
            ProxyConfig::new().codecs(Arc::new(codecs)),
        );

        let failure = DeviceFailure::single("Motor::read", "API_HardwareFault", "encoder lost");
        device.fail_reads("Position", failure.clone());

        let err = proxy.read_attribute("Position").await.unwrap_err();
        match err {
            Error::Remote {
                operation: "read",
                source: RemoteError::Device(reported),
                ..
            } => assert_eq!(reported, failure),
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(decodes.load(Ordering::SeqCst), 0);

        device.clear_read_failure("Position");
        assert_eq!(proxy.read_value::<f64>("Position").await.unwrap(), 12.5);
        assert_eq!(decodes.load(Ordering::SeqCst), 1);
    }

    // ==================== Commands ====================

    #[tokio::test]
    async fn test_invoke() {
        let device = motor();
        let proxy = proxy(&device);

        let scaled: Vec<f64> = proxy.invoke("Scale", vec![1.0f64, 2.5]).await.unwrap();
        assert_eq!(scaled, vec![2.0, 5.0]);

        proxy.invoke::<(), ()>("Stop", ()).await.unwrap();

        let info = proxy.command_info("Scale").await.unwrap();
        assert_eq!(info.argin_name(), "Vec<f64>");
        assert_eq!(device.describe_command_calls(), 2);
    }

    #[tokio::test]
    async fn test_invoke_failures() {
        let device = motor();
        let proxy = proxy(&device);

        let err = proxy.invoke::<f64, ()>("Stop", 1.0).await.unwrap_err();
        assert!(matches!(err, Error::Codec(CodecError::TypeInsertion { .. })));
        assert_eq!(device.invoke_calls(), 0);

        let err = proxy.invoke::<(), ()>("Home", ()).await.unwrap_err();
        assert!(err.to_string().contains("Motor::home:API_LimitSwitch(limit switch engaged)"));

        assert!(!proxy.has_command("Park").await.unwrap());
        assert!(matches!(
            proxy.invoke::<(), ()>("Park", ()).await.unwrap_err(),
            Error::MetadataFetch(MetadataError::NotFound { .. })
        ));
    }

    // ==================== Metadata ====================

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_reads_describe_once() {
        let device = motor();
        device.set_latency(Duration::from_millis(5));
        let proxy = Arc::new(proxy(&device));

        let tasks = (0..12).map(|_| {
            let proxy = Arc::clone(&proxy);
            tokio::spawn(async move { proxy.read_value::<f64>("Position").await })
        });
        for result in join_all(tasks).await {
            assert_eq!(result.unwrap().unwrap(), 12.5);
        }

        assert_eq!(device.describe_attribute_calls(), 1);
        assert_eq!(device.read_calls(), 12);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_transient_describe_then_success() {
        let device = motor();
        device.set_latency(Duration::from_millis(30));
        device.fail_next_describe("Position", RemoteError::transport("connection reset"));
        let proxy = Arc::new(proxy(&device));

        let first = tokio::spawn({
            let proxy = Arc::clone(&proxy);
            async move { proxy.attribute_info("Position").await }
        });
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = tokio::spawn({
            let proxy = Arc::clone(&proxy);
            async move { proxy.attribute_info("Position").await }
        });

        let first = first.await.unwrap();
        let second = second.await.unwrap();

        // The failing call is reported, not cached; the waiting caller
        // issues its own describe and resolves.
        assert!(first.unwrap_err().is_transient());
        let resolved = second.unwrap();
        assert_eq!(device.describe_attribute_calls(), 2);

        let retried = proxy.attribute_info("Position").await.unwrap();
        assert!(Arc::ptr_eq(&resolved, &retried));
        assert!(proxy.has_attribute("Position").await.unwrap());
        assert_eq!(device.describe_attribute_calls(), 2);
    }

    #[tokio::test]
    async fn test_attribute_info() {
        let device = motor();
        let proxy = proxy(&device);

        let info = proxy.attribute_info("Frame").await.unwrap();
        assert_eq!(info.native_name(), "Image<u16>");
        assert_eq!((info.bounds().max_dim_x, info.bounds().max_dim_y), (3, 2));

        let info = proxy.attribute_info("Position").await.unwrap();
        assert_eq!(info.meta().unit, "mm");
        assert_eq!(info.access(), AccessMode::ReadWrite);
    }

    // ==================== Events ====================

    fn recorder() -> (Arc<Mutex<Vec<f64>>>, impl Fn(&DeviceEvent) + Send + Sync + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let listener = move |event: &DeviceEvent| {
            if let Some(reading) = event.reading() {
                if let Value::Scalar(Scalar::Double(v)) = reading.value {
                    sink.lock().unwrap().push(v);
                }
            }
        };
        (seen, listener)
    }

    #[tokio::test]
    async fn test_two_listeners_one_subscription() {
        let device = motor();
        let proxy = proxy(&device);
        let (first, l1) = recorder();
        let (second, l2) = recorder();

        proxy.subscribe("Position", EventKind::Change, &[], l1).await.unwrap();
        proxy.subscribe("Position", EventKind::Change, &[], l2).await.unwrap();
        assert_eq!(device.subscribe_calls(), 1);

        proxy.write("Position", 1.0f64).await.unwrap();
        proxy.write("Position", 2.0f64).await.unwrap();

        assert_eq!(*first.lock().unwrap(), vec![1.0, 2.0]);
        assert_eq!(*second.lock().unwrap(), vec![1.0, 2.0]);
    }

    #[tokio::test]
    async fn test_resubscribe_after_release() {
        let device = motor();
        let proxy = proxy(&device);
        let (_, l1) = recorder();
        let (seen, l2) = recorder();

        let handle = proxy
            .subscribe("Position", EventKind::Change, &[], l1)
            .await
            .unwrap();
        proxy.unsubscribe(&handle).await.unwrap();
        assert_eq!(device.unsubscribe_calls(), 1);
        assert_eq!(device.active_subscriptions(), 0);

        proxy.subscribe("Position", EventKind::Change, &[], l2).await.unwrap();
        assert_eq!(device.subscribe_calls(), 2);

        proxy.write("Position", 9.0f64).await.unwrap();
        assert_eq!(*seen.lock().unwrap(), vec![9.0]);
    }

    #[tokio::test]
    async fn test_failing_listener_does_not_stop_delivery() {
        let device = motor();
        let proxy = proxy(&device);
        let (seen, listener) = recorder();

        proxy
            .subscribe("Position", EventKind::Change, &[], |_: &DeviceEvent| {
                panic!("listener failure");
            })
            .await
            .unwrap();
        proxy
            .subscribe("Position", EventKind::Change, &[], listener)
            .await
            .unwrap();

        proxy.write("Position", 4.0f64).await.unwrap();
        proxy.write("Position", 5.0f64).await.unwrap();

        assert_eq!(*seen.lock().unwrap(), vec![4.0, 5.0]);
        assert_eq!(device.active_subscriptions(), 1);
    }

    #[tokio::test]
    async fn test_event_stream() {
        let device = motor();
        let proxy = DeviceProxy::with_config(
            Arc::clone(&device),
            ProxyConfig::new().event_buffer(8),
        );
        let filters = vec!["abs_change=0.5".to_owned()];

        let (handle, mut stream) = proxy
            .event_stream("Position", EventKind::Change, &filters)
            .await
            .unwrap();
        assert_eq!(handle.key().to_string(), "sr/motor/7/Position.change");

        proxy.write("Position", 6.5f64).await.unwrap();
        device.push_error("Position", EventKind::Change, RemoteError::transport("lost"));

        let event = stream.recv().await.unwrap();
        assert_eq!(
            event.reading().map(|r| r.value.clone()),
            Some(Value::Scalar(Scalar::Double(6.5)))
        );
        let event = stream.recv().await.unwrap();
        assert!(event.error().is_some());

        assert_eq!(proxy.unsubscribe_all("Position", EventKind::Change).await.unwrap(), 1);
        assert_eq!(device.active_subscriptions(), 0);
    }

    #[tokio::test]
    async fn test_subscribe_unknown_attribute() {
        let device = motor();
        let proxy = proxy(&device);

        let err = proxy
            .subscribe("Velocity", EventKind::Change, &[], |_: &DeviceEvent| {})
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(device.subscribe_calls(), 0);
    }

    #[tokio::test]
    async fn test_close_releases_subscriptions() {
        let device = motor();
        let proxy = proxy(&device);

        for kind in [EventKind::Change, EventKind::Periodic, EventKind::User] {
            proxy
                .subscribe("State", kind, &[], |_: &DeviceEvent| {})
                .await
                .unwrap();
        }
        assert_eq!(device.active_subscriptions(), 3);

        proxy.close().await.unwrap();
        assert_eq!(device.active_subscriptions(), 0);
        assert!(proxy.events().is_empty());
    }

    #[tokio::test]
    async fn test_dyn_endpoint() {
        let device = motor();
        let endpoint: Arc<dyn RemoteEndpoint> = device.clone();
        let proxy = DeviceProxy::new(endpoint);

        assert_eq!(proxy.name(), "sr/motor/7");
        assert_eq!(proxy.read_value::<f64>("Position").await.unwrap(), 12.5);
    }
}
