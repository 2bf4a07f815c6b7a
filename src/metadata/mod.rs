//! Per-proxy metadata cache.
//!
//! Describing an attribute or command is an expensive remote round-trip, so
//! each descriptor is fetched once and kept for the lifetime of the proxy.
//! Concurrent misses on the same kind are collapsed behind a guard: only the
//! first caller issues the describe call, the others wait and re-check.
//!
//! A "not found" answer is cached as a stable negative result. Any other
//! failure is returned to the caller and forgotten, so the next call retries.

pub mod descriptor;

use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::{Mutex, RwLock};

use crate::codec::CodecRegistry;
use crate::error::{Error, MetadataError, RemoteError, Result};
use crate::remote::RemoteEndpoint;

pub use descriptor::{AttributeDescriptor, CommandDescriptor};

/// Cached lookup outcome.
#[derive(Debug)]
enum Lookup<T> {
    Found(Arc<T>),
    Missing,
}

impl<T> Lookup<T> {
    fn resolve(&self, name: &str) -> Result<Arc<T>> {
        match self {
            Self::Found(descriptor) => Ok(Arc::clone(descriptor)),
            Self::Missing => Err(MetadataError::NotFound {
                name: name.to_owned(),
            }
            .into()),
        }
    }
}

type Table<T> = RwLock<HashMap<String, Lookup<T>>>;

/// Lazily-populated cache of attribute and command descriptors.
#[derive(Debug)]
pub struct MetadataCache {
    codecs: Arc<CodecRegistry>,
    attributes: Table<AttributeDescriptor>,
    commands: Table<CommandDescriptor>,
    attribute_guard: Mutex<()>,
    command_guard: Mutex<()>,
}

impl MetadataCache {
    /// Creates an empty cache resolving tags through `codecs`.
    #[must_use]
    pub fn new(codecs: Arc<CodecRegistry>) -> Self {
        Self {
            codecs,
            attributes: RwLock::new(HashMap::new()),
            commands: RwLock::new(HashMap::new()),
            attribute_guard: Mutex::new(()),
            command_guard: Mutex::new(()),
        }
    }

    /// Returns the codec registry used to build descriptors.
    #[must_use]
    pub fn codecs(&self) -> &Arc<CodecRegistry> {
        &self.codecs
    }

    /// Returns the descriptor for an attribute, describing it on first use.
    pub async fn attribute<E>(&self, endpoint: &E, name: &str) -> Result<Arc<AttributeDescriptor>>
    where
        E: RemoteEndpoint + ?Sized,
    {
        resolve(&self.attributes, &self.attribute_guard, name, move || async move {
            tracing::trace!("describe attribute {}/{}", endpoint.device_name(), name);
            let meta = endpoint
                .describe_attribute(name)
                .await
                .map_err(|e| classify(name, e))?;
            Ok(AttributeDescriptor::new(meta, &self.codecs)?)
        })
        .await
    }

    /// Returns the descriptor for a command, describing it on first use.
    pub async fn command<E>(&self, endpoint: &E, name: &str) -> Result<Arc<CommandDescriptor>>
    where
        E: RemoteEndpoint + ?Sized,
    {
        resolve(&self.commands, &self.command_guard, name, move || async move {
            tracing::trace!("describe command {}/{}", endpoint.device_name(), name);
            let meta = endpoint
                .describe_command(name)
                .await
                .map_err(|e| classify(name, e))?;
            Ok(CommandDescriptor::new(meta, &self.codecs)?)
        })
        .await
    }

    /// Returns true if the attribute exists.
    ///
    /// Only a "not found" answer maps to `false`; other failures propagate.
    pub async fn has_attribute<E>(&self, endpoint: &E, name: &str) -> Result<bool>
    where
        E: RemoteEndpoint + ?Sized,
    {
        exists(self.attribute(endpoint, name).await)
    }

    /// Returns true if the command exists.
    ///
    /// Only a "not found" answer maps to `false`; other failures propagate.
    pub async fn has_command<E>(&self, endpoint: &E, name: &str) -> Result<bool>
    where
        E: RemoteEndpoint + ?Sized,
    {
        exists(self.command(endpoint, name).await)
    }

    /// Returns the attribute descriptor if it is already cached.
    pub async fn cached_attribute(&self, name: &str) -> Option<Arc<AttributeDescriptor>> {
        match self.attributes.read().await.get(name) {
            Some(Lookup::Found(descriptor)) => Some(Arc::clone(descriptor)),
            _ => None,
        }
    }

    /// Returns the command descriptor if it is already cached.
    pub async fn cached_command(&self, name: &str) -> Option<Arc<CommandDescriptor>> {
        match self.commands.read().await.get(name) {
            Some(Lookup::Found(descriptor)) => Some(Arc::clone(descriptor)),
            _ => None,
        }
    }
}

fn classify(name: &str, source: RemoteError) -> Error {
    let error = if source.is_not_found() {
        MetadataError::NotFound {
            name: name.to_owned(),
        }
    } else {
        MetadataError::Transient {
            name: name.to_owned(),
            source,
        }
    };
    error.into()
}

fn exists<T>(lookup: Result<T>) -> Result<bool> {
    match lookup {
        Ok(_) => Ok(true),
        Err(Error::MetadataFetch(MetadataError::NotFound { .. })) => Ok(false),
        Err(e) => Err(e),
    }
}

/// Double-checked lookup: read fast path, then one describe call under `guard`.
async fn resolve<T, F, Fut>(
    table: &Table<T>,
    guard: &Mutex<()>,
    name: &str,
    fetch: F,
) -> Result<Arc<T>>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    if let Some(lookup) = table.read().await.get(name) {
        return lookup.resolve(name);
    }

    let _populate = guard.lock().await;

    if let Some(lookup) = table.read().await.get(name) {
        return lookup.resolve(name);
    }

    match fetch().await {
        Ok(descriptor) => {
            let descriptor = Arc::new(descriptor);
            table
                .write()
                .await
                .insert(name.to_owned(), Lookup::Found(Arc::clone(&descriptor)));
            tracing::debug!("cached metadata for '{}'", name);
            Ok(descriptor)
        }
        Err(e @ Error::MetadataFetch(MetadataError::NotFound { .. })) => {
            table.write().await.insert(name.to_owned(), Lookup::Missing);
            tracing::debug!("cached negative metadata result for '{}'", name);
            Err(e)
        }
        Err(e) => {
            tracing::debug!("metadata for '{}' not cached: {}", name, e);
            Err(e)
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use futures::future::join_all;

    use super::*;
    use crate::remote::memory::MemoryEndpoint;
    use crate::remote::{AccessMode, AttrMeta, CmdMeta};
    use crate::wire::TypeTag;

    fn endpoint() -> MemoryEndpoint {
        let endpoint = MemoryEndpoint::new("test/motor/1");
        endpoint
            .define_attribute(
                AttrMeta::scalar("Position", TypeTag::DOUBLE, AccessMode::ReadWrite),
                0.0f64,
            )
            .unwrap();
        endpoint.define_command(CmdMeta::new("Stop", TypeTag::VOID, TypeTag::VOID), |_| {
            Ok(crate::wire::WireValue::empty())
        });
        endpoint
    }

    fn cache() -> MetadataCache {
        MetadataCache::new(CodecRegistry::shared())
    }

    #[tokio::test]
    async fn test_descriptor_fetched_once() {
        let endpoint = endpoint();
        let cache = cache();

        let first = cache.attribute(&endpoint, "Position").await.unwrap();
        let second = cache.attribute(&endpoint, "Position").await.unwrap();

        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(endpoint.describe_attribute_calls(), 1);
        assert!(cache.cached_attribute("Position").await.is_some());
    }

    #[test]
    fn test_custom_registry_is_kept() {
        let codecs = Arc::new(CodecRegistry::standard());
        let cache = MetadataCache::new(Arc::clone(&codecs));
        assert!(Arc::ptr_eq(cache.codecs(), &codecs));
        assert!(!Arc::ptr_eq(cache.codecs(), &CodecRegistry::shared()));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_misses_collapse() {
        let endpoint = endpoint();
        endpoint.set_latency(Duration::from_millis(20));
        let cache = cache();

        let lookups = (0..16).map(|_| cache.attribute(&endpoint, "Position"));
        let results = join_all(lookups).await;

        assert!(results.iter().all(Result::is_ok));
        assert_eq!(endpoint.describe_attribute_calls(), 1);
    }

    #[tokio::test]
    async fn test_not_found_is_cached() {
        let endpoint = endpoint();
        let cache = cache();

        assert!(!cache.has_attribute(&endpoint, "Velocity").await.unwrap());
        assert!(!cache.has_attribute(&endpoint, "Velocity").await.unwrap());
        assert_eq!(endpoint.describe_attribute_calls(), 1);

        let err = cache.attribute(&endpoint, "Velocity").await.unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(endpoint.describe_attribute_calls(), 1);
    }

    #[tokio::test]
    async fn test_transient_failure_not_cached() {
        let endpoint = endpoint();
        let cache = cache();
        endpoint.fail_next_describe("Position", RemoteError::transport("connection reset"));

        let err = cache.attribute(&endpoint, "Position").await.unwrap_err();
        assert!(err.is_transient());
        assert!(cache.cached_attribute("Position").await.is_none());

        assert!(cache.attribute(&endpoint, "Position").await.is_ok());
        assert_eq!(endpoint.describe_attribute_calls(), 2);
    }

    #[tokio::test]
    async fn test_has_command_propagates_transient() {
        let endpoint = endpoint();
        let cache = cache();

        endpoint.set_offline(true);
        assert!(cache.has_command(&endpoint, "Stop").await.is_err());

        endpoint.set_offline(false);
        assert!(cache.has_command(&endpoint, "Stop").await.unwrap());
        assert!(!cache.has_command(&endpoint, "Start").await.unwrap());
        assert!(cache.cached_command("Stop").await.is_some());
        assert_eq!(endpoint.describe_command_calls(), 3);
    }

    #[tokio::test]
    async fn test_unsupported_type_not_cached() {
        let endpoint = endpoint();
        endpoint.define_raw_attribute(
            AttrMeta::scalar("Exotic", TypeTag(99), AccessMode::Read),
            crate::wire::WireValue::empty(),
        );
        let cache = cache();

        let err = cache.attribute(&endpoint, "Exotic").await.unwrap_err();
        assert!(matches!(err, Error::Codec(_)));
        assert!(cache.attribute(&endpoint, "Exotic").await.is_err());
        assert_eq!(endpoint.describe_attribute_calls(), 2);
    }
}
