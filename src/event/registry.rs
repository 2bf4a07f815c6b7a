//! Per-proxy table of shared subscriptions.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use crate::error::{Error, Result};
use crate::event::{
    EventDispatcher, EventKey, Listener, ListenerId, SubscriptionHandle, SubscriptionState,
};
use crate::metadata::AttributeDescriptor;
use crate::remote::RemoteEndpoint;

/// Maps each [`EventKey`] to the dispatcher owning its raw subscription.
///
/// Every key goes through `Pending -> Active -> Closed`. A closed dispatcher
/// has left the table and is never reused; a later subscribe installs a new
/// one and opens a new raw subscription.
#[derive(Debug, Default)]
pub struct EventRegistry {
    table: Mutex<HashMap<EventKey, Arc<EventDispatcher>>>,
    next_listener: AtomicU64,
}

impl EventRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn table(&self) -> MutexGuard<'_, HashMap<EventKey, Arc<EventDispatcher>>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Returns the dispatcher for `key`, installing a pending one if absent.
    fn install(
        &self,
        key: &EventKey,
        descriptor: &Arc<AttributeDescriptor>,
    ) -> Arc<EventDispatcher> {
        match self.table().entry(key.clone()) {
            Entry::Occupied(entry) => Arc::clone(entry.get()),
            Entry::Vacant(entry) => {
                let dispatcher =
                    Arc::new(EventDispatcher::new(key.clone(), Arc::clone(descriptor)));
                Arc::clone(entry.insert(dispatcher))
            }
        }
    }

    /// Removes `dispatcher` from the table unless another instance replaced it.
    fn remove(&self, dispatcher: &Arc<EventDispatcher>) {
        let mut table = self.table();
        if table
            .get(dispatcher.key())
            .is_some_and(|current| Arc::ptr_eq(current, dispatcher))
        {
            table.remove(dispatcher.key());
        }
    }

    /// Attaches `listener` to the subscription for `key`.
    ///
    /// The first listener of a key opens the raw subscription with `filters`;
    /// later listeners share it and their filters are ignored.
    pub async fn subscribe<E>(
        &self,
        endpoint: &E,
        key: EventKey,
        descriptor: Arc<AttributeDescriptor>,
        filters: &[String],
        listener: Listener,
    ) -> Result<SubscriptionHandle>
    where
        E: RemoteEndpoint + ?Sized,
    {
        let id = ListenerId(self.next_listener.fetch_add(1, Ordering::Relaxed));

        loop {
            let dispatcher = self.install(&key, &descriptor);
            let mut state = dispatcher.state.lock().await;

            match *state {
                SubscriptionState::Closed => {
                    tracing::trace!("{} closed while waiting, retrying", key);
                }
                SubscriptionState::Active(raw) => {
                    dispatcher.attach(id, listener);
                    tracing::debug!(
                        "reusing {} for {} ({} listeners)",
                        raw,
                        key,
                        dispatcher.listener_count()
                    );
                    return Ok(SubscriptionHandle { key, listener: id });
                }
                SubscriptionState::Pending => {
                    tracing::trace!("subscribe {}", key);
                    // Attached first: endpoints may push the current value
                    // before subscribe returns.
                    dispatcher.attach(id, listener);
                    let callback = dispatcher.raw_callback();
                    match endpoint
                        .subscribe(key.attribute(), key.kind(), filters, callback)
                        .await
                    {
                        Ok(raw) => {
                            *state = SubscriptionState::Active(raw);
                            tracing::debug!("opened {} for {}", raw, key);
                            return Ok(SubscriptionHandle { key, listener: id });
                        }
                        Err(source) => {
                            dispatcher.detach(id);
                            *state = SubscriptionState::Closed;
                            self.remove(&dispatcher);
                            return Err(Error::Subscription {
                                key: key.to_string(),
                                source,
                            });
                        }
                    }
                }
            }
        }
    }

    /// Removes the listener behind `handle`.
    ///
    /// Releases the raw subscription when it was the last listener. Unknown
    /// or already removed handles are a no-op.
    pub async fn unsubscribe<E>(&self, endpoint: &E, handle: &SubscriptionHandle) -> Result<()>
    where
        E: RemoteEndpoint + ?Sized,
    {
        let Some(dispatcher) = self.dispatcher(handle.key()) else {
            return Ok(());
        };
        let mut state = dispatcher.state.lock().await;

        if !dispatcher.detach(handle.listener()) || dispatcher.listener_count() > 0 {
            return Ok(());
        }
        self.release(endpoint, &dispatcher, &mut state).await
    }

    /// Removes every listener of `key` and releases its raw subscription.
    ///
    /// Returns the number of listeners removed; zero if the key had none.
    pub async fn unsubscribe_all<E>(&self, endpoint: &E, key: &EventKey) -> Result<usize>
    where
        E: RemoteEndpoint + ?Sized,
    {
        let Some(dispatcher) = self.dispatcher(key) else {
            return Ok(0);
        };
        let mut state = dispatcher.state.lock().await;
        if *state == SubscriptionState::Closed {
            return Ok(0);
        }

        let removed = dispatcher.detach_all();
        self.release(endpoint, &dispatcher, &mut state).await?;
        Ok(removed)
    }

    /// Releases every subscription in the table.
    ///
    /// All keys are attempted; the first failure is returned.
    pub async fn close<E>(&self, endpoint: &E) -> Result<()>
    where
        E: RemoteEndpoint + ?Sized,
    {
        let keys: Vec<EventKey> = self.table().keys().cloned().collect();
        let mut outcome = Ok(());
        for key in keys {
            if let Err(e) = self.unsubscribe_all(endpoint, &key).await {
                tracing::warn!("failed to release {}: {}", key, e);
                if outcome.is_ok() {
                    outcome = Err(e);
                }
            }
        }
        outcome
    }

    /// Closes `dispatcher` and drops its raw subscription.
    ///
    /// The caller holds the dispatcher's state lock.
    async fn release<E>(
        &self,
        endpoint: &E,
        dispatcher: &Arc<EventDispatcher>,
        state: &mut SubscriptionState,
    ) -> Result<()>
    where
        E: RemoteEndpoint + ?Sized,
    {
        let previous = std::mem::replace(state, SubscriptionState::Closed);
        self.remove(dispatcher);

        let SubscriptionState::Active(raw) = previous else {
            return Ok(());
        };
        tracing::trace!("unsubscribe {}", raw);
        endpoint.unsubscribe(raw).await.map_err(|source| Error::Subscription {
            key: dispatcher.key().to_string(),
            source,
        })?;
        tracing::debug!("released {} for {}", raw, dispatcher.key());
        Ok(())
    }

    /// Returns the dispatcher currently installed for `key`.
    #[must_use]
    pub fn dispatcher(&self, key: &EventKey) -> Option<Arc<EventDispatcher>> {
        self.table().get(key).cloned()
    }

    /// Number of keys with an installed dispatcher.
    #[must_use]
    pub fn len(&self) -> usize {
        self.table().len()
    }

    /// Returns true if no key has a dispatcher.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.table().is_empty()
    }
}
