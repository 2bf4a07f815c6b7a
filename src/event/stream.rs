//! Channel-backed event consumption.

use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::event::{DeviceEvent, Listener};

/// Receiving end of an event subscription.
///
/// Events that arrive while the buffer is full are dropped.
#[derive(Debug)]
pub struct EventStream {
    receiver: mpsc::Receiver<DeviceEvent>,
}

impl EventStream {
    /// Creates a stream and the listener feeding it.
    pub(crate) fn channel(capacity: usize) -> (Listener, Self) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let listener: Listener = std::sync::Arc::new(move |event: &DeviceEvent| {
            match sender.try_send(event.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    tracing::warn!("event stream for {} full, dropping event", event.key);
                }
                Err(TrySendError::Closed(_)) => {
                    tracing::trace!("event stream for {} closed", event.key);
                }
            }
        });
        (listener, Self { receiver })
    }

    /// Receives the next event.
    ///
    /// Returns `None` once the subscription is gone and the buffer is drained.
    pub async fn recv(&mut self) -> Option<DeviceEvent> {
        self.receiver.recv().await
    }

    /// Returns a buffered event without waiting.
    pub fn try_recv(&mut self) -> Option<DeviceEvent> {
        self.receiver.try_recv().ok()
    }
}
