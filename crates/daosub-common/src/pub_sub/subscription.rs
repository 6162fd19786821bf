//! Active subscription
use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tokio::sync::oneshot;

use super::bus::ListenerTree;
use super::Error;

/// Active Subscription
///
/// Dropping the subscription deregisters its listener.
pub struct Subscription<K, V>
where
    K: Ord + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + 'static,
{
    id: usize,
    key: K,
    listeners: ListenerTree<K, V>,
    active_subscribers: Arc<AtomicUsize>,
    receiver: oneshot::Receiver<V>,
}

impl<K, V> Subscription<K, V>
where
    K: Ord + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + 'static,
{
    pub(super) fn new(
        id: usize,
        key: K,
        listeners: ListenerTree<K, V>,
        active_subscribers: Arc<AtomicUsize>,
        receiver: oneshot::Receiver<V>,
    ) -> Self {
        Self {
            id,
            key,
            listeners,
            active_subscribers,
            receiver,
        }
    }

    /// Key this subscription listens on
    pub fn key(&self) -> &K {
        &self.key
    }

    /// Waits for the published value
    ///
    /// Must not be awaited again once it returned a value.
    pub async fn recv(&mut self) -> Result<V, Error> {
        (&mut self.receiver)
            .await
            .map_err(|_| Error::ChannelClosed)
    }

    /// Try receive the value or return right away
    pub fn try_recv(&mut self) -> Result<V, Error> {
        self.receiver.try_recv().map_err(|err| match err {
            oneshot::error::TryRecvError::Empty => Error::Empty,
            oneshot::error::TryRecvError::Closed => Error::ChannelClosed,
        })
    }

    /// Remove the listener from the bus
    ///
    /// Safe to call more than once.
    pub fn cancel(&self) {
        let removed = self.listeners.write().remove(&(self.key.clone(), self.id));

        if removed.is_some() {
            self.active_subscribers.fetch_sub(1, Ordering::Relaxed);
            tracing::trace!(key = ?self.key, id = self.id, "Listener removed");
        }
    }
}

impl<K, V> Drop for Subscription<K, V>
where
    K: Ord + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + 'static,
{
    fn drop(&mut self) {
        self.cancel();
    }
}
