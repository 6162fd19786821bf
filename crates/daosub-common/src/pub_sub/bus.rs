//! Bus producer

use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use tokio::sync::oneshot;

use super::subscription::Subscription;

/// Internal Index Tree
pub type ListenerTree<K, V> = Arc<
    RwLock<
        BTreeMap<
            // Index with a subscription unique ID
            (K, usize),
            oneshot::Sender<V>,
        >,
    >,
>;

/// Keyed one-shot notification bus
pub struct NotificationBus<K, V>
where
    K: Ord + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + 'static,
{
    listeners: ListenerTree<K, V>,
    unique_subscription_counter: AtomicUsize,
    active_subscribers: Arc<AtomicUsize>,
}

impl<K, V> Default for NotificationBus<K, V>
where
    K: Ord + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> Debug for NotificationBus<K, V>
where
    K: Ord + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + 'static,
{
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationBus")
            .field("active_subscribers", &self.active_subscribers())
            .finish()
    }
}

impl<K, V> NotificationBus<K, V>
where
    K: Ord + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + 'static,
{
    /// Create a new instance
    pub fn new() -> Self {
        Self {
            listeners: Default::default(),
            unique_subscription_counter: 0.into(),
            active_subscribers: Arc::new(0.into()),
        }
    }

    /// Total number of registered listeners across all keys
    pub fn active_subscribers(&self) -> usize {
        self.active_subscribers.load(Ordering::Relaxed)
    }

    /// Number of listeners currently registered for `key`
    pub fn listeners_for(&self, key: &K) -> usize {
        self.listeners
            .read()
            .range((key.clone(), 0)..=(key.clone(), usize::MAX))
            .count()
    }

    /// Register a listener for `key`
    ///
    /// The listener stays registered until a value is published for the key, or until
    /// the returned [`Subscription`] is cancelled or dropped.
    pub fn subscribe(&self, key: K) -> Subscription<K, V> {
        let (sender, receiver) = oneshot::channel();
        let id = self
            .unique_subscription_counter
            .fetch_add(1, Ordering::Relaxed);

        self.listeners.write().insert((key.clone(), id), sender);
        self.active_subscribers.fetch_add(1, Ordering::Relaxed);

        tracing::trace!(?key, id, "Listener registered");

        Subscription::new(
            id,
            key,
            self.listeners.clone(),
            self.active_subscribers.clone(),
            receiver,
        )
    }

    /// Deliver `value` to every listener registered for `key` and deregister them
    ///
    /// Returns the number of listeners that received the value. Publishing with nobody
    /// listening drops the value.
    pub fn publish(&self, key: &K, value: V) -> usize {
        let delivered = self
            .drain(key)
            .into_iter()
            .filter_map(|sender| sender.send(value.clone()).ok())
            .count();

        tracing::trace!(?key, delivered, "Published");

        delivered
    }

    /// Deregister every listener for `key` without a value
    ///
    /// Their [`Subscription::recv`] returns [`super::Error::ChannelClosed`]. Returns the
    /// number of listeners removed.
    pub fn close(&self, key: &K) -> usize {
        let closed = self.drain(key).len();

        tracing::trace!(?key, closed, "Closed");

        closed
    }

    fn drain(&self, key: &K) -> Vec<oneshot::Sender<V>> {
        let senders = {
            let mut listeners = self.listeners.write();
            let ids = listeners
                .range((key.clone(), 0)..=(key.clone(), usize::MAX))
                .map(|((_, id), _)| *id)
                .collect::<Vec<_>>();

            ids.into_iter()
                .filter_map(|id| listeners.remove(&(key.clone(), id)))
                .collect::<Vec<_>>()
        };

        self.active_subscribers
            .fetch_sub(senders.len(), Ordering::Relaxed);

        senders
    }
}
