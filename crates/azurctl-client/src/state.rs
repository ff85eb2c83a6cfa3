//! Receiver state store and observer registry.
//!
//! The store holds the last known value of every property and notifies
//! registered observers when a value actually changes. Change delivery
//! runs on a dedicated notifier task fed through a channel, so a slow
//! observer can never stall the read loop.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use azurctl_protocol::{Property, PropertyValue};
use parking_lot::{Mutex, RwLock};
use tokio::sync::mpsc;
use tracing::trace;

/// Identifies a registered observer, returned by
/// [`subscribe`](StateStore::subscribe).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(u64);

/// What an observer wants to be told about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Subscription {
    /// Changes to one property.
    Property(Property),
    /// Any property change.
    Any,
}

/// Observer callback, invoked with the property and its new value.
pub type ObserverFn = Arc<dyn Fn(Property, &PropertyValue) + Send + Sync>;

struct ObserverEntry {
    id: SubscriptionId,
    filter: Subscription,
    callback: ObserverFn,
}

/// In-memory mapping from property to last known value, with change
/// notifications.
///
/// Mutated only by [`apply`](StateStore::apply); readable from any
/// thread. Values persist until overwritten, including across
/// reconnects.
pub struct StateStore {
    values: RwLock<HashMap<Property, PropertyValue>>,
    /// Registration order is notification order.
    observers: Mutex<Vec<ObserverEntry>>,
    next_id: AtomicU64,
    /// Unbounded so `apply` never blocks frame ingestion; the notifier
    /// task drains it.
    change_tx: mpsc::UnboundedSender<(Property, PropertyValue)>,
}

impl StateStore {
    /// Create a store and the notifier that delivers its change events.
    ///
    /// Spawn [`StateNotifier::run`] on the runtime; observer callbacks
    /// execute on that task.
    pub fn new() -> (Arc<StateStore>, StateNotifier) {
        let (change_tx, change_rx) = mpsc::unbounded_channel();
        let store = Arc::new(StateStore {
            values: RwLock::new(HashMap::new()),
            observers: Mutex::new(Vec::new()),
            next_id: AtomicU64::new(1),
            change_tx,
        });
        let notifier = StateNotifier {
            store: Arc::clone(&store),
            change_rx,
        };
        (store, notifier)
    }

    /// Store a property value.
    ///
    /// Returns whether the value changed. Observers are notified only
    /// on an actual change, and exactly once per change.
    pub fn apply(&self, property: Property, value: PropertyValue) -> bool {
        {
            let mut values = self.values.write();
            if values.get(&property) == Some(&value) {
                trace!(%property, %value, "unchanged");
                return false;
            }
            values.insert(property, value.clone());
        }

        // Notifier gone means the client is shutting down; nothing to
        // deliver to.
        let _ = self.change_tx.send((property, value));
        true
    }

    /// Get the last known value, or [`PropertyValue::Null`] if the
    /// property was never observed.
    pub fn get(&self, property: Property) -> PropertyValue {
        self.values
            .read()
            .get(&property)
            .cloned()
            .unwrap_or(PropertyValue::Null)
    }

    /// Get an owned copy of the full property map.
    pub fn snapshot(&self) -> HashMap<Property, PropertyValue> {
        self.values.read().clone()
    }

    /// Register an observer. Observers fire in registration order,
    /// property-specific subscriptions before "any" subscriptions.
    pub fn subscribe<F>(&self, filter: Subscription, callback: F) -> SubscriptionId
    where
        F: Fn(Property, &PropertyValue) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.observers.lock().push(ObserverEntry {
            id,
            filter,
            callback: Arc::new(callback),
        });
        id
    }

    /// Remove an observer. Returns whether it was registered. Removal
    /// during a notification takes effect from the next change.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut observers = self.observers.lock();
        let before = observers.len();
        observers.retain(|entry| entry.id != id);
        observers.len() != before
    }

    /// Collect the callbacks to run for a change, in delivery order.
    fn observers_for(&self, property: Property) -> Vec<ObserverFn> {
        let observers = self.observers.lock();
        let matching = observers
            .iter()
            .filter(|e| e.filter == Subscription::Property(property));
        let any = observers.iter().filter(|e| e.filter == Subscription::Any);
        matching
            .chain(any)
            .map(|e| Arc::clone(&e.callback))
            .collect()
    }
}

/// Drains change events and invokes observer callbacks.
pub struct StateNotifier {
    store: Arc<StateStore>,
    change_rx: mpsc::UnboundedReceiver<(Property, PropertyValue)>,
}

impl StateNotifier {
    /// Run until the store is dropped.
    pub async fn run(mut self) {
        while let Some((property, value)) = self.change_rx.recv().await {
            // Snapshot the callback list so observers may unsubscribe
            // (or subscribe) from inside a callback.
            for callback in self.store.observers_for(property) {
                callback(property, &value);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    const RECV_TIMEOUT: Duration = Duration::from_secs(1);

    #[test]
    fn test_apply_reports_change() {
        let (store, _notifier) = StateStore::new();

        assert!(store.apply(Property::Power, PropertyValue::Bool(true)));
        assert!(!store.apply(Property::Power, PropertyValue::Bool(true)));
        assert!(store.apply(Property::Power, PropertyValue::Bool(false)));
    }

    #[test]
    fn test_get_and_snapshot() {
        let (store, _notifier) = StateStore::new();

        assert_eq!(store.get(Property::Volume), PropertyValue::Null);

        store.apply(Property::Volume, PropertyValue::Integer(-40));
        store.apply(Property::Power, PropertyValue::Bool(true));

        assert_eq!(store.get(Property::Volume), PropertyValue::Integer(-40));

        let snapshot = store.snapshot();
        assert_eq!(snapshot.len(), 2);
        assert_eq!(
            snapshot.get(&Property::Power),
            Some(&PropertyValue::Bool(true))
        );
    }

    #[tokio::test]
    async fn test_observer_fires_once_per_change() {
        let (store, notifier) = StateStore::new();
        tokio::spawn(notifier.run());

        let (tx, mut rx) = mpsc::unbounded_channel();
        store.subscribe(Subscription::Property(Property::Power), move |p, v| {
            let _ = tx.send((p, v.clone()));
        });

        store.apply(Property::Power, PropertyValue::Bool(true));
        let (property, value) = timeout(RECV_TIMEOUT, rx.recv())
            .await
            .expect("notification should arrive")
            .expect("channel open");
        assert_eq!(property, Property::Power);
        assert_eq!(value, PropertyValue::Bool(true));

        // Same value again: no notification. A subsequent change still
        // arrives, proving nothing was queued in between.
        store.apply(Property::Power, PropertyValue::Bool(true));
        store.apply(Property::Power, PropertyValue::Bool(false));
        let (_, value) = timeout(RECV_TIMEOUT, rx.recv())
            .await
            .expect("notification should arrive")
            .expect("channel open");
        assert_eq!(value, PropertyValue::Bool(false));
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_property_observers_before_any() {
        let (store, notifier) = StateStore::new();
        tokio::spawn(notifier.run());

        let (tx, mut rx) = mpsc::unbounded_channel();

        let tx_any = tx.clone();
        store.subscribe(Subscription::Any, move |_, _| {
            let _ = tx_any.send("any");
        });
        let tx_prop = tx.clone();
        store.subscribe(Subscription::Property(Property::Mute), move |_, _| {
            let _ = tx_prop.send("mute");
        });

        store.apply(Property::Mute, PropertyValue::Bool(true));

        // Property observer fires first even though "any" registered
        // earlier.
        let first = timeout(RECV_TIMEOUT, rx.recv()).await.unwrap().unwrap();
        let second = timeout(RECV_TIMEOUT, rx.recv()).await.unwrap().unwrap();
        assert_eq!((first, second), ("mute", "any"));
    }

    #[tokio::test]
    async fn test_unsubscribed_observer_is_silent() {
        let (store, notifier) = StateStore::new();
        tokio::spawn(notifier.run());

        let (tx, mut rx) = mpsc::unbounded_channel();
        let tx_obs = tx.clone();
        let id = store.subscribe(Subscription::Any, move |_, _| {
            let _ = tx_obs.send("gone");
        });
        assert!(store.unsubscribe(id));
        assert!(!store.unsubscribe(id));

        let tx_keep = tx.clone();
        store.subscribe(Subscription::Any, move |_, _| {
            let _ = tx_keep.send("kept");
        });

        store.apply(Property::Power, PropertyValue::Bool(true));
        let got = timeout(RECV_TIMEOUT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(got, "kept");
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_other_property_does_not_fire_filtered_observer() {
        let (store, notifier) = StateStore::new();
        tokio::spawn(notifier.run());

        let (tx, mut rx) = mpsc::unbounded_channel();
        store.subscribe(Subscription::Property(Property::Power), move |p, _| {
            let _ = tx.send(p);
        });

        store.apply(Property::Volume, PropertyValue::Integer(-30));
        store.apply(Property::Power, PropertyValue::Bool(true));

        let got = timeout(RECV_TIMEOUT, rx.recv()).await.unwrap().unwrap();
        assert_eq!(got, Property::Power);
        assert!(rx.try_recv().is_err());
    }
}
