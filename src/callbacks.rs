//! Multicast callback registry.
//!
//! Host code subscribes closures to lower-cased symbolic event names
//! (`privmsg`, `rpl_welcome`, ...). Every callback receives the engine that
//! owns the registry plus the line's raw prefix and arguments, so it can
//! answer through the engine's write operations or add and remove other
//! subscriptions while running.
//!
//! Dispatch works on a snapshot: whatever a callback does to the registry
//! only affects the next publish.

use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// A subscribed callback: `(host, prefix, args)`.
pub type Callback<T> = Arc<dyn Fn(&mut T, &str, &[String]) + Send + Sync>;

/// Anything that owns a [`CallbackRegistry`] keyed to itself.
///
/// Publishing needs the host mutably (callbacks receive it) while the
/// subscriber list lives inside it, so dispatch goes through this trait
/// rather than through the registry alone.
pub trait CallbackHost: Sized + 'static {
    fn callbacks(&mut self) -> &mut CallbackRegistry<Self>;
}

/// Handle returned by `subscribe`; pass it back to `unsubscribe`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Subscription {
    id: u64,
    event: String,
}

impl Subscription {
    /// Event name this subscription listens on (lower-cased).
    pub fn event(&self) -> &str {
        &self.event
    }
}

/// Event name to subscriber list table.
pub struct CallbackRegistry<T> {
    subscribers: HashMap<String, Vec<(u64, Callback<T>)>>,
    next_id: u64,
}

impl<T> Default for CallbackRegistry<T> {
    fn default() -> Self {
        Self {
            subscribers: HashMap::new(),
            next_id: 1,
        }
    }
}

impl<T> fmt::Debug for CallbackRegistry<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<&str, usize> = self
            .subscribers
            .iter()
            .map(|(event, subs)| (event.as_str(), subs.len()))
            .collect();
        f.debug_struct("CallbackRegistry")
            .field("subscribers", &counts)
            .finish()
    }
}

fn event_key(event: &str) -> String {
    event.to_ascii_lowercase()
}

impl<T> CallbackRegistry<T> {
    pub fn new() -> Self {
        Self::default()
    }

    fn reserve(&mut self, event: &str) -> Subscription {
        let id = self.next_id;
        self.next_id += 1;
        Subscription {
            id,
            event: event_key(event),
        }
    }

    fn insert(&mut self, subscription: &Subscription, callback: Callback<T>) {
        self.subscribers
            .entry(subscription.event.clone())
            .or_default()
            .push((subscription.id, callback));
    }

    /// Add `callback` to the subscribers of `event`.
    pub fn subscribe<F>(&mut self, event: &str, callback: F) -> Subscription
    where
        F: Fn(&mut T, &str, &[String]) + Send + Sync + 'static,
    {
        let subscription = self.reserve(event);
        self.insert(&subscription, Arc::new(callback));
        subscription
    }

    /// Remove one subscription. Returns false if it was already gone.
    pub fn unsubscribe(&mut self, subscription: &Subscription) -> bool {
        let Some(subs) = self.subscribers.get_mut(&subscription.event) else {
            return false;
        };
        let before = subs.len();
        subs.retain(|(id, _)| *id != subscription.id);
        let removed = subs.len() != before;
        if subs.is_empty() {
            self.subscribers.remove(&subscription.event);
        }
        removed
    }

    /// Drop every subscriber of `event`.
    pub fn clear(&mut self, event: &str) {
        self.subscribers.remove(&event_key(event));
    }

    /// Number of live subscribers for `event`.
    pub fn subscriber_count(&self, event: &str) -> usize {
        self.subscribers
            .get(&event_key(event))
            .map_or(0, Vec::len)
    }

    pub fn has_subscribers(&self, event: &str) -> bool {
        self.subscriber_count(event) > 0
    }

    /// Copy of the current subscriber list for `event`.
    pub fn snapshot(&self, event: &str) -> Vec<Callback<T>> {
        self.subscribers
            .get(&event_key(event))
            .map(|subs| subs.iter().map(|(_, cb)| Arc::clone(cb)).collect())
            .unwrap_or_default()
    }
}

impl<T: CallbackHost> CallbackRegistry<T> {
    /// Subscribe a callback that removes itself before its first run.
    ///
    /// The subscription id is reserved before the wrapper is built so the
    /// wrapper can unsubscribe exactly itself.
    pub fn subscribe_once<F>(&mut self, event: &str, callback: F) -> Subscription
    where
        F: FnOnce(&mut T, &str, &[String]) + Send + 'static,
    {
        let subscription = self.reserve(event);
        let slot = Mutex::new(Some(callback));
        let handle = subscription.clone();
        let wrapper = move |host: &mut T, prefix: &str, args: &[String]| {
            host.callbacks().unsubscribe(&handle);
            let callback = slot.lock().take();
            if let Some(callback) = callback {
                callback(host, prefix, args);
            }
        };
        self.insert(&subscription, Arc::new(wrapper));
        subscription
    }

    /// Invoke every subscriber of `event` with `(host, prefix, args)`.
    ///
    /// Returns how many callbacks ran.
    pub fn publish(host: &mut T, event: &str, prefix: &str, args: &[String]) -> usize {
        let snapshot = host.callbacks().snapshot(event);
        for callback in &snapshot {
            callback(host, prefix, args);
        }
        snapshot.len()
    }
}
