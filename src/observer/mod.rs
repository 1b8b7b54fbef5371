// Copyright 2025 Chris Custine
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Observer registration and callback delivery.
//!
//! Observers are status callbacks keyed by an opaque id. Registration,
//! removal, and delivery iteration all take the registry lock, so the set of
//! observers can change safely while a dispatch is under way.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, Weak};

use crate::flags::Status;

type StatusCallback = Arc<dyn Fn(Status) + Send + Sync>;

struct RegistryInner {
    next_id: AtomicU64,
    observers: Mutex<Vec<(u64, StatusCallback)>>,
}

/// Registered observers for one monitor.
pub struct ObserverRegistry {
    inner: Arc<RegistryInner>,
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observers", &self.len())
            .finish()
    }
}

impl Default for ObserverRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ObserverRegistry {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RegistryInner {
                next_id: AtomicU64::new(1),
                observers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Register a status callback and return its subscription handle.
    pub fn subscribe<F>(&self, callback: F) -> Subscription
    where
        F: Fn(Status) + Send + Sync + 'static,
    {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .observers
            .lock()
            .unwrap()
            .push((id, Arc::new(callback)));
        Subscription {
            id,
            registry: Arc::downgrade(&self.inner),
        }
    }

    /// Invoke every registered callback with the given status.
    ///
    /// Runs on the delivery context. Membership is re-checked per observer
    /// under the lock, and each callback is invoked with the lock released:
    /// a cancellation performed on the delivery context (including from
    /// inside the observer's own callback) takes effect before the next
    /// invocation, while a cancellation racing in from another thread may
    /// see at most one delivery that was already in flight.
    pub fn notify(&self, status: Status) {
        let ids: Vec<u64> = {
            let observers = self.inner.observers.lock().unwrap();
            observers.iter().map(|(id, _)| *id).collect()
        };

        for id in ids {
            let callback = {
                let observers = self.inner.observers.lock().unwrap();
                observers
                    .iter()
                    .find(|(observer_id, _)| *observer_id == id)
                    .map(|(_, callback)| Arc::clone(callback))
            };
            if let Some(callback) = callback {
                callback(status);
            }
        }
    }

    /// Number of registered observers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.observers.lock().unwrap().len()
    }

    /// Whether no observers are registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Handle for one registered observer.
///
/// Cancelling removes the callback; dropping the handle without cancelling
/// leaves the observer registered for the registry's lifetime.
#[derive(Debug, Clone)]
pub struct Subscription {
    id: u64,
    registry: Weak<RegistryInner>,
}

impl Subscription {
    /// Remove the observer from its registry.
    ///
    /// Idempotent, never blocks, and safe to call after the registry has
    /// been dropped. See [`ObserverRegistry::notify`] for the guarantee
    /// given to cancellations that race with an in-flight dispatch.
    pub fn cancel(&self) {
        if let Some(inner) = self.registry.upgrade() {
            inner
                .observers
                .lock()
                .unwrap()
                .retain(|(id, _)| *id != self.id);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::OnceLock;

    use super::*;

    fn collector() -> (Arc<Mutex<Vec<Status>>>, impl Fn(Status) + Send + Sync) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        (seen, move |status| sink.lock().unwrap().push(status))
    }

    #[test]
    fn test_subscribe_and_notify() {
        let registry = ObserverRegistry::new();
        let (seen_a, callback_a) = collector();
        let (seen_b, callback_b) = collector();
        let _sub_a = registry.subscribe(callback_a);
        let _sub_b = registry.subscribe(callback_b);

        registry.notify(Status::Wifi);
        registry.notify(Status::Unreachable);

        assert_eq!(*seen_a.lock().unwrap(), vec![Status::Wifi, Status::Unreachable]);
        assert_eq!(*seen_b.lock().unwrap(), vec![Status::Wifi, Status::Unreachable]);
    }

    #[test]
    fn test_cancel_stops_delivery() {
        let registry = ObserverRegistry::new();
        let (seen, callback) = collector();
        let sub = registry.subscribe(callback);

        registry.notify(Status::Wifi);
        sub.cancel();
        registry.notify(Status::Cellular);

        assert_eq!(*seen.lock().unwrap(), vec![Status::Wifi]);
        assert!(registry.is_empty());
    }

    #[test]
    fn test_cancel_is_idempotent() {
        let registry = ObserverRegistry::new();
        let sub = registry.subscribe(|_| {});
        sub.cancel();
        sub.cancel();
        assert!(registry.is_empty());
    }

    #[test]
    fn test_cancel_inside_own_callback() {
        let registry = ObserverRegistry::new();
        let slot: Arc<OnceLock<Subscription>> = Arc::new(OnceLock::new());
        let (seen, _) = collector();

        let sink = Arc::clone(&seen);
        let slot_in_callback = Arc::clone(&slot);
        let sub = registry.subscribe(move |status| {
            sink.lock().unwrap().push(status);
            if let Some(sub) = slot_in_callback.get() {
                sub.cancel();
            }
        });
        slot.set(sub).unwrap();

        registry.notify(Status::Wifi);
        registry.notify(Status::Cellular);
        registry.notify(Status::Unreachable);

        // Cancelled itself during the first dispatch, never invoked again.
        assert_eq!(*seen.lock().unwrap(), vec![Status::Wifi]);
    }

    #[test]
    fn test_cancel_after_registry_dropped() {
        let registry = ObserverRegistry::new();
        let sub = registry.subscribe(|_| {});
        drop(registry);
        sub.cancel();
    }

    #[test]
    fn test_other_observers_survive_mid_dispatch_cancel() {
        let registry = ObserverRegistry::new();
        let slot: Arc<OnceLock<Subscription>> = Arc::new(OnceLock::new());

        let slot_in_callback = Arc::clone(&slot);
        let first = registry.subscribe(move |_| {
            if let Some(sub) = slot_in_callback.get() {
                sub.cancel();
            }
        });
        slot.set(first).unwrap();

        let (seen, callback) = collector();
        let _second = registry.subscribe(callback);

        registry.notify(Status::Wifi);

        // The second observer still sees the event the first one bailed on.
        assert_eq!(*seen.lock().unwrap(), vec![Status::Wifi]);
        assert_eq!(registry.len(), 1);
    }
}
