//! Subscriptions for engine notifications.
//!
//! A listener registered with a [`ListenerSet`] stays registered for as long
//! as the [`Subscription`] returned at registration is alive. Dropping the
//! subscription unregisters the listener, so a notification can never reach
//! a listener whose owner is gone.
//!
//! Unregistering only flips a shared flag. Dead listeners are pruned the next
//! time the set dispatches, which keeps it safe to drop a subscription from
//! inside a notification callback.

use std::cell::Cell;
use std::rc::Rc;
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

impl SubscriptionId {
    /// Generate a new unique subscription ID.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriptionId {
    fn default() -> Self {
        Self::new()
    }
}

/// Handle to a registered listener.
///
/// Dropping this handle unregisters the listener.
#[must_use = "dropping a Subscription unregisters the listener"]
#[derive(Debug)]
pub struct Subscription {
    id: SubscriptionId,
    alive: Rc<Cell<bool>>,
}

impl Subscription {
    /// Get the subscription's unique ID.
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Unregister now instead of on drop.
    pub fn cancel(self) {}
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.alive.set(false);
    }
}

/// An ordered set of listeners of type `L`.
pub struct ListenerSet<L> {
    entries: Vec<(Rc<Cell<bool>>, L)>,
}

impl<L> ListenerSet<L> {
    /// Create an empty set.
    pub fn new() -> Self {
        Self {
            entries: Vec::new(),
        }
    }

    /// Register a listener.
    pub fn subscribe(&mut self, listener: L) -> Subscription {
        let alive = Rc::new(Cell::new(true));
        self.entries.push((Rc::clone(&alive), listener));
        Subscription {
            id: SubscriptionId::new(),
            alive,
        }
    }

    /// Call `f` for every live listener, in registration order.
    pub fn for_each(&mut self, mut f: impl FnMut(&mut L)) {
        self.entries.retain(|(alive, _)| alive.get());
        for (alive, listener) in self.entries.iter_mut() {
            if alive.get() {
                f(listener);
            }
        }
    }

    /// Number of live listeners.
    pub fn len(&self) -> usize {
        self.entries.iter().filter(|(alive, _)| alive.get()).count()
    }

    /// Whether no live listener is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl<L> Default for ListenerSet<L> {
    fn default() -> Self {
        Self::new()
    }
}
