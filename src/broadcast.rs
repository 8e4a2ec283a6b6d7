//! In-process fan-out of [`BroadcastEvent`]s
//!
//! ## Rules
//!
//! - `publish` delivers synchronously to every registered handler, in registration order.
//! - Each handler receives its own clone of the event.
//! - A handler returning an error (or panicking) is logged and skipped; it stays
//!   registered and the remaining handlers still run.
//! - There is no queue. A publish with no subscribers is dropped, and late subscribers
//!   catch up through the ingress snapshot instead.
//!
//! Handlers may subscribe or unsubscribe (including themselves) while a publish is in
//! flight: the handler list is copied before iterating, so the running publish finishes
//! against the list it started with.
//!
//! ```text
//! publish(&event)
//!     │  copy handler list (lock released before any handler runs)
//!     ├──► handler 1 (event.clone())
//!     ├──► handler 2 (event.clone())   Err / panic → logged, delivery continues
//!     └──► handler N (event.clone())
//! ```

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;
use tracing::{trace, warn};

use crate::events::BroadcastEvent;

type Handler = Arc<dyn Fn(BroadcastEvent) -> anyhow::Result<()> + Send + Sync>;

/// Opaque token identifying one registration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct Registry {
    next_id: u64,
    handlers: Vec<(SubscriptionId, Handler)>,
}

impl Registry {
    fn remove(&mut self, id: SubscriptionId) -> bool {
        let before = self.handlers.len();
        self.handlers.retain(|(existing, _)| *existing != id);
        before != self.handlers.len()
    }
}

/// Cheaply cloneable handle to a shared subscriber set
#[derive(Clone, Default)]
pub struct EventBroadcaster {
    registry: Arc<Mutex<Registry>>,
}

impl EventBroadcaster {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a handler. The returned [`Subscription`] removes it again.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(BroadcastEvent) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock();
        let id = SubscriptionId(registry.next_id);
        registry.next_id += 1;
        registry.handlers.push((id, Arc::new(handler)));
        trace!("subscriber {id:?} registered ({} total)", registry.handlers.len());

        Subscription {
            id,
            registry: Arc::downgrade(&self.registry),
        }
    }

    /// Deliver `event` to every handler registered at the time of the call.
    ///
    /// Returns the number of handlers that accepted the event.
    pub fn publish(&self, event: &BroadcastEvent) -> usize {
        let handlers: Vec<(SubscriptionId, Handler)> = self.registry.lock().handlers.clone();

        if handlers.is_empty() {
            trace!("no subscribers for {} event", event.kind());
            return 0;
        }

        let mut delivered = 0;
        for (id, handler) in handlers {
            match catch_unwind(AssertUnwindSafe(|| handler(event.clone()))) {
                Ok(Ok(())) => delivered += 1,
                Ok(Err(e)) => {
                    warn!("subscriber {id:?} failed to handle {} event: {e:#}", event.kind());
                }
                Err(_) => {
                    warn!("subscriber {id:?} panicked while handling {} event", event.kind());
                }
            }
        }

        trace!("published {} event to {delivered} subscribers", event.kind());
        delivered
    }

    pub fn subscriber_count(&self) -> usize {
        self.registry.lock().handlers.len()
    }

    /// Drop every registration
    pub fn clear(&self) {
        self.registry.lock().handlers.clear();
    }
}

/// Capability to remove one registration
///
/// Unsubscribing is immediate and idempotent. Dropping a `Subscription` does **not**
/// unsubscribe; hold it (or a [`SubscriptionGuard`]) for as long as delivery is wanted.
#[derive(Debug, Clone)]
pub struct Subscription {
    id: SubscriptionId,
    registry: Weak<Mutex<Registry>>,
}

impl Subscription {
    pub fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Remove the handler. Returns `true` if it was still registered.
    pub fn unsubscribe(&self) -> bool {
        let Some(registry) = self.registry.upgrade() else {
            return false;
        };
        let removed = registry.lock().remove(self.id);
        if removed {
            trace!("subscriber {:?} removed", self.id);
        }
        removed
    }

    /// Tie the registration to the lifetime of the returned guard.
    pub fn into_guard(self) -> SubscriptionGuard {
        SubscriptionGuard(self)
    }
}

/// Unsubscribes when dropped
#[derive(Debug)]
pub struct SubscriptionGuard(Subscription);

impl Drop for SubscriptionGuard {
    fn drop(&mut self) {
        self.0.unsubscribe();
    }
}
