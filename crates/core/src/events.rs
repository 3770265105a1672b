//! Minimal pub/sub primitive shared by every runtime component.
//!
//! Single-threaded by design (browser event-loop model): handlers run
//! synchronously on `emit`, on the caller's stack. `emit` iterates over a
//! snapshot of the handler list, so a handler may subscribe or unsubscribe
//! while an emit is in flight without invalidating the iteration.

use serde_json::Value;
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

/// Handle returned by [`EventEmitter::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

type Handler = Rc<dyn Fn(&Value)>;

struct Subscription {
    id: SubscriptionId,
    handler: Handler,
    once: bool,
}

#[derive(Default)]
struct Inner {
    next_id: u64,
    subscribers: HashMap<String, Vec<Subscription>>,
}

/// Cheaply cloneable event bus. Clones share the same subscriber table.
#[derive(Clone, Default)]
pub struct EventEmitter {
    inner: Rc<RefCell<Inner>>,
}

impl EventEmitter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to `event`. The handler runs on every emit until removed.
    pub fn on(&self, event: &str, handler: impl Fn(&Value) + 'static) -> SubscriptionId {
        self.subscribe(event, Rc::new(handler), false)
    }

    /// Subscribe for a single emission.
    pub fn once(&self, event: &str, handler: impl Fn(&Value) + 'static) -> SubscriptionId {
        self.subscribe(event, Rc::new(handler), true)
    }

    fn subscribe(&self, event: &str, handler: Handler, once: bool) -> SubscriptionId {
        let mut inner = self.inner.borrow_mut();
        inner.next_id += 1;
        let id = SubscriptionId(inner.next_id);
        inner
            .subscribers
            .entry(event.to_string())
            .or_default()
            .push(Subscription { id, handler, once });
        id
    }

    /// Remove a subscription. Unknown ids are a no-op.
    pub fn off(&self, id: SubscriptionId) {
        let mut inner = self.inner.borrow_mut();
        for subs in inner.subscribers.values_mut() {
            subs.retain(|s| s.id != id);
        }
    }

    /// Emit `event` with a JSON payload. Returns the number of handlers run.
    pub fn emit(&self, event: &str, payload: &Value) -> usize {
        // Snapshot under the borrow, run handlers outside it so they can
        // re-enter on/off/emit.
        let snapshot: Vec<(SubscriptionId, Handler, bool)> = {
            let inner = self.inner.borrow();
            match inner.subscribers.get(event) {
                Some(subs) => subs
                    .iter()
                    .map(|s| (s.id, Rc::clone(&s.handler), s.once))
                    .collect(),
                None => return 0,
            }
        };

        for (id, handler, once) in &snapshot {
            if *once {
                self.off(*id);
            }
            handler(payload);
        }
        snapshot.len()
    }

    /// Number of live subscriptions for `event`.
    pub fn listener_count(&self, event: &str) -> usize {
        self.inner
            .borrow()
            .subscribers
            .get(event)
            .map_or(0, Vec::len)
    }
}
