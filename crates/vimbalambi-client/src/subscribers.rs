//! Typed publish/subscribe registry keyed by event kind.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;

use crate::events::{ClientEvent, EventKind};

pub type EventCallback = Arc<dyn Fn(&ClientEvent) + Send + Sync>;

/// Handle returned by `on`; pass it back to `off` for exact removal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subscription {
    kind: EventKind,
    id: u64,
}

/// Callbacks run in registration order. Registering the same callback twice
/// yields two subscriptions and two invocations per event; that is a
/// documented property, not a defect.
#[derive(Default)]
pub struct SubscriberTable {
    subscribers: DashMap<EventKind, Vec<(u64, EventCallback)>>,
    next_id: AtomicU64,
}

impl SubscriberTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on(&self, kind: EventKind, callback: EventCallback) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.subscribers.entry(kind).or_default().push((id, callback));
        Subscription { kind, id }
    }

    /// Remove exactly the subscription named by the handle. Returns whether
    /// anything was removed.
    pub fn off(&self, sub: Subscription) -> bool {
        match self.subscribers.get_mut(&sub.kind) {
            Some(mut list) => {
                let before = list.len();
                list.retain(|(id, _)| *id != sub.id);
                before != list.len()
            }
            None => false,
        }
    }

    /// Invoke every subscriber for the event's kind, synchronously, in
    /// registration order. Callbacks are cloned out of the shard guard
    /// first, so they may re-enter `on`/`off`.
    pub fn emit(&self, event: &ClientEvent) {
        let callbacks: Vec<EventCallback> = match self.subscribers.get(&event.kind()) {
            Some(list) => list.iter().map(|(_, cb)| Arc::clone(cb)).collect(),
            None => return,
        };
        for callback in callbacks {
            callback(event);
        }
    }
}
