//! Typed change notifications.
//!
//! State-changing setters on the views emit an event carrying the value
//! before and after the change. Hosts either subscribe with a callback or
//! drain the queued events once per frame. Events are queued only while no
//! callback is registered, and the queue keeps the newest
//! [`QUEUE_CAPACITY`] of them.

use std::collections::VecDeque;

pub const QUEUE_CAPACITY: usize = 1024;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Before/after payload of a change.
#[derive(Clone, Debug, PartialEq)]
pub struct Change<T> {
    pub before: T,
    pub after: T,
}

impl<T: PartialEq> Change<T> {
    /// `None` when nothing actually changed.
    pub fn new(before: T, after: T) -> Option<Self> {
        (before != after).then_some(Self { before, after })
    }
}

type Callback<E> = Box<dyn FnMut(&E) + Send + Sync>;

pub struct EventBus<E> {
    next_id: u64,
    subscribers: Vec<(SubscriptionId, Callback<E>)>,
    queue: VecDeque<E>,
}

impl<E> Default for EventBus<E> {
    fn default() -> Self {
        Self {
            next_id: 0,
            subscribers: Vec::new(),
            queue: VecDeque::new(),
        }
    }
}

impl<E> EventBus<E> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&mut self, callback: impl FnMut(&E) + Send + Sync + 'static) -> SubscriptionId {
        self.next_id += 1;
        let id = SubscriptionId(self.next_id);
        self.subscribers.push((id, Box::new(callback)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|(sid, _)| *sid != id);
        self.subscribers.len() != before
    }

    pub fn emit(&mut self, event: E) {
        if !self.subscribers.is_empty() {
            for (_, callback) in &mut self.subscribers {
                callback(&event);
            }
            return;
        }
        if self.queue.len() == QUEUE_CAPACITY {
            self.queue.pop_front();
        }
        self.queue.push_back(event);
    }

    pub fn drain(&mut self) -> Vec<E> {
        self.queue.drain(..).collect()
    }

    pub fn pending(&self) -> impl Iterator<Item = &E> {
        self.queue.iter()
    }
}

impl<E> std::fmt::Debug for EventBus<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("subscribers", &self.subscribers.len())
            .field("queued", &self.queue.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn change_is_none_when_equal() {
        assert!(Change::new(1, 1).is_none());
        assert_eq!(Change::new(1, 2), Some(Change { before: 1, after: 2 }));
    }

    #[test]
    fn queue_is_used_only_without_subscribers() {
        let seen = Arc::new(AtomicUsize::new(0));
        let mut bus = EventBus::new();
        bus.emit(1);
        let counter = seen.clone();
        let id = bus.subscribe(move |e: &u32| {
            counter.fetch_add(*e as usize, Ordering::Relaxed);
        });
        bus.emit(2);
        bus.emit(3);
        assert_eq!(seen.load(Ordering::Relaxed), 5);
        assert_eq!(bus.drain(), vec![1]);
        assert!(bus.pending().next().is_none());

        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.emit(10);
        assert_eq!(seen.load(Ordering::Relaxed), 5);
        assert_eq!(bus.drain(), vec![10]);
    }

    #[test]
    fn subscribed_bus_does_not_accumulate() {
        let mut bus = EventBus::new();
        bus.subscribe(|_: &u32| {});
        for i in 0..10_000 {
            bus.emit(i);
        }
        assert_eq!(bus.pending().count(), 0);
    }

    #[test]
    fn undrained_queue_keeps_newest_events() {
        let mut bus = EventBus::new();
        for i in 0..(QUEUE_CAPACITY as u32 + 10) {
            bus.emit(i);
        }
        let events = bus.drain();
        assert_eq!(events.len(), QUEUE_CAPACITY);
        assert_eq!(events[0], 10);
        assert_eq!(events.last(), Some(&(QUEUE_CAPACITY as u32 + 9)));
    }
}
