//! Publish-on-mutation fan-out shared by the ledger and the workflow.
//!
//! Observers receive the component's full current record set, synchronously
//! and in registration order, every time a mutation actually changes state.
//! There is no buffering or replay: a late subscriber calls the owning
//! service's read accessor to catch up.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

type Observer<T> = Box<dyn Fn(&[T]) + Send>;

struct Registry<T> {
    observers: Mutex<Vec<(u64, Observer<T>)>>,
    next_id: AtomicU64,
}

pub struct Broadcaster<T> {
    registry: Arc<Registry<T>>,
}

/// Keeps an observer registered. Dropping it unsubscribes.
pub struct Subscription<T> {
    registry: Arc<Registry<T>>,
    id: u64,
}

impl<T> Default for Broadcaster<T> {
    fn default() -> Self {
        Broadcaster {
            registry: Arc::new(Registry {
                observers: Mutex::new(Vec::new()),
                next_id: AtomicU64::new(0),
            }),
        }
    }
}

impl<T> Broadcaster<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe<F>(&self, observer: F) -> Subscription<T>
    where
        F: Fn(&[T]) + Send + 'static,
    {
        let id = self.registry.next_id.fetch_add(1, Ordering::Relaxed);
        let mut observers = self
            .registry
            .observers
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        observers.push((id, Box::new(observer)));
        Subscription {
            registry: Arc::clone(&self.registry),
            id,
        }
    }

    pub fn publish(&self, records: &[T]) {
        let observers = self
            .registry
            .observers
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        for (_, observer) in observers.iter() {
            observer(records);
        }
    }
}

impl<T> Subscription<T> {
    pub fn unsubscribe(self) {}
}

impl<T> Drop for Subscription<T> {
    fn drop(&mut self) {
        let mut observers = self
            .registry
            .observers
            .lock()
            .unwrap_or_else(|e| e.into_inner());
        observers.retain(|(id, _)| *id != self.id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sink() -> (Arc<Mutex<Vec<Vec<i32>>>>, impl Fn(&[i32]) + Send + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let writer = Arc::clone(&seen);
        (seen, move |records: &[i32]| {
            writer.lock().unwrap().push(records.to_vec());
        })
    }

    #[test]
    fn delivers_full_set_in_registration_order() {
        let order = Arc::new(Mutex::new(Vec::new()));
        let broadcaster = Broadcaster::new();

        let first = Arc::clone(&order);
        let _a = broadcaster.subscribe(move |_: &[i32]| first.lock().unwrap().push("a"));
        let second = Arc::clone(&order);
        let _b = broadcaster.subscribe(move |_: &[i32]| second.lock().unwrap().push("b"));

        broadcaster.publish(&[1, 2]);
        assert_eq!(*order.lock().unwrap(), vec!["a", "b"]);
    }

    #[test]
    fn late_subscribers_get_no_replay() {
        let broadcaster = Broadcaster::new();
        broadcaster.publish(&[1]);

        let (seen, observer) = sink();
        let _sub = broadcaster.subscribe(observer);
        assert!(seen.lock().unwrap().is_empty());

        broadcaster.publish(&[1, 2]);
        assert_eq!(*seen.lock().unwrap(), vec![vec![1, 2]]);
    }

    #[test]
    fn dropping_the_subscription_stops_delivery() {
        let broadcaster = Broadcaster::new();
        let (seen, observer) = sink();
        let sub = broadcaster.subscribe(observer);

        broadcaster.publish(&[1]);
        sub.unsubscribe();
        broadcaster.publish(&[2]);

        assert_eq!(*seen.lock().unwrap(), vec![vec![1]]);
    }
}
