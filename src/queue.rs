use std::collections::VecDeque;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Unbounded FIFO between native producer threads and the frame thread.
///
/// Producers call [`EventQueue::enqueue`] from any thread. The frame thread
/// calls [`EventQueue::drain_all`] once per frame. The lock is held only for
/// the push or the swap, never while items are processed.
#[derive(Debug, Default)]
pub struct EventQueue<T> {
    items: Mutex<VecDeque<T>>,
}

impl<T> EventQueue<T> {
    pub fn new() -> Self {
        EventQueue {
            items: Mutex::new(VecDeque::new()),
        }
    }

    // A panic on a producer thread must not wedge the frame thread.
    fn lock(&self) -> MutexGuard<'_, VecDeque<T>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn enqueue(&self, item: T) {
        self.lock().push_back(item);
    }

    /// Take every queued item in arrival order, leaving the queue empty.
    pub fn drain_all(&self) -> VecDeque<T> {
        std::mem::take(&mut *self.lock())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Discard everything queued. Returns how many items were dropped.
    pub fn clear(&self) -> usize {
        let dropped = self.drain_all();
        dropped.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn drain_returns_arrival_order() {
        let queue = EventQueue::new();
        queue.enqueue(1);
        queue.enqueue(2);
        queue.enqueue(3);
        assert_eq!(queue.drain_all(), [1, 2, 3]);
        assert!(queue.is_empty());
    }

    #[test]
    fn drain_of_empty_queue_is_empty() {
        let queue: EventQueue<u8> = EventQueue::new();
        assert!(queue.drain_all().is_empty());
    }

    #[test]
    fn clear_reports_dropped_count() {
        let queue = EventQueue::new();
        queue.enqueue("a");
        queue.enqueue("b");
        assert_eq!(queue.clear(), 2);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn survives_poisoned_lock() {
        let queue = Arc::new(EventQueue::new());
        let q = queue.clone();
        let _ = std::thread::spawn(move || {
            let _guard = q.items.lock().unwrap();
            panic!("producer died holding the lock");
        })
        .join();
        queue.enqueue(7);
        assert_eq!(queue.drain_all(), [7]);
    }
}
