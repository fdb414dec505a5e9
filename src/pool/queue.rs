//! FIFO work queue shared by producers and a worker pool

use crate::config::{Overflow, QueueBound};
use crate::error::QueueError;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;

/// Multi-producer, multi-consumer queue of proxy strings.
///
/// Consumers wait on a `Notify` that every push signals, so an idle worker
/// wakes as soon as work arrives. Dequeue is cancel-safe: nothing is removed
/// until `pop` returns.
pub struct WorkQueue {
    name: &'static str,
    bound: QueueBound,
    items: Mutex<VecDeque<String>>,
    readable: Notify,
    writable: Notify,
    dropped: AtomicU64,
}

impl WorkQueue {
    pub fn new(name: &'static str, bound: QueueBound) -> Self {
        Self {
            name,
            bound,
            items: Mutex::new(VecDeque::new()),
            readable: Notify::new(),
            writable: Notify::new(),
            dropped: AtomicU64::new(0),
        }
    }

    fn items(&self) -> MutexGuard<'_, VecDeque<String>> {
        self.items.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn full(&self) -> QueueError {
        let capacity = match self.bound {
            QueueBound::Bounded { capacity, .. } => capacity,
            QueueBound::Unbounded => usize::MAX,
        };
        QueueError::Full {
            queue: self.name,
            capacity,
        }
    }

    /// Enqueue without waiting. A full `Block` queue refuses like `Reject`.
    pub fn try_push(&self, item: String) -> Result<(), QueueError> {
        {
            let mut items = self.items();
            match self.bound {
                QueueBound::Unbounded => items.push_back(item),
                QueueBound::Bounded { capacity, overflow } => {
                    if items.len() >= capacity {
                        match overflow {
                            Overflow::DropOldest => {
                                items.pop_front();
                                self.dropped.fetch_add(1, Ordering::Relaxed);
                            }
                            Overflow::Block | Overflow::Reject => return Err(self.full()),
                        }
                    }
                    items.push_back(item);
                }
            }
        }
        self.readable.notify_one();
        Ok(())
    }

    /// Enqueue, waiting for room when the queue blocks on overflow
    pub async fn push(&self, item: String) -> Result<(), QueueError> {
        let QueueBound::Bounded {
            capacity,
            overflow: Overflow::Block,
        } = self.bound
        else {
            return self.try_push(item);
        };

        loop {
            let writable = self.writable.notified();
            {
                let mut items = self.items();
                if items.len() < capacity {
                    items.push_back(item);
                    drop(items);
                    self.readable.notify_one();
                    return Ok(());
                }
            }
            writable.await;
        }
    }

    /// Dequeue the oldest item, waiting until one is available
    pub async fn pop(&self) -> String {
        loop {
            let readable = self.readable.notified();
            if let Some(item) = self.try_pop() {
                return item;
            }
            readable.await;
        }
    }

    pub fn try_pop(&self) -> Option<String> {
        let item = self.items().pop_front();
        if item.is_some() {
            self.writable.notify_one();
        }
        item
    }

    pub fn len(&self) -> usize {
        self.items().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Items discarded by `DropOldest`
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}
