//! Bounded queue serving subjects round-robin.

use ahash::AHashMap;
use parking_lot::Mutex;
use std::collections::VecDeque;

struct QueueState<T> {
    by_key: AHashMap<String, VecDeque<T>>,
    /// Keys with pending items, in service order
    order: VecDeque<String>,
    len: usize,
}

/// Pending items partitioned by key; [`poll`](Self::poll) takes one item
/// from each key in turn so no key starves the others.
pub struct RoundRobinQueue<T> {
    name: &'static str,
    max_depth: usize,
    state: Mutex<QueueState<T>>,
}

impl<T> RoundRobinQueue<T> {
    pub fn new(name: &'static str, max_depth: usize) -> Self {
        Self {
            name,
            max_depth,
            state: Mutex::new(QueueState {
                by_key: AHashMap::new(),
                order: VecDeque::new(),
                len: 0,
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Enqueue `item` under `key`; hands it back when the queue is full.
    pub fn offer(&self, key: &str, item: T) -> Result<(), T> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.len >= self.max_depth {
            return Err(item);
        }
        match state.by_key.get_mut(key) {
            Some(pending) => pending.push_back(item),
            None => {
                state.by_key.insert(key.to_string(), VecDeque::from([item]));
                state.order.push_back(key.to_string());
            }
        }
        state.len += 1;
        Ok(())
    }

    pub fn poll(&self) -> Option<T> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        let key = state.order.pop_front()?;
        let pending = state.by_key.get_mut(&key)?;
        let item = pending.pop_front();
        if pending.is_empty() {
            state.by_key.remove(&key);
        } else {
            state.order.push_back(key);
        }
        if item.is_some() {
            state.len -= 1;
        }
        item
    }

    pub fn len(&self) -> usize {
        self.state.lock().len
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }
}
