//! Counting semaphore bounding concurrent store engagement.

use parking_lot::{Condvar, Mutex};

pub struct Semaphore {
    state: Mutex<PermitState>,
    total: usize,
    released: Condvar,
}

struct PermitState {
    permits: usize,
    /// Callers blocked in `acquire_all`; partial acquires yield to them.
    exclusive_waiters: usize,
}

impl Semaphore {
    pub fn new(total: usize) -> Self {
        let total = total.max(1);
        Self {
            state: Mutex::new(PermitState {
                permits: total,
                exclusive_waiters: 0,
            }),
            total,
            released: Condvar::new(),
        }
    }

    /// Block until one permit is free.
    pub fn acquire(&self) -> SemaphorePermit<'_> {
        self.acquire_many(1)
    }

    /// Block until `count` permits are free at once. Asking for every
    /// permit excludes all other holders, and no partial acquire succeeds
    /// while such a caller waits.
    pub fn acquire_many(&self, count: usize) -> SemaphorePermit<'_> {
        let count = count.clamp(1, self.total);
        let mut state = self.state.lock();
        if count == self.total {
            state.exclusive_waiters += 1;
            while state.permits < count {
                self.released.wait(&mut state);
            }
            state.exclusive_waiters -= 1;
        } else {
            while state.permits < count || state.exclusive_waiters > 0 {
                self.released.wait(&mut state);
            }
        }
        state.permits -= count;
        SemaphorePermit {
            semaphore: self,
            count,
        }
    }

    pub fn acquire_all(&self) -> SemaphorePermit<'_> {
        self.acquire_many(self.total)
    }

    pub fn available(&self) -> usize {
        self.state.lock().permits
    }

    pub fn total(&self) -> usize {
        self.total
    }

    fn release(&self, count: usize) {
        self.state.lock().permits += count;
        self.released.notify_all();
    }
}

/// Returns its permits on drop.
pub struct SemaphorePermit<'a> {
    semaphore: &'a Semaphore,
    count: usize,
}

impl Drop for SemaphorePermit<'_> {
    fn drop(&mut self) {
        self.semaphore.release(self.count);
    }
}
