//! Condition variable
//!
//! Wait set paired by the caller with an externally held mutex. The waiter
//! is queued before the mutex is released, so a signal arriving at any
//! point after `wait` starts is never lost. Spurious wakeups are allowed;
//! callers re-check their predicate in a loop.

use alloc::collections::VecDeque;

use super::{Mutex, SpinLock};
use crate::thread::Tid;
use crate::Kernel;

/// Condition variable
pub struct CondVar {
    waiters: SpinLock<VecDeque<Tid>>,
}

impl CondVar {
    pub const fn new() -> Self {
        Self { waiters: SpinLock::new(VecDeque::new()) }
    }

    /// Atomically release `mutex` and park; the mutex is re-acquired
    /// before returning. Caller must hold `mutex` at depth 1.
    pub fn wait(&self, kernel: &Kernel, mutex: &Mutex) {
        let tid = kernel.current_thread_id();
        debug_assert_eq!(mutex.owner(kernel), Some(tid));
        debug_assert_eq!(mutex.depth(kernel), 1);

        self.waiters.acquire(kernel.platform()).push_back(tid);

        mutex.unlock(kernel);
        kernel.block_current();
        mutex.lock(kernel);
    }

    /// Wake one waiter, if any
    pub fn signal(&self, kernel: &Kernel) {
        loop {
            let waiter = self.waiters.acquire(kernel.platform()).pop_front();
            match waiter {
                Some(tid) if kernel.wake_thread(tid) => return,
                Some(_) => continue, // died while queued
                None => return,
            }
        }
    }

    /// Wake every waiter
    pub fn broadcast(&self, kernel: &Kernel) {
        let drained: VecDeque<Tid> = {
            let mut w = self.waiters.acquire(kernel.platform());
            core::mem::take(&mut *w)
        };
        for tid in drained {
            kernel.wake_thread(tid);
        }
    }

    /// Number of parked waiters (racy; for diagnostics and tests)
    pub fn waiter_count(&self, kernel: &Kernel) -> usize {
        self.waiters.acquire(kernel.platform()).len()
    }
}

impl Default for CondVar {
    fn default() -> Self {
        Self::new()
    }
}
