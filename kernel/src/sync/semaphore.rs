//! Counting semaphore
//!
//! Non-negative count bounded by a configured maximum. `wait` decrements
//! or parks; `signal` hands the unit directly to the head waiter when one
//! is queued, otherwise increments up to the maximum and silently drops
//! anything past it.

use alloc::collections::VecDeque;

use super::SpinLock;
use crate::thread::Tid;
use crate::Kernel;

struct SemInner {
    count: u32,
    max: u32,
    waiters: VecDeque<Tid>,
}

/// Counting semaphore with an upper bound
pub struct Semaphore {
    inner: SpinLock<SemInner>,
}

impl Semaphore {
    /// Create a semaphore with the given initial count and maximum
    pub const fn new(initial: u32, max: u32) -> Self {
        Self {
            inner: SpinLock::new(SemInner {
                count: initial,
                max,
                waiters: VecDeque::new(),
            }),
        }
    }

    /// Take one unit, parking until one is available
    pub fn wait(&self, kernel: &Kernel) {
        let tid = kernel.current_thread_id();

        {
            let mut s = self.inner.acquire(kernel.platform());
            if s.count > 0 {
                s.count -= 1;
                return;
            }
            s.waiters.push_back(tid);
        }

        // A signal woke us: the unit was handed over, not counted
        kernel.block_current();
    }

    /// Take one unit without blocking; false when none is available
    pub fn try_wait(&self, kernel: &Kernel) -> bool {
        let mut s = self.inner.acquire(kernel.platform());
        if s.count > 0 {
            s.count -= 1;
            true
        } else {
            false
        }
    }

    /// Release one unit. Wakes the head waiter if any, otherwise bumps the
    /// count; a signal at the maximum is discarded.
    pub fn signal(&self, kernel: &Kernel) {
        loop {
            let waiter = {
                let mut s = self.inner.acquire(kernel.platform());
                match s.waiters.pop_front() {
                    Some(tid) => Some(tid),
                    None => {
                        if s.count < s.max {
                            s.count += 1;
                        }
                        None
                    }
                }
            };

            match waiter {
                Some(tid) if kernel.wake_thread(tid) => return,
                Some(_) => continue, // waiter died queued; try the next
                None => return,
            }
        }
    }

    /// Current count (racy; for diagnostics and tests)
    pub fn count(&self, kernel: &Kernel) -> u32 {
        self.inner.acquire(kernel.platform()).count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::boot_kernel;
    use crate::Kernel;

    struct Ctx {
        kernel: &'static Kernel,
        sem: Semaphore,
    }

    fn leak_ctx(kernel: &'static Kernel, initial: u32, max: u32) -> &'static Ctx {
        Box::leak(Box::new(Ctx { kernel, sem: Semaphore::new(initial, max) }))
    }

    fn ctx_from(arg: u64) -> &'static Ctx {
        unsafe { &*(arg as usize as *const Ctx) }
    }

    fn arg_of(ctx: &'static Ctx) -> u64 {
        ctx as *const Ctx as usize as u64
    }

    #[test]
    fn count_stays_within_bounds() {
        let k = boot_kernel();
        let ctx = leak_ctx(k, 0, 2);

        // Signals past the maximum are discarded
        ctx.sem.signal(k);
        ctx.sem.signal(k);
        ctx.sem.signal(k);
        assert_eq!(ctx.sem.count(k), 2);

        assert!(ctx.sem.try_wait(k));
        assert!(ctx.sem.try_wait(k));
        assert!(!ctx.sem.try_wait(k));
        assert_eq!(ctx.sem.count(k), 0);
    }

    #[test]
    fn producer_consumer_handoff() {
        let k = boot_kernel();
        let ctx = leak_ctx(k, 0, 1);

        extern "C" fn consumer(arg: u64) -> i32 {
            let ctx = ctx_from(arg);
            ctx.sem.wait(ctx.kernel);
            ctx.sem.count(ctx.kernel) as i32
        }

        let tid = k.spawn("consumer", consumer, arg_of(ctx)).unwrap();
        k.yield_thread(); // consumer parks on the empty semaphore
        assert_eq!(k.thread_state(tid).unwrap(), crate::thread::ThreadState::Blocked);

        // The unit is handed to the waiter, not added to the count
        ctx.sem.signal(k);
        assert_eq!(ctx.sem.count(k), 0);

        assert_eq!(k.join_thread(tid), Ok(0));
        // No second wait succeeds without a further signal
        assert!(!ctx.sem.try_wait(k));
    }

    #[test]
    fn uncontended_wait_decrements() {
        let k = boot_kernel();
        let ctx = leak_ctx(k, 3, 8);

        ctx.sem.wait(k);
        ctx.sem.wait(k);
        assert_eq!(ctx.sem.count(k), 1);
        ctx.sem.signal(k);
        assert_eq!(ctx.sem.count(k), 2);
    }
}
