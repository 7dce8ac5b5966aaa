//! Time utilities
//!
//! Monotonic clock access and the timer wheel that turns tick interrupts
//! into thread wake-ups. Sleeping threads park with a deadline here and
//! the tick path releases them once the clock passes it, so a sleeper
//! holds no CPU at all while it waits.

use alloc::collections::BTreeMap;
use alloc::vec::Vec;

use crate::thread::Tid;
use crate::Kernel;

/// Wake-ups keyed by absolute deadline (nanoseconds)
pub(crate) struct TimerWheel {
    pending: BTreeMap<u64, Vec<Tid>>,
}

impl TimerWheel {
    pub(crate) const fn new() -> Self {
        Self { pending: BTreeMap::new() }
    }
}

impl Kernel {
    /// Monotonic nanoseconds since boot
    pub fn now_ns(&self) -> u64 {
        self.platform().monotonic_time_ns()
    }

    /// Monotonic milliseconds since boot
    pub fn uptime_ms(&self) -> u64 {
        self.now_ns() / 1_000_000
    }

    /// Register a wake-up for `tid` once the clock reaches `deadline_ns`
    pub(crate) fn register_wakeup(&self, tid: Tid, deadline_ns: u64) {
        let mut wheel = self.timers.acquire(self.platform());
        wheel.pending.entry(deadline_ns).or_insert_with(Vec::new).push(tid);
    }

    /// Release every thread whose deadline has passed. Called from the
    /// tick path; returns how many threads were made runnable.
    pub(crate) fn expire_timers(&self, now_ns: u64) -> usize {
        let due: Vec<Tid> = {
            let mut wheel = self.timers.acquire(self.platform());
            let mut due = Vec::new();
            while let Some(entry) = wheel.pending.first_entry() {
                if *entry.key() > now_ns {
                    break;
                }
                due.extend(entry.remove());
            }
            due
        };

        let mut woken = 0;
        for tid in due {
            if self.wake_thread(tid) {
                woken += 1;
            }
        }
        woken
    }
}
