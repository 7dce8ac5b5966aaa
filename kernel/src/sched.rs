//! Preemptive Scheduler
//!
//! The timer tick handler, the priority policy, the one context-switch
//! path every suspension funnels through, and the statistics the rest of
//! the system reads. Policy: strictly higher priority preempts at once;
//! equals round-robin once the running thread has consumed a tick of its
//! slot (a full quantum for real-time threads); lower priorities wait.

use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use crate::arch::context;
use crate::config::{DEFAULT_STACK_SIZE, REALTIME_QUANTUM_TICKS, TIMER_VECTOR};
use crate::errno::{Errno, KResult};
use crate::task::SYSTEM_TASK;
use crate::thread::{Priority, ThreadFlags, ThreadState};
use crate::Kernel;

/// Why the switch path was entered
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum SwitchReason {
    /// Timer tick decided to preempt
    Tick,
    /// Voluntary yield
    Yield,
    /// Current thread is parking
    Block,
    /// Current thread exited
    Exit,
}

/// Scheduler state and statistics
pub(crate) struct SchedState {
    enabled: AtomicBool,
    preempt_off: AtomicU32,
    disable_started_ns: AtomicU64,
    ticks: AtomicU64,
    involuntary: AtomicU64,
    voluntary: AtomicU64,
    preempt_disabled_ns: AtomicU64,
    longest_disabled_ns: AtomicU64,
}

impl SchedState {
    pub(crate) fn new() -> Self {
        Self {
            enabled: AtomicBool::new(false),
            preempt_off: AtomicU32::new(0),
            disable_started_ns: AtomicU64::new(0),
            ticks: AtomicU64::new(0),
            involuntary: AtomicU64::new(0),
            voluntary: AtomicU64::new(0),
            preempt_disabled_ns: AtomicU64::new(0),
            longest_disabled_ns: AtomicU64::new(0),
        }
    }
}

/// Point-in-time scheduler statistics
#[derive(Debug, Clone, Copy)]
pub struct SchedSnapshot {
    /// Timer ticks observed
    pub ticks: u64,
    /// Switches forced by the tick policy
    pub involuntary_switches: u64,
    /// Switches from yield, park and exit
    pub voluntary_switches: u64,
    /// Ticks that kept the running thread
    pub no_switch_ticks: u64,
    /// Total nanoseconds spent with preemption disabled
    pub preempt_disabled_ns: u64,
    /// Longest contiguous preemption-disabled run
    pub longest_preempt_disabled_ns: u64,
}

/// Scoped preemption-disable: ticks still count, but sleeper wake-ups and
/// involuntary switches are deferred while one of these lives.
#[must_use = "preemption is re-enabled when the guard drops"]
pub struct PreemptGuard<'a> {
    kernel: &'a Kernel,
}

impl Drop for PreemptGuard<'_> {
    fn drop(&mut self) {
        let sched = &self.kernel.sched;
        if sched.preempt_off.fetch_sub(1, Ordering::SeqCst) == 1 {
            let started = sched.disable_started_ns.load(Ordering::SeqCst);
            let duration = self.kernel.now_ns().saturating_sub(started);
            sched.preempt_disabled_ns.fetch_add(duration, Ordering::SeqCst);
            sched.longest_disabled_ns.fetch_max(duration, Ordering::SeqCst);
        }
    }
}

impl Kernel {
    /// Configure the periodic timer, enable preemption and spawn the idle
    /// thread. `hz` must be positive; the platform may quantize it.
    pub fn start_preemption(&self, hz: u32) -> KResult<()> {
        if hz == 0 {
            return Err(Errno::Invalid);
        }
        if self.sched.enabled.swap(true, Ordering::SeqCst) {
            return Err(Errno::Busy);
        }

        self.create_thread_in(
            SYSTEM_TASK,
            idle_main,
            self as *const Kernel as usize as u64,
            DEFAULT_STACK_SIZE,
            Priority::Lowest,
            ThreadFlags(ThreadFlags::SYSTEM),
            "idle",
        )?;

        let context = self as *const Kernel as usize;
        self.platform().timer_configure(hz, TIMER_VECTOR, tick_trampoline, context);
        self.platform().timer_start();

        crate::log!("[SCHED] preemption enabled at {} Hz", hz);
        Ok(())
    }

    /// Flip the preemption switch without touching the timer
    pub fn set_preemption_enabled(&self, enabled: bool) {
        self.sched.enabled.store(enabled, Ordering::SeqCst);
    }

    /// Whether the tick policy is allowed to preempt
    pub fn preemption_enabled(&self) -> bool {
        self.sched.enabled.load(Ordering::SeqCst)
    }

    /// Disable preemption for the lifetime of the returned guard. Nests.
    pub fn preempt_disable(&self) -> PreemptGuard<'_> {
        if self.sched.preempt_off.fetch_add(1, Ordering::SeqCst) == 0 {
            self.sched.disable_started_ns.store(self.now_ns(), Ordering::SeqCst);
        }
        PreemptGuard { kernel: self }
    }

    /// Scheduler statistics snapshot
    pub fn sched_stats(&self) -> SchedSnapshot {
        let ticks = self.sched.ticks.load(Ordering::SeqCst);
        let involuntary = self.sched.involuntary.load(Ordering::SeqCst);
        SchedSnapshot {
            ticks,
            involuntary_switches: involuntary,
            voluntary_switches: self.sched.voluntary.load(Ordering::SeqCst),
            no_switch_ticks: ticks.saturating_sub(involuntary),
            preempt_disabled_ns: self.sched.preempt_disabled_ns.load(Ordering::SeqCst),
            longest_preempt_disabled_ns: self.sched.longest_disabled_ns.load(Ordering::SeqCst),
        }
    }

    /// Timer tick entry. Runs in interrupt context on every tick: charges
    /// the running thread, wakes expired sleepers and applies the
    /// preemption policy.
    pub fn timer_tick(&self) {
        self.sched.ticks.fetch_add(1, Ordering::SeqCst);
        crate::logger::tick();

        {
            let mut tt = self.threads.acquire(self.platform());
            let cur = tt.current;
            if let Some(t) = tt.threads.get_mut(&cur) {
                t.cpu_ticks += 1;
                t.slot_ticks += 1;
            }
        }

        if !self.sched.enabled.load(Ordering::SeqCst)
            || self.sched.preempt_off.load(Ordering::SeqCst) > 0
        {
            return;
        }

        let now = self.now_ns();
        self.expire_timers(now);

        self.reschedule(SwitchReason::Tick);
    }

    /// The one path that suspends the running thread. Picks the next
    /// thread under the thread-lock, releases the lock, then performs the
    /// low-level switch with interrupts still masked; the switch itself is
    /// never executed under a spinlock.
    pub(crate) fn reschedule(&self, reason: SwitchReason) {
        let platform = self.platform();
        let irq = platform.interrupt_save_and_disable();

        let mut pair: Option<(*mut context::Context, *const context::Context)> = None;
        let mut first_run_task = None;

        {
            let mut guard = self.threads.acquire(platform);
            let tt = &mut *guard;

            tt.reap_dead();
            let cur = tt.current;

            // Decide whether a switch is wanted and put the current thread
            // where it belongs.
            let mut keep_running = false;
            match reason {
                SwitchReason::Block => match tt.threads.get_mut(&cur) {
                    Some(t) if t.wake_pending => {
                        // The wake won the race; the park is already over
                        t.wake_pending = false;
                        keep_running = true;
                    }
                    Some(t) if t.state == ThreadState::Running => {
                        t.state = ThreadState::Blocked;
                    }
                    _ => keep_running = true,
                },
                SwitchReason::Yield => {
                    tt.enqueue(cur);
                }
                SwitchReason::Exit => {}
                SwitchReason::Tick => {
                    let running = match tt.threads.get(&cur) {
                        Some(t) if t.state == ThreadState::Running => {
                            Some((t.priority, t.slot_ticks))
                        }
                        _ => None,
                    };
                    match running {
                        None => keep_running = true,
                        Some((cur_prio, slot)) => {
                            let quantum = if cur_prio == Priority::Realtime {
                                REALTIME_QUANTUM_TICKS
                            } else {
                                1
                            };
                            let preempt = match tt.highest_ready_priority() {
                                Some(p) if p > cur_prio => true,
                                Some(p) if p == cur_prio && slot >= quantum => true,
                                _ => false,
                            };
                            if preempt {
                                tt.enqueue(cur);
                            } else {
                                keep_running = true;
                            }
                        }
                    }
                }
            }

            if !keep_running {
                match tt.dequeue_highest() {
                    Some(next) if next == cur => {
                        // Nobody better queued; stay on the CPU
                        if let Some(t) = tt.threads.get_mut(&cur) {
                            t.state = ThreadState::Running;
                        }
                    }
                    Some(next) => {
                        match reason {
                            SwitchReason::Tick => {
                                self.sched.involuntary.fetch_add(1, Ordering::SeqCst);
                            }
                            _ => {
                                self.sched.voluntary.fetch_add(1, Ordering::SeqCst);
                            }
                        }

                        if let Some(t) = tt.threads.get_mut(&next) {
                            t.state = ThreadState::Running;
                            t.slot_ticks = 0;
                            if !t.started {
                                t.started = true;
                                first_run_task = Some(t.task);
                            }
                        }
                        tt.current = next;
                        self.current_tid.store(next, Ordering::Relaxed);

                        let from = tt.threads.get_mut(&cur).map(|t| &mut t.context as *mut _);
                        let to = tt.threads.get(&next).map(|t| &t.context as *const _);
                        if let (Some(from), Some(to)) = (from, to) {
                            pair = Some((from, to));
                        }
                    }
                    None => {
                        // A parked or exited thread with nothing to run is
                        // unrecoverable on a uniprocessor.
                        panic!("scheduler: no runnable thread");
                    }
                }
            }
        }

        if let Some(task) = first_run_task {
            self.mark_task_running(task);
        }

        if let Some((from, to)) = pair {
            unsafe { context::switch(from, to) };
        }

        platform.interrupt_restore(irq);
    }
}

/// Timer callback registered with the platform; `context` is the kernel
fn tick_trampoline(context: usize) {
    let kernel = unsafe { &*(context as *const Kernel) };
    kernel.timer_tick();
}

/// Idle thread: halts until the next interrupt, then lets anybody ready
/// take over.
extern "C" fn idle_main(arg: u64) -> i32 {
    let kernel = unsafe { &*(arg as usize as *const Kernel) };
    loop {
        crate::arch::halt();
        kernel.yield_thread();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::Mutex;
    use crate::test_util::boot_kernel;
    use crate::thread::{Priority, ThreadFlags, BOOTSTRAP_TID};

    const MS: u64 = 1_000_000;

    struct Ctx {
        kernel: &'static Kernel,
        target_ticks: u64,
        mutex: Mutex,
        order: spin::Mutex<alloc::vec::Vec<&'static str>>,
        woke_at_ns: AtomicU64,
    }

    fn leak_ctx(kernel: &'static Kernel) -> &'static Ctx {
        Box::leak(Box::new(Ctx {
            kernel,
            target_ticks: 0,
            mutex: Mutex::new(),
            order: spin::Mutex::new(alloc::vec::Vec::new()),
            woke_at_ns: AtomicU64::new(0),
        }))
    }

    fn ctx_from(arg: u64) -> &'static Ctx {
        unsafe { &*(arg as usize as *const Ctx) }
    }

    fn arg_of(ctx: &'static Ctx) -> u64 {
        ctx as *const Ctx as usize as u64
    }

    #[test]
    fn tick_accounting_with_no_competitor() {
        let k = boot_kernel();
        k.start_preemption(100).unwrap();

        // One second of wall time on an otherwise idle kernel
        k.platform().test_advance_time(1_000 * MS);

        let stats = k.sched_stats();
        assert_eq!(stats.ticks, 100);
        assert_eq!(stats.involuntary_switches, 0);
        assert_eq!(stats.no_switch_ticks, 100);
    }

    #[test]
    fn ticks_equal_involuntary_plus_no_switch() {
        let k = boot_kernel();
        k.start_preemption(100).unwrap();

        extern "C" fn spinner(arg: u64) -> i32 {
            let ctx = ctx_from(arg);
            while ctx.kernel.sched_stats().ticks < ctx.target_ticks {
                ctx.kernel.platform().test_advance_time(10 * MS);
            }
            0
        }

        let ctx = Box::leak(Box::new(Ctx {
            kernel: k,
            target_ticks: 30,
            mutex: Mutex::new(),
            order: spin::Mutex::new(alloc::vec::Vec::new()),
            woke_at_ns: AtomicU64::new(0),
        }));

        let tid = k.spawn("spinner", spinner, arg_of(ctx)).unwrap();
        while k.sched_stats().ticks < ctx.target_ticks {
            k.platform().test_advance_time(10 * MS);
        }
        k.join_thread(tid).unwrap();

        let stats = k.sched_stats();
        assert_eq!(stats.ticks, stats.involuntary_switches + stats.no_switch_ticks);
        // Two equal-priority spinners rotate every tick
        assert!(stats.involuntary_switches > 0);
    }

    #[test]
    fn equal_priority_threads_share_ticks_fairly() {
        let k = boot_kernel();
        k.start_preemption(100).unwrap();

        extern "C" fn spinner(arg: u64) -> i32 {
            let ctx = ctx_from(arg);
            while ctx.kernel.sched_stats().ticks < ctx.target_ticks {
                ctx.kernel.platform().test_advance_time(10 * MS);
            }
            0
        }

        let target = 40u64;
        let ctx = Box::leak(Box::new(Ctx {
            kernel: k,
            target_ticks: target,
            mutex: Mutex::new(),
            order: spin::Mutex::new(alloc::vec::Vec::new()),
            woke_at_ns: AtomicU64::new(0),
        }));

        let tid = k.spawn("fair", spinner, arg_of(ctx)).unwrap();
        while k.sched_stats().ticks < target {
            k.platform().test_advance_time(10 * MS);
        }

        // Inspect before joining so the worker's record still exists
        let stats = k.thread_stats();
        let boot = stats.iter().find(|s| s.tid == BOOTSTRAP_TID).unwrap().cpu_ticks;
        let worker = stats.iter().find(|s| s.tid == tid).unwrap().cpu_ticks;

        k.join_thread(tid).unwrap();

        let low = target / 2 - 2;
        let high = target / 2 + 3;
        assert!((low..=high).contains(&boot), "bootstrap got {} of {}", boot, target);
        assert!((low..=high).contains(&worker), "worker got {} of {}", worker, target);
    }

    #[test]
    fn higher_priority_thread_preempts_on_tick() {
        let k = boot_kernel();
        k.start_preemption(100).unwrap();

        extern "C" fn hi(_arg: u64) -> i32 {
            42
        }

        let tid = k
            .create_thread(
                hi,
                0,
                crate::config::DEFAULT_STACK_SIZE,
                Priority::High,
                ThreadFlags(ThreadFlags::NONE),
                "hi",
            )
            .unwrap();

        k.platform().test_advance_time(10 * MS);

        assert_eq!(k.join_thread(tid), Ok(42));
        assert!(k.sched_stats().involuntary_switches >= 1);
    }

    #[test]
    fn yield_switches_are_voluntary() {
        let k = boot_kernel();

        extern "C" fn politely(arg: u64) -> i32 {
            ctx_from(arg).kernel.yield_thread();
            7
        }

        let ctx = leak_ctx(k);
        let tid = k.spawn("polite", politely, arg_of(ctx)).unwrap();

        k.yield_thread();
        assert_eq!(k.join_thread(tid), Ok(7));

        let stats = k.sched_stats();
        assert!(stats.voluntary_switches >= 3);
        assert_eq!(stats.involuntary_switches, 0);
    }

    #[test]
    fn mutex_handoff_runs_high_priority_waiter_first() {
        let k = boot_kernel();

        extern "C" fn high_waiter(arg: u64) -> i32 {
            let ctx = ctx_from(arg);
            ctx.order.lock().push("high:wants");
            ctx.mutex.lock(ctx.kernel);
            ctx.order.lock().push("high:got");
            ctx.mutex.unlock(ctx.kernel);
            0
        }

        extern "C" fn bystander(arg: u64) -> i32 {
            let ctx = ctx_from(arg);
            ctx.order.lock().push("bystander");
            0
        }

        let ctx = leak_ctx(k);

        k.set_priority(BOOTSTRAP_TID, Priority::Low).unwrap();
        ctx.mutex.lock(k);

        let high = k
            .create_thread(
                high_waiter,
                arg_of(ctx),
                crate::config::DEFAULT_STACK_SIZE,
                Priority::High,
                ThreadFlags(ThreadFlags::NONE),
                "high",
            )
            .unwrap();
        k.yield_thread(); // high runs and parks on the mutex

        let mid = k
            .create_thread(
                bystander,
                arg_of(ctx),
                crate::config::DEFAULT_STACK_SIZE,
                Priority::Normal,
                ThreadFlags(ThreadFlags::NONE),
                "mid",
            )
            .unwrap();

        ctx.mutex.unlock(k); // ownership handed to the high waiter
        k.yield_thread();

        assert_eq!(k.join_thread(high), Ok(0));
        assert_eq!(k.join_thread(mid), Ok(0));

        let order = ctx.order.lock();
        assert_eq!(&*order, &["high:wants", "high:got", "bystander"]);
    }

    #[test]
    fn sleeping_thread_wakes_after_deadline() {
        let k = boot_kernel();
        k.start_preemption(100).unwrap();

        extern "C" fn sleeper(arg: u64) -> i32 {
            let ctx = ctx_from(arg);
            ctx.kernel.sleep_thread(50);
            ctx.woke_at_ns.store(ctx.kernel.now_ns(), Ordering::SeqCst);
            0
        }

        let ctx = leak_ctx(k);
        let start = k.now_ns();
        let tid = k.spawn("sleeper", sleeper, arg_of(ctx)).unwrap();

        k.yield_thread(); // sleeper parks on the timer wheel
        for _ in 0..10 {
            k.platform().test_advance_time(10 * MS);
        }

        assert_eq!(k.join_thread(tid), Ok(0));
        let woke = ctx.woke_at_ns.load(Ordering::SeqCst);
        assert!(woke >= start + 50 * MS, "woke early: {} < {}", woke, start + 50 * MS);
    }

    #[test]
    fn preempt_disable_blocks_tick_switches_and_is_measured() {
        let k = boot_kernel();
        k.start_preemption(100).unwrap();

        extern "C" fn spinner(arg: u64) -> i32 {
            let ctx = ctx_from(arg);
            while ctx.kernel.sched_stats().ticks < ctx.target_ticks {
                ctx.kernel.platform().test_advance_time(10 * MS);
            }
            0
        }

        let ctx = Box::leak(Box::new(Ctx {
            kernel: k,
            target_ticks: 10,
            mutex: Mutex::new(),
            order: spin::Mutex::new(alloc::vec::Vec::new()),
            woke_at_ns: AtomicU64::new(0),
        }));
        let tid = k.spawn("rival", spinner, arg_of(ctx)).unwrap();

        {
            let _guard = k.preempt_disable();
            let before = k.sched_stats().involuntary_switches;
            // Ticks fire but the rival never gets the CPU
            k.platform().test_advance_time(50 * MS);
            assert_eq!(k.sched_stats().involuntary_switches, before);
        }

        // Guard dropped: the rival now runs to completion
        while k.sched_stats().ticks < ctx.target_ticks {
            k.platform().test_advance_time(10 * MS);
        }
        k.join_thread(tid).unwrap();

        let stats = k.sched_stats();
        assert!(stats.preempt_disabled_ns >= 50 * MS);
        assert!(stats.longest_preempt_disabled_ns >= 50 * MS);
    }
}
