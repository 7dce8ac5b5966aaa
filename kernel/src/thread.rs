//! Thread Management
//!
//! Thread control blocks, per-thread stacks, the entry wrapper, join and
//! detach, sleeping and the block/unblock primitives the synchronization
//! layer is built on. The thread table and ready queues live behind one
//! spinlock; see `sched` for the switch path that consumes them.

use alloc::boxed::Box;
use alloc::collections::{BTreeMap, VecDeque};
use alloc::string::String;
use alloc::vec;
use alloc::vec::Vec;

use crate::arch;
use crate::arch::context::Context;
use crate::arch::ForgeSpec;
use crate::config::{DEFAULT_STACK_SIZE, MAX_THREADS, MIN_STACK_SIZE};
use crate::errno::{Errno, KResult};
use crate::sched::SwitchReason;
use crate::task::TaskId;
use crate::Kernel;

/// Thread ID type
pub type Tid = u64;

/// The bootstrap thread of the system task
pub const BOOTSTRAP_TID: Tid = 0;

/// Thread state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThreadState {
    /// Created but not yet enqueued
    New,
    /// Waiting in a ready queue
    Ready,
    /// Currently executing
    Running,
    /// Parked on a wait set, a sleep deadline or a join
    Blocked,
    /// Exited, exit code not yet collected
    Zombie,
    /// Exited and reclaimed (only visible in the reaper)
    Dead,
}

/// Thread flags
#[derive(Debug, Clone, Copy)]
pub struct ThreadFlags(pub u32);

impl ThreadFlags {
    pub const NONE: u32 = 0;
    /// Reclaimed at exit, may not be joined
    pub const DETACHED: u32 = 1 << 0;
    /// Belongs to the kernel itself
    pub const SYSTEM: u32 = 1 << 1;
    /// Main thread of its task
    pub const MAIN: u32 = 1 << 2;

    pub fn is_detached(&self) -> bool {
        self.0 & Self::DETACHED != 0
    }

    pub fn is_system(&self) -> bool {
        self.0 & Self::SYSTEM != 0
    }
}

/// Thread priority, lowest to highest
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[repr(usize)]
pub enum Priority {
    Lowest = 0,
    Low = 1,
    Normal = 2,
    High = 3,
    Highest = 4,
    Realtime = 5,
}

/// Number of priority levels (and ready queues)
pub const NUM_PRIORITIES: usize = 6;

impl Priority {
    pub fn index(self) -> usize {
        self as usize
    }

    fn from_index(index: usize) -> Self {
        match index {
            0 => Priority::Lowest,
            1 => Priority::Low,
            2 => Priority::Normal,
            3 => Priority::High,
            4 => Priority::Highest,
            _ => Priority::Realtime,
        }
    }
}

/// Thread entry point signature
pub type ThreadEntry = extern "C" fn(arg: u64) -> i32;

/// Thread Control Block (TCB)
pub struct Thread {
    /// Unique thread ID
    pub tid: Tid,
    /// Task this thread belongs to
    pub task: TaskId,
    /// Thread name (for diagnostics)
    pub name: String,
    /// Current state
    pub state: ThreadState,
    /// Scheduling priority
    pub priority: Priority,
    /// Thread flags
    pub flags: ThreadFlags,
    /// Owned stack region; freed when the thread is reclaimed
    stack: Option<Box<[u8]>>,
    /// Top of the stack region
    pub stack_top: u64,
    /// Size of the stack region in bytes
    pub stack_size: usize,
    /// Saved CPU context
    pub(crate) context: Context,
    /// Entry function
    pub(crate) entry: Option<ThreadEntry>,
    /// Opaque entry argument
    pub(crate) entry_arg: u64,
    /// Exit code (valid once the thread is a zombie)
    pub exit_code: i32,
    /// Timer ticks charged to this thread
    pub cpu_ticks: u64,
    /// Ticks since the thread was last switched in
    pub(crate) slot_ticks: u64,
    /// Thread waiting to join this one
    pub(crate) joiner: Option<Tid>,
    /// A wake arrived before the thread finished parking
    pub(crate) wake_pending: bool,
    /// Has been switched in at least once
    pub(crate) started: bool,
}

impl Thread {
    /// Drop the stack region; the TCB may outlive it as a zombie record
    pub(crate) fn release_stack(&mut self) {
        self.stack = None;
    }

    /// Record for the bootstrap thread: already running on the boot stack,
    /// its context slot filled by the first switch away from it.
    pub(crate) fn bootstrap() -> Self {
        Self {
            tid: BOOTSTRAP_TID,
            task: 0,
            name: String::from("boot"),
            state: ThreadState::Running,
            priority: Priority::Normal,
            flags: ThreadFlags(ThreadFlags::SYSTEM | ThreadFlags::MAIN),
            stack: None,
            stack_top: 0,
            stack_size: 0,
            context: Context::bootstrap(),
            entry: None,
            entry_arg: 0,
            exit_code: 0,
            cpu_ticks: 0,
            slot_ticks: 0,
            joiner: None,
            wake_pending: false,
            started: true,
        }
    }
}

/// Thread table, ready queues and the reaper list, all behind the one
/// thread-lock.
pub(crate) struct ThreadTable {
    pub threads: BTreeMap<Tid, Box<Thread>>,
    pub ready: [VecDeque<Tid>; NUM_PRIORITIES],
    pub current: Tid,
    pub next_tid: Tid,
    /// Detached zombies reclaimed on the next scheduler pass
    pub dead: Vec<Tid>,
}

impl ThreadTable {
    pub(crate) fn new() -> Self {
        const EMPTY: VecDeque<Tid> = VecDeque::new();
        Self {
            threads: BTreeMap::new(),
            ready: [EMPTY; NUM_PRIORITIES],
            current: BOOTSTRAP_TID,
            next_tid: 1,
            dead: Vec::new(),
        }
    }

    /// Mark a thread ready and queue it at the tail of its priority list
    pub(crate) fn enqueue(&mut self, tid: Tid) {
        let priority = match self.threads.get_mut(&tid) {
            Some(t) => {
                t.state = ThreadState::Ready;
                t.priority.index()
            }
            None => return,
        };
        self.ready[priority].push_back(tid);
    }

    /// Highest priority that has a genuinely ready thread queued
    pub(crate) fn highest_ready_priority(&self) -> Option<Priority> {
        for index in (0..NUM_PRIORITIES).rev() {
            for tid in &self.ready[index] {
                if let Some(t) = self.threads.get(tid) {
                    if t.state == ThreadState::Ready {
                        return Some(Priority::from_index(index));
                    }
                }
            }
        }
        None
    }

    /// Pop the longest-waiting thread of the highest ready priority,
    /// skipping stale queue entries left by killed threads.
    pub(crate) fn dequeue_highest(&mut self) -> Option<Tid> {
        for index in (0..NUM_PRIORITIES).rev() {
            while let Some(tid) = self.ready[index].pop_front() {
                match self.threads.get(&tid) {
                    Some(t) if t.state == ThreadState::Ready => return Some(tid),
                    _ => continue, // stale entry
                }
            }
        }
        None
    }

    /// Drop a specific thread from its ready queue
    pub(crate) fn remove_from_ready(&mut self, tid: Tid, priority: Priority) {
        self.ready[priority.index()].retain(|t| *t != tid);
    }

    /// Free the records of threads that finished a full pass ago. The
    /// thread that is still current is skipped; its record must survive
    /// until the switch away from it has completed.
    pub(crate) fn reap_dead(&mut self) {
        if self.dead.is_empty() {
            return;
        }
        let dead = core::mem::take(&mut self.dead);
        for tid in dead {
            if tid == self.current {
                self.dead.push(tid);
            } else if let Some(mut t) = self.threads.remove(&tid) {
                t.state = ThreadState::Dead;
                t.release_stack();
            }
        }
    }
}

impl Kernel {
    /// ID of the currently running thread
    pub fn current_thread_id(&self) -> Tid {
        self.current_tid.load(core::sync::atomic::Ordering::Relaxed)
    }

    /// Task of the currently running thread
    pub fn current_task_id(&self) -> TaskId {
        let tid = self.current_thread_id();
        let tt = self.threads.acquire(self.platform());
        tt.threads.get(&tid).map(|t| t.task).unwrap_or(0)
    }

    /// Create a thread in the current task
    pub fn create_thread(
        &self,
        entry: ThreadEntry,
        arg: u64,
        stack_size: usize,
        priority: Priority,
        flags: ThreadFlags,
        name: &str,
    ) -> KResult<Tid> {
        let task = self.current_task_id();
        self.create_thread_in(task, entry, arg, stack_size, priority, flags, name)
    }

    /// Create a kernel thread with default stack and priority
    pub fn spawn(&self, name: &str, entry: ThreadEntry, arg: u64) -> KResult<Tid> {
        self.create_thread(
            entry,
            arg,
            DEFAULT_STACK_SIZE,
            Priority::Normal,
            ThreadFlags(ThreadFlags::NONE),
            name,
        )
    }

    /// Create a thread inside a specific task
    pub(crate) fn create_thread_in(
        &self,
        task: TaskId,
        entry: ThreadEntry,
        arg: u64,
        stack_size: usize,
        priority: Priority,
        flags: ThreadFlags,
        name: &str,
    ) -> KResult<Tid> {
        let stack_size = stack_size.clamp(MIN_STACK_SIZE, 16 * 1024 * 1024);

        // The stack is forged outside every lock
        let stack = vec![0u8; stack_size].into_boxed_slice();
        let stack_top = stack.as_ptr() as u64 + stack_size as u64;

        // Insert the TCB in state New, not yet visible to the scheduler
        let tid = {
            let mut tt = self.threads.acquire(self.platform());
            if tt.threads.len() >= MAX_THREADS {
                return Err(Errno::Resource);
            }
            let tid = tt.next_tid;
            tt.next_tid += 1;

            let context = Context::forged(&ForgeSpec {
                stack_top,
                wrapper: wrapper_addr(),
                entry: entry as usize as u64,
                arg,
                kernel: self as *const Kernel as usize,
                tid,
            });

            tt.threads.insert(
                tid,
                Box::new(Thread {
                    tid,
                    task,
                    name: String::from(name),
                    state: ThreadState::New,
                    priority,
                    flags,
                    stack: Some(stack),
                    stack_top,
                    stack_size,
                    context,
                    entry: Some(entry),
                    entry_arg: arg,
                    exit_code: 0,
                    cpu_ticks: 0,
                    slot_ticks: 0,
                    joiner: None,
                    wake_pending: false,
                    started: false,
                }),
            );
            tid
        };

        // Attach to the owning task; roll back if it died meanwhile
        if let Err(e) = self.attach_thread_to_task(task, tid) {
            let mut tt = self.threads.acquire(self.platform());
            tt.threads.remove(&tid);
            return Err(e);
        }

        {
            let mut tt = self.threads.acquire(self.platform());
            tt.enqueue(tid);
        }

        crate::log_debug!("[THREAD] created thread {} '{}' in task {}", tid, name, task);
        Ok(tid)
    }

    /// Exit the current thread. Wakes the joiner (or queues the record for
    /// reclamation when detached), may retire the owning task, and never
    /// returns.
    pub fn exit_thread(&self, code: i32) -> ! {
        let tid = self.current_thread_id();
        if tid == BOOTSTRAP_TID {
            panic!("bootstrap thread attempted to exit");
        }

        let (joiner, task, cpu_ticks) = {
            let mut guard = self.threads.acquire(self.platform());
            let tt = &mut *guard;
            let t = match tt.threads.get_mut(&tid) {
                Some(t) => t,
                None => panic!("exit of unknown thread {}", tid),
            };
            t.state = ThreadState::Zombie;
            t.exit_code = code;
            let joiner = t.joiner.take();
            let task = t.task;
            let cpu_ticks = t.cpu_ticks;
            let detached = t.flags.is_detached();
            if detached {
                tt.dead.push(tid);
            }
            (joiner, task, cpu_ticks)
        };

        self.charge_task_cpu(task, cpu_ticks);
        self.detach_thread_from_task(task, tid, code);

        if let Some(joiner) = joiner {
            self.wake_thread(joiner);
        }

        crate::log_debug!("[THREAD] thread {} exited with code {}", tid, code);

        self.reschedule(SwitchReason::Exit);
        arch::halt_loop()
    }

    /// Wait for a thread to exit and collect its exit code. The target's
    /// record and stack are reclaimed on success.
    pub fn join_thread(&self, tid: Tid) -> KResult<i32> {
        let me = self.current_thread_id();
        if tid == me {
            return Err(Errno::Invalid);
        }

        loop {
            {
                let mut tt = self.threads.acquire(self.platform());
                let (state, detached, foreign_joiner) = match tt.threads.get(&tid) {
                    None => return Err(Errno::NotFound),
                    Some(t) => (
                        t.state,
                        t.flags.is_detached(),
                        t.joiner.is_some() && t.joiner != Some(me),
                    ),
                };
                if detached {
                    return Err(Errno::Invalid);
                }
                if state == ThreadState::Zombie {
                    let mut record = tt.threads.remove(&tid).unwrap();
                    record.state = ThreadState::Dead;
                    record.release_stack();
                    return Ok(record.exit_code);
                }
                if foreign_joiner {
                    return Err(Errno::Busy);
                }
                if let Some(t) = tt.threads.get_mut(&tid) {
                    t.joiner = Some(me);
                }
            }
            self.block_current();
        }
    }

    /// Mark a thread detached. A detached zombie is reclaimed immediately.
    pub fn detach_thread(&self, tid: Tid) -> KResult<()> {
        let mut tt = self.threads.acquire(self.platform());
        let zombie = match tt.threads.get_mut(&tid) {
            None => return Err(Errno::NotFound),
            Some(t) if t.joiner.is_some() => return Err(Errno::Busy),
            Some(t) => {
                t.flags.0 |= ThreadFlags::DETACHED;
                t.state == ThreadState::Zombie
            }
        };
        if zombie {
            if let Some(mut record) = tt.threads.remove(&tid) {
                record.state = ThreadState::Dead;
                record.release_stack();
            }
        }
        Ok(())
    }

    /// Give up the CPU voluntarily
    pub fn yield_thread(&self) {
        self.reschedule(SwitchReason::Yield);
    }

    /// Sleep for at least `ms` milliseconds of monotonic time
    pub fn sleep_thread(&self, ms: u64) {
        if ms == 0 {
            self.yield_thread();
            return;
        }
        let tid = self.current_thread_id();
        let deadline = self.now_ns().saturating_add(ms.saturating_mul(1_000_000));
        self.register_wakeup(tid, deadline);
        self.block_current();
    }

    /// Park the current thread until somebody wakes it. A wake that raced
    /// ahead of the park is consumed instead of blocking.
    pub fn block_current(&self) {
        self.reschedule(SwitchReason::Block);
    }

    /// Make a blocked thread runnable again
    pub fn unblock_thread(&self, tid: Tid) -> KResult<()> {
        if self.wake_thread(tid) {
            Ok(())
        } else {
            Err(Errno::NotFound)
        }
    }

    /// Forcibly terminate a thread that is not the caller. Used by task
    /// exit propagation; the record is reclaimed on the next scheduler
    /// pass and any stale ready-queue entries are skipped at dispatch.
    pub(crate) fn kill_thread(&self, tid: Tid, code: i32) -> bool {
        let joiner = {
            let mut guard = self.threads.acquire(self.platform());
            let tt = &mut *guard;
            let t = match tt.threads.get_mut(&tid) {
                Some(t) => t,
                None => return false,
            };
            if t.state == ThreadState::Zombie || t.state == ThreadState::Dead {
                return false;
            }
            t.state = ThreadState::Zombie;
            t.exit_code = code;
            let joiner = t.joiner.take();
            if joiner.is_none() {
                // Nobody will reap it; let the scheduler do so
                tt.dead.push(tid);
            }
            joiner
        };
        if let Some(joiner) = joiner {
            self.wake_thread(joiner);
        }
        true
    }

    /// Wake `tid`: enqueue it if it is parked, or leave a wake token if it
    /// is still on its way to parking. Returns false if the thread no
    /// longer exists or already finished.
    pub(crate) fn wake_thread(&self, tid: Tid) -> bool {
        let mut tt = self.threads.acquire(self.platform());
        match tt.threads.get(&tid).map(|t| t.state) {
            None => false,
            Some(ThreadState::Zombie) | Some(ThreadState::Dead) => false,
            Some(ThreadState::Blocked) => {
                tt.enqueue(tid);
                true
            }
            Some(_) => {
                if let Some(t) = tt.threads.get_mut(&tid) {
                    t.wake_pending = true;
                }
                true
            }
        }
    }

    /// Change a thread's priority; a queued thread moves queues at once
    pub fn set_priority(&self, tid: Tid, priority: Priority) -> KResult<()> {
        let mut tt = self.threads.acquire(self.platform());
        let (old, requeue) = match tt.threads.get_mut(&tid) {
            None => return Err(Errno::NotFound),
            Some(t) => {
                let old = t.priority;
                t.priority = priority;
                (old, t.state == ThreadState::Ready)
            }
        };
        if requeue && old != priority {
            tt.remove_from_ready(tid, old);
            tt.ready[priority.index()].push_back(tid);
        }
        Ok(())
    }

    pub fn get_priority(&self, tid: Tid) -> KResult<Priority> {
        let tt = self.threads.acquire(self.platform());
        tt.threads.get(&tid).map(|t| t.priority).ok_or(Errno::NotFound)
    }

    pub fn set_thread_name(&self, tid: Tid, name: &str) -> KResult<()> {
        let mut tt = self.threads.acquire(self.platform());
        match tt.threads.get_mut(&tid) {
            Some(t) => {
                t.name = String::from(name);
                Ok(())
            }
            None => Err(Errno::NotFound),
        }
    }

    pub fn get_thread_name(&self, tid: Tid) -> KResult<String> {
        let tt = self.threads.acquire(self.platform());
        tt.threads.get(&tid).map(|t| t.name.clone()).ok_or(Errno::NotFound)
    }

    /// Current state of a thread
    pub fn thread_state(&self, tid: Tid) -> KResult<ThreadState> {
        let tt = self.threads.acquire(self.platform());
        tt.threads.get(&tid).map(|t| t.state).ok_or(Errno::NotFound)
    }

    /// Number of live thread records
    pub fn thread_count(&self) -> usize {
        self.threads.acquire(self.platform()).threads.len()
    }

    /// Per-thread statistics in thread-id order
    pub fn thread_stats(&self) -> Vec<ThreadStat> {
        let tt = self.threads.acquire(self.platform());
        tt.threads
            .values()
            .map(|t| ThreadStat {
                tid: t.tid,
                task: t.task,
                name: t.name.clone(),
                state: t.state,
                priority: t.priority,
                cpu_ticks: t.cpu_ticks,
            })
            .collect()
    }

    /// Body of every kernel thread under test builds: the host-thread
    /// analogue of the entry wrapper.
    #[cfg(test)]
    pub(crate) fn run_thread(&self, tid: Tid) {
        self.platform().interrupt_enable();

        let (entry, arg) = {
            let tt = self.threads.acquire(self.platform());
            let t = tt.threads.get(&tid).expect("running unknown thread");
            (t.entry.expect("thread without entry"), t.entry_arg)
        };

        let code = entry(arg);
        self.exit_thread(code);
    }
}

/// Snapshot of one thread for diagnostics
#[derive(Debug, Clone)]
pub struct ThreadStat {
    pub tid: Tid,
    pub task: TaskId,
    pub name: String,
    pub state: ThreadState,
    pub priority: Priority,
    pub cpu_ticks: u64,
}

/// Kernel thread entry wrapper.
/// Entry function is in R12, its argument in R13; falling out of the entry
/// function lands in `exit_thread` with the returned code.
#[cfg(all(target_arch = "x86_64", not(test)))]
#[unsafe(naked)]
extern "C" fn thread_entry_wrapper() {
    core::arch::naked_asm!(
        // New threads are switched in with IF=0; let the timer back in
        "sti",
        "mov rdi, r13",
        "call r12",
        // Entry returned: its result is the exit code
        "mov rdi, rax",
        "call {exit}",
        "ud2",
        exit = sym thread_exit_trampoline,
    );
}

#[cfg(all(target_arch = "x86_64", not(test)))]
extern "C" fn thread_exit_trampoline(code: i32) -> ! {
    crate::kernel().exit_thread(code)
}

fn wrapper_addr() -> u64 {
    #[cfg(all(target_arch = "x86_64", not(test)))]
    {
        thread_entry_wrapper as usize as u64
    }
    #[cfg(not(all(target_arch = "x86_64", not(test))))]
    {
        0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::boot_kernel;
    use core::sync::atomic::{AtomicU64, Ordering};

    struct Ctx {
        kernel: &'static Kernel,
        value: AtomicU64,
    }

    fn leak_ctx(kernel: &'static Kernel) -> &'static Ctx {
        Box::leak(Box::new(Ctx { kernel, value: AtomicU64::new(0) }))
    }

    fn ctx_from(arg: u64) -> &'static Ctx {
        unsafe { &*(arg as usize as *const Ctx) }
    }

    fn arg_of(ctx: &'static Ctx) -> u64 {
        ctx as *const Ctx as usize as u64
    }

    #[test]
    fn join_delivers_the_exit_code() {
        let k = boot_kernel();

        extern "C" fn worker(_arg: u64) -> i32 {
            42
        }

        let tid = k.spawn("worker", worker, 0).unwrap();
        assert_eq!(k.join_thread(tid), Ok(42));
        // The record was reaped by the join
        assert_eq!(k.thread_state(tid), Err(Errno::NotFound));
    }

    #[test]
    fn join_rejects_self_detached_and_unknown_targets() {
        let k = boot_kernel();

        extern "C" fn parked(arg: u64) -> i32 {
            ctx_from(arg).kernel.block_current();
            0
        }

        assert_eq!(k.join_thread(k.current_thread_id()), Err(Errno::Invalid));
        assert_eq!(k.join_thread(9999), Err(Errno::NotFound));

        let ctx = leak_ctx(k);
        let tid = k
            .create_thread(
                parked,
                arg_of(ctx),
                DEFAULT_STACK_SIZE,
                Priority::Normal,
                ThreadFlags(ThreadFlags::DETACHED),
                "loner",
            )
            .unwrap();
        assert_eq!(k.join_thread(tid), Err(Errno::Invalid));

        // Let it finish so the test ends with everyone parked or gone
        k.yield_thread();
        k.unblock_thread(tid).unwrap();
        k.yield_thread();
    }

    #[test]
    fn detached_thread_is_reclaimed_within_one_pass() {
        let k = boot_kernel();

        extern "C" fn transient(_arg: u64) -> i32 {
            0
        }

        let before = k.thread_count();
        let tid = k
            .create_thread(
                transient,
                0,
                DEFAULT_STACK_SIZE,
                Priority::Normal,
                ThreadFlags(ThreadFlags::DETACHED),
                "transient",
            )
            .unwrap();

        k.yield_thread(); // it runs and exits
        k.yield_thread(); // the next pass reaps the record

        assert_eq!(k.thread_state(tid), Err(Errno::NotFound));
        assert_eq!(k.join_thread(tid), Err(Errno::NotFound));
        assert_eq!(k.thread_count(), before);
    }

    #[test]
    fn detach_after_exit_reclaims_immediately() {
        let k = boot_kernel();

        extern "C" fn quick(_arg: u64) -> i32 {
            3
        }

        let tid = k.spawn("quick", quick, 0).unwrap();
        k.yield_thread(); // runs to zombie
        assert_eq!(k.thread_state(tid), Ok(ThreadState::Zombie));

        k.detach_thread(tid).unwrap();
        assert_eq!(k.thread_state(tid), Err(Errno::NotFound));
    }

    #[test]
    fn block_and_unblock_round_trip() {
        let k = boot_kernel();

        extern "C" fn parked(arg: u64) -> i32 {
            let ctx = ctx_from(arg);
            ctx.kernel.block_current();
            ctx.value.store(1, Ordering::SeqCst);
            9
        }

        let ctx = leak_ctx(k);
        let tid = k.spawn("parked", parked, arg_of(ctx)).unwrap();

        k.yield_thread();
        assert_eq!(k.thread_state(tid), Ok(ThreadState::Blocked));
        assert_eq!(ctx.value.load(Ordering::SeqCst), 0);

        k.unblock_thread(tid).unwrap();
        assert_eq!(k.join_thread(tid), Ok(9));
        assert_eq!(ctx.value.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn early_wake_is_not_lost() {
        let k = boot_kernel();

        extern "C" fn parked(arg: u64) -> i32 {
            ctx_from(arg).kernel.block_current();
            5
        }

        let ctx = leak_ctx(k);
        let tid = k.spawn("eager", parked, arg_of(ctx)).unwrap();

        // Wake before the thread ever ran: the park must consume the token
        k.unblock_thread(tid).unwrap();
        assert_eq!(k.join_thread(tid), Ok(5));
    }

    #[test]
    fn priority_and_name_accessors() {
        let k = boot_kernel();

        extern "C" fn parked(arg: u64) -> i32 {
            ctx_from(arg).kernel.block_current();
            0
        }

        let ctx = leak_ctx(k);
        let tid = k.spawn("plain", parked, arg_of(ctx)).unwrap();

        assert_eq!(k.get_priority(tid), Ok(Priority::Normal));
        k.set_priority(tid, Priority::Highest).unwrap();
        assert_eq!(k.get_priority(tid), Ok(Priority::Highest));

        k.set_thread_name(tid, "renamed").unwrap();
        assert_eq!(k.get_thread_name(tid).unwrap(), "renamed");

        assert_eq!(k.set_priority(404, Priority::Low), Err(Errno::NotFound));

        k.yield_thread();
        k.unblock_thread(tid).unwrap();
        assert_eq!(k.join_thread(tid), Ok(0));
    }

    #[test]
    fn exactly_one_thread_runs_at_a_time() {
        let k = boot_kernel();

        extern "C" fn parked(arg: u64) -> i32 {
            ctx_from(arg).kernel.block_current();
            0
        }

        let ctx = leak_ctx(k);
        let a = k.spawn("a", parked, arg_of(ctx)).unwrap();
        let b = k.spawn("b", parked, arg_of(ctx)).unwrap();
        k.yield_thread();
        k.yield_thread();

        let running: alloc::vec::Vec<_> = k
            .thread_stats()
            .iter()
            .filter(|s| s.state == ThreadState::Running)
            .map(|s| s.tid)
            .collect();
        assert_eq!(running, alloc::vec![k.current_thread_id()]);

        for tid in [a, b] {
            k.unblock_thread(tid).unwrap();
            assert_eq!(k.join_thread(tid), Ok(0));
        }
    }
}
