//! Host context switching (test builds)
//!
//! Every thread context owns a run gate. A context switch opens the
//! target's gate and parks the caller on its own, so exactly one kernel
//! thread executes at a time, the same discipline the real switch
//! enforces with registers and stacks.

use std::sync::{Arc, Condvar, Mutex};

use crate::arch::ForgeSpec;

/// Run gate: closed by default, opened by the thread switching away
struct Gate {
    open: Mutex<bool>,
    cond: Condvar,
}

impl Gate {
    fn new() -> Self {
        Self { open: Mutex::new(false), cond: Condvar::new() }
    }

    fn open(&self) {
        let mut open = self.open.lock().unwrap();
        *open = true;
        self.cond.notify_one();
    }

    /// Park until the gate opens, then close it again
    fn wait(&self) {
        let mut open = self.open.lock().unwrap();
        while !*open {
            open = self.cond.wait(open).unwrap();
        }
        *open = false;
    }
}

struct Inner {
    gate: Gate,
}

/// Saved "CPU context" of a kernel thread: a handle to its run gate
pub struct Context {
    inner: Arc<Inner>,
}

impl Context {
    /// Context slot for a thread that is already running (the bootstrap
    /// thread, i.e. the host thread that created the kernel).
    pub fn bootstrap() -> Self {
        Self { inner: Arc::new(Inner { gate: Gate::new() }) }
    }

    /// Forge the initial context of a new thread.
    ///
    /// Spawns a host thread that parks on the gate immediately; the first
    /// switch into this context opens the gate and the thread runs the
    /// kernel's thread wrapper for `spec.tid`.
    pub fn forged(spec: &ForgeSpec) -> Self {
        let inner = Arc::new(Inner { gate: Gate::new() });
        let parked = inner.clone();
        let kernel_addr = spec.kernel;
        let tid = spec.tid;

        std::thread::spawn(move || {
            parked.gate.wait();
            // The kernel outlives every thread it hosts; tests leak their
            // kernel instances to uphold this.
            let kernel = unsafe { &*(kernel_addr as *const crate::Kernel) };
            kernel.run_thread(tid);
        });

        Self { inner }
    }
}

/// Switch from `from` to `to`: open the target's gate, park on our own.
///
/// # Safety
/// Both pointers must reference live contexts. The gate handles are cloned
/// out before the target is released, so the underlying records may be
/// reclaimed by a joiner as soon as it runs.
pub unsafe fn switch(from: *mut Context, to: *const Context) {
    let own = (*from).inner.clone();
    let target = (*to).inner.clone();

    target.gate.open();
    own.gate.wait();
}
