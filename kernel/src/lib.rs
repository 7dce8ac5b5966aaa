//! FerrumOS Kernel Core
//!
//! The concurrency substrate of a small educational x86 kernel: task and
//! thread management, a preemptive priority scheduler, interrupt-masking
//! spinlocks and blocking primitives, the platform shim and the uniform
//! device/driver registry.
//!
//! All mutable state hangs off a single [`Kernel`] object. Bare-metal
//! builds use the one global instance behind [`kernel`]; tests build
//! against a simulated platform and instantiate as many independent
//! kernels as they like.

#![cfg_attr(not(test), no_std)]
#![cfg_attr(
    all(target_os = "none", not(test)),
    feature(abi_x86_interrupt, alloc_error_handler)
)]

extern crate alloc;

pub mod arch;
pub mod config;
pub mod devices;
pub mod errno;
pub mod fs;
#[cfg(all(target_os = "none", not(test)))]
pub mod heap;
pub mod logger;
#[cfg(all(target_os = "none", not(test)))]
mod panic;
pub mod platform;
pub mod sched;
pub mod sync;
pub mod task;
pub mod thread;
pub mod time;

pub use errno::{Errno, KResult};
pub use platform::Platform;

use core::sync::atomic::AtomicU64;

use sync::SpinLock;

/// The kernel: every table and counter the core owns, rooted in one
/// object so subsystems share state through it instead of through module
/// globals.
pub struct Kernel {
    platform: Platform,
    pub(crate) threads: SpinLock<thread::ThreadTable>,
    pub(crate) tasks: SpinLock<task::TaskTable>,
    pub(crate) timers: SpinLock<time::TimerWheel>,
    pub(crate) devices: SpinLock<devices::DeviceRegistry>,
    pub(crate) sched: sched::SchedState,
    pub(crate) current_tid: AtomicU64,
}

impl Kernel {
    /// Build an empty kernel on a fresh platform instance
    pub fn new() -> Self {
        Self {
            platform: Platform::new(),
            threads: SpinLock::new(thread::ThreadTable::new()),
            tasks: SpinLock::new(task::TaskTable::new()),
            timers: SpinLock::new(time::TimerWheel::new()),
            devices: SpinLock::new(devices::DeviceRegistry::new()),
            sched: sched::SchedState::new(),
            current_tid: AtomicU64::new(thread::BOOTSTRAP_TID),
        }
    }

    /// The platform this kernel runs on
    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Install the system task and adopt the calling context as its
    /// bootstrap thread (thread 0, already running).
    pub fn init(&self) {
        {
            let mut tasks = self.tasks.acquire(&self.platform);
            let mut system = task::Task::new(
                task::SYSTEM_TASK,
                "system",
                task::SYSTEM_TASK,
                task::TaskFlags(task::TaskFlags::SYSTEM),
                task::AddressSpace::default(),
            );
            system.state = task::TaskState::Running;
            system.threads.push(thread::BOOTSTRAP_TID);
            tasks.tasks.insert(task::SYSTEM_TASK, system);
        }
        {
            let mut tt = self.threads.acquire(&self.platform);
            tt.threads.insert(
                thread::BOOTSTRAP_TID,
                alloc::boxed::Box::new(thread::Thread::bootstrap()),
            );
        }
        crate::log!("[KERNEL] core initialized");
    }
}

impl Default for Kernel {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(not(test))]
static KERNEL_READY: core::sync::atomic::AtomicBool = core::sync::atomic::AtomicBool::new(false);

#[cfg(not(test))]
lazy_static::lazy_static! {
    static ref KERNEL: Kernel = {
        let kernel = Kernel::new();
        kernel.init();
        kernel
    };
}

/// The global kernel instance. First use initializes it; the heap must be
/// up before that (see `heap::init`).
#[cfg(not(test))]
pub fn kernel() -> &'static Kernel {
    let k: &'static Kernel = &KERNEL;
    KERNEL_READY.store(true, core::sync::atomic::Ordering::Release);
    k
}

/// The global kernel, but only if it finished initializing. Used by the
/// panic path, which must never trigger initialization itself.
#[cfg(not(test))]
pub(crate) fn kernel_if_ready() -> Option<&'static Kernel> {
    if KERNEL_READY.load(core::sync::atomic::Ordering::Acquire) {
        Some(&KERNEL)
    } else {
        None
    }
}

#[cfg(test)]
pub(crate) mod test_util {
    use crate::Kernel;

    /// A fresh, initialized kernel, leaked so host threads spawned for its
    /// kernel threads may reference it for the rest of the test process.
    pub(crate) fn boot_kernel() -> &'static Kernel {
        let kernel: &'static Kernel = Box::leak(Box::new(Kernel::new()));
        kernel.init();
        kernel
    }
}
