//! Architecture Abstraction Layer
//!
//! Selects the platform implementation the rest of the kernel is built
//! against. Each implementation exposes the same public API:
//!
//! - `context`: saved CPU contexts, context forging and the low-level switch
//! - `cpu`: halt and other instruction-level helpers
//!
//! On bare-metal x86_64 the implementation drives real hardware (PIT, PIC,
//! IDT, port I/O). Under test it is backed by host threads so the scheduler
//! and primitives run end-to-end in an ordinary process. Other targets get
//! an explicit stub.

#[cfg(all(target_arch = "x86_64", not(test)))]
#[path = "x86_64/mod.rs"]
pub mod platform;

#[cfg(all(not(target_arch = "x86_64"), not(test)))]
#[path = "stub/mod.rs"]
pub mod platform;

#[cfg(test)]
#[path = "host/mod.rs"]
pub mod platform;

pub use platform::context;

/// Everything needed to forge the initial saved context of a new thread.
///
/// Contract: restoring the forged context for the first time begins
/// executing the wrapper with the given entry function and argument on the
/// given stack. Implementations consume the fields that are meaningful for
/// them and ignore the rest.
pub struct ForgeSpec {
    /// Top of the thread's stack region (highest address, 16-byte aligned down)
    pub stack_top: u64,
    /// Address of the thread entry wrapper
    pub wrapper: u64,
    /// Address of the entry function
    pub entry: u64,
    /// Opaque argument handed to the entry function
    pub arg: u64,
    /// Kernel instance the thread belongs to
    pub kernel: usize,
    /// Thread id the context is forged for
    pub tid: u64,
}

/// Halt the CPU until something interesting happens
#[inline(always)]
pub fn halt() {
    platform::cpu::halt();
}

/// Infinite halt loop — never returns
pub fn halt_loop() -> ! {
    loop {
        platform::cpu::halt();
    }
}
