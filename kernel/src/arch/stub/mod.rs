//! Stub platform for architectures without a port yet
//!
//! Compiles everywhere and does nothing. Lets the portable parts of the
//! kernel type-check on targets that have no context-switch or interrupt
//! implementation.

pub mod context;

pub mod cpu {
    /// No HLT equivalent wired up; spin politely
    pub fn halt() {
        core::hint::spin_loop();
    }
}
