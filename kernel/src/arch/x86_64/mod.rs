//! x86_64 platform implementation
//!
//! Port I/O, interrupt flag control, legacy PIC, PIT timer, 16550 serial
//! and the context-switch primitive. The IDT and its interrupt stubs only
//! exist on bare-metal builds.

pub mod context;
pub mod cpu;
pub mod interrupts;
pub mod pic;
pub mod pit;
pub mod serial;

#[cfg(target_os = "none")]
pub mod idt;
