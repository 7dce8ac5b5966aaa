//! x86_64 PIT (Programmable Interval Timer)
//!
//! Periodic tick source and the coarse monotonic clock derived from it.
//! The clock advances by one tick period per IRQ0, so its resolution is
//! bounded by the programmed frequency.

use core::sync::atomic::{AtomicU64, Ordering};

use super::cpu;

/// PIT channel 0 data port
const PIT_CHANNEL0: u16 = 0x40;
/// PIT mode/command port
const PIT_COMMAND: u16 = 0x43;
/// PIT input clock in Hz
const PIT_FREQUENCY: u32 = 1_193_182;

/// Monotonic nanoseconds since boot, advanced on every tick
static CLOCK_NS: AtomicU64 = AtomicU64::new(0);

/// Nanoseconds per programmed tick
static NS_PER_TICK: AtomicU64 = AtomicU64::new(10_000_000);

/// Program channel 0 as a rate generator at approximately `hz`
pub fn set_frequency(hz: u32) {
    let hz = hz.max(19); // a 16-bit divisor cannot go slower
    let divisor = (PIT_FREQUENCY / hz).min(0xFFFF) as u16;

    NS_PER_TICK.store(1_000_000_000 / hz as u64, Ordering::Relaxed);

    unsafe {
        // Channel 0, lobyte/hibyte, rate generator (mode 2)
        cpu::outb(PIT_COMMAND, 0x34);
        cpu::outb(PIT_CHANNEL0, (divisor & 0xFF) as u8);
        cpu::outb(PIT_CHANNEL0, (divisor >> 8) as u8);
    }
}

/// Advance the monotonic clock by one tick period (IRQ0 path)
pub fn on_tick() {
    CLOCK_NS.fetch_add(NS_PER_TICK.load(Ordering::Relaxed), Ordering::Relaxed);
}

/// Monotonic nanoseconds since boot
pub fn now_ns() -> u64 {
    CLOCK_NS.load(Ordering::Relaxed)
}
