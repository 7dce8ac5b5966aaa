//! x86_64 interrupt flag control
//!
//! Enable, disable, save and restore the IF flag in RFLAGS. The saved
//! state is carried as a plain bool: was IF set before we touched it.

/// Enable interrupts (STI)
#[inline(always)]
pub fn enable() {
    unsafe {
        core::arch::asm!("sti", options(nomem, nostack));
    }
}

/// Disable interrupts (CLI)
#[inline(always)]
pub fn disable() {
    unsafe {
        core::arch::asm!("cli", options(nomem, nostack));
    }
}

/// Check if interrupts are enabled (IF flag in RFLAGS)
#[inline(always)]
pub fn are_enabled() -> bool {
    let flags: u64;
    unsafe {
        core::arch::asm!(
            "pushfq",
            "pop {}",
            out(reg) flags,
            options(nomem, preserves_flags)
        );
    }
    flags & (1 << 9) != 0 // IF flag is bit 9 of RFLAGS
}

/// Disable interrupts, returning whether they were enabled before
#[inline(always)]
pub fn save_and_disable() -> bool {
    let was_enabled = are_enabled();
    disable();
    was_enabled
}

/// Restore a previously saved interrupt state
#[inline(always)]
pub fn restore(was_enabled: bool) {
    if was_enabled {
        enable();
    }
}
