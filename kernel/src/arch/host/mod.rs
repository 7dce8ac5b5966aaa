//! Host platform implementation (test builds)
//!
//! Backs kernel threads with host threads so the scheduler, the context
//! switch path and the synchronization primitives run end-to-end inside an
//! ordinary test process. Time and interrupts are simulated by the
//! platform shim; nothing here touches hardware.

pub mod context;

pub mod cpu {
    /// Idle politely instead of executing HLT
    pub fn halt() {
        std::thread::yield_now();
    }
}
