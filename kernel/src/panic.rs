//! Kernel panic handler
//!
//! A panic-class fault halts the scheduler and dumps what the kernel
//! knows: the message, the running thread and the scheduler counters.

use core::panic::PanicInfo;

#[panic_handler]
fn panic(info: &PanicInfo) -> ! {
    #[cfg(target_arch = "x86_64")]
    crate::arch::platform::interrupts::disable();

    crate::log_level!(crate::logger::LogLevel::Fatal, "KERNEL PANIC: {}", info);

    if let Some(kernel) = crate::kernel_if_ready() {
        let stats = kernel.sched_stats();
        crate::log_level!(
            crate::logger::LogLevel::Fatal,
            "  running thread {}, {} threads, {} ticks, {} voluntary / {} involuntary switches",
            kernel.current_thread_id(),
            kernel.thread_count(),
            stats.ticks,
            stats.voluntary_switches,
            stats.involuntary_switches
        );
    }

    crate::arch::halt_loop()
}
