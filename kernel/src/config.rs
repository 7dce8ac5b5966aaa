//! Kernel configuration constants
//!
//! Compile-time limits and defaults. There is no configuration file and no
//! environment; everything the core is parameterized on lives here.

/// Maximum number of tasks the task table can hold
pub const MAX_TASKS: usize = 256;

/// Maximum number of threads across all tasks
pub const MAX_THREADS: usize = 1024;

/// Maximum number of registered devices
pub const MAX_DEVICES: usize = 256;

/// Maximum number of registered drivers
pub const MAX_DRIVERS: usize = 64;

/// Default thread stack size (64 KiB)
pub const DEFAULT_STACK_SIZE: usize = 64 * 1024;

/// Smallest stack a thread may be created with
pub const MIN_STACK_SIZE: usize = 16 * 1024;

/// Default periodic tick rate in Hz
pub const DEFAULT_TICK_HZ: u32 = 100;

/// Interrupt vector the periodic timer is delivered through
pub const TIMER_VECTOR: u8 = 32;

/// Ticks a real-time thread runs before round-robin among equal
/// real-time threads kicks in. Lower priorities rotate every tick.
pub const REALTIME_QUANTUM_TICKS: u64 = 10;
