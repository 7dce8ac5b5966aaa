//! Platform abstraction shim
//!
//! The narrow waist between the portable kernel and the machine: timer
//! programming, interrupt masking and dispatch, physical memory windows,
//! PCI configuration space, port I/O and the monotonic clock.
//!
//! Three implementations share one API: bare-metal x86_64 (PIT + PIC +
//! IDT), a simulated platform for test builds (manually advanced clock,
//! raisable vectors), and a no-op stub for unported targets. Operations
//! are safe from interrupt context except `memory_map_physical` and
//! `memory_unmap`, which need the normal kernel scheduling context.

/// Cache policy for physical memory windows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CachePolicy {
    Cacheable,
    Uncacheable,
    WriteCombining,
}

/// Saved interrupt state, returned by [`Platform::interrupt_save_and_disable`]
/// and consumed by [`Platform::interrupt_restore`]. Carrying it as a value
/// keeps save/restore pairs matched.
#[must_use = "dropping the token loses the saved interrupt state"]
#[derive(Debug)]
pub struct IrqState {
    enabled: bool,
}

impl IrqState {
    /// Whether interrupts were enabled when the state was saved
    pub fn was_enabled(&self) -> bool {
        self.enabled
    }
}

/// Handler-with-context registered for an interrupt vector
pub type InterruptHandler = fn(context: usize);

/// The platform instance a kernel is built on
pub struct Platform {
    #[cfg(test)]
    host: host_state::HostState,
}

impl Platform {
    pub fn new() -> Self {
        Self {
            #[cfg(test)]
            host: host_state::HostState::new(),
        }
    }
}

impl Default for Platform {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Bare-metal x86_64
// ============================================================================

#[cfg(all(target_arch = "x86_64", target_os = "none", not(test)))]
impl Platform {
    pub fn interrupt_save_and_disable(&self) -> IrqState {
        IrqState { enabled: crate::arch::platform::interrupts::save_and_disable() }
    }

    pub fn interrupt_restore(&self, state: IrqState) {
        crate::arch::platform::interrupts::restore(state.enabled);
    }

    pub fn interrupt_enable(&self) {
        crate::arch::platform::interrupts::enable();
    }

    pub fn interrupt_disable(&self) {
        crate::arch::platform::interrupts::disable();
    }

    pub fn interrupts_enabled(&self) -> bool {
        crate::arch::platform::interrupts::are_enabled()
    }

    pub fn interrupt_register(&self, vector: u8, handler: InterruptHandler, context: usize) {
        crate::arch::platform::idt::register(vector, handler, context);
    }

    pub fn interrupt_unregister(&self, vector: u8) {
        crate::arch::platform::idt::unregister(vector);
    }

    /// Program the periodic timer and route it through `vector`.
    /// The handler runs in interrupt context on every tick.
    pub fn timer_configure(&self, hz: u32, vector: u8, handler: InterruptHandler, context: usize) {
        crate::arch::platform::idt::register(vector, handler, context);
        crate::arch::platform::pit::set_frequency(hz);
    }

    pub fn timer_start(&self) {
        unsafe {
            crate::arch::platform::pic::PICS.lock().unmask(0);
        }
    }

    pub fn timer_stop(&self) {
        unsafe {
            crate::arch::platform::pic::PICS.lock().mask(0);
        }
    }

    pub fn monotonic_time_ns(&self) -> u64 {
        crate::arch::platform::pit::now_ns()
    }

    /// Map a physical range into the kernel's view. The boot environment
    /// identity-maps low physical memory, so the window is the address
    /// itself; the cache policy is advisory until paging is reworked.
    pub fn memory_map_physical(&self, phys: u64, _len: usize, _policy: CachePolicy) -> u64 {
        phys
    }

    pub fn memory_unmap(&self, _virt: u64, _len: usize) {}

    pub fn memory_get_physical(&self, virt: u64) -> u64 {
        virt
    }

    pub fn pci_config_read(&self, bus: u8, device: u8, function: u8, offset: u8) -> u32 {
        let address = pci_address(bus, device, function, offset);
        unsafe {
            crate::arch::platform::cpu::outl(0xCF8, address);
            crate::arch::platform::cpu::inl(0xCFC)
        }
    }

    pub fn pci_config_write(&self, bus: u8, device: u8, function: u8, offset: u8, value: u32) {
        let address = pci_address(bus, device, function, offset);
        unsafe {
            crate::arch::platform::cpu::outl(0xCF8, address);
            crate::arch::platform::cpu::outl(0xCFC, value);
        }
    }

    pub unsafe fn port_in8(&self, port: u16) -> u8 {
        crate::arch::platform::cpu::inb(port)
    }

    pub unsafe fn port_in16(&self, port: u16) -> u16 {
        crate::arch::platform::cpu::inw(port)
    }

    pub unsafe fn port_in32(&self, port: u16) -> u32 {
        crate::arch::platform::cpu::inl(port)
    }

    pub unsafe fn port_out8(&self, port: u16, value: u8) {
        crate::arch::platform::cpu::outb(port, value);
    }

    pub unsafe fn port_out16(&self, port: u16, value: u16) {
        crate::arch::platform::cpu::outw(port, value);
    }

    pub unsafe fn port_out32(&self, port: u16, value: u32) {
        crate::arch::platform::cpu::outl(port, value);
    }
}

#[cfg(all(target_arch = "x86_64", target_os = "none", not(test)))]
fn pci_address(bus: u8, device: u8, function: u8, offset: u8) -> u32 {
    0x8000_0000
        | ((bus as u32) << 16)
        | ((device as u32 & 0x1F) << 11)
        | ((function as u32 & 0x07) << 8)
        | (offset as u32 & 0xFC)
}

// ============================================================================
// Simulated platform (test builds)
// ============================================================================

#[cfg(test)]
mod host_state {
    use super::InterruptHandler;
    use core::sync::atomic::{AtomicBool, AtomicU64, Ordering};
    use spin::Mutex;

    pub(super) struct TimerState {
        pub period_ns: u64,
        pub vector: u8,
        pub next_deadline: u64,
        pub running: bool,
    }

    pub(super) struct HostState {
        pub clock_ns: AtomicU64,
        pub irq_enabled: AtomicBool,
        pub timer: Mutex<Option<TimerState>>,
        pub vectors: Mutex<[Option<(InterruptHandler, usize)>; 256]>,
    }

    impl HostState {
        pub fn new() -> Self {
            Self {
                clock_ns: AtomicU64::new(0),
                irq_enabled: AtomicBool::new(true),
                timer: Mutex::new(None),
                vectors: Mutex::new([None; 256]),
            }
        }

        pub fn dispatch(&self, vector: u8) {
            let entry = self.vectors.lock()[vector as usize];
            if let Some((handler, context)) = entry {
                handler(context);
            }
        }

        pub fn swap_irq(&self, enabled: bool) -> bool {
            self.irq_enabled.swap(enabled, Ordering::SeqCst)
        }
    }
}

#[cfg(test)]
impl Platform {
    pub fn interrupt_save_and_disable(&self) -> IrqState {
        IrqState { enabled: self.host.swap_irq(false) }
    }

    pub fn interrupt_restore(&self, state: IrqState) {
        self.host.swap_irq(state.enabled);
    }

    pub fn interrupt_enable(&self) {
        self.host.swap_irq(true);
    }

    pub fn interrupt_disable(&self) {
        self.host.swap_irq(false);
    }

    pub fn interrupts_enabled(&self) -> bool {
        self.host.irq_enabled.load(core::sync::atomic::Ordering::SeqCst)
    }

    pub fn interrupt_register(&self, vector: u8, handler: InterruptHandler, context: usize) {
        self.host.vectors.lock()[vector as usize] = Some((handler, context));
    }

    pub fn interrupt_unregister(&self, vector: u8) {
        self.host.vectors.lock()[vector as usize] = None;
    }

    pub fn timer_configure(&self, hz: u32, vector: u8, handler: InterruptHandler, context: usize) {
        self.interrupt_register(vector, handler, context);
        let period = 1_000_000_000 / hz.max(1) as u64;
        let now = self.monotonic_time_ns();
        *self.host.timer.lock() = Some(host_state::TimerState {
            period_ns: period,
            vector,
            next_deadline: now + period,
            running: false,
        });
    }

    pub fn timer_start(&self) {
        if let Some(timer) = self.host.timer.lock().as_mut() {
            timer.running = true;
        }
    }

    pub fn timer_stop(&self) {
        if let Some(timer) = self.host.timer.lock().as_mut() {
            timer.running = false;
        }
    }

    pub fn monotonic_time_ns(&self) -> u64 {
        self.host.clock_ns.load(core::sync::atomic::Ordering::SeqCst)
    }

    pub fn memory_map_physical(&self, phys: u64, _len: usize, _policy: CachePolicy) -> u64 {
        phys
    }

    pub fn memory_unmap(&self, _virt: u64, _len: usize) {}

    pub fn memory_get_physical(&self, virt: u64) -> u64 {
        virt
    }

    pub fn pci_config_read(&self, _bus: u8, _device: u8, _function: u8, _offset: u8) -> u32 {
        0xFFFF_FFFF // empty bus
    }

    pub fn pci_config_write(&self, _bus: u8, _device: u8, _function: u8, _offset: u8, _value: u32) {}

    pub unsafe fn port_in8(&self, _port: u16) -> u8 {
        0
    }

    pub unsafe fn port_in16(&self, _port: u16) -> u16 {
        0
    }

    pub unsafe fn port_in32(&self, _port: u16) -> u32 {
        0
    }

    pub unsafe fn port_out8(&self, _port: u16, _value: u8) {}

    pub unsafe fn port_out16(&self, _port: u16, _value: u16) {}

    pub unsafe fn port_out32(&self, _port: u16, _value: u32) {}

    /// Advance the simulated clock, firing the periodic timer callback for
    /// every period boundary crossed. The callbacks run on the calling
    /// thread, mirroring how a real interrupt borrows the running thread.
    pub fn test_advance_time(&self, ns: u64) {
        use core::sync::atomic::Ordering;

        let target = self.host.clock_ns.load(Ordering::SeqCst) + ns;
        loop {
            let due = {
                let mut guard = self.host.timer.lock();
                match guard.as_mut() {
                    Some(t) if t.running && t.next_deadline <= target => {
                        let deadline = t.next_deadline;
                        t.next_deadline += t.period_ns;
                        Some((t.vector, deadline))
                    }
                    _ => None,
                }
            };
            match due {
                Some((vector, deadline)) => {
                    // Other threads may have pushed the clock further while
                    // this one was parked inside a tick; never rewind.
                    self.host.clock_ns.fetch_max(deadline, Ordering::SeqCst);
                    self.host.dispatch(vector);
                }
                None => break,
            }
        }
        self.host.clock_ns.fetch_max(target, Ordering::SeqCst);
    }

    /// Raise an interrupt vector by hand
    pub fn test_raise(&self, vector: u8) {
        self.host.dispatch(vector);
    }
}

// ============================================================================
// Stub for unported targets
// ============================================================================

#[cfg(all(not(test), not(all(target_arch = "x86_64", target_os = "none"))))]
impl Platform {
    pub fn interrupt_save_and_disable(&self) -> IrqState {
        IrqState { enabled: false }
    }

    pub fn interrupt_restore(&self, _state: IrqState) {}

    pub fn interrupt_enable(&self) {}

    pub fn interrupt_disable(&self) {}

    pub fn interrupts_enabled(&self) -> bool {
        false
    }

    pub fn interrupt_register(&self, _vector: u8, _handler: InterruptHandler, _context: usize) {}

    pub fn interrupt_unregister(&self, _vector: u8) {}

    pub fn timer_configure(&self, _hz: u32, _vector: u8, _handler: InterruptHandler, _context: usize) {}

    pub fn timer_start(&self) {}

    pub fn timer_stop(&self) {}

    pub fn monotonic_time_ns(&self) -> u64 {
        0
    }

    pub fn memory_map_physical(&self, phys: u64, _len: usize, _policy: CachePolicy) -> u64 {
        phys
    }

    pub fn memory_unmap(&self, _virt: u64, _len: usize) {}

    pub fn memory_get_physical(&self, virt: u64) -> u64 {
        virt
    }

    pub fn pci_config_read(&self, _bus: u8, _device: u8, _function: u8, _offset: u8) -> u32 {
        0xFFFF_FFFF
    }

    pub fn pci_config_write(&self, _bus: u8, _device: u8, _function: u8, _offset: u8, _value: u32) {}

    pub unsafe fn port_in8(&self, _port: u16) -> u8 {
        0
    }

    pub unsafe fn port_in16(&self, _port: u16) -> u16 {
        0
    }

    pub unsafe fn port_in32(&self, _port: u16) -> u32 {
        0
    }

    pub unsafe fn port_out8(&self, _port: u16, _value: u8) {}

    pub unsafe fn port_out16(&self, _port: u16, _value: u16) {}

    pub unsafe fn port_out32(&self, _port: u16, _value: u32) {}
}
