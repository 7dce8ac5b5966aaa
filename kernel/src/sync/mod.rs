//! Synchronization primitives
//!
//! The kernel's own locking toolkit. `SpinLock` masks local interrupts for
//! the duration of the hold and is the only lock the scheduler itself
//! takes; the blocking primitives (mutex, semaphore, condition variable)
//! park threads through the scheduler instead of spinning.

pub mod condvar;
pub mod mutex;
pub mod semaphore;

pub use condvar::CondVar;
pub use mutex::Mutex;
pub use semaphore::Semaphore;

use core::cell::UnsafeCell;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

use crate::platform::{IrqState, Platform};

/// Interrupt-masking spinlock.
///
/// `acquire` saves and disables local interrupts, then busy-waits on the
/// lock word; the guard restores the saved state on release. Safe to take
/// from interrupt context. Critical sections must be short and must never
/// block. Recursive acquisition deadlocks.
pub struct SpinLock<T> {
    locked: AtomicBool,
    data: UnsafeCell<T>,
}

unsafe impl<T: Send> Send for SpinLock<T> {}
unsafe impl<T: Send> Sync for SpinLock<T> {}

impl<T> SpinLock<T> {
    pub const fn new(data: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            data: UnsafeCell::new(data),
        }
    }

    /// Acquire the lock, spinning with exponential backoff on contention.
    /// Interrupts are off on the local processor until the guard drops.
    #[inline]
    pub fn acquire<'a>(&'a self, platform: &'a Platform) -> SpinGuard<'a, T> {
        let irq = platform.interrupt_save_and_disable();

        let mut spin_count = 0u32;
        while self
            .locked
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            spin_count += 1;
            for _ in 0..(1 << spin_count.min(6)) {
                core::hint::spin_loop();
            }
        }

        SpinGuard { lock: self, platform, irq: Some(irq) }
    }

    /// Try the lock word once; on failure the interrupt state is restored
    /// and `None` is returned.
    #[inline]
    pub fn try_acquire<'a>(&'a self, platform: &'a Platform) -> Option<SpinGuard<'a, T>> {
        let irq = platform.interrupt_save_and_disable();

        if self
            .locked
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
        {
            Some(SpinGuard { lock: self, platform, irq: Some(irq) })
        } else {
            platform.interrupt_restore(irq);
            None
        }
    }

    /// Whether somebody currently holds the lock
    #[inline]
    pub fn is_held(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }
}

/// Guard for a held [`SpinLock`]; releasing restores the interrupt state
/// saved at acquisition.
pub struct SpinGuard<'a, T> {
    lock: &'a SpinLock<T>,
    platform: &'a Platform,
    irq: Option<IrqState>,
}

impl<T> Deref for SpinGuard<'_, T> {
    type Target = T;

    fn deref(&self) -> &T {
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for SpinGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for SpinGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
        if let Some(irq) = self.irq.take() {
            self.platform.interrupt_restore(irq);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn acquire_masks_interrupts_until_release() {
        let pl = Platform::new();
        let lock = SpinLock::new(7u32);

        assert!(pl.interrupts_enabled());
        {
            let mut guard = lock.acquire(&pl);
            assert!(lock.is_held());
            assert!(!pl.interrupts_enabled());
            *guard += 1;
        }
        assert!(!lock.is_held());
        assert!(pl.interrupts_enabled());
        assert_eq!(*lock.acquire(&pl), 8);
    }

    #[test]
    fn try_acquire_fails_and_restores_state_when_held() {
        let pl = Platform::new();
        let lock = SpinLock::new(());

        let guard = lock.acquire(&pl);
        assert!(lock.try_acquire(&pl).is_none());
        // The failed attempt restored the (disabled) state saved by `guard`
        assert!(!pl.interrupts_enabled());
        drop(guard);
        assert!(pl.interrupts_enabled());
        assert!(lock.try_acquire(&pl).is_some());
    }

    #[test]
    fn nested_locks_restore_outermost_state_last() {
        let pl = Platform::new();
        let outer = SpinLock::new(());
        let inner = SpinLock::new(());

        let og = outer.acquire(&pl);
        let ig = inner.acquire(&pl);
        drop(ig);
        // Inner release restores the state saved at its acquire: still off
        assert!(!pl.interrupts_enabled());
        drop(og);
        assert!(pl.interrupts_enabled());
    }
}
