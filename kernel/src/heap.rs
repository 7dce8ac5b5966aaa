//! Kernel heap
//!
//! Global allocator for bare-metal builds. The boot path hands the heap
//! region to `init` before the first allocation; everything in the kernel
//! that touches `alloc` depends on that ordering.

use linked_list_allocator::LockedHeap;

#[global_allocator]
static ALLOCATOR: LockedHeap = LockedHeap::empty();

/// Hand the heap its backing region.
///
/// # Safety
/// The region must be unused, writable memory that stays mapped for the
/// lifetime of the kernel. Must be called exactly once, before any
/// allocation.
pub unsafe fn init(start: *mut u8, size: usize) {
    ALLOCATOR.lock().init(start, size);
}

/// Bytes currently handed out
pub fn used() -> usize {
    ALLOCATOR.lock().used()
}

/// Bytes still available
pub fn free() -> usize {
    ALLOCATOR.lock().free()
}

#[alloc_error_handler]
fn alloc_error(layout: core::alloc::Layout) -> ! {
    panic!("kernel heap exhausted allocating {:?}", layout);
}
