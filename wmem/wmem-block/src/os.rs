//! # Backing memory
//!
//! Blocks come from an [`OsMemory`] implementation. The default, [`Heap`],
//! forwards to the global allocator; tests substitute their own to observe or
//! refuse requests.

use crate::ALIGN;
use core::alloc::Layout;
use core::ptr::NonNull;

/// Source of raw blocks.
///
/// Every request uses [`ALIGN`] as its alignment. Sizes passed to
/// [`reallocate`](Self::reallocate) and [`release`](Self::release) are exactly
/// the sizes the region was obtained with.
pub trait OsMemory {
    /// Obtain `size` bytes, or `None` if the request cannot be served.
    fn allocate(&mut self, size: usize) -> Option<NonNull<u8>>;

    /// Resize a region, possibly moving it. On `None` the old region is
    /// still valid and unchanged.
    ///
    /// # Safety
    /// `ptr` must have been obtained from this source with size `old_size`
    /// and not yet released.
    unsafe fn reallocate(&mut self, ptr: NonNull<u8>, old_size: usize, new_size: usize) -> Option<NonNull<u8>>;

    /// Return a region.
    ///
    /// # Safety
    /// `ptr` must have been obtained from this source with size `size` and not
    /// yet released.
    unsafe fn release(&mut self, ptr: NonNull<u8>, size: usize);
}

/// [`OsMemory`] backed by the global allocator.
#[derive(Debug, Default, Copy, Clone)]
pub struct Heap;

impl OsMemory for Heap {
    fn allocate(&mut self, size: usize) -> Option<NonNull<u8>> {
        let layout = Layout::from_size_align(size, ALIGN).ok()?;
        if layout.size() == 0 {
            return None;
        }
        // SAFETY: non-zero size checked above.
        NonNull::new(unsafe { alloc::alloc::alloc(layout) })
    }

    unsafe fn reallocate(&mut self, ptr: NonNull<u8>, old_size: usize, new_size: usize) -> Option<NonNull<u8>> {
        Layout::from_size_align(new_size, ALIGN).ok()?;
        // SAFETY: caller guarantees `ptr` was allocated with this layout.
        let old = unsafe { Layout::from_size_align_unchecked(old_size, ALIGN) };
        NonNull::new(unsafe { alloc::alloc::realloc(ptr.as_ptr(), old, new_size) })
    }

    unsafe fn release(&mut self, ptr: NonNull<u8>, size: usize) {
        // SAFETY: caller guarantees `ptr` was allocated with this layout.
        unsafe { alloc::alloc::dealloc(ptr.as_ptr(), Layout::from_size_align_unchecked(size, ALIGN)) }
    }
}
