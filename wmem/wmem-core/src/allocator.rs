use crate::AllocError;
use core::ptr::{self, NonNull};

/// The allocator handle contract.
///
/// Implementors provide the five primitive operations; the byte-level helpers
/// ([`alloc_zeroed`](Self::alloc_zeroed), [`memdup`](Self::memdup)) and the
/// null-tolerant entry points ([`free_nullable`](Self::free_nullable),
/// [`realloc_nullable`](Self::realloc_nullable)) are layered on top and shared
/// by every allocator.
///
/// Dropping the handle is the cleanup step: it must release all memory the
/// allocator owns, including allocations that were never freed.
pub trait Allocator {
    /// Allocate at least `size` bytes.
    ///
    /// `size == 0` is legal and yields a distinct pointer that may be passed
    /// to [`free`](Self::free) and [`realloc`](Self::realloc).
    ///
    /// # Errors
    /// Returns [`AllocError`] if the backing heap refuses memory.
    fn alloc(&mut self, size: usize) -> Result<NonNull<u8>, AllocError>;

    /// Return an allocation to the allocator.
    ///
    /// # Safety
    /// `ptr` must have been returned by [`alloc`](Self::alloc) or
    /// [`realloc`](Self::realloc) on this same handle, must not have been
    /// freed, and must not have been invalidated by
    /// [`free_all`](Self::free_all).
    unsafe fn free(&mut self, ptr: NonNull<u8>);

    /// Resize an allocation to `size` bytes.
    ///
    /// The first `min(old_size, size)` bytes are preserved. The returned
    /// pointer may differ from `ptr`, in which case `ptr` is no longer valid.
    ///
    /// # Errors
    /// Returns [`AllocError`] if the backing heap refuses memory. `ptr` stays
    /// valid in that case.
    ///
    /// # Safety
    /// Same requirements on `ptr` as [`free`](Self::free).
    unsafe fn realloc(&mut self, ptr: NonNull<u8>, size: usize) -> Result<NonNull<u8>, AllocError>;

    /// Invalidate every allocation made through this handle at once.
    fn free_all(&mut self);

    /// Return unused backing memory. Live allocations are unaffected.
    fn gc(&mut self);

    /// Allocate `size` zeroed bytes.
    ///
    /// # Errors
    /// Returns [`AllocError`] if the backing heap refuses memory.
    fn alloc_zeroed(&mut self, size: usize) -> Result<NonNull<u8>, AllocError> {
        let ptr = self.alloc(size)?;
        // SAFETY: `alloc` returned a region valid for writes of `size` bytes.
        unsafe { ptr::write_bytes(ptr.as_ptr(), 0, size) };
        Ok(ptr)
    }

    /// Allocate a copy of `src`.
    ///
    /// # Errors
    /// Returns [`AllocError`] if the backing heap refuses memory.
    fn memdup(&mut self, src: &[u8]) -> Result<NonNull<u8>, AllocError> {
        let ptr = self.alloc(src.len())?;
        // SAFETY: fresh allocation of `src.len()` bytes cannot overlap `src`.
        unsafe { ptr::copy_nonoverlapping(src.as_ptr(), ptr.as_ptr(), src.len()) };
        Ok(ptr)
    }

    /// [`free`](Self::free), but a null pointer is a no-op.
    ///
    /// # Safety
    /// A non-null `ptr` must satisfy the requirements of [`free`](Self::free).
    unsafe fn free_nullable(&mut self, ptr: *mut u8) {
        if let Some(ptr) = NonNull::new(ptr) {
            unsafe { self.free(ptr) }
        }
    }

    /// [`realloc`](Self::realloc) with C-style edge cases.
    ///
    /// A null `ptr` behaves like [`alloc`](Self::alloc). A `size` of zero frees
    /// `ptr` and returns null.
    ///
    /// # Errors
    /// Returns [`AllocError`] if the backing heap refuses memory.
    ///
    /// # Safety
    /// A non-null `ptr` must satisfy the requirements of [`free`](Self::free).
    unsafe fn realloc_nullable(&mut self, ptr: *mut u8, size: usize) -> Result<*mut u8, AllocError> {
        let Some(ptr) = NonNull::new(ptr) else {
            return self.alloc(size).map(NonNull::as_ptr);
        };

        if size == 0 {
            unsafe { self.free(ptr) };
            return Ok(ptr::null_mut());
        }

        unsafe { self.realloc(ptr, size) }.map(NonNull::as_ptr)
    }
}
