//! Owning, zero-initialised buffers with cache-line or huge-page alignment.

use std::alloc::{Layout, alloc_zeroed, dealloc, handle_alloc_error};
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

/// Alignment used for every buffer: one cache line, enough for any vector load.
pub const CACHE_LINE: usize = 64;

/// Buffers at least this large are placed on 2 MiB boundaries.
const HUGE_PAGE: usize = 2 * 1024 * 1024;

mod sealed {
    pub trait Sealed {}
}

/// Plain integers whose all-zero bit pattern is a valid value.
pub trait Zeroable: Copy + sealed::Sealed {}

macro_rules! zeroable {
    ($($t:ty),*) => {$(
        impl sealed::Sealed for $t {}
        impl Zeroable for $t {}
    )*};
}

zeroable!(i8, u8, i16, i32);

/// A heap slice of `len` elements aligned to at least [`CACHE_LINE`].
///
/// Large parameter blocks are aligned to 2 MiB and, on Linux, advised as
/// transparent huge pages. Memory is released on drop.
pub struct AlignedBox<T: Zeroable> {
    ptr: NonNull<T>,
    len: usize,
    layout: Layout,
}

// SAFETY: AlignedBox uniquely owns its allocation, like Box<[T]>.
unsafe impl<T: Zeroable + Send> Send for AlignedBox<T> {}
// SAFETY: shared access only hands out &[T].
unsafe impl<T: Zeroable + Sync> Sync for AlignedBox<T> {}

impl<T: Zeroable> AlignedBox<T> {
    /// Allocate `len` zeroed elements.
    pub fn zeroed(len: usize) -> AlignedBox<T> {
        let size = len * size_of::<T>();
        let align = if size >= HUGE_PAGE { HUGE_PAGE } else { CACHE_LINE };
        let layout = match Layout::from_size_align(size, align) {
            Ok(layout) => layout.pad_to_align(),
            Err(_) => handle_alloc_error(Layout::new::<T>()),
        };

        if layout.size() == 0 {
            return AlignedBox { ptr: NonNull::dangling(), len, layout };
        }

        // SAFETY: layout has non-zero size.
        let raw = unsafe { alloc_zeroed(layout) };
        let Some(ptr) = NonNull::new(raw.cast::<T>()) else {
            handle_alloc_error(layout);
        };

        #[cfg(target_os = "linux")]
        if align == HUGE_PAGE {
            // SAFETY: the range is exactly the allocation made above.
            let rc = unsafe { libc::madvise(raw.cast(), layout.size(), libc::MADV_HUGEPAGE) };
            if rc != 0 {
                tracing::debug!(bytes = layout.size(), "madvise(MADV_HUGEPAGE) declined");
            }
        }

        AlignedBox { ptr, len, layout }
    }

    /// Allocate a copy of `values`.
    pub fn from_slice(values: &[T]) -> AlignedBox<T> {
        let mut buf = AlignedBox::zeroed(values.len());
        buf.copy_from_slice(values);
        buf
    }

    /// Alignment of the underlying allocation.
    #[inline]
    pub fn alignment(&self) -> usize {
        self.layout.align()
    }
}

impl<T: Zeroable> Drop for AlignedBox<T> {
    fn drop(&mut self) {
        if self.layout.size() != 0 {
            // SAFETY: ptr was returned by alloc_zeroed with this layout.
            unsafe { dealloc(self.ptr.as_ptr().cast(), self.layout) }
        }
    }
}

impl<T: Zeroable> Deref for AlignedBox<T> {
    type Target = [T];

    #[inline]
    fn deref(&self) -> &[T] {
        // SAFETY: ptr is valid and aligned for len initialised elements.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl<T: Zeroable> DerefMut for AlignedBox<T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut [T] {
        // SAFETY: as in deref, and &mut self guarantees exclusive access.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl<T: Zeroable> Clone for AlignedBox<T> {
    fn clone(&self) -> AlignedBox<T> {
        AlignedBox::from_slice(self)
    }
}

impl<T: Zeroable + PartialEq> PartialEq for AlignedBox<T> {
    fn eq(&self, other: &AlignedBox<T>) -> bool {
        **self == **other
    }
}

impl<T: Zeroable> fmt::Debug for AlignedBox<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AlignedBox")
            .field("len", &self.len)
            .field("align", &self.layout.align())
            .finish()
    }
}
