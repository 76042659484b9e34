//! The one OS-facing primitive: aligned allocate and its paired free.
//!
//! Everything else in the crate obtains memory through [`raw_alloc`] /
//! [`raw_free`] or through an owned [`AlignedBlock`]. Unix targets use
//! `posix_memalign`/`free`, Windows uses `_aligned_malloc`/`_aligned_free`.
//! Neither needs the size at free time, which is what lets the untracked
//! system allocator run with zero per-allocation overhead.

#![allow(unsafe_code)]

use std::ffi::c_void;
use std::ptr::NonNull;

use edgemem_core::align::is_valid_alignment;

/// Smallest alignment the platform primitive accepts.
pub const MIN_PLATFORM_ALIGNMENT: usize = std::mem::size_of::<*mut c_void>();

/// Allocate `size` bytes aligned to `alignment`.
///
/// Returns `None` if `size` is zero, `alignment` is not a power of two, or
/// the platform is out of memory. Alignments below
/// [`MIN_PLATFORM_ALIGNMENT`] are raised to it.
pub fn raw_alloc(size: usize, alignment: usize) -> Option<NonNull<u8>> {
    if size == 0 || !is_valid_alignment(alignment) {
        return None;
    }
    let alignment = alignment.max(MIN_PLATFORM_ALIGNMENT);
    platform_alloc(size, alignment)
}

/// Release a block obtained from [`raw_alloc`].
///
/// # Safety
///
/// `ptr` must have come from [`raw_alloc`] and must not have been released
/// already.
pub unsafe fn raw_free(ptr: NonNull<u8>) {
    // SAFETY: forwarded caller contract.
    unsafe { platform_free(ptr) }
}

#[cfg(not(windows))]
fn platform_alloc(size: usize, alignment: usize) -> Option<NonNull<u8>> {
    let mut out: *mut c_void = std::ptr::null_mut();
    // SAFETY: `alignment` is a power of two and at least
    // `size_of::<*mut c_void>()`, as posix_memalign requires; `out` is a
    // valid place to write the result.
    let rc = unsafe { libc::posix_memalign(&mut out, alignment, size) };
    if rc != 0 {
        return None;
    }
    NonNull::new(out.cast::<u8>())
}

#[cfg(not(windows))]
unsafe fn platform_free(ptr: NonNull<u8>) {
    // SAFETY: `ptr` came from posix_memalign, which pairs with free.
    unsafe { libc::free(ptr.as_ptr().cast::<c_void>()) }
}

#[cfg(windows)]
fn platform_alloc(size: usize, alignment: usize) -> Option<NonNull<u8>> {
    // SAFETY: `alignment` is a power of two as _aligned_malloc requires.
    let out = unsafe { libc::aligned_malloc(size, alignment) };
    NonNull::new(out.cast::<u8>())
}

#[cfg(windows)]
unsafe fn platform_free(ptr: NonNull<u8>) {
    // SAFETY: `ptr` came from _aligned_malloc, which pairs with _aligned_free.
    unsafe { libc::aligned_free(ptr.as_ptr().cast::<c_void>()) }
}

/// An owned, aligned, fixed-size block of raw memory.
///
/// Backing store for the linear and pool allocators. The block is released
/// as a single unit on drop. Contents start uninitialised.
pub struct AlignedBlock {
    ptr: NonNull<u8>,
    len: usize,
    alignment: usize,
}

impl AlignedBlock {
    /// Allocate a block of `len` bytes aligned to `alignment`.
    ///
    /// Returns `None` under the same conditions as [`raw_alloc`].
    pub fn new(len: usize, alignment: usize) -> Option<Self> {
        let ptr = raw_alloc(len, alignment)?;
        Some(Self {
            ptr,
            len,
            alignment,
        })
    }

    /// First byte of the block.
    pub fn base(&self) -> NonNull<u8> {
        self.ptr
    }

    /// Address of the first byte.
    pub fn base_addr(&self) -> usize {
        self.ptr.as_ptr() as usize
    }

    /// Size of the block in bytes.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Always `false`: zero-length blocks cannot be constructed.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Alignment the block was requested with.
    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Whether `addr` falls inside `[base, base + len)`.
    pub fn contains_addr(&self, addr: usize) -> bool {
        let base = self.base_addr();
        addr >= base && addr - base < self.len
    }

    /// Pointer `offset` bytes into the block.
    ///
    /// Returns `None` if `offset` is not inside the block.
    pub fn at(&self, offset: usize) -> Option<NonNull<u8>> {
        if offset >= self.len {
            return None;
        }
        // SAFETY: `offset < len`, so the result stays inside the allocation
        // and is therefore non-null.
        Some(unsafe { NonNull::new_unchecked(self.ptr.as_ptr().add(offset)) })
    }
}

impl Drop for AlignedBlock {
    fn drop(&mut self) {
        // SAFETY: `ptr` came from raw_alloc in `new` and is released exactly
        // once, here.
        unsafe { raw_free(self.ptr) }
    }
}

impl std::fmt::Debug for AlignedBlock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedBlock")
            .field("base", &self.ptr)
            .field("len", &self.len)
            .field("alignment", &self.alignment)
            .finish()
    }
}

// SAFETY: the block is exclusively owned; moving it between threads moves
// that ownership with it.
unsafe impl Send for AlignedBlock {}
