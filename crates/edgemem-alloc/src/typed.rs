//! Typed construct/destroy on top of any [`Allocator`].
//!
//! [`allocate_value`] requests `size_of::<T>()` bytes at `align_of::<T>()`
//! and moves the value in; [`free_value`] drops it in place and returns the
//! block. Zero-sized types get `None`, following the size-0 rule of the
//! allocation contract.
//!
//! ```
//! use edgemem_alloc::{allocate_value, free_value, SystemAllocator};
//! use edgemem_core::MemoryTag;
//!
//! let mut sys = SystemAllocator::default();
//! let p = allocate_value(&mut sys, MemoryTag::Script, [1u32, 2, 3]).unwrap();
//! assert_eq!(unsafe { p.as_ref() }[2], 3);
//! unsafe { free_value(&mut sys, p.as_ptr()) };
//! ```

#![allow(unsafe_code)]

use std::mem::{align_of, size_of};
use std::ptr::NonNull;

use edgemem_core::{Allocator, MemoryTag};

/// Allocate room for a `T` from `alloc` under `tag` and move `value` in.
///
/// Returns `None` for zero-sized `T`, or if the allocation fails (the
/// failure is reported through `alloc`). `value` is dropped in both cases.
#[track_caller]
pub fn allocate_value<T, A>(alloc: &mut A, tag: MemoryTag, value: T) -> Option<NonNull<T>>
where
    A: Allocator + ?Sized,
{
    let ptr = alloc
        .allocate_tagged(size_of::<T>(), tag, align_of::<T>())?
        .cast::<T>();
    // SAFETY: the block is fresh, `size_of::<T>()` bytes long and aligned
    // for `T`.
    unsafe { ptr.as_ptr().write(value) };
    Some(ptr)
}

/// Drop the `T` at `ptr` in place and return its block to `alloc`.
///
/// Null is a no-op.
///
/// # Safety
///
/// `ptr` must be null or a pointer returned by [`allocate_value`] on this
/// same allocator whose value has not been freed since. The value must not
/// be used afterwards.
#[track_caller]
pub unsafe fn free_value<T, A>(alloc: &mut A, ptr: *mut T)
where
    A: Allocator + ?Sized,
{
    if ptr.is_null() {
        return;
    }
    // SAFETY: caller contract; the value is live and initialised, and the
    // block came from `alloc`.
    unsafe {
        ptr.drop_in_place();
        alloc.free(ptr.cast::<u8>());
    }
}
