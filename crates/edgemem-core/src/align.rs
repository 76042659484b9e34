//! Alignment constants and arithmetic.

/// Alignment used when the caller does not ask for one (`max_align_t` on
/// 64-bit targets).
pub const DEFAULT_ALIGNMENT: usize = 16;

/// Alignment for SIMD-friendly data.
pub const SIMD_ALIGNMENT: usize = 16;

/// Cache-line size assumed for backing blocks.
pub const CACHE_LINE_SIZE: usize = 64;

/// Whether `alignment` is a non-zero power of two.
pub const fn is_valid_alignment(alignment: usize) -> bool {
    alignment.is_power_of_two()
}

/// Round `value` up to the next multiple of `alignment`.
///
/// Returns `None` on overflow. `alignment` must be a power of two.
pub const fn align_up(value: usize, alignment: usize) -> Option<usize> {
    debug_assert!(alignment.is_power_of_two());
    match value.checked_add(alignment - 1) {
        Some(v) => Some(v & !(alignment - 1)),
        None => None,
    }
}

/// Whether `address` is a multiple of `alignment`.
pub const fn is_aligned(address: usize, alignment: usize) -> bool {
    address & (alignment - 1) == 0
}

/// Advance `ptr` to the next address that is a multiple of `alignment`.
///
/// Returns `ptr` unchanged if it is already aligned, and `None` if the
/// rounded address would overflow. `alignment` must be a power of two. The
/// result keeps `ptr`'s provenance but is only dereferenceable if it still
/// lies inside the allocation `ptr` points into.
pub fn align_ptr<T>(ptr: *mut T, alignment: usize) -> Option<*mut T> {
    let addr = ptr as usize;
    let aligned = align_up(addr, alignment)?;
    Some(ptr.wrapping_byte_add(aligned - addr))
}
