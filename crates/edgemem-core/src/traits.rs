//! The allocation contract every strategy implements.

use std::ptr::NonNull;

use crate::failure::ReportedFailure;
use crate::stats::MemoryStats;
use crate::tag::MemoryTag;

/// A source of raw memory blocks.
///
/// Implementations are single-threaded: they take `&mut self` and never
/// synchronise internally. Callers that share one instance between threads
/// must serialise access themselves.
///
/// # Contract
///
/// - A `size` of zero returns `None` without touching any state and without
///   reporting a failure.
/// - Every other `None` is accompanied by a reported failure, readable via
///   [`last_failure`](Allocator::last_failure).
/// - Every `Some(ptr)` is aligned to the requested alignment, which must be
///   a power of two.
/// - `free` with a null pointer does nothing.
pub trait Allocator {
    /// Allocate `size` bytes tagged as `tag`, aligned to `alignment`.
    #[track_caller]
    fn allocate_tagged(
        &mut self,
        size: usize,
        tag: MemoryTag,
        alignment: usize,
    ) -> Option<NonNull<u8>>;

    /// Allocate `size` untagged bytes aligned to `alignment`.
    #[track_caller]
    fn allocate(&mut self, size: usize, alignment: usize) -> Option<NonNull<u8>> {
        self.allocate_tagged(size, MemoryTag::NoTag, alignment)
    }

    /// Return a block to the allocator. Null is a no-op.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a pointer previously returned by this
    /// allocator's `allocate`/`allocate_tagged` that has not been freed
    /// since (or since the last `reset`). Allocators that can validate
    /// pointers report bad ones instead of misbehaving, but callers may not
    /// rely on that in general.
    #[allow(unsafe_code)]
    #[track_caller]
    unsafe fn free(&mut self, ptr: *mut u8);

    /// Aggregate statistics.
    fn stats(&self) -> MemoryStats;

    /// Statistics for one tag.
    fn tag_stats(&self, tag: MemoryTag) -> MemoryStats;

    /// Return the allocator to its freshly-constructed state.
    #[track_caller]
    fn reset(&mut self);

    /// The most recent reported failure, if any.
    fn last_failure(&self) -> Option<&ReportedFailure>;
}
