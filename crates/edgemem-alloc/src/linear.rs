//! Bump allocator over one fixed-capacity block.
//!
//! A [`LinearAllocator`] holds a single cache-line-aligned block and a
//! cursor. Each allocation aligns the cursor's absolute address, hands out
//! the region and advances the cursor. Individual frees do nothing; the
//! whole block is reclaimed at once by [`reset`](Allocator::reset).
//!
//! The block is either taken from the platform ([`LinearAllocator::new`])
//! or allocated from a [`SystemAllocator`] under a tag
//! ([`LinearAllocator::new_in`]). The second form makes the arena visible
//! to that allocator's statistics and leak report until it is handed back
//! with [`LinearAllocator::release_into`].

#![allow(unsafe_code)]

use std::ptr::NonNull;

use edgemem_core::align::{align_up, is_valid_alignment, CACHE_LINE_SIZE};
use edgemem_core::{
    Allocator, FailureSink, MemoryError, MemoryStats, MemoryTag, ReportedFailure, SharedReporter,
    TaggedStats,
};

use crate::backing::Backing;
use crate::system::SystemAllocator;

/// Bump/arena allocator.
///
/// The cursor only moves forward between resets and never exceeds the
/// capacity. Pointers handed out before a reset must not be used after it.
pub struct LinearAllocator {
    block: Backing,
    /// Offset of the next free byte.
    cursor: usize,
    stats: TaggedStats,
    sink: FailureSink,
}

impl LinearAllocator {
    /// Arena of `capacity` bytes reporting through the default reporter.
    pub fn new(capacity: usize) -> Result<Self, MemoryError> {
        Self::with_sink(capacity, FailureSink::default())
    }

    /// Arena of `capacity` bytes reporting through `reporter`.
    pub fn with_reporter(capacity: usize, reporter: SharedReporter) -> Result<Self, MemoryError> {
        Self::with_sink(capacity, FailureSink::new(reporter))
    }

    /// Arena whose block is a `tag`-ged allocation of `system`.
    ///
    /// The arena reports through `system`'s reporter. Its block stays live
    /// in `system` until [`release_into`](Self::release_into); an arena
    /// dropped without it leaves the block in `system`'s leak report.
    #[track_caller]
    pub fn new_in(
        system: &mut SystemAllocator,
        capacity: usize,
        tag: MemoryTag,
    ) -> Result<Self, MemoryError> {
        check_capacity(capacity)?;
        let block = Backing::from_system(system, capacity, tag, CACHE_LINE_SIZE)?;
        Ok(Self::from_parts(block, FailureSink::new(system.reporter().clone())))
    }

    fn with_sink(capacity: usize, sink: FailureSink) -> Result<Self, MemoryError> {
        check_capacity(capacity)?;
        let block = Backing::owned(capacity, CACHE_LINE_SIZE)?;
        Ok(Self::from_parts(block, sink))
    }

    fn from_parts(block: Backing, sink: FailureSink) -> Self {
        tracing::debug!(
            capacity = block.len(),
            system_backed = block.is_system_backed(),
            "linear allocator created"
        );
        Self {
            block,
            cursor: 0,
            stats: TaggedStats::new(),
            sink,
        }
    }

    /// Tear the arena down, handing a borrowed block back to `system`.
    ///
    /// Pointers handed out by the arena become invalid. For an arena built
    /// with [`new`](Self::new) this just releases the block. Fails with
    /// [`MemoryError::ForeignPointer`] if the block came from a different
    /// allocator, in which case it stays allocated there.
    #[track_caller]
    pub fn release_into(self, system: &mut SystemAllocator) -> Result<(), MemoryError> {
        self.block.release_into(system)
    }

    /// Whether the block was allocated from a [`SystemAllocator`].
    pub fn is_system_backed(&self) -> bool {
        self.block.is_system_backed()
    }

    /// Total size of the backing block in bytes.
    pub fn capacity(&self) -> usize {
        self.block.len()
    }

    /// Bytes consumed so far, alignment padding included.
    pub fn used(&self) -> usize {
        self.cursor
    }

    /// Bytes left after the cursor.
    pub fn remaining(&self) -> usize {
        self.block.len() - self.cursor
    }

    /// Whether `ptr` points into the backing block.
    pub fn contains(&self, ptr: *const u8) -> bool {
        self.block.contains_addr(ptr as usize)
    }

    /// Counters for the tag at `index`; zeroed when `index` is not a tag.
    pub fn tag_stats_by_index(&self, index: usize) -> MemoryStats {
        self.stats.tag_by_index(index)
    }
}

fn check_capacity(capacity: usize) -> Result<(), MemoryError> {
    if capacity == 0 {
        return Err(MemoryError::contract("linear allocator capacity must be non-zero"));
    }
    Ok(())
}

impl Allocator for LinearAllocator {
    #[track_caller]
    fn allocate_tagged(
        &mut self,
        size: usize,
        tag: MemoryTag,
        alignment: usize,
    ) -> Option<NonNull<u8>> {
        if size == 0 {
            return None;
        }
        if !is_valid_alignment(alignment) {
            self.sink.raise(
                MemoryError::contract(format!("alignment {alignment} is not a power of two")),
                "alignment.is_power_of_two()",
            );
            return None;
        }

        let base = self.block.base_addr();
        let start = base
            .checked_add(self.cursor)
            .and_then(|addr| align_up(addr, alignment))
            .map(|addr| addr - base);
        let end = start.and_then(|start| start.checked_add(size));
        let (Some(start), Some(end)) = (start, end) else {
            return self.exhausted(size);
        };
        if end > self.capacity() {
            return self.exhausted(size);
        }

        // SAFETY: `start + size <= capacity`, so the region lies inside the
        // block, and `start < capacity` keeps the pointer in bounds.
        let ptr = unsafe { NonNull::new_unchecked(self.block.base().as_ptr().add(start)) };
        self.cursor = end;
        self.stats.record_allocation(tag, size);
        Some(ptr)
    }

    /// Does nothing: arena memory is only reclaimed by `reset`.
    #[track_caller]
    unsafe fn free(&mut self, _ptr: *mut u8) {}

    fn stats(&self) -> MemoryStats {
        self.stats.global()
    }

    fn tag_stats(&self, tag: MemoryTag) -> MemoryStats {
        self.stats.tag(tag)
    }

    /// Rewind the cursor to the start of the block.
    ///
    /// Everything outstanding is counted as freed, so afterwards
    /// `total_freed == total_allocated` and `free_count ==
    /// allocation_count`, globally and per tag.
    #[track_caller]
    fn reset(&mut self) {
        self.cursor = 0;
        self.stats.fold_outstanding();
    }

    fn last_failure(&self) -> Option<&ReportedFailure> {
        self.sink.last()
    }
}

impl LinearAllocator {
    #[track_caller]
    fn exhausted(&mut self, requested: usize) -> Option<NonNull<u8>> {
        let available = self.remaining();
        self.sink.raise(
            MemoryError::ResourceExhausted {
                requested,
                available: Some(available),
            },
            "aligned_offset + size <= capacity",
        );
        None
    }
}

impl std::fmt::Debug for LinearAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LinearAllocator")
            .field("capacity", &self.capacity())
            .field("used", &self.cursor)
            .field("stats", &self.stats.global())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SystemConfig;
    use edgemem_core::align::is_aligned;
    use edgemem_test_utils::RecordingReporter;
    use std::sync::Arc;

    fn arena(capacity: usize) -> (LinearAllocator, Arc<RecordingReporter>) {
        let reporter = Arc::new(RecordingReporter::new());
        let arena = LinearAllocator::with_reporter(capacity, reporter.clone()).unwrap();
        (arena, reporter)
    }

    #[test]
    fn zero_capacity_is_rejected() {
        assert!(matches!(
            LinearAllocator::new(0),
            Err(MemoryError::ContractViolation { .. })
        ));
    }

    #[test]
    fn allocations_are_sequential() {
        let (mut a, _) = arena(256);
        let p = a.allocate(10, 1).unwrap();
        let q = a.allocate(10, 1).unwrap();
        assert_eq!(q.as_ptr() as usize, p.as_ptr() as usize + 10);
        assert_eq!(a.used(), 20);
        assert_eq!(a.remaining(), 236);
    }

    #[test]
    fn alignment_pads_the_cursor() {
        let (mut a, _) = arena(256);
        a.allocate(3, 1).unwrap();
        let p = a.allocate(8, 32).unwrap();
        assert!(is_aligned(p.as_ptr() as usize, 32));
        assert_eq!(a.used(), 40);
    }

    #[test]
    fn overflow_reports_exhaustion_with_available() {
        let (mut a, reporter) = arena(1024);
        a.allocate(600, 16).unwrap();
        assert!(a.allocate(500, 16).is_none());
        assert_eq!(reporter.count_kind("resource_exhausted"), 1);
        assert_eq!(
            a.last_failure().unwrap().failure.error,
            MemoryError::ResourceExhausted {
                requested: 500,
                available: Some(424)
            }
        );
        assert_eq!(a.used(), 600);
    }

    #[test]
    fn reset_rewinds_to_base_and_folds_stats() {
        let (mut a, _) = arena(1024);
        let first = a.allocate_tagged(600, MemoryTag::Temp, 16).unwrap();
        assert!(a.allocate(500, 16).is_none());
        a.reset();

        let again = a.allocate(500, 16).unwrap();
        assert_eq!(again, first);

        let s = a.stats();
        assert_eq!(s.allocation_count, 2);
        assert_eq!(s.free_count, 1);
        assert_eq!(s.current_usage, 500);
        assert_eq!(s.peak_usage, 600);
        let t = a.tag_stats(MemoryTag::Temp);
        assert_eq!(t.total_freed, 600);
        assert_eq!(t.free_count, 1);
    }

    #[test]
    fn free_is_a_noop() {
        let (mut a, reporter) = arena(64);
        let p = a.allocate(16, 16).unwrap();
        unsafe { a.free(p.as_ptr()) };
        unsafe { a.free(std::ptr::null_mut()) };
        assert_eq!(a.used(), 16);
        assert_eq!(a.stats().free_count, 0);
        assert_eq!(reporter.count(), 0);
    }

    #[test]
    fn zero_size_and_bad_alignment() {
        let (mut a, reporter) = arena(64);
        assert!(a.allocate(0, 16).is_none());
        assert_eq!(reporter.count(), 0);
        assert!(a.allocate(8, 3).is_none());
        assert_eq!(reporter.count_kind("contract_violation"), 1);
        assert_eq!(a.stats(), MemoryStats::default());
    }

    #[test]
    fn contains_covers_the_block() {
        let (mut a, _) = arena(64);
        let p = a.allocate(8, 8).unwrap();
        assert!(a.contains(p.as_ptr()));
        let outside = 1u8;
        assert!(!a.contains(&outside));
    }

    #[test]
    fn system_backed_arena_is_counted_by_its_system() {
        let reporter = Arc::new(RecordingReporter::new());
        let mut sys = SystemAllocator::with_reporter(SystemConfig::tracked(), reporter.clone());
        let mut a = LinearAllocator::new_in(&mut sys, 1024, MemoryTag::Temp).unwrap();
        assert!(a.is_system_backed());
        assert_eq!(sys.stats().current_usage, 1024);
        assert_eq!(sys.tag_stats(MemoryTag::Temp).allocation_count, 1);

        let p = a.allocate_tagged(100, MemoryTag::Ai, 16).unwrap();
        assert!(a.contains(p.as_ptr()));
        assert!(is_aligned(p.as_ptr() as usize, 16));
        // Arena allocations never reach the system allocator.
        assert_eq!(sys.stats().allocation_count, 1);

        assert!(a.allocate(2048, 16).is_none());
        assert_eq!(reporter.count_kind("resource_exhausted"), 1);

        a.release_into(&mut sys).unwrap();
        assert_eq!(sys.stats().current_usage, 0);
        assert!(sys.shutdown().is_ok());
    }

    #[test]
    fn unreleased_arena_shows_in_leak_report() {
        let reporter = Arc::new(RecordingReporter::new());
        let mut sys = SystemAllocator::with_reporter(SystemConfig::tracked(), reporter);
        let a = LinearAllocator::new_in(&mut sys, 256, MemoryTag::Physics).unwrap();
        drop(a);
        let report = sys.leak_report().unwrap();
        assert_eq!(report.len(), 1);
        assert_eq!(report.entries[0].size, 256);
        assert_eq!(report.entries[0].tag, MemoryTag::Physics);
        assert_eq!(report.entries[0].location.file(), file!());
        assert!(sys.shutdown().is_err());
    }

    #[test]
    fn new_in_rejects_zero_capacity_without_allocating() {
        let mut sys = SystemAllocator::new(SystemConfig::tracked());
        assert!(matches!(
            LinearAllocator::new_in(&mut sys, 0, MemoryTag::NoTag),
            Err(MemoryError::ContractViolation { .. })
        ));
        assert_eq!(sys.outstanding(), 0);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn cursor_is_monotonic_and_bounded(
                reqs in proptest::collection::vec((1usize..200, 0u32..8), 1..60),
            ) {
                let (mut a, _) = arena(4096);
                let mut last = 0;
                for (size, shift) in reqs {
                    let align = 1usize << shift;
                    if let Some(p) = a.allocate(size, align) {
                        prop_assert!(is_aligned(p.as_ptr() as usize, align));
                        prop_assert!(a.contains(p.as_ptr()));
                    }
                    prop_assert!(a.used() >= last);
                    prop_assert!(a.used() <= a.capacity());
                    last = a.used();
                }
                a.reset();
                let s = a.stats();
                prop_assert_eq!(s.total_freed, s.total_allocated);
                prop_assert_eq!(s.free_count, s.allocation_count);
                prop_assert_eq!(a.used(), 0);
            }
        }
    }
}
