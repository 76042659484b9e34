//! Fixed-size slab allocator with an intrusive free list.
//!
//! A [`PoolAllocator`] carves one block into `element_count` slots of
//! `stride` bytes. While a slot is free, its leading word holds the index
//! of the next free slot ([`END`] terminates the list), so the free list
//! costs no memory beyond the slots themselves. Allocation pops the head
//! and free pushes onto it, both O(1).
//!
//! The one auxiliary allocation is a per-slot tag table beside the block.
//! It records which tag each live slot was allocated under, so a free can
//! be charged to that tag, and it marks free slots, so a second free of the
//! same slot is detected instead of corrupting the list.
//!
//! Like the linear allocator, the block comes either from the platform
//! ([`PoolAllocator::new`]) or from a [`SystemAllocator`] under a tag
//! ([`PoolAllocator::new_in`]), in which case it counts as one live
//! allocation there until [`PoolAllocator::release_into`].

#![allow(unsafe_code)]

use std::ptr::NonNull;

use edgemem_core::align::is_valid_alignment;
use edgemem_core::{
    Allocator, FailureSink, MemoryError, MemoryStats, MemoryTag, ReportedFailure, SharedReporter,
    TaggedStats,
};

use crate::backing::Backing;
use crate::config::PoolConfig;
use crate::system::SystemAllocator;

/// Free-list terminator.
const END: usize = usize::MAX;

/// Slab allocator for blocks of one size class.
///
/// Usage is accounted at `element_size` per allocation, whatever size was
/// requested.
pub struct PoolAllocator {
    block: Backing,
    config: PoolConfig,
    stride: usize,
    /// Index of the first free slot, or [`END`].
    free_head: usize,
    free_count: usize,
    /// Tag of each allocated slot; `None` while the slot is free. Lives
    /// outside the block, unlike the free list.
    slot_tags: Vec<Option<MemoryTag>>,
    stats: TaggedStats,
    sink: FailureSink,
}

impl PoolAllocator {
    /// Pool with the given geometry, reporting through the default reporter.
    pub fn new(config: PoolConfig) -> Result<Self, MemoryError> {
        Self::with_sink(config, FailureSink::default())
    }

    /// Pool with the given geometry, reporting through `reporter`.
    pub fn with_reporter(
        config: PoolConfig,
        reporter: SharedReporter,
    ) -> Result<Self, MemoryError> {
        Self::with_sink(config, FailureSink::new(reporter))
    }

    /// Pool whose block is a `tag`-ged allocation of `system`.
    ///
    /// The pool reports through `system`'s reporter. Its block stays live
    /// in `system` until [`release_into`](Self::release_into); a pool
    /// dropped without it leaves the block in `system`'s leak report.
    #[track_caller]
    pub fn new_in(
        system: &mut SystemAllocator,
        config: PoolConfig,
        tag: MemoryTag,
    ) -> Result<Self, MemoryError> {
        let stride = config.stride()?;
        let bytes = config.block_bytes()?;
        let block = Backing::from_system(system, bytes, tag, config.alignment)?;
        let sink = FailureSink::new(system.reporter().clone());
        Ok(Self::from_parts(block, config, stride, sink))
    }

    fn with_sink(config: PoolConfig, sink: FailureSink) -> Result<Self, MemoryError> {
        let stride = config.stride()?;
        let bytes = config.block_bytes()?;
        let block = Backing::owned(bytes, config.alignment)?;
        Ok(Self::from_parts(block, config, stride, sink))
    }

    fn from_parts(block: Backing, config: PoolConfig, stride: usize, sink: FailureSink) -> Self {
        tracing::debug!(
            element_size = config.element_size,
            element_count = config.element_count,
            stride,
            system_backed = block.is_system_backed(),
            "pool allocator created"
        );
        let mut pool = Self {
            block,
            config,
            stride,
            free_head: END,
            free_count: 0,
            slot_tags: vec![None; config.element_count],
            stats: TaggedStats::new(),
            sink,
        };
        pool.rebuild_free_list();
        pool
    }

    /// Tear the pool down, handing a borrowed block back to `system`.
    ///
    /// Every slot becomes invalid. For a pool built with [`new`](Self::new)
    /// this just releases the block. Fails with
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

    /// Largest request a slot can satisfy.
    pub fn element_size(&self) -> usize {
        self.config.element_size
    }

    /// Number of slots.
    pub fn element_count(&self) -> usize {
        self.config.element_count
    }

    /// Alignment of every slot.
    pub fn alignment(&self) -> usize {
        self.config.alignment
    }

    /// Distance in bytes between consecutive slots.
    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Number of slots currently free.
    pub fn free_count(&self) -> usize {
        self.free_count
    }

    /// Whether `ptr` points into the pool's block.
    pub fn contains(&self, ptr: *const u8) -> bool {
        self.block.contains_addr(ptr as usize)
    }

    /// Counters for the tag at `index`; zeroed when `index` is not a tag.
    pub fn tag_stats_by_index(&self, index: usize) -> MemoryStats {
        self.stats.tag_by_index(index)
    }

    fn slot_ptr(&self, index: usize) -> *mut u8 {
        debug_assert!(index < self.config.element_count);
        // SAFETY: `index < element_count`, so the slot lies inside the block.
        unsafe { self.block.base().as_ptr().add(index * self.stride) }
    }

    fn read_link(&self, index: usize) -> usize {
        // SAFETY: the slot is in bounds and at least one word long; free
        // slots always hold an initialised link.
        unsafe { self.slot_ptr(index).cast::<usize>().read_unaligned() }
    }

    fn write_link(&mut self, index: usize, next: usize) {
        // SAFETY: the slot is in bounds, at least one word long, and free,
        // so no caller holds it.
        unsafe { self.slot_ptr(index).cast::<usize>().write_unaligned(next) }
    }

    /// Thread every slot onto the free list in slot order.
    fn rebuild_free_list(&mut self) {
        let count = self.config.element_count;
        for index in 0..count {
            let next = if index + 1 < count { index + 1 } else { END };
            self.write_link(index, next);
        }
        self.free_head = 0;
        self.free_count = count;
        self.slot_tags.fill(None);
    }

    /// Slot index for a pointer this pool handed out, or `None` if the
    /// pointer is outside the block or not on a slot boundary.
    fn slot_index(&self, addr: usize) -> Option<usize> {
        if !self.block.contains_addr(addr) {
            return None;
        }
        let offset = addr - self.block.base_addr();
        (offset % self.stride == 0).then_some(offset / self.stride)
    }

    #[cfg(test)]
    fn free_list_len(&self) -> usize {
        let mut len = 0;
        let mut cursor = self.free_head;
        while cursor != END {
            len += 1;
            cursor = self.read_link(cursor);
        }
        len
    }
}

impl Allocator for PoolAllocator {
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
        if alignment > self.config.alignment {
            self.sink.raise(
                MemoryError::contract(format!(
                    "alignment {alignment} exceeds pool alignment {}",
                    self.config.alignment
                )),
                "alignment <= pool_alignment",
            );
            return None;
        }
        if size > self.config.element_size {
            self.sink.raise(
                MemoryError::contract(format!(
                    "request of {size} bytes exceeds pool element size {}",
                    self.config.element_size
                )),
                "size <= element_size",
            );
            return None;
        }
        if self.free_head == END {
            self.sink.raise(
                MemoryError::ResourceExhausted {
                    requested: size,
                    available: Some(0),
                },
                "free_list != END",
            );
            return None;
        }

        let index = self.free_head;
        self.free_head = self.read_link(index);
        self.free_count -= 1;
        self.slot_tags[index] = Some(tag);
        self.stats.record_allocation(tag, self.config.element_size);
        NonNull::new(self.slot_ptr(index))
    }

    #[track_caller]
    unsafe fn free(&mut self, ptr: *mut u8) {
        if ptr.is_null() {
            return;
        }
        let addr = ptr as usize;
        let Some(index) = self.slot_index(addr) else {
            self.sink.raise(
                MemoryError::ForeignPointer { address: addr },
                "pool.owns(ptr)",
            );
            return;
        };
        let Some(tag) = self.slot_tags[index].take() else {
            self.sink.raise(
                MemoryError::contract(format!("double free of pool slot {index}")),
                "slot.is_allocated()",
            );
            return;
        };
        self.write_link(index, self.free_head);
        self.free_head = index;
        self.free_count += 1;
        self.stats.record_free(tag, self.config.element_size);
    }

    fn stats(&self) -> MemoryStats {
        self.stats.global()
    }

    fn tag_stats(&self, tag: MemoryTag) -> MemoryStats {
        self.stats.tag(tag)
    }

    /// Return every slot to the free list, in slot order.
    ///
    /// Outstanding allocations are counted as freed.
    #[track_caller]
    fn reset(&mut self) {
        self.rebuild_free_list();
        self.stats.fold_outstanding();
    }

    fn last_failure(&self) -> Option<&ReportedFailure> {
        self.sink.last()
    }
}

impl std::fmt::Debug for PoolAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolAllocator")
            .field("config", &self.config)
            .field("stride", &self.stride)
            .field("free_count", &self.free_count)
            .field("stats", &self.stats.global())
            .finish_non_exhaustive()
    }
}
