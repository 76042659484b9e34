//! Allocation counters, global and per tag.
//!
//! [`MemoryStats`] is a plain snapshot of six counters. [`TaggedStats`]
//! keeps one aggregate row plus one row per [`MemoryTag`] and is the
//! bookkeeping every allocator in the workspace embeds.

use crate::tag::MemoryTag;

/// Counters describing an allocator's activity.
///
/// All sizes are in bytes. `current_usage` is the live byte count and
/// `peak_usage` its running maximum; `allocation_count - free_count` is the
/// number of live allocations.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct MemoryStats {
    /// Bytes handed out over the allocator's lifetime.
    pub total_allocated: usize,
    /// Bytes returned over the allocator's lifetime.
    pub total_freed: usize,
    /// Bytes currently live.
    pub current_usage: usize,
    /// Highest value `current_usage` has reached.
    pub peak_usage: usize,
    /// Successful allocations.
    pub allocation_count: usize,
    /// Successful frees (including those folded in by a reset).
    pub free_count: usize,
}

impl MemoryStats {
    /// Number of allocations not yet freed.
    pub fn outstanding(&self) -> usize {
        self.allocation_count.saturating_sub(self.free_count)
    }

    /// Whether any allocation is still live.
    pub fn has_leaks(&self) -> bool {
        self.allocation_count > self.free_count
    }

    /// Account one allocation of `size` bytes.
    pub fn record_allocation(&mut self, size: usize) {
        self.total_allocated += size;
        self.current_usage += size;
        self.peak_usage = self.peak_usage.max(self.current_usage);
        self.allocation_count += 1;
    }

    /// Account one free of `size` bytes.
    pub fn record_free(&mut self, size: usize) {
        self.total_freed += size;
        self.current_usage = self.current_usage.saturating_sub(size);
        self.free_count += 1;
    }

    /// Treat everything outstanding as freed in one step.
    ///
    /// Used by allocators whose `reset` reclaims all memory at once, so
    /// `total_allocated == total_freed` and `allocation_count ==
    /// free_count` hold again afterwards. `peak_usage` is kept.
    pub fn fold_outstanding(&mut self) {
        self.total_freed += self.current_usage;
        self.current_usage = 0;
        self.free_count = self.allocation_count;
    }
}

/// Aggregate plus per-tag [`MemoryStats`].
///
/// The per-tag table has exactly [`MemoryTag::COUNT`] rows, `NoTag`
/// included.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TaggedStats {
    global: MemoryStats,
    per_tag: [MemoryStats; MemoryTag::COUNT],
}

impl TaggedStats {
    /// Zeroed statistics.
    pub fn new() -> Self {
        Self::default()
    }

    /// Aggregate counters across all tags.
    pub fn global(&self) -> MemoryStats {
        self.global
    }

    /// Counters for one tag.
    pub fn tag(&self, tag: MemoryTag) -> MemoryStats {
        self.per_tag[tag.index()]
    }

    /// Counters for the tag at `index`, or zeroed counters when `index` is
    /// past the end of the table.
    pub fn tag_by_index(&self, index: usize) -> MemoryStats {
        self.per_tag.get(index).copied().unwrap_or_default()
    }

    /// Account an allocation against the aggregate and `tag`.
    pub fn record_allocation(&mut self, tag: MemoryTag, size: usize) {
        self.global.record_allocation(size);
        self.per_tag[tag.index()].record_allocation(size);
    }

    /// Account a free against the aggregate and `tag`.
    pub fn record_free(&mut self, tag: MemoryTag, size: usize) {
        self.global.record_free(size);
        self.per_tag[tag.index()].record_free(size);
    }

    /// Fold every outstanding allocation into the freed counters.
    pub fn fold_outstanding(&mut self) {
        self.global.fold_outstanding();
        for row in &mut self.per_tag {
            row.fold_outstanding();
        }
    }

    /// Tags that still have live allocations, with their counters.
    pub fn leaking_tags(&self) -> impl Iterator<Item = (MemoryTag, MemoryStats)> + '_ {
        MemoryTag::ALL
            .iter()
            .zip(self.per_tag.iter())
            .filter(|(_, s)| s.has_leaks())
            .map(|(&t, &s)| (t, s))
    }

    /// Zero every counter.
    pub fn clear(&mut self) {
        *self = Self::default();
    }
}
