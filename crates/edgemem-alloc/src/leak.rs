//! Leak reports produced by the tracking system allocator.

use std::fmt;

use indexmap::IndexMap;

use edgemem_core::{MemoryStats, MemoryTag};

use crate::record::AllocationInfo;

/// Snapshot of every live tracked allocation at one point in time.
///
/// `entries` is in allocation order (oldest first). `by_tag` holds the
/// counters of every tag with `allocation_count > free_count`, in tag
/// order.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LeakReport {
    /// One entry per live allocation.
    pub entries: Vec<AllocationInfo>,
    /// Counters for each tag that still has live allocations.
    pub by_tag: IndexMap<MemoryTag, MemoryStats>,
}

impl LeakReport {
    /// Number of live allocations.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the report lists nothing.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Sum of the sizes of every live allocation.
    pub fn total_bytes(&self) -> usize {
        self.entries.iter().map(|e| e.size).sum()
    }
}

impl fmt::Display for LeakReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "=== Memory leaks detected: {} allocation(s), {} bytes ===",
            self.len(),
            self.total_bytes()
        )?;
        for entry in &self.entries {
            writeln!(
                f,
                "  {:#x}: {} bytes [{}] allocated at {}:{}",
                entry.address,
                entry.size,
                entry.tag,
                entry.location.file(),
                entry.location.line()
            )?;
        }
        if !self.by_tag.is_empty() {
            writeln!(f, "--- Leaks by tag ---")?;
            for (tag, stats) in &self.by_tag {
                writeln!(
                    f,
                    "  {tag}: {} live allocation(s), {} bytes",
                    stats.outstanding(),
                    stats.current_usage
                )?;
            }
        }
        Ok(())
    }
}
