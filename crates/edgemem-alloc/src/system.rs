//! General-purpose allocator over the platform aligned-allocation primitive.
//!
//! Untracked, [`SystemAllocator`] is a thin pass-through to
//! [`raw_alloc`]/[`raw_free`] that only counts outstanding blocks. Tracked,
//! every block carries an allocation header with a
//! guard sentinel, all live headers are linked into a tracking list, and
//! per-tag statistics are kept. Tracking is what makes corruption checks
//! and leak reports possible.

#![allow(unsafe_code)]

use std::panic::Location;
use std::ptr::NonNull;
use std::sync::atomic::{AtomicU64, Ordering};

use edgemem_core::align::is_valid_alignment;
use edgemem_core::{
    Allocator, Disposition, FailureSink, MemoryError, MemoryStats, MemoryTag, ReportedFailure,
    SharedReporter, TaggedStats,
};

use crate::config::SystemConfig;
use crate::leak::LeakReport;
use crate::platform::{raw_alloc, raw_free};
use crate::record::{AllocationInfo, AllocationRecord, TrackingList, GUARD_SENTINEL};

/// Source of [`SystemAllocator`] identities.
static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Tracked general-purpose allocator.
///
/// Not `Sync`: callers sharing one instance across threads must wrap it in
/// a lock.
///
/// Dropping a tracked allocator that still has live allocations prints a
/// leak report and raises a Fatal [`MemoryError::LeakOnShutdown`]; if the
/// reporter answers [`Disposition::Trap`] the process aborts. Use
/// [`shutdown`](Self::shutdown) to get the same check as a `Result`.
pub struct SystemAllocator {
    /// Process-unique identity, used to match borrowed backing blocks.
    id: u64,
    tracking: bool,
    stats: TaggedStats,
    list: TrackingList,
    /// Live blocks in either mode.
    outstanding: usize,
    sink: FailureSink,
    /// Set once teardown has been checked, so drop does not repeat it.
    finished: bool,
}

impl SystemAllocator {
    /// Allocator reporting through the default stderr/`tracing` reporter.
    pub fn new(config: SystemConfig) -> Self {
        Self::with_sink(config, FailureSink::default())
    }

    /// Allocator reporting through `reporter`.
    pub fn with_reporter(config: SystemConfig, reporter: SharedReporter) -> Self {
        Self::with_sink(config, FailureSink::new(reporter))
    }

    fn with_sink(config: SystemConfig, sink: FailureSink) -> Self {
        tracing::debug!(tracking = config.tracking_enabled, "system allocator created");
        Self {
            id: NEXT_ID.fetch_add(1, Ordering::Relaxed),
            tracking: config.tracking_enabled,
            stats: TaggedStats::new(),
            list: TrackingList::new(),
            outstanding: 0,
            sink,
            finished: false,
        }
    }

    pub(crate) fn id(&self) -> u64 {
        self.id
    }

    /// Report a failure detected outside this allocator's own calls.
    #[track_caller]
    pub(crate) fn raise(&mut self, error: MemoryError, condition: &'static str) {
        self.sink.raise(error, condition);
    }

    /// The reporter this allocator raises failures through.
    pub fn reporter(&self) -> &SharedReporter {
        self.sink.reporter()
    }

    /// Whether new allocations carry tracking headers.
    pub fn is_tracking_enabled(&self) -> bool {
        self.tracking
    }

    /// Switch tracking on or off.
    ///
    /// A block's layout depends on the mode it was allocated in, so the
    /// switch is refused with a ContractViolation while any block is
    /// outstanding. Setting the current mode again is a no-op.
    #[track_caller]
    pub fn set_tracking_enabled(&mut self, enabled: bool) {
        if enabled == self.tracking {
            return;
        }
        if self.outstanding != 0 {
            self.sink.raise(
                MemoryError::contract(format!(
                    "cannot change tracking mode with {} live allocation(s)",
                    self.outstanding
                )),
                "outstanding == 0",
            );
            return;
        }
        tracing::debug!(tracking = enabled, "system allocator tracking changed");
        self.tracking = enabled;
    }

    /// Number of blocks handed out and not yet freed, in either mode.
    pub fn outstanding(&self) -> usize {
        self.outstanding
    }

    /// Counters for the tag at `index`; zeroed when `index` is not a tag.
    pub fn tag_stats_by_index(&self, index: usize) -> MemoryStats {
        self.stats.tag_by_index(index)
    }

    /// Every live tracked allocation, oldest first.
    ///
    /// Empty when tracking is disabled.
    pub fn live_allocations(&self) -> impl Iterator<Item = AllocationInfo> + '_ {
        self.list.iter()
    }

    /// Build the current leak report, if tracking is on and anything is live.
    pub fn leak_report(&self) -> Option<LeakReport> {
        if !self.tracking || self.list.is_empty() {
            return None;
        }
        Some(LeakReport {
            entries: self.list.iter().collect(),
            by_tag: self.stats.leaking_tags().collect(),
        })
    }

    /// Print the current leak report to stderr and return it.
    ///
    /// Does nothing and returns `None` when tracking is off or nothing is
    /// live.
    pub fn report_leaks(&self) -> Option<LeakReport> {
        let report = self.leak_report()?;
        eprint!("{report}");
        tracing::warn!(
            live_allocations = report.len(),
            live_bytes = report.total_bytes(),
            "memory leaks detected"
        );
        Some(report)
    }

    /// Tear the allocator down, checking for leaks.
    ///
    /// With tracking on and allocations still live, prints the leak report,
    /// reports a Fatal [`MemoryError::LeakOnShutdown`] and returns it. The
    /// process is never aborted from here, whatever the reporter answers.
    /// Leaked blocks are not released.
    #[track_caller]
    pub fn shutdown(mut self) -> Result<(), MemoryError> {
        self.finished = true;
        match self.check_teardown() {
            Some((error, _)) => Err(error),
            None => Ok(()),
        }
    }

    #[track_caller]
    fn check_teardown(&mut self) -> Option<(MemoryError, Disposition)> {
        self.report_leaks()?;
        let global = self.stats.global();
        let error = MemoryError::LeakOnShutdown {
            live_allocations: global.outstanding(),
            live_bytes: global.current_usage,
        };
        let disposition = self
            .sink
            .raise(error.clone(), "allocation_count == free_count");
        Some((error, disposition))
    }

    #[track_caller]
    fn exhausted(&mut self, requested: usize) -> Option<NonNull<u8>> {
        self.sink.raise(
            MemoryError::ResourceExhausted {
                requested,
                available: None,
            },
            "platform allocation succeeded",
        );
        None
    }

    #[track_caller]
    fn allocate_tracked(
        &mut self,
        size: usize,
        tag: MemoryTag,
        alignment: usize,
    ) -> Option<NonNull<u8>> {
        let location = Location::caller();
        let Some(block_offset) = AllocationRecord::block_offset_for(alignment) else {
            return self.exhausted(size);
        };
        let Some(total) = size.checked_add(block_offset) else {
            return self.exhausted(size);
        };
        let Some(raw) = raw_alloc(total, AllocationRecord::block_alignment(alignment)) else {
            return self.exhausted(total);
        };

        // SAFETY: `raw` points to `total = block_offset + size` bytes, and
        // `block_offset >= AllocationRecord::SIZE`, so the header written at
        // `user - SIZE` lies inside the block. `raw` and `block_offset` are
        // both multiples of the header alignment, so the header is aligned.
        let record = unsafe {
            let user = raw.as_ptr().add(block_offset);
            let record = user.sub(AllocationRecord::SIZE).cast::<AllocationRecord>();
            record.write(AllocationRecord {
                size,
                alignment,
                block_offset,
                location,
                prev: None,
                next: None,
                tag,
                guard: GUARD_SENTINEL,
            });
            NonNull::new_unchecked(record)
        };
        // SAFETY: freshly initialised header, stays valid until `free`
        // unlinks it.
        unsafe { self.list.push_back(record) };

        self.stats.record_allocation(tag, size);
        self.outstanding += 1;
        Some(AllocationRecord::user_ptr(record))
    }

    /// # Safety
    ///
    /// `user` must be a live pointer from `allocate_tracked`, or at least be
    /// preceded by `AllocationRecord::SIZE` readable bytes.
    #[track_caller]
    unsafe fn free_tracked(&mut self, user: NonNull<u8>) {
        let record = AllocationRecord::from_user(user);
        // SAFETY: caller contract; only the guard is read before it is
        // validated.
        let guard = unsafe { AllocationRecord::read_guard(record) };
        if guard != GUARD_SENTINEL {
            self.sink.raise(
                MemoryError::Corruption {
                    address: user.as_ptr() as usize,
                    found: guard,
                },
                "guard == GUARD_SENTINEL",
            );
            return;
        }

        // SAFETY: the guard matched, so this is a live header in our list.
        let (size, tag, block_offset) = unsafe {
            let r = record.as_ref();
            (r.size, r.tag, r.block_offset)
        };
        // SAFETY: the header is a node of `self.list`; after unlinking and
        // retiring it nothing refers to the block, which came from
        // raw_alloc at `user - block_offset`.
        unsafe {
            self.list.unlink(record);
            AllocationRecord::retire(record);
            raw_free(NonNull::new_unchecked(user.as_ptr().sub(block_offset)));
        }

        self.stats.record_free(tag, size);
        self.outstanding -= 1;
    }
}

impl Allocator for SystemAllocator {
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
        if self.tracking {
            return self.allocate_tracked(size, tag, alignment);
        }
        match raw_alloc(size, alignment) {
            Some(ptr) => {
                self.outstanding += 1;
                Some(ptr)
            }
            None => self.exhausted(size),
        }
    }

    #[track_caller]
    unsafe fn free(&mut self, ptr: *mut u8) {
        let Some(user) = NonNull::new(ptr) else {
            return;
        };
        if self.tracking {
            // SAFETY: forwarded caller contract.
            unsafe { self.free_tracked(user) };
            return;
        }
        // SAFETY: untracked blocks are exactly what raw_alloc returned.
        unsafe { raw_free(user) };
        self.outstanding = self.outstanding.saturating_sub(1);
    }

    fn stats(&self) -> MemoryStats {
        self.stats.global()
    }

    fn tag_stats(&self, tag: MemoryTag) -> MemoryStats {
        self.stats.tag(tag)
    }

    /// Zero the statistics and forget the tracking list.
    ///
    /// Refused with a ContractViolation while any block is outstanding.
    #[track_caller]
    fn reset(&mut self) {
        if self.outstanding != 0 {
            self.sink.raise(
                MemoryError::contract(format!(
                    "reset with {} live allocation(s)",
                    self.outstanding
                )),
                "allocation_count == free_count",
            );
            return;
        }
        self.stats.clear();
        self.list.clear();
        self.sink.clear();
    }

    fn last_failure(&self) -> Option<&ReportedFailure> {
        self.sink.last()
    }
}

impl Default for SystemAllocator {
    fn default() -> Self {
        Self::new(SystemConfig::default())
    }
}

impl Drop for SystemAllocator {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        self.finished = true;
        if let Some((_, Disposition::Trap)) = self.check_teardown() {
            std::process::abort();
        }
        tracing::debug!(outstanding = self.outstanding, "system allocator dropped");
    }
}

impl std::fmt::Debug for SystemAllocator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SystemAllocator")
            .field("tracking", &self.tracking)
            .field("outstanding", &self.outstanding)
            .field("tracked_live", &self.list.len())
            .field("stats", &self.stats.global())
            .finish_non_exhaustive()
    }
}

// SAFETY: the allocator exclusively owns every block and header reachable
// from its tracking list; nothing is shared with other instances, so
// moving the whole allocator to another thread is sound. It is not Sync.
unsafe impl Send for SystemAllocator {}

#[cfg(test)]
mod tests {
    use super::*;
    use edgemem_core::align::is_aligned;
    use edgemem_test_utils::RecordingReporter;
    use std::sync::Arc;

    fn tracked() -> (SystemAllocator, Arc<RecordingReporter>) {
        let reporter = Arc::new(RecordingReporter::new());
        let sys = SystemAllocator::with_reporter(SystemConfig::tracked(), reporter.clone());
        (sys, reporter)
    }

    fn untracked() -> (SystemAllocator, Arc<RecordingReporter>) {
        let reporter = Arc::new(RecordingReporter::new());
        let sys = SystemAllocator::with_reporter(SystemConfig::untracked(), reporter.clone());
        (sys, reporter)
    }

    #[test]
    fn zero_size_is_silent_none() {
        let (mut sys, reporter) = tracked();
        assert!(sys.allocate(0, 16).is_none());
        assert_eq!(sys.stats(), MemoryStats::default());
        assert!(sys.last_failure().is_none());
        assert_eq!(reporter.count(), 0);
    }

    #[test]
    fn bad_alignment_is_contract_violation() {
        let (mut sys, reporter) = tracked();
        assert!(sys.allocate(64, 24).is_none());
        assert_eq!(reporter.count_kind("contract_violation"), 1);
        assert_eq!(sys.stats().allocation_count, 0);
        let last = sys.last_failure().unwrap();
        assert_eq!(last.failure.location.file(), file!());
    }

    #[test]
    fn tracked_allocation_updates_stats_and_list() {
        let (mut sys, _) = tracked();
        let a = sys.allocate_tagged(100, MemoryTag::Physics, 16).unwrap();
        let b = sys.allocate_tagged(40, MemoryTag::Ai, 64).unwrap();
        assert!(is_aligned(a.as_ptr() as usize, 16));
        assert!(is_aligned(b.as_ptr() as usize, 64));

        let s = sys.stats();
        assert_eq!(s.current_usage, 140);
        assert_eq!(s.allocation_count, 2);
        assert_eq!(sys.tag_stats(MemoryTag::Physics).current_usage, 100);
        assert_eq!(sys.live_allocations().count(), 2);

        let first = sys.live_allocations().next().unwrap();
        assert_eq!(first.address, a.as_ptr() as usize);
        assert_eq!(first.tag, MemoryTag::Physics);
        assert_eq!(first.location.file(), file!());

        unsafe {
            sys.free(a.as_ptr());
            sys.free(b.as_ptr());
        }
        let s = sys.stats();
        assert_eq!(s.current_usage, 0);
        assert_eq!(s.free_count, 2);
        assert_eq!(s.peak_usage, 140);
        assert_eq!(sys.live_allocations().count(), 0);
        sys.shutdown().unwrap();
    }

    #[test]
    fn free_middle_node_keeps_list_order() {
        let (mut sys, _) = tracked();
        let ptrs: Vec<_> = (1..=3)
            .map(|n| sys.allocate(n * 8, 16).unwrap())
            .collect();
        unsafe { sys.free(ptrs[1].as_ptr()) };
        let sizes: Vec<_> = sys.live_allocations().map(|i| i.size).collect();
        assert_eq!(sizes, vec![8, 24]);
        unsafe {
            sys.free(ptrs[0].as_ptr());
            sys.free(ptrs[2].as_ptr());
        }
        sys.shutdown().unwrap();
    }

    #[test]
    fn free_null_is_noop() {
        let (mut sys, reporter) = tracked();
        unsafe { sys.free(std::ptr::null_mut()) };
        assert_eq!(sys.stats().free_count, 0);
        assert_eq!(reporter.count(), 0);
    }

    #[test]
    fn corrupted_guard_aborts_free() {
        let (mut sys, reporter) = tracked();
        let p = sys.allocate(32, 16).unwrap();
        let guard_byte = unsafe { p.as_ptr().sub(1) };
        let saved = unsafe { guard_byte.read() };
        unsafe { guard_byte.write(!saved) };
        unsafe { sys.free(p.as_ptr()) };

        assert_eq!(reporter.count_kind("corruption"), 1);
        assert_eq!(sys.stats().free_count, 0);
        assert_eq!(sys.outstanding(), 1);
        assert!(matches!(
            sys.last_failure().unwrap().failure.error,
            MemoryError::Corruption { address, .. } if address == p.as_ptr() as usize
        ));

        // The block was kept, so repairing the guard makes it freeable.
        unsafe { guard_byte.write(saved) };
        unsafe { sys.free(p.as_ptr()) };
        assert_eq!(sys.stats().free_count, 1);
        sys.shutdown().unwrap();
    }

    #[test]
    fn reset_refused_with_live_allocations() {
        let (mut sys, reporter) = tracked();
        let p = sys.allocate(8, 8).unwrap();
        sys.reset();
        assert_eq!(reporter.count_kind("contract_violation"), 1);
        assert_eq!(sys.stats().allocation_count, 1);

        unsafe { sys.free(p.as_ptr()) };
        sys.reset();
        assert_eq!(sys.stats(), MemoryStats::default());
        assert!(sys.last_failure().is_none());
    }

    #[test]
    fn untracked_mode_counts_only_outstanding() {
        let (mut sys, _) = untracked();
        let p = sys.allocate_tagged(256, MemoryTag::Gui, 32).unwrap();
        assert!(is_aligned(p.as_ptr() as usize, 32));
        assert_eq!(sys.outstanding(), 1);
        assert_eq!(sys.stats(), MemoryStats::default());
        assert_eq!(sys.live_allocations().count(), 0);
        assert!(sys.report_leaks().is_none());
        unsafe { sys.free(p.as_ptr()) };
        assert_eq!(sys.outstanding(), 0);
    }

    #[test]
    fn tracking_toggle_refused_while_outstanding() {
        let (mut sys, reporter) = untracked();
        let p = sys.allocate(16, 16).unwrap();
        sys.set_tracking_enabled(true);
        assert!(!sys.is_tracking_enabled());
        assert_eq!(reporter.count_kind("contract_violation"), 1);

        unsafe { sys.free(p.as_ptr()) };
        sys.set_tracking_enabled(true);
        assert!(sys.is_tracking_enabled());
        let q = sys.allocate(16, 16).unwrap();
        assert_eq!(sys.stats().allocation_count, 1);
        unsafe { sys.free(q.as_ptr()) };
    }

    #[test]
    fn tag_stats_by_index_out_of_range_is_zeroed() {
        let (mut sys, _) = tracked();
        let p = sys.allocate_tagged(8, MemoryTag::Temp, 8).unwrap();
        assert_eq!(sys.tag_stats_by_index(MemoryTag::COUNT), MemoryStats::default());
        assert_eq!(sys.tag_stats_by_index(MemoryTag::Temp.index()).current_usage, 8);
        unsafe { sys.free(p.as_ptr()) };
    }

    #[test]
    fn leak_report_lists_live_blocks() {
        let (mut sys, _) = tracked();
        let a = sys.allocate_tagged(64, MemoryTag::Net, 16).unwrap();
        let b = sys.allocate_tagged(32, MemoryTag::Gui, 16).unwrap();
        unsafe { sys.free(b.as_ptr()) };

        let report = sys.report_leaks().unwrap();
        assert_eq!(report.len(), 1);
        assert_eq!(report.entries[0].address, a.as_ptr() as usize);
        assert_eq!(report.by_tag.len(), 1);
        assert_eq!(report.by_tag[&MemoryTag::Net].current_usage, 64);

        unsafe { sys.free(a.as_ptr()) };
        assert!(sys.report_leaks().is_none());
    }

    #[test]
    fn shutdown_with_leaks_is_fatal_error() {
        let (mut sys, reporter) = tracked();
        sys.allocate(48, 16).unwrap();
        let err = sys.shutdown().unwrap_err();
        assert_eq!(
            err,
            MemoryError::LeakOnShutdown {
                live_allocations: 1,
                live_bytes: 48
            }
        );
        assert_eq!(reporter.count_kind("leak_on_shutdown"), 1);
    }

    #[test]
    fn drop_with_leaks_continues_when_reporter_says_so() {
        let (mut sys, reporter) = tracked();
        sys.allocate(16, 16).unwrap();
        drop(sys);
        assert_eq!(reporter.count_kind("leak_on_shutdown"), 1);
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn outstanding_matches_tracking_list(
                ops in proptest::collection::vec((any::<bool>(), 1usize..512, 0u32..7), 1..80),
            ) {
                let (mut sys, _) = tracked();
                let mut live: Vec<NonNull<u8>> = Vec::new();
                for (alloc, size, align_shift) in ops {
                    if alloc || live.is_empty() {
                        let align = 1usize << align_shift;
                        let p = sys.allocate(size, align).unwrap();
                        prop_assert!(is_aligned(p.as_ptr() as usize, align));
                        live.push(p);
                    } else {
                        let idx = size % live.len();
                        let p = live.swap_remove(idx);
                        unsafe { sys.free(p.as_ptr()) };
                    }
                    let s = sys.stats();
                    prop_assert_eq!(s.outstanding(), sys.live_allocations().count());
                    prop_assert_eq!(s.outstanding(), live.len());
                }
                for p in live {
                    unsafe { sys.free(p.as_ptr()) };
                }
                prop_assert!(sys.shutdown().is_ok());
            }
        }
    }
}
