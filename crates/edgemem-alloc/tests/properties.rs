//! Cross-strategy behaviour every allocator must share.

use std::ptr::NonNull;
use std::sync::Arc;

use edgemem_alloc::{
    LinearAllocator, PoolAllocator, PoolConfig, SystemAllocator, SystemConfig, GUARD_SIZE,
};
use edgemem_core::align::is_aligned;
use edgemem_core::{Allocator, MemoryError, MemoryStats, MemoryTag};
use edgemem_test_utils::RecordingReporter;

fn strategies(reporter: &Arc<RecordingReporter>) -> Vec<(&'static str, Box<dyn Allocator>)> {
    vec![
        (
            "system/tracked",
            Box::new(SystemAllocator::with_reporter(
                SystemConfig::tracked(),
                reporter.clone(),
            )),
        ),
        (
            "system/untracked",
            Box::new(SystemAllocator::with_reporter(
                SystemConfig::untracked(),
                reporter.clone(),
            )),
        ),
        (
            "linear",
            Box::new(LinearAllocator::with_reporter(4096, reporter.clone()).unwrap()),
        ),
        (
            "pool",
            Box::new(
                PoolAllocator::with_reporter(
                    PoolConfig::new(64, 16).with_alignment(64),
                    reporter.clone(),
                )
                .unwrap(),
            ),
        ),
    ]
}

#[test]
fn zero_size_is_none_everywhere() {
    let reporter = Arc::new(RecordingReporter::new());
    for (name, mut alloc) in strategies(&reporter) {
        let before = alloc.stats();
        assert!(alloc.allocate(0, 16).is_none(), "{name}");
        assert!(alloc.allocate_tagged(0, MemoryTag::Ai, 8).is_none(), "{name}");
        assert_eq!(alloc.stats(), before, "{name}");
        assert!(alloc.last_failure().is_none(), "{name}");
    }
    assert_eq!(reporter.count(), 0);
}

#[test]
fn allocations_honour_alignment_everywhere() {
    let reporter = Arc::new(RecordingReporter::new());
    for (name, mut alloc) in strategies(&reporter) {
        let mut live: Vec<NonNull<u8>> = Vec::new();
        for align in [1usize, 2, 4, 8, 16, 32, 64] {
            let p = alloc
                .allocate(24, align)
                .unwrap_or_else(|| panic!("{name}: allocation at {align} failed"));
            assert!(is_aligned(p.as_ptr() as usize, align), "{name} @ {align}");
            live.push(p);
        }
        for p in live {
            unsafe { alloc.free(p.as_ptr()) };
        }
        alloc.reset();
    }
    assert_eq!(reporter.count(), 0);
}

#[test]
fn non_power_of_two_alignment_is_rejected_everywhere() {
    let reporter = Arc::new(RecordingReporter::new());
    for (name, mut alloc) in strategies(&reporter) {
        assert!(alloc.allocate(8, 12).is_none(), "{name}");
        assert!(
            matches!(
                alloc.last_failure().map(|f| &f.failure.error),
                Some(MemoryError::ContractViolation { .. })
            ),
            "{name}"
        );
    }
}

#[test]
fn free_null_is_noop_everywhere() {
    let reporter = Arc::new(RecordingReporter::new());
    for (name, mut alloc) in strategies(&reporter) {
        unsafe { alloc.free(std::ptr::null_mut()) };
        assert_eq!(alloc.stats(), MemoryStats::default(), "{name}");
    }
    assert_eq!(reporter.count(), 0);
}

#[test]
fn guard_corruption_is_detected_and_free_aborted() {
    let reporter = Arc::new(RecordingReporter::new());
    let mut sys = SystemAllocator::with_reporter(SystemConfig::tracked(), reporter.clone());
    let p = sys.allocate_tagged(64, MemoryTag::Physics, 16).unwrap();

    let guard = unsafe { p.as_ptr().sub(GUARD_SIZE) };
    let mut saved = [0u8; GUARD_SIZE];
    unsafe {
        std::ptr::copy_nonoverlapping(guard, saved.as_mut_ptr(), GUARD_SIZE);
        std::ptr::write_bytes(guard, 0x5A, GUARD_SIZE);
        sys.free(p.as_ptr());
    }

    assert_eq!(reporter.count_kind("corruption"), 1);
    assert_eq!(sys.stats().free_count, 0);
    assert_eq!(sys.tag_stats(MemoryTag::Physics).current_usage, 64);
    assert_eq!(
        reporter.last().unwrap().error,
        MemoryError::Corruption {
            address: p.as_ptr() as usize,
            found: 0x5A5A_5A5A_5A5A_5A5A
        }
    );

    unsafe {
        std::ptr::copy_nonoverlapping(saved.as_ptr(), guard, GUARD_SIZE);
        sys.free(p.as_ptr());
    }
    assert_eq!(sys.stats().free_count, 1);
    sys.shutdown().unwrap();
}

#[test]
fn linear_exhaustion_and_reset() {
    let reporter = Arc::new(RecordingReporter::new());
    let mut arena = LinearAllocator::with_reporter(1024, reporter.clone()).unwrap();
    let first = arena.allocate(600, 16).unwrap();
    assert!(arena.allocate(500, 16).is_none());
    assert_eq!(reporter.count_kind("resource_exhausted"), 1);

    arena.reset();
    let again = arena.allocate(500, 16).unwrap();
    assert_eq!(again, first);
    assert_eq!(again.as_ptr() as usize % 64, 0);
}

#[test]
fn pool_scenario() {
    let reporter = Arc::new(RecordingReporter::new());
    let mut pool =
        PoolAllocator::with_reporter(PoolConfig::new(32, 4).with_alignment(16), reporter.clone())
            .unwrap();

    let ptrs: Vec<_> = (0..4).map(|_| pool.allocate(32, 16).unwrap()).collect();
    let mut addrs: Vec<usize> = ptrs.iter().map(|p| p.as_ptr() as usize).collect();
    addrs.sort_unstable();
    for pair in addrs.windows(2) {
        assert!(pair[1] - pair[0] >= 32, "slots overlap");
    }
    for addr in &addrs {
        assert!(is_aligned(*addr, 16));
    }
    assert!(pool.allocate(32, 16).is_none());

    unsafe { pool.free(ptrs[1].as_ptr()) };
    assert_eq!(pool.allocate(32, 16).unwrap(), ptrs[1]);

    for p in &ptrs {
        unsafe { pool.free(p.as_ptr()) };
    }
    pool.reset();
    assert_eq!(pool.stats().current_usage, 0);
    assert_eq!(pool.free_count(), 4);
}

#[test]
fn tag_stats_by_index_out_of_range_is_zeroed() {
    let reporter = Arc::new(RecordingReporter::new());
    let mut sys = SystemAllocator::with_reporter(SystemConfig::tracked(), reporter.clone());
    let p = sys.allocate_tagged(8, MemoryTag::Debug, 8).unwrap();
    assert_eq!(sys.tag_stats_by_index(MemoryTag::COUNT), MemoryStats::default());
    assert_eq!(sys.tag_stats_by_index(1_000_000), MemoryStats::default());

    let mut arena = LinearAllocator::with_reporter(64, reporter.clone()).unwrap();
    arena.allocate_tagged(8, MemoryTag::Debug, 8).unwrap();
    assert_eq!(arena.tag_stats_by_index(MemoryTag::COUNT + 3), MemoryStats::default());

    let pool = PoolAllocator::with_reporter(PoolConfig::new(8, 2), reporter).unwrap();
    assert_eq!(pool.tag_stats_by_index(usize::MAX), MemoryStats::default());

    unsafe { sys.free(p.as_ptr()) };
}
