//! Benchmark profiles for the edgemem allocators.
//!
//! - [`reference_plan`]: mixed-size, mixed-alignment churn typical of a
//!   frame's worth of general-purpose allocation
//! - [`small_object_plan`]: fixed 64-byte churn sized for a pool
//! - [`frame_arena`] / [`particle_pool`]: pre-sized linear and pool allocators

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use edgemem_alloc::{LinearAllocator, PoolAllocator, PoolConfig};
use edgemem_core::MemoryError;
use edgemem_test_utils::{churn_plan, ChurnOp};

/// Steps in each generated plan.
pub const PLAN_LEN: usize = 10_000;

/// Bytes in the benchmark frame arena.
pub const FRAME_ARENA_BYTES: usize = 4 * 1024 * 1024;

/// Slots in the benchmark particle pool.
pub const PARTICLE_SLOTS: usize = 4096;

/// Mixed workload: sizes up to 4 KiB, alignments up to 256.
pub fn reference_plan(seed: u64) -> Vec<ChurnOp> {
    churn_plan(seed, PLAN_LEN, 4096, 256)
}

/// Small-object workload: sizes up to 64 bytes, alignments up to 16.
pub fn small_object_plan(seed: u64) -> Vec<ChurnOp> {
    churn_plan(seed, PLAN_LEN, 64, 16)
}

/// A [`FRAME_ARENA_BYTES`] linear allocator.
pub fn frame_arena() -> Result<LinearAllocator, MemoryError> {
    LinearAllocator::new(FRAME_ARENA_BYTES)
}

/// A pool of [`PARTICLE_SLOTS`] 64-byte, 16-aligned slots.
pub fn particle_pool() -> Result<PoolAllocator, MemoryError> {
    PoolAllocator::new(PoolConfig::new(64, PARTICLE_SLOTS).with_alignment(16))
}
