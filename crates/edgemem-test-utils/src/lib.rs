//! Test utilities and mock types for edgemem development.
//!
//! Provides a [`RecordingReporter`] that captures every failure an
//! allocator reports, and seeded allocate/free workloads
//! ([`churn_plan`], [`run_churn`]) shared by tests and benchmarks.

#![deny(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

use std::ptr::NonNull;
use std::sync::{Mutex, MutexGuard, PoisonError};

use edgemem_core::{Allocator, Disposition, Failure, FailureReporter, MemoryTag};
use rand_chacha::rand_core::{RngCore, SeedableRng};
use rand_chacha::ChaCha8Rng;

/// Mock [`FailureReporter`] that records every failure.
///
/// Answers every report with a fixed [`Disposition`]: `Continue` unless
/// built with [`trapping`](RecordingReporter::trapping). Share it with the
/// allocator under test through an `Arc` and inspect it afterwards.
pub struct RecordingReporter {
    failures: Mutex<Vec<Failure>>,
    disposition: Disposition,
}

impl RecordingReporter {
    pub fn new() -> Self {
        Self::answering(Disposition::Continue)
    }

    /// Reporter that asks for a trap on every failure.
    pub fn trapping() -> Self {
        Self::answering(Disposition::Trap)
    }

    pub fn answering(disposition: Disposition) -> Self {
        Self {
            failures: Mutex::new(Vec::new()),
            disposition,
        }
    }

    fn lock(&self) -> MutexGuard<'_, Vec<Failure>> {
        self.failures.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every failure reported so far, oldest first.
    pub fn failures(&self) -> Vec<Failure> {
        self.lock().clone()
    }

    /// Number of failures reported so far.
    pub fn count(&self) -> usize {
        self.lock().len()
    }

    /// Number of failures whose [`kind`](edgemem_core::MemoryError::kind)
    /// is `kind`.
    pub fn count_kind(&self, kind: &str) -> usize {
        self.lock().iter().filter(|f| f.error.kind() == kind).count()
    }

    /// The most recent failure.
    pub fn last(&self) -> Option<Failure> {
        self.lock().last().cloned()
    }

    pub fn clear(&self) {
        self.lock().clear();
    }
}

impl Default for RecordingReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl FailureReporter for RecordingReporter {
    fn report(&self, failure: &Failure) -> Disposition {
        self.lock().push(failure.clone());
        self.disposition
    }
}

/// One step of a churn workload.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ChurnOp {
    /// Allocate `size` bytes at `alignment`, tagged `tag`.
    Allocate {
        size: usize,
        alignment: usize,
        tag: MemoryTag,
    },
    /// Free the live block at index `pick % live.len()`, if any.
    Free { pick: usize },
}

/// Deterministic allocate/free workload.
///
/// Roughly 60% of steps allocate. Sizes fall in `1..=max_size` and
/// alignments in `1..=max_alignment` (powers of two). The same seed always
/// yields the same plan.
pub fn churn_plan(seed: u64, len: usize, max_size: usize, max_alignment: usize) -> Vec<ChurnOp> {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let max_size = max_size.max(1) as u64;
    let align_steps = max_alignment.max(1).trailing_zeros() as u64 + 1;
    (0..len)
        .map(|_| {
            if rng.next_u32() % 10 < 6 {
                let size = (rng.next_u64() % max_size) as usize + 1;
                let alignment = 1usize << (rng.next_u64() % align_steps);
                let tag_index = (rng.next_u64() % MemoryTag::COUNT as u64) as usize;
                ChurnOp::Allocate {
                    size,
                    alignment,
                    tag: MemoryTag::from_index(tag_index).unwrap_or_default(),
                }
            } else {
                ChurnOp::Free {
                    pick: rng.next_u64() as usize,
                }
            }
        })
        .collect()
}

/// Replay `plan` against `allocator` and return the blocks still live.
///
/// Allocations that fail are skipped. The caller owns the returned blocks
/// and must free them (or reset the allocator).
#[allow(unsafe_code)]
pub fn run_churn<A: Allocator>(allocator: &mut A, plan: &[ChurnOp]) -> Vec<NonNull<u8>> {
    let mut live = Vec::new();
    for op in plan {
        match *op {
            ChurnOp::Allocate {
                size,
                alignment,
                tag,
            } => {
                if let Some(ptr) = allocator.allocate_tagged(size, tag, alignment) {
                    live.push(ptr);
                }
            }
            ChurnOp::Free { pick } => {
                if live.is_empty() {
                    continue;
                }
                let ptr = live.swap_remove(pick % live.len());
                // SAFETY: `ptr` came from this allocator and is removed from
                // `live`, so it is freed exactly once.
                unsafe { allocator.free(ptr.as_ptr()) };
            }
        }
    }
    live
}
