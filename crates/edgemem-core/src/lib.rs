//! Core types and traits for the edgemem allocators.
//!
//! This is the leaf crate with zero internal dependencies. It defines the
//! pieces every allocation strategy shares: the [`Allocator`] contract,
//! memory tags and statistics, the error taxonomy, failure reporting, and
//! alignment arithmetic.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

pub mod align;
pub mod error;
pub mod failure;
pub mod stats;
pub mod tag;
pub mod traits;

pub use align::{
    align_ptr, align_up, is_aligned, is_valid_alignment, CACHE_LINE_SIZE, DEFAULT_ALIGNMENT,
};
pub use error::{MemoryError, Severity};
pub use failure::{
    DefaultReporter, Disposition, Failure, FailureReporter, FailureSink, ReportedFailure,
    SharedReporter, TrapPolicy,
};
pub use stats::{MemoryStats, TaggedStats};
pub use tag::MemoryTag;
pub use traits::Allocator;
