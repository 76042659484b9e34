//! Allocation strategies for edgemem.
//!
//! Three allocators implement [`Allocator`](edgemem_core::Allocator). The
//! system allocator takes every block from the platform's aligned
//! allocation primitive; the linear and pool allocators work over one
//! backing block each, taken either from the platform or from a
//! [`SystemAllocator`] so that it shows up in that allocator's statistics
//! and leak report. [`allocate_value`] and [`free_value`] add typed
//! construct/destroy over any of them. This is the only crate in the
//! workspace that contains `unsafe` code; it is confined to the modules
//! that touch raw memory.
//!
//! # Architecture
//!
//! ```text
//! MemoryContext / global (default instance, lifecycle)
//! └── SystemAllocator (one platform block per allocation)
//!     └── AllocationRecord header + guard, linked in a TrackingList
//! LinearAllocator (bump cursor over one backing block)
//! PoolAllocator (index free list threaded through one backing block)
//! └── Backing: an owned AlignedBlock, or a tagged SystemAllocator block
//! platform::raw_alloc / raw_free (posix_memalign or _aligned_malloc)
//! ```
//!
//! # Failures
//!
//! Allocation paths never panic. A failed call reports through the
//! allocator's [`FailureReporter`](edgemem_core::FailureReporter), returns
//! `None` (or does nothing, for `free`), and leaves the reported failure
//! readable via [`last_failure`](edgemem_core::Allocator::last_failure).

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(unsafe_code)]

mod backing;
pub mod config;
pub mod context;
pub mod global;
pub mod leak;
pub mod linear;
pub mod platform;
pub mod pool;
mod record;
pub mod system;
pub mod typed;

pub use config::{PoolConfig, SystemConfig};
pub use context::MemoryContext;
pub use leak::LeakReport;
pub use linear::LinearAllocator;
pub use platform::AlignedBlock;
pub use pool::PoolAllocator;
pub use record::{AllocationInfo, GUARD_SENTINEL, GUARD_SIZE};
pub use system::SystemAllocator;
pub use typed::{allocate_value, free_value};
