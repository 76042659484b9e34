//! edgemem: pluggable allocation strategies with tagged statistics and
//! leak detection.
//!
//! This is the top-level facade crate that re-exports the public API of
//! the edgemem sub-crates. Adding `edgemem` as a single dependency is
//! enough for most users.
//!
//! # Quick start
//!
//! ```rust
//! use edgemem::prelude::*;
//!
//! // A tracked general-purpose allocator.
//! let mut sys = SystemAllocator::new(SystemConfig::tracked());
//! let block = sys.allocate_tagged(256, MemoryTag::Physics, 32).unwrap();
//! assert_eq!(sys.tag_stats(MemoryTag::Physics).current_usage, 256);
//! unsafe { sys.free(block.as_ptr()) };
//! sys.shutdown().unwrap();
//!
//! // A per-frame arena, rewound in one step.
//! let mut frame = LinearAllocator::new(64 * 1024).unwrap();
//! frame.allocate_tagged(1024, MemoryTag::Temp, 16).unwrap();
//! frame.reset();
//! assert_eq!(frame.used(), 0);
//!
//! // A pool of fixed-size particles.
//! let mut particles = PoolAllocator::new(PoolConfig::new(48, 1024)).unwrap();
//! let p = particles.allocate_tagged(48, MemoryTag::Particles, 16).unwrap();
//! unsafe { particles.free(p.as_ptr()) };
//! assert_eq!(particles.free_count(), 1024);
//!
//! // Strategies whose backing block is counted by a tracked context.
//! let mut ctx = MemoryContext::with_config(SystemConfig::tracked());
//! let arena = ctx.create_linear(4096, MemoryTag::Temp).unwrap();
//! assert_eq!(ctx.stats().current_usage, 4096);
//! ctx.release_linear(arena).unwrap();
//!
//! // Typed values.
//! let v = allocate_value(ctx.system_mut(), MemoryTag::Ai, 42u64).unwrap();
//! unsafe { free_value(ctx.system_mut(), v.as_ptr()) };
//! ctx.shutdown().unwrap();
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `edgemem-core` | `Allocator` trait, tags, stats, errors, failure reporting |
//! | [`alloc`] | `edgemem-alloc` | System, linear and pool allocators, `MemoryContext`, `global` |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types and traits (`edgemem-core`).
///
/// Contains the [`types::Allocator`] contract, [`types::MemoryTag`],
/// [`types::MemoryStats`], the [`types::MemoryError`] taxonomy and the
/// [`types::FailureReporter`] seam.
pub use edgemem_core as types;

/// Allocation strategies (`edgemem-alloc`).
///
/// [`alloc::SystemAllocator`] for tracked general-purpose allocation,
/// [`alloc::LinearAllocator`] for bump/arena allocation,
/// [`alloc::PoolAllocator`] for fixed-size slabs,
/// [`alloc::allocate_value`] / [`alloc::free_value`] for typed values, and
/// [`alloc::MemoryContext`] / [`alloc::global`] for the default instance.
pub use edgemem_alloc as alloc;

/// Common imports for typical edgemem usage.
///
/// ```rust
/// use edgemem::prelude::*;
/// ```
pub mod prelude {
    // Contract and bookkeeping
    pub use edgemem_core::{Allocator, MemoryStats, MemoryTag};

    // Errors and reporting
    pub use edgemem_core::{
        DefaultReporter, Disposition, Failure, FailureReporter, MemoryError, ReportedFailure,
        Severity, SharedReporter, TrapPolicy,
    };

    // Alignment
    pub use edgemem_core::{CACHE_LINE_SIZE, DEFAULT_ALIGNMENT};

    // Strategies
    pub use edgemem_alloc::{
        allocate_value, free_value, LeakReport, LinearAllocator, MemoryContext, PoolAllocator,
        PoolConfig, SystemAllocator, SystemConfig,
    };
}
