//! Owned memory context around the default system allocator.

use std::ptr::NonNull;

use edgemem_core::{
    Allocator, MemoryError, MemoryStats, MemoryTag, ReportedFailure, SharedReporter,
};

use crate::config::{PoolConfig, SystemConfig};
use crate::leak::LeakReport;
use crate::linear::LinearAllocator;
use crate::pool::PoolAllocator;
use crate::system::SystemAllocator;
use crate::typed;

/// Owner of one default [`SystemAllocator`] with an initialize/shutdown
/// lifecycle.
///
/// The allocator is created on [`initialize`](Self::initialize) or lazily
/// by the first allocation-side call, and torn down by
/// [`shutdown`](Self::shutdown). Read-only queries on an uninitialised
/// context return zeroed values instead of creating it.
///
/// ```
/// use edgemem_alloc::MemoryContext;
/// use edgemem_core::MemoryTag;
///
/// let mut ctx = MemoryContext::new();
/// let p = ctx.allocate_tagged(64, MemoryTag::Gui, 16).unwrap();
/// unsafe { ctx.free(p.as_ptr()) };
/// ctx.shutdown().unwrap();
/// ```
#[derive(Default)]
pub struct MemoryContext {
    config: SystemConfig,
    reporter: Option<SharedReporter>,
    system: Option<SystemAllocator>,
}

impl MemoryContext {
    /// Uninitialised context using the default [`SystemConfig`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Uninitialised context that will build its allocator from `config`.
    pub fn with_config(config: SystemConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Uninitialised context whose allocator reports through `reporter`.
    pub fn with_reporter(config: SystemConfig, reporter: SharedReporter) -> Self {
        Self {
            config,
            reporter: Some(reporter),
            system: None,
        }
    }

    /// Create the default allocator. Does nothing if it already exists.
    pub fn initialize(&mut self) {
        self.system_mut();
    }

    /// Whether the default allocator currently exists.
    pub fn is_initialized(&self) -> bool {
        self.system.is_some()
    }

    /// Tear down the default allocator.
    ///
    /// Returns [`MemoryError::LeakOnShutdown`] if it was tracking and still
    /// had live allocations. The context is uninitialised afterwards either
    /// way and may be initialised again. Shutting down an uninitialised
    /// context is a no-op.
    #[track_caller]
    pub fn shutdown(&mut self) -> Result<(), MemoryError> {
        match self.system.take() {
            Some(system) => {
                tracing::debug!("memory context shut down");
                system.shutdown()
            }
            None => Ok(()),
        }
    }

    /// The default allocator, if initialised.
    pub fn system(&self) -> Option<&SystemAllocator> {
        self.system.as_ref()
    }

    /// The default allocator, initialising it if needed.
    pub fn system_mut(&mut self) -> &mut SystemAllocator {
        let config = self.config;
        let reporter = self.reporter.clone();
        self.system.get_or_insert_with(|| {
            tracing::debug!(tracking = config.tracking_enabled, "memory context initialised");
            match reporter {
                Some(reporter) => SystemAllocator::with_reporter(config, reporter),
                None => SystemAllocator::new(config),
            }
        })
    }

    /// Allocate untagged memory from the default allocator.
    #[track_caller]
    pub fn allocate(&mut self, size: usize, alignment: usize) -> Option<NonNull<u8>> {
        self.system_mut().allocate(size, alignment)
    }

    /// Allocate tagged memory from the default allocator.
    #[track_caller]
    pub fn allocate_tagged(
        &mut self,
        size: usize,
        tag: MemoryTag,
        alignment: usize,
    ) -> Option<NonNull<u8>> {
        self.system_mut().allocate_tagged(size, tag, alignment)
    }

    /// Return memory to the default allocator.
    ///
    /// # Safety
    ///
    /// Same contract as [`Allocator::free`] on the default allocator.
    #[allow(unsafe_code)]
    #[track_caller]
    pub unsafe fn free(&mut self, ptr: *mut u8) {
        // SAFETY: forwarded caller contract.
        unsafe { self.system_mut().free(ptr) }
    }

    /// Allocate a `T` from the default allocator and move `value` in.
    ///
    /// See [`typed::allocate_value`].
    #[track_caller]
    pub fn allocate_value<T>(&mut self, tag: MemoryTag, value: T) -> Option<NonNull<T>> {
        typed::allocate_value(self.system_mut(), tag, value)
    }

    /// Drop a value from [`allocate_value`](Self::allocate_value) and free
    /// its block.
    ///
    /// # Safety
    ///
    /// Same contract as [`typed::free_value`] on the default allocator.
    #[allow(unsafe_code)]
    #[track_caller]
    pub unsafe fn free_value<T>(&mut self, ptr: *mut T) {
        // SAFETY: forwarded caller contract.
        unsafe { typed::free_value(self.system_mut(), ptr) }
    }

    /// Arena whose block is a `tag`-ged allocation of the default
    /// allocator. Hand it back with [`release_linear`](Self::release_linear).
    #[track_caller]
    pub fn create_linear(
        &mut self,
        capacity: usize,
        tag: MemoryTag,
    ) -> Result<LinearAllocator, MemoryError> {
        LinearAllocator::new_in(self.system_mut(), capacity, tag)
    }

    /// Return an arena's block to the default allocator.
    #[track_caller]
    pub fn release_linear(&mut self, arena: LinearAllocator) -> Result<(), MemoryError> {
        arena.release_into(self.system_mut())
    }

    /// Pool whose block is a `tag`-ged allocation of the default allocator.
    /// Hand it back with [`release_pool`](Self::release_pool).
    #[track_caller]
    pub fn create_pool(
        &mut self,
        config: PoolConfig,
        tag: MemoryTag,
    ) -> Result<PoolAllocator, MemoryError> {
        PoolAllocator::new_in(self.system_mut(), config, tag)
    }

    /// Return a pool's block to the default allocator.
    #[track_caller]
    pub fn release_pool(&mut self, pool: PoolAllocator) -> Result<(), MemoryError> {
        pool.release_into(self.system_mut())
    }

    /// Switch tracking on the default allocator.
    ///
    /// Refused with a ContractViolation while allocations are outstanding.
    #[track_caller]
    pub fn enable_tracking(&mut self, enabled: bool) {
        self.system_mut().set_tracking_enabled(enabled);
    }

    /// Print and return the default allocator's leak report.
    pub fn report_leaks(&self) -> Option<LeakReport> {
        self.system.as_ref()?.report_leaks()
    }

    /// Aggregate statistics; zeroed when uninitialised.
    pub fn stats(&self) -> MemoryStats {
        self.system.as_ref().map(Allocator::stats).unwrap_or_default()
    }

    /// Statistics for one tag; zeroed when uninitialised.
    pub fn tag_stats(&self, tag: MemoryTag) -> MemoryStats {
        self.system
            .as_ref()
            .map(|s| s.tag_stats(tag))
            .unwrap_or_default()
    }

    /// The default allocator's most recent failure.
    pub fn last_failure(&self) -> Option<&ReportedFailure> {
        self.system.as_ref()?.last_failure()
    }
}

impl std::fmt::Debug for MemoryContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryContext")
            .field("config", &self.config)
            .field("custom_reporter", &self.reporter.is_some())
            .field("system", &self.system)
            .finish()
    }
}
