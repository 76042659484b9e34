//! Process-wide default memory context.
//!
//! A thin wrapper around one [`MemoryContext`] behind a `Mutex`. Unlike an
//! owned context it must be set up with [`initialize`] before use: calls
//! made before that, or after [`shutdown`], report a ContractViolation and
//! return `None`. Those reports go to the reporter installed with
//! [`set_uninitialized_reporter`], or to the default reporter if there is
//! none. Statistics queries on an uninitialised context quietly return
//! zeroed counters.
//!
//! ```
//! use edgemem_alloc::global;
//!
//! global::initialize();
//! let p = global::allocate(128, 16).unwrap();
//! unsafe { global::free(p.as_ptr()) };
//! global::shutdown().unwrap();
//! ```

use std::ptr::NonNull;
use std::sync::{Mutex, MutexGuard, PoisonError};

use edgemem_core::{FailureSink, MemoryError, MemoryStats, MemoryTag, SharedReporter};

use crate::config::SystemConfig;
use crate::context::MemoryContext;
use crate::leak::LeakReport;

static CONTEXT: Mutex<Option<MemoryContext>> = Mutex::new(None);

/// Receives reports for calls made while no context exists.
static UNINITIALIZED_REPORTER: Mutex<Option<SharedReporter>> = Mutex::new(None);

fn lock() -> MutexGuard<'static, Option<MemoryContext>> {
    // No operation leaves the context partially updated, so poison is ignored.
    CONTEXT.lock().unwrap_or_else(PoisonError::into_inner)
}

#[track_caller]
fn not_initialized(operation: &'static str) {
    let reporter = UNINITIALIZED_REPORTER
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .clone();
    let mut sink = reporter.map(FailureSink::new).unwrap_or_default();
    sink.raise(
        MemoryError::contract(format!("global::{operation} called before global::initialize")),
        "global::is_initialized()",
    );
}

/// Route reports for calls made while the global context does not exist.
///
/// `None` restores the default reporter. Independent of the reporter given
/// to [`initialize_with`], which only sees calls on a live context.
pub fn set_uninitialized_reporter(reporter: Option<SharedReporter>) {
    *UNINITIALIZED_REPORTER
        .lock()
        .unwrap_or_else(PoisonError::into_inner) = reporter;
}

/// Create the global context with the default configuration and reporter.
///
/// Idempotent.
pub fn initialize() {
    initialize_with(SystemConfig::default(), None);
}

/// Create the global context from `config`, optionally with a custom
/// reporter. Does nothing if the context already exists.
pub fn initialize_with(config: SystemConfig, reporter: Option<SharedReporter>) {
    let mut guard = lock();
    if guard.is_some() {
        return;
    }
    let mut ctx = match reporter {
        Some(reporter) => MemoryContext::with_reporter(config, reporter),
        None => MemoryContext::with_config(config),
    };
    ctx.initialize();
    *guard = Some(ctx);
}

/// Whether [`initialize`] has run and [`shutdown`] has not.
pub fn is_initialized() -> bool {
    lock().is_some()
}

/// Tear the global context down.
///
/// Returns [`MemoryError::LeakOnShutdown`] if tracked allocations were
/// still live. No-op if not initialised.
#[track_caller]
pub fn shutdown() -> Result<(), MemoryError> {
    let ctx = lock().take();
    match ctx {
        Some(mut ctx) => ctx.shutdown(),
        None => Ok(()),
    }
}

/// Allocate untagged memory from the global context.
#[track_caller]
pub fn allocate(size: usize, alignment: usize) -> Option<NonNull<u8>> {
    allocate_tagged(size, MemoryTag::NoTag, alignment)
}

/// Allocate tagged memory from the global context.
#[track_caller]
pub fn allocate_tagged(size: usize, tag: MemoryTag, alignment: usize) -> Option<NonNull<u8>> {
    let mut guard = lock();
    match guard.as_mut() {
        Some(ctx) => ctx.allocate_tagged(size, tag, alignment),
        None => {
            not_initialized("allocate");
            None
        }
    }
}

/// Return memory to the global context.
///
/// # Safety
///
/// `ptr` must be null or a live pointer obtained from this module's
/// `allocate`/`allocate_tagged` since the last [`initialize`].
#[allow(unsafe_code)]
#[track_caller]
pub unsafe fn free(ptr: *mut u8) {
    let mut guard = lock();
    match guard.as_mut() {
        // SAFETY: forwarded caller contract.
        Some(ctx) => unsafe { ctx.free(ptr) },
        None if ptr.is_null() => {}
        None => not_initialized("free"),
    }
}

/// Allocate a `T` from the global context and move `value` in.
///
/// See [`allocate_value`](crate::typed::allocate_value).
#[track_caller]
pub fn allocate_value<T>(tag: MemoryTag, value: T) -> Option<NonNull<T>> {
    let mut guard = lock();
    match guard.as_mut() {
        Some(ctx) => ctx.allocate_value(tag, value),
        None => {
            not_initialized("allocate_value");
            None
        }
    }
}

/// Drop a value from [`allocate_value`] and free its block.
///
/// # Safety
///
/// `ptr` must be null or a live pointer obtained from [`allocate_value`]
/// since the last [`initialize`].
#[allow(unsafe_code)]
#[track_caller]
pub unsafe fn free_value<T>(ptr: *mut T) {
    let mut guard = lock();
    match guard.as_mut() {
        // SAFETY: forwarded caller contract.
        Some(ctx) => unsafe { ctx.free_value(ptr) },
        None if ptr.is_null() => {}
        None => not_initialized("free_value"),
    }
}

/// Switch tracking on the global context's allocator.
#[track_caller]
pub fn enable_tracking(enabled: bool) {
    let mut guard = lock();
    match guard.as_mut() {
        Some(ctx) => ctx.enable_tracking(enabled),
        None => not_initialized("enable_tracking"),
    }
}

/// Print and return the global allocator's leak report.
pub fn report_leaks() -> Option<LeakReport> {
    lock().as_ref()?.report_leaks()
}

/// Aggregate statistics of the global allocator; zeroed when not
/// initialised.
pub fn stats() -> MemoryStats {
    lock().as_ref().map(MemoryContext::stats).unwrap_or_default()
}

/// Per-tag statistics of the global allocator; zeroed when not initialised.
pub fn tag_stats(tag: MemoryTag) -> MemoryStats {
    lock()
        .as_ref()
        .map(|ctx| ctx.tag_stats(tag))
        .unwrap_or_default()
}
