//! Failure reporting: the single funnel every allocator error goes through.
//!
//! An allocator that hits a [`MemoryError`] wraps it in a [`Failure`]
//! (condition text, severity, caller location) and hands it to its
//! [`FailureReporter`]. The reporter answers with a [`Disposition`]: whether
//! the process *should* trap. Allocation paths never act on that answer
//! themselves; they keep it in a [`FailureSink`] so the caller can decide at
//! its own boundary. The one exception is a Fatal failure raised from a
//! destructor, where there is no caller left to decide.

use std::fmt;
use std::panic::Location;
use std::sync::Arc;

use crate::error::{MemoryError, Severity};

/// What the reporter recommends after seeing a failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Disposition {
    /// Carry on; the failing call has already returned its sentinel.
    Continue,
    /// Stop the process (debugger break or abort).
    Trap,
}

/// One reported failure.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Failure {
    /// The underlying error.
    pub error: MemoryError,
    /// Severity it is reported at.
    pub severity: Severity,
    /// The condition that failed, e.g. `"alignment.is_power_of_two()"`.
    pub condition: &'static str,
    /// Where the failing operation was called from.
    pub location: &'static Location<'static>,
}

impl Failure {
    /// Wrap `error` at its natural severity, attributed to the caller.
    #[track_caller]
    pub fn new(error: MemoryError, condition: &'static str) -> Self {
        Self {
            severity: error.severity(),
            error,
            condition,
            location: Location::caller(),
        }
    }
}

impl fmt::Display for Failure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] Assertion failed: {} ({})\n  at {}:{}",
            self.severity,
            self.condition,
            self.error,
            self.location.file(),
            self.location.line()
        )
    }
}

/// A failure together with the reporter's answer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReportedFailure {
    /// What went wrong.
    pub failure: Failure,
    /// What the reporter recommended.
    pub disposition: Disposition,
}

/// Maps severities to trap decisions.
///
/// Fatal always traps, Warning and Info never do, and Error traps only
/// when `break_on_error` is set.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TrapPolicy {
    /// Whether `Severity::Error` failures request a trap.
    pub break_on_error: bool,
}

impl TrapPolicy {
    /// Debug builds break on errors, release builds do not.
    pub const DEFAULT_BREAK_ON_ERROR: bool = cfg!(debug_assertions);

    /// Decide what to do about a failure of the given severity.
    pub fn decide(&self, severity: Severity) -> Disposition {
        match severity {
            Severity::Fatal => Disposition::Trap,
            Severity::Error if self.break_on_error => Disposition::Trap,
            Severity::Error | Severity::Warning | Severity::Info => Disposition::Continue,
        }
    }
}

impl Default for TrapPolicy {
    fn default() -> Self {
        Self {
            break_on_error: Self::DEFAULT_BREAK_ON_ERROR,
        }
    }
}

/// Receives failures and decides whether the process should trap.
///
/// Implementations must be cheap: they run synchronously inside the
/// failing allocator call.
pub trait FailureReporter: Send + Sync {
    /// Handle one failure and return the recommended disposition.
    fn report(&self, failure: &Failure) -> Disposition;
}

/// Reporter handle shared between allocators.
pub type SharedReporter = Arc<dyn FailureReporter>;

/// Writes failures to stderr and emits a `tracing` event for each.
#[derive(Clone, Copy, Debug, Default)]
pub struct DefaultReporter {
    policy: TrapPolicy,
}

impl DefaultReporter {
    /// Reporter using `policy` for its trap decisions.
    pub fn new(policy: TrapPolicy) -> Self {
        Self { policy }
    }

    /// The default reporter, ready to share.
    pub fn shared() -> SharedReporter {
        Arc::new(Self::default())
    }
}

impl FailureReporter for DefaultReporter {
    fn report(&self, failure: &Failure) -> Disposition {
        eprintln!("{failure}");
        let kind = failure.error.kind();
        let file = failure.location.file();
        let line = failure.location.line();
        match failure.severity {
            Severity::Fatal | Severity::Error => {
                tracing::error!(kind, severity = %failure.severity, file, line, "{}", failure.error)
            }
            Severity::Warning => tracing::warn!(kind, file, line, "{}", failure.error),
            Severity::Info => tracing::info!(kind, file, line, "{}", failure.error),
        }
        self.policy.decide(failure.severity)
    }
}

/// Per-allocator front end to a [`FailureReporter`].
///
/// Remembers the most recent failure so callers can inspect why an
/// operation returned its sentinel.
pub struct FailureSink {
    reporter: SharedReporter,
    last: Option<ReportedFailure>,
}

impl FailureSink {
    /// Sink forwarding to `reporter`.
    pub fn new(reporter: SharedReporter) -> Self {
        Self {
            reporter,
            last: None,
        }
    }

    /// Report `error`, remember it, and return the reporter's answer.
    #[track_caller]
    pub fn raise(&mut self, error: MemoryError, condition: &'static str) -> Disposition {
        let failure = Failure::new(error, condition);
        let disposition = self.reporter.report(&failure);
        self.last = Some(ReportedFailure {
            failure,
            disposition,
        });
        disposition
    }

    /// The most recent failure, if any.
    pub fn last(&self) -> Option<&ReportedFailure> {
        self.last.as_ref()
    }

    /// Forget the most recent failure.
    pub fn clear(&mut self) {
        self.last = None;
    }

    /// The reporter this sink forwards to.
    pub fn reporter(&self) -> &SharedReporter {
        &self.reporter
    }
}

impl Default for FailureSink {
    fn default() -> Self {
        Self::new(DefaultReporter::shared())
    }
}

impl fmt::Debug for FailureSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FailureSink")
            .field("last", &self.last)
            .finish_non_exhaustive()
    }
}
