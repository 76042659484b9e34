//! Error taxonomy shared by every allocator.
//!
//! Allocation paths do not return these directly: they report them through
//! a [`FailureReporter`](crate::failure::FailureReporter) and hand back a
//! null sentinel. Teardown paths (`shutdown`) and fallible constructors
//! return them as `Err`.

use std::error::Error;
use std::fmt;

/// How serious a reported failure is.
///
/// Ordered from least to most severe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Severity {
    /// Informational; never traps.
    Info,
    /// Suspicious but harmless; never traps.
    Warning,
    /// A broken contract or exhausted resource; traps only under a
    /// debugging [`TrapPolicy`](crate::failure::TrapPolicy).
    Error,
    /// A programming defect that must not go unnoticed; always traps.
    Fatal,
}

impl Severity {
    /// Upper-case label used in text diagnostics.
    pub const fn label(self) -> &'static str {
        match self {
            Self::Info => "INFO",
            Self::Warning => "WARNING",
            Self::Error => "ERROR",
            Self::Fatal => "FATAL",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Everything that can go wrong inside an allocator.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MemoryError {
    /// The caller broke an API contract (bad alignment, oversized pool
    /// request, reset with live allocations, double free, ...).
    ContractViolation {
        /// What was violated.
        reason: String,
    },
    /// The backing store cannot satisfy the request.
    ResourceExhausted {
        /// Bytes requested.
        requested: usize,
        /// Bytes that were still available, when the allocator knows.
        available: Option<usize>,
    },
    /// An allocation header's guard sentinel did not match on free.
    Corruption {
        /// User address passed to `free`.
        address: usize,
        /// Sentinel value found in the header.
        found: u64,
    },
    /// `free` was given a pointer this allocator never handed out.
    ForeignPointer {
        /// The offending address.
        address: usize,
    },
    /// A tracking allocator was torn down with live allocations.
    LeakOnShutdown {
        /// Number of live allocations.
        live_allocations: usize,
        /// Bytes still held by them.
        live_bytes: usize,
    },
}

impl MemoryError {
    /// Shorthand for a [`MemoryError::ContractViolation`].
    pub fn contract(reason: impl Into<String>) -> Self {
        Self::ContractViolation {
            reason: reason.into(),
        }
    }

    /// The severity this error is reported with.
    pub fn severity(&self) -> Severity {
        match self {
            Self::LeakOnShutdown { .. } => Severity::Fatal,
            _ => Severity::Error,
        }
    }

    /// Short machine-friendly kind name, used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ContractViolation { .. } => "contract_violation",
            Self::ResourceExhausted { .. } => "resource_exhausted",
            Self::Corruption { .. } => "corruption",
            Self::ForeignPointer { .. } => "foreign_pointer",
            Self::LeakOnShutdown { .. } => "leak_on_shutdown",
        }
    }
}

impl fmt::Display for MemoryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ContractViolation { reason } => write!(f, "contract violation: {reason}"),
            Self::ResourceExhausted {
                requested,
                available,
            } => {
                write!(f, "out of memory: requested {requested} bytes")?;
                if let Some(available) = available {
                    write!(f, ", {available} bytes available")?;
                }
                Ok(())
            }
            Self::Corruption { address, found } => {
                write!(
                    f,
                    "memory corruption: guard of allocation {address:#x} reads {found:#018x}"
                )
            }
            Self::ForeignPointer { address } => {
                write!(f, "pointer {address:#x} was not allocated by this allocator")
            }
            Self::LeakOnShutdown {
                live_allocations,
                live_bytes,
            } => {
                write!(
                    f,
                    "{live_allocations} allocation(s) totalling {live_bytes} bytes leaked at shutdown"
                )
            }
        }
    }
}

impl Error for MemoryError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_is_ordered() {
        assert!(Severity::Info < Severity::Warning);
        assert!(Severity::Warning < Severity::Error);
        assert!(Severity::Error < Severity::Fatal);
    }

    #[test]
    fn only_leaks_are_fatal() {
        let leak = MemoryError::LeakOnShutdown {
            live_allocations: 1,
            live_bytes: 8,
        };
        assert_eq!(leak.severity(), Severity::Fatal);
        assert_eq!(MemoryError::contract("x").severity(), Severity::Error);
        assert_eq!(
            MemoryError::ForeignPointer { address: 0x10 }.severity(),
            Severity::Error
        );
    }

    #[test]
    fn exhausted_display_mentions_availability() {
        let e = MemoryError::ResourceExhausted {
            requested: 500,
            available: Some(424),
        };
        assert_eq!(
            e.to_string(),
            "out of memory: requested 500 bytes, 424 bytes available"
        );
        let e = MemoryError::ResourceExhausted {
            requested: 500,
            available: None,
        };
        assert_eq!(e.to_string(), "out of memory: requested 500 bytes");
    }

    #[test]
    fn corruption_display_is_hex() {
        let e = MemoryError::Corruption {
            address: 0x1000,
            found: 0,
        };
        assert_eq!(
            e.to_string(),
            "memory corruption: guard of allocation 0x1000 reads 0x0000000000000000"
        );
    }
}
