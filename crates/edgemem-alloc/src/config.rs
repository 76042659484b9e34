//! Allocator configuration parameters.

use edgemem_core::align::{align_up, is_valid_alignment, DEFAULT_ALIGNMENT};
use edgemem_core::MemoryError;

/// Configuration for [`SystemAllocator`](crate::SystemAllocator).
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SystemConfig {
    /// Whether each allocation carries a tracking header.
    ///
    /// Default: on in debug builds, off in release builds. Tracking enables
    /// statistics, corruption detection and leak reports; without it the
    /// allocator is a thin wrapper over the platform primitive.
    pub tracking_enabled: bool,
}

impl SystemConfig {
    /// Default tracking mode for the current build profile.
    pub const DEFAULT_TRACKING: bool = cfg!(debug_assertions);

    /// Config with tracking explicitly on.
    pub fn tracked() -> Self {
        Self {
            tracking_enabled: true,
        }
    }

    /// Config with tracking explicitly off.
    pub fn untracked() -> Self {
        Self {
            tracking_enabled: false,
        }
    }
}

impl Default for SystemConfig {
    fn default() -> Self {
        Self {
            tracking_enabled: Self::DEFAULT_TRACKING,
        }
    }
}

/// Geometry of a [`PoolAllocator`](crate::PoolAllocator).
///
/// Validated by [`PoolConfig::stride`]; immutable once the pool exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolConfig {
    /// Largest request a slot can satisfy, in bytes.
    pub element_size: usize,
    /// Number of slots.
    pub element_count: usize,
    /// Alignment of every slot. Must be a power of two.
    pub alignment: usize,
}

impl PoolConfig {
    /// Pool of `element_count` slots of `element_size` bytes at the default
    /// alignment.
    pub fn new(element_size: usize, element_count: usize) -> Self {
        Self {
            element_size,
            element_count,
            alignment: DEFAULT_ALIGNMENT,
        }
    }

    /// Same geometry with a different slot alignment.
    pub fn with_alignment(mut self, alignment: usize) -> Self {
        self.alignment = alignment;
        self
    }

    /// Distance in bytes between consecutive slots.
    ///
    /// A slot must be able to hold the free-list link word while free, so
    /// the stride is at least one `usize` before rounding up to the
    /// alignment.
    pub fn stride(&self) -> Result<usize, MemoryError> {
        if self.element_size == 0 {
            return Err(MemoryError::contract("pool element size must be non-zero"));
        }
        if self.element_count == 0 {
            return Err(MemoryError::contract("pool element count must be non-zero"));
        }
        if !is_valid_alignment(self.alignment) {
            return Err(MemoryError::contract(format!(
                "pool alignment {} is not a power of two",
                self.alignment
            )));
        }
        let slot = self.element_size.max(std::mem::size_of::<usize>());
        align_up(slot, self.alignment).ok_or_else(|| MemoryError::ResourceExhausted {
            requested: slot,
            available: None,
        })
    }

    /// Total bytes of backing storage: `stride * element_count`.
    pub fn block_bytes(&self) -> Result<usize, MemoryError> {
        let stride = self.stride()?;
        stride
            .checked_mul(self.element_count)
            .ok_or(MemoryError::ResourceExhausted {
                requested: usize::MAX,
                available: None,
            })
    }
}
