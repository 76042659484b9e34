//! Backing storage for the linear and pool allocators.
//!
//! A strategy either owns a block taken straight from the platform, or
//! borrows one from a [`SystemAllocator`]. A borrowed block is a live,
//! tagged allocation of that system allocator: it shows up in its
//! statistics and in its leak report until handed back with
//! [`Backing::release_into`]. Dropping a borrowed backing does not free
//! it.

#![allow(unsafe_code)]

use std::ptr::NonNull;

use edgemem_core::{Allocator, MemoryError, MemoryTag};

use crate::platform::AlignedBlock;
use crate::system::SystemAllocator;

pub(crate) enum Backing {
    /// Taken from the platform, released on drop.
    Owned(AlignedBlock),
    /// Allocated from the system allocator identified by `owner`.
    System {
        base: NonNull<u8>,
        len: usize,
        owner: u64,
    },
}

impl Backing {
    pub(crate) fn owned(len: usize, alignment: usize) -> Result<Self, MemoryError> {
        AlignedBlock::new(len, alignment)
            .map(Self::Owned)
            .ok_or(MemoryError::ResourceExhausted {
                requested: len,
                available: None,
            })
    }

    /// Allocate `len` bytes from `system` under `tag`.
    ///
    /// A refused allocation has already been reported through `system`'s
    /// reporter; the error is returned as well.
    #[track_caller]
    pub(crate) fn from_system(
        system: &mut SystemAllocator,
        len: usize,
        tag: MemoryTag,
        alignment: usize,
    ) -> Result<Self, MemoryError> {
        let base = system
            .allocate_tagged(len, tag, alignment)
            .ok_or(MemoryError::ResourceExhausted {
                requested: len,
                available: None,
            })?;
        Ok(Self::System {
            base,
            len,
            owner: system.id(),
        })
    }

    pub(crate) fn base(&self) -> NonNull<u8> {
        match self {
            Self::Owned(block) => block.base(),
            Self::System { base, .. } => *base,
        }
    }

    pub(crate) fn base_addr(&self) -> usize {
        self.base().as_ptr() as usize
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            Self::Owned(block) => block.len(),
            Self::System { len, .. } => *len,
        }
    }

    pub(crate) fn contains_addr(&self, addr: usize) -> bool {
        let base = self.base_addr();
        addr >= base && addr - base < self.len()
    }

    pub(crate) fn is_system_backed(&self) -> bool {
        matches!(self, Self::System { .. })
    }

    /// Hand a borrowed block back to the allocator it came from.
    ///
    /// An owned block is simply released. A block borrowed from a
    /// different allocator is left allocated in its owner, and
    /// [`MemoryError::ForeignPointer`] is reported through `system` and
    /// returned.
    #[track_caller]
    pub(crate) fn release_into(self, system: &mut SystemAllocator) -> Result<(), MemoryError> {
        match self {
            Self::Owned(_) => Ok(()),
            Self::System { base, owner, .. } if owner == system.id() => {
                // SAFETY: `base` was returned by this allocator's
                // `allocate_tagged` and the strategy holding it is consumed,
                // so nothing refers to the block any more.
                unsafe { system.free(base.as_ptr()) };
                Ok(())
            }
            Self::System { base, .. } => {
                let error = MemoryError::ForeignPointer {
                    address: base.as_ptr() as usize,
                };
                system.raise(error.clone(), "backing.owner == system");
                Err(error)
            }
        }
    }
}

// SAFETY: a borrowed block is only reachable through this value; the
// system allocator never touches a live block's user bytes.
unsafe impl Send for Backing {}
