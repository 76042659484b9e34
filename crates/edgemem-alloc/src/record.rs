//! Per-allocation tracking headers and the intrusive list that links them.
//!
//! With tracking enabled, every system allocation is laid out as
//!
//! ```text
//! raw block start                        user pointer
//! │                                      │
//! ▼                                      ▼
//! ├── padding ──┬── AllocationRecord ────┼── user bytes ──┤
//!               │ size, alignment, ...   │
//!               │ prev / next            │
//!               │ guard (last 8 bytes) ──┘
//! ```
//!
//! The record sits immediately before the user region and its guard
//! sentinel is the last field, so an underrun of the user buffer clobbers
//! the guard first. The padding is whatever is needed to keep the user
//! pointer at the requested alignment.

#![allow(unsafe_code)]

use std::mem::{align_of, offset_of, size_of};
use std::panic::Location;
use std::ptr::NonNull;

use edgemem_core::align::align_up;
use edgemem_core::MemoryTag;

/// Value every live record's guard must hold.
pub const GUARD_SENTINEL: u64 = 0xED6E_A110_C8ED_F00D;

/// Bytes the guard occupies directly in front of the user pointer.
pub const GUARD_SIZE: usize = size_of::<u64>();

/// Value written over the guard when a record is retired.
const RETIRED_GUARD: u64 = 0xDEAD_DEAD_DEAD_DEAD;

/// Metadata header stored in front of a tracked allocation.
#[repr(C)]
pub(crate) struct AllocationRecord {
    pub(crate) size: usize,
    pub(crate) alignment: usize,
    /// Distance from the raw platform block to the user pointer.
    pub(crate) block_offset: usize,
    pub(crate) location: &'static Location<'static>,
    pub(crate) prev: Option<NonNull<AllocationRecord>>,
    pub(crate) next: Option<NonNull<AllocationRecord>>,
    pub(crate) tag: MemoryTag,
    pub(crate) guard: u64,
}

// The guard must be the final bytes of the record.
const _: () =
    assert!(offset_of!(AllocationRecord, guard) + GUARD_SIZE == size_of::<AllocationRecord>());

impl AllocationRecord {
    /// Size of the header in bytes.
    pub(crate) const SIZE: usize = size_of::<AllocationRecord>();

    /// Distance from the raw block start to the user pointer for a request
    /// aligned to `alignment`, or `None` on overflow.
    pub(crate) fn block_offset_for(alignment: usize) -> Option<usize> {
        align_up(Self::SIZE, Self::block_alignment(alignment))
    }

    /// Alignment the raw block must be requested with.
    pub(crate) fn block_alignment(alignment: usize) -> usize {
        alignment.max(align_of::<AllocationRecord>())
    }

    /// Header for the allocation whose user region starts at `user`.
    ///
    /// The result is only meaningful if `user` came from a tracked
    /// allocation; the guard must be checked before anything else is read.
    pub(crate) fn from_user(user: NonNull<u8>) -> NonNull<AllocationRecord> {
        // wrapping_sub keeps this well-defined for foreign pointers too.
        let raw = user.as_ptr().wrapping_sub(Self::SIZE).cast::<AllocationRecord>();
        NonNull::new(raw).unwrap_or(NonNull::dangling())
    }

    /// The user pointer that follows this header.
    pub(crate) fn user_ptr(record: NonNull<AllocationRecord>) -> NonNull<u8> {
        // SAFETY: the user region starts right after the header inside the
        // same platform block.
        unsafe { NonNull::new_unchecked(record.as_ptr().cast::<u8>().add(Self::SIZE)) }
    }

    /// Read the guard without trusting any other field.
    ///
    /// # Safety
    ///
    /// `record` must point to `SIZE` readable bytes.
    pub(crate) unsafe fn read_guard(record: NonNull<AllocationRecord>) -> u64 {
        // SAFETY: forwarded caller contract; the field is naturally aligned.
        unsafe { std::ptr::addr_of!((*record.as_ptr()).guard).read() }
    }

    /// Overwrite the guard so a stale header can never validate again.
    ///
    /// # Safety
    ///
    /// `record` must point to a live header.
    pub(crate) unsafe fn retire(record: NonNull<AllocationRecord>) {
        // SAFETY: forwarded caller contract.
        unsafe { std::ptr::addr_of_mut!((*record.as_ptr()).guard).write(RETIRED_GUARD) }
    }
}

/// Read-only view of one live tracked allocation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct AllocationInfo {
    /// User address.
    pub address: usize,
    /// Requested size in bytes.
    pub size: usize,
    /// Requested alignment.
    pub alignment: usize,
    /// Statistics tag.
    pub tag: MemoryTag,
    /// Where the allocation was requested.
    pub location: &'static Location<'static>,
}

impl AllocationInfo {
    fn from_record(record: NonNull<AllocationRecord>) -> Self {
        // SAFETY: only called on nodes of a TrackingList, which are live
        // headers.
        let r = unsafe { record.as_ref() };
        Self {
            address: AllocationRecord::user_ptr(record).as_ptr() as usize,
            size: r.size,
            alignment: r.alignment,
            tag: r.tag,
            location: r.location,
        }
    }
}

/// Intrusive doubly linked list of live allocation records.
///
/// Nodes are appended at the tail; removal is O(1) from anywhere.
#[derive(Default)]
pub(crate) struct TrackingList {
    head: Option<NonNull<AllocationRecord>>,
    tail: Option<NonNull<AllocationRecord>>,
    len: usize,
}

impl TrackingList {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.len
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Append `record` at the tail.
    ///
    /// # Safety
    ///
    /// `record` must be a live, initialised header not already in any list,
    /// and must stay valid until it is unlinked.
    pub(crate) unsafe fn push_back(&mut self, record: NonNull<AllocationRecord>) {
        // SAFETY: forwarded caller contract; `tail`, if any, is a live node.
        unsafe {
            (*record.as_ptr()).prev = self.tail;
            (*record.as_ptr()).next = None;
            match self.tail {
                Some(tail) => (*tail.as_ptr()).next = Some(record),
                None => self.head = Some(record),
            }
        }
        self.tail = Some(record);
        self.len += 1;
    }

    /// Remove `record`, patching its neighbours and the list ends.
    ///
    /// # Safety
    ///
    /// `record` must currently be a node of this list.
    pub(crate) unsafe fn unlink(&mut self, record: NonNull<AllocationRecord>) {
        // SAFETY: `record` and its neighbours are live nodes of this list.
        unsafe {
            let prev = (*record.as_ptr()).prev;
            let next = (*record.as_ptr()).next;
            match prev {
                Some(p) => (*p.as_ptr()).next = next,
                None => self.head = next,
            }
            match next {
                Some(n) => (*n.as_ptr()).prev = prev,
                None => self.tail = prev,
            }
            (*record.as_ptr()).prev = None;
            (*record.as_ptr()).next = None;
        }
        self.len -= 1;
    }

    /// Forget every node without touching them.
    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }

    /// Walk the list head to tail.
    pub(crate) fn iter(&self) -> Iter<'_> {
        Iter {
            next: self.head,
            _list: std::marker::PhantomData,
        }
    }
}

/// Head-to-tail iterator over a [`TrackingList`].
pub(crate) struct Iter<'a> {
    next: Option<NonNull<AllocationRecord>>,
    _list: std::marker::PhantomData<&'a TrackingList>,
}

impl Iterator for Iter<'_> {
    type Item = AllocationInfo;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.next?;
        // SAFETY: every node reachable from the head is a live header for as
        // long as the list is borrowed.
        self.next = unsafe { (*node.as_ptr()).next };
        Some(AllocationInfo::from_record(node))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Header-sized, header-aligned storage for list tests.
    #[repr(C, align(64))]
    struct Slot([u8; 128]);

    fn make_record(slot: &mut Slot, size: usize, tag: MemoryTag) -> NonNull<AllocationRecord> {
        let ptr = slot.0.as_mut_ptr().cast::<AllocationRecord>();
        unsafe {
            ptr.write(AllocationRecord {
                size,
                alignment: 16,
                block_offset: AllocationRecord::SIZE,
                location: Location::caller(),
                prev: None,
                next: None,
                tag,
                guard: GUARD_SENTINEL,
            });
            NonNull::new_unchecked(ptr)
        }
    }

    #[test]
    fn guard_is_directly_before_user_pointer() {
        let mut slot = Slot([0; 128]);
        let rec = make_record(&mut slot, 8, MemoryTag::NoTag);
        let user = AllocationRecord::user_ptr(rec);
        let guard = unsafe { user.as_ptr().sub(GUARD_SIZE).cast::<u64>().read_unaligned() };
        assert_eq!(guard, GUARD_SENTINEL);
        assert_eq!(AllocationRecord::from_user(user), rec);
    }

    #[test]
    fn block_offset_respects_alignment() {
        for &align in &[1usize, 8, 16, 64, 256] {
            let off = AllocationRecord::block_offset_for(align).unwrap();
            assert!(off >= AllocationRecord::SIZE);
            assert_eq!(off % AllocationRecord::block_alignment(align), 0);
        }
    }

    #[test]
    fn push_and_unlink_patch_ends() {
        let mut slots = [Slot([0; 128]), Slot([0; 128]), Slot([0; 128])];
        let [a, b, c] = &mut slots;
        let ra = make_record(a, 1, MemoryTag::Ai);
        let rb = make_record(b, 2, MemoryTag::Gui);
        let rc = make_record(c, 3, MemoryTag::Net);

        let mut list = TrackingList::new();
        unsafe {
            list.push_back(ra);
            list.push_back(rb);
            list.push_back(rc);
        }
        let sizes: Vec<_> = list.iter().map(|i| i.size).collect();
        assert_eq!(sizes, vec![1, 2, 3]);

        unsafe { list.unlink(rb) };
        let sizes: Vec<_> = list.iter().map(|i| i.size).collect();
        assert_eq!(sizes, vec![1, 3]);

        unsafe { list.unlink(ra) };
        assert_eq!(list.head, Some(rc));
        assert_eq!(list.tail, Some(rc));

        unsafe { list.unlink(rc) };
        assert!(list.is_empty());
        assert_eq!(list.len(), 0);
        assert!(list.tail.is_none());
    }

    #[test]
    fn retire_invalidates_guard() {
        let mut slot = Slot([0; 128]);
        let rec = make_record(&mut slot, 8, MemoryTag::NoTag);
        unsafe {
            assert_eq!(AllocationRecord::read_guard(rec), GUARD_SENTINEL);
            AllocationRecord::retire(rec);
            assert_ne!(AllocationRecord::read_guard(rec), GUARD_SENTINEL);
        }
    }
}
