use crate::{db::store::page::PagedWords, error::StoreError};
use std::sync::atomic::{AtomicU64, Ordering};

/// Free-list terminator.
const NIL: u32 = u32::MAX;

const fn pack(version: u32, row: u32) -> u64 {
    ((version as u64) << 32) | row as u64
}

const fn unpack(head: u64) -> (u32, u32) {
    ((head >> 32) as u32, head as u32)
}

///
/// RowAllocator
///
/// Lock-free row id source: a Treiber stack of reusable slots threaded
/// through a per-row `next` word, plus a fetch-and-add counter for fresh
/// ids. The stack head carries a monotonic version tag in its high half so
/// a pop that races with a push-pop cycle of the same row id fails its CAS
/// instead of unlinking through a stale next pointer.
///

pub(crate) struct RowAllocator {
    head: AtomicU64,
    next: PagedWords,
    fresh: AtomicU64,
    capacity: u64,
    page_size: usize,
    max_pages: usize,
}

///
/// Allocation
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) enum Allocation {
    /// Slot never used before.
    Fresh(u32),
    /// Slot recycled from the free list.
    Reused(u32),
}

impl Allocation {
    pub(crate) const fn row(self) -> u32 {
        match self {
            Self::Fresh(row) | Self::Reused(row) => row,
        }
    }
}

impl RowAllocator {
    pub(crate) fn new(page_size: usize, max_pages: usize) -> Self {
        Self {
            head: AtomicU64::new(pack(0, NIL)),
            next: PagedWords::new(page_size, max_pages),
            fresh: AtomicU64::new(0),
            capacity: (page_size * max_pages) as u64,
            page_size,
            max_pages,
        }
    }

    /// Pop a reusable slot, or claim a fresh id.
    pub(crate) fn allocate(&self) -> Result<Allocation, StoreError> {
        loop {
            let head = self.head.load(Ordering::Acquire);
            let (version, row) = unpack(head);
            if row == NIL {
                break;
            }
            let next = self.next.load(row, Ordering::Acquire) as u32;
            let replacement = pack(version.wrapping_add(1), next);
            if self
                .head
                .compare_exchange_weak(head, replacement, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Ok(Allocation::Reused(row));
            }
        }

        let id = self.fresh.fetch_add(1, Ordering::AcqRel);
        if id >= self.capacity {
            // Leave the counter saturated; concurrent failers all land here.
            return Err(StoreError::CapacityExceeded {
                pages: self.max_pages,
                page_size: self.page_size,
            });
        }
        #[allow(clippy::cast_possible_truncation)]
        Ok(Allocation::Fresh(id as u32))
    }

    /// Push a tombstoned slot back for reuse.
    pub(crate) fn release(&self, row: u32) -> Result<(), StoreError> {
        loop {
            let head = self.head.load(Ordering::Acquire);
            let (version, top) = unpack(head);
            self.next.store(row, u64::from(top), Ordering::Release)?;
            let replacement = pack(version.wrapping_add(1), row);
            if self
                .head
                .compare_exchange_weak(head, replacement, Ordering::AcqRel, Ordering::Acquire)
                .is_ok()
            {
                return Ok(());
            }
        }
    }

}

///
/// TESTS
///
