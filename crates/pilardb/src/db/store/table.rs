use crate::{
    db::{
        index::key::KeyAtom,
        store::{
            alloc::{Allocation, RowAllocator},
            column::PagedColumn,
            page::{PagedBits, PagedWords},
            rowref::RowRef,
            seqlock::SeqLocks,
        },
    },
    error::StoreError,
    model::field::TypeCode,
    value::Value,
};
use dashmap::DashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use xxhash_rust::xxh3::Xxh3Builder;

///
/// Table
///
/// One entity's columnar storage: typed paged columns in declaration order,
/// the row allocator, per-row generations and seqlocks, the tombstone
/// bitmap, and the primary-key index. The table knows nothing about entity
/// types or queries; it moves `Value`s in and out of cells under the write
/// ordering discipline documented on `publish_row`.
///

pub struct Table {
    columns: Box<[PagedColumn]>,
    type_codes: Box<[TypeCode]>,
    generations: PagedWords,
    seqlocks: SeqLocks,
    tombstones: PagedBits,
    allocator: RowAllocator,
    live_count: AtomicU64,
    allocated_count: AtomicU64,
    id_index: DashMap<KeyAtom, RowRef, Xxh3Builder>,
}

impl Table {
    #[must_use]
    pub(crate) fn new(columns: &[(TypeCode, bool)], page_size: usize, max_pages: usize) -> Self {
        let cols: Box<[PagedColumn]> = columns
            .iter()
            .map(|&(code, nullable)| PagedColumn::new(code, nullable, page_size, max_pages))
            .collect();
        let type_codes = columns.iter().map(|&(code, _)| code).collect();

        Self {
            columns: cols,
            type_codes,
            generations: PagedWords::new(page_size, max_pages),
            seqlocks: SeqLocks::new(page_size, max_pages),
            tombstones: PagedBits::new(page_size, max_pages),
            allocator: RowAllocator::new(page_size, max_pages),
            live_count: AtomicU64::new(0),
            allocated_count: AtomicU64::new(0),
            id_index: DashMap::with_hasher(Xxh3Builder::new()),
        }
    }

    // ======================================================================
    // Geometry and counters
    // ======================================================================

    #[must_use]
    pub fn column_count(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn type_code(&self, column: usize) -> TypeCode {
        self.type_codes[column]
    }

    #[must_use]
    pub fn live_count(&self) -> u64 {
        self.live_count.load(Ordering::Acquire)
    }

    #[must_use]
    pub fn allocated_count(&self) -> u64 {
        self.allocated_count.load(Ordering::Acquire)
    }

    pub(crate) fn column(&self, index: usize) -> &PagedColumn {
        &self.columns[index]
    }

    pub(crate) const fn tombstones(&self) -> &PagedBits {
        &self.tombstones
    }

    /// Exclusive upper bound of rows fully published across every column.
    #[must_use]
    pub fn published_floor(&self) -> u32 {
        self.columns
            .iter()
            .map(PagedColumn::published)
            .min()
            .unwrap_or(0)
    }

    // ======================================================================
    // Row lifecycle
    // ======================================================================

    /// Claim a slot and stamp a fresh generation. The row is invisible
    /// until published.
    pub(crate) fn allocate_row(&self) -> Result<RowRef, StoreError> {
        let allocation = self.allocator.allocate()?;
        let row = allocation.row();
        let generation = self.generations.slot(row)?.fetch_add(1, Ordering::AcqRel) + 1;
        if matches!(allocation, Allocation::Fresh(_)) {
            self.allocated_count.fetch_add(1, Ordering::AcqRel);
        } else {
            // Recycled slot: the previous tenant's cells are still there,
            // and the id-presence gate must keep excluding the slot until
            // the new writer commits it. Clear the present bits under the
            // row seqlock, while the tombstone still hides the slot from
            // scans, so in-flight consistent readers never see a mix.
            let odd = self.seqlocks.begin_write(row)?;
            for column in &self.columns {
                column.reset_slot(row)?;
            }
            self.seqlocks.end_write(row, odd);
        }
        self.tombstones.clear(row)?;
        #[allow(clippy::cast_possible_truncation)]
        Ok(RowRef::new(generation as u32, row))
    }

    /// Current-generation reference for a row id.
    #[must_use]
    pub fn row_ref(&self, row: u32) -> RowRef {
        #[allow(clippy::cast_possible_truncation)]
        RowRef::new(self.generations.load(row, Ordering::Acquire) as u32, row)
    }

    /// Generation still current and not tombstoned.
    #[must_use]
    pub fn is_live(&self, rowref: RowRef) -> bool {
        #[allow(clippy::cast_possible_truncation)]
        let current = self.generations.load(rowref.row(), Ordering::Acquire) as u32;
        current == rowref.generation() && !self.tombstones.get(rowref.row())
    }

    /// Live and actually inserted: the id cell is present. A slot can be
    /// live-looking while its writer is still between allocation and the
    /// id write; such a row is not committed yet.
    #[must_use]
    pub fn is_committed(&self, rowref: RowRef, id_column: usize) -> bool {
        self.is_live(rowref) && self.columns[id_column].has_value(rowref.row())
    }

    /// CAS the tombstone bit; only the winning call decrements `live_count`
    /// and recycles the slot. Double-delete and stale-ref delete are no-ops.
    pub(crate) fn tombstone(&self, rowref: RowRef) -> Result<bool, StoreError> {
        if !self.is_live(rowref) {
            return Ok(false);
        }
        if !self.tombstones.set(rowref.row())? {
            return Ok(false);
        }
        self.live_count.fetch_sub(1, Ordering::AcqRel);
        self.allocator.release(rowref.row())?;
        Ok(true)
    }

    pub(crate) fn note_insert(&self) {
        self.live_count.fetch_add(1, Ordering::AcqRel);
    }

    // ======================================================================
    // Cell access
    // ======================================================================

    pub(crate) fn begin_write(&self, row: u32) -> Result<u64, StoreError> {
        self.seqlocks.begin_write(row)
    }

    pub(crate) fn end_write(&self, row: u32, odd: u64) {
        self.seqlocks.end_write(row, odd);
    }

    pub(crate) fn set_cell(&self, column: usize, row: u32, value: &Value) -> Result<(), StoreError> {
        self.columns[column].set(row, value)
    }

    /// Unconditional cell read; guard with the seqlock or a generation
    /// check.
    #[must_use]
    pub fn read_cell(&self, column: usize, row: u32) -> Value {
        self.columns[column].read(row)
    }

    /// Advance every column's watermark past `row`. Must run after the
    /// row's seqlock release: the release-store here pairs with the acquire
    /// load at scan start, so a scan that observes the new bound observes
    /// the cell writes too.
    pub(crate) fn publish_row(&self, row: u32) {
        for column in &self.columns {
            column.publish(row + 1);
        }
    }

    /// Consistent multi-column snapshot of one row.
    pub(crate) fn read_row_consistent(&self, row: u32) -> Result<Vec<Value>, StoreError> {
        self.seqlocks.read_consistent(row, || {
            self.columns.iter().map(|c| c.read(row)).collect()
        })
    }

    /// Consistent read of a single cell (order keys, join keys).
    pub(crate) fn read_cell_consistent(
        &self,
        column: usize,
        row: u32,
    ) -> Result<Value, StoreError> {
        self.seqlocks
            .read_consistent(row, || self.columns[column].read(row))
    }

    /// All live, fully published rows. The watermark is shared per column,
    /// so a row inside the published window may still be mid-write by its
    /// own writer; the id cell only becomes present inside that writer's
    /// seqlock section, which makes it the visibility gate.
    pub(crate) fn scan_all(&self, id_column: usize, out: &mut Vec<u32>) {
        let bound = self.published_floor();
        let ids = &self.columns[id_column];
        for row in 0..bound {
            if !self.tombstones.get(row) && ids.has_value(row) {
                out.push(row);
            }
        }
    }

    /// Rows whose `column` cell is null (or non-null). Null is distinct
    /// from empty for strings; cells never written count as null. Gated on
    /// the id cell like `scan_all`: a slot mid-insert or freshly recycled
    /// is not a committed row and must not surface as a null match.
    pub(crate) fn scan_null(
        &self,
        column: usize,
        id_column: usize,
        want_null: bool,
        out: &mut Vec<u32>,
    ) {
        let bound = self.published_floor();
        let ids = &self.columns[id_column];
        let cells = &self.columns[column];
        for row in 0..bound {
            if self.tombstones.get(row) || !ids.has_value(row) {
                continue;
            }
            if cells.has_value(row) != want_null {
                out.push(row);
            }
        }
    }

    // ======================================================================
    // Primary-key index
    // ======================================================================

    pub(crate) fn id_lookup(&self, key: &KeyAtom) -> Option<RowRef> {
        self.id_index.get(key).map(|entry| *entry.value())
    }

    pub(crate) fn id_insert(&self, key: KeyAtom, rowref: RowRef) {
        self.id_index.insert(key, rowref);
    }

    /// Remove an id mapping, but only if it still points at `rowref`;
    /// a concurrent re-insert of the same id must not lose its entry.
    pub(crate) fn id_remove(&self, key: &KeyAtom, rowref: RowRef) {
        self.id_index.remove_if(key, |_, current| *current == rowref);
    }

    pub(crate) fn id_count(&self) -> usize {
        self.id_index.len()
    }

    // ======================================================================
    // Storage accounting
    // ======================================================================

    /// Approximate resident bytes across column pages.
    #[must_use]
    pub fn approx_bytes(&self) -> u64 {
        self.columns
            .iter()
            .map(|c| (c.allocated_pages() * c.page_size() * 8) as u64)
            .sum()
    }

    #[must_use]
    pub fn allocated_pages(&self) -> usize {
        self.columns.iter().map(PagedColumn::allocated_pages).sum()
    }
}

///
/// TESTS
///
