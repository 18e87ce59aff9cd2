use crate::db::{
    index::{
        key::{CompositeKey, KeyAtom},
        posting::{Posting, PostingCell},
    },
    store::rowref::RowRef,
};
use dashmap::DashMap;
use parking_lot::RwLock;
use std::{collections::BTreeMap, ops::Bound, sync::Arc};
use xxhash_rust::xxh3::Xxh3Builder;

///
/// CompositeHashIndex
///
/// Keyed on the full ordered field tuple; only consulted when a query
/// binds every component with equality.
///

pub(crate) struct CompositeHashIndex {
    map: DashMap<CompositeKey, Arc<PostingCell>, Xxh3Builder>,
}

impl CompositeHashIndex {
    pub(crate) fn new() -> Self {
        Self {
            map: DashMap::with_hasher(Xxh3Builder::new()),
        }
    }

    pub(crate) fn add(&self, key: CompositeKey, rowref: RowRef) {
        let cell = {
            let entry = self
                .map
                .entry(key)
                .or_insert_with(|| Arc::new(PostingCell::new()));
            Arc::clone(entry.value())
        };
        cell.add(rowref);
    }

    pub(crate) fn remove(&self, key: &CompositeKey, row: u32) {
        if let Some(cell) = self.map.get(key).map(|entry| Arc::clone(entry.value())) {
            cell.remove(row);
        }
    }

    pub(crate) fn lookup(&self, key: &CompositeKey) -> Option<Arc<Posting>> {
        self.map.get(key).map(|entry| entry.value().load())
    }
}

///
/// CompositeRangeIndex
///
/// Lexicographically ordered tuple keys. Supports full-tuple equality and
/// the equality-prefix + range-tail shape: all leading components bound
/// with equality, the next component bound by a range.
///

pub(crate) struct CompositeRangeIndex {
    map: RwLock<BTreeMap<CompositeKey, Arc<PostingCell>>>,
}

impl CompositeRangeIndex {
    pub(crate) fn new() -> Self {
        Self {
            map: RwLock::new(BTreeMap::new()),
        }
    }

    fn cell_for(&self, key: &CompositeKey) -> Arc<PostingCell> {
        if let Some(cell) = self.map.read().get(key) {
            return Arc::clone(cell);
        }
        Arc::clone(
            self.map
                .write()
                .entry(key.clone())
                .or_insert_with(|| Arc::new(PostingCell::new())),
        )
    }

    pub(crate) fn add(&self, key: CompositeKey, rowref: RowRef) {
        self.cell_for(&key).add(rowref);
    }

    pub(crate) fn remove(&self, key: &CompositeKey, row: u32) {
        let cell = self.map.read().get(key).map(Arc::clone);
        if let Some(cell) = cell {
            cell.remove(row);
        }
    }

    pub(crate) fn lookup(&self, key: &CompositeKey) -> Option<Arc<Posting>> {
        self.map.read().get(key).map(|cell| cell.load())
    }

    /// Walk every tuple that starts with `prefix` and whose next component
    /// falls inside the tail bounds.
    pub(crate) fn prefix_range_lookup(
        &self,
        prefix: &[KeyAtom],
        tail_lo: Bound<&KeyAtom>,
        tail_hi: Bound<&KeyAtom>,
    ) -> Vec<Arc<Posting>> {
        let start = CompositeKey(prefix.iter().cloned().collect());
        let map = self.map.read();
        map.range((Bound::Included(&start), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .filter(|(key, _)| {
                key.0.get(prefix.len()).is_some_and(|tail| {
                    let above = match tail_lo {
                        Bound::Included(lo) => tail >= lo,
                        Bound::Excluded(lo) => tail > lo,
                        Bound::Unbounded => true,
                    };
                    let below = match tail_hi {
                        Bound::Included(hi) => tail <= hi,
                        Bound::Excluded(hi) => tail < hi,
                        Bound::Unbounded => true,
                    };
                    above && below
                })
            })
            .map(|(_, cell)| cell.load())
            .collect()
    }
}

///
/// TESTS
///
