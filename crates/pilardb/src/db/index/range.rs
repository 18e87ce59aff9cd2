use crate::db::{
    index::{
        key::KeyAtom,
        posting::{Posting, PostingCell},
    },
    store::rowref::RowRef,
};
use parking_lot::RwLock;
use std::{collections::BTreeMap, ops::Bound, sync::Arc};

///
/// RangeIndex
///
/// Ordered key -> posting. Point lookups are O(log n); range lookups walk
/// the contiguous key span and hand back posting snapshots. The tree is
/// behind a read-write lock with short critical sections; posting
/// mutation happens outside the lock on the copy-on-write cells.
///

pub(crate) struct RangeIndex {
    map: RwLock<BTreeMap<KeyAtom, Arc<PostingCell>>>,
}

impl RangeIndex {
    pub(crate) fn new() -> Self {
        Self {
            map: RwLock::new(BTreeMap::new()),
        }
    }

    fn cell_for(&self, key: &KeyAtom) -> Arc<PostingCell> {
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

    pub(crate) fn add(&self, key: KeyAtom, rowref: RowRef) {
        self.cell_for(&key).add(rowref);
    }

    pub(crate) fn remove(&self, key: &KeyAtom, row: u32) {
        let cell = self.map.read().get(key).map(Arc::clone);
        if let Some(cell) = cell {
            cell.remove(row);
        }
    }

    pub(crate) fn lookup(&self, key: &KeyAtom) -> Option<Arc<Posting>> {
        self.map.read().get(key).map(|cell| cell.load())
    }

    /// Posting snapshots for every key inside the bounds.
    pub(crate) fn range_lookup(
        &self,
        lo: Bound<&KeyAtom>,
        hi: Bound<&KeyAtom>,
    ) -> Vec<Arc<Posting>> {
        self.map
            .read()
            .range::<KeyAtom, _>((lo, hi))
            .map(|(_, cell)| cell.load())
            .collect()
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    fn total(postings: &[Arc<Posting>]) -> usize {
        postings.iter().map(|p| p.len()).sum()
    }

    #[test]
    fn range_bounds_are_inclusive_exclusive_as_given() {
        let idx = RangeIndex::new();
        for (i, age) in [20u64, 30, 40, 50].iter().enumerate() {
            #[allow(clippy::cast_possible_truncation)]
            idx.add(KeyAtom::Word(*age), RowRef::new(1, i as u32));
        }

        let lo = KeyAtom::Word(25);
        let hi = KeyAtom::Word(45);
        let hits = idx.range_lookup(Bound::Included(&lo), Bound::Included(&hi));
        assert_eq!(total(&hits), 2);

        let lo = KeyAtom::Word(30);
        let hits = idx.range_lookup(Bound::Excluded(&lo), Bound::Unbounded);
        assert_eq!(total(&hits), 2);
    }

    #[test]
    fn point_lookup_finds_exact_key() {
        let idx = RangeIndex::new();
        idx.add(KeyAtom::Word(9), RowRef::new(1, 0));
        assert_eq!(idx.lookup(&KeyAtom::Word(9)).unwrap().len(), 1);
        assert!(idx.lookup(&KeyAtom::Word(8)).is_none());
    }
}
