use crate::db::{
    index::posting::{Posting, PostingCell},
    store::rowref::RowRef,
};
use parking_lot::RwLock;
use std::{collections::BTreeMap, ops::Bound, sync::Arc};

///
/// PrefixIndex
///
/// String index keyed on the full value; a prefix lookup walks the
/// contiguous span of keys starting at the anchor and stops at the first
/// key that no longer carries it.
///

pub(crate) struct PrefixIndex {
    map: RwLock<BTreeMap<Arc<String>, Arc<PostingCell>>>,
}

impl PrefixIndex {
    pub(crate) fn new() -> Self {
        Self {
            map: RwLock::new(BTreeMap::new()),
        }
    }

    fn cell_for(&self, key: &Arc<String>) -> Arc<PostingCell> {
        if let Some(cell) = self.map.read().get(key) {
            return Arc::clone(cell);
        }
        Arc::clone(
            self.map
                .write()
                .entry(Arc::clone(key))
                .or_insert_with(|| Arc::new(PostingCell::new())),
        )
    }

    pub(crate) fn add(&self, key: &Arc<String>, rowref: RowRef) {
        self.cell_for(key).add(rowref);
    }

    pub(crate) fn remove(&self, key: &Arc<String>, row: u32) {
        let cell = self.map.read().get(key).map(Arc::clone);
        if let Some(cell) = cell {
            cell.remove(row);
        }
    }

    pub(crate) fn prefix_lookup(&self, prefix: &str) -> Vec<Arc<Posting>> {
        let anchor = prefix.to_owned();
        let map = self.map.read();
        map.range::<String, _>((Bound::Included(&anchor), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(prefix))
            .map(|(_, cell)| cell.load())
            .collect()
    }
}

///
/// SuffixIndex
///
/// Same shape as the prefix index, keyed on the character-reversed value so
/// a suffix anchor becomes a prefix walk.
///

pub(crate) struct SuffixIndex {
    map: RwLock<BTreeMap<String, Arc<PostingCell>>>,
}

pub(crate) fn reversed(s: &str) -> String {
    s.chars().rev().collect()
}

impl SuffixIndex {
    pub(crate) fn new() -> Self {
        Self {
            map: RwLock::new(BTreeMap::new()),
        }
    }

    fn cell_for(&self, key: String) -> Arc<PostingCell> {
        if let Some(cell) = self.map.read().get(&key) {
            return Arc::clone(cell);
        }
        Arc::clone(
            self.map
                .write()
                .entry(key)
                .or_insert_with(|| Arc::new(PostingCell::new())),
        )
    }

    pub(crate) fn add(&self, value: &str, rowref: RowRef) {
        self.cell_for(reversed(value)).add(rowref);
    }

    pub(crate) fn remove(&self, value: &str, row: u32) {
        let key = reversed(value);
        let cell = self.map.read().get(&key).map(Arc::clone);
        if let Some(cell) = cell {
            cell.remove(row);
        }
    }

    pub(crate) fn suffix_lookup(&self, suffix: &str) -> Vec<Arc<Posting>> {
        let anchor = reversed(suffix);
        let map = self.map.read();
        map.range::<String, _>((Bound::Included(&anchor), Bound::Unbounded))
            .take_while(|(key, _)| key.starts_with(anchor.as_str()))
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

    fn arc(s: &str) -> Arc<String> {
        Arc::new(s.to_owned())
    }

    fn total(postings: &[Arc<Posting>]) -> usize {
        postings.iter().map(|p| p.len()).sum()
    }

    #[test]
    fn prefix_walk_stops_at_span_end() {
        let idx = PrefixIndex::new();
        idx.add(&arc("Madrid"), RowRef::new(1, 0));
        idx.add(&arc("Malaga"), RowRef::new(1, 1));
        idx.add(&arc("Murcia"), RowRef::new(1, 2));

        assert_eq!(total(&idx.prefix_lookup("Ma")), 2);
        assert_eq!(total(&idx.prefix_lookup("M")), 3);
        assert_eq!(total(&idx.prefix_lookup("Z")), 0);
    }

    #[test]
    fn suffix_walk_matches_reversed_anchor() {
        let idx = SuffixIndex::new();
        idx.add("Bogota", RowRef::new(1, 0));
        idx.add("Malaga", RowRef::new(1, 1));
        idx.add("Madrid", RowRef::new(1, 2));

        assert_eq!(total(&idx.suffix_lookup("a")), 2);
        assert_eq!(total(&idx.suffix_lookup("rid")), 1);
    }

    #[test]
    fn remove_clears_entry() {
        let idx = PrefixIndex::new();
        idx.add(&arc("Madrid"), RowRef::new(1, 0));
        idx.remove(&arc("Madrid"), 0);
        assert_eq!(total(&idx.prefix_lookup("Ma")), 0);
    }
}
