use crate::db::{
    index::{
        key::KeyAtom,
        posting::{Posting, PostingCell},
    },
    store::rowref::RowRef,
};
use dashmap::DashMap;
use std::sync::Arc;
use xxhash_rust::xxh3::Xxh3Builder;

///
/// HashIndex
///
/// Key -> posting, O(1) point lookup. The map is sharded-concurrent; the
/// per-key posting is a copy-on-write snapshot, so lookups hold no lock
/// while they consume their result.
///

pub(crate) struct HashIndex {
    map: DashMap<KeyAtom, Arc<PostingCell>, Xxh3Builder>,
}

impl HashIndex {
    pub(crate) fn new() -> Self {
        Self {
            map: DashMap::with_hasher(Xxh3Builder::new()),
        }
    }

    pub(crate) fn add(&self, key: KeyAtom, rowref: RowRef) {
        let cell = {
            let entry = self
                .map
                .entry(key)
                .or_insert_with(|| Arc::new(PostingCell::new()));
            Arc::clone(entry.value())
        };
        cell.add(rowref);
    }

    pub(crate) fn remove(&self, key: &KeyAtom, row: u32) {
        if let Some(cell) = self.map.get(key).map(|entry| Arc::clone(entry.value())) {
            cell.remove(row);
        }
    }

    pub(crate) fn lookup(&self, key: &KeyAtom) -> Option<Arc<Posting>> {
        self.map.get(key).map(|entry| entry.value().load())
    }

    #[cfg(test)]
    pub(crate) fn key_count(&self) -> usize {
        self.map.len()
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_lookup_remove() {
        let idx = HashIndex::new();
        let key = KeyAtom::Word(42);
        idx.add(key.clone(), RowRef::new(1, 7));
        idx.add(key.clone(), RowRef::new(1, 9));

        let posting = idx.lookup(&key).unwrap();
        assert_eq!(posting.len(), 2);

        idx.remove(&key, 7);
        assert_eq!(idx.lookup(&key).unwrap().len(), 1);
        assert!(idx.lookup(&KeyAtom::Word(1)).is_none());
        assert_eq!(idx.key_count(), 1);
    }
}
