use crate::db::store::rowref::RowRef;
use arc_swap::ArcSwap;
use std::sync::Arc;

/// Posting sets larger than this upgrade from a sorted ref array to a
/// bitset keyed on row id.
const BITSET_THRESHOLD: usize = 256;

///
/// Posting
///
/// Immutable snapshot of the rows filed under one index key. `Refs` keeps
/// packed `RowRef`s sorted by row id, so readers get the expected
/// generation for free; the bitset form drops generations and marks itself
/// as needing a driver-side recheck instead.
///

pub(crate) enum Posting {
    Refs(Box<[u64]>),
    Bits { words: Box<[u64]>, len: usize },
}

impl Posting {
    pub(crate) fn empty() -> Self {
        Self::Refs(Box::from([]))
    }

    pub(crate) fn len(&self) -> usize {
        match self {
            Self::Refs(refs) => refs.len(),
            Self::Bits { len, .. } => *len,
        }
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Bitset postings lose generation stamps; the kernel re-verifies the
    /// driving condition against the column for those.
    pub(crate) const fn needs_recheck(&self) -> bool {
        matches!(self, Self::Bits { .. })
    }

    fn position(refs: &[u64], row: u32) -> Result<usize, usize> {
        refs.binary_search_by_key(&row, |bits| RowRef::from_bits(*bits).row())
    }

    /// Snapshot with `rowref` present; an existing entry for the same row
    /// is replaced so the newest generation wins.
    pub(crate) fn with_added(&self, rowref: RowRef) -> Self {
        match self {
            Self::Refs(refs) => {
                let mut rows: Vec<u64> = refs.to_vec();
                match Self::position(refs, rowref.row()) {
                    Ok(i) => rows[i] = rowref.bits(),
                    Err(i) => rows.insert(i, rowref.bits()),
                }
                if rows.len() > BITSET_THRESHOLD {
                    let mut bits = Self::empty_bits();
                    for bitsval in &rows {
                        bits.set_bit(RowRef::from_bits(*bitsval).row());
                    }
                    bits
                } else {
                    Self::Refs(rows.into_boxed_slice())
                }
            }
            Self::Bits { words, len } => {
                let mut next = Self::Bits {
                    words: words.clone(),
                    len: *len,
                };
                next.set_bit(rowref.row());
                next
            }
        }
    }

    /// Snapshot with any entry for `row` gone.
    pub(crate) fn with_removed(&self, row: u32) -> Self {
        match self {
            Self::Refs(refs) => match Self::position(refs, row) {
                Ok(i) => {
                    let mut rows = refs.to_vec();
                    rows.remove(i);
                    Self::Refs(rows.into_boxed_slice())
                }
                Err(_) => Self::Refs(refs.clone()),
            },
            Self::Bits { words, len } => {
                let (word, mask) = (row as usize / 64, 1u64 << (row % 64));
                let mut words = words.clone();
                let mut len = *len;
                if let Some(w) = words.get_mut(word)
                    && *w & mask != 0
                {
                    *w &= !mask;
                    len -= 1;
                }
                Self::Bits { words, len }
            }
        }
    }

    fn empty_bits() -> Self {
        Self::Bits {
            words: Box::from([]),
            len: 0,
        }
    }

    fn set_bit(&mut self, row: u32) {
        let Self::Bits { words, len } = self else {
            unreachable!()
        };
        let (word, mask) = (row as usize / 64, 1u64 << (row % 64));
        if word >= words.len() {
            let mut grown = vec![0u64; word + 1];
            grown[..words.len()].copy_from_slice(words);
            *words = grown.into_boxed_slice();
        }
        if words[word] & mask == 0 {
            words[word] |= mask;
            *len += 1;
        }
    }

    /// Append this posting's rows, stamping bitset rows through `stamp`.
    pub(crate) fn collect_into(&self, out: &mut Vec<RowRef>, stamp: &impl Fn(u32) -> RowRef) {
        match self {
            Self::Refs(refs) => out.extend(refs.iter().map(|bits| RowRef::from_bits(*bits))),
            Self::Bits { words, .. } => {
                for (i, &word) in words.iter().enumerate() {
                    let mut bits = word;
                    while bits != 0 {
                        let offset = bits.trailing_zeros();
                        #[allow(clippy::cast_possible_truncation)]
                        out.push(stamp((i * 64) as u32 + offset));
                        bits &= bits - 1;
                    }
                }
            }
        }
    }
}

///
/// PostingCell
///
/// The mutable slot holding the current snapshot. Mutation is a
/// compare-and-swap loop replacing the whole snapshot; readers keep
/// whatever snapshot they loaded and are never blocked.
///

pub(crate) struct PostingCell(ArcSwap<Posting>);

impl PostingCell {
    pub(crate) fn new() -> Self {
        Self(ArcSwap::from_pointee(Posting::empty()))
    }

    pub(crate) fn load(&self) -> Arc<Posting> {
        self.0.load_full()
    }

    pub(crate) fn add(&self, rowref: RowRef) {
        self.update(|p| p.with_added(rowref));
    }

    pub(crate) fn remove(&self, row: u32) {
        self.update(|p| p.with_removed(row));
    }

    fn update(&self, f: impl Fn(&Posting) -> Posting) {
        let mut current = self.0.load_full();
        loop {
            let next = Arc::new(f(&current));
            let previous = self.0.compare_and_swap(&current, next);
            if Arc::ptr_eq(&*previous, &current) {
                return;
            }
            current = Arc::clone(&*previous);
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    fn rows(p: &Posting) -> Vec<u32> {
        let mut out = Vec::new();
        p.collect_into(&mut out, &|row| RowRef::new(0, row));
        let mut rows: Vec<u32> = out.iter().map(|r| r.row()).collect();
        rows.sort_unstable();
        rows
    }

    #[test]
    fn add_replaces_same_row_with_newer_generation() {
        let p = Posting::empty()
            .with_added(RowRef::new(1, 5))
            .with_added(RowRef::new(2, 5));
        assert_eq!(p.len(), 1);
        let mut out = Vec::new();
        p.collect_into(&mut out, &|row| RowRef::new(0, row));
        assert_eq!(out[0].generation(), 2);
    }

    #[test]
    fn remove_is_noop_for_missing_row() {
        let p = Posting::empty().with_added(RowRef::new(1, 5));
        let p = p.with_removed(9);
        assert_eq!(rows(&p), vec![5]);
    }

    #[test]
    fn large_postings_upgrade_to_bitset() {
        let mut p = Posting::empty();
        for row in 0..300 {
            p = p.with_added(RowRef::new(1, row));
        }
        assert!(p.needs_recheck());
        assert_eq!(p.len(), 300);
        assert_eq!(rows(&p), (0..300).collect::<Vec<_>>());
    }

    #[test]
    fn cell_mutation_is_copy_on_write() {
        let cell = PostingCell::new();
        let before = cell.load();
        cell.add(RowRef::new(1, 3));
        assert!(before.is_empty());
        assert_eq!(cell.load().len(), 1);
        cell.remove(3);
        assert!(cell.load().is_empty());
    }

    #[test]
    fn concurrent_adds_lose_nothing() {
        use std::thread;
        let cell = std::sync::Arc::new(PostingCell::new());
        let mut handles = Vec::new();
        for t in 0..4u32 {
            let cell = std::sync::Arc::clone(&cell);
            handles.push(thread::spawn(move || {
                for i in 0..500u32 {
                    cell.add(RowRef::new(1, t * 1000 + i));
                }
            }));
        }
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(cell.load().len(), 2000);
    }
}
