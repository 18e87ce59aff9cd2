use crate::db::store::rowref::RowRef;

/// Result sets larger than this migrate to the bitset representation on
/// union; smaller sets stay as sparse ref arrays.
const DENSE_CUTOFF: usize = 4096;

///
/// Selection
///
/// A set of matched rows. Sparse selections carry full `RowRef`s in match
/// order; dense selections are a bitset over row ids and re-stamp
/// generations at iteration time. `intersect` and `union` pick the cheaper
/// representation per call.
///

pub enum Selection {
    Sparse(Vec<RowRef>),
    Dense(RowBits),
}

impl Selection {
    #[must_use]
    pub const fn empty() -> Self {
        Self::Sparse(Vec::new())
    }

    #[must_use]
    pub fn from_refs(refs: Vec<RowRef>) -> Self {
        Self::Sparse(refs)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        match self {
            Self::Sparse(refs) => refs.len(),
            Self::Dense(bits) => bits.len,
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the selection was produced through the bitset path, which
    /// drops generation stamps.
    #[must_use]
    pub const fn is_dense(&self) -> bool {
        matches!(self, Self::Dense(_))
    }

    #[must_use]
    pub fn contains_row(&self, row: u32) -> bool {
        match self {
            Self::Sparse(refs) => refs.iter().any(|r| r.row() == row),
            Self::Dense(bits) => bits.get(row),
        }
    }

    /// Row ids in this selection; ascending for dense, match order for
    /// sparse.
    pub fn for_each_row(&self, mut f: impl FnMut(u32)) {
        match self {
            Self::Sparse(refs) => refs.iter().for_each(|r| f(r.row())),
            Self::Dense(bits) => bits.for_each(&mut f),
        }
    }

    /// Materialize as `RowRef`s, stamping dense rows through `stamp`.
    #[must_use]
    pub fn into_refs(self, stamp: impl Fn(u32) -> RowRef) -> Vec<RowRef> {
        match self {
            Self::Sparse(refs) => refs,
            Self::Dense(bits) => {
                let mut out = Vec::with_capacity(bits.len);
                bits.for_each(&mut |row| out.push(stamp(row)));
                out
            }
        }
    }

    /// Set intersection; keeps the left side's generation stamps where it
    /// can.
    #[must_use]
    pub fn intersect(self, other: &Self) -> Self {
        match self {
            Self::Sparse(refs) => match other {
                Self::Sparse(rhs) => {
                    let keep: std::collections::HashSet<u32> =
                        rhs.iter().map(|r| r.row()).collect();
                    Self::Sparse(
                        refs.into_iter().filter(|r| keep.contains(&r.row())).collect(),
                    )
                }
                Self::Dense(bits) => {
                    Self::Sparse(refs.into_iter().filter(|r| bits.get(r.row())).collect())
                }
            },
            Self::Dense(mut bits) => match other {
                Self::Dense(rhs) => {
                    bits.and(rhs);
                    Self::Dense(bits)
                }
                Self::Sparse(refs) => Self::Sparse(
                    refs.iter().copied().filter(|r| bits.get(r.row())).collect(),
                ),
            },
        }
    }

    /// Set union; upgrades to the bitset representation when the combined
    /// size crosses the cutoff.
    #[must_use]
    pub fn union(self, other: Self) -> Self {
        match (self, other) {
            (Self::Dense(mut lhs), rhs) => {
                rhs.for_each_row(|row| lhs.set(row));
                Self::Dense(lhs)
            }
            (lhs, Self::Dense(mut rhs)) => {
                lhs.for_each_row(|row| rhs.set(row));
                Self::Dense(rhs)
            }
            (Self::Sparse(mut lhs), Self::Sparse(rhs)) => {
                if lhs.len() + rhs.len() > DENSE_CUTOFF {
                    let mut bits = RowBits::default();
                    for r in lhs.iter().chain(rhs.iter()) {
                        bits.set(r.row());
                    }
                    Self::Dense(bits)
                } else {
                    let mut seen: std::collections::HashSet<u32> =
                        lhs.iter().map(|r| r.row()).collect();
                    for r in rhs {
                        if seen.insert(r.row()) {
                            lhs.push(r);
                        }
                    }
                    Self::Sparse(lhs)
                }
            }
        }
    }
}

///
/// RowBits
///
/// Growable bitset over row ids with a cached population count.
///

#[derive(Default)]
pub struct RowBits {
    words: Vec<u64>,
    len: usize,
}

impl RowBits {
    pub fn set(&mut self, row: u32) {
        let (word, mask) = (row as usize / 64, 1u64 << (row % 64));
        if word >= self.words.len() {
            self.words.resize(word + 1, 0);
        }
        if self.words[word] & mask == 0 {
            self.words[word] |= mask;
            self.len += 1;
        }
    }

    #[must_use]
    pub fn get(&self, row: u32) -> bool {
        let (word, mask) = (row as usize / 64, 1u64 << (row % 64));
        self.words.get(word).is_some_and(|w| w & mask != 0)
    }

    fn and(&mut self, other: &Self) {
        let keep = self.words.len().min(other.words.len());
        self.words.truncate(keep);
        for (i, word) in self.words.iter_mut().enumerate() {
            *word &= other.words[i];
        }
        self.len = self.words.iter().map(|w| w.count_ones() as usize).sum();
    }

    fn for_each(&self, f: &mut impl FnMut(u32)) {
        for (i, &word) in self.words.iter().enumerate() {
            let mut bits = word;
            while bits != 0 {
                let offset = bits.trailing_zeros();
                #[allow(clippy::cast_possible_truncation)]
                f((i * 64) as u32 + offset);
                bits &= bits - 1;
            }
        }
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    fn refs(rows: &[u32]) -> Vec<RowRef> {
        rows.iter().map(|&r| RowRef::new(1, r)).collect()
    }

    fn rows_of(sel: &Selection) -> Vec<u32> {
        let mut out = Vec::new();
        sel.for_each_row(|r| out.push(r));
        out.sort_unstable();
        out
    }

    #[test]
    fn sparse_intersect_keeps_common_rows() {
        let a = Selection::from_refs(refs(&[1, 2, 3]));
        let b = Selection::from_refs(refs(&[2, 3, 4]));
        assert_eq!(rows_of(&a.intersect(&b)), vec![2, 3]);
    }

    #[test]
    fn sparse_union_dedupes() {
        let a = Selection::from_refs(refs(&[1, 2]));
        let b = Selection::from_refs(refs(&[2, 3]));
        let u = a.union(b);
        assert_eq!(rows_of(&u), vec![1, 2, 3]);
        assert!(!u.is_dense());
    }

    #[test]
    fn large_union_upgrades_to_dense() {
        let a = Selection::from_refs(refs(&(0..3000).collect::<Vec<_>>()));
        let b = Selection::from_refs(refs(&(2000..6000).collect::<Vec<_>>()));
        let u = a.union(b);
        assert!(u.is_dense());
        assert_eq!(u.len(), 6000);
    }

    #[test]
    fn dense_intersect_counts_population() {
        let mut a = RowBits::default();
        let mut b = RowBits::default();
        for r in [1u32, 64, 65, 200] {
            a.set(r);
        }
        for r in [64u32, 200, 300] {
            b.set(r);
        }
        let got = Selection::Dense(a).intersect(&Selection::Dense(b));
        assert_eq!(rows_of(&got), vec![64, 200]);
        assert_eq!(got.len(), 2);
    }

    #[test]
    fn into_refs_stamps_dense_rows() {
        let mut bits = RowBits::default();
        bits.set(5);
        bits.set(9);
        let refs = Selection::Dense(bits).into_refs(|row| RowRef::new(7, row));
        assert_eq!(refs, vec![RowRef::new(7, 5), RowRef::new(7, 9)]);
    }
}
