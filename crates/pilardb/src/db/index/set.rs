use crate::{
    db::{
        index::{
            composite::{CompositeHashIndex, CompositeRangeIndex},
            hash::HashIndex,
            key::{CompositeKey, KeyAtom},
            range::RangeIndex,
            text::{PrefixIndex, SuffixIndex},
        },
        store::rowref::RowRef,
    },
    model::index::{IndexKind, IndexModel},
    value::Value,
};
use smallvec::SmallVec;

///
/// IndexBackend
///

pub(crate) enum IndexBackend {
    Hash(HashIndex),
    Range(RangeIndex),
    Prefix(PrefixIndex),
    Suffix(SuffixIndex),
    CompositeHash(CompositeHashIndex),
    CompositeRange(CompositeRangeIndex),
}

///
/// IndexEntry
///

pub(crate) struct IndexEntry {
    pub(crate) model: IndexModel,
    pub(crate) backend: IndexBackend,
}

impl IndexEntry {
    fn single_column(&self) -> Option<usize> {
        (!self.model.kind.is_composite()).then(|| self.model.columns[0])
    }

    fn composite_key(&self, values: &[Value]) -> Option<CompositeKey> {
        let tuple: SmallVec<[Value; 4]> = self
            .model
            .columns
            .iter()
            .map(|&c| values[c].clone())
            .collect();
        CompositeKey::from_values(&tuple)
    }

    fn add(&self, values: &[Value], rowref: RowRef) {
        match &self.backend {
            IndexBackend::Hash(idx) => {
                if let Some(key) = KeyAtom::from_value(&values[self.model.columns[0]]) {
                    idx.add(key, rowref);
                }
            }
            IndexBackend::Range(idx) => {
                if let Some(key) = KeyAtom::from_value(&values[self.model.columns[0]]) {
                    idx.add(key, rowref);
                }
            }
            IndexBackend::Prefix(idx) => {
                if let Value::Str(s) = &values[self.model.columns[0]] {
                    idx.add(s, rowref);
                }
            }
            IndexBackend::Suffix(idx) => {
                if let Value::Str(s) = &values[self.model.columns[0]] {
                    idx.add(s.as_str(), rowref);
                }
            }
            IndexBackend::CompositeHash(idx) => {
                if let Some(key) = self.composite_key(values) {
                    idx.add(key, rowref);
                }
            }
            IndexBackend::CompositeRange(idx) => {
                if let Some(key) = self.composite_key(values) {
                    idx.add(key, rowref);
                }
            }
        }
    }

    fn remove(&self, values: &[Value], row: u32) {
        match &self.backend {
            IndexBackend::Hash(idx) => {
                if let Some(key) = KeyAtom::from_value(&values[self.model.columns[0]]) {
                    idx.remove(&key, row);
                }
            }
            IndexBackend::Range(idx) => {
                if let Some(key) = KeyAtom::from_value(&values[self.model.columns[0]]) {
                    idx.remove(&key, row);
                }
            }
            IndexBackend::Prefix(idx) => {
                if let Value::Str(s) = &values[self.model.columns[0]] {
                    idx.remove(s, row);
                }
            }
            IndexBackend::Suffix(idx) => {
                if let Value::Str(s) = &values[self.model.columns[0]] {
                    idx.remove(s.as_str(), row);
                }
            }
            IndexBackend::CompositeHash(idx) => {
                if let Some(key) = self.composite_key(values) {
                    idx.remove(&key, row);
                }
            }
            IndexBackend::CompositeRange(idx) => {
                if let Some(key) = self.composite_key(values) {
                    idx.remove(&key, row);
                }
            }
        }
    }

    /// Whether the keyed columns differ between two row images.
    fn key_changed(&self, old: &[Value], new: &[Value]) -> bool {
        self.model.columns.iter().any(|&c| old[c] != new[c])
    }
}

///
/// IndexSet
///
/// All secondary indexes of one table, in declaration order. Maintenance
/// runs after the row's cells are published, per the write ordering
/// discipline; stale entries left behind by races are filtered by the
/// generation check on the read side.
///

pub(crate) struct IndexSet {
    entries: Vec<IndexEntry>,
}

impl IndexSet {
    pub(crate) fn build(
        models: &[IndexModel],
        enable_prefix: bool,
        enable_suffix: bool,
    ) -> Self {
        let entries = models
            .iter()
            .filter(|m| match m.kind {
                IndexKind::Prefix => enable_prefix,
                IndexKind::Suffix => enable_suffix,
                _ => true,
            })
            .map(|model| {
                let backend = match model.kind {
                    IndexKind::Hash => IndexBackend::Hash(HashIndex::new()),
                    IndexKind::Range => IndexBackend::Range(RangeIndex::new()),
                    IndexKind::Prefix => IndexBackend::Prefix(PrefixIndex::new()),
                    IndexKind::Suffix => IndexBackend::Suffix(SuffixIndex::new()),
                    IndexKind::CompositeHash => {
                        IndexBackend::CompositeHash(CompositeHashIndex::new())
                    }
                    IndexKind::CompositeRange => {
                        IndexBackend::CompositeRange(CompositeRangeIndex::new())
                    }
                };
                IndexEntry {
                    model: model.clone(),
                    backend,
                }
            })
            .collect();

        Self { entries }
    }

    pub(crate) fn insert_row(&self, values: &[Value], rowref: RowRef) {
        for entry in &self.entries {
            entry.add(values, rowref);
        }
    }

    pub(crate) fn remove_row(&self, values: &[Value], row: u32) {
        for entry in &self.entries {
            entry.remove(values, row);
        }
    }

    /// Re-key every index whose columns changed between the two images.
    /// The slot generation is unchanged by an in-place update, so stable
    /// keys need no touch at all.
    pub(crate) fn update_row(&self, old: &[Value], new: &[Value], rowref: RowRef) {
        for entry in &self.entries {
            if entry.key_changed(old, new) {
                entry.remove(old, rowref.row());
                entry.add(new, rowref);
            }
        }
    }

    // ======================================================================
    // Kernel routing
    // ======================================================================

    /// First declared hash index over exactly `column`.
    pub(crate) fn hash_for(&self, column: usize) -> Option<(&'static str, &HashIndex)> {
        self.entries.iter().find_map(|e| match &e.backend {
            IndexBackend::Hash(idx) if e.single_column() == Some(column) => {
                Some((e.model.name, idx))
            }
            _ => None,
        })
    }

    pub(crate) fn range_for(&self, column: usize) -> Option<(&'static str, &RangeIndex)> {
        self.entries.iter().find_map(|e| match &e.backend {
            IndexBackend::Range(idx) if e.single_column() == Some(column) => {
                Some((e.model.name, idx))
            }
            _ => None,
        })
    }

    pub(crate) fn prefix_for(&self, column: usize) -> Option<(&'static str, &PrefixIndex)> {
        self.entries.iter().find_map(|e| match &e.backend {
            IndexBackend::Prefix(idx) if e.single_column() == Some(column) => {
                Some((e.model.name, idx))
            }
            _ => None,
        })
    }

    pub(crate) fn suffix_for(&self, column: usize) -> Option<(&'static str, &SuffixIndex)> {
        self.entries.iter().find_map(|e| match &e.backend {
            IndexBackend::Suffix(idx) if e.single_column() == Some(column) => {
                Some((e.model.name, idx))
            }
            _ => None,
        })
    }

    /// Composite entries in declaration order, with their backends.
    pub(crate) fn composites(&self) -> impl Iterator<Item = &IndexEntry> {
        self.entries.iter().filter(|e| e.model.kind.is_composite())
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;
    use smallvec::smallvec;

    fn models() -> Vec<IndexModel> {
        vec![
            IndexModel {
                name: "age_range",
                kind: IndexKind::Range,
                fields: smallvec!["age"],
                columns: smallvec![1],
            },
            IndexModel {
                name: "name_prefix",
                kind: IndexKind::Prefix,
                fields: smallvec!["name"],
                columns: smallvec![0],
            },
        ]
    }

    fn row(name: &str, age: i64) -> Vec<Value> {
        vec![Value::from(name), Value::Long(age)]
    }

    #[test]
    fn disabled_kinds_are_not_built() {
        let set = IndexSet::build(&models(), false, true);
        assert!(set.prefix_for(0).is_none());
        assert!(set.range_for(1).is_some());
    }

    #[test]
    fn update_rekeys_only_changed_columns() {
        let set = IndexSet::build(&models(), true, true);
        let r = RowRef::new(1, 0);
        set.insert_row(&row("ana", 30), r);

        let old_key = KeyAtom::from_value(&Value::Long(30)).unwrap();
        let (_, range) = set.range_for(1).unwrap();
        assert_eq!(range.lookup(&old_key).unwrap().len(), 1);

        // Same name, new age: only the range index moves.
        set.update_row(&row("ana", 30), &row("ana", 31), r);
        assert!(range.lookup(&old_key).is_none_or(|p| p.is_empty()));
        let new_key = KeyAtom::from_value(&Value::Long(31)).unwrap();
        assert_eq!(range.lookup(&new_key).unwrap().len(), 1);

        set.remove_row(&row("ana", 31), r.row());
        assert!(range.lookup(&new_key).is_none_or(|p| p.is_empty()));
    }

    #[test]
    fn null_keys_are_not_indexed() {
        let set = IndexSet::build(&models(), true, true);
        set.insert_row(&[Value::Null, Value::Null], RowRef::new(1, 0));
        let key = KeyAtom::from_value(&Value::Long(0)).unwrap();
        assert!(set.range_for(1).unwrap().1.lookup(&key).is_none());
    }
}
