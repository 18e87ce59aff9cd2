use crate::{MAX_INDEX_FIELDS, db::store::column::encode_word, value::Value};
use smallvec::SmallVec;
use std::sync::Arc;

///
/// KeyAtom
///
/// One index key component. Word atoms hold the order-preserving encoded
/// cell word, so `Ord` on atoms matches numeric order for numeric columns;
/// string atoms order lexicographically. Null cells produce no atom: rows
/// with a null key simply do not appear in that index.
///

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub(crate) enum KeyAtom {
    Word(u64),
    Str(Arc<String>),
}

impl KeyAtom {
    pub(crate) fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null | Value::List(_) => None,
            Value::Str(s) => Some(Self::Str(Arc::clone(s))),
            scalar => Some(Self::Word(encode_word(scalar))),
        }
    }
}

///
/// CompositeKey
///
/// Ordered tuple of atoms for composite indexes; `Ord` is lexicographic
/// over the components, which makes equality-prefix + range-tail lookups a
/// contiguous map range.
///

#[derive(Clone, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub(crate) struct CompositeKey(pub(crate) SmallVec<[KeyAtom; MAX_INDEX_FIELDS]>);

impl CompositeKey {
    pub(crate) fn from_values(values: &[Value]) -> Option<Self> {
        let mut atoms = SmallVec::new();
        for value in values {
            atoms.push(KeyAtom::from_value(value)?);
        }
        Some(Self(atoms))
    }

    pub(crate) fn starts_with(&self, prefix: &[KeyAtom]) -> bool {
        self.0.len() >= prefix.len() && self.0[..prefix.len()] == *prefix
    }
}

///
/// TESTS
///
