use crate::MAX_INDEX_FIELDS;
use smallvec::SmallVec;
use std::fmt::{self, Display};

///
/// IndexKind
///
/// Declared index variants. Single-field kinds accelerate one column;
/// composite kinds key on an ordered field tuple and are only consulted
/// when a query binds the full prefix.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum IndexKind {
    Hash,
    Range,
    Prefix,
    Suffix,
    CompositeHash,
    CompositeRange,
}

impl IndexKind {
    #[must_use]
    pub const fn is_composite(self) -> bool {
        matches!(self, Self::CompositeHash | Self::CompositeRange)
    }

    #[must_use]
    pub const fn is_text(self) -> bool {
        matches!(self, Self::Prefix | Self::Suffix)
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Hash => "hash",
            Self::Range => "range",
            Self::Prefix => "prefix",
            Self::Suffix => "suffix",
            Self::CompositeHash => "composite_hash",
            Self::CompositeRange => "composite_range",
        }
    }
}

///
/// IndexModel
///
/// Runtime descriptor for one index, with field paths resolved to column
/// positions at table generation. Field order is significant for composite
/// kinds.
///

#[derive(Clone, Debug)]
pub struct IndexModel {
    /// Stable index name used for diagnostics and planner identity.
    pub name: &'static str,
    pub kind: IndexKind,
    pub fields: SmallVec<[&'static str; MAX_INDEX_FIELDS]>,
    pub columns: SmallVec<[usize; MAX_INDEX_FIELDS]>,
}

impl IndexModel {
    /// Whether this index's field prefix matches the start of another index.
    #[must_use]
    pub fn is_prefix_of(&self, other: &Self) -> bool {
        self.columns.len() < other.columns.len() && other.columns.starts_with(&self.columns)
    }
}

impl Display for IndexModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}({})", self.name, self.kind.name(), self.fields.join(", "))
    }
}
