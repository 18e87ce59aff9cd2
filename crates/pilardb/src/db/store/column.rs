use crate::{
    db::store::page::{PagedBits, PagedWords},
    error::StoreError,
    model::field::TypeCode,
    value::Value,
};
use arc_swap::ArcSwapOption;
use smallvec::SmallVec;
use std::sync::{
    Arc, OnceLock,
    atomic::{AtomicU32, Ordering},
};

const SIGN: u64 = 1 << 63;

/// Order-preserving word encoding for a signed 64-bit integer.
pub(crate) const fn encode_i64(v: i64) -> u64 {
    (v as u64) ^ SIGN
}

pub(crate) const fn decode_i64(w: u64) -> i64 {
    (w ^ SIGN) as i64
}

/// Order-preserving word encoding for an IEEE-754 double: positives get the
/// sign bit set, negatives are bitwise-complemented, so unsigned `<` on
/// encoded words matches numeric order (NaN sorts above +inf).
pub(crate) const fn encode_f64(v: f64) -> u64 {
    let bits = v.to_bits();
    if bits & SIGN == 0 { bits | SIGN } else { !bits }
}

pub(crate) const fn decode_f64(w: u64) -> f64 {
    if w & SIGN == 0 {
        f64::from_bits(!w)
    } else {
        f64::from_bits(w & !SIGN)
    }
}

/// Encode a type-matched scalar into its column word.
pub(crate) fn encode_word(value: &Value) -> u64 {
    match value {
        Value::Int(v) => encode_i64(i64::from(*v)),
        Value::Long(v) => encode_i64(*v),
        Value::Byte(v) => encode_i64(i64::from(*v)),
        Value::Short(v) => encode_i64(i64::from(*v)),
        Value::Bool(v) => u64::from(*v),
        Value::Char(v) => u64::from(u32::from(*v)),
        Value::Float(v) => encode_f64(f64::from(*v)),
        Value::Double(v) => encode_f64(*v),
        Value::Null | Value::Str(_) | Value::List(_) => {
            debug_assert!(false, "encode_word on non-word value");
            0
        }
    }
}

/// Decode a column word back into the typed scalar.
#[allow(clippy::cast_possible_truncation)]
pub(crate) fn decode_word(code: TypeCode, w: u64) -> Value {
    match code {
        TypeCode::INT => Value::Int(decode_i64(w) as i32),
        TypeCode::LONG => Value::Long(decode_i64(w)),
        TypeCode::BYTE => Value::Byte(decode_i64(w) as i8),
        TypeCode::SHORT => Value::Short(decode_i64(w) as i16),
        TypeCode::BOOL => Value::Bool(w != 0),
        TypeCode::CHAR => Value::Char(char::from_u32(w as u32).unwrap_or('\u{0}')),
        TypeCode::FLOAT => Value::Float(decode_f64(w) as f32),
        TypeCode::DOUBLE => Value::Double(decode_f64(w)),
        _ => Value::Null,
    }
}

///
/// WordPred
/// Primitive predicate applied inside a word-column scan loop.
/// Bounds are encoded words; `Range` is inclusive on both ends.
///

pub(crate) enum WordPred {
    Eq(u64),
    Ne(u64),
    Range { lo: u64, hi: u64 },
    In(SmallVec<[u64; 4]>),
    NotIn(SmallVec<[u64; 4]>),
}

impl WordPred {
    #[inline]
    pub(crate) fn matches(&self, w: u64) -> bool {
        match self {
            Self::Eq(x) => w == *x,
            Self::Ne(x) => w != *x,
            Self::Range { lo, hi } => *lo <= w && w <= *hi,
            Self::In(xs) => xs.contains(&w),
            Self::NotIn(xs) => !xs.contains(&w),
        }
    }
}

///
/// StrPred
/// Primitive predicate applied inside a string-column scan loop.
/// Case-insensitive variants carry the already-folded needle.
///

pub(crate) enum StrPred {
    Eq(Arc<String>),
    EqIgnoreCase(String),
    Ne(Arc<String>),
    NeIgnoreCase(String),
    In(Vec<Arc<String>>),
    NotIn(Vec<Arc<String>>),
    StartsWith(String),
    StartsWithCi(String),
    EndsWith(String),
    EndsWithCi(String),
    Contains(String),
    ContainsCi(String),
    NotContains(String),
    NotContainsCi(String),
    /// Lexicographic range; each bound carries its inclusivity.
    Range {
        lo: Option<(String, bool)>,
        hi: Option<(String, bool)>,
    },
}

impl StrPred {
    #[inline]
    pub(crate) fn matches(&self, s: &str) -> bool {
        match self {
            Self::Eq(x) => s == x.as_str(),
            Self::EqIgnoreCase(folded) => s.to_lowercase() == *folded,
            Self::Ne(x) => s != x.as_str(),
            Self::NeIgnoreCase(folded) => s.to_lowercase() != *folded,
            Self::In(xs) => xs.iter().any(|x| s == x.as_str()),
            Self::NotIn(xs) => !xs.iter().any(|x| s == x.as_str()),
            Self::StartsWith(p) => s.starts_with(p.as_str()),
            Self::StartsWithCi(p) => s.to_lowercase().starts_with(p.as_str()),
            Self::EndsWith(p) => s.ends_with(p.as_str()),
            Self::EndsWithCi(p) => s.to_lowercase().ends_with(p.as_str()),
            Self::Contains(p) => s.contains(p.as_str()),
            Self::ContainsCi(p) => s.to_lowercase().contains(p.as_str()),
            Self::NotContains(p) => !s.contains(p.as_str()),
            Self::NotContainsCi(p) => !s.to_lowercase().contains(p.as_str()),
            Self::Range { lo, hi } => {
                let above = lo.as_ref().is_none_or(|(bound, inclusive)| {
                    if *inclusive { s >= bound.as_str() } else { s > bound.as_str() }
                });
                let below = hi.as_ref().is_none_or(|(bound, inclusive)| {
                    if *inclusive { s <= bound.as_str() } else { s < bound.as_str() }
                });
                above && below
            }
        }
    }
}

///
/// PagedStrings
///
/// Lazily allocated pages of swap-on-write shared string cells.
///

struct PagedStrings {
    pages: Box<[OnceLock<Box<[ArcSwapOption<String>]>>]>,
    page_size: usize,
}

impl PagedStrings {
    fn new(page_size: usize, max_pages: usize) -> Self {
        let pages = (0..max_pages).map(|_| OnceLock::new()).collect();
        Self { pages, page_size }
    }

    fn slot(&self, row: u32) -> Result<&ArcSwapOption<String>, StoreError> {
        let (page, offset) = (row as usize / self.page_size, row as usize % self.page_size);
        let cells = self
            .pages
            .get(page)
            .ok_or(StoreError::CapacityExceeded {
                pages: self.pages.len(),
                page_size: self.page_size,
            })?
            .get_or_init(|| {
                (0..self.page_size)
                    .map(|_| ArcSwapOption::const_empty())
                    .collect()
            });
        Ok(&cells[offset])
    }

    fn get(&self, row: u32) -> Option<Arc<String>> {
        let (page, offset) = (row as usize / self.page_size, row as usize % self.page_size);
        self.pages
            .get(page)
            .and_then(OnceLock::get)
            .and_then(|cells| cells[offset].load_full())
    }

    /// Drop the cell's payload without allocating an untouched page.
    fn clear(&self, row: u32) {
        let (page, offset) = (row as usize / self.page_size, row as usize % self.page_size);
        if let Some(cells) = self.pages.get(page).and_then(OnceLock::get) {
            cells[offset].store(None);
        }
    }

    fn allocated_pages(&self) -> usize {
        self.pages.iter().filter(|p| p.get().is_some()).count()
    }
}

///
/// Cells
///

enum Cells {
    Words(PagedWords),
    Strings(PagedStrings),
}

///
/// PagedColumn
///
/// Append-mostly typed store for one column. Cell writes do not advance
/// `published`; a writer publishes explicitly once every cell of the row is
/// in place, and scans only ever visit rows strictly below the watermark.
///

pub(crate) struct PagedColumn {
    type_code: TypeCode,
    nullable: bool,
    cells: Cells,
    present: PagedBits,
    published: AtomicU32,
}

impl PagedColumn {
    pub(crate) fn new(
        type_code: TypeCode,
        nullable: bool,
        page_size: usize,
        max_pages: usize,
    ) -> Self {
        let cells = if type_code.is_word() {
            Cells::Words(PagedWords::new(page_size, max_pages))
        } else {
            Cells::Strings(PagedStrings::new(page_size, max_pages))
        };
        Self {
            type_code,
            nullable,
            cells,
            present: PagedBits::new(page_size, max_pages),
            published: AtomicU32::new(0),
        }
    }

    /// Write one cell. Does not advance the watermark.
    pub(crate) fn set(&self, row: u32, value: &Value) -> Result<(), StoreError> {
        if value.is_null() {
            debug_assert!(self.nullable, "null write to non-nullable column");
            match &self.cells {
                Cells::Words(words) => words.store(row, 0, Ordering::Release)?,
                Cells::Strings(strings) => strings.slot(row)?.store(None),
            }
            self.present.clear(row)?;
            return Ok(());
        }

        match (&self.cells, value) {
            (Cells::Strings(strings), Value::Str(s)) => {
                strings.slot(row)?.store(Some(Arc::clone(s)));
            }
            (Cells::Strings(_), _) | (Cells::Words(_), Value::Str(_) | Value::List(_)) => {
                debug_assert!(false, "type-mismatched cell write");
            }
            (Cells::Words(words), scalar) => {
                words.store(row, encode_word(scalar), Ordering::Release)?;
            }
        }
        self.present.set(row)?;
        Ok(())
    }

    /// Monotonic watermark advance; release-ordered so a scan that observes
    /// the new bound also observes every cell write below it.
    pub(crate) fn publish(&self, up_to: u32) {
        self.published.fetch_max(up_to, Ordering::Release);
    }

    pub(crate) fn published(&self) -> u32 {
        self.published.load(Ordering::Acquire)
    }

    /// Whether the cell has a present (non-null) value.
    pub(crate) fn has_value(&self, row: u32) -> bool {
        self.present.get(row)
    }

    /// Unconditional typed read; callers guard with the seqlock or a
    /// generation check as appropriate.
    pub(crate) fn read(&self, row: u32) -> Value {
        if !self.present.get(row) {
            return Value::Null;
        }
        match &self.cells {
            Cells::Words(words) => decode_word(self.type_code, words.load(row, Ordering::Acquire)),
            Cells::Strings(strings) => strings.get(row).map_or(Value::Null, Value::Str),
        }
    }

    /// Raw encoded word, `None` when null. Word columns only.
    pub(crate) fn read_word(&self, row: u32) -> Option<u64> {
        if !self.present.get(row) {
            return None;
        }
        match &self.cells {
            Cells::Words(words) => Some(words.load(row, Ordering::Acquire)),
            Cells::Strings(_) => None,
        }
    }

    pub(crate) fn read_str(&self, row: u32) -> Option<Arc<String>> {
        if !self.present.get(row) {
            return None;
        }
        match &self.cells {
            Cells::Strings(strings) => strings.get(row),
            Cells::Words(_) => None,
        }
    }

    /// Tight scan over `[0, published)` applying a word predicate, skipping
    /// tombstoned and null rows.
    pub(crate) fn scan_words(&self, tombstones: &PagedBits, pred: &WordPred, out: &mut Vec<u32>) {
        let Cells::Words(words) = &self.cells else {
            return;
        };
        let bound = self.published();
        for row in 0..bound {
            if tombstones.get(row) || !self.present.get(row) {
                continue;
            }
            if pred.matches(words.load(row, Ordering::Acquire)) {
                out.push(row);
            }
        }
    }

    /// Tight scan applying a string predicate.
    pub(crate) fn scan_strings(&self, tombstones: &PagedBits, pred: &StrPred, out: &mut Vec<u32>) {
        let Cells::Strings(strings) = &self.cells else {
            return;
        };
        let bound = self.published();
        for row in 0..bound {
            if tombstones.get(row) || !self.present.get(row) {
                continue;
            }
            if let Some(s) = strings.get(row)
                && pred.matches(s.as_str())
            {
                out.push(row);
            }
        }
    }

    /// Drop any stale value left by a previous tenant of the slot. Runs
    /// under the row seqlock during slot recycling, before the tombstone
    /// lifts.
    pub(crate) fn reset_slot(&self, row: u32) -> Result<(), StoreError> {
        if let Cells::Strings(strings) = &self.cells {
            strings.clear(row);
        }
        self.present.clear(row)?;
        Ok(())
    }

    /// Pages currently resident, for storage reports.
    pub(crate) fn allocated_pages(&self) -> usize {
        match &self.cells {
            Cells::Words(words) => words.allocated_pages(),
            Cells::Strings(strings) => strings.allocated_pages(),
        }
    }

    pub(crate) fn page_size(&self) -> usize {
        match &self.cells {
            Cells::Words(words) => words.page_size(),
            Cells::Strings(strings) => strings.page_size,
        }
    }
}

///
/// TESTS
///
