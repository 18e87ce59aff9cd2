use crate::{
    db::{
        query::compiled::ColumnCondition,
        store::{
            column::{StrPred, WordPred, encode_word},
            table::Table,
        },
    },
    error::{Error, PlanError},
    model::field::TypeCode,
    query::Operator,
    value::Value,
};
use smallvec::SmallVec;
use std::sync::Arc;

///
/// CellTest
///
/// A condition with its arguments bound, coerced, and encoded, ready to
/// run inside a scan loop or against a single cell. Built once per
/// execution, never per row.
///

pub(crate) enum CellTest {
    Word(WordPred),
    Str(StrPred),
    Null { want_null: bool },
    /// Statically unsatisfiable (empty IN list, Gt on the maximum word).
    Never,
}

/// Bind and encode one condition's arguments.
pub(crate) fn build_cell_test(cond: &ColumnCondition, args: &[Value]) -> Result<CellTest, Error> {
    let op = cond.op;

    match op {
        Operator::IsNull => return Ok(CellTest::Null { want_null: true }),
        Operator::IsNotNull => return Ok(CellTest::Null { want_null: false }),
        _ => {}
    }

    let arg = coerce_arg(cond, args, 0)?;

    // A null comparison argument degrades to a null test; null never
    // matches an ordering or anchor operator.
    if arg.is_null() && !matches!(op, Operator::In | Operator::NotIn) {
        return Ok(match op {
            Operator::Eq => CellTest::Null { want_null: true },
            Operator::Ne => CellTest::Null { want_null: false },
            _ => CellTest::Never,
        });
    }

    if cond.type_code == TypeCode::STRING {
        build_str_test(cond, &arg, args)
    } else {
        build_word_test(cond, &arg, args)
    }
}

fn coerce_arg(cond: &ColumnCondition, args: &[Value], offset: usize) -> Result<Value, Error> {
    let slot = cond.arg_base + offset;
    let raw = &args[slot];

    // IN arguments stay as lists; elements coerce individually.
    if matches!(cond.op, Operator::In | Operator::NotIn) {
        return match raw {
            Value::List(items) => {
                let coerced = items
                    .iter()
                    .map(|item| {
                        item.coerce_to(cond.type_code).ok_or(PlanError::ArgumentType {
                            slot,
                            type_code: cond.type_code,
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(Value::List(coerced))
            }
            other => other
                .coerce_to(cond.type_code)
                .map(|v| Value::List(vec![v]))
                .ok_or_else(|| {
                    PlanError::ArgumentType {
                        slot,
                        type_code: cond.type_code,
                    }
                    .into()
                }),
        };
    }

    raw.coerce_to(cond.type_code)
        .ok_or_else(|| {
            PlanError::ArgumentType {
                slot,
                type_code: cond.type_code,
            }
            .into()
        })
}

fn build_word_test(
    cond: &ColumnCondition,
    arg: &Value,
    args: &[Value],
) -> Result<CellTest, Error> {
    let test = match cond.op {
        Operator::Eq => CellTest::Word(WordPred::Eq(encode_word(arg))),
        Operator::Ne => CellTest::Word(WordPred::Ne(encode_word(arg))),
        Operator::Gt => {
            let lo = encode_word(arg);
            if lo == u64::MAX {
                CellTest::Never
            } else {
                CellTest::Word(WordPred::Range {
                    lo: lo + 1,
                    hi: u64::MAX,
                })
            }
        }
        Operator::Gte => CellTest::Word(WordPred::Range {
            lo: encode_word(arg),
            hi: u64::MAX,
        }),
        Operator::Lt => {
            let hi = encode_word(arg);
            if hi == 0 {
                CellTest::Never
            } else {
                CellTest::Word(WordPred::Range { lo: 0, hi: hi - 1 })
            }
        }
        Operator::Lte => CellTest::Word(WordPred::Range {
            lo: 0,
            hi: encode_word(arg),
        }),
        Operator::Between => {
            let hi = coerce_arg_scalar(cond, args, 1)?;
            CellTest::Word(WordPred::Range {
                lo: encode_word(arg),
                hi: encode_word(&hi),
            })
        }
        Operator::In | Operator::NotIn => {
            let items = arg.as_list().unwrap_or_default();
            let words: SmallVec<[u64; 4]> = items
                .iter()
                .filter(|v| !v.is_null())
                .map(encode_word)
                .collect();
            match (cond.op, words.is_empty()) {
                (Operator::In, true) => CellTest::Never,
                (Operator::In, false) => CellTest::Word(WordPred::In(words)),
                (_, _) => CellTest::Word(WordPred::NotIn(words)),
            }
        }
        _ => CellTest::Never,
    };
    Ok(test)
}

fn coerce_arg_scalar(cond: &ColumnCondition, args: &[Value], offset: usize) -> Result<Value, Error> {
    let slot = cond.arg_base + offset;
    args[slot].coerce_to(cond.type_code).ok_or_else(|| {
        PlanError::ArgumentType {
            slot,
            type_code: cond.type_code,
        }
        .into()
    })
}

fn build_str_test(cond: &ColumnCondition, arg: &Value, args: &[Value]) -> Result<CellTest, Error> {
    let ci = cond.ignore_case;
    let needle = |v: &Value| -> Arc<String> {
        match v {
            Value::Str(s) => Arc::clone(s),
            _ => Arc::new(String::new()),
        }
    };
    let folded = |v: &Value| v.as_str().unwrap_or_default().to_lowercase();

    let test = match cond.op {
        Operator::Eq if ci => CellTest::Str(StrPred::EqIgnoreCase(folded(arg))),
        Operator::Eq => CellTest::Str(StrPred::Eq(needle(arg))),
        Operator::Ne if ci => CellTest::Str(StrPred::NeIgnoreCase(folded(arg))),
        Operator::Ne => CellTest::Str(StrPred::Ne(needle(arg))),
        Operator::StartsWith if ci => CellTest::Str(StrPred::StartsWithCi(folded(arg))),
        Operator::StartsWith => CellTest::Str(StrPred::StartsWith(raw_str(arg))),
        Operator::EndsWith if ci => CellTest::Str(StrPred::EndsWithCi(folded(arg))),
        Operator::EndsWith => CellTest::Str(StrPred::EndsWith(raw_str(arg))),
        Operator::Contains if ci => CellTest::Str(StrPred::ContainsCi(folded(arg))),
        Operator::Contains => CellTest::Str(StrPred::Contains(raw_str(arg))),
        Operator::NotContains if ci => CellTest::Str(StrPred::NotContainsCi(folded(arg))),
        Operator::NotContains => CellTest::Str(StrPred::NotContains(raw_str(arg))),
        Operator::In | Operator::NotIn => {
            let items = arg.as_list().unwrap_or_default();
            let needles: Vec<Arc<String>> = items
                .iter()
                .filter_map(|v| match v {
                    Value::Str(s) => Some(Arc::clone(s)),
                    _ => None,
                })
                .collect();
            match (cond.op, needles.is_empty()) {
                (Operator::In, true) => CellTest::Never,
                (Operator::In, false) => CellTest::Str(StrPred::In(needles)),
                (_, _) => CellTest::Str(StrPred::NotIn(needles)),
            }
        }
        // Ordered string comparison only compiles when a range index
        // exists; the residual form compares lexicographically.
        Operator::Gt => str_range(Some((raw_str(arg), false)), None),
        Operator::Gte => str_range(Some((raw_str(arg), true)), None),
        Operator::Lt => str_range(None, Some((raw_str(arg), false))),
        Operator::Lte => str_range(None, Some((raw_str(arg), true))),
        Operator::Between => {
            let hi = coerce_arg_scalar(cond, args, 1)?;
            str_range(Some((raw_str(arg), true)), Some((raw_str(&hi), true)))
        }
        _ => CellTest::Never,
    };
    Ok(test)
}

fn str_range(lo: Option<(String, bool)>, hi: Option<(String, bool)>) -> CellTest {
    CellTest::Str(StrPred::Range { lo, hi })
}

fn raw_str(v: &Value) -> String {
    v.as_str().unwrap_or_default().to_owned()
}

/// Apply a bound test to one cell, reading the column directly. Null cells
/// fail every test except the null tests; a null answer is only trusted on
/// a settled row, so that test reads under the seqlock.
pub(crate) fn cell_matches(table: &Table, column: usize, test: &CellTest, row: u32) -> bool {
    match test {
        CellTest::Never => false,
        CellTest::Null { want_null } => table
            .read_cell_consistent(column, row)
            .is_ok_and(|v| v.is_null() == *want_null),
        CellTest::Word(pred) => table
            .column(column)
            .read_word(row)
            .is_some_and(|w| pred.matches(w)),
        CellTest::Str(pred) => table
            .column(column)
            .read_str(row)
            .is_some_and(|s| pred.matches(s.as_str())),
    }
}

/// Run a test as a full column scan. Null tests go through the table so
/// they carry the committed-row gate; value tests are safe per column
/// because a present cell implies its writer entered the seqlock section.
pub(crate) fn scan_with_test(
    table: &Table,
    column: usize,
    id_column: usize,
    test: &CellTest,
    out: &mut Vec<u32>,
) {
    match test {
        CellTest::Never => {}
        CellTest::Null { want_null } => table.scan_null(column, id_column, *want_null, out),
        CellTest::Word(pred) => table.column(column).scan_words(table.tombstones(), pred, out),
        CellTest::Str(pred) => table
            .column(column)
            .scan_strings(table.tombstones(), pred, out),
    }
}
