use crate::{
    db::{
        arena::EntityRuntime,
        executor::{
            predicate::{CellTest, build_cell_test, cell_matches, scan_with_test},
            trace::{AccessPath, ExecutionTrace, GroupTrace},
        },
        index::{
            key::{CompositeKey, KeyAtom},
            posting::Posting,
            set::IndexBackend,
        },
        query::compiled::{
            ColumnCondition, CompiledCondition, CompiledQuery, RelationCondition, RelationTarget,
        },
        store::{rowref::RowRef, selection::Selection, table::Table},
    },
    error::{Error, PlanError},
    query::Operator,
    value::Value,
};
use smallvec::SmallVec;
use std::{collections::HashSet, ops::Bound, sync::Arc};
use xxhash_rust::xxh3::Xxh3Builder;

type KeySet = HashSet<KeyAtom, Xxh3Builder>;

///
/// Execution kernel.
///
/// For each AND group the kernel picks a driver (the first composite or
/// single-column index match in source order, a navigated relation, or a
/// typed scan as the last resort) and applies the remaining conditions
/// row-at-a-time against the candidate set, without materializing
/// intermediate selections. OR groups union their results.
///

pub(crate) fn execute_selection(
    runtimes: &[EntityRuntime],
    entity: usize,
    query: &CompiledQuery,
    args: &[Value],
    mut trace: Option<&mut ExecutionTrace>,
) -> Result<Vec<RowRef>, Error> {
    if args.len() != query.arity {
        return Err(PlanError::ArityMismatch {
            name: query.name,
            declared: query.arity,
            consumed: args.len(),
        }
        .into());
    }

    let runtime = &runtimes[entity];
    let table = &runtime.table;

    if query.groups.is_empty() {
        let mut rows = Vec::new();
        table.scan_all(runtime.id_column, &mut rows);
        let refs: Vec<RowRef> = rows.into_iter().map(|r| table.row_ref(r)).collect();
        if let Some(t) = trace.as_deref_mut() {
            t.groups.push(GroupTrace {
                access: AccessPath::FullScan,
                candidates: refs.len(),
                matched: refs.len(),
            });
        }
        return Ok(refs);
    }

    if query.groups.len() == 1 {
        return execute_group(runtimes, entity, &query.groups[0], args, trace.as_deref_mut());
    }

    let mut combined = Selection::empty();
    for group in &query.groups {
        let refs = execute_group(runtimes, entity, group, args, trace.as_deref_mut())?;
        combined = combined.union(Selection::from_refs(refs));
    }
    let refs = combined.into_refs(|row| table.row_ref(row));
    Ok(refs
        .into_iter()
        .filter(|r| table.is_committed(*r, runtime.id_column))
        .collect())
}

///
/// BoundCondition
/// One group condition with its arguments resolved for this execution.
///

enum BoundCondition {
    Column(ColumnCondition, CellTest),
    Relation(RelationCondition, KeySet),
}

///
/// Driver
///

struct Driver {
    refs: Vec<RowRef>,
    /// Group indices fully satisfied by the driver lookup.
    satisfied: SmallVec<[usize; 4]>,
    access: AccessPath,
}

fn execute_group(
    runtimes: &[EntityRuntime],
    entity: usize,
    group: &[CompiledCondition],
    args: &[Value],
    trace: Option<&mut ExecutionTrace>,
) -> Result<Vec<RowRef>, Error> {
    let runtime = &runtimes[entity];
    let table = &runtime.table;

    let bound: Vec<BoundCondition> = group
        .iter()
        .map(|cond| match cond {
            CompiledCondition::Column(c) => {
                Ok(BoundCondition::Column(*c, build_cell_test(c, args)?))
            }
            CompiledCondition::Relation(rc) => Ok(BoundCondition::Relation(
                *rc,
                relation_key_set(runtimes, rc, args)?,
            )),
        })
        .collect::<Result<_, Error>>()?;

    let driver = pick_driver(runtime, &bound, args)?;
    let candidates = driver.refs.len();

    let mut out = Vec::with_capacity(candidates.min(64));
    'candidates: for r in driver.refs {
        if !table.is_committed(r, runtime.id_column) {
            continue;
        }
        for (i, cond) in bound.iter().enumerate() {
            if driver.satisfied.contains(&i) {
                continue;
            }
            let ok = match cond {
                BoundCondition::Column(c, test) => cell_matches(table, c.column, test, r.row()),
                BoundCondition::Relation(rc, keys) => {
                    relation_matches(runtime, rc, keys, r.row())
                }
            };
            if !ok {
                continue 'candidates;
            }
        }
        out.push(r);
    }

    if let Some(t) = trace {
        t.groups.push(GroupTrace {
            access: driver.access,
            candidates,
            matched: out.len(),
        });
    }

    Ok(out)
}

/// Residual form of a relation condition: does this row's linking value
/// appear in the precomputed key set?
fn relation_matches(
    runtime: &EntityRuntime,
    rc: &RelationCondition,
    keys: &KeySet,
    row: u32,
) -> bool {
    let column = match rc.target {
        RelationTarget::Children { .. } => runtime.id_column,
        RelationTarget::Parent { fk_column, .. } => fk_column,
    };
    KeyAtom::from_value(&runtime.table.read_cell(column, row))
        .is_some_and(|k| keys.contains(&k))
}

/// The linking values on the other table that satisfy a navigated
/// condition: matching children's FK values, or matching parents' ids.
fn relation_key_set(
    runtimes: &[EntityRuntime],
    rc: &RelationCondition,
    args: &[Value],
) -> Result<KeySet, Error> {
    let (other_ix, read_col) = match rc.target {
        RelationTarget::Children { entity, fk_column } => (entity, fk_column),
        RelationTarget::Parent { entity, .. } => (entity, runtimes[entity].id_column),
    };
    let other = &runtimes[other_ix];
    let refs = single_condition_refs(other, &rc.cond, args)?;

    let mut keys = KeySet::with_hasher(Xxh3Builder::new());
    for r in refs {
        if !other.table.is_committed(r, other.id_column) {
            continue;
        }
        if let Some(k) = KeyAtom::from_value(&other.table.read_cell(read_col, r.row())) {
            keys.insert(k);
        }
    }
    Ok(keys)
}

/// Execute one column condition against its own table: index when
/// possible, scan otherwise, residual-verified when the index answer
/// cannot be trusted blindly.
pub(crate) fn single_condition_refs(
    runtime: &EntityRuntime,
    cond: &ColumnCondition,
    args: &[Value],
) -> Result<Vec<RowRef>, Error> {
    let test = build_cell_test(cond, args)?;
    if let Some(driver) = index_driver(runtime, 0, cond, args)? {
        let table = &runtime.table;
        let verified = !driver.satisfied.is_empty();
        return Ok(driver
            .refs
            .into_iter()
            .filter(|r| {
                table.is_committed(*r, runtime.id_column)
                    && (verified || cell_matches(table, cond.column, &test, r.row()))
            })
            .collect());
    }

    let mut rows = Vec::new();
    scan_with_test(&runtime.table, cond.column, runtime.id_column, &test, &mut rows);
    Ok(rows.into_iter().map(|r| runtime.table.row_ref(r)).collect())
}

fn pick_driver(
    runtime: &EntityRuntime,
    bound: &[BoundCondition],
    args: &[Value],
) -> Result<Driver, Error> {
    // Composite indexes first, in declaration order; they subsume several
    // equality conditions at once but only when the full prefix is bound.
    if let Some(driver) = composite_driver(runtime, bound, args) {
        return Ok(driver);
    }

    for (i, cond) in bound.iter().enumerate() {
        match cond {
            BoundCondition::Column(c, _) => {
                if let Some(driver) = index_driver(runtime, i, c, args)? {
                    return Ok(driver);
                }
            }
            BoundCondition::Relation(rc, keys) => {
                return Ok(relation_driver(runtime, i, rc, keys));
            }
        }
    }

    // No index applies: the first condition becomes the scan.
    let Some(BoundCondition::Column(c, test)) = bound.first() else {
        unreachable!("empty groups are compiled away");
    };
    let mut rows = Vec::new();
    scan_with_test(&runtime.table, c.column, runtime.id_column, test, &mut rows);
    Ok(Driver {
        refs: rows.into_iter().map(|r| runtime.table.row_ref(r)).collect(),
        satisfied: SmallVec::from_slice(&[0]),
        access: AccessPath::ConditionScan,
    })
}

fn postings_to_driver(
    table: &Table,
    postings: &[Arc<Posting>],
    satisfied_when_exact: &[usize],
    access: AccessPath,
) -> Driver {
    let mut refs = Vec::new();
    let stamp = |row: u32| table.row_ref(row);
    let mut exact = true;
    for posting in postings {
        if posting.needs_recheck() {
            exact = false;
        }
        posting.collect_into(&mut refs, &stamp);
    }
    Driver {
        refs,
        satisfied: if exact {
            SmallVec::from_slice(satisfied_when_exact)
        } else {
            SmallVec::new()
        },
        access,
    }
}

/// Coerced key atom for an equality-style argument; `None` when the
/// argument is null or not representable, which disqualifies index use.
fn key_arg(cond: &ColumnCondition, args: &[Value], offset: usize) -> Option<KeyAtom> {
    args[cond.arg_base + offset]
        .coerce_to(cond.type_code)
        .as_ref()
        .and_then(KeyAtom::from_value)
}

fn index_driver(
    runtime: &EntityRuntime,
    cond_ix: usize,
    cond: &ColumnCondition,
    args: &[Value],
) -> Result<Option<Driver>, Error> {
    let table = &runtime.table;
    let indexes = &runtime.indexes;
    let satisfied = [cond_ix];

    let driver = match cond.op {
        Operator::Eq if !cond.ignore_case => {
            let Some(key) = key_arg(cond, args, 0) else {
                return Ok(None);
            };
            if cond.column == runtime.id_column {
                let refs = table.id_lookup(&key).into_iter().collect();
                Some(Driver {
                    refs,
                    satisfied: SmallVec::from_slice(&satisfied),
                    access: AccessPath::IdIndex,
                })
            } else if let Some((name, idx)) = indexes.hash_for(cond.column) {
                let postings: Vec<_> = idx.lookup(&key).into_iter().collect();
                Some(postings_to_driver(
                    table,
                    &postings,
                    &satisfied,
                    AccessPath::Index { name },
                ))
            } else if let Some((name, idx)) = indexes.range_for(cond.column) {
                let postings: Vec<_> = idx.lookup(&key).into_iter().collect();
                Some(postings_to_driver(
                    table,
                    &postings,
                    &satisfied,
                    AccessPath::Index { name },
                ))
            } else {
                None
            }
        }
        Operator::In if !cond.ignore_case => {
            let list = args[cond.arg_base].as_list().unwrap_or_default();
            let mut keys = Vec::with_capacity(list.len());
            for item in list {
                if item.is_null() {
                    continue;
                }
                match item.coerce_to(cond.type_code).as_ref().and_then(KeyAtom::from_value) {
                    Some(k) => keys.push(k),
                    None => return Ok(None),
                }
            }
            if cond.column == runtime.id_column {
                let refs = keys.iter().filter_map(|k| table.id_lookup(k)).collect();
                Some(Driver {
                    refs,
                    satisfied: SmallVec::from_slice(&satisfied),
                    access: AccessPath::IdIndex,
                })
            } else if let Some((name, idx)) = indexes.hash_for(cond.column) {
                let postings: Vec<_> = keys.iter().filter_map(|k| idx.lookup(k)).collect();
                Some(postings_to_driver(
                    table,
                    &postings,
                    &satisfied,
                    AccessPath::Index { name },
                ))
            } else {
                None
            }
        }
        Operator::Gt | Operator::Gte | Operator::Lt | Operator::Lte | Operator::Between => {
            let Some((name, idx)) = indexes.range_for(cond.column) else {
                return Ok(None);
            };
            let (lo, hi) = match cond.op {
                Operator::Gt => (Bound::Excluded(key_arg(cond, args, 0)), Bound::Unbounded),
                Operator::Gte => (Bound::Included(key_arg(cond, args, 0)), Bound::Unbounded),
                Operator::Lt => (Bound::Unbounded, Bound::Excluded(key_arg(cond, args, 0))),
                Operator::Lte => (Bound::Unbounded, Bound::Included(key_arg(cond, args, 0))),
                _ => (
                    Bound::Included(key_arg(cond, args, 0)),
                    Bound::Included(key_arg(cond, args, 1)),
                ),
            };
            let (lo, hi) = match unwrap_bounds(lo, hi) {
                Some(bounds) => bounds,
                None => return Ok(None),
            };
            let postings = idx.range_lookup(as_ref_bound(&lo), as_ref_bound(&hi));
            Some(postings_to_driver(
                table,
                &postings,
                &satisfied,
                AccessPath::Index { name },
            ))
        }
        Operator::StartsWith if !cond.ignore_case => {
            let Some((name, idx)) = indexes.prefix_for(cond.column) else {
                return Ok(None);
            };
            let Some(anchor) = args[cond.arg_base].as_str() else {
                return Ok(None);
            };
            let postings = idx.prefix_lookup(anchor);
            Some(postings_to_driver(
                table,
                &postings,
                &satisfied,
                AccessPath::Index { name },
            ))
        }
        Operator::EndsWith if !cond.ignore_case => {
            let Some((name, idx)) = indexes.suffix_for(cond.column) else {
                return Ok(None);
            };
            let Some(anchor) = args[cond.arg_base].as_str() else {
                return Ok(None);
            };
            let postings = idx.suffix_lookup(anchor);
            Some(postings_to_driver(
                table,
                &postings,
                &satisfied,
                AccessPath::Index { name },
            ))
        }
        _ => None,
    };

    Ok(driver)
}

/// A bound pair is usable only when every present bound has a key atom.
#[allow(clippy::type_complexity)]
fn unwrap_bounds(
    lo: Bound<Option<KeyAtom>>,
    hi: Bound<Option<KeyAtom>>,
) -> Option<(Bound<KeyAtom>, Bound<KeyAtom>)> {
    let flip = |b: Bound<Option<KeyAtom>>| match b {
        Bound::Unbounded => Some(Bound::Unbounded),
        Bound::Included(k) => k.map(Bound::Included),
        Bound::Excluded(k) => k.map(Bound::Excluded),
    };
    Some((flip(lo)?, flip(hi)?))
}

fn as_ref_bound(b: &Bound<KeyAtom>) -> Bound<&KeyAtom> {
    match b {
        Bound::Unbounded => Bound::Unbounded,
        Bound::Included(k) => Bound::Included(k),
        Bound::Excluded(k) => Bound::Excluded(k),
    }
}

fn relation_driver(
    runtime: &EntityRuntime,
    cond_ix: usize,
    rc: &RelationCondition,
    keys: &KeySet,
) -> Driver {
    let table = &runtime.table;
    let satisfied = SmallVec::from_slice(&[cond_ix]);

    match rc.target {
        // Matching children named these parent ids; probe the id index.
        RelationTarget::Children { .. } => Driver {
            refs: keys.iter().filter_map(|k| table.id_lookup(k)).collect(),
            satisfied,
            access: AccessPath::Relation,
        },
        // Rows whose FK lands in the matching-parent id set.
        RelationTarget::Parent { fk_column, .. } => {
            if let Some((_, idx)) = runtime.indexes.hash_for(fk_column) {
                let postings: Vec<_> = keys.iter().filter_map(|k| idx.lookup(k)).collect();
                postings_to_driver(table, &postings, &[cond_ix], AccessPath::Relation)
            } else {
                let mut rows = Vec::new();
                table.scan_all(runtime.id_column, &mut rows);
                let refs = rows
                    .into_iter()
                    .filter(|&row| {
                        KeyAtom::from_value(&table.read_cell(fk_column, row))
                            .is_some_and(|k| keys.contains(&k))
                    })
                    .map(|row| table.row_ref(row))
                    .collect();
                Driver {
                    refs,
                    satisfied,
                    access: AccessPath::Relation,
                }
            }
        }
    }
}

fn composite_driver(
    runtime: &EntityRuntime,
    bound: &[BoundCondition],
    args: &[Value],
) -> Option<Driver> {
    let table = &runtime.table;

    // Equality bindings per column, with the group index that supplied
    // them.
    let eq_of = |column: usize| -> Option<(usize, KeyAtom)> {
        bound.iter().enumerate().find_map(|(i, b)| match b {
            BoundCondition::Column(c, _)
                if c.column == column && c.op == Operator::Eq && !c.ignore_case =>
            {
                key_arg(c, args, 0).map(|k| (i, k))
            }
            _ => None,
        })
    };
    let range_of = |column: usize| -> Option<(usize, &ColumnCondition)> {
        bound.iter().enumerate().find_map(|(i, b)| match b {
            BoundCondition::Column(c, _) if c.column == column && c.op.is_ordering() => {
                Some((i, c))
            }
            _ => None,
        })
    };

    for entry in runtime.indexes.composites() {
        let columns = &entry.model.columns;
        match &entry.backend {
            IndexBackend::CompositeHash(idx) => {
                let mut atoms = SmallVec::new();
                let mut used = SmallVec::<[usize; 4]>::new();
                let mut complete = true;
                for &column in columns {
                    match eq_of(column) {
                        Some((i, k)) => {
                            atoms.push(k);
                            used.push(i);
                        }
                        None => {
                            complete = false;
                            break;
                        }
                    }
                }
                if complete {
                    let postings: Vec<_> =
                        idx.lookup(&CompositeKey(atoms)).into_iter().collect();
                    return Some(postings_to_driver(
                        table,
                        &postings,
                        &used,
                        AccessPath::Index {
                            name: entry.model.name,
                        },
                    ));
                }
            }
            IndexBackend::CompositeRange(idx) => {
                // Equality prefix, then one ordered condition on the next
                // component.
                let mut atoms: SmallVec<[KeyAtom; 4]> = SmallVec::new();
                let mut used = SmallVec::<[usize; 4]>::new();
                for &column in columns {
                    if let Some((i, k)) = eq_of(column) {
                        atoms.push(k);
                        used.push(i);
                        continue;
                    }
                    let Some((i, c)) = range_of(column) else {
                        used.clear();
                        break;
                    };
                    let (lo, hi) = match c.op {
                        Operator::Gt => (Bound::Excluded(key_arg(c, args, 0)?), Bound::Unbounded),
                        Operator::Gte => (Bound::Included(key_arg(c, args, 0)?), Bound::Unbounded),
                        Operator::Lt => (Bound::Unbounded, Bound::Excluded(key_arg(c, args, 0)?)),
                        Operator::Lte => (Bound::Unbounded, Bound::Included(key_arg(c, args, 0)?)),
                        Operator::Between => (
                            Bound::Included(key_arg(c, args, 0)?),
                            Bound::Included(key_arg(c, args, 1)?),
                        ),
                        _ => (Bound::Unbounded, Bound::Unbounded),
                    };
                    used.push(i);
                    let postings =
                        idx.prefix_range_lookup(&atoms, as_ref_bound(&lo), as_ref_bound(&hi));
                    return Some(postings_to_driver(
                        table,
                        &postings,
                        &used,
                        AccessPath::Index {
                            name: entry.model.name,
                        },
                    ));
                }
                // Every component bound by equality: exact tuple lookup.
                if used.len() == columns.len() {
                    let postings: Vec<_> =
                        idx.lookup(&CompositeKey(atoms)).into_iter().collect();
                    return Some(postings_to_driver(
                        table,
                        &postings,
                        &used,
                        AccessPath::Index {
                            name: entry.model.name,
                        },
                    ));
                }
            }
            _ => {}
        }
    }
    None
}
