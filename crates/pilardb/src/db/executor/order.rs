use crate::{
    db::{
        index::key::KeyAtom,
        query::{compiled::CompiledOrder, descriptor::OrderDirection},
        store::{rowref::RowRef, table::Table},
    },
    error::Error,
};
use std::{cmp::Reverse, collections::BinaryHeap};

///
/// OrderRank
///
/// Total order over order-key cells: null sorts below every value, which
/// yields nulls-first for ascending and nulls-last for descending output.
///

#[derive(Clone, Eq, Ord, PartialEq, PartialOrd)]
enum OrderRank {
    Null,
    Key(KeyAtom),
}

/// Sort the selection by the compiled order key and apply the limit.
///
/// With a limit smaller than the candidate set, a bounded heap keeps the
/// best K in O(N log K); otherwise a stable full sort runs. Without an
/// order key the selection is simply truncated after K matches.
pub(crate) fn order_and_limit(
    table: &Table,
    refs: Vec<RowRef>,
    order: Option<CompiledOrder>,
    limit: Option<usize>,
) -> Result<Vec<RowRef>, Error> {
    let Some(order) = order else {
        let mut refs = refs;
        if let Some(k) = limit {
            refs.truncate(k);
        }
        return Ok(refs);
    };

    // Order keys are read under the seqlock: a concurrent writer must not
    // tear the key out from under the sort.
    let mut keyed = Vec::with_capacity(refs.len());
    for (seq, r) in refs.into_iter().enumerate() {
        let value = table.read_cell_consistent(order.column, r.row())?;
        let rank = KeyAtom::from_value(&value).map_or(OrderRank::Null, OrderRank::Key);
        keyed.push((rank, seq, r));
    }

    let out = match order.direction {
        OrderDirection::Asc => {
            let items = keyed
                .into_iter()
                .map(|(rank, seq, r)| ((rank, seq), r))
                .collect();
            sorted_prefix(items, limit)
        }
        OrderDirection::Desc => {
            let items = keyed
                .into_iter()
                .map(|(rank, seq, r)| ((Reverse(rank), seq), r))
                .collect();
            sorted_prefix(items, limit)
        }
    };

    Ok(out)
}

/// The K smallest items by key, in ascending key order. The sequence
/// component makes keys unique, which keeps equal-rank rows in their
/// original relative order.
fn sorted_prefix<K: Ord>(items: Vec<(K, RowRef)>, limit: Option<usize>) -> Vec<RowRef> {
    match limit {
        Some(k) if k < items.len() => {
            if k == 0 {
                return Vec::new();
            }
            let mut heap: BinaryHeap<(K, RowRef)> = BinaryHeap::with_capacity(k + 1);
            for item in items {
                heap.push(item);
                if heap.len() > k {
                    heap.pop();
                }
            }
            let mut best = heap.into_vec();
            best.sort_by(|a, b| a.0.cmp(&b.0));
            best.into_iter().map(|(_, r)| r).collect()
        }
        _ => {
            let mut items = items;
            items.sort_by(|a, b| a.0.cmp(&b.0));
            items.into_iter().map(|(_, r)| r).collect()
        }
    }
}

///
/// TESTS
///
