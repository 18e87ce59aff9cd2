use crate::{
    db::query::{
        descriptor::{Opcode, OrderDirection, ReturnKind},
        operator::Operator,
    },
    model::field::TypeCode,
};

///
/// ColumnCondition
///
/// A condition with its property path resolved to a column index and its
/// arguments assigned dense slots. No string keys remain.
///

#[derive(Clone, Copy, Debug)]
pub(crate) struct ColumnCondition {
    pub(crate) column: usize,
    pub(crate) type_code: TypeCode,
    pub(crate) op: Operator,
    pub(crate) ignore_case: bool,
    /// First argument slot; the operator's `arg_slots` follow from here.
    pub(crate) arg_base: usize,
}

///
/// RelationTarget
///
/// Which side of a declared relation a navigated condition lands on.
///

#[derive(Clone, Copy, Debug)]
pub(crate) enum RelationTarget {
    /// Condition on a child table; a row matches when at least one child
    /// with `fk_column == own id` satisfies it.
    Children { entity: usize, fk_column: usize },
    /// Condition on the referenced parent; a row matches when the row its
    /// own `fk_column` points at satisfies it.
    Parent { entity: usize, fk_column: usize },
}

///
/// RelationCondition
///

#[derive(Clone, Copy, Debug)]
pub(crate) struct RelationCondition {
    pub(crate) target: RelationTarget,
    /// The condition evaluated against the other table.
    pub(crate) cond: ColumnCondition,
}

///
/// CompiledCondition
///

#[derive(Clone, Copy, Debug)]
pub(crate) enum CompiledCondition {
    Column(ColumnCondition),
    Relation(RelationCondition),
}

impl CompiledCondition {
    pub(crate) const fn as_column(&self) -> Option<&ColumnCondition> {
        match self {
            Self::Column(c) => Some(c),
            Self::Relation(_) => None,
        }
    }
}

///
/// CompiledOrder
///

#[derive(Clone, Copy, Debug)]
pub(crate) struct CompiledOrder {
    pub(crate) column: usize,
    pub(crate) direction: OrderDirection,
}

///
/// CompiledQuery
///
/// Immutable execution plan for one repository method: a disjunction of
/// AND groups over column-resolved conditions, plus ordering, limit,
/// projection, and grouping. Built once at registration, dispatched by
/// dense query id forever after.
///

#[derive(Debug)]
pub(crate) struct CompiledQuery {
    pub(crate) name: &'static str,
    pub(crate) opcode: Opcode,
    pub(crate) return_kind: ReturnKind,
    /// OR of AND groups; an empty vector matches every live row.
    pub(crate) groups: Vec<Vec<CompiledCondition>>,
    pub(crate) order_by: Option<CompiledOrder>,
    pub(crate) limit: Option<usize>,
    /// Projection columns in declared shape order.
    pub(crate) projection: Option<Box<[usize]>>,
    /// Grouping key column for `ReturnKind::GroupedBy`.
    pub(crate) group_key: Option<usize>,
    pub(crate) arity: usize,
}
