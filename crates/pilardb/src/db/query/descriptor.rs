use crate::db::query::operator::Operator;

///
/// Opcode
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Opcode {
    Find,
    Count,
    Exists,
    Delete,
}

///
/// ReturnKind
///
/// The declared shape a repository method produces. `GroupedBy` buckets
/// full materializations under the named key column, preserving first-seen
/// key order.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum ReturnKind {
    Many,
    Optional,
    Count,
    Exists,
    Deleted,
    Projected,
    GroupedBy(&'static str),
}

///
/// OrderDirection
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum OrderDirection {
    Asc,
    Desc,
}

///
/// OrderSpec
///

#[derive(Clone, Copy, Debug)]
pub struct OrderSpec {
    pub path: &'static str,
    pub direction: OrderDirection,
}

///
/// ConditionDescriptor
///
/// One pre-tokenized condition: a dotted property path (possibly
/// navigating a declared relation), an operator, and the case fold flag.
///

#[derive(Clone, Copy, Debug)]
pub struct ConditionDescriptor {
    pub path: &'static str,
    pub op: Operator,
    pub ignore_case: bool,
}

impl ConditionDescriptor {
    #[must_use]
    pub const fn new(path: &'static str, op: Operator) -> Self {
        Self {
            path,
            op,
            ignore_case: false,
        }
    }

    #[must_use]
    pub const fn ignore_case(mut self) -> Self {
        self.ignore_case = true;
        self
    }
}

///
/// ProjectionDescriptor
///

#[derive(Clone, Debug)]
pub struct ProjectionDescriptor {
    /// Leaf paths in declared shape order.
    pub paths: Vec<&'static str>,
}

///
/// MethodDescriptor
///
/// Pre-tokenized description of one repository method. The core never
/// parses method names; callers (a name lexer, an annotated-query parser)
/// hand in this shape and receive a dense query id back.
///
/// `conditions` form one AND group. When `or_groups` is non-empty the
/// predicate becomes a disjunction of those groups, with `conditions`
/// ANDed into every group as a shared filter. An empty predicate matches
/// every live row.
///

#[derive(Clone, Debug)]
pub struct MethodDescriptor {
    pub name: &'static str,
    pub opcode: Opcode,
    pub return_kind: ReturnKind,
    pub conditions: Vec<ConditionDescriptor>,
    pub or_groups: Vec<Vec<ConditionDescriptor>>,
    pub order_by: Option<OrderSpec>,
    pub limit: Option<usize>,
    pub projection: Option<ProjectionDescriptor>,
    /// Declared argument count; validated against the slots the conditions
    /// consume.
    pub arity: usize,
}

impl MethodDescriptor {
    #[must_use]
    pub fn new(name: &'static str, opcode: Opcode, return_kind: ReturnKind) -> Self {
        Self {
            name,
            opcode,
            return_kind,
            conditions: Vec::new(),
            or_groups: Vec::new(),
            order_by: None,
            limit: None,
            projection: None,
            arity: 0,
        }
    }

    /// A `Find` returning a list, the most common shape.
    #[must_use]
    pub fn find(name: &'static str) -> Self {
        Self::new(name, Opcode::Find, ReturnKind::Many)
    }

    #[must_use]
    pub fn find_one(name: &'static str) -> Self {
        Self::new(name, Opcode::Find, ReturnKind::Optional)
    }

    #[must_use]
    pub fn count(name: &'static str) -> Self {
        Self::new(name, Opcode::Count, ReturnKind::Count)
    }

    #[must_use]
    pub fn exists(name: &'static str) -> Self {
        Self::new(name, Opcode::Exists, ReturnKind::Exists)
    }

    #[must_use]
    pub fn delete(name: &'static str) -> Self {
        Self::new(name, Opcode::Delete, ReturnKind::Deleted)
    }

    #[must_use]
    pub fn cond(mut self, path: &'static str, op: Operator) -> Self {
        self.arity += op.arg_slots();
        self.conditions.push(ConditionDescriptor::new(path, op));
        self
    }

    #[must_use]
    pub fn cond_ignore_case(mut self, path: &'static str, op: Operator) -> Self {
        self.arity += op.arg_slots();
        self.conditions
            .push(ConditionDescriptor::new(path, op).ignore_case());
        self
    }

    #[must_use]
    pub fn or_group(mut self, group: Vec<ConditionDescriptor>) -> Self {
        self.arity += group.iter().map(|c| c.op.arg_slots()).sum::<usize>();
        self.or_groups.push(group);
        self
    }

    #[must_use]
    pub const fn order_by(mut self, path: &'static str, direction: OrderDirection) -> Self {
        self.order_by = Some(OrderSpec { path, direction });
        self
    }

    #[must_use]
    pub const fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    #[must_use]
    pub fn project(mut self, paths: Vec<&'static str>) -> Self {
        self.projection = Some(ProjectionDescriptor { paths });
        self.return_kind = ReturnKind::Projected;
        self
    }
}
