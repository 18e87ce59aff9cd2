use crate::{
    db::{
        arena::{Arena, EntityRuntime},
        executor::{
            kernel,
            load::Materializer,
            order::order_and_limit,
            save::{SaveStack, Saver},
            trace::ExecutionTrace,
        },
        index::key::KeyAtom,
        query::{
            compiled::{ColumnCondition, CompiledQuery},
            descriptor::{Opcode, ReturnKind},
        },
        store::rowref::RowRef,
    },
    error::{Error, PlanError},
    model::entity::EntityModel,
    query::Operator,
    traits::Entity,
    value::Value,
};
use derive_more::Display;
use std::{collections::HashMap, sync::Arc};

///
/// QueryId
///
/// Dense handle for a compiled repository method. Obtained once at
/// registration (or via `query_id` by name); dispatch is an array index.
///

#[derive(Clone, Copy, Debug, Display, Eq, PartialEq)]
#[display("q{_0}")]
pub struct QueryId(pub(crate) usize);

///
/// QueryOutput
///
/// The declared result shape of a repository method invocation.
///

#[derive(Debug)]
pub enum QueryOutput<E> {
    Many(Vec<E>),
    One(Option<E>),
    Count(u64),
    Exists(bool),
    Deleted(u64),
    Projected(Vec<Vec<Value>>),
    Grouped(Vec<(Value, Vec<E>)>),
}

impl<E> QueryOutput<E> {
    #[must_use]
    pub fn many(self) -> Option<Vec<E>> {
        match self {
            Self::Many(items) => Some(items),
            _ => None,
        }
    }

    #[must_use]
    pub fn one(self) -> Option<Option<E>> {
        match self {
            Self::One(item) => Some(item),
            _ => None,
        }
    }

    #[must_use]
    pub const fn count(&self) -> Option<u64> {
        match self {
            Self::Count(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub const fn exists(&self) -> Option<bool> {
        match self {
            Self::Exists(b) => Some(*b),
            _ => None,
        }
    }

    #[must_use]
    pub const fn deleted(&self) -> Option<u64> {
        match self {
            Self::Deleted(n) => Some(*n),
            _ => None,
        }
    }

    #[must_use]
    pub fn projected(self) -> Option<Vec<Vec<Value>>> {
        match self {
            Self::Projected(rows) => Some(rows),
            _ => None,
        }
    }

    #[must_use]
    pub fn grouped(self) -> Option<Vec<(Value, Vec<E>)>> {
        match self {
            Self::Grouped(groups) => Some(groups),
            _ => None,
        }
    }
}

///
/// RepositoryPlan
///
/// The steady-state hot-path object for one entity: dense compiled-query
/// array, the saver, the materializer, and the entity model. Built once at
/// arena assembly.
///

pub(crate) struct RepositoryPlan<E: Entity> {
    pub(crate) entity: usize,
    pub(crate) model: Arc<EntityModel<E>>,
    pub(crate) queries: Box<[CompiledQuery]>,
    pub(crate) query_ids: HashMap<&'static str, usize>,
    pub(crate) saver: Saver<E>,
    pub(crate) materializer: Materializer<E>,
}

///
/// Repository
///
/// Typed access to one entity's rows. Cheap to clone; dispatching a
/// registered method is a constant-time array lookup followed by pure
/// execution over columns and indexes.
///

pub struct Repository<E: Entity> {
    arena: Arena,
    plan: Arc<RepositoryPlan<E>>,
}

impl<E: Entity> Clone for Repository<E> {
    fn clone(&self) -> Self {
        Self {
            arena: self.arena.clone(),
            plan: Arc::clone(&self.plan),
        }
    }
}

impl<E: Entity> Repository<E> {
    pub(crate) const fn new(arena: Arena, plan: Arc<RepositoryPlan<E>>) -> Self {
        Self { arena, plan }
    }

    fn runtime(&self) -> &EntityRuntime {
        &self.arena.inner.runtimes[self.plan.entity]
    }

    // ======================================================================
    // Registered method dispatch
    // ======================================================================

    /// Resolve a method name to its dense id. Registration-time helper;
    /// hold on to the id for dispatch.
    #[must_use]
    pub fn query_id(&self, name: &str) -> Option<QueryId> {
        self.plan.query_ids.get(name).map(|&i| QueryId(i))
    }

    /// Execute a compiled method with bound arguments.
    pub fn invoke(&self, id: QueryId, args: &[Value]) -> Result<QueryOutput<E>, Error> {
        self.invoke_at(id, args, 0, None)
    }

    /// Execute with plan reporting, for diagnostics.
    pub fn trace(
        &self,
        id: QueryId,
        args: &[Value],
    ) -> Result<(QueryOutput<E>, ExecutionTrace), Error> {
        let query = self.query(id)?;
        let mut trace = ExecutionTrace {
            query: query.name,
            ..ExecutionTrace::default()
        };
        let output = self.invoke_at(id, args, 0, Some(&mut trace))?;
        Ok((output, trace))
    }

    fn query(&self, id: QueryId) -> Result<&CompiledQuery, Error> {
        self.plan
            .queries
            .get(id.0)
            .ok_or_else(|| PlanError::UnknownQuery { id: id.0 }.into())
    }

    fn invoke_at(
        &self,
        id: QueryId,
        args: &[Value],
        depth: u32,
        mut trace: Option<&mut ExecutionTrace>,
    ) -> Result<QueryOutput<E>, Error> {
        let query = self.query(id)?;
        let runtime = self.runtime();
        let refs = kernel::execute_selection(
            self.arena.runtimes(),
            self.plan.entity,
            query,
            args,
            trace.as_deref_mut(),
        )?;

        if let Some(t) = trace.as_deref_mut() {
            t.result_rows = refs.len();
        }
        tracing::trace!(query = query.name, rows = refs.len(), "query executed");

        match query.opcode {
            Opcode::Count => Ok(QueryOutput::Count(refs.len() as u64)),
            Opcode::Exists => Ok(QueryOutput::Exists(!refs.is_empty())),
            Opcode::Delete => {
                let mut deleted = 0u64;
                for r in refs {
                    if self.delete_ref(r)? {
                        deleted += 1;
                    }
                }
                Ok(QueryOutput::Deleted(deleted))
            }
            Opcode::Find => {
                let ordered =
                    order_and_limit(&runtime.table, refs, query.order_by, query.limit)?;
                self.shape_output(query, runtime, ordered, depth)
            }
        }
    }

    fn shape_output(
        &self,
        query: &CompiledQuery,
        runtime: &EntityRuntime,
        refs: Vec<RowRef>,
        depth: u32,
    ) -> Result<QueryOutput<E>, Error> {
        match query.return_kind {
            ReturnKind::Optional => {
                let mut first = None;
                for r in refs {
                    if let Some(entity) = self.materialize_at(r.row(), depth)? {
                        first = Some(entity);
                        break;
                    }
                }
                Ok(QueryOutput::One(first))
            }
            ReturnKind::Projected => {
                let Some(columns) = query.projection.as_deref() else {
                    return Ok(QueryOutput::Projected(Vec::new()));
                };
                let mut rows = Vec::with_capacity(refs.len());
                for r in refs {
                    let snapshot = runtime.table.read_row_consistent(r.row())?;
                    rows.push(columns.iter().map(|&c| snapshot[c].clone()).collect());
                }
                Ok(QueryOutput::Projected(rows))
            }
            ReturnKind::GroupedBy(_) => {
                let Some(key_column) = query.group_key else {
                    return Ok(QueryOutput::Grouped(Vec::new()));
                };
                let mut groups: Vec<(Value, Vec<E>)> = Vec::new();
                for r in refs {
                    let Some(entity) = self.materialize_at(r.row(), depth)? else {
                        continue;
                    };
                    let key = runtime.table.read_cell_consistent(key_column, r.row())?;
                    if let Some((_, bucket)) = groups.iter_mut().find(|(k, _)| *k == key) {
                        bucket.push(entity);
                    } else {
                        groups.push((key, vec![entity]));
                    }
                }
                Ok(QueryOutput::Grouped(groups))
            }
            ReturnKind::Count => Ok(QueryOutput::Count(refs.len() as u64)),
            ReturnKind::Exists => Ok(QueryOutput::Exists(!refs.is_empty())),
            ReturnKind::Deleted => Ok(QueryOutput::Deleted(0)),
            ReturnKind::Many => {
                let mut out = Vec::with_capacity(refs.len());
                for r in refs {
                    if let Some(entity) = self.materialize_at(r.row(), depth)? {
                        out.push(entity);
                    }
                }
                Ok(QueryOutput::Many(out))
            }
        }
    }

    // ======================================================================
    // Built-in operations
    // ======================================================================

    /// Insert-or-update, cascading to owned relations.
    pub fn save(&self, entity: E) -> Result<E, Error> {
        let mut stack = SaveStack::new();
        self.save_with_stack(entity, &mut stack)
    }

    /// Fail-fast, non-atomic batch save.
    pub fn save_all(&self, entities: impl IntoIterator<Item = E>) -> Result<Vec<E>, Error> {
        let iter = entities.into_iter();
        let mut out = Vec::with_capacity(iter.size_hint().0);
        for entity in iter {
            out.push(self.save(entity)?);
        }
        Ok(out)
    }

    pub(crate) fn save_with_stack(&self, entity: E, stack: &mut SaveStack) -> Result<E, Error> {
        self.plan
            .saver
            .save(&self.arena, self.runtime(), &entity, stack)
    }

    pub fn find_by_id(&self, id: impl Into<Value>) -> Result<Option<E>, Error> {
        self.find_by_id_at(&id.into(), 0)
    }

    pub fn find_all_by_id<I, V>(&self, ids: I) -> Result<Vec<E>, Error>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let mut out = Vec::new();
        for id in ids {
            if let Some(entity) = self.find_by_id_at(&id.into(), 0)? {
                out.push(entity);
            }
        }
        Ok(out)
    }

    pub fn find_all(&self) -> Result<Vec<E>, Error> {
        let runtime = self.runtime();
        let mut rows = Vec::new();
        runtime.table.scan_all(runtime.id_column, &mut rows);
        let mut out = Vec::with_capacity(rows.len());
        for row in rows {
            if let Some(entity) = self.materialize_at(row, 0)? {
                out.push(entity);
            }
        }
        Ok(out)
    }

    /// Live row count; O(1).
    #[must_use]
    pub fn count(&self) -> u64 {
        self.runtime().table.live_count()
    }

    pub fn exists_by_id(&self, id: impl Into<Value>) -> Result<bool, Error> {
        Ok(self.live_ref_for(&id.into()).is_some())
    }

    pub fn delete_by_id(&self, id: impl Into<Value>) -> Result<bool, Error> {
        match self.live_ref_for(&id.into()) {
            Some(rowref) => self.delete_ref(rowref),
            None => Ok(false),
        }
    }

    /// Delete by the entity's own id field.
    pub fn delete(&self, entity: &E) -> Result<bool, Error> {
        let id = self.plan.model.id_plan().read(entity);
        if id.is_null() {
            return Ok(false);
        }
        self.delete_by_id(id)
    }

    /// Tombstone every live row. Returns the number removed.
    pub fn delete_all(&self) -> Result<u64, Error> {
        let runtime = self.runtime();
        let mut rows = Vec::new();
        runtime.table.scan_all(runtime.id_column, &mut rows);
        let mut deleted = 0u64;
        for row in rows {
            if self.delete_ref(runtime.table.row_ref(row))? {
                deleted += 1;
            }
        }
        Ok(deleted)
    }

    // ======================================================================
    // Relation-support surface (load hooks, cascade plumbing)
    // ======================================================================

    fn live_ref_for(&self, id: &Value) -> Option<RowRef> {
        let runtime = self.runtime();
        let key = KeyAtom::from_value(id)?;
        runtime
            .table
            .id_lookup(&key)
            .filter(|r| runtime.table.is_live(*r))
    }

    pub(crate) fn find_by_id_at(&self, id: &Value, depth: u32) -> Result<Option<E>, Error> {
        match self.live_ref_for(id) {
            Some(r) => self.materialize_at(r.row(), depth),
            None => Ok(None),
        }
    }

    /// All live rows whose `path` column equals `key`; used by relation
    /// load hooks. The column resolves through the registration-time path
    /// map, and an FK hash index is used when declared.
    pub(crate) fn find_where_at(
        &self,
        path: &str,
        key: &Value,
        depth: u32,
    ) -> Result<Vec<E>, Error> {
        let runtime = self.runtime();
        let column = runtime
            .column_of(path)
            .ok_or_else(|| PlanError::InvalidPropertyPath {
                entity: runtime.name,
                path: path.to_owned(),
            })?;
        let cond = ColumnCondition {
            column,
            type_code: runtime.columns[column].type_code,
            op: Operator::Eq,
            ignore_case: false,
            arg_base: 0,
        };
        let args = [key.clone()];
        let refs = kernel::single_condition_refs(runtime, &cond, &args)?;
        let mut out = Vec::with_capacity(refs.len());
        for r in refs {
            if let Some(entity) = self.materialize_at(r.row(), depth)? {
                out.push(entity);
            }
        }
        Ok(out)
    }

    fn materialize_at(&self, row: u32, depth: u32) -> Result<Option<E>, Error> {
        self.plan
            .materializer
            .materialize(&self.arena, &self.runtime().table, row, depth)
    }

    /// Tombstone one row and unhook its index entries.
    fn delete_ref(&self, rowref: RowRef) -> Result<bool, Error> {
        let runtime = self.runtime();
        let table = &runtime.table;

        // Capture the row image first; the tombstone CAS decides the
        // winner, and only the winner unhooks indexes and the id entry.
        let values = table.read_row_consistent(rowref.row())?;
        if !table.tombstone(rowref)? {
            return Ok(false);
        }
        runtime.indexes.remove_row(&values, rowref.row());
        if let Some(key) = KeyAtom::from_value(&values[runtime.id_column]) {
            table.id_remove(&key, rowref);
        }
        Ok(true)
    }
}
