use crate::{
    MAX_RELATION_DEPTH,
    db::{arena::Arena, store::table::Table},
    error::Error,
    model::{descriptor::RelationLoadFn, entity::EntityModel},
    traits::Entity,
    value::Value,
};
use std::sync::Arc;

///
/// Materializer
///
/// Compiled once per entity class: fills a `Default`-constructed instance
/// through the pre-resolved access plans from a consistent row snapshot,
/// then runs the relation load hooks. No reflection, no string lookups.
///

pub(crate) struct Materializer<E: Entity> {
    model: Arc<EntityModel<E>>,
    loads: Box<[RelationLoadFn<E>]>,
}

impl<E: Entity> Materializer<E> {
    pub(crate) fn new(model: Arc<EntityModel<E>>) -> Self {
        let loads = model.relations.iter().filter_map(|r| r.load).collect();
        Self { model, loads }
    }

    /// Materialize one row. `depth` counts relation hops from the original
    /// request; loading stops silently at the depth limit so
    /// self-referential graphs terminate.
    ///
    /// Returns `None` for a slot inside the published window whose writer
    /// has not reached the id cell yet; such a row is not inserted from
    /// the reader's point of view.
    pub(crate) fn materialize(
        &self,
        arena: &Arena,
        table: &Table,
        row: u32,
        depth: u32,
    ) -> Result<Option<E>, Error> {
        let snapshot = table.read_row_consistent(row)?;
        if snapshot[self.model.id_column].is_null() {
            return Ok(None);
        }

        let mut entity = E::default();
        for (plan, value) in self.model.plans.iter().zip(snapshot.iter()) {
            plan.write(&mut entity, value.clone());
        }

        if depth < MAX_RELATION_DEPTH && !self.loads.is_empty() {
            let id = snapshot[self.model.id_column].clone();
            let mut ctx = LoadCtx {
                arena,
                depth: depth + 1,
            };
            for load in &self.loads {
                load(&mut entity, &id, &mut ctx)?;
            }
        }

        Ok(Some(entity))
    }
}

///
/// LoadCtx
///
/// Handed to relation load hooks during materialization. Hooks know their
/// concrete target type and pull related entities through it; the context
/// carries the arena and the current relation depth.
///

pub struct LoadCtx<'a> {
    pub(crate) arena: &'a Arena,
    pub(crate) depth: u32,
}

impl LoadCtx<'_> {
    #[must_use]
    pub const fn depth(&self) -> u32 {
        self.depth
    }

    /// All live `T` rows whose `fk_path` column equals `key`.
    pub fn find_related<T: Entity>(&mut self, fk_path: &str, key: &Value) -> Result<Vec<T>, Error> {
        if self.depth >= MAX_RELATION_DEPTH {
            return Ok(Vec::new());
        }
        self.arena
            .repository::<T>()?
            .find_where_at(fk_path, key, self.depth)
    }

    /// Point lookup through the target's primary-key index.
    pub fn find_by_id<T: Entity>(&mut self, id: &Value) -> Result<Option<T>, Error> {
        if self.depth >= MAX_RELATION_DEPTH || id.is_null() {
            return Ok(None);
        }
        self.arena.repository::<T>()?.find_by_id_at(id, self.depth)
    }

    /// Resolve the far side of a many-to-many relation through its join
    /// table.
    pub fn join_targets<T: Entity>(
        &mut self,
        join_table: &str,
        source_id: &Value,
    ) -> Result<Vec<T>, Error> {
        let ids = self.arena.join_targets(join_table, source_id);
        self.materialize_ids(ids)
    }

    /// The owning side of a many-to-many relation.
    pub fn join_sources<T: Entity>(
        &mut self,
        join_table: &str,
        target_id: &Value,
    ) -> Result<Vec<T>, Error> {
        let ids = self.arena.join_sources(join_table, target_id);
        self.materialize_ids(ids)
    }

    fn materialize_ids<T: Entity>(&mut self, ids: Vec<Value>) -> Result<Vec<T>, Error> {
        if self.depth >= MAX_RELATION_DEPTH {
            return Ok(Vec::new());
        }
        let repo = self.arena.repository::<T>()?;
        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            if let Some(entity) = repo.find_by_id_at(&id, self.depth)? {
                out.push(entity);
            }
        }
        Ok(out)
    }
}
