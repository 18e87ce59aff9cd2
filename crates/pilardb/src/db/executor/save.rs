use crate::{
    db::{
        arena::{Arena, EntityRuntime},
        index::key::KeyAtom,
    },
    error::{Error, ExecutorError},
    model::{
        descriptor::{CascadeSaveFn, IdStrategy},
        entity::EntityModel,
        field::TypeCode,
    },
    traits::Entity,
    value::Value,
};
use std::{collections::HashSet, sync::Arc, sync::atomic::Ordering};
use uuid::Uuid;
use xxhash_rust::xxh3::Xxh3Builder;

///
/// SaveStack
///
/// Entities already being written on the current cascade path, keyed by
/// `(entity slot, id)`. A revisit returns without touching the row again;
/// the FK value the revisiting hook stamped is all that survives, which is
/// what terminates A -> B -> A graphs.
///

pub(crate) struct SaveStack {
    visited: HashSet<(usize, KeyAtom), Xxh3Builder>,
}

impl SaveStack {
    pub(crate) fn new() -> Self {
        Self {
            visited: HashSet::with_hasher(Xxh3Builder::new()),
        }
    }

    /// Returns `false` when the entity is already on the path.
    fn visit(&mut self, entity: usize, key: KeyAtom) -> bool {
        self.visited.insert((entity, key))
    }
}

///
/// CascadeCtx
///
/// Handed to cascade hooks after the owning row is written. Hooks drive
/// their owned children back through the arena with the shared visit
/// stack, so cycles terminate and every child lands in the same pass.
///

pub struct CascadeCtx<'a> {
    pub(crate) arena: &'a Arena,
    pub(crate) stack: &'a mut SaveStack,
}

impl CascadeCtx<'_> {
    /// Save an owned child on the current cascade path.
    pub fn save<T: Entity>(&mut self, entity: T) -> Result<T, Error> {
        self.arena
            .repository::<T>()?
            .save_with_stack(entity, self.stack)
    }

    /// Record a many-to-many pair in the named join table. Idempotent.
    pub fn link(&mut self, join_table: &str, source: &Value, target: &Value) {
        self.arena.join_link(join_table, source, target);
    }
}

///
/// Saver
///
/// Compiled once per entity class. Carries the access plans, the id
/// strategy, and the cascade hooks; the row write follows the ordering
/// discipline of the table layer (seqlock, cells, publish, indexes, id).
///

pub(crate) struct Saver<E: Entity> {
    model: Arc<EntityModel<E>>,
    entity: usize,
    cascades: Box<[CascadeSaveFn<E>]>,
}

impl<E: Entity> Saver<E> {
    pub(crate) fn new(model: Arc<EntityModel<E>>, entity: usize) -> Self {
        let cascades = model
            .relations
            .iter()
            .filter_map(|r| r.cascade_save)
            .collect();
        Self {
            model,
            entity,
            cascades,
        }
    }

    /// Insert-or-update one entity, then cascade. Returns the stored image
    /// with any generated id assigned.
    pub(crate) fn save(
        &self,
        arena: &Arena,
        runtime: &EntityRuntime,
        entity: &E,
        stack: &mut SaveStack,
    ) -> Result<E, Error> {
        let mut stored = entity.clone();
        let id = self.resolve_id(runtime, &mut stored)?;
        let key = KeyAtom::from_value(&id).ok_or_else(|| ExecutorError::IdGenerationFailure {
            entity: self.model.name,
            reason: format!("id value {id} cannot key the primary index"),
        })?;

        // Already being written further up this cascade path.
        if !stack.visit(self.entity, key.clone()) {
            return Ok(stored);
        }

        let table = &runtime.table;
        let values: Vec<Value> = self.model.plans.iter().map(|p| p.read(&stored)).collect();

        let existing = table.id_lookup(&key).filter(|r| table.is_live(*r));
        if let Some(rowref) = existing {
            // Update in place: overwrite cells under the row seqlock, then
            // re-key whichever indexes the new image moved.
            let row = rowref.row();
            let odd = table.begin_write(row)?;
            let old: Vec<Value> = (0..self.model.plans.len())
                .map(|c| table.read_cell(c, row))
                .collect();
            for (column, value) in values.iter().enumerate() {
                table.set_cell(column, row, value)?;
            }
            table.end_write(row, odd);
            runtime.indexes.update_row(&old, &values, rowref);
        } else {
            let rowref = table.allocate_row()?;
            let row = rowref.row();
            let odd = table.begin_write(row)?;
            for (column, value) in values.iter().enumerate() {
                table.set_cell(column, row, value)?;
            }
            table.end_write(row, odd);
            table.publish_row(row);
            table.note_insert();
            runtime.indexes.insert_row(&values, rowref);
            table.id_insert(key, rowref);
        }

        if !self.cascades.is_empty() {
            let mut ctx = CascadeCtx { arena, stack };
            for cascade in &self.cascades {
                cascade(&stored, &id, &mut ctx)?;
            }
        }

        Ok(stored)
    }

    /// Assign an id when absent, advance the identity counter when not.
    fn resolve_id(&self, runtime: &EntityRuntime, stored: &mut E) -> Result<Value, Error> {
        let id_plan = self.model.id_plan();
        let current = id_plan.read(stored);
        if !current.is_null() {
            if let (IdStrategy::Identity, Some(n)) = (self.model.id_strategy, current.as_long()) {
                runtime.id_counter.fetch_max(n, Ordering::AcqRel);
            }
            return Ok(current);
        }

        let generated = match self.model.id_strategy {
            IdStrategy::Identity => {
                let next = runtime.id_counter.fetch_add(1, Ordering::AcqRel) + 1;
                match self.model.id_type {
                    TypeCode::LONG => Value::Long(next),
                    #[allow(clippy::cast_possible_truncation)]
                    TypeCode::INT => Value::Int(next as i32),
                    other => {
                        return Err(ExecutorError::IdGenerationFailure {
                            entity: self.model.name,
                            reason: format!("identity strategy on non-integer id column ({other})"),
                        }
                        .into());
                    }
                }
            }
            IdStrategy::Uuid => {
                if self.model.id_type != TypeCode::STRING {
                    return Err(ExecutorError::IdGenerationFailure {
                        entity: self.model.name,
                        reason: "uuid strategy requires a string id column".to_owned(),
                    }
                    .into());
                }
                Value::from(Uuid::new_v4().to_string())
            }
            IdStrategy::Custom(generate) => {
                let value = generate();
                if value.is_null() {
                    return Err(ExecutorError::IdGenerationFailure {
                        entity: self.model.name,
                        reason: "custom generator returned null".to_owned(),
                    }
                    .into());
                }
                let duplicate = KeyAtom::from_value(&value)
                    .and_then(|k| runtime.table.id_lookup(&k))
                    .is_some_and(|r| runtime.table.is_live(r));
                if duplicate {
                    return Err(ExecutorError::IdGenerationFailure {
                        entity: self.model.name,
                        reason: format!("custom generator returned duplicate id {value}"),
                    }
                    .into());
                }
                value
            }
        };

        id_plan.write(stored, generated.clone());
        Ok(generated)
    }
}
