use crate::{
    MAX_INDEX_FIELDS,
    config::ArenaConfig,
    db::{
        executor::{load::Materializer, save::Saver},
        index::{key::KeyAtom, set::IndexSet},
        query::{compile::compile, compiled::CompiledQuery, descriptor::MethodDescriptor},
        repository::{Repository, RepositoryPlan},
        store::table::Table,
    },
    error::{Error, PlanError, RegistryError},
    model::{
        descriptor::RelationKind,
        entity::{EntityModel, RelationModel},
        field::{FieldModel, TypeCode},
        index::IndexModel,
    },
    traits::Entity,
    value::Value,
};
use parking_lot::RwLock;
use std::{
    any::{Any, TypeId},
    collections::HashMap,
    sync::{Arc, atomic::AtomicI64},
};

///
/// ColumnMeta
/// Type-erased column descriptor shared by the compiler and the kernel.
///

#[derive(Clone, Copy, Debug)]
pub(crate) struct ColumnMeta {
    pub(crate) path: &'static str,
    pub(crate) type_code: TypeCode,
    pub(crate) nullable: bool,
}

///
/// RelationMeta
/// Type-erased relation descriptor with its target resolved to a slot.
///

#[derive(Clone, Copy, Debug)]
pub(crate) struct RelationMeta {
    pub(crate) name: &'static str,
    pub(crate) kind: RelationKind,
    pub(crate) target: usize,
    pub(crate) fk_path: Option<&'static str>,
}

///
/// EntityRuntime
///
/// The type-erased steady-state object for one entity: its table, its
/// indexes, and the column metadata the compiler and kernel consult. The
/// typed side (access plans, saver, materializer) lives in the
/// `RepositoryPlan` keyed by the entity's Rust type.
///

pub(crate) struct EntityRuntime {
    pub(crate) name: &'static str,
    pub(crate) table: Arc<Table>,
    pub(crate) indexes: Arc<IndexSet>,
    pub(crate) columns: Box<[ColumnMeta]>,
    pub(crate) id_column: usize,
    pub(crate) relations: Vec<RelationMeta>,
    /// Identity-strategy source, advanced past every explicit id seen.
    pub(crate) id_counter: AtomicI64,
    path_map: HashMap<&'static str, usize>,
}

impl EntityRuntime {
    pub(crate) fn column_of(&self, path: &str) -> Option<usize> {
        self.path_map.get(path).copied()
    }
}

///
/// JoinTable
///
/// Many-to-many pair store: (source id, target id), indexed both ways.
/// Pairs are registered by cascade hooks; dead ids are filtered at load
/// through the liveness check of the target lookup.
///

pub(crate) struct JoinTable {
    forward: RwLock<HashMap<KeyAtom, Vec<Value>>>,
    reverse: RwLock<HashMap<KeyAtom, Vec<Value>>>,
}

impl JoinTable {
    fn new() -> Self {
        Self {
            forward: RwLock::new(HashMap::new()),
            reverse: RwLock::new(HashMap::new()),
        }
    }

    fn link(&self, source: &Value, target: &Value) {
        let (Some(s), Some(t)) = (KeyAtom::from_value(source), KeyAtom::from_value(target)) else {
            return;
        };
        let mut forward = self.forward.write();
        let entries = forward.entry(s).or_default();
        if !entries.contains(target) {
            entries.push(target.clone());
        }
        drop(forward);

        let mut reverse = self.reverse.write();
        let entries = reverse.entry(t).or_default();
        if !entries.contains(source) {
            entries.push(source.clone());
        }
    }

    fn targets_of(&self, source: &Value) -> Vec<Value> {
        KeyAtom::from_value(source)
            .and_then(|k| self.forward.read().get(&k).cloned())
            .unwrap_or_default()
    }

    fn sources_of(&self, target: &Value) -> Vec<Value> {
        KeyAtom::from_value(target)
            .and_then(|k| self.reverse.read().get(&k).cloned())
            .unwrap_or_default()
    }
}

type FinishFn = Box<
    dyn FnOnce(
        usize,
        Vec<usize>,
        Vec<IndexModel>,
        Box<[CompiledQuery]>,
        HashMap<&'static str, usize>,
    ) -> Arc<dyn Any + Send + Sync>,
>;

struct PendingEntity {
    name: &'static str,
    type_id: TypeId,
    columns: Box<[ColumnMeta]>,
    id_column: usize,
    relations_raw: Vec<RawRelation>,
    index_descriptors: Vec<crate::model::descriptor::IndexDescriptor>,
    queries: Vec<MethodDescriptor>,
    finish: FinishFn,
}

#[derive(Clone, Copy)]
struct RawRelation {
    name: &'static str,
    kind: RelationKind,
    target: &'static str,
    fk_path: Option<&'static str>,
    join_table: Option<&'static str>,
}

///
/// ArenaBuilder
///
/// Registration front door. Entities declare themselves, queries attach to
/// registered entities, and `build` performs the whole wiring pass: table
/// generation, index construction, relation resolution, query compilation,
/// and repository assembly. Any failure aborts the build; there is no
/// partially-initialized arena.
///

pub struct ArenaBuilder {
    config: ArenaConfig,
    pending: Vec<PendingEntity>,
}

impl ArenaBuilder {
    #[must_use]
    pub fn new(config: ArenaConfig) -> Self {
        Self {
            config,
            pending: Vec::new(),
        }
    }

    /// Register an entity from its descriptor.
    pub fn register<E: Entity>(&mut self) -> Result<(), Error> {
        let descriptor = E::descriptor();
        let type_id = TypeId::of::<E>();

        if self
            .pending
            .iter()
            .any(|p| p.name == descriptor.name || p.type_id == type_id)
        {
            return Err(RegistryError::DuplicateRegistration {
                name: descriptor.name,
            }
            .into());
        }

        let id_override = self.config.id_column_override;
        let id_column = descriptor
            .fields
            .iter()
            .position(|f| f.is_id || id_override == Some(f.path))
            .ok_or(RegistryError::MissingId {
                entity: descriptor.name,
            })?;

        for field in &descriptor.fields {
            if field.type_code.raw() > TypeCode::STRING.raw() {
                return Err(RegistryError::UnsupportedType {
                    entity: descriptor.name,
                    path: field.path,
                    type_code: field.type_code,
                }
                .into());
            }
        }

        let columns: Box<[ColumnMeta]> = descriptor
            .fields
            .iter()
            .map(|f| ColumnMeta {
                path: f.path,
                type_code: f.type_code,
                nullable: f.nullable,
            })
            .collect();

        let relations_raw = descriptor
            .relations
            .iter()
            .map(|r| RawRelation {
                name: r.name,
                kind: r.kind,
                target: r.target,
                fk_path: r.fk_path,
                join_table: r.join_table,
            })
            .collect();

        let name = descriptor.name;
        let index_descriptors = descriptor.indexes.clone();
        let finish: FinishFn = Box::new(
            move |entity, targets: Vec<usize>, index_models, queries, query_ids| {
                let fields: Vec<FieldModel> = descriptor
                    .fields
                    .iter()
                    .enumerate()
                    .map(|(i, f)| FieldModel {
                        path: f.path,
                        type_code: f.type_code,
                        nullable: f.nullable,
                        is_id: i == id_column,
                        column_position: Some(i),
                    })
                    .collect();
                let plans: Vec<_> = descriptor
                    .fields
                    .iter()
                    .enumerate()
                    .map(|(i, f)| crate::model::access::ColumnAccessPlan {
                        path: f.path,
                        column: i,
                        type_code: f.type_code,
                        nullable: f.nullable,
                        get: f.get,
                        set: f.set,
                    })
                    .collect();
                let relations: Vec<RelationModel<E>> = descriptor
                    .relations
                    .into_iter()
                    .zip(targets)
                    .map(|(r, target)| RelationModel {
                        name: r.name,
                        kind: r.kind,
                        target_name: r.target,
                        target,
                        fk_path: r.fk_path,
                        join_table: r.join_table,
                        cascade_save: r.cascade_save,
                        load: r.load,
                    })
                    .collect();

                let model = Arc::new(EntityModel::new(
                    name,
                    fields,
                    plans,
                    id_column,
                    descriptor.id_strategy,
                    relations,
                    index_models,
                ));

                let saver = Saver::new(Arc::clone(&model), entity);
                let materializer = Materializer::new(Arc::clone(&model));

                Arc::new(RepositoryPlan {
                    entity,
                    model,
                    queries,
                    query_ids,
                    saver,
                    materializer,
                }) as Arc<dyn Any + Send + Sync>
            },
        );

        tracing::debug!(entity = name, columns = columns.len(), "entity registered");

        self.pending.push(PendingEntity {
            name,
            type_id,
            columns,
            id_column,
            relations_raw,
            index_descriptors,
            queries: Vec::new(),
            finish,
        });

        Ok(())
    }

    /// Attach method descriptors to a registered entity. Compilation
    /// happens at `build`, once every relation target is known.
    pub fn queries<E: Entity>(&mut self, queries: Vec<MethodDescriptor>) -> Result<(), Error> {
        let type_id = TypeId::of::<E>();
        let pending = self
            .pending
            .iter_mut()
            .find(|p| p.type_id == type_id)
            .ok_or_else(|| RegistryError::EntityNotRegistered {
                name: std::any::type_name::<E>().to_owned(),
            })?;
        pending.queries.extend(queries);
        Ok(())
    }

    pub fn build(self) -> Result<Arena, Error> {
        let config = self.config;
        if config.page_size == 0 || config.max_pages == 0 {
            return Err(RegistryError::InvalidConfig {
                message: format!(
                    "page geometry must be non-zero (page_size={}, max_pages={})",
                    config.page_size, config.max_pages
                ),
            }
            .into());
        }

        let by_name: HashMap<&'static str, usize> = self
            .pending
            .iter()
            .enumerate()
            .map(|(i, p)| (p.name, i))
            .collect();
        let by_type: HashMap<TypeId, usize> = self
            .pending
            .iter()
            .enumerate()
            .map(|(i, p)| (p.type_id, i))
            .collect();

        // Phase 1: tables, indexes, and erased runtimes.
        let mut runtimes = Vec::with_capacity(self.pending.len());
        let mut per_entity_indexes = Vec::with_capacity(self.pending.len());
        let mut per_entity_targets = Vec::with_capacity(self.pending.len());
        let mut joins: HashMap<&'static str, JoinTable> = HashMap::new();

        for pending in &self.pending {
            let index_models = resolve_indexes(pending)?;
            let column_spec: Vec<(TypeCode, bool)> = pending
                .columns
                .iter()
                .map(|c| (c.type_code, c.nullable))
                .collect();
            let table = Arc::new(Table::new(&column_spec, config.page_size, config.max_pages));
            let indexes = Arc::new(IndexSet::build(
                &index_models,
                config.enable_prefix_index,
                config.enable_suffix_index,
            ));

            let path_map: HashMap<&'static str, usize> = pending
                .columns
                .iter()
                .enumerate()
                .map(|(i, c)| (c.path, i))
                .collect();

            let mut targets = Vec::with_capacity(pending.relations_raw.len());
            for raw in &pending.relations_raw {
                let target = *by_name.get(raw.target).ok_or_else(|| {
                    RegistryError::EntityNotRegistered {
                        name: raw.target.to_owned(),
                    }
                })?;
                targets.push(target);
                if let Some(join) = raw.join_table {
                    joins.entry(join).or_insert_with(JoinTable::new);
                }
            }

            // Relation metadata for the compiler, re-derived from the
            // typed descriptors captured in `finish`.
            runtimes.push(EntityRuntime {
                name: pending.name,
                table,
                indexes,
                columns: pending.columns.clone(),
                id_column: pending.id_column,
                relations: Vec::new(),
                id_counter: AtomicI64::new(0),
                path_map,
            });
            per_entity_indexes.push(index_models);
            per_entity_targets.push(targets);
        }

        // Phase 2: relation metadata now that every slot exists.
        for (i, pending) in self.pending.iter().enumerate() {
            runtimes[i].relations = pending
                .relations_raw
                .iter()
                .zip(&per_entity_targets[i])
                .map(|(raw, &target)| RelationMeta {
                    name: raw.name,
                    kind: raw.kind,
                    target,
                    fk_path: raw.fk_path,
                })
                .collect();
        }

        // Phase 3: query compilation against the full catalog.
        let mut compiled_per_entity = Vec::with_capacity(self.pending.len());
        for (i, pending) in self.pending.iter().enumerate() {
            let mut compiled = Vec::with_capacity(pending.queries.len());
            let mut query_ids = HashMap::new();
            for (q, descriptor) in pending.queries.iter().enumerate() {
                compiled.push(compile(i, &runtimes, descriptor)?);
                query_ids.insert(descriptor.name, q);
            }
            compiled_per_entity.push((compiled.into_boxed_slice(), query_ids));
        }

        // Phase 4: typed repository plans.
        let mut plans: Vec<Arc<dyn Any + Send + Sync>> = Vec::with_capacity(self.pending.len());
        for (i, (pending, (queries, query_ids))) in self
            .pending
            .into_iter()
            .zip(compiled_per_entity)
            .enumerate()
        {
            let targets = std::mem::take(&mut per_entity_targets[i]);
            let index_models = std::mem::take(&mut per_entity_indexes[i]);
            plans.push((pending.finish)(i, targets, index_models, queries, query_ids));
        }

        tracing::debug!(entities = runtimes.len(), "arena built");

        Ok(Arena {
            inner: Arc::new(ArenaInner {
                config,
                runtimes,
                plans,
                by_name,
                by_type,
                joins,
            }),
        })
    }
}

fn resolve_indexes(pending: &PendingEntity) -> Result<Vec<IndexModel>, Error> {
    let column_of = |path: &str| {
        pending
            .columns
            .iter()
            .position(|c| c.path == path)
            .ok_or_else(|| PlanError::InvalidPropertyPath {
                entity: pending.name,
                path: path.to_owned(),
            })
    };

    let mut models = Vec::with_capacity(pending.index_descriptors.len());
    for descriptor in &pending.index_descriptors {
        let field_count = descriptor.fields.len();
        let arity_ok = if descriptor.kind.is_composite() {
            (2..=MAX_INDEX_FIELDS).contains(&field_count)
        } else {
            field_count == 1
        };
        if !arity_ok {
            return Err(RegistryError::InvalidConfig {
                message: format!(
                    "index {} declares {field_count} fields for kind {}",
                    descriptor.name,
                    descriptor.kind.name()
                ),
            }
            .into());
        }

        let mut columns = smallvec::SmallVec::new();
        for &path in descriptor.fields {
            let column = column_of(path)?;
            if descriptor.kind.is_text()
                && pending.columns[column].type_code != TypeCode::STRING
            {
                return Err(RegistryError::UnsupportedType {
                    entity: pending.name,
                    path,
                    type_code: pending.columns[column].type_code,
                }
                .into());
            }
            columns.push(column);
        }

        models.push(IndexModel {
            name: descriptor.name,
            kind: descriptor.kind,
            fields: descriptor.fields.iter().copied().collect(),
            columns,
        });
        tracing::debug!(entity = pending.name, index = descriptor.name, "index built");
    }
    Ok(models)
}

///
/// ArenaInner
///

pub(crate) struct ArenaInner {
    pub(crate) config: ArenaConfig,
    pub(crate) runtimes: Vec<EntityRuntime>,
    plans: Vec<Arc<dyn Any + Send + Sync>>,
    by_name: HashMap<&'static str, usize>,
    by_type: HashMap<TypeId, usize>,
    joins: HashMap<&'static str, JoinTable>,
}

///
/// Arena
///
/// The owning container for all tables, indexes, and repositories of one
/// logical store. Cheap to clone; repositories are handles into it.
///

#[derive(Clone)]
pub struct Arena {
    pub(crate) inner: Arc<ArenaInner>,
}

impl std::fmt::Debug for Arena {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Arena").finish_non_exhaustive()
    }
}

impl Arena {
    #[must_use]
    pub fn builder(config: ArenaConfig) -> ArenaBuilder {
        ArenaBuilder::new(config)
    }

    /// The repository handle for a registered entity type.
    pub fn repository<E: Entity>(&self) -> Result<Repository<E>, Error> {
        let ix = self
            .inner
            .by_type
            .get(&TypeId::of::<E>())
            .copied()
            .ok_or_else(|| RegistryError::EntityNotRegistered {
                name: std::any::type_name::<E>().to_owned(),
            })?;
        let plan = Arc::clone(&self.inner.plans[ix])
            .downcast::<RepositoryPlan<E>>()
            .map_err(|_| RegistryError::EntityNotRegistered {
                name: std::any::type_name::<E>().to_owned(),
            })?;
        Ok(Repository::new(self.clone(), plan))
    }

    #[must_use]
    pub fn entity_slot(&self, name: &str) -> Option<usize> {
        self.inner.by_name.get(name).copied()
    }

    #[must_use]
    pub fn config(&self) -> &ArenaConfig {
        &self.inner.config
    }

    pub(crate) fn runtimes(&self) -> &[EntityRuntime] {
        &self.inner.runtimes
    }

    pub(crate) fn join_link(&self, join_table: &str, source: &Value, target: &Value) {
        if let Some(join) = self.inner.joins.get(join_table) {
            join.link(source, target);
        }
    }

    pub(crate) fn join_targets(&self, join_table: &str, source: &Value) -> Vec<Value> {
        self.inner
            .joins
            .get(join_table)
            .map(|j| j.targets_of(source))
            .unwrap_or_default()
    }

    pub(crate) fn join_sources(&self, join_table: &str, target: &Value) -> Vec<Value> {
        self.inner
            .joins
            .get(join_table)
            .map(|j| j.sources_of(target))
            .unwrap_or_default()
    }
}
