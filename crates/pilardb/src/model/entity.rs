use crate::{
    model::{
        access::ColumnAccessPlan,
        descriptor::{CascadeSaveFn, IdStrategy, RelationKind, RelationLoadFn},
        field::{FieldModel, TypeCode},
        index::IndexModel,
    },
};
use std::collections::HashMap;

///
/// EntityModel
///
/// Resolved runtime model for one entity: ordered field metadata, the
/// per-path compiled access plans, id handling, relations, and index
/// declarations. Built once at arena registration; authoritative for all
/// planning and execution.
///

pub struct EntityModel<E> {
    pub name: &'static str,
    /// Storable fields in declaration order; position == column index.
    pub fields: Vec<FieldModel>,
    /// Access plans parallel to `fields`.
    pub plans: std::sync::Arc<[ColumnAccessPlan<E>]>,
    pub id_column: usize,
    pub id_type: TypeCode,
    pub id_strategy: IdStrategy,
    pub relations: Vec<RelationModel<E>>,
    pub indexes: Vec<IndexModel>,
    /// Dotted path → column position, for registration-time resolution.
    path_map: HashMap<&'static str, usize>,
}

impl<E> EntityModel<E> {
    pub(crate) fn new(
        name: &'static str,
        fields: Vec<FieldModel>,
        plans: Vec<ColumnAccessPlan<E>>,
        id_column: usize,
        id_strategy: IdStrategy,
        relations: Vec<RelationModel<E>>,
        indexes: Vec<IndexModel>,
    ) -> Self {
        let id_type = fields[id_column].type_code;
        let path_map = fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.path, i))
            .collect();

        Self {
            name,
            fields,
            plans: plans.into(),
            id_column,
            id_type,
            id_strategy,
            relations,
            indexes,
            path_map,
        }
    }

    /// Resolve a dotted path to its column position.
    #[must_use]
    pub fn column_of(&self, path: &str) -> Option<usize> {
        self.path_map.get(path).copied()
    }

    /// Resolve a relation by its navigation segment.
    #[must_use]
    pub fn relation_of(&self, segment: &str) -> Option<&RelationModel<E>> {
        self.relations.iter().find(|r| r.name == segment)
    }

    #[must_use]
    pub fn column_count(&self) -> usize {
        self.fields.len()
    }

    #[must_use]
    pub fn type_codes(&self) -> Vec<TypeCode> {
        self.fields.iter().map(|f| f.type_code).collect()
    }

    /// The access plan for the id column.
    #[must_use]
    pub fn id_plan(&self) -> &ColumnAccessPlan<E> {
        &self.plans[self.id_column]
    }
}

///
/// RelationModel
///
/// A declared relation with its target resolved to an arena entity slot.
///

pub struct RelationModel<E> {
    pub name: &'static str,
    pub kind: RelationKind,
    pub target_name: &'static str,
    /// Arena slot of the target entity; resolved at build.
    pub target: usize,
    pub fk_path: Option<&'static str>,
    pub join_table: Option<&'static str>,
    pub cascade_save: Option<CascadeSaveFn<E>>,
    pub load: Option<RelationLoadFn<E>>,
}
