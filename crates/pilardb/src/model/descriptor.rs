use crate::{
    db::executor::{load::LoadCtx, save::CascadeCtx},
    error::Error,
    model::{
        access::{GetFn, SetFn},
        field::TypeCode,
        index::IndexKind,
    },
    value::Value,
};

///
/// EntityDescriptor
///
/// Registration input for one entity class: ordered storable fields,
/// id generation strategy, declared relations, declared indexes. These are
/// pure descriptors; the core contains no derive or reflection machinery,
/// and accessors are plain function pointers compiled by the caller.
///

pub struct EntityDescriptor<E> {
    pub name: &'static str,
    pub fields: Vec<FieldDescriptor<E>>,
    pub id_strategy: IdStrategy,
    pub relations: Vec<RelationDescriptor<E>>,
    pub indexes: Vec<IndexDescriptor>,
}

impl<E> EntityDescriptor<E> {
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            fields: Vec::new(),
            id_strategy: IdStrategy::Identity,
            relations: Vec::new(),
            indexes: Vec::new(),
        }
    }

    #[must_use]
    pub fn field(mut self, field: FieldDescriptor<E>) -> Self {
        self.fields.push(field);
        self
    }

    #[must_use]
    pub fn id_strategy(mut self, strategy: IdStrategy) -> Self {
        self.id_strategy = strategy;
        self
    }

    #[must_use]
    pub fn relation(mut self, relation: RelationDescriptor<E>) -> Self {
        self.relations.push(relation);
        self
    }

    #[must_use]
    pub fn index(mut self, index: IndexDescriptor) -> Self {
        self.indexes.push(index);
        self
    }
}

///
/// FieldDescriptor
///
/// One storable field: dotted path, type code, and the compiled accessor
/// pair. Column positions are assigned later, at table generation, in
/// declaration order.
///

pub struct FieldDescriptor<E> {
    pub path: &'static str,
    pub type_code: TypeCode,
    pub nullable: bool,
    pub is_id: bool,
    pub get: GetFn<E>,
    pub set: SetFn<E>,
}

impl<E> FieldDescriptor<E> {
    #[must_use]
    pub fn new(path: &'static str, type_code: TypeCode, get: GetFn<E>, set: SetFn<E>) -> Self {
        Self {
            path,
            type_code,
            nullable: false,
            is_id: false,
            get,
            set,
        }
    }

    #[must_use]
    pub const fn nullable(mut self) -> Self {
        self.nullable = true;
        self
    }

    /// Mark this field as the primary key. Id fields are implicitly
    /// nullable on the way in (absent id requests generation).
    #[must_use]
    pub const fn id(mut self) -> Self {
        self.is_id = true;
        self.nullable = true;
        self
    }
}

///
/// IdStrategy
///

#[derive(Clone, Copy)]
pub enum IdStrategy {
    /// Monotonically increasing counter scoped to the entity's table,
    /// initialized from the maximum observed id.
    Identity,
    /// Random 128-bit value stored as a string.
    Uuid,
    /// User-provided generator; a null or duplicate result surfaces
    /// `IdGenerationFailure`.
    Custom(fn() -> Value),
}

///
/// IndexDescriptor
///

#[derive(Clone, Copy, Debug)]
pub struct IndexDescriptor {
    pub name: &'static str,
    pub fields: &'static [&'static str],
    pub kind: IndexKind,
}

impl IndexDescriptor {
    #[must_use]
    pub const fn new(name: &'static str, fields: &'static [&'static str], kind: IndexKind) -> Self {
        Self { name, fields, kind }
    }
}

///
/// RelationKind
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum RelationKind {
    OneToOne,
    OneToMany,
    ManyToOne,
    ManyToMany,
}

/// Cascade hook invoked after the owning row is saved; receives the owner
/// and its (possibly freshly generated) id for FK stamping.
pub type CascadeSaveFn<E> = fn(&E, &Value, &mut CascadeCtx<'_>) -> Result<(), Error>;

/// Eager-load hook invoked while materializing the owner.
pub type RelationLoadFn<E> = fn(&mut E, &Value, &mut LoadCtx<'_>) -> Result<(), Error>;

///
/// RelationDescriptor
///
/// One declared relationship. `name` is the path segment queries navigate
/// (`orders` in `orders.status`); `fk_path` names the FK column: on this
/// entity for `ManyToOne`/`OneToOne` owners, on the child for `OneToMany`.
/// `ManyToMany` relations route through a named join table instead.
///
/// The hook pair is the monomorphized stand-in for reflective cascade
/// traversal: each hook knows the concrete child type and drives it through
/// the public repository surface.
///

pub struct RelationDescriptor<E> {
    pub name: &'static str,
    pub kind: RelationKind,
    pub target: &'static str,
    pub fk_path: Option<&'static str>,
    pub join_table: Option<&'static str>,
    pub cascade_save: Option<CascadeSaveFn<E>>,
    pub load: Option<RelationLoadFn<E>>,
}

impl<E> RelationDescriptor<E> {
    #[must_use]
    pub const fn new(name: &'static str, kind: RelationKind, target: &'static str) -> Self {
        Self {
            name,
            kind,
            target,
            fk_path: None,
            join_table: None,
            cascade_save: None,
            load: None,
        }
    }

    #[must_use]
    pub const fn fk(mut self, path: &'static str) -> Self {
        self.fk_path = Some(path);
        self
    }

    #[must_use]
    pub const fn join_table(mut self, name: &'static str) -> Self {
        self.join_table = Some(name);
        self
    }

    #[must_use]
    pub const fn on_save(mut self, hook: CascadeSaveFn<E>) -> Self {
        self.cascade_save = Some(hook);
        self
    }

    #[must_use]
    pub const fn on_load(mut self, hook: RelationLoadFn<E>) -> Self {
        self.load = Some(hook);
        self
    }
}
