use crate::{model::field::TypeCode, value::Value};

/// Compiled getter navigating a (possibly embedded) field of a user object.
pub type GetFn<E> = fn(&E) -> Value;

/// Compiled setter writing a leaf value back into a user object. Setters for
/// embedded paths materialize intermediate objects through `Default` when
/// absent.
pub type SetFn<E> = fn(&mut E, Value);

///
/// ColumnAccessPlan
///
/// Compiled descriptor binding one dotted property path to its column.
/// Paths such as `profile.address.city` are resolved exactly once at
/// registration; at steady state a save or materialization is a direct
/// function call plus a typed cell access, with no string lookups.
///

pub struct ColumnAccessPlan<E> {
    pub path: &'static str,
    pub column: usize,
    pub type_code: TypeCode,
    pub nullable: bool,
    pub get: GetFn<E>,
    pub set: SetFn<E>,
}

impl<E> ColumnAccessPlan<E> {
    /// Read the leaf value from the entity.
    #[inline]
    pub fn read(&self, entity: &E) -> Value {
        (self.get)(entity)
    }

    /// Write the leaf value into the entity.
    #[inline]
    pub fn write(&self, entity: &mut E, value: Value) {
        (self.set)(entity, value);
    }
}

impl<E> Clone for ColumnAccessPlan<E> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<E> Copy for ColumnAccessPlan<E> {}
