use crate::model::field::TypeCode;
use crate::db::query::operator::Operator;
use thiserror::Error as ThisError;

///
/// Error
///
/// Top-level error surface. The taxonomy is stable: new operators or types
/// extend the enumerations below, never renumber or repurpose existing
/// variants. Registration-time failures abort the arena build; runtime
/// failures are local to the operation that raised them.
///

#[derive(Debug, ThisError)]
pub enum Error {
    #[error(transparent)]
    Registry(#[from] RegistryError),

    #[error(transparent)]
    Plan(#[from] PlanError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Execute(#[from] ExecutorError),
}

impl Error {
    #[must_use]
    pub const fn is_capacity_exceeded(&self) -> bool {
        matches!(self, Self::Store(StoreError::CapacityExceeded { .. }))
    }

    #[must_use]
    pub const fn is_torn_read(&self) -> bool {
        matches!(self, Self::Store(StoreError::TornRead { .. }))
    }
}

///
/// RegistryError
/// Raised while registering entities or assembling the arena.
///

#[derive(Debug, ThisError)]
pub enum RegistryError {
    #[error("entity already registered: {name}")]
    DuplicateRegistration { name: &'static str },

    #[error("entity not registered: {name}")]
    EntityNotRegistered { name: String },

    #[error("unsupported type for field {entity}.{path}: {type_code}")]
    UnsupportedType {
        entity: &'static str,
        path: &'static str,
        type_code: TypeCode,
    },

    #[error("entity {entity} declares no id field")]
    MissingId { entity: &'static str },

    #[error("invalid arena configuration: {message}")]
    InvalidConfig { message: String },
}

///
/// PlanError
/// Raised while compiling a method descriptor, or on a malformed dispatch.
///

#[derive(Debug, ThisError)]
pub enum PlanError {
    #[error("cannot resolve property path {entity}.{path}")]
    InvalidPropertyPath { entity: &'static str, path: String },

    #[error("operator {op} is not supported for {type_code}")]
    UnsupportedOperator { op: Operator, type_code: TypeCode },

    #[error("query {name} binds {declared} arguments but its conditions consume {consumed}")]
    ArityMismatch {
        name: &'static str,
        declared: usize,
        consumed: usize,
    },

    #[error("argument {slot} is not assignable to {type_code}")]
    ArgumentType { slot: usize, type_code: TypeCode },

    #[error("unknown query id {id}")]
    UnknownQuery { id: usize },
}

///
/// StoreError
/// Raised by the columnar table engine.
///

#[derive(Debug, ThisError)]
pub enum StoreError {
    #[error("table capacity exceeded: {pages} pages of {page_size} rows")]
    CapacityExceeded { pages: usize, page_size: usize },

    #[error("torn read on row {row} after bounded retries")]
    TornRead { row: u32 },
}

///
/// ExecutorError
/// Raised during save/load execution.
///

#[derive(Debug, ThisError)]
pub enum ExecutorError {
    #[error("id generation failed for {entity}: {reason}")]
    IdGenerationFailure { entity: &'static str, reason: String },
}
