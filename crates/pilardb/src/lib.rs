//! Core runtime for pilardb: entity models, paged columns, indexes, the
//! query compiler and execution kernel, and the repository surface exported
//! via the `prelude`.
#![warn(unreachable_pub)]

pub mod config;
pub mod db;
pub mod error;
pub mod model;
pub mod traits;
pub mod value;

///
/// CONSTANTS
///

/// Maximum number of indexed fields allowed on a composite index.
///
/// This limit keeps composite keys within bounded, stack-allocated sizes and
/// simplifies sizing in the index stores.
pub const MAX_INDEX_FIELDS: usize = 4;

/// Maximum relation depth followed during eager materialization.
///
/// Self-referential entity graphs terminate here instead of recursing.
pub const MAX_RELATION_DEPTH: u32 = 8;

// re-exports: the flat surface most callers use
pub use crate::{
    config::ArenaConfig,
    db::{
        arena::{Arena, ArenaBuilder},
        executor::{
            load::LoadCtx,
            save::CascadeCtx,
            trace::{AccessPath, ExecutionTrace, GroupTrace},
        },
        report::{StorageReport, TableReport},
        repository::{QueryId, QueryOutput, Repository},
    },
    error::Error,
    value::Value,
};

///
/// Prelude
///
/// Prelude contains only domain vocabulary.
/// No stores, executors, or internal plumbing are re-exported here.
///

pub mod prelude {
    pub use crate::{
        config::ArenaConfig,
        db::{
            arena::{Arena, ArenaBuilder},
            executor::{load::LoadCtx, save::CascadeCtx},
            repository::{QueryId, QueryOutput, Repository},
        },
        error::Error,
        model::{
            descriptor::{
                EntityDescriptor, FieldDescriptor, IdStrategy, IndexDescriptor, RelationDescriptor,
                RelationKind,
            },
            field::TypeCode,
            index::IndexKind,
        },
        query::{
            ConditionDescriptor, MethodDescriptor, Opcode, Operator, OrderDirection, OrderSpec,
            ProjectionDescriptor, ReturnKind,
        },
        traits::Entity,
        value::Value,
    };
}

/// Query descriptor vocabulary, re-exported one level up for ergonomics.
pub mod query {
    pub use crate::db::query::descriptor::{
        ConditionDescriptor, MethodDescriptor, Opcode, OrderDirection, OrderSpec,
        ProjectionDescriptor, ReturnKind,
    };
    pub use crate::db::query::operator::Operator;
}
