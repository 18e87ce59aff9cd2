use crate::{
    db::{
        arena::EntityRuntime,
        query::{
            compiled::{
                ColumnCondition, CompiledCondition, CompiledOrder, CompiledQuery,
                RelationCondition, RelationTarget,
            },
            descriptor::{ConditionDescriptor, MethodDescriptor, ReturnKind},
        },
    },
    error::PlanError,
    model::{descriptor::RelationKind, field::TypeCode},
};

///
/// Compilation: method descriptor -> column-indexed compiled query.
///
/// Every property path is resolved here, argument slots are assigned in
/// descriptor order, and operator/type support is validated, so execution
/// never revisits any of it. Failures abort registration.
///

pub(crate) fn compile(
    entity: usize,
    runtimes: &[EntityRuntime],
    descriptor: &MethodDescriptor,
) -> Result<CompiledQuery, PlanError> {
    let runtime = &runtimes[entity];
    let mut slots = SlotCounter::default();

    // Shared filter conditions bind their slots once, in descriptor order,
    // before any OR group's own conditions.
    let shared: Vec<CompiledCondition> = descriptor
        .conditions
        .iter()
        .map(|c| compile_condition(entity, runtimes, c, &mut slots))
        .collect::<Result<_, _>>()?;

    let groups: Vec<Vec<CompiledCondition>> = if descriptor.or_groups.is_empty() {
        if shared.is_empty() {
            Vec::new()
        } else {
            vec![shared]
        }
    } else {
        descriptor
            .or_groups
            .iter()
            .map(|group| {
                let mut compiled = shared.clone();
                for c in group {
                    compiled.push(compile_condition(entity, runtimes, c, &mut slots)?);
                }
                Ok(compiled)
            })
            .collect::<Result<_, _>>()?
    };

    if slots.consumed != descriptor.arity {
        return Err(PlanError::ArityMismatch {
            name: descriptor.name,
            declared: descriptor.arity,
            consumed: slots.consumed,
        });
    }

    let order_by = descriptor
        .order_by
        .map(|spec| {
            let column = resolve_local(runtime, spec.path)?;
            Ok::<_, PlanError>(CompiledOrder {
                column,
                direction: spec.direction,
            })
        })
        .transpose()?;

    let projection = descriptor
        .projection
        .as_ref()
        .map(|p| {
            p.paths
                .iter()
                .map(|path| resolve_local(runtime, path))
                .collect::<Result<Box<[usize]>, _>>()
        })
        .transpose()?;

    let group_key = match descriptor.return_kind {
        ReturnKind::GroupedBy(path) => Some(resolve_local(runtime, path)?),
        _ => None,
    };

    tracing::debug!(
        entity = runtime.name,
        query = descriptor.name,
        groups = groups.len(),
        "query compiled"
    );

    Ok(CompiledQuery {
        name: descriptor.name,
        opcode: descriptor.opcode,
        return_kind: descriptor.return_kind,
        groups,
        order_by,
        limit: descriptor.limit,
        projection,
        group_key,
        arity: descriptor.arity,
    })
}

#[derive(Default)]
struct SlotCounter {
    consumed: usize,
}

impl SlotCounter {
    fn claim(&mut self, slots: usize) -> usize {
        let base = self.consumed;
        self.consumed += slots;
        base
    }
}

fn resolve_local(runtime: &EntityRuntime, path: &str) -> Result<usize, PlanError> {
    runtime
        .column_of(path)
        .ok_or_else(|| PlanError::InvalidPropertyPath {
            entity: runtime.name,
            path: path.to_owned(),
        })
}

fn compile_condition(
    entity: usize,
    runtimes: &[EntityRuntime],
    descriptor: &ConditionDescriptor,
    slots: &mut SlotCounter,
) -> Result<CompiledCondition, PlanError> {
    let runtime = &runtimes[entity];

    // A storable column wins over a relation segment of the same name;
    // embedded dotted paths land here because access plans flattened them
    // into columns at registration.
    if let Some(column) = runtime.column_of(descriptor.path) {
        let cond = column_condition(runtime, column, descriptor, slots)?;
        return Ok(CompiledCondition::Column(cond));
    }

    // Relation navigation: first segment names a declared relation, the
    // remainder resolves against the target entity.
    if let Some((segment, rest)) = descriptor.path.split_once('.')
        && let Some(relation) = runtime.relations.iter().find(|r| r.name == segment)
    {
        let target_runtime = &runtimes[relation.target];
        let column = resolve_local(target_runtime, rest).map_err(|_| {
            PlanError::InvalidPropertyPath {
                entity: runtime.name,
                path: descriptor.path.to_owned(),
            }
        })?;
        let cond = column_condition(target_runtime, column, descriptor, slots)?;

        let fk_path = relation.fk_path.ok_or_else(|| PlanError::InvalidPropertyPath {
            entity: runtime.name,
            path: descriptor.path.to_owned(),
        })?;

        let target = match relation.kind {
            RelationKind::OneToMany => RelationTarget::Children {
                entity: relation.target,
                fk_column: resolve_local(target_runtime, fk_path)?,
            },
            RelationKind::ManyToOne | RelationKind::OneToOne => RelationTarget::Parent {
                entity: relation.target,
                fk_column: resolve_local(runtime, fk_path)?,
            },
            // Join-table navigation is not part of the condition language.
            RelationKind::ManyToMany => {
                return Err(PlanError::InvalidPropertyPath {
                    entity: runtime.name,
                    path: descriptor.path.to_owned(),
                });
            }
        };

        return Ok(CompiledCondition::Relation(RelationCondition {
            target,
            cond,
        }));
    }

    Err(PlanError::InvalidPropertyPath {
        entity: runtime.name,
        path: descriptor.path.to_owned(),
    })
}

fn column_condition(
    runtime: &EntityRuntime,
    column: usize,
    descriptor: &ConditionDescriptor,
    slots: &mut SlotCounter,
) -> Result<ColumnCondition, PlanError> {
    let type_code = runtime.columns[column].type_code;
    let op = descriptor.op;

    if !op.supported_for(type_code) {
        return Err(PlanError::UnsupportedOperator { op, type_code });
    }

    // Ordered comparison over strings has no scan path; it needs the
    // ordered index to exist.
    if op.is_ordering()
        && type_code == TypeCode::STRING
        && runtime.indexes.range_for(column).is_none()
    {
        return Err(PlanError::UnsupportedOperator { op, type_code });
    }

    Ok(ColumnCondition {
        column,
        type_code,
        op,
        ignore_case: descriptor.ignore_case && type_code == TypeCode::STRING,
        arg_base: slots.claim(op.arg_slots()),
    })
}
