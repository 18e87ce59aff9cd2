use crate::model::field::TypeCode;
use std::fmt::{self, Display};

///
/// Operator
///
/// Condition operators as tagged variants. Typed dispatch over
/// `(operator, type code)` happens once at compilation and once per
/// executed condition, never through string comparison.
///

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Operator {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Between,
    In,
    NotIn,
    StartsWith,
    EndsWith,
    Contains,
    NotContains,
    IsNull,
    IsNotNull,
}

impl Operator {
    /// Argument slots the operator consumes from the bound argument row.
    #[must_use]
    pub const fn arg_slots(self) -> usize {
        match self {
            Self::IsNull | Self::IsNotNull => 0,
            Self::Between => 2,
            _ => 1,
        }
    }

    /// Operators that compare by order rather than identity.
    #[must_use]
    pub const fn is_ordering(self) -> bool {
        matches!(self, Self::Gt | Self::Gte | Self::Lt | Self::Lte | Self::Between)
    }

    /// String-anchor operators.
    #[must_use]
    pub const fn is_text(self) -> bool {
        matches!(
            self,
            Self::StartsWith | Self::EndsWith | Self::Contains | Self::NotContains
        )
    }

    /// Whether the operator is implemented for a column of `code` at all.
    /// Ordering on STRING additionally requires a declared range index,
    /// which the compiler checks separately.
    #[must_use]
    pub const fn supported_for(self, code: TypeCode) -> bool {
        match self {
            Self::Eq | Self::Ne | Self::In | Self::NotIn | Self::IsNull | Self::IsNotNull => true,
            Self::Gt | Self::Gte | Self::Lt | Self::Lte | Self::Between => {
                code.is_numeric() || matches!(code, TypeCode::CHAR | TypeCode::STRING)
            }
            Self::StartsWith | Self::EndsWith | Self::Contains | Self::NotContains => {
                matches!(code, TypeCode::STRING)
            }
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Eq => "eq",
            Self::Ne => "ne",
            Self::Gt => "gt",
            Self::Gte => "gte",
            Self::Lt => "lt",
            Self::Lte => "lte",
            Self::Between => "between",
            Self::In => "in",
            Self::NotIn => "not_in",
            Self::StartsWith => "starts_with",
            Self::EndsWith => "ends_with",
            Self::Contains => "contains",
            Self::NotContains => "not_contains",
            Self::IsNull => "is_null",
            Self::IsNotNull => "is_not_null",
        }
    }
}

impl Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn slot_consumption() {
        assert_eq!(Operator::IsNull.arg_slots(), 0);
        assert_eq!(Operator::Eq.arg_slots(), 1);
        assert_eq!(Operator::Between.arg_slots(), 2);
    }

    #[test]
    fn text_operators_are_string_only() {
        assert!(Operator::StartsWith.supported_for(TypeCode::STRING));
        assert!(!Operator::StartsWith.supported_for(TypeCode::LONG));
    }

    #[test]
    fn ordering_excludes_bool() {
        assert!(!Operator::Gt.supported_for(TypeCode::BOOL));
        assert!(Operator::Gt.supported_for(TypeCode::CHAR));
        assert!(Operator::Between.supported_for(TypeCode::DOUBLE));
    }
}
