use crate::model::field::TypeCode;
use std::{fmt, sync::Arc};

///
/// Value
///
/// Dynamic cell value crossing the entity bridge: every storable field is
/// read and written as one of these variants. Strings are shared
/// reference-counted payloads so materialization clones are cheap.
///
/// `List` is only valid as the bound argument of `In` / `NotIn` conditions;
/// it never appears in a column cell.
///

#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    Null,
    Int(i32),
    Long(i64),
    Bool(bool),
    Byte(i8),
    Short(i16),
    Char(char),
    Float(f32),
    Double(f64),
    Str(Arc<String>),
    List(Vec<Value>),
}

impl Value {
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// The type code this value naturally carries, if it is a scalar.
    #[must_use]
    pub const fn type_code(&self) -> Option<TypeCode> {
        match self {
            Self::Int(_) => Some(TypeCode::INT),
            Self::Long(_) => Some(TypeCode::LONG),
            Self::Bool(_) => Some(TypeCode::BOOL),
            Self::Byte(_) => Some(TypeCode::BYTE),
            Self::Short(_) => Some(TypeCode::SHORT),
            Self::Char(_) => Some(TypeCode::CHAR),
            Self::Float(_) => Some(TypeCode::FLOAT),
            Self::Double(_) => Some(TypeCode::DOUBLE),
            Self::Str(_) => Some(TypeCode::STRING),
            Self::Null | Self::List(_) => None,
        }
    }

    /// Coerce an argument toward a column's type code, widening numerics the
    /// way derived-method argument binding does. Returns `None` when the
    /// value cannot represent the target type.
    #[must_use]
    pub fn coerce_to(&self, target: TypeCode) -> Option<Self> {
        if self.is_null() {
            return Some(Self::Null);
        }
        if self.type_code() == Some(target) {
            return Some(self.clone());
        }

        let widened = match (self, target) {
            (Self::Byte(v), TypeCode::SHORT) => Self::Short(i16::from(*v)),
            (Self::Byte(v), TypeCode::INT) => Self::Int(i32::from(*v)),
            (Self::Byte(v), TypeCode::LONG) => Self::Long(i64::from(*v)),
            (Self::Short(v), TypeCode::INT) => Self::Int(i32::from(*v)),
            (Self::Short(v), TypeCode::LONG) => Self::Long(i64::from(*v)),
            (Self::Int(v), TypeCode::LONG) => Self::Long(i64::from(*v)),
            (Self::Int(v), TypeCode::DOUBLE) => Self::Double(f64::from(*v)),
            (Self::Long(v), TypeCode::INT) => Self::Int(i32::try_from(*v).ok()?),
            (Self::Float(v), TypeCode::DOUBLE) => Self::Double(f64::from(*v)),
            _ => return None,
        };

        Some(widened)
    }

    #[must_use]
    pub fn as_long(&self) -> Option<i64> {
        match self {
            Self::Byte(v) => Some(i64::from(*v)),
            Self::Short(v) => Some(i64::from(*v)),
            Self::Int(v) => Some(i64::from(*v)),
            Self::Long(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(s) => Some(s.as_str()),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Bool(v) => Some(*v),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_list(&self) -> Option<&[Self]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Int(v) => write!(f, "{v}"),
            Self::Long(v) => write!(f, "{v}"),
            Self::Bool(v) => write!(f, "{v}"),
            Self::Byte(v) => write!(f, "{v}"),
            Self::Short(v) => write!(f, "{v}"),
            Self::Char(v) => write!(f, "{v}"),
            Self::Float(v) => write!(f, "{v}"),
            Self::Double(v) => write!(f, "{v}"),
            Self::Str(v) => write!(f, "{v}"),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
        }
    }
}

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Self::Int(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::Long(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i8> for Value {
    fn from(v: i8) -> Self {
        Self::Byte(v)
    }
}

impl From<i16> for Value {
    fn from(v: i16) -> Self {
        Self::Short(v)
    }
}

impl From<char> for Value {
    fn from(v: char) -> Self {
        Self::Char(v)
    }
}

impl From<f32> for Value {
    fn from(v: f32) -> Self {
        Self::Float(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::Double(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::Str(Arc::new(v.to_owned()))
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::Str(Arc::new(v))
    }
}

impl From<Arc<String>> for Value {
    fn from(v: Arc<String>) -> Self {
        Self::Str(v)
    }
}

impl<T: Into<Self>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl<T: Into<Self>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Self::List(items.into_iter().map(Into::into).collect())
    }
}

///
/// TESTS
///

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coercion_widens_integers() {
        assert_eq!(Value::Int(7).coerce_to(TypeCode::LONG), Some(Value::Long(7)));
        assert_eq!(
            Value::Byte(-3).coerce_to(TypeCode::INT),
            Some(Value::Int(-3))
        );
    }

    #[test]
    fn coercion_narrows_long_only_when_exact() {
        assert_eq!(Value::Long(5).coerce_to(TypeCode::INT), Some(Value::Int(5)));
        assert_eq!(Value::Long(i64::MAX).coerce_to(TypeCode::INT), None);
    }

    #[test]
    fn coercion_rejects_cross_kind() {
        assert_eq!(Value::from("x").coerce_to(TypeCode::LONG), None);
        assert_eq!(Value::Bool(true).coerce_to(TypeCode::INT), None);
    }

    #[test]
    fn null_coerces_to_anything() {
        assert_eq!(Value::Null.coerce_to(TypeCode::STRING), Some(Value::Null));
    }

    #[test]
    fn option_from_maps_none_to_null() {
        let v: Value = Option::<i64>::None.into();
        assert!(v.is_null());
        let v: Value = Some(4i64).into();
        assert_eq!(v, Value::Long(4));
    }
}
