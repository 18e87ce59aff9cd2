use std::fmt::{self, Display};

///
/// TypeCode
///
/// Single-byte tag discriminating column payloads and driving typed
/// dispatch. These are constants with stable numeric values, not an
/// ordered enumeration; new codes extend the list, never renumber it.
///

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct TypeCode(u8);

impl TypeCode {
    pub const INT: Self = Self(0);
    pub const LONG: Self = Self(1);
    pub const BOOL: Self = Self(2);
    pub const BYTE: Self = Self(3);
    pub const SHORT: Self = Self(4);
    pub const CHAR: Self = Self(5);
    pub const FLOAT: Self = Self(6);
    pub const DOUBLE: Self = Self(7);
    pub const STRING: Self = Self(8);

    #[must_use]
    pub const fn raw(self) -> u8 {
        self.0
    }

    /// Whether values of this code are stored as fixed-width encoded words.
    #[must_use]
    pub const fn is_word(self) -> bool {
        !matches!(self, Self::STRING)
    }

    /// Whether the code admits numeric range comparison.
    #[must_use]
    pub const fn is_numeric(self) -> bool {
        matches!(
            self,
            Self::INT | Self::LONG | Self::BYTE | Self::SHORT | Self::FLOAT | Self::DOUBLE
        )
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::INT => "int",
            Self::LONG => "long",
            Self::BOOL => "bool",
            Self::BYTE => "byte",
            Self::SHORT => "short",
            Self::CHAR => "char",
            Self::FLOAT => "float",
            Self::DOUBLE => "double",
            Self::STRING => "string",
            _ => "unknown",
        }
    }
}

impl Display for TypeCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

///
/// FieldModel
///
/// Resolved runtime metadata for one storable field. `column_position` is
/// assigned at table generation in declaration order; `None` marks
/// synthetic, relationship-only fields that own no column.
///

#[derive(Clone, Debug)]
pub struct FieldModel {
    /// Dotted path as used in descriptors and query conditions.
    pub path: &'static str,
    pub type_code: TypeCode,
    pub nullable: bool,
    pub is_id: bool,
    pub column_position: Option<usize>,
}

impl FieldModel {
    #[must_use]
    pub fn column(&self) -> usize {
        debug_assert!(self.column_position.is_some(), "synthetic field {}", self.path);
        self.column_position.unwrap_or(usize::MAX)
    }
}

///
/// TESTS
///
