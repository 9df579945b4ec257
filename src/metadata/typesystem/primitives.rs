use strum::{EnumCount, EnumIter};

use crate::metadata::token::{Token, TABLE};

/// Enumeration of the built-in primitive types
///
/// Every kind is pre-registered in a [`crate::metadata::typesystem::TypeRegistry`] under an artificial token
/// in the `0xF000_0000` range, see [`CilPrimitiveKind::token`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, EnumIter, EnumCount)]
pub enum CilPrimitiveKind {
    /// System.Void - represents no value
    Void,
    /// System.Boolean - true/false value
    Boolean,
    /// System.Char - Unicode 16-bit character
    Char,
    /// System.SByte - signed 8-bit integer
    I1,
    /// System.Byte - unsigned 8-bit integer
    U1,
    /// System.Int16 - signed 16-bit integer
    I2,
    /// System.UInt16 - unsigned 16-bit integer
    U2,
    /// System.Int32 - signed 32-bit integer
    I4,
    /// System.UInt32 - unsigned 32-bit integer
    U4,
    /// System.Int64 - signed 64-bit integer
    I8,
    /// System.UInt64 - unsigned 64-bit integer
    U8,
    /// System.Single - 32-bit floating point
    R4,
    /// System.Double - 64-bit floating point
    R8,
    /// System.Object - base class for all reference types
    Object,
    /// System.String - immutable string of Unicode characters
    String,
}

impl CilPrimitiveKind {
    /// Get the token for this type
    #[must_use]
    pub fn token(&self) -> Token {
        Token::from_parts(TABLE::PRIMITIVE, *self as u32 + 1)
    }

    /// Map a primitive token back to its kind
    #[must_use]
    pub fn from_token(token: Token) -> Option<Self> {
        use strum::IntoEnumIterator;

        if token.table() != TABLE::PRIMITIVE {
            return None;
        }
        CilPrimitiveKind::iter().find(|kind| kind.token() == token)
    }

    /// Get the namespace of the primitive type
    #[must_use]
    pub fn namespace(&self) -> &'static str {
        "System"
    }

    /// Get the short name (without namespace)
    #[must_use]
    pub fn name(&self) -> &'static str {
        match self {
            CilPrimitiveKind::Void => "Void",
            CilPrimitiveKind::Boolean => "Boolean",
            CilPrimitiveKind::Char => "Char",
            CilPrimitiveKind::I1 => "SByte",
            CilPrimitiveKind::U1 => "Byte",
            CilPrimitiveKind::I2 => "Int16",
            CilPrimitiveKind::U2 => "UInt16",
            CilPrimitiveKind::I4 => "Int32",
            CilPrimitiveKind::U4 => "UInt32",
            CilPrimitiveKind::I8 => "Int64",
            CilPrimitiveKind::U8 => "UInt64",
            CilPrimitiveKind::R4 => "Single",
            CilPrimitiveKind::R8 => "Double",
            CilPrimitiveKind::Object => "Object",
            CilPrimitiveKind::String => "String",
        }
    }

    /// Size in bytes of a value of this kind in memory, `None` for reference types and void
    #[must_use]
    pub fn size(&self) -> Option<usize> {
        match self {
            CilPrimitiveKind::Boolean | CilPrimitiveKind::I1 | CilPrimitiveKind::U1 => Some(1),
            CilPrimitiveKind::Char | CilPrimitiveKind::I2 | CilPrimitiveKind::U2 => Some(2),
            CilPrimitiveKind::I4 | CilPrimitiveKind::U4 | CilPrimitiveKind::R4 => Some(4),
            CilPrimitiveKind::I8 | CilPrimitiveKind::U8 | CilPrimitiveKind::R8 => Some(8),
            CilPrimitiveKind::Void | CilPrimitiveKind::Object | CilPrimitiveKind::String => None,
        }
    }

    /// Returns true for value types (everything that has a fixed in-memory size)
    #[must_use]
    pub fn is_value_type(&self) -> bool {
        self.size().is_some()
    }

    /// Returns true for the floating point kinds
    #[must_use]
    pub fn is_float(&self) -> bool {
        matches!(self, CilPrimitiveKind::R4 | CilPrimitiveKind::R8)
    }

    /// Returns true for the reference kinds (`Object`, `String`)
    #[must_use]
    pub fn is_reference(&self) -> bool {
        matches!(self, CilPrimitiveKind::Object | CilPrimitiveKind::String)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn test_tokens_are_unique_and_reversible() {
        let mut seen = std::collections::HashSet::new();
        for kind in CilPrimitiveKind::iter() {
            let token = kind.token();
            assert_eq!(token.table(), TABLE::PRIMITIVE);
            assert!(seen.insert(token), "duplicate token for {kind:?}");
            assert_eq!(CilPrimitiveKind::from_token(token), Some(kind));
        }
        assert_eq!(seen.len(), CilPrimitiveKind::COUNT);
        assert_eq!(CilPrimitiveKind::from_token(Token::new(0x0200_0001)), None);
    }

    #[test]
    fn test_sizes() {
        assert_eq!(CilPrimitiveKind::Boolean.size(), Some(1));
        assert_eq!(CilPrimitiveKind::Char.size(), Some(2));
        assert_eq!(CilPrimitiveKind::R4.size(), Some(4));
        assert_eq!(CilPrimitiveKind::U8.size(), Some(8));
        assert_eq!(CilPrimitiveKind::String.size(), None);
        assert!(CilPrimitiveKind::Object.is_reference());
        assert!(!CilPrimitiveKind::Void.is_value_type());
    }
}
