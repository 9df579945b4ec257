//! Metadata tokens addressing types, members and user strings in a registry.
//!
//! A [`Token`] packs a [`TABLE`] identifier into its high byte and a row into the low 24
//! bits. Instructions carry tokens as operands for `call`, `newobj`, `box` and `ldstr`.

use std::fmt;
use std::hash::{Hash, Hasher};

#[allow(non_snake_case, missing_docs)]
/// Table identifiers used in the high byte of a [`Token`]
pub mod TABLE {
    pub const TYPEDEF: u8 = 0x02;
    pub const METHODDEF: u8 = 0x06;
    pub const PROPERTY: u8 = 0x17;
    pub const TYPESPEC: u8 = 0x1B;
    // Synthetic table for constructors, kept apart from MethodDef rows
    pub const CTOR: u8 = 0x2A;
    pub const USERSTRING: u8 = 0x70;
    // Artificial tokens of the built-in primitive types
    pub const PRIMITIVE: u8 = 0xF0;
}

/// A metadata token representing a reference to a metadata table entry.
///
/// Tokens consist of a 32-bit value where:
/// - The high byte (bits 24-31) indicates the table type, see [`TABLE`]
/// - The low 24 bits (bits 0-23) indicate the row index within that table
///
/// Every type, member and user string that lives in a [`crate::metadata::typesystem::TypeRegistry`] is
/// addressed by a token, which is also what `call`, `box` and `ldstr` instructions
/// carry as their operand.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Token(pub u32);

impl Token {
    /// Creates a new token from a raw 32-bit value
    #[must_use]
    pub fn new(value: u32) -> Self {
        Token(value)
    }

    /// Creates a token from a table identifier and a row index
    ///
    /// ## Arguments
    /// * 'table' - The table identifier (high byte)
    /// * 'row'   - The row, truncated to 24 bits
    #[must_use]
    pub fn from_parts(table: u8, row: u32) -> Self {
        Token((u32::from(table) << 24) | (row & 0x00FF_FFFF))
    }

    /// Returns the raw token value
    #[must_use]
    pub fn value(&self) -> u32 {
        self.0
    }

    /// Extracts the table type from the token (high byte)
    #[must_use]
    pub fn table(&self) -> u8 {
        (self.0 >> 24) as u8
    }

    /// Extracts the row index from the token (low 24 bits)
    #[must_use]
    pub fn row(&self) -> u32 {
        self.0 & 0x00FF_FFFF
    }

    /// Returns true if this is a null token (value 0)
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0 == 0
    }
}

impl From<u32> for Token {
    fn from(value: u32) -> Self {
        Token(value)
    }
}

impl From<Token> for u32 {
    fn from(token: Token) -> Self {
        token.0
    }
}

impl fmt::Debug for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Token(0x{:08x}, table: 0x{:02x}, row: {})",
            self.0,
            self.table(),
            self.row()
        )
    }
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:08x}", self.0)
    }
}

impl Hash for Token {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}
