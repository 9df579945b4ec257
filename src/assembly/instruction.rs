//! CIL instruction representation and operand types.
//!
//! # Key Components
//!
//! - [`Instruction`] - One emitted instruction with its operand
//! - [`Operand`] - Type-safe operand representation
//! - [`Immediate`] - Immediate value types
//! - [`OperandType`] - The operand an opcode expects
//! - [`FlowType`] - Control flow behavior classification

use std::fmt;

use crate::metadata::token::Token;

/// Types of operands for CIL instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperandType {
    /// No operand present
    None,
    /// Signed 8-bit integer
    Int8,
    /// Unsigned 8-bit integer
    UInt8,
    /// Unsigned 16-bit integer
    UInt16,
    /// Signed 32-bit integer
    Int32,
    /// Signed 64-bit integer
    Int64,
    /// 32-bit floating point
    Float32,
    /// 64-bit floating point
    Float64,
    /// Metadata token reference
    Token,
}

/// Immediate operand values embedded in an instruction
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Immediate {
    /// Signed 8-bit immediate value
    Int8(i8),
    /// Unsigned 8-bit immediate value
    UInt8(u8),
    /// Unsigned 16-bit immediate value
    UInt16(u16),
    /// Signed 32-bit immediate value
    Int32(i32),
    /// Signed 64-bit immediate value
    Int64(i64),
    /// 32-bit floating point immediate value
    Float32(f32),
    /// 64-bit floating point immediate value
    Float64(f64),
}

impl Immediate {
    /// The operand type this immediate satisfies
    #[must_use]
    pub fn operand_type(&self) -> OperandType {
        match self {
            Immediate::Int8(_) => OperandType::Int8,
            Immediate::UInt8(_) => OperandType::UInt8,
            Immediate::UInt16(_) => OperandType::UInt16,
            Immediate::Int32(_) => OperandType::Int32,
            Immediate::Int64(_) => OperandType::Int64,
            Immediate::Float32(_) => OperandType::Float32,
            Immediate::Float64(_) => OperandType::Float64,
        }
    }

    /// Index value of argument/local immediates
    #[must_use]
    pub fn as_index(&self) -> Option<u16> {
        match self {
            Immediate::UInt8(value) => Some(u16::from(*value)),
            Immediate::UInt16(value) => Some(*value),
            _ => None,
        }
    }
}

impl fmt::Display for Immediate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Immediate::Int8(value) => write!(f, "{value}"),
            Immediate::UInt8(value) => write!(f, "{value}"),
            Immediate::UInt16(value) => write!(f, "{value}"),
            Immediate::Int32(value) => write!(f, "{value}"),
            Immediate::Int64(value) => write!(f, "{value}"),
            Immediate::Float32(value) => write!(f, "{value}"),
            Immediate::Float64(value) => write!(f, "{value}"),
        }
    }
}

/// Instruction operand
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// No operand present
    None,
    /// Immediate value (constant or argument/local index embedded in instruction)
    Immediate(Immediate),
    /// Metadata token reference
    Token(Token),
}

impl Operand {
    /// The operand type this operand satisfies
    #[must_use]
    pub fn operand_type(&self) -> OperandType {
        match self {
            Operand::None => OperandType::None,
            Operand::Immediate(imm) => imm.operand_type(),
            Operand::Token(_) => OperandType::Token,
        }
    }
}

/// How an instruction affects control flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowType {
    /// Normal execution continues to next instruction
    Sequential,
    /// Call to another method
    Call,
    /// Returns from current method
    Return,
    /// Exception throwing
    Throw,
}

/// A single CIL instruction of an emitted method body
#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    /// Primary opcode byte
    pub opcode: u8,
    /// Prefix byte (0 if no prefix)
    pub prefix: u8,
    /// Human-readable instruction mnemonic (e.g., "ldarg.1", "ldind.i4", "ret")
    pub mnemonic: &'static str,
    /// How this instruction affects control flow
    pub flow_type: FlowType,
    /// The operand data for this instruction
    pub operand: Operand,
}

impl Instruction {
    /// Returns true if execution cannot continue past this instruction
    #[must_use]
    pub fn is_terminator(&self) -> bool {
        matches!(self.flow_type, FlowType::Return | FlowType::Throw)
    }

    /// Returns the token operand, if any
    #[must_use]
    pub fn token(&self) -> Option<Token> {
        match self.operand {
            Operand::Token(token) => Some(token),
            _ => None,
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.operand {
            Operand::None => write!(f, "{}", self.mnemonic),
            Operand::Immediate(imm) => write!(f, "{} {}", self.mnemonic, imm),
            Operand::Token(token) => write!(f, "{} {}", self.mnemonic, token),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let ret = Instruction {
            opcode: 0x2A,
            prefix: 0,
            mnemonic: "ret",
            flow_type: FlowType::Return,
            operand: Operand::None,
        };
        assert_eq!(ret.to_string(), "ret");
        assert!(ret.is_terminator());

        let call = Instruction {
            opcode: 0x28,
            prefix: 0,
            mnemonic: "call",
            flow_type: FlowType::Call,
            operand: Operand::Token(Token::new(0x0600_0001)),
        };
        assert_eq!(call.to_string(), "call 0x06000001");
        assert!(!call.is_terminator());
        assert_eq!(call.token(), Some(Token::new(0x0600_0001)));
    }

    #[test]
    fn test_immediate_indices() {
        assert_eq!(Immediate::UInt8(7).as_index(), Some(7));
        assert_eq!(Immediate::UInt16(300).as_index(), Some(300));
        assert_eq!(Immediate::Int32(7).as_index(), None);
        assert_eq!(
            Operand::Immediate(Immediate::Float64(1.5)).operand_type(),
            OperandType::Float64
        );
    }
}
