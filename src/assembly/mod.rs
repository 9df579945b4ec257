//! CIL instruction model and emission.
//!
//! Synthesized members are expressed as CIL instruction streams. This module holds the
//! instruction representation, the opcode table shared by emitter and interpreter, and the
//! [`InstructionEmitter`] that member synthesizers write through.
//!
//! # Key Components
//!
//! - [`Instruction`] - A single emitted instruction
//! - [`InstructionEmitter`] - Fluent, stack-checked emission of method bodies
//! - [`opcodes`] - Opcode byte constants and the instruction table

mod emitter;
mod instruction;
pub mod opcodes;

pub use emitter::InstructionEmitter;
pub use instruction::{FlowType, Immediate, Instruction, Operand, OperandType};
