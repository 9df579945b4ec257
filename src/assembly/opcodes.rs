//! CIL opcode byte constants (ECMA-335) and instruction metadata.
//!
//! This module provides the raw byte values of the opcodes the emitter produces and the
//! interpreter executes. Single-byte opcodes are named after their mnemonic (e.g. [`CALL`] =
//! `0x28`). Two-byte opcodes that use the `0xFE` prefix have their second byte stored with an
//! `FE_` prefix (e.g. [`FE_LDARG`] = `0x09` for the `ldarg` instruction `0xFE 0x09`).
//!
//! [`INSTRUCTIONS`] describes every supported instruction; [`lookup_mnemonic`] and
//! [`lookup_opcode`] resolve entries from it through lazily built indices.
#![allow(missing_docs)]

use std::{collections::HashMap, sync::OnceLock};

use crate::assembly::{
    FlowType::{self, Call, Return, Sequential, Throw},
    OperandType::{self as O},
};

pub const NOP: u8 = 0x00;

// Load argument shorthand
pub const LDARG_0: u8 = 0x02;
pub const LDARG_1: u8 = 0x03;
pub const LDARG_2: u8 = 0x04;
pub const LDARG_3: u8 = 0x05;

// Load/store local shorthand
pub const LDLOC_0: u8 = 0x06;
pub const LDLOC_1: u8 = 0x07;
pub const LDLOC_2: u8 = 0x08;
pub const LDLOC_3: u8 = 0x09;
pub const STLOC_0: u8 = 0x0A;
pub const STLOC_1: u8 = 0x0B;
pub const STLOC_2: u8 = 0x0C;
pub const STLOC_3: u8 = 0x0D;

// Load argument/local (short form)
pub const LDARG_S: u8 = 0x0E;
pub const LDLOC_S: u8 = 0x11;
pub const STLOC_S: u8 = 0x13;

// Null / constant loaders
pub const LDNULL: u8 = 0x14;
pub const LDC_I4_M1: u8 = 0x15;
pub const LDC_I4_0: u8 = 0x16;
pub const LDC_I4_1: u8 = 0x17;
pub const LDC_I4_2: u8 = 0x18;
pub const LDC_I4_3: u8 = 0x19;
pub const LDC_I4_4: u8 = 0x1A;
pub const LDC_I4_5: u8 = 0x1B;
pub const LDC_I4_6: u8 = 0x1C;
pub const LDC_I4_7: u8 = 0x1D;
pub const LDC_I4_8: u8 = 0x1E;
pub const LDC_I4_S: u8 = 0x1F;
pub const LDC_I4: u8 = 0x20;
pub const LDC_I8: u8 = 0x21;
pub const LDC_R4: u8 = 0x22;
pub const LDC_R8: u8 = 0x23;

// Stack manipulation
pub const DUP: u8 = 0x25;
pub const POP: u8 = 0x26;

// Calls and return
pub const CALL: u8 = 0x28;
pub const RET: u8 = 0x2A;

// Indirect loads
pub const LDIND_I1: u8 = 0x46;
pub const LDIND_U1: u8 = 0x47;
pub const LDIND_I2: u8 = 0x48;
pub const LDIND_U2: u8 = 0x49;
pub const LDIND_I4: u8 = 0x4A;
pub const LDIND_U4: u8 = 0x4B;
pub const LDIND_I8: u8 = 0x4C;
pub const LDIND_R4: u8 = 0x4E;
pub const LDIND_R8: u8 = 0x4F;
pub const LDIND_REF: u8 = 0x50;

// Indirect stores
pub const STIND_REF: u8 = 0x51;
pub const STIND_I1: u8 = 0x52;
pub const STIND_I2: u8 = 0x53;
pub const STIND_I4: u8 = 0x54;
pub const STIND_I8: u8 = 0x55;
pub const STIND_R4: u8 = 0x56;
pub const STIND_R8: u8 = 0x57;

// Object model
pub const CALLVIRT: u8 = 0x6F;
pub const LDSTR: u8 = 0x72;
pub const THROW: u8 = 0x7A;
pub const BOX: u8 = 0x8C;
pub const NEWARR: u8 = 0x8D;
pub const LDLEN: u8 = 0x8E;
pub const LDELEM_REF: u8 = 0x9A;
pub const STELEM_REF: u8 = 0xA2;
pub const UNBOX_ANY: u8 = 0xA5;

// ── Two-byte opcodes (0xFE prefix) ─────────────────────────────────────────

pub const FE_PREFIX: u8 = 0xFE;
pub const FE_LDARG: u8 = 0x09;
pub const FE_LDLOC: u8 = 0x0C;
pub const FE_STLOC: u8 = 0x0E;

/// Stack effect marker for instructions whose effect depends on the operand (`call`, `ret`)
pub const VARIABLE: u8 = 0xFF;

/// Static description of one instruction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OpCodeInfo {
    /// Mnemonic, e.g. `ldind.i4`
    pub mnemonic: &'static str,
    /// Opcode byte (second byte for prefixed instructions)
    pub opcode: u8,
    /// `FE_PREFIX` for two-byte instructions, 0 otherwise
    pub prefix: u8,
    /// Type of the inline operand
    pub operand: O,
    /// Number of stack slots consumed, or [`VARIABLE`]
    pub pops: u8,
    /// Number of stack slots produced, or [`VARIABLE`]
    pub pushes: u8,
    /// Control flow behavior
    pub flow: FlowType,
}

const fn op(
    mnemonic: &'static str,
    opcode: u8,
    operand: O,
    pops: u8,
    pushes: u8,
    flow: FlowType,
) -> OpCodeInfo {
    OpCodeInfo {
        mnemonic,
        opcode,
        prefix: 0,
        operand,
        pops,
        pushes,
        flow,
    }
}

const fn op_fe(mnemonic: &'static str, opcode: u8, pops: u8, pushes: u8) -> OpCodeInfo {
    OpCodeInfo {
        mnemonic,
        opcode,
        prefix: FE_PREFIX,
        operand: O::UInt16,
        pops,
        pushes,
        flow: FlowType::Sequential,
    }
}

/// Every instruction the emitter and interpreter support
pub const INSTRUCTIONS: &[OpCodeInfo] = &[
    op("nop", NOP, O::None, 0, 0, Sequential),
    op("ldarg.0", LDARG_0, O::None, 0, 1, Sequential),
    op("ldarg.1", LDARG_1, O::None, 0, 1, Sequential),
    op("ldarg.2", LDARG_2, O::None, 0, 1, Sequential),
    op("ldarg.3", LDARG_3, O::None, 0, 1, Sequential),
    op("ldloc.0", LDLOC_0, O::None, 0, 1, Sequential),
    op("ldloc.1", LDLOC_1, O::None, 0, 1, Sequential),
    op("ldloc.2", LDLOC_2, O::None, 0, 1, Sequential),
    op("ldloc.3", LDLOC_3, O::None, 0, 1, Sequential),
    op("stloc.0", STLOC_0, O::None, 1, 0, Sequential),
    op("stloc.1", STLOC_1, O::None, 1, 0, Sequential),
    op("stloc.2", STLOC_2, O::None, 1, 0, Sequential),
    op("stloc.3", STLOC_3, O::None, 1, 0, Sequential),
    op("ldarg.s", LDARG_S, O::UInt8, 0, 1, Sequential),
    op("ldloc.s", LDLOC_S, O::UInt8, 0, 1, Sequential),
    op("stloc.s", STLOC_S, O::UInt8, 1, 0, Sequential),
    op("ldnull", LDNULL, O::None, 0, 1, Sequential),
    op("ldc.i4.m1", LDC_I4_M1, O::None, 0, 1, Sequential),
    op("ldc.i4.0", LDC_I4_0, O::None, 0, 1, Sequential),
    op("ldc.i4.1", LDC_I4_1, O::None, 0, 1, Sequential),
    op("ldc.i4.2", LDC_I4_2, O::None, 0, 1, Sequential),
    op("ldc.i4.3", LDC_I4_3, O::None, 0, 1, Sequential),
    op("ldc.i4.4", LDC_I4_4, O::None, 0, 1, Sequential),
    op("ldc.i4.5", LDC_I4_5, O::None, 0, 1, Sequential),
    op("ldc.i4.6", LDC_I4_6, O::None, 0, 1, Sequential),
    op("ldc.i4.7", LDC_I4_7, O::None, 0, 1, Sequential),
    op("ldc.i4.8", LDC_I4_8, O::None, 0, 1, Sequential),
    op("ldc.i4.s", LDC_I4_S, O::Int8, 0, 1, Sequential),
    op("ldc.i4", LDC_I4, O::Int32, 0, 1, Sequential),
    op("ldc.i8", LDC_I8, O::Int64, 0, 1, Sequential),
    op("ldc.r4", LDC_R4, O::Float32, 0, 1, Sequential),
    op("ldc.r8", LDC_R8, O::Float64, 0, 1, Sequential),
    op("dup", DUP, O::None, 1, 2, Sequential),
    op("pop", POP, O::None, 1, 0, Sequential),
    op("call", CALL, O::Token, VARIABLE, VARIABLE, Call),
    op("ret", RET, O::None, VARIABLE, 0, Return),
    op("ldind.i1", LDIND_I1, O::None, 1, 1, Sequential),
    op("ldind.u1", LDIND_U1, O::None, 1, 1, Sequential),
    op("ldind.i2", LDIND_I2, O::None, 1, 1, Sequential),
    op("ldind.u2", LDIND_U2, O::None, 1, 1, Sequential),
    op("ldind.i4", LDIND_I4, O::None, 1, 1, Sequential),
    op("ldind.u4", LDIND_U4, O::None, 1, 1, Sequential),
    op("ldind.i8", LDIND_I8, O::None, 1, 1, Sequential),
    op("ldind.r4", LDIND_R4, O::None, 1, 1, Sequential),
    op("ldind.r8", LDIND_R8, O::None, 1, 1, Sequential),
    op("ldind.ref", LDIND_REF, O::None, 1, 1, Sequential),
    op("stind.ref", STIND_REF, O::None, 2, 0, Sequential),
    op("stind.i1", STIND_I1, O::None, 2, 0, Sequential),
    op("stind.i2", STIND_I2, O::None, 2, 0, Sequential),
    op("stind.i4", STIND_I4, O::None, 2, 0, Sequential),
    op("stind.i8", STIND_I8, O::None, 2, 0, Sequential),
    op("stind.r4", STIND_R4, O::None, 2, 0, Sequential),
    op("stind.r8", STIND_R8, O::None, 2, 0, Sequential),
    op("callvirt", CALLVIRT, O::Token, VARIABLE, VARIABLE, Call),
    op("ldstr", LDSTR, O::Token, 0, 1, Sequential),
    op("throw", THROW, O::None, 1, 0, Throw),
    op("box", BOX, O::Token, 1, 1, Sequential),
    op("newarr", NEWARR, O::Token, 1, 1, Sequential),
    op("ldlen", LDLEN, O::None, 1, 1, Sequential),
    op("ldelem.ref", LDELEM_REF, O::None, 2, 1, Sequential),
    op("stelem.ref", STELEM_REF, O::None, 3, 0, Sequential),
    op("unbox.any", UNBOX_ANY, O::Token, 1, 1, Sequential),
    op_fe("ldarg", FE_LDARG, 0, 1),
    op_fe("ldloc", FE_LDLOC, 0, 1),
    op_fe("stloc", FE_STLOC, 1, 0),
];

static MNEMONIC_LOOKUP: OnceLock<HashMap<&'static str, &'static OpCodeInfo>> = OnceLock::new();
static OPCODE_LOOKUP: OnceLock<HashMap<(u8, u8), &'static OpCodeInfo>> = OnceLock::new();

/// Resolve an instruction by mnemonic
pub fn lookup_mnemonic(mnemonic: &str) -> Option<&'static OpCodeInfo> {
    MNEMONIC_LOOKUP
        .get_or_init(|| INSTRUCTIONS.iter().map(|info| (info.mnemonic, info)).collect())
        .get(mnemonic)
        .copied()
}

/// Resolve an instruction by prefix and opcode byte
pub fn lookup_opcode(prefix: u8, opcode: u8) -> Option<&'static OpCodeInfo> {
    OPCODE_LOOKUP
        .get_or_init(|| {
            INSTRUCTIONS
                .iter()
                .map(|info| ((info.prefix, info.opcode), info))
                .collect()
        })
        .get(&(prefix, opcode))
        .copied()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookups_agree() {
        for info in INSTRUCTIONS {
            assert_eq!(lookup_mnemonic(info.mnemonic), Some(info));
            assert_eq!(lookup_opcode(info.prefix, info.opcode), Some(info));
        }
        assert_eq!(lookup_mnemonic("ldind.u8"), None);
        assert_eq!(lookup_opcode(0, 0xC2), None);
    }

    #[test]
    fn test_prefixed_instructions_do_not_shadow_single_byte_ones() {
        // FE 0C (ldloc) and 0C (stloc.2) share the second byte
        assert_eq!(lookup_opcode(FE_PREFIX, FE_LDLOC).unwrap().mnemonic, "ldloc");
        assert_eq!(lookup_opcode(0, STLOC_2).unwrap().mnemonic, "stloc.2");
    }
}
