//! Fluent CIL emission for synthesized method bodies.
//!
//! [`InstructionEmitter`] is the instruction-emission handle handed to member synthesizers.
//! It picks the most compact encoding for argument, local and constant loads, resolves the
//! type and method operands against the [`TypeRegistry`], and tracks the evaluation stack so
//! that malformed bodies are rejected while they are emitted rather than when they run.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use dotproxy::assembly::InstructionEmitter;
//! use dotproxy::metadata::typesystem::TypeRegistry;
//!
//! let registry = Arc::new(TypeRegistry::default());
//! let mut il = InstructionEmitter::new(registry, "Answer", 1, true);
//! il.emit_ldc_i4(42)?.emit_ret()?;
//!
//! let body = il.finish()?;
//! assert_eq!(body.instructions.len(), 2);
//! assert_eq!(body.instructions[0].to_string(), "ldc.i4.s 42");
//! # Ok::<(), dotproxy::Error>(())
//! ```

use std::sync::Arc;

use crate::{
    assembly::{
        opcodes::{self, OpCodeInfo, VARIABLE},
        FlowType, Immediate, Instruction, Operand, OperandType,
    },
    emit::ByRefAccessStrategy,
    metadata::{
        method::{CilBody, Method},
        typesystem::{CilPrimitiveKind, CilType, CilTypeRc, TypeRegistry},
    },
    Result,
};

/// Emits the instruction stream of one method body
pub struct InstructionEmitter {
    registry: Arc<TypeRegistry>,
    /// Name of the method being emitted, for diagnostics
    method: String,
    /// Number of arguments including `this`
    arg_count: u16,
    /// Whether `ret` must leave a value on the stack
    returns_value: bool,
    instructions: Vec<Instruction>,
    locals: Vec<CilTypeRc>,
    stack_depth: u16,
    max_stack: u16,
    terminated: bool,
}

impl InstructionEmitter {
    /// Create an emitter for an instance method.
    ///
    /// ## Arguments
    /// * 'registry'      - Registry used to resolve operands
    /// * 'method'        - Name of the method, used in error messages
    /// * 'arg_count'     - Number of arguments including the implicit `this`
    /// * 'returns_value' - True if the method has a non-void return type
    pub fn new(
        registry: Arc<TypeRegistry>,
        method: impl Into<String>,
        arg_count: u16,
        returns_value: bool,
    ) -> Self {
        InstructionEmitter {
            registry,
            method: method.into(),
            arg_count,
            returns_value,
            instructions: Vec::new(),
            locals: Vec::new(),
            stack_depth: 0,
            max_stack: 0,
            terminated: false,
        }
    }

    /// The registry operands are resolved against
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Emit a CIL instruction by mnemonic with an optional operand.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidProgram`] if the mnemonic is unknown, the operand does
    /// not fit, the stack would underflow, or the body is already terminated.
    pub fn emit_instruction(&mut self, mnemonic: &str, operand: Option<Operand>) -> Result<&mut Self> {
        let info = opcodes::lookup_mnemonic(mnemonic).ok_or_else(|| {
            invalid_program!(
                &self.method,
                self.instructions.len(),
                "Unknown mnemonic '{}'",
                mnemonic
            )
        })?;
        self.push(info, operand.unwrap_or(Operand::None), None)
    }

    /// Emit a `ldarg` instruction with optimal encoding.
    ///
    /// - `ldarg.0` through `ldarg.3` for indices 0-3
    /// - `ldarg.s` for indices 4-255
    /// - `ldarg` for indices 256+
    ///
    /// # Errors
    /// Returns an error if `index` is not a valid argument of the method.
    pub fn emit_ldarg(&mut self, index: u16) -> Result<&mut Self> {
        if index >= self.arg_count {
            return Err(invalid_program!(
                &self.method,
                self.instructions.len(),
                "Argument {} out of range, method has {}",
                index,
                self.arg_count
            ));
        }

        match index {
            0 => self.emit_instruction("ldarg.0", None),
            1 => self.emit_instruction("ldarg.1", None),
            2 => self.emit_instruction("ldarg.2", None),
            3 => self.emit_instruction("ldarg.3", None),
            x => match u8::try_from(x) {
                Ok(short) => self.emit_instruction(
                    "ldarg.s",
                    Some(Operand::Immediate(Immediate::UInt8(short))),
                ),
                Err(_) => {
                    self.emit_instruction("ldarg", Some(Operand::Immediate(Immediate::UInt16(x))))
                }
            },
        }
    }

    /// Declare a local variable and return its index
    pub fn declare_local(&mut self, local_type: &CilTypeRc) -> u16 {
        self.locals.push(local_type.clone());
        u16::try_from(self.locals.len() - 1).unwrap_or(u16::MAX)
    }

    /// Emit a `ldloc` instruction with optimal encoding.
    ///
    /// # Errors
    /// Returns an error if `index` is not a declared local.
    pub fn emit_ldloc(&mut self, index: u16) -> Result<&mut Self> {
        self.check_local(index)?;
        match index {
            0 => self.emit_instruction("ldloc.0", None),
            1 => self.emit_instruction("ldloc.1", None),
            2 => self.emit_instruction("ldloc.2", None),
            3 => self.emit_instruction("ldloc.3", None),
            x => match u8::try_from(x) {
                Ok(short) => self.emit_instruction(
                    "ldloc.s",
                    Some(Operand::Immediate(Immediate::UInt8(short))),
                ),
                Err(_) => {
                    self.emit_instruction("ldloc", Some(Operand::Immediate(Immediate::UInt16(x))))
                }
            },
        }
    }

    /// Emit a `stloc` instruction with optimal encoding.
    ///
    /// # Errors
    /// Returns an error if `index` is not a declared local.
    pub fn emit_stloc(&mut self, index: u16) -> Result<&mut Self> {
        self.check_local(index)?;
        match index {
            0 => self.emit_instruction("stloc.0", None),
            1 => self.emit_instruction("stloc.1", None),
            2 => self.emit_instruction("stloc.2", None),
            3 => self.emit_instruction("stloc.3", None),
            x => match u8::try_from(x) {
                Ok(short) => self.emit_instruction(
                    "stloc.s",
                    Some(Operand::Immediate(Immediate::UInt8(short))),
                ),
                Err(_) => {
                    self.emit_instruction("stloc", Some(Operand::Immediate(Immediate::UInt16(x))))
                }
            },
        }
    }

    /// Emit `ldnull`
    ///
    /// # Errors
    /// Returns an error if the body is already terminated.
    pub fn emit_ldnull(&mut self) -> Result<&mut Self> {
        self.emit_instruction("ldnull", None)
    }

    /// Emit a `ldc.i4` instruction with optimal encoding.
    ///
    /// - `ldc.i4.m1` through `ldc.i4.8` for values -1 to 8
    /// - `ldc.i4.s` for values -128 to 127
    /// - `ldc.i4` for all other values
    ///
    /// # Errors
    /// Returns an error if the body is already terminated.
    pub fn emit_ldc_i4(&mut self, value: i32) -> Result<&mut Self> {
        match value {
            -1 => self.emit_instruction("ldc.i4.m1", None),
            0 => self.emit_instruction("ldc.i4.0", None),
            1 => self.emit_instruction("ldc.i4.1", None),
            2 => self.emit_instruction("ldc.i4.2", None),
            3 => self.emit_instruction("ldc.i4.3", None),
            4 => self.emit_instruction("ldc.i4.4", None),
            5 => self.emit_instruction("ldc.i4.5", None),
            6 => self.emit_instruction("ldc.i4.6", None),
            7 => self.emit_instruction("ldc.i4.7", None),
            8 => self.emit_instruction("ldc.i4.8", None),
            x => match i8::try_from(x) {
                Ok(short) => self.emit_instruction(
                    "ldc.i4.s",
                    Some(Operand::Immediate(Immediate::Int8(short))),
                ),
                Err(_) => {
                    self.emit_instruction("ldc.i4", Some(Operand::Immediate(Immediate::Int32(x))))
                }
            },
        }
    }

    /// Emit `ldc.i8`
    ///
    /// # Errors
    /// Returns an error if the body is already terminated.
    pub fn emit_ldc_i8(&mut self, value: i64) -> Result<&mut Self> {
        self.emit_instruction("ldc.i8", Some(Operand::Immediate(Immediate::Int64(value))))
    }

    /// Emit `ldc.r4`
    ///
    /// # Errors
    /// Returns an error if the body is already terminated.
    pub fn emit_ldc_r4(&mut self, value: f32) -> Result<&mut Self> {
        self.emit_instruction("ldc.r4", Some(Operand::Immediate(Immediate::Float32(value))))
    }

    /// Emit `ldc.r8`
    ///
    /// # Errors
    /// Returns an error if the body is already terminated.
    pub fn emit_ldc_r8(&mut self, value: f64) -> Result<&mut Self> {
        self.emit_instruction("ldc.r8", Some(Operand::Immediate(Immediate::Float64(value))))
    }

    /// Emit `ldstr`, interning `value` as a user string
    ///
    /// # Errors
    /// Returns an error if the body is already terminated.
    pub fn emit_ldstr(&mut self, value: &str) -> Result<&mut Self> {
        let token = self.registry.intern_string(value);
        self.emit_instruction("ldstr", Some(Operand::Token(token)))
    }

    /// Emit `dup`
    ///
    /// # Errors
    /// Returns an error if the stack is empty.
    pub fn emit_dup(&mut self) -> Result<&mut Self> {
        self.emit_instruction("dup", None)
    }

    /// Emit `pop`
    ///
    /// # Errors
    /// Returns an error if the stack is empty.
    pub fn emit_pop(&mut self) -> Result<&mut Self> {
        self.emit_instruction("pop", None)
    }

    /// Emit a non-virtual `call` of `method` (base calls, constructor chaining)
    ///
    /// # Errors
    /// Returns an error if `method` is not registered or the stack lacks its arguments.
    pub fn emit_call(&mut self, method: &Method) -> Result<&mut Self> {
        self.emit_method_call("call", method)
    }

    /// Emit a virtual `callvirt` of `method`
    ///
    /// # Errors
    /// Returns an error if `method` is not registered or the stack lacks its arguments.
    pub fn emit_callvirt(&mut self, method: &Method) -> Result<&mut Self> {
        self.emit_method_call("callvirt", method)
    }

    /// Emit `ret`
    ///
    /// # Errors
    /// Returns an error if the stack does not hold exactly the return value.
    pub fn emit_ret(&mut self) -> Result<&mut Self> {
        let expected = u16::from(self.returns_value);
        if self.stack_depth != expected {
            return Err(invalid_program!(
                &self.method,
                self.instructions.len(),
                "ret with {} stack slots, expected {}",
                self.stack_depth,
                expected
            ));
        }
        self.emit_instruction("ret", None)
    }

    /// Emit `throw`
    ///
    /// # Errors
    /// Returns an error if the stack is empty.
    pub fn emit_throw(&mut self) -> Result<&mut Self> {
        self.emit_instruction("throw", None)
    }

    /// Emit a body that throws a not-implemented exception for `member`
    ///
    /// # Errors
    /// Returns an error if the body is already terminated.
    pub fn emit_throw_not_implemented(&mut self, member: &str) -> Result<&mut Self> {
        self.emit_ldstr(&format!(
            "The method or operation is not implemented: {member}"
        ))?
        .emit_throw()
    }

    /// Emit the indirect load for a primitive kind, see [`ByRefAccessStrategy`]
    ///
    /// # Errors
    /// Returns an error if `kind` has no by-reference access or the stack is empty.
    pub fn emit_ldind(&mut self, kind: CilPrimitiveKind) -> Result<&mut Self> {
        let opcode = ByRefAccessStrategy::load(kind).ok_or_else(|| {
            invalid_program!(
                &self.method,
                self.instructions.len(),
                "No indirect load for {:?}",
                kind
            )
        })?;
        self.emit_opcode(opcode, Operand::None)
    }

    /// Emit the indirect store for a primitive kind, see [`ByRefAccessStrategy`]
    ///
    /// # Errors
    /// Returns an error if `kind` has no by-reference access or the stack is too small.
    pub fn emit_stind(&mut self, kind: CilPrimitiveKind) -> Result<&mut Self> {
        let opcode = ByRefAccessStrategy::store(kind).ok_or_else(|| {
            invalid_program!(
                &self.method,
                self.instructions.len(),
                "No indirect store for {:?}",
                kind
            )
        })?;
        self.emit_opcode(opcode, Operand::None)
    }

    /// Emit the indirect load for a slot holding `element` (primitive or reference)
    ///
    /// # Errors
    /// Returns an error if the stack is empty or `element` cannot live in a slot.
    pub fn emit_load_indirect(&mut self, element: &CilType) -> Result<&mut Self> {
        let opcode = ByRefAccessStrategy::load_for_type(element).ok_or_else(|| {
            invalid_program!(
                &self.method,
                self.instructions.len(),
                "No indirect load for '{}'",
                element.fullname()
            )
        })?;
        self.emit_opcode(opcode, Operand::None)
    }

    /// Emit the indirect store for a slot holding `element` (primitive or reference)
    ///
    /// # Errors
    /// Returns an error if the stack is too small or `element` cannot live in a slot.
    pub fn emit_store_indirect(&mut self, element: &CilType) -> Result<&mut Self> {
        let opcode = ByRefAccessStrategy::store_for_type(element).ok_or_else(|| {
            invalid_program!(
                &self.method,
                self.instructions.len(),
                "No indirect store for '{}'",
                element.fullname()
            )
        })?;
        self.emit_opcode(opcode, Operand::None)
    }

    /// Emit `box` for a value type
    ///
    /// # Errors
    /// Returns an error if the stack is empty.
    pub fn emit_box(&mut self, value_type: &CilType) -> Result<&mut Self> {
        self.emit_instruction("box", Some(Operand::Token(value_type.token)))
    }

    /// Emit `unbox.any`, converting an object reference to `target`
    ///
    /// # Errors
    /// Returns an error if the stack is empty.
    pub fn emit_unbox_any(&mut self, target: &CilType) -> Result<&mut Self> {
        self.emit_instruction("unbox.any", Some(Operand::Token(target.token)))
    }

    /// Emit `newarr` of `element`, the length is taken from the stack
    ///
    /// # Errors
    /// Returns an error if the stack is empty.
    pub fn emit_newarr(&mut self, element: &CilType) -> Result<&mut Self> {
        self.emit_instruction("newarr", Some(Operand::Token(element.token)))
    }

    /// Emit `ldlen`
    ///
    /// # Errors
    /// Returns an error if the stack is empty.
    pub fn emit_ldlen(&mut self) -> Result<&mut Self> {
        self.emit_instruction("ldlen", None)
    }

    /// Emit `ldelem.ref`
    ///
    /// # Errors
    /// Returns an error if the stack lacks array and index.
    pub fn emit_ldelem_ref(&mut self) -> Result<&mut Self> {
        self.emit_instruction("ldelem.ref", None)
    }

    /// Emit `stelem.ref`
    ///
    /// # Errors
    /// Returns an error if the stack lacks array, index and value.
    pub fn emit_stelem_ref(&mut self) -> Result<&mut Self> {
        self.emit_instruction("stelem.ref", None)
    }

    /// Returns true once a `ret` or `throw` was emitted
    pub fn is_terminated(&self) -> bool {
        self.terminated
    }

    /// The instructions emitted so far
    pub fn instructions(&self) -> &[Instruction] {
        &self.instructions
    }

    /// Maximum evaluation stack depth reached so far
    pub fn max_stack_depth(&self) -> u16 {
        self.max_stack
    }

    /// Finish emission and produce the method body.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidProgram`] if the body does not end in `ret` or `throw`.
    pub fn finish(self) -> Result<CilBody> {
        if !self.terminated {
            return Err(invalid_program!(
                &self.method,
                self.instructions.len(),
                "Body falls through its last instruction"
            ));
        }

        Ok(CilBody {
            instructions: self.instructions,
            locals: self.locals,
        })
    }

    fn emit_method_call(&mut self, mnemonic: &str, method: &Method) -> Result<&mut Self> {
        if self.registry.method(&method.token).is_none() {
            return Err(invalid_program!(
                &self.method,
                self.instructions.len(),
                "Call target '{}' ({}) is not registered",
                method.signature(),
                method.token
            ));
        }

        let info = opcodes::lookup_mnemonic(mnemonic).ok_or_else(|| {
            invalid_program!(&self.method, self.instructions.len(), "Unknown mnemonic '{}'", mnemonic)
        })?;

        let pops = u16::try_from(method.params.len() + 1).unwrap_or(u16::MAX);
        let pushes = u16::from(!method.returns_void() && !method.is_constructor());
        self.push(info, Operand::Token(method.token), Some((pops, pushes)))
    }

    fn emit_opcode(&mut self, opcode: u8, operand: Operand) -> Result<&mut Self> {
        let info = opcodes::lookup_opcode(0, opcode).ok_or_else(|| {
            invalid_program!(
                &self.method,
                self.instructions.len(),
                "Unknown opcode 0x{:02X}",
                opcode
            )
        })?;
        self.push(info, operand, None)
    }

    fn check_local(&self, index: u16) -> Result<()> {
        if usize::from(index) >= self.locals.len() {
            return Err(invalid_program!(
                &self.method,
                self.instructions.len(),
                "Local {} is not declared",
                index
            ));
        }
        Ok(())
    }

    fn push(
        &mut self,
        info: &'static OpCodeInfo,
        operand: Operand,
        effect: Option<(u16, u16)>,
    ) -> Result<&mut Self> {
        let offset = self.instructions.len();
        if self.terminated {
            return Err(invalid_program!(
                &self.method,
                offset,
                "Unreachable '{}' after end of body",
                info.mnemonic
            ));
        }

        if operand.operand_type() != info.operand {
            return Err(invalid_program!(
                &self.method,
                offset,
                "'{}' expects a {:?} operand, got {:?}",
                info.mnemonic,
                info.operand,
                operand.operand_type()
            ));
        }

        let (pops, pushes) = match effect {
            Some(effect) => effect,
            None if info.flow == FlowType::Return => (self.stack_depth, 0),
            None => {
                debug_assert!(info.pops != VARIABLE && info.pushes != VARIABLE);
                (u16::from(info.pops), u16::from(info.pushes))
            }
        };

        if self.stack_depth < pops {
            return Err(invalid_program!(
                &self.method,
                offset,
                "'{}' needs {} stack slots, {} available",
                info.mnemonic,
                pops,
                self.stack_depth
            ));
        }

        self.stack_depth = self.stack_depth - pops + pushes;
        self.max_stack = self.max_stack.max(self.stack_depth);

        if matches!(info.flow, FlowType::Return | FlowType::Throw) {
            self.terminated = true;
        }
        if info.operand == OperandType::Token {
            debug_assert!(matches!(operand, Operand::Token(_)));
        }

        self.instructions.push(Instruction {
            opcode: info.opcode,
            prefix: info.prefix,
            mnemonic: info.mnemonic,
            flow_type: info.flow,
            operand,
        });
        Ok(self)
    }
}
