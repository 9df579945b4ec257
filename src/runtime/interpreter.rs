//! Verifying interpreter for synthesized method bodies.
//!
//! The [`Interpreter`] executes the CIL bodies emitted during synthesis on live proxy
//! instances, and calls native members of host types directly. Every instruction checks
//! its operands: stack underflow, mismatched indirect access widths and unresolvable tokens
//! surface as [`crate::Error::InvalidProgram`] instead of undefined behavior; a body that
//! executes `throw` surfaces as [`crate::Error::Thrown`].
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use dotproxy::metadata::typesystem::{CilPrimitiveKind, TypeBuilder, TypeRegistry};
//! use dotproxy::runtime::{Interpreter, Object, Value};
//!
//! let registry = Arc::new(TypeRegistry::default());
//! let int = registry.get_primitive(CilPrimitiveKind::I4)?;
//! let counter = TypeBuilder::class(&registry, "Demo", "Counter")
//!     .native_method("Next", &[], &int, |call| {
//!         let next = call.this.field("count").as_i32().unwrap_or(0) + 1;
//!         call.this.set_field("count", next);
//!         Ok(Value::I4(next))
//!     })?
//!     .build()?;
//!
//! let interpreter = Interpreter::new(registry);
//! let instance = Object::new(&counter);
//! let next = counter.find_method("Next", &[]).unwrap();
//! interpreter.invoke(&instance, &next, &[])?;
//! assert_eq!(interpreter.invoke(&instance, &next, &[])?, Value::I4(2));
//! # Ok::<(), dotproxy::Error>(())
//! ```

use std::sync::Arc;

use crate::{
    assembly::{opcodes::*, Immediate, Instruction, Operand},
    metadata::{
        method::{CilBody, Method, MethodBody},
        token::Token,
        typesystem::{CilPrimitiveKind, CilTypeRc, TypeRegistry},
    },
    runtime::{Array, ObjectRef, Value, ValueSlot},
    Error, Result,
};

/// Default limit of nested calls before execution is aborted
pub const DEFAULT_MAX_CALL_DEPTH: usize = 256;

/// The context a native member receives when it is invoked
pub struct Invocation<'a> {
    /// The instance the member was invoked on
    pub this: &'a ObjectRef,
    /// The invoked method
    pub method: &'a Method,
    /// The arguments, excluding `this`, already converted to the parameter types
    pub args: &'a [Value],
}

impl Invocation<'_> {
    /// The argument at `index`
    ///
    /// # Errors
    /// Returns [`Error::ArgumentMismatch`] if there is no such argument.
    pub fn arg(&self, index: usize) -> Result<&Value> {
        self.args.get(index).ok_or_else(|| Error::ArgumentMismatch {
            member: self.method.signature(),
            message: format!("no argument at position {index}"),
        })
    }
}

enum StepResult {
    Continue,
    Return(Value),
}

struct Frame<'a> {
    method: &'a Method,
    args: Vec<Value>,
    locals: Vec<Value>,
    local_types: &'a [CilTypeRc],
    stack: Vec<Value>,
    offset: usize,
}

impl Frame<'_> {
    fn error(&self, message: impl Into<String>) -> Error {
        let message: String = message.into();
        invalid_program!(&self.method.name, self.offset, message)
    }

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Result<Value> {
        self.stack
            .pop()
            .ok_or_else(|| self.error("Evaluation stack underflow"))
    }

    fn thrown(&self, message: impl Into<String>) -> Error {
        Error::Thrown {
            method: self.method.name.clone(),
            message: message.into(),
        }
    }
}

/// Executes method bodies against the types of one [`TypeRegistry`]
pub struct Interpreter {
    registry: Arc<TypeRegistry>,
    max_call_depth: usize,
}

impl Interpreter {
    /// Create an interpreter resolving tokens through `registry`
    pub fn new(registry: Arc<TypeRegistry>) -> Self {
        Interpreter {
            registry,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }

    /// Override the nested call limit
    #[must_use]
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }

    /// The registry tokens are resolved against
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// Invoke exactly `method` on `this`.
    ///
    /// # Errors
    /// Returns [`Error::ArgumentMismatch`] if `args` do not fit the signature, or any error
    /// raised while the body executes.
    pub fn invoke(&self, this: &ObjectRef, method: &Method, args: &[Value]) -> Result<Value> {
        self.call(this, method, args.to_vec(), 0)
    }

    /// Invoke `method` on `this` through virtual dispatch: the most derived implementation
    /// on the runtime type of `this` runs.
    ///
    /// # Errors
    /// Returns [`Error::MemberNotFound`] if no implementation exists, or any error of
    /// [`Interpreter::invoke`].
    pub fn invoke_virtual(
        &self,
        this: &ObjectRef,
        method: &Method,
        args: &[Value],
    ) -> Result<Value> {
        match this.object_type().find_override(method) {
            Some(target) => self.call(this, &target, args.to_vec(), 0),
            None if !method.is_abstract() => self.call(this, method, args.to_vec(), 0),
            None => Err(Error::MemberNotFound(format!(
                "No implementation of '{}' on '{}'",
                method.signature(),
                this.object_type().fullname()
            ))),
        }
    }

    fn call(&self, this: &ObjectRef, method: &Method, args: Vec<Value>, depth: usize) -> Result<Value> {
        if depth > self.max_call_depth {
            return Err(invalid_program!(
                &method.name,
                0,
                "Call depth limit of {} exceeded",
                self.max_call_depth
            ));
        }

        let args = Self::bind_arguments(method, args)?;
        match &method.body {
            MethodBody::None => Err(invalid_program!(
                &method.name,
                0,
                "'{}' has no implementation",
                method.signature()
            )),
            MethodBody::Native(native) => {
                let result = native(&Invocation {
                    this,
                    method,
                    args: &args,
                })?;
                if method.returns_void() || method.is_constructor() {
                    return Ok(Value::Null);
                }
                let type_name = result.type_name();
                result.coerce(&method.return_type).ok_or_else(|| {
                    Error::TypeError(format!(
                        "'{}' returned {} for {}",
                        method.signature(),
                        type_name,
                        method.return_type.fullname()
                    ))
                })
            }
            MethodBody::Cil(body) => self.execute(this, method, body, args, depth),
        }
    }

    fn bind_arguments(method: &Method, args: Vec<Value>) -> Result<Vec<Value>> {
        if args.len() != method.params.len() {
            return Err(Error::ArgumentMismatch {
                member: method.signature(),
                message: format!("expected {} arguments, got {}", method.params.len(), args.len()),
            });
        }

        args.into_iter()
            .zip(&method.params)
            .map(|(arg, param)| {
                let type_name = arg.type_name();
                arg.coerce(&param.param_type)
                    .ok_or_else(|| Error::ArgumentMismatch {
                        member: method.signature(),
                        message: format!(
                            "'{}' expects {}, got {}",
                            param.name,
                            param.param_type.fullname(),
                            type_name
                        ),
                    })
            })
            .collect()
    }

    fn execute(
        &self,
        this: &ObjectRef,
        method: &Method,
        body: &CilBody,
        args: Vec<Value>,
        depth: usize,
    ) -> Result<Value> {
        let mut frame = Frame {
            method,
            args: std::iter::once(Value::Object(this.clone()))
                .chain(args)
                .collect(),
            locals: body.locals.iter().map(|ty| Value::default_for(ty)).collect(),
            local_types: &body.locals,
            stack: Vec::new(),
            offset: 0,
        };

        for (offset, instruction) in body.instructions.iter().enumerate() {
            frame.offset = offset;
            let step = if instruction.prefix == FE_PREFIX {
                Self::execute_fe_prefixed(&mut frame, instruction)?
            } else {
                self.execute_standard(&mut frame, instruction, depth)?
            };

            if let StepResult::Return(value) = step {
                return Ok(value);
            }
        }

        frame.offset = body.instructions.len();
        Err(frame.error("Execution fell through the end of the body"))
    }

    fn execute_standard(
        &self,
        frame: &mut Frame<'_>,
        instruction: &Instruction,
        depth: usize,
    ) -> Result<StepResult> {
        match instruction.opcode {
            NOP => {}
            LDARG_0 => Self::load_argument(frame, 0)?,
            LDARG_1 => Self::load_argument(frame, 1)?,
            LDARG_2 => Self::load_argument(frame, 2)?,
            LDARG_3 => Self::load_argument(frame, 3)?,
            LDARG_S => {
                let index = Self::index_operand(frame, instruction)?;
                Self::load_argument(frame, index)?;
            }
            LDLOC_0 => Self::load_local(frame, 0)?,
            LDLOC_1 => Self::load_local(frame, 1)?,
            LDLOC_2 => Self::load_local(frame, 2)?,
            LDLOC_3 => Self::load_local(frame, 3)?,
            LDLOC_S => {
                let index = Self::index_operand(frame, instruction)?;
                Self::load_local(frame, index)?;
            }
            STLOC_0 => Self::store_local(frame, 0)?,
            STLOC_1 => Self::store_local(frame, 1)?,
            STLOC_2 => Self::store_local(frame, 2)?,
            STLOC_3 => Self::store_local(frame, 3)?,
            STLOC_S => {
                let index = Self::index_operand(frame, instruction)?;
                Self::store_local(frame, index)?;
            }
            LDNULL => frame.push(Value::Null),
            LDC_I4_M1 => frame.push(Value::I4(-1)),
            LDC_I4_0..=LDC_I4_8 => frame.push(Value::I4(i32::from(instruction.opcode - LDC_I4_0))),
            LDC_I4_S | LDC_I4 | LDC_I8 | LDC_R4 | LDC_R8 => {
                let value = match instruction.operand {
                    Operand::Immediate(Immediate::Int8(v)) => Value::I4(i32::from(v)),
                    Operand::Immediate(Immediate::Int32(v)) => Value::I4(v),
                    Operand::Immediate(Immediate::Int64(v)) => Value::I8(v),
                    Operand::Immediate(Immediate::Float32(v)) => Value::R4(v),
                    Operand::Immediate(Immediate::Float64(v)) => Value::R8(v),
                    _ => return Err(frame.error(format!("Invalid operand for '{}'", instruction.mnemonic))),
                };
                frame.push(value);
            }
            DUP => {
                let value = frame.pop()?;
                frame.push(value.clone());
                frame.push(value);
            }
            POP => {
                frame.pop()?;
            }
            CALL | CALLVIRT => {
                self.call_instruction(frame, instruction, depth)?;
            }
            RET => return Self::return_value(frame).map(StepResult::Return),
            LDIND_I1 | LDIND_U1 | LDIND_I2 | LDIND_U2 | LDIND_I4 | LDIND_U4 | LDIND_I8
            | LDIND_R4 | LDIND_R8 | LDIND_REF => {
                let slot = Self::pop_slot(frame, instruction)?;
                let value = slot.get();
                if !Self::indirect_accepts(instruction.opcode, &value, false) {
                    return Err(frame.error(format!(
                        "'{}' cannot read a slot holding {}",
                        instruction.mnemonic,
                        value.type_name()
                    )));
                }
                frame.push(value);
            }
            STIND_REF | STIND_I1 | STIND_I2 | STIND_I4 | STIND_I8 | STIND_R4 | STIND_R8 => {
                let value = frame.pop()?;
                let slot = Self::pop_slot(frame, instruction)?;
                if !Self::indirect_accepts(instruction.opcode, &value, true) {
                    return Err(frame.error(format!(
                        "'{}' cannot store {}",
                        instruction.mnemonic,
                        value.type_name()
                    )));
                }
                let stored = self.narrow_for_slot(instruction.opcode, value, &slot.get());
                slot.set(stored);
            }
            LDSTR => {
                let token = Self::token_operand(frame, instruction)?;
                let value = self
                    .registry
                    .user_string(&token)
                    .ok_or_else(|| frame.error(format!("Unknown user string {token}")))?;
                frame.push(Value::String(value));
            }
            THROW => {
                let exception = frame.pop()?;
                let message = match &exception {
                    Value::String(message) => message.to_string(),
                    Value::Null => "Object reference not set to an instance of an object".to_string(),
                    other => other.type_name(),
                };
                return Err(frame.thrown(message));
            }
            BOX => {
                let target = self.type_operand(frame, instruction)?;
                let value = frame.pop()?;
                if !target.flavor.is_value_type() {
                    return Err(frame.error(format!("Cannot box non-value type {}", target.fullname())));
                }
                let type_name = value.type_name();
                let boxed = value.coerce(&target).ok_or_else(|| {
                    frame.error(format!("Cannot box {} as {}", type_name, target.fullname()))
                })?;
                frame.push(boxed);
            }
            UNBOX_ANY => {
                let target = self.type_operand(frame, instruction)?;
                let value = frame.pop()?;
                if value.is_null() && target.flavor.is_value_type() {
                    return Err(frame.thrown("Object reference not set to an instance of an object"));
                }
                if !value.is_instance_of(&target) {
                    return Err(frame.thrown(format!(
                        "Unable to cast object of type '{}' to type '{}'",
                        value.type_name(),
                        target.fullname()
                    )));
                }
                frame.push(value);
            }
            NEWARR => {
                let element = self.type_operand(frame, instruction)?;
                let length = match frame.pop()? {
                    Value::I4(length) => usize::try_from(length).map_err(|_| {
                        frame.thrown(format!("Arithmetic operation resulted in an overflow: {length}"))
                    })?,
                    other => {
                        return Err(frame.error(format!(
                            "'newarr' expects an Int32 length, found {}",
                            other.type_name()
                        )))
                    }
                };
                frame.push(Value::Array(Array::new(&element, length)));
            }
            LDLEN => {
                let array = Self::pop_array(frame)?;
                let length = i32::try_from(array.len())
                    .map_err(|_| frame.error("Array length exceeds Int32"))?;
                frame.push(Value::I4(length));
            }
            LDELEM_REF => {
                let index = Self::pop_index(frame)?;
                let array = Self::pop_array(frame)?;
                frame.push(array.get(index)?);
            }
            STELEM_REF => {
                let value = frame.pop()?;
                let index = Self::pop_index(frame)?;
                let array = Self::pop_array(frame)?;
                if matches!(value, Value::ByRef(_)) {
                    return Err(frame.error("Cannot store a managed reference in an array"));
                }
                array.set(index, value)?;
            }
            other => {
                return Err(frame.error(format!(
                    "Unsupported opcode 0x{other:02X} ('{}')",
                    instruction.mnemonic
                )))
            }
        }

        Ok(StepResult::Continue)
    }

    fn execute_fe_prefixed(frame: &mut Frame<'_>, instruction: &Instruction) -> Result<StepResult> {
        let index = Self::index_operand(frame, instruction)?;
        match instruction.opcode {
            FE_LDARG => Self::load_argument(frame, index)?,
            FE_LDLOC => Self::load_local(frame, index)?,
            FE_STLOC => Self::store_local(frame, index)?,
            other => {
                return Err(frame.error(format!(
                    "Unsupported opcode 0xFE 0x{other:02X} ('{}')",
                    instruction.mnemonic
                )))
            }
        }
        Ok(StepResult::Continue)
    }

    fn call_instruction(
        &self,
        frame: &mut Frame<'_>,
        instruction: &Instruction,
        depth: usize,
    ) -> Result<()> {
        let token = Self::token_operand(frame, instruction)?;
        let callee = self
            .registry
            .method(&token)
            .ok_or_else(|| frame.error(format!("Unresolved method token {token}")))?;

        let mut args = Vec::with_capacity(callee.params.len());
        for _ in 0..callee.params.len() {
            args.push(frame.pop()?);
        }
        args.reverse();

        let receiver = match frame.pop()? {
            Value::Object(object) => object,
            Value::Null => {
                return Err(frame.thrown("Object reference not set to an instance of an object"))
            }
            other => {
                return Err(frame.error(format!(
                    "Call receiver must be an object, found {}",
                    other.type_name()
                )))
            }
        };

        let target = if instruction.opcode == CALLVIRT && !callee.is_constructor() {
            receiver
                .object_type()
                .find_override(&callee)
                .unwrap_or(callee.clone())
        } else {
            callee.clone()
        };

        let result = self.call(&receiver, &target, args, depth + 1)?;
        if !callee.returns_void() && !callee.is_constructor() {
            frame.push(result);
        }
        Ok(())
    }

    fn return_value(frame: &mut Frame<'_>) -> Result<Value> {
        let method = frame.method;
        let value = if method.returns_void() || method.is_constructor() {
            Value::Null
        } else {
            let value = frame.pop()?;
            let type_name = value.type_name();
            value.coerce(&method.return_type).ok_or_else(|| {
                frame.error(format!(
                    "Cannot return {} as {}",
                    type_name,
                    method.return_type.fullname()
                ))
            })?
        };

        if !frame.stack.is_empty() {
            return Err(frame.error(format!(
                "{} values left on the stack at 'ret'",
                frame.stack.len()
            )));
        }
        Ok(value)
    }

    fn load_argument(frame: &mut Frame<'_>, index: u16) -> Result<()> {
        let value = frame
            .args
            .get(usize::from(index))
            .cloned()
            .ok_or_else(|| frame.error(format!("Argument {index} out of range")))?;
        frame.push(value);
        Ok(())
    }

    fn load_local(frame: &mut Frame<'_>, index: u16) -> Result<()> {
        let value = frame
            .locals
            .get(usize::from(index))
            .cloned()
            .ok_or_else(|| frame.error(format!("Local {index} out of range")))?;
        frame.push(value);
        Ok(())
    }

    fn store_local(frame: &mut Frame<'_>, index: u16) -> Result<()> {
        let value = frame.pop()?;
        let local_type = frame
            .local_types
            .get(usize::from(index))
            .cloned()
            .ok_or_else(|| frame.error(format!("Local {index} out of range")))?;

        let type_name = value.type_name();
        let value = value.coerce(&local_type).ok_or_else(|| {
            frame.error(format!(
                "Cannot store {} in local {} of type {}",
                type_name,
                index,
                local_type.fullname()
            ))
        })?;
        frame.locals[usize::from(index)] = value;
        Ok(())
    }

    fn pop_slot(frame: &mut Frame<'_>, instruction: &Instruction) -> Result<ValueSlot> {
        match frame.pop()? {
            Value::ByRef(slot) => Ok(slot),
            other => Err(frame.error(format!(
                "'{}' expects a managed reference, found {}",
                instruction.mnemonic,
                other.type_name()
            ))),
        }
    }

    fn pop_array(frame: &mut Frame<'_>) -> Result<Arc<Array>> {
        match frame.pop()? {
            Value::Array(array) => Ok(array),
            Value::Null => Err(frame.thrown("Object reference not set to an instance of an object")),
            other => Err(frame.error(format!("Expected an array, found {}", other.type_name()))),
        }
    }

    fn pop_index(frame: &mut Frame<'_>) -> Result<usize> {
        match frame.pop()? {
            Value::I4(index) => usize::try_from(index)
                .map_err(|_| frame.thrown(format!("Index {index} was outside the bounds of the array"))),
            other => Err(frame.error(format!(
                "Expected an Int32 index, found {}",
                other.type_name()
            ))),
        }
    }

    fn index_operand(frame: &Frame<'_>, instruction: &Instruction) -> Result<u16> {
        match &instruction.operand {
            Operand::Immediate(immediate) => immediate.as_index(),
            _ => None,
        }
        .ok_or_else(|| frame.error(format!("Invalid index operand for '{}'", instruction.mnemonic)))
    }

    fn token_operand(frame: &Frame<'_>, instruction: &Instruction) -> Result<Token> {
        instruction
            .token()
            .ok_or_else(|| frame.error(format!("Missing token operand for '{}'", instruction.mnemonic)))
    }

    fn type_operand(&self, frame: &Frame<'_>, instruction: &Instruction) -> Result<CilTypeRc> {
        let token = Self::token_operand(frame, instruction)?;
        self.registry
            .get(&token)
            .ok_or_else(|| frame.error(format!("Unresolved type token {token}")))
    }

    /// Width and float-ness of the slot an indirect opcode accesses, `None` for `*.ref`
    fn indirect_width(opcode: u8) -> Option<(usize, bool)> {
        match opcode {
            LDIND_I1 | LDIND_U1 | STIND_I1 => Some((1, false)),
            LDIND_I2 | LDIND_U2 | STIND_I2 => Some((2, false)),
            LDIND_I4 | LDIND_U4 | STIND_I4 => Some((4, false)),
            LDIND_I8 | STIND_I8 => Some((8, false)),
            LDIND_R4 | STIND_R4 => Some((4, true)),
            LDIND_R8 | STIND_R8 => Some((8, true)),
            _ => None,
        }
    }

    fn indirect_accepts(opcode: u8, value: &Value, storing: bool) -> bool {
        match (Self::indirect_width(opcode), value.kind()) {
            (None, None) => value.is_null(),
            (None, Some(kind)) => kind.is_reference(),
            (Some(_), None) => false,
            (Some((width, float)), Some(kind)) => {
                let exact = kind.size() == Some(width) && kind.is_float() == float;
                // int32 stack values narrow into small slots
                let narrowing = storing && !float && width <= 4 && kind == CilPrimitiveKind::I4;
                exact || narrowing
            }
        }
    }

    fn narrow_for_slot(&self, opcode: u8, value: Value, current: &Value) -> Value {
        let Some((width, float)) = Self::indirect_width(opcode) else {
            return value;
        };

        let slot_kind = current
            .kind()
            .filter(|kind| kind.size() == Some(width) && kind.is_float() == float);
        let target = match (slot_kind, value.kind()) {
            (Some(kind), _) => kind,
            (None, Some(kind)) if kind.size() == Some(width) => return value,
            _ => match width {
                1 => CilPrimitiveKind::I1,
                2 => CilPrimitiveKind::I2,
                _ => CilPrimitiveKind::I4,
            },
        };

        match self.registry.get_primitive(target) {
            Ok(target_type) => value.clone().coerce(&target_type).unwrap_or(value),
            Err(_) => value,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        assembly::InstructionEmitter,
        metadata::{
            method::{MethodAttributes, Param},
            token::TABLE,
            typesystem::TypeBuilder,
        },
        runtime::Object,
    };

    fn cil_method(
        registry: &Arc<TypeRegistry>,
        name: &str,
        params: Vec<Param>,
        return_type: &CilTypeRc,
        emit: impl FnOnce(&mut InstructionEmitter) -> Result<()>,
    ) -> Method {
        let returns_value = return_type.primitive_kind() != Some(CilPrimitiveKind::Void);
        let arg_count = u16::try_from(params.len() + 1).unwrap();
        let mut il = InstructionEmitter::new(registry.clone(), name, arg_count, returns_value);
        emit(&mut il).unwrap();
        Method {
            token: registry.next_token(TABLE::METHODDEF),
            name: name.to_string(),
            flags: MethodAttributes::PUBLIC | MethodAttributes::VIRTUAL,
            params,
            return_type: return_type.clone(),
            body: MethodBody::Cil(Arc::new(il.finish().unwrap())),
        }
    }

    fn instance(registry: &Arc<TypeRegistry>) -> ObjectRef {
        let object = registry.get_primitive(CilPrimitiveKind::Object).unwrap();
        Object::new(&object)
    }

    #[test]
    fn test_returns_constant() {
        let registry = Arc::new(TypeRegistry::default());
        let boolean = registry.get_primitive(CilPrimitiveKind::Boolean).unwrap();
        let method = cil_method(&registry, "IsReady", vec![], &boolean, |il| {
            il.emit_ldc_i4(1)?.emit_ret()?;
            Ok(())
        });

        let interpreter = Interpreter::new(registry.clone());
        let result = interpreter.invoke(&instance(&registry), &method, &[]).unwrap();
        assert_eq!(result, Value::Boolean(true));
    }

    #[test]
    fn test_writes_through_by_ref_slots() {
        let registry = Arc::new(TypeRegistry::default());
        let void = registry.get_primitive(CilPrimitiveKind::Void).unwrap();
        let ulong = registry.get_primitive(CilPrimitiveKind::U8).unwrap();
        let ulong_ref = registry.by_ref(&ulong).unwrap();

        let method = cil_method(
            &registry,
            "Fill",
            vec![Param::out("value", &ulong_ref)],
            &void,
            |il| {
                il.emit_ldarg(1)?
                    .emit_ldc_i8(-1)?
                    .emit_stind(CilPrimitiveKind::U8)?
                    .emit_ret()?;
                Ok(())
            },
        );

        let slot = ValueSlot::default_for(&ulong);
        let interpreter = Interpreter::new(registry.clone());
        interpreter
            .invoke(&instance(&registry), &method, &[Value::ByRef(slot.clone())])
            .unwrap();
        assert_eq!(slot.get(), Value::U8(u64::MAX));
    }

    #[test]
    fn test_width_mismatch_is_invalid() {
        let registry = Arc::new(TypeRegistry::default());
        let int = registry.get_primitive(CilPrimitiveKind::I4).unwrap();
        let int_ref = registry.by_ref(&int).unwrap();

        let method = cil_method(
            &registry,
            "Read",
            vec![Param::new("value", &int_ref)],
            &int,
            |il| {
                il.emit_ldarg(1)?
                    .emit_ldind(CilPrimitiveKind::I8)?
                    .emit_ret()?;
                Ok(())
            },
        );

        let interpreter = Interpreter::new(registry.clone());
        let result = interpreter.invoke(
            &instance(&registry),
            &method,
            &[Value::ByRef(ValueSlot::new(5))],
        );
        assert!(matches!(result, Err(Error::InvalidProgram { .. })));
    }

    #[test]
    fn test_throw_surfaces_message() {
        let registry = Arc::new(TypeRegistry::default());
        let int = registry.get_primitive(CilPrimitiveKind::I4).unwrap();
        let method = cil_method(&registry, "GetValue", vec![], &int, |il| {
            il.emit_throw_not_implemented("GetValue")?;
            Ok(())
        });

        let interpreter = Interpreter::new(registry.clone());
        match interpreter.invoke(&instance(&registry), &method, &[]) {
            Err(Error::Thrown { method, message }) => {
                assert_eq!(method, "GetValue");
                assert!(message.contains("not implemented"));
            }
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn test_arguments_are_checked() {
        let registry = Arc::new(TypeRegistry::default());
        let int = registry.get_primitive(CilPrimitiveKind::I4).unwrap();
        let method = cil_method(
            &registry,
            "Echo",
            vec![Param::new("value", &int)],
            &int,
            |il| {
                il.emit_ldarg(1)?.emit_ret()?;
                Ok(())
            },
        );

        let interpreter = Interpreter::new(registry.clone());
        let this = instance(&registry);
        assert_eq!(
            interpreter.invoke(&this, &method, &[Value::I4(3)]).unwrap(),
            Value::I4(3)
        );
        assert!(matches!(
            interpreter.invoke(&this, &method, &[]),
            Err(Error::ArgumentMismatch { .. })
        ));
        assert!(matches!(
            interpreter.invoke(&this, &method, &[Value::from("x")]),
            Err(Error::ArgumentMismatch { .. })
        ));
    }

    #[test]
    fn test_callvirt_dispatches_to_native_base() {
        let registry = Arc::new(TypeRegistry::default());
        let int = registry.get_primitive(CilPrimitiveKind::I4).unwrap();
        let base = TypeBuilder::class(&registry, "Test", "Base")
            .native_method("Seed", &[], &int, |_| Ok(Value::I4(40)))
            .unwrap()
            .build()
            .unwrap();
        let seed = base.find_method("Seed", &[]).unwrap();

        let method = cil_method(&registry, "Answer", vec![], &int, |il| {
            il.emit_ldarg(0)?.emit_callvirt(&seed)?.emit_ret()?;
            Ok(())
        });

        let interpreter = Interpreter::new(registry.clone());
        let this = Object::new(&base);
        assert_eq!(
            interpreter.invoke(&this, &method, &[]).unwrap(),
            Value::I4(40)
        );
    }

    #[test]
    fn test_arrays_round_trip_through_locals() {
        let registry = Arc::new(TypeRegistry::default());
        let object = registry.get_primitive(CilPrimitiveKind::Object).unwrap();
        let array_type = registry.array_of(&object).unwrap();
        let int = registry.get_primitive(CilPrimitiveKind::I4).unwrap();

        let method = cil_method(&registry, "Pack", vec![], &int, |il| {
            let local = il.declare_local(&array_type);
            il.emit_ldc_i4(2)?
                .emit_newarr(&object)?
                .emit_stloc(local)?
                .emit_ldloc(local)?
                .emit_ldc_i4(1)?
                .emit_ldc_i4(7)?
                .emit_box(&int)?
                .emit_stelem_ref()?
                .emit_ldloc(local)?
                .emit_ldc_i4(1)?
                .emit_ldelem_ref()?
                .emit_unbox_any(&int)?
                .emit_ret()?;
            Ok(())
        });

        let interpreter = Interpreter::new(registry.clone());
        assert_eq!(
            interpreter.invoke(&instance(&registry), &method, &[]).unwrap(),
            Value::I4(7)
        );
    }
}
