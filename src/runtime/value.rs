//! Runtime values of proxy instances.
//!
//! [`Value`] is what arguments, return values, locals and evaluation stack entries hold
//! while a synthesized body executes. Unlike the raw CIL stack, small integers keep their
//! declared kind; the interpreter widens or narrows them at the points CIL would.
//!
//! [`ValueSlot`] is a shared, mutable storage cell. It backs by-reference (`ref` / `out`)
//! arguments: the caller keeps one handle, the callee reads and writes through another.

use std::{
    fmt,
    sync::{Arc, RwLock},
};

use crate::{
    metadata::typesystem::{CilFlavor, CilPrimitiveKind, CilType},
    runtime::{ArrayRef, ObjectRef},
    Error::TypeError,
    Result,
};

/// A runtime value
#[derive(Clone)]
pub enum Value {
    /// Null reference, also the result of `void` calls
    Null,
    /// `System.Boolean`
    Boolean(bool),
    /// `System.Char` (UTF-16 code unit)
    Char(u16),
    /// `System.SByte`
    I1(i8),
    /// `System.Byte`
    U1(u8),
    /// `System.Int16`
    I2(i16),
    /// `System.UInt16`
    U2(u16),
    /// `System.Int32`
    I4(i32),
    /// `System.UInt32`
    U4(u32),
    /// `System.Int64`
    I8(i64),
    /// `System.UInt64`
    U8(u64),
    /// `System.Single`
    R4(f32),
    /// `System.Double`
    R8(f64),
    /// `System.String`
    String(Arc<str>),
    /// Instance of a class
    Object(ObjectRef),
    /// Single-dimensional array
    Array(ArrayRef),
    /// Managed reference to a storage slot (`T&`)
    ByRef(ValueSlot),
}

impl Value {
    /// The zero value for a location of type `ty`: zero for value primitives, null otherwise
    #[must_use]
    pub fn default_for(ty: &CilType) -> Value {
        match ty.primitive_kind() {
            Some(CilPrimitiveKind::Boolean) => Value::Boolean(false),
            Some(CilPrimitiveKind::Char) => Value::Char(0),
            Some(CilPrimitiveKind::I1) => Value::I1(0),
            Some(CilPrimitiveKind::U1) => Value::U1(0),
            Some(CilPrimitiveKind::I2) => Value::I2(0),
            Some(CilPrimitiveKind::U2) => Value::U2(0),
            Some(CilPrimitiveKind::I4) => Value::I4(0),
            Some(CilPrimitiveKind::U4) => Value::U4(0),
            Some(CilPrimitiveKind::I8) => Value::I8(0),
            Some(CilPrimitiveKind::U8) => Value::U8(0),
            Some(CilPrimitiveKind::R4) => Value::R4(0.0),
            Some(CilPrimitiveKind::R8) => Value::R8(0.0),
            _ => Value::Null,
        }
    }

    /// The primitive kind of this value. Objects and arrays report `Object`, null and
    /// references report `None`.
    #[must_use]
    pub fn kind(&self) -> Option<CilPrimitiveKind> {
        match self {
            Value::Null | Value::ByRef(_) => None,
            Value::Boolean(_) => Some(CilPrimitiveKind::Boolean),
            Value::Char(_) => Some(CilPrimitiveKind::Char),
            Value::I1(_) => Some(CilPrimitiveKind::I1),
            Value::U1(_) => Some(CilPrimitiveKind::U1),
            Value::I2(_) => Some(CilPrimitiveKind::I2),
            Value::U2(_) => Some(CilPrimitiveKind::U2),
            Value::I4(_) => Some(CilPrimitiveKind::I4),
            Value::U4(_) => Some(CilPrimitiveKind::U4),
            Value::I8(_) => Some(CilPrimitiveKind::I8),
            Value::U8(_) => Some(CilPrimitiveKind::U8),
            Value::R4(_) => Some(CilPrimitiveKind::R4),
            Value::R8(_) => Some(CilPrimitiveKind::R8),
            Value::String(_) => Some(CilPrimitiveKind::String),
            Value::Object(_) | Value::Array(_) => Some(CilPrimitiveKind::Object),
        }
    }

    /// Name of the runtime type of this value, for diagnostics
    #[must_use]
    pub fn type_name(&self) -> String {
        match self {
            Value::Null => "null".to_string(),
            Value::Object(object) => object.object_type().fullname(),
            Value::Array(array) => format!("{}[]", array.element_type().fullname()),
            Value::ByRef(slot) => format!("{}&", slot.get().type_name()),
            other => other
                .kind()
                .map(|kind| format!("{}.{}", kind.namespace(), kind.name()))
                .unwrap_or_default(),
        }
    }

    /// Returns true for `Null`
    #[must_use]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Check if this value can be stored in a location of type `ty` without conversion
    #[must_use]
    pub fn is_instance_of(&self, ty: &CilType) -> bool {
        match (self, ty.flavor) {
            (Value::ByRef(_), CilFlavor::ByRef) => true,
            (Value::ByRef(_), _) | (_, CilFlavor::ByRef) => false,
            (_, CilFlavor::Primitive(CilPrimitiveKind::Void)) => false,
            (_, CilFlavor::Primitive(CilPrimitiveKind::Object)) => true,
            (Value::Null, CilFlavor::Primitive(kind)) => kind.is_reference(),
            (Value::Null, _) => true,
            (value, CilFlavor::Primitive(kind)) => value.kind() == Some(kind),
            (Value::Object(object), CilFlavor::Class | CilFlavor::Interface) => {
                object.object_type().is_assignable_to(ty)
            }
            (Value::Array(array), CilFlavor::Array) => ty
                .element_type()
                .is_some_and(|element| element.token == array.element_type().token),
            _ => false,
        }
    }

    /// Convert this value for storage in a location of type `ty`.
    ///
    /// Values that already fit are returned unchanged. Integers narrow and widen the way
    /// CIL stores them: `int32` truncates into the small integer kinds, `Boolean` and
    /// `Char`; small kinds widen into `int32`; `int64` and `uint64` share their bits.
    #[must_use]
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_possible_wrap
    )]
    pub fn coerce(self, ty: &CilType) -> Option<Value> {
        if self.is_instance_of(ty) {
            return Some(self);
        }

        let target = ty.primitive_kind()?;
        let widened = match &self {
            Value::Boolean(v) => Some(i32::from(*v)),
            Value::Char(v) | Value::U2(v) => Some(i32::from(*v)),
            Value::I1(v) => Some(i32::from(*v)),
            Value::U1(v) => Some(i32::from(*v)),
            Value::I2(v) => Some(i32::from(*v)),
            Value::I4(v) => Some(*v),
            Value::U4(v) => Some(*v as i32),
            _ => None,
        };

        match (self, target, widened) {
            (Value::U8(v), CilPrimitiveKind::I8, _) => Some(Value::I8(v as i64)),
            (Value::I8(v), CilPrimitiveKind::U8, _) => Some(Value::U8(v as u64)),
            (_, CilPrimitiveKind::Boolean, Some(v)) => Some(Value::Boolean(v != 0)),
            (_, CilPrimitiveKind::Char, Some(v)) => Some(Value::Char(v as u16)),
            (_, CilPrimitiveKind::I1, Some(v)) => Some(Value::I1(v as i8)),
            (_, CilPrimitiveKind::U1, Some(v)) => Some(Value::U1(v as u8)),
            (_, CilPrimitiveKind::I2, Some(v)) => Some(Value::I2(v as i16)),
            (_, CilPrimitiveKind::U2, Some(v)) => Some(Value::U2(v as u16)),
            (_, CilPrimitiveKind::I4, Some(v)) => Some(Value::I4(v)),
            (_, CilPrimitiveKind::U4, Some(v)) => Some(Value::U4(v as u32)),
            _ => None,
        }
    }

    /// Borrow the string of a `String` value
    ///
    /// # Errors
    /// Returns an error if the value is not a string.
    pub fn as_str(&self) -> Result<&str> {
        match self {
            Value::String(value) => Ok(value),
            other => Err(TypeError(format!(
                "Expected System.String, found {}",
                other.type_name()
            ))),
        }
    }

    /// The value of an `Int32`
    ///
    /// # Errors
    /// Returns an error if the value is not an `Int32`.
    pub fn as_i32(&self) -> Result<i32> {
        match self {
            Value::I4(value) => Ok(*value),
            other => Err(TypeError(format!(
                "Expected System.Int32, found {}",
                other.type_name()
            ))),
        }
    }

    /// The value of an `Int64`
    ///
    /// # Errors
    /// Returns an error if the value is not an `Int64`.
    pub fn as_i64(&self) -> Result<i64> {
        match self {
            Value::I8(value) => Ok(*value),
            other => Err(TypeError(format!(
                "Expected System.Int64, found {}",
                other.type_name()
            ))),
        }
    }

    /// The value of a `Boolean`
    ///
    /// # Errors
    /// Returns an error if the value is not a `Boolean`.
    pub fn as_bool(&self) -> Result<bool> {
        match self {
            Value::Boolean(value) => Ok(*value),
            other => Err(TypeError(format!(
                "Expected System.Boolean, found {}",
                other.type_name()
            ))),
        }
    }

    /// The object of an `Object` value
    ///
    /// # Errors
    /// Returns an error if the value is not an object instance.
    pub fn as_object(&self) -> Result<&ObjectRef> {
        match self {
            Value::Object(object) => Ok(object),
            other => Err(TypeError(format!(
                "Expected an object, found {}",
                other.type_name()
            ))),
        }
    }

    /// The array of an `Array` value
    ///
    /// # Errors
    /// Returns an error if the value is not an array.
    pub fn as_array(&self) -> Result<&ArrayRef> {
        match self {
            Value::Array(array) => Ok(array),
            other => Err(TypeError(format!(
                "Expected an array, found {}",
                other.type_name()
            ))),
        }
    }

    /// The slot of a `ByRef` value
    ///
    /// # Errors
    /// Returns an error if the value is not a managed reference.
    pub fn as_slot(&self) -> Result<&ValueSlot> {
        match self {
            Value::ByRef(slot) => Ok(slot),
            other => Err(TypeError(format!(
                "Expected a managed reference, found {}",
                other.type_name()
            ))),
        }
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(v) => write!(f, "{v}"),
            Value::Char(v) => write!(f, "'\\u{v:04x}'"),
            Value::I1(v) => write!(f, "{v}i8"),
            Value::U1(v) => write!(f, "{v}u8"),
            Value::I2(v) => write!(f, "{v}i16"),
            Value::U2(v) => write!(f, "{v}u16"),
            Value::I4(v) => write!(f, "{v}"),
            Value::U4(v) => write!(f, "{v}u32"),
            Value::I8(v) => write!(f, "{v}i64"),
            Value::U8(v) => write!(f, "{v}u64"),
            Value::R4(v) => write!(f, "{v}f32"),
            Value::R8(v) => write!(f, "{v}f64"),
            Value::String(v) => write!(f, "{v:?}"),
            Value::Object(object) => write!(f, "{}@{:p}", object.object_type().name, Arc::as_ptr(object)),
            Value::Array(array) => write!(f, "{}[{}]", array.element_type().name, array.len()),
            Value::ByRef(slot) => write!(f, "&{:?}", slot.get()),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Boolean(a), Value::Boolean(b)) => a == b,
            (Value::Char(a), Value::Char(b)) | (Value::U2(a), Value::U2(b)) => a == b,
            (Value::I1(a), Value::I1(b)) => a == b,
            (Value::U1(a), Value::U1(b)) => a == b,
            (Value::I2(a), Value::I2(b)) => a == b,
            (Value::I4(a), Value::I4(b)) => a == b,
            (Value::U4(a), Value::U4(b)) => a == b,
            (Value::I8(a), Value::I8(b)) => a == b,
            (Value::U8(a), Value::U8(b)) => a == b,
            (Value::R4(a), Value::R4(b)) => a == b,
            (Value::R8(a), Value::R8(b)) => a == b,
            (Value::String(a), Value::String(b)) => a == b,
            (Value::Object(a), Value::Object(b)) => Arc::ptr_eq(a, b),
            (Value::Array(a), Value::Array(b)) => Arc::ptr_eq(a, b),
            (Value::ByRef(a), Value::ByRef(b)) => a.ptr_eq(b),
            _ => false,
        }
    }
}

macro_rules! impl_from {
    ($($source:ty => $variant:ident),* $(,)?) => {
        $(
            impl From<$source> for Value {
                fn from(value: $source) -> Self {
                    Value::$variant(value)
                }
            }
        )*
    };
}

impl_from!(
    bool => Boolean,
    i8 => I1,
    u8 => U1,
    i16 => I2,
    u16 => U2,
    i32 => I4,
    u32 => U4,
    i64 => I8,
    u64 => U8,
    f32 => R4,
    f64 => R8,
    ObjectRef => Object,
    ArrayRef => Array,
    ValueSlot => ByRef,
);

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(Arc::from(value))
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(Arc::from(value))
    }
}

impl From<char> for Value {
    fn from(value: char) -> Self {
        let mut units = [0u16; 2];
        Value::Char(value.encode_utf16(&mut units)[0])
    }
}

/// Shared mutable storage backing a by-reference argument
#[derive(Clone)]
pub struct ValueSlot(Arc<RwLock<Value>>);

impl ValueSlot {
    /// Create a slot holding `value`
    pub fn new(value: impl Into<Value>) -> Self {
        ValueSlot(Arc::new(RwLock::new(value.into())))
    }

    /// Create a slot holding the zero value of `ty`, e.g. for `out` arguments
    pub fn default_for(ty: &CilType) -> Self {
        ValueSlot(Arc::new(RwLock::new(Value::default_for(ty))))
    }

    /// Read the current value
    pub fn get(&self) -> Value {
        read_lock!(self.0).clone()
    }

    /// Replace the current value
    pub fn set(&self, value: impl Into<Value>) {
        *write_lock!(self.0) = value.into();
    }

    /// Returns true if both handles refer to the same slot
    pub fn ptr_eq(&self, other: &ValueSlot) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for ValueSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ValueSlot({:?})", self.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::typesystem::TypeRegistry;

    #[test]
    fn test_instance_checks() {
        let registry = TypeRegistry::default();
        let int = registry.get_primitive(CilPrimitiveKind::I4).unwrap();
        let string = registry.get_primitive(CilPrimitiveKind::String).unwrap();
        let object = registry.get_primitive(CilPrimitiveKind::Object).unwrap();
        let int_ref = registry.by_ref(&int).unwrap();

        assert!(Value::I4(1).is_instance_of(&int));
        assert!(!Value::I8(1).is_instance_of(&int));
        assert!(!Value::Null.is_instance_of(&int));
        assert!(Value::Null.is_instance_of(&string));
        assert!(Value::from("x").is_instance_of(&object));
        assert!(Value::from(ValueSlot::new(1)).is_instance_of(&int_ref));
        assert!(!Value::from(ValueSlot::new(1)).is_instance_of(&object));
    }

    #[test]
    fn test_coercion_follows_stack_rules() {
        let registry = TypeRegistry::default();
        let get = |kind| registry.get_primitive(kind).unwrap();

        assert_eq!(
            Value::I4(1).coerce(&get(CilPrimitiveKind::Boolean)),
            Some(Value::Boolean(true))
        );
        assert_eq!(
            Value::I4(300).coerce(&get(CilPrimitiveKind::U1)),
            Some(Value::U1(44))
        );
        assert_eq!(
            Value::U1(200).coerce(&get(CilPrimitiveKind::I4)),
            Some(Value::I4(200))
        );
        assert_eq!(
            Value::I8(-1).coerce(&get(CilPrimitiveKind::U8)),
            Some(Value::U8(u64::MAX))
        );
        assert_eq!(Value::R8(1.0).coerce(&get(CilPrimitiveKind::I4)), None);
        assert_eq!(Value::I4(1).coerce(&get(CilPrimitiveKind::String)), None);
    }

    #[test]
    fn test_slots_are_shared() {
        let slot = ValueSlot::new(5);
        let alias = slot.clone();
        alias.set(7);
        assert_eq!(slot.get(), Value::I4(7));
        assert!(slot.ptr_eq(&alias));
        assert!(!slot.ptr_eq(&ValueSlot::new(7)));
    }

    #[test]
    fn test_accessors() {
        assert_eq!(Value::from("abc").as_str().unwrap(), "abc");
        assert!(Value::I4(1).as_str().is_err());
        assert_eq!(Value::from(true).as_bool().unwrap(), true);
        assert_eq!(Value::from('A'), Value::Char(65));
        assert_eq!(Value::I4(1).type_name(), "System.Int32");
    }
}
