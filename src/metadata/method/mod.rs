//! Methods, parameters, properties and method bodies.
//!
//! Members are shared as [`MethodRc`] / [`PropertyRc`]. A method either has no body
//! (abstract / interface members), a native body supplied by the host as a Rust closure,
//! or a CIL body produced by an [`crate::assembly::InstructionEmitter`].
//!
//! Constructors are ordinary [`Method`]s named [`CTOR_NAME`] with the
//! `SPECIAL_NAME | RTSPECIAL_NAME` attributes.

mod types;

use std::{fmt, sync::Arc};

pub use types::{MethodAttributes, ParamAttributes, METHOD_ACCESS_MASK};

use crate::{
    assembly::Instruction,
    metadata::{
        token::Token,
        typesystem::{CilPrimitiveKind, CilTypeRc},
    },
    runtime::{Invocation, Value},
    Result,
};

/// Name of instance constructors
pub const CTOR_NAME: &str = ".ctor";

/// Reference to a `Method`
pub type MethodRc = Arc<Method>;
/// A vector that holds a list of `Method`
pub type MethodList = Arc<boxcar::Vec<MethodRc>>;
/// Reference to a `Property`
pub type PropertyRc = Arc<Property>;
/// A vector that holds a list of `Property`
pub type PropertyList = Arc<boxcar::Vec<PropertyRc>>;

/// Host-provided implementation of a method
pub type NativeMethod = Arc<dyn Fn(&Invocation<'_>) -> Result<Value> + Send + Sync>;

/// A single parameter of a method signature
#[derive(Clone)]
pub struct Param {
    /// Parameter name
    pub name: String,
    /// 1-based position in the signature
    pub sequence: u16,
    /// Direction flags
    pub flags: ParamAttributes,
    /// The parameter type; by-reference parameters carry a `T&` type
    pub param_type: CilTypeRc,
}

impl Param {
    /// Create an input parameter
    pub fn new(name: impl Into<String>, param_type: &CilTypeRc) -> Self {
        Param {
            name: name.into(),
            sequence: 0,
            flags: ParamAttributes::empty(),
            param_type: param_type.clone(),
        }
    }

    /// Create an `out` parameter. `param_type` is expected to be a by-reference type.
    pub fn out(name: impl Into<String>, param_type: &CilTypeRc) -> Self {
        Param {
            name: name.into(),
            sequence: 0,
            flags: ParamAttributes::OUT,
            param_type: param_type.clone(),
        }
    }

    /// Returns true if the parameter is passed through a reference slot
    #[must_use]
    pub fn is_by_ref(&self) -> bool {
        self.param_type.is_by_ref()
    }

    /// Copy `params`, numbering them 1..n in signature order
    pub(crate) fn sequenced(params: &[Param]) -> Vec<Param> {
        params
            .iter()
            .enumerate()
            .map(|(i, param)| Param {
                sequence: u16::try_from(i + 1).unwrap_or(u16::MAX),
                ..param.clone()
            })
            .collect()
    }
}

impl fmt::Debug for Param {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.param_type.name, self.name)
    }
}

/// A CIL method body: the instruction stream plus the declared locals
#[derive(Debug, Clone, Default)]
pub struct CilBody {
    /// The instructions, in execution order
    pub instructions: Vec<Instruction>,
    /// Types of the local variables, indexed by local number
    pub locals: Vec<CilTypeRc>,
}

/// The implementation attached to a method
#[derive(Clone)]
pub enum MethodBody {
    /// No implementation (abstract or interface member)
    None,
    /// Implemented by the host in Rust
    Native(NativeMethod),
    /// Implemented by emitted CIL
    Cil(Arc<CilBody>),
}

impl fmt::Debug for MethodBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MethodBody::None => write!(f, "None"),
            MethodBody::Native(_) => write!(f, "Native"),
            MethodBody::Cil(body) => write!(f, "Cil({} instructions)", body.instructions.len()),
        }
    }
}

/// A method, constructor or property accessor
pub struct Method {
    /// Token (`MethodDef` table, or the constructor table)
    pub token: Token,
    /// Method name
    pub name: String,
    /// Attributes
    pub flags: MethodAttributes,
    /// Parameters, excluding the implicit `this`
    pub params: Vec<Param>,
    /// Return type (`System.Void` for none)
    pub return_type: CilTypeRc,
    /// Implementation
    pub body: MethodBody,
}

impl Method {
    /// Returns true if this is an instance constructor
    #[must_use]
    pub fn is_constructor(&self) -> bool {
        self.name == CTOR_NAME && self.flags.contains(MethodAttributes::RTSPECIAL_NAME)
    }

    /// Returns true if the method has no implementation
    #[must_use]
    pub fn is_abstract(&self) -> bool {
        matches!(self.body, MethodBody::None)
    }

    /// Returns true if the method does not return a value
    #[must_use]
    pub fn returns_void(&self) -> bool {
        self.return_type.primitive_kind() == Some(CilPrimitiveKind::Void)
    }

    /// The resolved parameter types, in positional order
    #[must_use]
    pub fn param_types(&self) -> Vec<CilTypeRc> {
        self.params.iter().map(|p| p.param_type.clone()).collect()
    }

    /// Check if `other` has the same name, parameter types and return type
    #[must_use]
    pub fn signature_matches(&self, other: &Method) -> bool {
        self.name == other.name
            && self.return_type.token == other.return_type.token
            && self.params_match(&other.param_types())
    }

    /// Check if the parameter types equal `types` position by position
    #[must_use]
    pub fn params_match(&self, types: &[CilTypeRc]) -> bool {
        self.params.len() == types.len()
            && self
                .params
                .iter()
                .zip(types)
                .all(|(param, ty)| param.param_type.token == ty.token)
    }

    /// Human readable signature, e.g. `Int32 TryGet(String, Int32&)`
    #[must_use]
    pub fn signature(&self) -> String {
        let params: Vec<&str> = self
            .params
            .iter()
            .map(|p| p.param_type.name.as_str())
            .collect();
        format!(
            "{} {}({})",
            self.return_type.name,
            self.name,
            params.join(", ")
        )
    }
}

impl fmt::Debug for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Method")
            .field("token", &self.token)
            .field("signature", &self.signature())
            .field("flags", &self.flags)
            .field("body", &self.body)
            .finish()
    }
}

/// A property and its accessor methods
pub struct Property {
    /// Token (`Property` table)
    pub token: Token,
    /// Property name
    pub name: String,
    /// Type of the property value
    pub property_type: CilTypeRc,
    /// `get_<name>` accessor
    pub getter: Option<MethodRc>,
    /// `set_<name>` accessor
    pub setter: Option<MethodRc>,
}

impl Property {
    /// Accessor methods of this property, getter first
    pub fn accessors(&self) -> impl Iterator<Item = &MethodRc> {
        self.getter.iter().chain(self.setter.iter())
    }
}

impl fmt::Debug for Property {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Property")
            .field("token", &self.token)
            .field("name", &self.name)
            .field("type", &self.property_type.name)
            .field("get", &self.getter.is_some())
            .field("set", &self.setter.is_some())
            .finish()
    }
}
