use bitflags::bitflags;

use crate::metadata::typesystem::CilPrimitiveKind;

/// Represents the flavor (category) of a type in the type system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CilFlavor {
    /// One of the built-in primitive types
    Primitive(CilPrimitiveKind),
    /// A reference type declared by the host or synthesized at runtime
    Class,
    /// An interface contract
    Interface,
    /// A managed reference (`T&`) to a slot holding a value of the element type
    ByRef,
    /// A single-dimensional, zero-based array (`T[]`)
    Array,
}

impl CilFlavor {
    /// Check if this is a primitive type
    #[must_use]
    pub fn is_primitive(&self) -> bool {
        matches!(self, CilFlavor::Primitive(_))
    }

    /// Check if this is a value type
    #[must_use]
    pub fn is_value_type(&self) -> bool {
        match self {
            CilFlavor::Primitive(kind) => kind.is_value_type(),
            _ => false,
        }
    }

    /// Check if this is a reference type
    #[must_use]
    pub fn is_reference_type(&self) -> bool {
        match self {
            CilFlavor::Primitive(kind) => kind.is_reference(),
            CilFlavor::Class | CilFlavor::Interface | CilFlavor::Array => true,
            CilFlavor::ByRef => false,
        }
    }

    /// Try to convert to a `CilPrimitiveKind` if this is a primitive type
    #[must_use]
    pub fn to_primitive_kind(&self) -> Option<CilPrimitiveKind> {
        match self {
            CilFlavor::Primitive(kind) => Some(*kind),
            _ => None,
        }
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// Type attributes (ECMA-335 `TypeAttributes`, subset)
    pub struct TypeAttributes: u32 {
        /// Type has public scope
        const PUBLIC = 0x0000_0001;
        /// Type is an interface
        const INTERFACE = 0x0000_0020;
        /// Type is abstract and cannot be instantiated
        const ABSTRACT = 0x0000_0080;
        /// Type cannot be derived from
        const SEALED = 0x0000_0100;
        /// Type name is special
        const SPECIAL_NAME = 0x0000_0400;
        /// Initialize the type any time before the first static field access
        const BEFORE_FIELD_INIT = 0x0010_0000;
    }
}

impl TypeAttributes {
    /// Attributes of a synthesized proxy class: public, sealed, concrete
    #[must_use]
    pub fn proxy_class() -> Self {
        TypeAttributes::PUBLIC | TypeAttributes::SEALED | TypeAttributes::BEFORE_FIELD_INIT
    }

    /// Attributes of an interface declaration
    #[must_use]
    pub fn interface() -> Self {
        TypeAttributes::PUBLIC | TypeAttributes::INTERFACE | TypeAttributes::ABSTRACT
    }
}
