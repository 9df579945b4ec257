//! Method and parameter attribute flags.
//!
//! # Key Types
//! - [`MethodAttributes`]: access, vtable layout and modifier bits of a method
//! - [`ParamAttributes`]: direction bits of a parameter

use bitflags::bitflags;

/// Bitmask for `ACCESS` state extraction
pub const METHOD_ACCESS_MASK: u32 = 0x0007;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    /// Method attributes (ECMA-335 `MethodAttributes`)
    pub struct MethodAttributes: u32 {
        /// Accessible only by the parent type
        const PRIVATE = 0x0001;
        /// Accessibly by anyone in the Assembly
        const ASSEM = 0x0003;
        /// Accessible only by type and sub-types
        const FAMILY = 0x0004;
        /// Accessibly by anyone who has visibility to this scope
        const PUBLIC = 0x0006;
        /// Defined on type, else per instance
        const STATIC = 0x0010;
        /// Method cannot be overridden
        const FINAL = 0x0020;
        /// Method is virtual
        const VIRTUAL = 0x0040;
        /// Method hides by name+sig, else just by name
        const HIDE_BY_SIG = 0x0080;
        /// Method always gets a new slot in the vtable
        const NEW_SLOT = 0x0100;
        /// Method does not provide an implementation
        const ABSTRACT = 0x0400;
        /// Method is special
        const SPECIAL_NAME = 0x0800;
        /// CLI provides 'special' behavior, dpending upon the name of the method
        const RTSPECIAL_NAME = 0x1000;
    }
}

impl MethodAttributes {
    /// Attributes of an abstract interface method
    #[must_use]
    pub fn interface_method() -> Self {
        MethodAttributes::PUBLIC
            | MethodAttributes::VIRTUAL
            | MethodAttributes::ABSTRACT
            | MethodAttributes::NEW_SLOT
            | MethodAttributes::HIDE_BY_SIG
    }

    /// Attributes of an instance constructor
    #[must_use]
    pub fn constructor() -> Self {
        MethodAttributes::PUBLIC
            | MethodAttributes::HIDE_BY_SIG
            | MethodAttributes::SPECIAL_NAME
            | MethodAttributes::RTSPECIAL_NAME
    }

    /// Returns true if the access bits equal `PUBLIC`
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.bits() & METHOD_ACCESS_MASK == MethodAttributes::PUBLIC.bits()
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    /// Parameter attributes (ECMA-335 `ParamAttributes`)
    pub struct ParamAttributes: u16 {
        /// Parameter is input
        const IN = 0x0001;
        /// Parameter is output
        const OUT = 0x0002;
        /// Parameter is optional
        const OPTIONAL = 0x0010;
    }
}
