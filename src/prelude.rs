//! # dotproxy Prelude
//!
//! This module provides a convenient prelude for the most commonly used types and traits
//! from the dotproxy library: declaring host types, synthesizing proxies and pooling.

// ================================================================================================
// Core Types and Error Handling
// ================================================================================================

/// The main error type for all dotproxy operations
pub use crate::Error;

/// The result type used throughout dotproxy
pub use crate::Result;

// ================================================================================================
// Main Entry Points
// ================================================================================================

/// Cached proxy synthesis
pub use crate::{FactoryConfig, ProxyFactory};

/// Synthesized types and their instances
pub use crate::{ProxyInstance, ProxySpecification, ProxyType, ProxyTypeRc};

/// Keyed pooling
pub use crate::{Disposable, ProxyPool};

// ================================================================================================
// Type Model
// ================================================================================================

/// Types, primitives and the registry
pub use crate::metadata::typesystem::{
    CilFlavor, CilPrimitiveKind, CilType, CilTypeRc, TypeBuilder, TypeRegistry,
};

/// Members
pub use crate::metadata::method::{Method, MethodAttributes, MethodRc, Param, Property, PropertyRc};

/// Assembly identities
pub use crate::metadata::identity::{AssemblyIdentity, AssemblyVersion};

/// Metadata token type
pub use crate::metadata::token::Token;

// ================================================================================================
// Synthesis
// ================================================================================================

/// Member synthesis hooks and building blocks
pub use crate::emit::{
    construct_method_scaffold, construct_property_scaffold, ByRefAccessStrategy,
    ForwardingSynthesizer, MemberSynthesizer, MethodScaffold, ProxyTypeBuilder,
};

/// Instruction emission
pub use crate::assembly::InstructionEmitter;

// ================================================================================================
// Runtime
// ================================================================================================

/// Values and invocation context of native members
pub use crate::runtime::{Invocation, Object, ObjectRef, Value, ValueSlot};
