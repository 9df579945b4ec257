//! The type model proxies are synthesized over.
//!
//! # Key Components
//!
//! - [`typesystem`] - Types, the built-in primitives, and the concurrent [`typesystem::TypeRegistry`]
//! - [`method`] - Methods, parameters, properties and method bodies
//! - [`token`] - Table-tagged identifiers of types, members and user strings
//! - [`identity`] - Assembly identities of hosts and dynamic proxy assemblies
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use dotproxy::metadata::{method::Param, typesystem::{CilPrimitiveKind, TypeBuilder, TypeRegistry}};
//!
//! let registry = Arc::new(TypeRegistry::default());
//! let int = registry.get_primitive(CilPrimitiveKind::I4)?;
//! let int_ref = registry.by_ref(&int)?;
//!
//! let lookup = TypeBuilder::interface(&registry, "Shop", "ILookup")
//!     .method("TryGet", &[Param::out("value", &int_ref)], &registry.get_primitive(CilPrimitiveKind::Boolean)?)?
//!     .build()?;
//!
//! let try_get = lookup.find_method("TryGet", &[int_ref]).unwrap();
//! assert_eq!(try_get.signature(), "Boolean TryGet(Int32&)");
//! # Ok::<(), dotproxy::Error>(())
//! ```

/// Assembly identities of host and proxy assemblies
pub mod identity;
/// Methods, parameters and properties
pub mod method;
/// Metadata tokens addressing registry entries
pub mod token;
/// Implementation of the type system proxies are built over
pub mod typesystem;
