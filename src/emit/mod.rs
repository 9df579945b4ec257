//! Proxy type synthesis.
//!
//! This module turns a synthesis request (proxy name, base class, interface) into a
//! finished proxy [`crate::metadata::typesystem::CilType`]:
//!
//! - [`SynthesisContext`] validates the request and owns the type under construction
//! - [`synthesize_constructor`] chains the proxy constructor to the base constructor
//! - [`synthesize_members`] hands every interface member to a [`MemberSynthesizer`]
//! - [`ProxyTypeBuilder`] collects the emitted members and validates the finished type
//! - [`ByRefAccessStrategy`] picks the indirect load / store opcodes for `T&` parameters
//!
//! [`ForwardingSynthesizer`] is a ready-made [`MemberSynthesizer`] forwarding every
//! member to a dispatch method of the base type.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use dotproxy::emit::{synthesize_constructor, synthesize_members, ForwardingSynthesizer, SynthesisContext};
//! use dotproxy::metadata::{method::Param, typesystem::{CilPrimitiveKind, TypeBuilder, TypeRegistry}};
//! use dotproxy::runtime::Value;
//! use dotproxy::FactoryConfig;
//!
//! let registry = Arc::new(TypeRegistry::default());
//! let string = registry.get_primitive(CilPrimitiveKind::String)?;
//! let object = registry.get_primitive(CilPrimitiveKind::Object)?;
//! let objects = registry.array_of(&object)?;
//!
//! let base = TypeBuilder::class(&registry, "Demo", "Dispatcher")
//!     .constructor(&[], |_| Ok(Value::Null))?
//!     .native_method(
//!         "InvokeMethod",
//!         &[Param::new("name", &string), Param::new("args", &objects)],
//!         &object,
//!         |call| Ok(call.arg(0)?.clone()),
//!     )?
//!     .build()?;
//! let named = TypeBuilder::interface(&registry, "Demo", "INamed")
//!     .readonly_property("Name", &string)?
//!     .build()?;
//!
//! let mut context = SynthesisContext::create(
//!     &registry,
//!     &FactoryConfig::default(),
//!     Some("Named"),
//!     Some(&base),
//!     Some(&named),
//! )?;
//! let interfaces = context.interfaces().to_vec();
//! synthesize_constructor(context.type_builder(), &base, &[])?;
//! synthesize_members(&ForwardingSynthesizer::default(), context.type_builder(), &base, &interfaces)?;
//! let (proxy, _, _) = context.finish()?;
//!
//! assert_eq!(proxy.fullname(), "DotProxy.ProxyAssembly.Named");
//! assert!(proxy.find_property("Name").is_some());
//! # Ok::<(), dotproxy::Error>(())
//! ```

mod byref;
mod constructor;
mod context;
mod forwarding;
mod members;
mod typebuilder;

pub use byref::{ByRefAccess, ByRefAccessStrategy};
pub use constructor::synthesize_constructor;
pub use context::SynthesisContext;
pub use forwarding::{ForwardingSynthesizer, DEFAULT_DISPATCH_METHOD};
pub use members::{
    construct_method_scaffold, construct_property_scaffold, synthesize_members, MemberSynthesizer,
    PropertyScaffold,
};
pub use typebuilder::{MethodScaffold, ProxyTypeBuilder};
