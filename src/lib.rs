// Copyright 2025 Johann Kempter
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.
//
// SPDX-License-Identifier: Apache-2.0

#![doc(html_no_source)]
#![deny(missing_docs)]
#![allow(clippy::too_many_arguments)]
#![deny(unsafe_code)]

//! # dotproxy
//!
//! Runtime synthesis of proxy types over a CIL-style type model, with a concurrent pool
//! that caches synthesized types and recycles their instances.
//!
//! Given a base class and an interface, `dotproxy` defines a new class at runtime that
//! derives from the base, chains its constructor to the base constructor and implements
//! every member of the interface (and of all interfaces it extends). What a member body
//! does is decided by a pluggable [`emit::MemberSynthesizer`]; the bundled
//! [`emit::ForwardingSynthesizer`] routes every call to a dispatch method of the base
//! class, which is how interceptors, lazy-loading entities and remoting stubs are built.
//!
//! ## Features
//!
//! - **🧩 Pluggable member synthesis** - Hooks decide every property and method body
//! - **🔒 Validated emission** - Bodies are stack-checked while emitted and verified on execution
//! - **↔️ By-reference parameters** - `ref`/`out` values travel through typed indirect access
//! - **⚡ Concurrent caching** - Each proxy is synthesized once, even under contention
//! - **♻️ Instance pooling** - Keyed lock-free pools with best-effort disposal
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use dotproxy::prelude::*;
//!
//! let registry = Arc::new(TypeRegistry::default());
//! let string = registry.get_primitive(CilPrimitiveKind::String)?;
//! let object = registry.get_primitive(CilPrimitiveKind::Object)?;
//! let objects = registry.array_of(&object)?;
//!
//! // The base class every call is forwarded to
//! let interceptor = TypeBuilder::class(&registry, "Shop", "Interceptor")
//!     .constructor(&[], |_| Ok(Value::Null))?
//!     .native_method(
//!         "InvokeMethod",
//!         &[Param::new("name", &string), Param::new("args", &objects)],
//!         &object,
//!         |call| Ok(Value::from(format!("intercepted {}", call.arg(0)?.as_str()?))),
//!     )?
//!     .build()?;
//!
//! // The contract the proxy implements
//! let customer = TypeBuilder::interface(&registry, "Shop", "ICustomer")
//!     .readonly_property("Name", &string)?
//!     .build()?;
//!
//! let factory = ProxyFactory::new(registry, ForwardingSynthesizer::default());
//! let proxy = factory.create_proxy("Customer", Some(&interceptor), Some(&customer), None)?;
//! let instance = proxy.create_instance(&[])?;
//!
//! assert_eq!(instance.get_property("Name")?.as_str()?, "intercepted get_Name");
//! # Ok::<(), dotproxy::Error>(())
//! ```
//!
//! ## Architecture
//!
//! - [`metadata`] - The type model: types, methods, properties, tokens and identities
//! - [`assembly`] - Opcode table, instructions and the validating [`assembly::InstructionEmitter`]
//! - [`emit`] - Synthesis context, constructor and member synthesis, type finalization
//! - [`runtime`] - Values, objects and the interpreter executing synthesized bodies
//! - [`cache`] - The keyed concurrent [`ProxyPool`]
//! - [`ProxyFactory`] - Cached, thread-safe synthesis entry point
//!
//! ## Error Handling
//!
//! All operations return [`Result<T, Error>`](Result):
//!
//! ```rust
//! use std::sync::Arc;
//! use dotproxy::prelude::*;
//!
//! let registry = Arc::new(TypeRegistry::default());
//! let factory = ProxyFactory::new(registry, ForwardingSynthesizer::default());
//!
//! match factory.create_proxy("", None, None, None) {
//!     Err(Error::InvalidArgument { name, .. }) => assert_eq!(name, "proxy_name"),
//!     other => panic!("unexpected {other:?}"),
//! }
//! ```
#[macro_use]
pub(crate) mod macros;

#[macro_use]
pub(crate) mod error;

/// Convenient re-exports of the most commonly used types and traits.
///
/// # Example
///
/// ```rust
/// use dotproxy::prelude::*;
///
/// let registry = std::sync::Arc::new(TypeRegistry::default());
/// let factory = ProxyFactory::new(registry, ForwardingSynthesizer::default());
/// assert_eq!(factory.proxy_count(), 0);
/// ```
pub mod prelude;

/// CIL instruction model and the validating instruction emitter
pub mod assembly;

/// Keyed concurrent pools
pub mod cache;

/// Factory configuration
pub mod config;

/// Proxy type synthesis
pub mod emit;

/// The type model proxies are synthesized over
pub mod metadata;

/// Execution of synthesized members
pub mod runtime;

mod factory;
mod proxy;

/// `dotproxy` Result type
///
/// A type alias for [`std::result::Result<T, Error>`] where the error type is always [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// `dotproxy` Error type
///
/// The main error type for all operations in this crate. Variants are grouped into
/// validation, synthesis, pool, runtime and type system errors.
pub use error::Error;

pub use cache::{Disposable, ProxyPool};
pub use config::FactoryConfig;
pub use factory::ProxyFactory;
pub use proxy::{ProxyInstance, ProxySpecification, ProxyType, ProxyTypeRc};
