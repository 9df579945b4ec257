//! Runtime type system for host and synthesized types.
//!
//! This module provides the type model the synthesis engine walks and produces: interfaces
//! and classes declared by the host, the built-in primitives, managed references (`T&`) and
//! arrays, and the proxy classes synthesized at runtime.
//!
//! # Key Components
//!
//! - [`CilType`]: Core type representation with base type, interfaces and members
//! - [`TypeRegistry`]: Central, concurrent registry for all types and members
//! - [`TypeBuilder`]: Fluent builder for declaring host types
//! - [`CilPrimitiveKind`]: Built-in primitive types (int32, string, object, etc.)
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use dotproxy::metadata::typesystem::{CilPrimitiveKind, TypeBuilder, TypeRegistry};
//!
//! let registry = Arc::new(TypeRegistry::default());
//! let entity = TypeBuilder::interface(&registry, "Shop", "IEntity")
//!     .method("GetId", &[], &registry.get_primitive(CilPrimitiveKind::I4)?)?
//!     .build()?;
//!
//! assert!(entity.is_interface());
//! assert_eq!(entity.fullname(), "Shop.IEntity");
//! # Ok::<(), dotproxy::Error>(())
//! ```

mod base;
mod builder;
mod primitives;
mod registry;

use std::{
    collections::HashSet,
    fmt,
    sync::{Arc, OnceLock},
};

pub use base::{CilFlavor, TypeAttributes};
pub use builder::TypeBuilder;
pub use primitives::CilPrimitiveKind;
pub use registry::TypeRegistry;

use crate::metadata::{
    method::{Method, MethodList, MethodRc, PropertyList, PropertyRc},
    token::Token,
};

/// A vector that holds a list of `CilType`
pub type CilTypeList = Arc<boxcar::Vec<CilTypeRc>>;
/// Reference to a `CilType`
pub type CilTypeRc = Arc<CilType>;

/// Represents a 'Type': a primitive, a host declared class or interface, a constructed
/// by-ref / array type, or a synthesized proxy class.
pub struct CilType {
    /// Token
    pub token: Token,
    /// The `TypeFlavor`
    pub flavor: CilFlavor,
    /// `TypeNamespace`
    pub namespace: String,
    /// `TypeName`
    pub name: String,
    /// Flags
    pub flags: TypeAttributes,
    /// Element type of by-ref and array types
    element: Option<CilTypeRc>,
    /// This types base aka 'extends'
    base: OnceLock<CilTypeRc>,
    /// All interfaces this type declares directly
    pub interfaces: CilTypeList,
    /// All methods this type has (property accessors included)
    pub methods: MethodList,
    /// All properties this type has
    pub properties: PropertyList,
    /// All instance constructors this type has
    pub constructors: MethodList,
}

impl CilType {
    /// Create a new instance of a `CilType` without members
    pub fn new(
        token: Token,
        flavor: CilFlavor,
        namespace: impl Into<String>,
        name: impl Into<String>,
        flags: TypeAttributes,
    ) -> Self {
        CilType {
            token,
            flavor,
            namespace: namespace.into(),
            name: name.into(),
            flags,
            element: None,
            base: OnceLock::new(),
            interfaces: Arc::new(boxcar::Vec::new()),
            methods: Arc::new(boxcar::Vec::new()),
            properties: Arc::new(boxcar::Vec::new()),
            constructors: Arc::new(boxcar::Vec::new()),
        }
    }

    /// Create a constructed type (`T&` or `T[]`) over `element`
    pub(crate) fn compound(token: Token, flavor: CilFlavor, element: &CilTypeRc) -> Self {
        let suffix = match flavor {
            CilFlavor::ByRef => "&",
            _ => "[]",
        };

        let mut new_type = CilType::new(
            token,
            flavor,
            element.namespace.clone(),
            format!("{}{}", element.name, suffix),
            TypeAttributes::PUBLIC,
        );
        new_type.element = Some(element.clone());
        new_type
    }

    /// Access the base type of this type, if it exists
    pub fn base(&self) -> Option<CilTypeRc> {
        self.base.get().cloned()
    }

    /// Set the base type. Fails if a base type was already set.
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeError`] if the base is already set.
    pub fn set_base(&self, base: &CilTypeRc) -> crate::Result<()> {
        self.base.set(base.clone()).map_err(|_| {
            crate::Error::TypeError(format!("Base of '{}' already set", self.fullname()))
        })
    }

    /// Returns the full name (Namespace.Name) of the entity
    pub fn fullname(&self) -> String {
        if self.namespace.is_empty() {
            self.name.clone()
        } else {
            format!("{0}.{1}", self.namespace, self.name)
        }
    }

    /// Element type of a by-ref or array type
    pub fn element_type(&self) -> Option<CilTypeRc> {
        self.element.clone()
    }

    /// Returns the primitive kind if this is a primitive type
    pub fn primitive_kind(&self) -> Option<CilPrimitiveKind> {
        self.flavor.to_primitive_kind()
    }

    /// Returns true for interface types
    pub fn is_interface(&self) -> bool {
        self.flavor == CilFlavor::Interface
    }

    /// Returns true if the type is sealed
    pub fn is_sealed(&self) -> bool {
        self.flags.contains(TypeAttributes::SEALED)
    }

    /// Returns true for primitive types
    pub fn is_primitive(&self) -> bool {
        self.flavor.is_primitive()
    }

    /// Returns true for managed reference types (`T&`)
    pub fn is_by_ref(&self) -> bool {
        self.flavor == CilFlavor::ByRef
    }

    /// Returns true if a new class can derive from this type
    pub fn is_derivable(&self) -> bool {
        match self.flavor {
            CilFlavor::Class => !self.is_sealed(),
            CilFlavor::Primitive(kind) => kind == CilPrimitiveKind::Object,
            _ => false,
        }
    }

    /// Every interface this type implements: declared ones, the ones they inherit, and the
    /// ones of the base chain. Each interface appears once, in first-seen order.
    pub fn all_interfaces(&self) -> Vec<CilTypeRc> {
        fn collect(ty: &CilType, seen: &mut HashSet<Token>, out: &mut Vec<CilTypeRc>) {
            for (_, interface) in ty.interfaces.iter() {
                if seen.insert(interface.token) {
                    out.push(interface.clone());
                    collect(interface, seen, out);
                }
            }
            if let Some(base) = ty.base() {
                collect(&base, seen, out);
            }
        }

        let mut seen = HashSet::new();
        let mut result = Vec::new();
        collect(self, &mut seen, &mut result);
        result
    }

    /// Check if a value of this type can be stored in a location of type `target`
    pub fn is_assignable_to(&self, target: &CilType) -> bool {
        if self.token == target.token {
            return true;
        }

        if target.primitive_kind() == Some(CilPrimitiveKind::Object) {
            return !self.is_by_ref() && self.primitive_kind() != Some(CilPrimitiveKind::Void);
        }

        if target.is_interface() {
            return self
                .all_interfaces()
                .iter()
                .any(|interface| interface.token == target.token);
        }

        let mut current = self.base();
        while let Some(base) = current {
            if base.token == target.token {
                return true;
            }
            current = base.base();
        }

        false
    }

    /// Find a method declared on this type by name and exact parameter types
    pub fn find_method(&self, name: &str, params: &[CilTypeRc]) -> Option<MethodRc> {
        self.methods
            .iter()
            .map(|(_, method)| method)
            .find(|method| method.name == name && method.params_match(params))
            .cloned()
    }

    /// Find a method by name and exact parameter types on this type or its base chain
    pub fn find_method_in_hierarchy(&self, name: &str, params: &[CilTypeRc]) -> Option<MethodRc> {
        if let Some(method) = self.find_method(name, params) {
            return Some(method);
        }

        let mut current = self.base();
        while let Some(base) = current {
            if let Some(method) = base.find_method(name, params) {
                return Some(method);
            }
            current = base.base();
        }
        None
    }

    /// Find all methods with `name` on this type or its base chain, most derived first
    pub fn find_methods_by_name(&self, name: &str) -> Vec<MethodRc> {
        let mut result: Vec<MethodRc> = self
            .methods
            .iter()
            .map(|(_, method)| method)
            .filter(|method| method.name == name)
            .cloned()
            .collect();

        let mut current = self.base();
        while let Some(base) = current {
            result.extend(
                base.methods
                    .iter()
                    .map(|(_, method)| method)
                    .filter(|method| method.name == name)
                    .cloned(),
            );
            current = base.base();
        }
        result
    }

    /// Find the instance constructor with exactly the given parameter types
    pub fn find_constructor(&self, params: &[CilTypeRc]) -> Option<MethodRc> {
        self.constructors
            .iter()
            .map(|(_, ctor)| ctor)
            .find(|ctor| ctor.params_match(params))
            .cloned()
    }

    /// Find the implementation that virtual dispatch selects for `method` on an instance of
    /// this type: the most derived non-abstract method with the same signature.
    pub fn find_override(&self, method: &Method) -> Option<MethodRc> {
        let matches = |ty: &CilType| {
            ty.methods
                .iter()
                .map(|(_, candidate)| candidate)
                .find(|candidate| !candidate.is_abstract() && candidate.signature_matches(method))
                .cloned()
        };

        if let Some(found) = matches(self) {
            return Some(found);
        }

        let mut current = self.base();
        while let Some(base) = current {
            if let Some(found) = matches(&base) {
                return Some(found);
            }
            current = base.base();
        }
        None
    }

    /// Find a property by name on this type or its base chain
    pub fn find_property(&self, name: &str) -> Option<PropertyRc> {
        if let Some((_, property)) = self.properties.iter().find(|(_, p)| p.name == name) {
            return Some(property.clone());
        }
        self.base().and_then(|base| base.find_property(name))
    }
}

impl fmt::Debug for CilType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CilType")
            .field("token", &self.token)
            .field("flavor", &self.flavor)
            .field("fullname", &self.fullname())
            .field("flags", &self.flags)
            .field("base", &self.base().map(|b| b.fullname()))
            .field("methods", &self.methods.count())
            .field("properties", &self.properties.count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn registry() -> Arc<TypeRegistry> {
        Arc::new(TypeRegistry::default())
    }

    #[test]
    fn test_all_interfaces_deduplicates_diamonds() {
        let registry = registry();
        let root = TypeBuilder::interface(&registry, "Test", "IRoot")
            .build()
            .unwrap();
        let left = TypeBuilder::interface(&registry, "Test", "ILeft")
            .implements(&root)
            .build()
            .unwrap();
        let right = TypeBuilder::interface(&registry, "Test", "IRight")
            .implements(&root)
            .build()
            .unwrap();
        let bottom = TypeBuilder::interface(&registry, "Test", "IBottom")
            .implements(&left)
            .implements(&right)
            .build()
            .unwrap();

        let names: Vec<String> = bottom
            .all_interfaces()
            .iter()
            .map(|i| i.name.clone())
            .collect();
        assert_eq!(names, vec!["ILeft", "IRoot", "IRight"]);
    }

    #[test]
    fn test_assignability_follows_base_and_interfaces() {
        let registry = registry();
        let marker = TypeBuilder::interface(&registry, "Test", "IMarker")
            .build()
            .unwrap();
        let base = TypeBuilder::class(&registry, "Test", "Base")
            .implements(&marker)
            .build()
            .unwrap();
        let derived = TypeBuilder::class(&registry, "Test", "Derived")
            .extends(&base)
            .build()
            .unwrap();
        let object = registry.get_primitive(CilPrimitiveKind::Object).unwrap();
        let int = registry.get_primitive(CilPrimitiveKind::I4).unwrap();

        assert!(derived.is_assignable_to(&base));
        assert!(derived.is_assignable_to(&marker));
        assert!(derived.is_assignable_to(&object));
        assert!(int.is_assignable_to(&object));
        assert!(!base.is_assignable_to(&derived));
        assert!(!int.is_assignable_to(&base));

        let by_ref = registry.by_ref(&int).unwrap();
        assert!(!by_ref.is_assignable_to(&object));
    }

    #[test]
    fn test_derivability() {
        let registry = registry();
        let open = TypeBuilder::class(&registry, "Test", "Open").build().unwrap();
        let closed = TypeBuilder::class(&registry, "Test", "Closed")
            .sealed()
            .build()
            .unwrap();
        let iface = TypeBuilder::interface(&registry, "Test", "IFace")
            .build()
            .unwrap();

        assert!(open.is_derivable());
        assert!(!closed.is_derivable());
        assert!(!iface.is_derivable());
        assert!(!registry
            .get_primitive(CilPrimitiveKind::String)
            .unwrap()
            .is_derivable());
        assert!(registry
            .get_primitive(CilPrimitiveKind::Object)
            .unwrap()
            .is_derivable());
    }

    #[test]
    fn test_compound_names() {
        let registry = registry();
        let int = registry.get_primitive(CilPrimitiveKind::I4).unwrap();
        let by_ref = registry.by_ref(&int).unwrap();
        assert_eq!(by_ref.fullname(), "System.Int32&");
        assert_eq!(by_ref.element_type().unwrap().token, int.token);

        let object = registry.get_primitive(CilPrimitiveKind::Object).unwrap();
        let array = registry.array_of(&object).unwrap();
        assert_eq!(array.fullname(), "System.Object[]");
        assert_eq!(array.flavor, CilFlavor::Array);
    }
}
