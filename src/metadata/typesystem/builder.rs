//! Builder for host type declarations.
//!
//! This module provides the [`TypeBuilder`] struct, which offers a fluent API for declaring
//! the interfaces and base classes a host hands to the proxy factory. Interface members are
//! declared abstract; base class members carry native bodies, Rust closures that receive the
//! [`crate::runtime::Invocation`] of the call.
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//! use dotproxy::metadata::method::Param;
//! use dotproxy::metadata::typesystem::{CilPrimitiveKind, TypeBuilder, TypeRegistry};
//! use dotproxy::runtime::Value;
//!
//! let registry = Arc::new(TypeRegistry::default());
//! let string = registry.get_primitive(CilPrimitiveKind::String)?;
//!
//! let base = TypeBuilder::class(&registry, "Shop", "EntityBase")
//!     .constructor(&[], |_| Ok(Value::Null))?
//!     .native_method("Describe", &[Param::new("prefix", &string)], &string, |call| {
//!         Ok(Value::from(format!("{}: entity", call.args[0].as_str()?)))
//!     })?
//!     .build()?;
//!
//! assert!(base.find_method("Describe", &[string]).is_some());
//! # Ok::<(), dotproxy::Error>(())
//! ```

use std::sync::Arc;

use crate::{
    metadata::{
        method::{
            Method, MethodAttributes, MethodBody, MethodRc, NativeMethod, Param, Property,
            PropertyRc, CTOR_NAME,
        },
        token::TABLE,
        typesystem::{
            CilFlavor, CilPrimitiveKind, CilType, CilTypeRc, TypeAttributes, TypeRegistry,
        },
    },
    runtime::{Invocation, Value},
    Error::TypeError,
    Result,
};

/// Provides a fluent API for declaring host types
pub struct TypeBuilder {
    /// Type registry for storing the types
    registry: Arc<TypeRegistry>,
    flavor: CilFlavor,
    namespace: String,
    name: String,
    flags: TypeAttributes,
    base: Option<CilTypeRc>,
    interfaces: Vec<CilTypeRc>,
    methods: Vec<MethodRc>,
    properties: Vec<PropertyRc>,
    constructors: Vec<MethodRc>,
}

impl TypeBuilder {
    fn new(
        registry: &Arc<TypeRegistry>,
        flavor: CilFlavor,
        namespace: &str,
        name: &str,
        flags: TypeAttributes,
    ) -> Self {
        TypeBuilder {
            registry: registry.clone(),
            flavor,
            namespace: namespace.to_string(),
            name: name.to_string(),
            flags,
            base: None,
            interfaces: Vec::new(),
            methods: Vec::new(),
            properties: Vec::new(),
            constructors: Vec::new(),
        }
    }

    /// Start declaring an interface
    ///
    /// ## Arguments
    /// * 'registry'  - The registry the type will be stored in
    /// * 'namespace' - The namespace
    /// * 'name'      - The simple name
    pub fn interface(registry: &Arc<TypeRegistry>, namespace: &str, name: &str) -> Self {
        Self::new(
            registry,
            CilFlavor::Interface,
            namespace,
            name,
            TypeAttributes::interface(),
        )
    }

    /// Start declaring a class
    ///
    /// ## Arguments
    /// * 'registry'  - The registry the type will be stored in
    /// * 'namespace' - The namespace
    /// * 'name'      - The simple name
    pub fn class(registry: &Arc<TypeRegistry>, namespace: &str, name: &str) -> Self {
        Self::new(
            registry,
            CilFlavor::Class,
            namespace,
            name,
            TypeAttributes::PUBLIC,
        )
    }

    /// Set the base class (classes only, defaults to `System.Object`)
    #[must_use]
    pub fn extends(mut self, base: &CilTypeRc) -> Self {
        self.base = Some(base.clone());
        self
    }

    /// Declare an implemented (or, for interfaces, inherited) interface
    #[must_use]
    pub fn implements(mut self, interface: &CilTypeRc) -> Self {
        self.interfaces.push(interface.clone());
        self
    }

    /// Mark the class as sealed
    #[must_use]
    pub fn sealed(mut self) -> Self {
        self.flags |= TypeAttributes::SEALED;
        self
    }

    /// Declare an abstract method.
    ///
    /// # Errors
    /// Returns an error if a method with the same signature was already declared.
    pub fn method(mut self, name: &str, params: &[Param], return_type: &CilTypeRc) -> Result<Self> {
        let method = self.declare(
            name,
            params,
            return_type,
            MethodAttributes::interface_method(),
            MethodBody::None,
        )?;
        self.methods.push(method);
        Ok(self)
    }

    /// Declare a method implemented by `body`.
    ///
    /// # Errors
    /// Returns an error on interfaces, or if a method with the same signature was already
    /// declared.
    pub fn native_method<F>(
        mut self,
        name: &str,
        params: &[Param],
        return_type: &CilTypeRc,
        body: F,
    ) -> Result<Self>
    where
        F: Fn(&Invocation<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        self.ensure_class(name)?;
        let method = self.declare(
            name,
            params,
            return_type,
            MethodAttributes::PUBLIC | MethodAttributes::VIRTUAL | MethodAttributes::HIDE_BY_SIG,
            MethodBody::Native(Arc::new(body)),
        )?;
        self.methods.push(method);
        Ok(self)
    }

    /// Declare an abstract read/write property with `get_<name>` and `set_<name>` accessors.
    ///
    /// # Errors
    /// Returns an error if a property or accessor with the same name was already declared.
    pub fn property(self, name: &str, property_type: &CilTypeRc) -> Result<Self> {
        self.abstract_property(name, property_type, true)
    }

    /// Declare an abstract read-only property with a `get_<name>` accessor.
    ///
    /// # Errors
    /// Returns an error if a property or accessor with the same name was already declared.
    pub fn readonly_property(self, name: &str, property_type: &CilTypeRc) -> Result<Self> {
        self.abstract_property(name, property_type, false)
    }

    /// Declare a property whose accessors are implemented natively.
    ///
    /// # Errors
    /// Returns an error on interfaces, or if a property or accessor with the same name was
    /// already declared.
    pub fn native_property(
        mut self,
        name: &str,
        property_type: &CilTypeRc,
        getter: NativeMethod,
        setter: Option<NativeMethod>,
    ) -> Result<Self> {
        self.ensure_class(name)?;
        let flags = MethodAttributes::PUBLIC
            | MethodAttributes::VIRTUAL
            | MethodAttributes::HIDE_BY_SIG
            | MethodAttributes::SPECIAL_NAME;

        let getter = Some(MethodBody::Native(getter));
        let setter = setter.map(MethodBody::Native);
        self.add_property(name, property_type, flags, getter, setter)?;
        Ok(self)
    }

    /// Declare an instance constructor implemented by `body`.
    ///
    /// # Errors
    /// Returns an error on interfaces, or if a constructor with the same parameter types
    /// was already declared.
    pub fn constructor<F>(mut self, params: &[Param], body: F) -> Result<Self>
    where
        F: Fn(&Invocation<'_>) -> Result<Value> + Send + Sync + 'static,
    {
        self.ensure_class(CTOR_NAME)?;

        let types: Vec<CilTypeRc> = params.iter().map(|p| p.param_type.clone()).collect();
        if self.constructors.iter().any(|c| c.params_match(&types)) {
            return Err(TypeError(format!(
                "Duplicate constructor on '{}.{}'",
                self.namespace, self.name
            )));
        }

        let void = self.registry.get_primitive(CilPrimitiveKind::Void)?;
        let ctor = Arc::new(Method {
            token: self.registry.next_token(TABLE::CTOR),
            name: CTOR_NAME.to_string(),
            flags: MethodAttributes::constructor(),
            params: Param::sequenced(params),
            return_type: void,
            body: MethodBody::Native(Arc::new(body)),
        });
        self.constructors.push(ctor);
        Ok(self)
    }

    /// Finish the declaration and register the type, its members and constructors.
    ///
    /// # Errors
    /// Returns an error if the declaration is inconsistent (non-derivable base, a class in
    /// the interface list) or the full name is already registered.
    pub fn build(self) -> Result<CilTypeRc> {
        let fullname = format!("{}.{}", self.namespace, self.name);

        if let Some(interface) = self.interfaces.iter().find(|i| !i.is_interface()) {
            return Err(TypeError(format!(
                "'{}' cannot implement '{}', it is not an interface",
                fullname,
                interface.fullname()
            )));
        }

        let base = match (self.flavor, self.base) {
            (CilFlavor::Interface, Some(_)) => {
                return Err(TypeError(format!(
                    "Interface '{fullname}' cannot extend a class"
                )));
            }
            (CilFlavor::Interface, None) => None,
            (_, Some(base)) if !base.is_derivable() => {
                return Err(TypeError(format!(
                    "'{}' cannot derive from '{}'",
                    fullname,
                    base.fullname()
                )));
            }
            (_, Some(base)) => Some(base),
            (_, None) => Some(self.registry.get_primitive(CilPrimitiveKind::Object)?),
        };

        let mut flags = self.flags;
        if self.flavor == CilFlavor::Class && self.methods.iter().any(|m| m.is_abstract()) {
            flags |= TypeAttributes::ABSTRACT;
        }

        let new_type = Arc::new(CilType::new(
            self.registry.next_token(TABLE::TYPEDEF),
            self.flavor,
            self.namespace,
            self.name,
            flags,
        ));
        if let Some(base) = base {
            new_type.set_base(&base)?;
        }
        for interface in self.interfaces {
            new_type.interfaces.push(interface);
        }
        for property in self.properties {
            new_type.properties.push(property);
        }
        for method in &self.methods {
            new_type.methods.push(method.clone());
        }
        for ctor in &self.constructors {
            new_type.constructors.push(ctor.clone());
        }

        self.registry.insert(&new_type)?;
        for method in self.methods.iter().chain(self.constructors.iter()) {
            self.registry.register_method(method)?;
        }

        Ok(new_type)
    }

    fn abstract_property(
        mut self,
        name: &str,
        property_type: &CilTypeRc,
        writable: bool,
    ) -> Result<Self> {
        let flags = MethodAttributes::interface_method() | MethodAttributes::SPECIAL_NAME;
        let setter = writable.then_some(MethodBody::None);
        self.add_property(name, property_type, flags, Some(MethodBody::None), setter)?;
        Ok(self)
    }

    fn add_property(
        &mut self,
        name: &str,
        property_type: &CilTypeRc,
        flags: MethodAttributes,
        getter: Option<MethodBody>,
        setter: Option<MethodBody>,
    ) -> Result<()> {
        if self.properties.iter().any(|p| p.name == name) {
            return Err(TypeError(format!(
                "Duplicate property '{}' on '{}.{}'",
                name, self.namespace, self.name
            )));
        }

        let getter = match getter {
            Some(body) => {
                let method =
                    self.declare(&format!("get_{name}"), &[], property_type, flags, body)?;
                self.methods.push(method.clone());
                Some(method)
            }
            None => None,
        };

        let setter = match setter {
            Some(body) => {
                let void = self.registry.get_primitive(CilPrimitiveKind::Void)?;
                let method = self.declare(
                    &format!("set_{name}"),
                    &[Param::new("value", property_type)],
                    &void,
                    flags,
                    body,
                )?;
                self.methods.push(method.clone());
                Some(method)
            }
            None => None,
        };

        self.properties.push(Arc::new(Property {
            token: self.registry.next_token(TABLE::PROPERTY),
            name: name.to_string(),
            property_type: property_type.clone(),
            getter,
            setter,
        }));
        Ok(())
    }

    fn declare(
        &self,
        name: &str,
        params: &[Param],
        return_type: &CilTypeRc,
        flags: MethodAttributes,
        body: MethodBody,
    ) -> Result<MethodRc> {
        if name.is_empty() {
            return Err(TypeError(format!(
                "Empty method name on '{}.{}'",
                self.namespace, self.name
            )));
        }

        let method = Method {
            token: self.registry.next_token(TABLE::METHODDEF),
            name: name.to_string(),
            flags,
            params: Param::sequenced(params),
            return_type: return_type.clone(),
            body,
        };

        if self.methods.iter().any(|m| m.signature_matches(&method)) {
            return Err(TypeError(format!(
                "Duplicate method '{}' on '{}.{}'",
                method.signature(),
                self.namespace,
                self.name
            )));
        }

        Ok(Arc::new(method))
    }

    fn ensure_class(&self, member: &str) -> Result<()> {
        if self.flavor == CilFlavor::Interface {
            return Err(TypeError(format!(
                "Interface '{}.{}' cannot implement '{}'",
                self.namespace, self.name, member
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interface_members_are_abstract() {
        let registry = Arc::new(TypeRegistry::default());
        let int = registry.get_primitive(CilPrimitiveKind::I4).unwrap();
        let string = registry.get_primitive(CilPrimitiveKind::String).unwrap();

        let iface = TypeBuilder::interface(&registry, "Test", "IEntity")
            .method("GetValue", &[], &int)
            .unwrap()
            .property("Name", &string)
            .unwrap()
            .build()
            .unwrap();

        assert!(iface.is_interface());
        assert_eq!(iface.methods.count(), 3);
        assert_eq!(iface.properties.count(), 1);
        assert!(iface.methods.iter().all(|(_, m)| m.is_abstract()));

        let name = &iface.properties[0];
        assert_eq!(name.getter.as_ref().unwrap().name, "get_Name");
        assert_eq!(name.setter.as_ref().unwrap().params[0].sequence, 1);
        assert!(registry
            .method(&name.getter.as_ref().unwrap().token)
            .is_some());
        assert_eq!(
            registry.get_by_fullname("Test.IEntity").unwrap().token,
            iface.token
        );
    }

    #[test]
    fn test_classes_default_to_object_base() {
        let registry = Arc::new(TypeRegistry::default());
        let class = TypeBuilder::class(&registry, "Test", "Plain")
            .constructor(&[], |_| Ok(Value::Null))
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(
            class.base().unwrap().primitive_kind(),
            Some(CilPrimitiveKind::Object)
        );
        assert!(class.find_constructor(&[]).unwrap().is_constructor());
        assert!(!class.flags.contains(TypeAttributes::ABSTRACT));
    }

    #[test]
    fn test_invalid_declarations_are_rejected() {
        let registry = Arc::new(TypeRegistry::default());
        let int = registry.get_primitive(CilPrimitiveKind::I4).unwrap();
        let sealed = TypeBuilder::class(&registry, "Test", "Sealed")
            .sealed()
            .build()
            .unwrap();
        let class = TypeBuilder::class(&registry, "Test", "Other").build().unwrap();

        assert!(TypeBuilder::class(&registry, "Test", "FromSealed")
            .extends(&sealed)
            .build()
            .is_err());
        assert!(TypeBuilder::class(&registry, "Test", "ImplementsClass")
            .implements(&class)
            .build()
            .is_err());
        assert!(TypeBuilder::interface(&registry, "Test", "INative")
            .native_method("Run", &[], &int, |_| Ok(Value::I4(0)))
            .is_err());
        assert!(TypeBuilder::interface(&registry, "Test", "IDup")
            .method("Run", &[], &int)
            .unwrap()
            .method("Run", &[], &int)
            .is_err());
        assert!(TypeBuilder::class(&registry, "Test", "Other").build().is_err());
    }

    #[test]
    fn test_overloads_by_parameter_types() {
        let registry = Arc::new(TypeRegistry::default());
        let int = registry.get_primitive(CilPrimitiveKind::I4).unwrap();
        let long = registry.get_primitive(CilPrimitiveKind::I8).unwrap();

        let iface = TypeBuilder::interface(&registry, "Test", "IOverloads")
            .method("Add", &[Param::new("a", &int)], &int)
            .unwrap()
            .method("Add", &[Param::new("a", &long)], &long)
            .unwrap()
            .build()
            .unwrap();

        assert_eq!(iface.find_methods_by_name("Add").len(), 2);
        assert!(iface.find_method("Add", &[long]).is_some());
    }
}
