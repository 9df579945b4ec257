//! In-progress definition of one synthesized proxy type.
//!
//! A [`ProxyTypeBuilder`] collects the constructor, methods and properties of a proxy while
//! it is being synthesized. Nothing it holds is visible in the [`TypeRegistry`] until
//! [`ProxyTypeBuilder::create_type`] validates the complete definition and registers it in
//! one step; a builder that is dropped or fails validation leaves no trace.
//!
//! Methods are defined in two steps: [`ProxyTypeBuilder::declare_method`] reserves the
//! signature and hands out a [`MethodScaffold`] holding the emitter for its body, and
//! [`ProxyTypeBuilder::define_method`] attaches the finished body.

use std::sync::Arc;

use log::{debug, trace};

use crate::{
    assembly::InstructionEmitter,
    metadata::{
        method::{Method, MethodAttributes, MethodBody, MethodRc, Param, Property, PropertyRc, CTOR_NAME},
        token::{Token, TABLE},
        typesystem::{CilFlavor, CilPrimitiveKind, CilType, CilTypeRc, TypeAttributes, TypeRegistry},
    },
    Result,
};

/// A declared method awaiting its body
pub struct MethodScaffold {
    declaration: Method,
    il: InstructionEmitter,
}

impl MethodScaffold {
    /// Name of the method
    pub fn name(&self) -> &str {
        &self.declaration.name
    }

    /// Token reserved for the method
    pub fn token(&self) -> Token {
        self.declaration.token
    }

    /// Attributes of the method
    pub fn flags(&self) -> MethodAttributes {
        self.declaration.flags
    }

    /// Parameters, excluding `this`. By-reference parameters carry their `T&` type.
    pub fn params(&self) -> &[Param] {
        &self.declaration.params
    }

    /// Resolved parameter types in positional order
    pub fn param_types(&self) -> Vec<CilTypeRc> {
        self.declaration.param_types()
    }

    /// Resolved return type
    pub fn return_type(&self) -> &CilTypeRc {
        &self.declaration.return_type
    }

    /// Returns true if the method has no return value
    pub fn returns_void(&self) -> bool {
        self.declaration.returns_void()
    }

    /// Human readable signature
    pub fn signature(&self) -> String {
        self.declaration.signature()
    }

    /// The emitter for the method body
    pub fn il(&mut self) -> &mut InstructionEmitter {
        &mut self.il
    }

    /// Attach the emitted body to `type_builder`, see [`ProxyTypeBuilder::define_method`]
    ///
    /// # Errors
    /// Returns [`crate::Error::Synthesis`] if the body is not terminated.
    pub fn finish(self, type_builder: &mut ProxyTypeBuilder) -> Result<MethodRc> {
        type_builder.define_method(self)
    }
}

/// Collects the members of a proxy type until it is finalized
pub struct ProxyTypeBuilder {
    registry: Arc<TypeRegistry>,
    token: Token,
    namespace: String,
    name: String,
    base: CilTypeRc,
    interfaces: Vec<CilTypeRc>,
    declared: Vec<Method>,
    methods: Vec<MethodRc>,
    properties: Vec<PropertyRc>,
    constructors: Vec<MethodRc>,
}

impl ProxyTypeBuilder {
    /// Begin a proxy type `{namespace}.{name}` deriving from `base` and implementing
    /// `interfaces`. The type token is reserved immediately.
    pub fn new(
        registry: &Arc<TypeRegistry>,
        namespace: &str,
        name: &str,
        base: &CilTypeRc,
        interfaces: Vec<CilTypeRc>,
    ) -> Self {
        ProxyTypeBuilder {
            registry: registry.clone(),
            token: registry.next_token(TABLE::TYPEDEF),
            namespace: namespace.to_string(),
            name: name.to_string(),
            base: base.clone(),
            interfaces,
            declared: Vec::new(),
            methods: Vec::new(),
            properties: Vec::new(),
            constructors: Vec::new(),
        }
    }

    /// The registry the type will be registered in
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// The reserved token of the type
    pub fn token(&self) -> Token {
        self.token
    }

    /// Full name of the type being built
    pub fn fullname(&self) -> String {
        format!("{}.{}", self.namespace, self.name)
    }

    /// The base type
    pub fn base_type(&self) -> &CilTypeRc {
        &self.base
    }

    /// The registered interfaces
    pub fn interfaces(&self) -> &[CilTypeRc] {
        &self.interfaces
    }

    /// Methods defined so far
    pub fn methods(&self) -> &[MethodRc] {
        &self.methods
    }

    /// Properties defined so far
    pub fn properties(&self) -> &[PropertyRc] {
        &self.properties
    }

    /// Constructors defined so far
    pub fn constructors(&self) -> &[MethodRc] {
        &self.constructors
    }

    /// Reserve a method signature and return the scaffold its body is emitted into.
    ///
    /// # Errors
    /// Returns [`crate::Error::Synthesis`] if the name is empty or a method with the same
    /// signature was already declared.
    pub fn declare_method(
        &mut self,
        name: &str,
        params: &[Param],
        return_type: &CilTypeRc,
        flags: MethodAttributes,
    ) -> Result<MethodScaffold> {
        if name.is_empty() {
            return Err(synthesis_error!(self.fullname(), "<unnamed>", "Method name cannot be empty"));
        }

        let declaration = Method {
            token: self.registry.next_token(TABLE::METHODDEF),
            name: name.to_string(),
            flags,
            params: Param::sequenced(params),
            return_type: return_type.clone(),
            body: MethodBody::None,
        };

        if self
            .declared
            .iter()
            .any(|existing| existing.signature_matches(&declaration))
        {
            return Err(synthesis_error!(
                self.fullname(),
                declaration.signature(),
                "Duplicate definition of the same signature"
            ));
        }

        let arg_count = u16::try_from(params.len() + 1).map_err(|_| {
            synthesis_error!(self.fullname(), declaration.signature(), "Too many parameters")
        })?;
        let il = InstructionEmitter::new(
            self.registry.clone(),
            name,
            arg_count,
            !declaration.returns_void(),
        );

        trace!("Declared '{}' on '{}'", declaration.signature(), self.fullname());
        self.declared.push(Method {
            token: declaration.token,
            name: declaration.name.clone(),
            flags,
            params: declaration.params.clone(),
            return_type: declaration.return_type.clone(),
            body: MethodBody::None,
        });

        Ok(MethodScaffold { declaration, il })
    }

    /// Attach the body emitted into `scaffold` and define the method.
    ///
    /// # Errors
    /// Returns [`crate::Error::Synthesis`] if the scaffold was not declared by this builder,
    /// was already defined, or its body does not terminate.
    pub fn define_method(&mut self, scaffold: MethodScaffold) -> Result<MethodRc> {
        let MethodScaffold { declaration, il } = scaffold;
        let signature = declaration.signature();

        if !self.declared.iter().any(|d| d.token == declaration.token) {
            return Err(synthesis_error!(
                self.fullname(),
                signature,
                "Method was not declared on this type"
            ));
        }
        if self.methods.iter().any(|m| m.token == declaration.token) {
            return Err(synthesis_error!(self.fullname(), signature, "Method is already defined"));
        }

        let body = il
            .finish()
            .map_err(|error| synthesis_error!(self.fullname(), signature, "{}", error))?;

        let method = Arc::new(Method {
            body: MethodBody::Cil(Arc::new(body)),
            ..declaration
        });
        self.methods.push(method.clone());
        Ok(method)
    }

    /// Define an instance constructor with the body emitted into `il`.
    ///
    /// # Errors
    /// Returns [`crate::Error::Synthesis`] if a constructor with the same parameter types
    /// exists or the body does not terminate.
    pub fn define_constructor(&mut self, params: &[Param], il: InstructionEmitter) -> Result<MethodRc> {
        let types: Vec<CilTypeRc> = params.iter().map(|p| p.param_type.clone()).collect();
        if self.constructors.iter().any(|c| c.params_match(&types)) {
            return Err(synthesis_error!(
                self.fullname(),
                CTOR_NAME,
                "Duplicate constructor definition"
            ));
        }

        let body = il
            .finish()
            .map_err(|error| synthesis_error!(self.fullname(), CTOR_NAME, "{}", error))?;

        let ctor = Arc::new(Method {
            token: self.registry.next_token(TABLE::CTOR),
            name: CTOR_NAME.to_string(),
            flags: MethodAttributes::constructor(),
            params: Param::sequenced(params),
            return_type: self.registry.get_primitive(CilPrimitiveKind::Void)?,
            body: MethodBody::Cil(Arc::new(body)),
        });
        self.constructors.push(ctor.clone());
        Ok(ctor)
    }

    /// Define a property over already defined accessors.
    ///
    /// # Errors
    /// Returns [`crate::Error::Synthesis`] if a property with the same name exists or an
    /// accessor is not defined on this builder.
    pub fn define_property(
        &mut self,
        name: &str,
        property_type: &CilTypeRc,
        getter: Option<MethodRc>,
        setter: Option<MethodRc>,
    ) -> Result<PropertyRc> {
        if self.properties.iter().any(|p| p.name == name) {
            return Err(synthesis_error!(self.fullname(), name, "Duplicate property definition"));
        }

        for accessor in getter.iter().chain(setter.iter()) {
            if !self.methods.iter().any(|m| Arc::ptr_eq(m, accessor)) {
                return Err(synthesis_error!(
                    self.fullname(),
                    name,
                    "Accessor '{}' is not defined on this type",
                    accessor.name
                ));
            }
        }

        let property = Arc::new(Property {
            token: self.registry.next_token(TABLE::PROPERTY),
            name: name.to_string(),
            property_type: property_type.clone(),
            getter,
            setter,
        });
        self.properties.push(property.clone());
        Ok(property)
    }

    /// Validate the definition and register the finished type.
    ///
    /// # Errors
    /// Returns [`crate::Error::Synthesis`] naming the offending member if a declared method
    /// was never given a body, the type has no constructor, or an interface member has no
    /// implementation on the proxy or its base chain.
    pub fn create_type(self) -> Result<CilTypeRc> {
        let fullname = self.fullname();

        if let Some(pending) = self
            .declared
            .iter()
            .find(|d| !self.methods.iter().any(|m| m.token == d.token))
        {
            return Err(synthesis_error!(
                fullname,
                pending.signature(),
                "Declared method was never given a body"
            ));
        }

        if self.constructors.is_empty() {
            return Err(synthesis_error!(fullname, CTOR_NAME, "Type has no constructor"));
        }

        for interface in &self.interfaces {
            for (_, required) in interface.methods.iter() {
                let implemented = self.methods.iter().any(|m| m.signature_matches(required))
                    || self.base.find_override(required).is_some();
                if !implemented {
                    return Err(synthesis_error!(
                        fullname,
                        format!("{}::{}", interface.fullname(), required.signature()),
                        "Interface member has no implementation"
                    ));
                }
            }

            for (_, required) in interface.properties.iter() {
                let implemented = self.properties.iter().any(|p| p.name == required.name)
                    || self.base.find_property(&required.name).is_some();
                if !implemented {
                    return Err(synthesis_error!(
                        fullname,
                        format!("{}::{}", interface.fullname(), required.name),
                        "Interface property has no implementation"
                    ));
                }
            }
        }

        let new_type = Arc::new(CilType::new(
            self.token,
            CilFlavor::Class,
            self.namespace,
            self.name,
            TypeAttributes::proxy_class(),
        ));
        new_type.set_base(&self.base)?;
        for interface in self.interfaces {
            new_type.interfaces.push(interface);
        }
        for method in &self.methods {
            new_type.methods.push(method.clone());
        }
        for property in self.properties {
            new_type.properties.push(property);
        }
        for ctor in &self.constructors {
            new_type.constructors.push(ctor.clone());
        }

        self.registry
            .insert(&new_type)
            .map_err(|error| synthesis_error!(fullname, fullname, "{}", error))?;
        for method in self.methods.iter().chain(self.constructors.iter()) {
            self.registry.register_method(method)?;
        }

        debug!(
            "Finalized '{}' ({} methods, {} properties, {} constructors)",
            fullname,
            new_type.methods.count(),
            new_type.properties.count(),
            new_type.constructors.count()
        );
        Ok(new_type)
    }
}
