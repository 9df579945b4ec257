//! Synthesized proxy types and their instances.
//!
//! A [`ProxyType`] is the finished product of one synthesis request: the registered
//! [`CilType`](crate::metadata::typesystem::CilType), the [`ProxySpecification`] it was
//! built from and the identity of the dynamic module it lives in. Instances are created
//! with [`ProxyType::create_instance`] and driven through [`ProxyInstance`], which runs the
//! synthesized bodies on the interpreter.

use std::{fmt, sync::Arc};

use log::trace;

use crate::{
    cache::Disposable,
    metadata::{
        identity::AssemblyIdentity,
        method::{Method, MethodRc},
        typesystem::CilTypeRc,
    },
    runtime::{Interpreter, Object, ObjectRef, Value},
    Error, Result,
};

/// Reference to a `ProxyType`
pub type ProxyTypeRc = Arc<ProxyType>;

/// The inputs a proxy type is synthesized from
#[derive(Clone)]
pub struct ProxySpecification {
    /// Simple name of the proxy type, unique per factory
    pub name: String,
    /// The contract the proxy implements
    pub interface_type: CilTypeRc,
    /// The class the proxy derives from
    pub base_type: CilTypeRc,
    /// Parameter type of the proxy constructor, `None` for a parameterless constructor
    pub ctor_arg_type: Option<CilTypeRc>,
}

impl ProxySpecification {
    /// Validate and record a synthesis request
    ///
    /// # Errors
    /// Returns [`Error::InvalidArgument`] if `name` is empty or whitespace, or if
    /// `base_type` or `interface_type` is missing.
    pub fn new(
        name: &str,
        base_type: Option<&CilTypeRc>,
        interface_type: Option<&CilTypeRc>,
        ctor_arg_type: Option<&CilTypeRc>,
    ) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(argument_error!("proxy_name", "Proxy name cannot be empty"));
        }
        let Some(base_type) = base_type else {
            return Err(argument_error!("base_type", "A base type is required"));
        };
        let Some(interface_type) = interface_type else {
            return Err(argument_error!("interface_type", "An interface type is required"));
        };

        Ok(ProxySpecification {
            name: name.to_string(),
            interface_type: interface_type.clone(),
            base_type: base_type.clone(),
            ctor_arg_type: ctor_arg_type.cloned(),
        })
    }

    /// Parameter types of the proxy constructor
    pub fn ctor_arg_types(&self) -> Vec<CilTypeRc> {
        self.ctor_arg_type.iter().cloned().collect()
    }

    /// Returns true if `other` requests the same name over the same types
    pub fn matches(&self, other: &ProxySpecification) -> bool {
        self.name == other.name
            && self.base_type.token == other.base_type.token
            && self.interface_type.token == other.interface_type.token
            && self.ctor_arg_type.as_ref().map(|t| t.token)
                == other.ctor_arg_type.as_ref().map(|t| t.token)
    }
}

impl fmt::Debug for ProxySpecification {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxySpecification")
            .field("name", &self.name)
            .field("interface_type", &self.interface_type.fullname())
            .field("base_type", &self.base_type.fullname())
            .field("ctor_arg_type", &self.ctor_arg_type.as_ref().map(|t| t.fullname()))
            .finish()
    }
}

/// A synthesized proxy type, ready to be instantiated
pub struct ProxyType {
    specification: ProxySpecification,
    cil_type: CilTypeRc,
    identity: AssemblyIdentity,
    module_name: String,
    interpreter: Arc<Interpreter>,
}

impl ProxyType {
    pub(crate) fn new(
        specification: ProxySpecification,
        cil_type: CilTypeRc,
        identity: AssemblyIdentity,
        module_name: String,
        interpreter: Arc<Interpreter>,
    ) -> Self {
        ProxyType {
            specification,
            cil_type,
            identity,
            module_name,
            interpreter,
        }
    }

    /// Simple name of the proxy
    pub fn name(&self) -> &str {
        &self.specification.name
    }

    /// Full name of the proxy type (`{assembly}.{name}`)
    pub fn fullname(&self) -> String {
        self.cil_type.fullname()
    }

    /// The registered type
    pub fn cil_type(&self) -> &CilTypeRc {
        &self.cil_type
    }

    /// The request this type was synthesized from
    pub fn specification(&self) -> &ProxySpecification {
        &self.specification
    }

    /// Identity of the dynamic assembly the type belongs to
    pub fn identity(&self) -> &AssemblyIdentity {
        &self.identity
    }

    /// Name of the dynamic module the type was defined in
    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    /// The interfaces the type implements
    pub fn interfaces(&self) -> Vec<CilTypeRc> {
        self.cil_type
            .interfaces
            .iter()
            .map(|(_, interface)| interface.clone())
            .collect()
    }

    /// Allocate an instance and run the constructor whose parameters accept `args`
    ///
    /// # Errors
    /// Returns [`Error::MemberNotFound`] if no constructor accepts `args`, or any error the
    /// constructor raises.
    pub fn create_instance(self: &Arc<Self>, args: &[Value]) -> Result<ProxyInstance> {
        let ctor = self
            .cil_type
            .constructors
            .iter()
            .map(|(_, ctor)| ctor)
            .find(|ctor| accepts(ctor, args))
            .cloned()
            .ok_or_else(|| {
                Error::MemberNotFound(format!(
                    "No constructor of '{}' accepts ({})",
                    self.fullname(),
                    describe_args(args)
                ))
            })?;

        let object = Object::new(&self.cil_type);
        self.interpreter.invoke(&object, &ctor, args)?;
        trace!("Instantiated '{}'", self.fullname());

        Ok(ProxyInstance {
            proxy_type: self.clone(),
            object,
        })
    }
}

impl fmt::Debug for ProxyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyType")
            .field("fullname", &self.fullname())
            .field("specification", &self.specification)
            .field("identity", &self.identity.display_name())
            .field("module_name", &self.module_name)
            .finish_non_exhaustive()
    }
}

fn accepts(method: &Method, args: &[Value]) -> bool {
    method.params.len() == args.len()
        && method
            .params
            .iter()
            .zip(args)
            .all(|(param, arg)| arg.clone().coerce(&param.param_type).is_some())
}

fn describe_args(args: &[Value]) -> String {
    args.iter()
        .map(Value::type_name)
        .collect::<Vec<_>>()
        .join(", ")
}

/// A live instance of a proxy type
pub struct ProxyInstance {
    proxy_type: ProxyTypeRc,
    object: ObjectRef,
}

impl ProxyInstance {
    /// The type of this instance
    pub fn proxy_type(&self) -> &ProxyTypeRc {
        &self.proxy_type
    }

    /// The underlying object
    pub fn object(&self) -> &ObjectRef {
        &self.object
    }

    fn interpreter(&self) -> &Interpreter {
        &self.proxy_type.interpreter
    }

    /// Invoke the most derived method called `name` whose parameters accept `args`
    ///
    /// # Errors
    /// Returns [`Error::MemberNotFound`] if no such method exists, or any error the method
    /// raises.
    pub fn invoke(&self, name: &str, args: &[Value]) -> Result<Value> {
        let method = self
            .object
            .object_type()
            .find_methods_by_name(name)
            .into_iter()
            .find(|method| !method.is_abstract() && accepts(method, args))
            .ok_or_else(|| {
                Error::MemberNotFound(format!(
                    "'{}' has no method '{}' accepting ({})",
                    self.proxy_type.fullname(),
                    name,
                    describe_args(args)
                ))
            })?;
        self.interpreter().invoke_virtual(&self.object, &method, args)
    }

    /// Invoke an interface (or base) method through virtual dispatch
    ///
    /// # Errors
    /// Returns [`Error::MemberNotFound`] if the instance does not implement `method`, or
    /// any error the implementation raises.
    pub fn call(&self, method: &Method, args: &[Value]) -> Result<Value> {
        self.interpreter().invoke_virtual(&self.object, method, args)
    }

    fn accessor(&self, name: &str, setter: bool) -> Result<MethodRc> {
        let property = self
            .object
            .object_type()
            .find_property(name)
            .ok_or_else(|| {
                Error::MemberNotFound(format!(
                    "'{}' has no property '{}'",
                    self.proxy_type.fullname(),
                    name
                ))
            })?;

        let accessor = if setter {
            property.setter.clone()
        } else {
            property.getter.clone()
        };
        accessor.ok_or_else(|| {
            Error::MemberNotFound(format!(
                "Property '{}' of '{}' has no {}",
                name,
                self.proxy_type.fullname(),
                if setter { "setter" } else { "getter" }
            ))
        })
    }

    /// Read property `name`
    ///
    /// # Errors
    /// Returns [`Error::MemberNotFound`] if the property does not exist or is write-only.
    pub fn get_property(&self, name: &str) -> Result<Value> {
        let getter = self.accessor(name, false)?;
        self.call(&getter, &[])
    }

    /// Write property `name`
    ///
    /// # Errors
    /// Returns [`Error::MemberNotFound`] if the property does not exist or is read-only.
    pub fn set_property(&self, name: &str, value: impl Into<Value>) -> Result<()> {
        let setter = self.accessor(name, true)?;
        self.call(&setter, &[value.into()])?;
        Ok(())
    }
}

impl fmt::Debug for ProxyInstance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyInstance")
            .field("proxy_type", &self.proxy_type.fullname())
            .finish_non_exhaustive()
    }
}

/// Runs a parameterless `Dispose` method if the type has one, then clears the instance
/// state.
impl Disposable for ProxyInstance {
    fn dispose(self) -> Result<()> {
        let dispose = self
            .object
            .object_type()
            .find_methods_by_name("Dispose")
            .into_iter()
            .find(|method| method.params.is_empty() && !method.is_abstract());

        let result = match dispose {
            Some(method) => self.call(&method, &[]).map(|_| ()),
            None => Ok(()),
        };
        self.object.clear_fields();
        result
    }
}

/// Proxy types live as long as their registry, dropping a cached handle is all there is
impl Disposable for ProxyTypeRc {
    fn dispose(self) -> Result<()> {
        Ok(())
    }
}
