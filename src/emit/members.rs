//! Enumeration of the interface surface and member scaffolding.
//!
//! [`synthesize_members`] walks every property and method of the interfaces a proxy
//! implements and hands each one to a [`MemberSynthesizer`]. What a member body does is
//! entirely up to the synthesizer; the engine only declares the signature (through
//! [`construct_method_scaffold`] / [`construct_property_scaffold`]) and checks at
//! finalization that nothing was left unimplemented.

use std::collections::HashSet;

use log::trace;

use crate::{
    emit::{MethodScaffold, ProxyTypeBuilder},
    metadata::{
        method::{Method, MethodAttributes, MethodRc, Property, PropertyRc},
        token::Token,
        typesystem::CilTypeRc,
    },
    Result,
};

/// Strategy deciding the body of every synthesized member
///
/// Implementations typically call [`construct_method_scaffold`] (or
/// [`construct_property_scaffold`]), emit a body through the scaffold's emitter and
/// finish the scaffold on `type_builder`.
pub trait MemberSynthesizer: Send + Sync {
    /// Implement `property` of an interface on the proxy
    ///
    /// # Errors
    /// Any error aborts the synthesis of the proxy.
    fn build_property(
        &self,
        type_builder: &mut ProxyTypeBuilder,
        base_type: &CilTypeRc,
        property: &PropertyRc,
    ) -> Result<()>;

    /// Implement `method` of an interface on the proxy
    ///
    /// # Errors
    /// Any error aborts the synthesis of the proxy.
    fn build_method(
        &self,
        type_builder: &mut ProxyTypeBuilder,
        base_type: &CilTypeRc,
        method: &MethodRc,
    ) -> Result<()>;
}

/// Call the synthesizer for every member of `interfaces`: first each property, then each
/// method, in declaration order. Property accessors belong to their property and are not
/// passed to `build_method`. Members are not deduplicated across interfaces.
///
/// # Errors
/// Returns the first error a hook returns.
pub fn synthesize_members(
    synthesizer: &dyn MemberSynthesizer,
    type_builder: &mut ProxyTypeBuilder,
    base_type: &CilTypeRc,
    interfaces: &[CilTypeRc],
) -> Result<()> {
    for interface in interfaces {
        for (_, property) in interface.properties.iter() {
            trace!("build_property {}::{}", interface.fullname(), describe(property));
            synthesizer.build_property(type_builder, base_type, property)?;
        }
    }

    for interface in interfaces {
        let accessors: HashSet<Token> = interface
            .properties
            .iter()
            .flat_map(|(_, property)| property.accessors().map(|m| m.token).collect::<Vec<_>>())
            .collect();

        for (_, method) in interface.methods.iter() {
            if accessors.contains(&method.token) {
                continue;
            }
            trace!("build_method {}::{}", interface.fullname(), method.signature());
            synthesizer.build_method(type_builder, base_type, method)?;
        }
    }

    Ok(())
}

/// Declare a public virtual method with the signature of `method` on the proxy and return
/// the scaffold its body is emitted into. By-reference parameters keep their `T&` type.
///
/// The caller must emit a terminated body and finish the scaffold; no default body is
/// supplied.
///
/// # Errors
/// Returns [`crate::Error::Synthesis`] if the signature is already declared on the proxy.
pub fn construct_method_scaffold(
    base_type: &CilTypeRc,
    method: &Method,
    type_builder: &mut ProxyTypeBuilder,
) -> Result<MethodScaffold> {
    scaffold(
        base_type,
        method,
        type_builder,
        MethodAttributes::PUBLIC | MethodAttributes::VIRTUAL,
    )
}

fn scaffold(
    base_type: &CilTypeRc,
    method: &Method,
    type_builder: &mut ProxyTypeBuilder,
    flags: MethodAttributes,
) -> Result<MethodScaffold> {
    if let Some(hidden) = base_type.find_method_in_hierarchy(&method.name, &method.param_types()) {
        trace!(
            "'{}' overrides '{}' of '{}'",
            method.signature(),
            hidden.signature(),
            base_type.fullname()
        );
    }

    type_builder.declare_method(&method.name, &method.params, &method.return_type, flags)
}

/// Scaffolds of the accessors of one property
pub struct PropertyScaffold {
    property: PropertyRc,
    /// Scaffold of `get_<name>`, if the property is readable
    pub getter: Option<MethodScaffold>,
    /// Scaffold of `set_<name>`, if the property is writable
    pub setter: Option<MethodScaffold>,
}

impl PropertyScaffold {
    /// The interface property being implemented
    pub fn property(&self) -> &PropertyRc {
        &self.property
    }

    /// Define the accessors and the property on `type_builder`
    ///
    /// # Errors
    /// Returns [`crate::Error::Synthesis`] if an accessor body is not terminated or the
    /// property is already defined.
    pub fn finish(self, type_builder: &mut ProxyTypeBuilder) -> Result<PropertyRc> {
        let getter = self
            .getter
            .map(|scaffold| type_builder.define_method(scaffold))
            .transpose()?;
        let setter = self
            .setter
            .map(|scaffold| type_builder.define_method(scaffold))
            .transpose()?;

        type_builder.define_property(
            &self.property.name,
            &self.property.property_type,
            getter,
            setter,
        )
    }
}

/// Declare the accessors of `property` on the proxy as public virtual special-name methods
/// and return their scaffolds.
///
/// # Errors
/// Returns [`crate::Error::Synthesis`] if an accessor signature is already declared.
pub fn construct_property_scaffold(
    base_type: &CilTypeRc,
    property: &PropertyRc,
    type_builder: &mut ProxyTypeBuilder,
) -> Result<PropertyScaffold> {
    let flags =
        MethodAttributes::PUBLIC | MethodAttributes::VIRTUAL | MethodAttributes::SPECIAL_NAME;
    let declare = |accessor: &Option<MethodRc>, type_builder: &mut ProxyTypeBuilder| {
        accessor
            .as_ref()
            .map(|method| scaffold(base_type, method, type_builder, flags))
            .transpose()
    };

    let getter = declare(&property.getter, type_builder)?;
    let setter = declare(&property.setter, type_builder)?;
    Ok(PropertyScaffold {
        property: property.clone(),
        getter,
        setter,
    })
}

/// Short description of a property for diagnostics
fn describe(property: &Property) -> String {
    let mut accessors = Vec::new();
    if property.getter.is_some() {
        accessors.push("get;");
    }
    if property.setter.is_some() {
        accessors.push("set;");
    }
    format!(
        "{} {} {{ {} }}",
        property.property_type.name,
        property.name,
        accessors.join(" ")
    )
}

#[cfg(test)]
mod tests {
    use std::sync::{Arc, Mutex};

    use super::*;
    use crate::{
        metadata::typesystem::{CilPrimitiveKind, TypeBuilder, TypeRegistry},
        metadata::method::Param,
        runtime::Value,
    };

    #[derive(Default)]
    struct Recorder {
        calls: Mutex<Vec<String>>,
    }

    impl MemberSynthesizer for Recorder {
        fn build_property(
            &self,
            type_builder: &mut ProxyTypeBuilder,
            base_type: &CilTypeRc,
            property: &PropertyRc,
        ) -> Result<()> {
            lock!(self.calls).push(format!("property {}", property.name));
            let mut scaffold = construct_property_scaffold(base_type, property, type_builder)?;
            if let Some(getter) = scaffold.getter.as_mut() {
                getter.il().emit_throw_not_implemented(&property.name)?;
            }
            if let Some(setter) = scaffold.setter.as_mut() {
                setter.il().emit_ret()?;
            }
            scaffold.finish(type_builder)?;
            Ok(())
        }

        fn build_method(
            &self,
            type_builder: &mut ProxyTypeBuilder,
            base_type: &CilTypeRc,
            method: &MethodRc,
        ) -> Result<()> {
            lock!(self.calls).push(format!("method {}", method.name));
            let mut scaffold = construct_method_scaffold(base_type, method, type_builder)?;
            scaffold.il().emit_throw_not_implemented(&method.name)?;
            scaffold.finish(type_builder)?;
            Ok(())
        }
    }

    #[test]
    fn test_properties_first_and_accessors_skipped() {
        let registry = Arc::new(TypeRegistry::default());
        let int = registry.get_primitive(CilPrimitiveKind::I4).unwrap();
        let string = registry.get_primitive(CilPrimitiveKind::String).unwrap();
        let base = TypeBuilder::class(&registry, "Test", "Base")
            .constructor(&[], |_| Ok(Value::Null))
            .unwrap()
            .build()
            .unwrap();
        let iface = TypeBuilder::interface(&registry, "Test", "IEntity")
            .method("GetValue", &[], &int)
            .unwrap()
            .property("Name", &string)
            .unwrap()
            // looks like an accessor but is a plain method
            .method("get_Other", &[], &int)
            .unwrap()
            .build()
            .unwrap();

        let recorder = Recorder::default();
        let interfaces = vec![iface];
        let mut builder =
            ProxyTypeBuilder::new(&registry, "Proxies", "Recorded", &base, interfaces.clone());
        synthesize_members(&recorder, &mut builder, &base, &interfaces).unwrap();

        assert_eq!(
            *lock!(recorder.calls),
            vec!["property Name", "method GetValue", "method get_Other"]
        );
        assert_eq!(builder.methods().len(), 4);
        assert_eq!(builder.properties().len(), 1);
    }

    #[test]
    fn test_scaffold_keeps_by_ref_types() {
        let registry = Arc::new(TypeRegistry::default());
        let boolean = registry.get_primitive(CilPrimitiveKind::Boolean).unwrap();
        let int = registry.get_primitive(CilPrimitiveKind::I4).unwrap();
        let int_ref = registry.by_ref(&int).unwrap();
        let base = TypeBuilder::class(&registry, "Test", "Base").build().unwrap();
        let iface = TypeBuilder::interface(&registry, "Test", "ILookup")
            .method("TryGet", &[Param::out("value", &int_ref)], &boolean)
            .unwrap()
            .build()
            .unwrap();

        let method = iface.find_method("TryGet", &[int_ref.clone()]).unwrap();
        let mut builder = ProxyTypeBuilder::new(&registry, "Proxies", "Lookup", &base, vec![]);
        let scaffold = construct_method_scaffold(&base, &method, &mut builder).unwrap();

        assert_eq!(scaffold.param_types()[0].token, int_ref.token);
        assert!(scaffold.params()[0].is_by_ref());
        assert_eq!(scaffold.return_type().token, boolean.token);
        assert!(scaffold.flags().contains(MethodAttributes::VIRTUAL));
        assert!(!scaffold.flags().contains(MethodAttributes::ABSTRACT));
    }

    #[test]
    fn test_describe_property() {
        let registry = Arc::new(TypeRegistry::default());
        let string = registry.get_primitive(CilPrimitiveKind::String).unwrap();
        let iface = TypeBuilder::interface(&registry, "Test", "INamed")
            .readonly_property("Name", &string)
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(describe(&iface.properties[0]), "String Name { get; }");
    }
}
