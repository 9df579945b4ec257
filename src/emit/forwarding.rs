//! A [`MemberSynthesizer`] that routes every interface member through one dispatch method
//! of the base type.
//!
//! Each synthesized member packs its arguments into an `Object[]`, calls
//! `Object InvokeMethod(String, Object[])` on `this` with its own name, writes elements of
//! the array back through its by-reference parameters and returns the (unboxed) result.
//! Property accessors are forwarded under their accessor names (`get_Name`, `set_Name`).

use log::trace;

use crate::{
    emit::{
        members::{construct_method_scaffold, construct_property_scaffold},
        MemberSynthesizer, MethodScaffold, ProxyTypeBuilder,
    },
    metadata::{
        method::{Method, MethodRc, PropertyRc},
        typesystem::{CilPrimitiveKind, CilTypeRc},
    },
    Result,
};

/// Name of the dispatch method used by [`ForwardingSynthesizer::default`]
pub const DEFAULT_DISPATCH_METHOD: &str = "InvokeMethod";

/// Forwards all members of the proxy to `Object <dispatch>(String, Object[])` on the base
/// type.
///
/// Arguments are boxed into the array in parameter order; the value a by-reference
/// parameter points to is loaded first. After the call, element `i` of the array is
/// unboxed and stored back through by-reference parameter `i`, so the dispatch method
/// writes `out` values by replacing array elements.
pub struct ForwardingSynthesizer {
    dispatch_method: String,
}

impl Default for ForwardingSynthesizer {
    fn default() -> Self {
        Self::new(DEFAULT_DISPATCH_METHOD)
    }
}

impl ForwardingSynthesizer {
    /// Forward to the base method named `dispatch_method`
    pub fn new(dispatch_method: impl Into<String>) -> Self {
        ForwardingSynthesizer {
            dispatch_method: dispatch_method.into(),
        }
    }

    /// Name of the dispatch method
    pub fn dispatch_method(&self) -> &str {
        &self.dispatch_method
    }

    fn resolve_dispatch(
        &self,
        type_builder: &ProxyTypeBuilder,
        base_type: &CilTypeRc,
        member: &str,
    ) -> Result<MethodRc> {
        let registry = type_builder.registry();
        let string = registry.get_primitive(CilPrimitiveKind::String)?;
        let object = registry.get_primitive(CilPrimitiveKind::Object)?;
        let arguments = registry.array_of(&object)?;

        base_type
            .find_method_in_hierarchy(&self.dispatch_method, &[string, arguments])
            .filter(|dispatch| dispatch.return_type.token == object.token)
            .ok_or_else(|| {
                synthesis_error!(
                    type_builder.fullname(),
                    member,
                    "'{}' has no 'Object {}(String, Object[])' to forward to",
                    base_type.fullname(),
                    self.dispatch_method
                )
            })
    }

    /// Array slot and argument index of the parameter at `position`
    fn operand_indices(type_name: &str, member: &str, position: usize) -> Result<(i32, u16)> {
        let index = i32::try_from(position)
            .map_err(|_| synthesis_error!(type_name, member, "Parameter index overflow"))?;
        let arg = u16::try_from(position + 1)
            .map_err(|_| synthesis_error!(type_name, member, "Parameter index overflow"))?;
        Ok((index, arg))
    }

    fn emit_forwarding(
        type_name: &str,
        dispatch: &Method,
        scaffold: &mut MethodScaffold,
    ) -> Result<()> {
        let name = scaffold.name().to_string();
        let params = scaffold.params().to_vec();
        let return_type = scaffold.return_type().clone();
        let returns_void = scaffold.returns_void();

        let il = scaffold.il();
        let registry = il.registry().clone();
        let object = registry.get_primitive(CilPrimitiveKind::Object)?;
        let arguments = il.declare_local(&registry.array_of(&object)?);

        let count = i32::try_from(params.len())
            .map_err(|_| synthesis_error!(type_name, &name, "Too many parameters to forward"))?;
        il.emit_ldc_i4(count)?
            .emit_newarr(&object)?
            .emit_stloc(arguments)?;

        // by-ref parameters: (argument index, array index, element type)
        let mut write_back = Vec::new();
        for (position, param) in params.iter().enumerate() {
            let (index, arg) = Self::operand_indices(type_name, &param.name, position)?;

            il.emit_ldloc(arguments)?.emit_ldc_i4(index)?.emit_ldarg(arg)?;

            let value_type = match param.param_type.element_type() {
                Some(element) if param.is_by_ref() => {
                    il.emit_load_indirect(&element)?;
                    write_back.push((arg, index, element.clone()));
                    element
                }
                _ => param.param_type.clone(),
            };
            if value_type.flavor.is_value_type() {
                il.emit_box(&value_type)?;
            }
            il.emit_stelem_ref()?;
        }

        il.emit_ldarg(0)?
            .emit_ldstr(&name)?
            .emit_ldloc(arguments)?
            .emit_callvirt(dispatch)?;
        if returns_void {
            il.emit_pop()?;
        } else {
            il.emit_unbox_any(&return_type)?;
        }

        for (arg, index, element) in write_back {
            il.emit_ldarg(arg)?
                .emit_ldloc(arguments)?
                .emit_ldc_i4(index)?
                .emit_ldelem_ref()?
                .emit_unbox_any(&element)?
                .emit_store_indirect(&element)?;
        }
        il.emit_ret()?;

        trace!("Forwarded '{}' to '{}'", name, dispatch.signature());
        Ok(())
    }
}

impl MemberSynthesizer for ForwardingSynthesizer {
    fn build_property(
        &self,
        type_builder: &mut ProxyTypeBuilder,
        base_type: &CilTypeRc,
        property: &PropertyRc,
    ) -> Result<()> {
        let dispatch = self.resolve_dispatch(type_builder, base_type, &property.name)?;
        let type_name = type_builder.fullname();
        let mut scaffold = construct_property_scaffold(base_type, property, type_builder)?;
        for accessor in scaffold.getter.iter_mut().chain(scaffold.setter.iter_mut()) {
            Self::emit_forwarding(&type_name, &dispatch, accessor)?;
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
        let dispatch = self.resolve_dispatch(type_builder, base_type, &method.signature())?;
        let type_name = type_builder.fullname();
        let mut scaffold = construct_method_scaffold(base_type, method, type_builder)?;
        Self::emit_forwarding(&type_name, &dispatch, &mut scaffold)?;
        scaffold.finish(type_builder)?;
        Ok(())
    }
}
