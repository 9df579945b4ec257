//! Constructor chaining from a proxy to its base type.

use log::debug;

use crate::{
    assembly::InstructionEmitter,
    emit::ProxyTypeBuilder,
    metadata::{
        method::{MethodRc, Param, CTOR_NAME},
        typesystem::CilTypeRc,
    },
    Result,
};

/// Define the proxy constructor taking `ctor_arg_types`.
///
/// The body loads `this` and every argument in order, calls the base constructor with
/// exactly these parameter types and returns. When the base type has no such constructor
/// the body only returns.
///
/// # Errors
/// Returns [`crate::Error::Synthesis`] if the type already has a constructor with these
/// parameter types, or [`crate::Error::InvalidProgram`] if the base constructor is not
/// registered.
pub fn synthesize_constructor(
    type_builder: &mut ProxyTypeBuilder,
    base_type: &CilTypeRc,
    ctor_arg_types: &[CilTypeRc],
) -> Result<MethodRc> {
    let params: Vec<Param> = ctor_arg_types
        .iter()
        .enumerate()
        .map(|(i, ty)| Param::new(format!("arg{}", i + 1), ty))
        .collect();

    let arg_count = u16::try_from(params.len() + 1).map_err(|_| {
        argument_error!("ctor_arg_types", "Too many constructor arguments ({})", params.len())
    })?;
    let mut il = InstructionEmitter::new(type_builder.registry().clone(), CTOR_NAME, arg_count, false);

    match base_type.find_constructor(ctor_arg_types) {
        Some(base_ctor) => {
            for index in 0..arg_count {
                il.emit_ldarg(index)?;
            }
            il.emit_call(&base_ctor)?;
        }
        None => {
            debug!(
                "'{}' has no constructor taking ({}), '{}' gets an empty constructor",
                base_type.fullname(),
                ctor_arg_types
                    .iter()
                    .map(|ty| ty.name.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
                type_builder.fullname()
            );
        }
    }
    il.emit_ret()?;

    type_builder.define_constructor(&params, il)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::{
        assembly::opcodes::{CALL, LDARG_0, LDARG_1, LDARG_S, RET},
        metadata::{
            method::MethodBody,
            typesystem::{CilPrimitiveKind, TypeBuilder, TypeRegistry},
        },
        runtime::Value,
    };

    fn opcodes(ctor: &MethodRc) -> Vec<u8> {
        match &ctor.body {
            MethodBody::Cil(body) => body.instructions.iter().map(|i| i.opcode).collect(),
            other => panic!("unexpected body {other:?}"),
        }
    }

    #[test]
    fn test_chains_to_matching_base_constructor() {
        let registry = Arc::new(TypeRegistry::default());
        let string = registry.get_primitive(CilPrimitiveKind::String).unwrap();
        let base = TypeBuilder::class(&registry, "Test", "Base")
            .constructor(&[Param::new("name", &string)], |_| Ok(Value::Null))
            .unwrap()
            .build()
            .unwrap();

        let mut builder = ProxyTypeBuilder::new(&registry, "Proxies", "Chained", &base, vec![]);
        let ctor = synthesize_constructor(&mut builder, &base, &[string.clone()]).unwrap();

        assert!(ctor.is_constructor());
        assert!(ctor.params_match(&[string]));
        assert_eq!(opcodes(&ctor), vec![LDARG_0, LDARG_1, CALL, RET]);
    }

    #[test]
    fn test_falls_back_to_empty_body() {
        let registry = Arc::new(TypeRegistry::default());
        let int = registry.get_primitive(CilPrimitiveKind::I4).unwrap();
        let base = TypeBuilder::class(&registry, "Test", "Base").build().unwrap();

        let mut builder = ProxyTypeBuilder::new(&registry, "Proxies", "Fallback", &base, vec![]);
        let ctor = synthesize_constructor(&mut builder, &base, &[int]).unwrap();
        assert_eq!(opcodes(&ctor), vec![RET]);
        assert_eq!(ctor.params.len(), 1);
    }

    #[test]
    fn test_many_arguments_use_short_form() {
        let registry = Arc::new(TypeRegistry::default());
        let int = registry.get_primitive(CilPrimitiveKind::I4).unwrap();
        let params: Vec<Param> = (0..5).map(|i| Param::new(format!("p{i}"), &int)).collect();
        let base = TypeBuilder::class(&registry, "Test", "Wide")
            .constructor(&params, |_| Ok(Value::Null))
            .unwrap()
            .build()
            .unwrap();

        let types = vec![int; 5];
        let mut builder = ProxyTypeBuilder::new(&registry, "Proxies", "Wide", &base, vec![]);
        let ctor = synthesize_constructor(&mut builder, &base, &types).unwrap();

        let ops = opcodes(&ctor);
        assert_eq!(ops.len(), 8);
        assert_eq!(ops[4], LDARG_S);
        assert_eq!(ops[5], LDARG_S);
        assert_eq!(ops[6], CALL);
    }
}
