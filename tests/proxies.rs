//! Integration tests for proxy synthesis through the factory.
//!
//! The fixtures model a small data-access layer: an `Interceptor` base class whose
//! `InvokeMethod` receives every forwarded call, and a handful of entity contracts the
//! proxies implement.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc, Mutex,
    },
};

use dotproxy::{prelude::*, Result};

struct Shop {
    registry: Arc<TypeRegistry>,
    interceptor: CilTypeRc,
    entity: CilTypeRc,
    lookup: CilTypeRc,
    calls: Arc<Mutex<Vec<String>>>,
}

fn primitive(registry: &TypeRegistry, kind: CilPrimitiveKind) -> CilTypeRc {
    registry.get_primitive(kind).unwrap()
}

/// Interceptor semantics:
/// - `GetValue` returns 42
/// - `get_Name` / `set_Name` read and write the instance field `name`
/// - `TryGet` writes 7 into its out argument and returns true
fn shop() -> Result<Shop> {
    let registry = Arc::new(TypeRegistry::default());
    let int = primitive(&registry, CilPrimitiveKind::I4);
    let int_ref = registry.by_ref(&int)?;
    let boolean = primitive(&registry, CilPrimitiveKind::Boolean);
    let string = primitive(&registry, CilPrimitiveKind::String);
    let object = primitive(&registry, CilPrimitiveKind::Object);
    let objects = registry.array_of(&object)?;
    let calls = Arc::new(Mutex::new(Vec::new()));

    let log = calls.clone();
    let interceptor = TypeBuilder::class(&registry, "Shop.Data", "Interceptor")
        .constructor(&[], |_| Ok(Value::Null))?
        .constructor(&[Param::new("name", &string)], |call| {
            call.this.set_field("name", call.arg(0)?.clone());
            Ok(Value::Null)
        })?
        .native_method(
            "InvokeMethod",
            &[Param::new("name", &string), Param::new("args", &objects)],
            &object,
            move |call| {
                let member = call.arg(0)?.as_str()?.to_string();
                let args = call.arg(1)?.as_array()?.clone();
                log.lock().unwrap().push(member.clone());

                match member.as_str() {
                    "GetValue" => Ok(Value::I4(42)),
                    "get_Name" => Ok(call.this.field("name")),
                    "set_Name" => {
                        call.this.set_field("name", args.get(0)?);
                        Ok(Value::Null)
                    }
                    "TryGet" => {
                        args.set(0, Value::I4(7))?;
                        Ok(Value::Boolean(true))
                    }
                    other => Err(Error::Error(format!("unexpected member {other}"))),
                }
            },
        )?
        .build()?;

    let entity = TypeBuilder::interface(&registry, "Shop.Data", "IEntity")
        .method("GetValue", &[], &int)?
        .property("Name", &string)?
        .build()?;
    let lookup = TypeBuilder::interface(&registry, "Shop.Data", "ILookup")
        .method("TryGet", &[Param::out("value", &int_ref)], &boolean)?
        .build()?;

    Ok(Shop {
        registry,
        interceptor,
        entity,
        lookup,
        calls,
    })
}

/// Forwards like [`ForwardingSynthesizer`] and counts every hook invocation
#[derive(Default)]
struct Counting {
    inner: ForwardingSynthesizer,
    properties: Arc<AtomicUsize>,
    methods: Arc<AtomicUsize>,
}

impl MemberSynthesizer for Counting {
    fn build_property(
        &self,
        type_builder: &mut ProxyTypeBuilder,
        base_type: &CilTypeRc,
        property: &PropertyRc,
    ) -> Result<()> {
        self.properties.fetch_add(1, Ordering::SeqCst);
        self.inner.build_property(type_builder, base_type, property)
    }

    fn build_method(
        &self,
        type_builder: &mut ProxyTypeBuilder,
        base_type: &CilTypeRc,
        method: &MethodRc,
    ) -> Result<()> {
        self.methods.fetch_add(1, Ordering::SeqCst);
        self.inner.build_method(type_builder, base_type, method)
    }
}

#[test]
fn test_forwarded_method_and_property() -> Result<()> {
    let shop = shop()?;
    let factory = ProxyFactory::new(shop.registry.clone(), ForwardingSynthesizer::default());

    let proxy = factory.create_proxy("Entity", Some(&shop.interceptor), Some(&shop.entity), None)?;
    let instance = proxy.create_instance(&[])?;

    assert_eq!(instance.invoke("GetValue", &[])?, Value::I4(42));

    instance.set_property("Name", "Ada")?;
    assert_eq!(instance.get_property("Name")?.as_str()?, "Ada");

    // dispatch through the interface declaration selects the proxy implementation
    let get_value = shop.entity.find_method("GetValue", &[]).unwrap();
    assert_eq!(instance.call(&get_value, &[])?, Value::I4(42));

    assert_eq!(
        *shop.calls.lock().unwrap(),
        vec!["GetValue", "set_Name", "get_Name", "GetValue"]
    );
    Ok(())
}

#[test]
fn test_proxy_type_shape() -> Result<()> {
    let shop = shop()?;
    let factory = ProxyFactory::new(shop.registry.clone(), ForwardingSynthesizer::default());
    let proxy = factory.create_proxy("Entity", Some(&shop.interceptor), Some(&shop.entity), None)?;

    assert_eq!(proxy.fullname(), "DotProxy.ProxyAssembly.Entity");
    assert_eq!(proxy.module_name(), "DotProxyTypeGenerator");
    assert_eq!(proxy.identity().name, "DotProxy.ProxyAssembly");

    let cil_type = proxy.cil_type();
    assert!(cil_type.is_sealed());
    assert!(cil_type.is_assignable_to(&shop.entity));
    assert!(cil_type.is_assignable_to(&shop.interceptor));
    assert_eq!(cil_type.base().unwrap().token, shop.interceptor.token);
    assert_eq!(cil_type.properties.count(), 1);
    // GetValue, get_Name, set_Name
    assert_eq!(cil_type.methods.count(), 3);
    assert!(shop.registry.get_by_fullname("DotProxy.ProxyAssembly.Entity").is_some());
    Ok(())
}

#[test]
fn test_by_ref_argument_round_trip() -> Result<()> {
    let shop = shop()?;
    let factory = ProxyFactory::new(shop.registry.clone(), ForwardingSynthesizer::default());
    let proxy = factory.create_proxy("Lookup", Some(&shop.interceptor), Some(&shop.lookup), None)?;
    let instance = proxy.create_instance(&[])?;

    let slot = ValueSlot::new(0);
    let found = instance.invoke("TryGet", &[Value::ByRef(slot.clone())])?;

    assert_eq!(found, Value::Boolean(true));
    assert_eq!(slot.get(), Value::I4(7));
    Ok(())
}

/// `(kind, value in the caller's slot, value the interceptor writes back)`
fn swap_cases() -> Vec<(CilPrimitiveKind, Value, Value)> {
    vec![
        (CilPrimitiveKind::Boolean, Value::Boolean(false), Value::Boolean(true)),
        (CilPrimitiveKind::U1, Value::U1(1), Value::U1(200)),
        (CilPrimitiveKind::I1, Value::I1(-1), Value::I1(-100)),
        (CilPrimitiveKind::I2, Value::I2(-300), Value::I2(1234)),
        (CilPrimitiveKind::U2, Value::U2(60_000), Value::U2(7)),
        (CilPrimitiveKind::I4, Value::I4(-5), Value::I4(99)),
        (CilPrimitiveKind::U4, Value::U4(4_000_000_000), Value::U4(1)),
        (CilPrimitiveKind::I8, Value::I8(-9_000_000_000), Value::I8(42)),
        (CilPrimitiveKind::U8, Value::U8(u64::MAX), Value::U8(3)),
        (CilPrimitiveKind::Char, Value::Char(u16::from(b'a')), Value::Char(0x263A)),
        (CilPrimitiveKind::R8, Value::R8(1.5), Value::R8(-2.25)),
        (CilPrimitiveKind::R4, Value::R4(0.5), Value::R4(3.75)),
    ]
}

#[test]
fn test_by_ref_round_trip_for_every_primitive() -> Result<()> {
    let registry = Arc::new(TypeRegistry::default());
    let void = primitive(&registry, CilPrimitiveKind::Void);
    let string = primitive(&registry, CilPrimitiveKind::String);
    let object = primitive(&registry, CilPrimitiveKind::Object);
    let objects = registry.array_of(&object)?;

    let replacements: HashMap<String, Value> = swap_cases()
        .into_iter()
        .map(|(kind, _, replacement)| (format!("Swap{}", kind.name()), replacement))
        .collect();
    let received = Arc::new(Mutex::new(HashMap::new()));

    let seen = received.clone();
    let interceptor = TypeBuilder::class(&registry, "Shop.Data", "SwapInterceptor")
        .constructor(&[], |_| Ok(Value::Null))?
        .native_method(
            "InvokeMethod",
            &[Param::new("name", &string), Param::new("args", &objects)],
            &object,
            move |call| {
                let member = call.arg(0)?.as_str()?.to_string();
                let args = call.arg(1)?.as_array()?.clone();
                seen.lock().unwrap().insert(member.clone(), args.get(0)?);

                let replacement = replacements
                    .get(&member)
                    .cloned()
                    .ok_or_else(|| Error::Error(format!("unexpected member {member}")))?;
                args.set(0, replacement)?;
                Ok(Value::Null)
            },
        )?
        .build()?;

    let mut contract = TypeBuilder::interface(&registry, "Shop.Data", "ISwap");
    for (kind, _, _) in swap_cases() {
        let slot_type = registry.by_ref(&primitive(&registry, kind))?;
        contract = contract.method(
            &format!("Swap{}", kind.name()),
            &[Param::new("value", &slot_type)],
            &void,
        )?;
    }
    let contract = contract.build()?;

    let factory = ProxyFactory::new(registry.clone(), ForwardingSynthesizer::default());
    let proxy = factory.create_proxy("Swap", Some(&interceptor), Some(&contract), None)?;
    let instance = proxy.create_instance(&[])?;

    for (kind, initial, replacement) in swap_cases() {
        let name = format!("Swap{}", kind.name());
        let slot = ValueSlot::new(initial.clone());

        assert_eq!(instance.invoke(&name, &[Value::ByRef(slot.clone())])?, Value::Null);
        assert_eq!(received.lock().unwrap().get(&name), Some(&initial), "{name} read");
        assert_eq!(slot.get(), replacement, "{name} write back");
    }
    assert_eq!(received.lock().unwrap().len(), 12);
    Ok(())
}

#[test]
fn test_constructor_argument_reaches_base() -> Result<()> {
    let shop = shop()?;
    let string = primitive(&shop.registry, CilPrimitiveKind::String);
    let factory = ProxyFactory::new(shop.registry.clone(), ForwardingSynthesizer::default());

    let proxy = factory.create_proxy(
        "NamedEntity",
        Some(&shop.interceptor),
        Some(&shop.entity),
        Some(&string),
    )?;
    let instance = proxy.create_instance(&["Grace".into()])?;
    assert_eq!(instance.get_property("Name")?.as_str()?, "Grace");

    assert!(matches!(
        proxy.create_instance(&[]),
        Err(Error::MemberNotFound(_))
    ));
    Ok(())
}

#[test]
fn test_cached_by_name() -> Result<()> {
    let shop = shop()?;
    let counting = Counting::default();
    let (properties, methods) = (counting.properties.clone(), counting.methods.clone());
    let factory = ProxyFactory::new(shop.registry.clone(), counting);

    let first = factory.create_proxy("Entity", Some(&shop.interceptor), Some(&shop.entity), None)?;
    let second =
        factory.create_proxy(" Entity ", Some(&shop.interceptor), Some(&shop.entity), None)?;

    assert!(Arc::ptr_eq(&first, &second));
    assert_eq!(properties.load(Ordering::SeqCst), 1);
    assert_eq!(methods.load(Ordering::SeqCst), 1);
    assert_eq!(factory.proxy_count(), 1);
    assert!(Arc::ptr_eq(&factory.lookup("Entity")?.unwrap(), &first));
    assert!(factory.lookup("Unknown")?.is_none());
    Ok(())
}

#[test]
fn test_same_name_different_types_rejected() -> Result<()> {
    let shop = shop()?;
    let factory = ProxyFactory::new(shop.registry.clone(), ForwardingSynthesizer::default());
    factory.create_proxy("Entity", Some(&shop.interceptor), Some(&shop.entity), None)?;

    match factory.create_proxy("Entity", Some(&shop.interceptor), Some(&shop.lookup), None) {
        Err(Error::InvalidArgument { name, .. }) => assert_eq!(name, "proxy_name"),
        other => panic!("unexpected {other:?}"),
    }
    Ok(())
}

#[test]
fn test_concurrent_requests_synthesize_once() -> Result<()> {
    let shop = shop()?;
    let counting = Counting::default();
    let methods = counting.methods.clone();
    let factory = ProxyFactory::new(shop.registry.clone(), counting);

    let proxies: Vec<ProxyTypeRc> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..8)
            .map(|_| {
                scope.spawn(|| {
                    factory.create_proxy(
                        "Shared",
                        Some(&shop.interceptor),
                        Some(&shop.entity),
                        None,
                    )
                })
            })
            .collect();
        handles
            .into_iter()
            .map(|handle| handle.join().unwrap())
            .collect::<Result<Vec<_>>>()
    })?;

    assert!(proxies.iter().all(|p| Arc::ptr_eq(p, &proxies[0])));
    assert_eq!(methods.load(Ordering::SeqCst), 1);
    assert_eq!(factory.proxy_count(), 1);
    Ok(())
}

#[test]
fn test_invalid_requests() -> Result<()> {
    let shop = shop()?;
    let factory = ProxyFactory::new(shop.registry.clone(), ForwardingSynthesizer::default());
    let int = primitive(&shop.registry, CilPrimitiveKind::I4);

    let name_of = |result: Result<ProxyTypeRc>| match result {
        Err(Error::InvalidArgument { name, .. }) => name,
        other => panic!("unexpected {other:?}"),
    };

    assert_eq!(
        name_of(factory.create_proxy("", Some(&shop.interceptor), Some(&shop.entity), None)),
        "proxy_name"
    );
    assert_eq!(
        name_of(factory.create_proxy("P", None, Some(&shop.entity), None)),
        "base_type"
    );
    assert_eq!(
        name_of(factory.create_proxy("P", Some(&shop.interceptor), None, None)),
        "interface_type"
    );
    assert_eq!(
        name_of(factory.create_proxy("P", Some(&int), Some(&shop.entity), None)),
        "base_type"
    );
    assert_eq!(factory.proxy_count(), 0);
    Ok(())
}

/// Fails the first `build_method` call, forwards afterwards
#[derive(Default)]
struct FailOnce {
    inner: ForwardingSynthesizer,
    failed: AtomicBool,
}

impl MemberSynthesizer for FailOnce {
    fn build_property(
        &self,
        type_builder: &mut ProxyTypeBuilder,
        base_type: &CilTypeRc,
        property: &PropertyRc,
    ) -> Result<()> {
        self.inner.build_property(type_builder, base_type, property)
    }

    fn build_method(
        &self,
        type_builder: &mut ProxyTypeBuilder,
        base_type: &CilTypeRc,
        method: &MethodRc,
    ) -> Result<()> {
        if !self.failed.swap(true, Ordering::SeqCst) {
            return Err(Error::Error("backend unavailable".to_string()));
        }
        self.inner.build_method(type_builder, base_type, method)
    }
}

#[test]
fn test_failed_synthesis_leaves_no_entry() -> Result<()> {
    let shop = shop()?;
    let factory = ProxyFactory::new(shop.registry.clone(), FailOnce::default());
    let types_before = shop.registry.len();

    let result = factory.create_proxy("Entity", Some(&shop.interceptor), Some(&shop.entity), None);
    assert!(matches!(result, Err(Error::Error(_))));
    assert!(factory.lookup("Entity")?.is_none());
    assert_eq!(shop.registry.len(), types_before);

    let proxy = factory.create_proxy("Entity", Some(&shop.interceptor), Some(&shop.entity), None)?;
    assert_eq!(proxy.create_instance(&[])?.invoke("GetValue", &[])?, Value::I4(42));
    Ok(())
}

/// Implements properties but leaves methods out
struct PropertiesOnly;

impl MemberSynthesizer for PropertiesOnly {
    fn build_property(
        &self,
        type_builder: &mut ProxyTypeBuilder,
        base_type: &CilTypeRc,
        property: &PropertyRc,
    ) -> Result<()> {
        ForwardingSynthesizer::default().build_property(type_builder, base_type, property)
    }

    fn build_method(
        &self,
        _type_builder: &mut ProxyTypeBuilder,
        _base_type: &CilTypeRc,
        _method: &MethodRc,
    ) -> Result<()> {
        Ok(())
    }
}

#[test]
fn test_unimplemented_member_named() -> Result<()> {
    let shop = shop()?;
    let factory = ProxyFactory::new(shop.registry.clone(), PropertiesOnly);

    match factory.create_proxy("Entity", Some(&shop.interceptor), Some(&shop.entity), None) {
        Err(Error::Synthesis {
            type_name, member, ..
        }) => {
            assert_eq!(type_name, "DotProxy.ProxyAssembly.Entity");
            assert_eq!(member, "Shop.Data.IEntity::Int32 GetValue()");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(factory.lookup("Entity")?.is_none());
    Ok(())
}

/// Every member throws a not-implemented exception
struct NotImplemented;

impl MemberSynthesizer for NotImplemented {
    fn build_property(
        &self,
        type_builder: &mut ProxyTypeBuilder,
        base_type: &CilTypeRc,
        property: &PropertyRc,
    ) -> Result<()> {
        let mut scaffold = construct_property_scaffold(base_type, property, type_builder)?;
        for accessor in scaffold.getter.iter_mut().chain(scaffold.setter.iter_mut()) {
            let name = accessor.name().to_string();
            accessor.il().emit_throw_not_implemented(&name)?;
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
        let mut scaffold = construct_method_scaffold(base_type, method, type_builder)?;
        scaffold.il().emit_throw_not_implemented(&method.name)?;
        scaffold.finish(type_builder)?;
        Ok(())
    }
}

#[test]
fn test_throwing_members() -> Result<()> {
    let shop = shop()?;
    let factory = ProxyFactory::new(shop.registry.clone(), NotImplemented);
    let proxy = factory.create_proxy("Stub", Some(&shop.interceptor), Some(&shop.entity), None)?;
    let instance = proxy.create_instance(&[])?;

    match instance.invoke("GetValue", &[]) {
        Err(Error::Thrown { message, .. }) => {
            assert_eq!(message, "The method or operation is not implemented: GetValue");
        }
        other => panic!("unexpected {other:?}"),
    }
    assert!(matches!(instance.get_property("Name"), Err(Error::Thrown { .. })));
    assert!(shop.calls.lock().unwrap().is_empty());
    Ok(())
}

#[test]
fn test_inherited_interfaces_implemented_once() -> Result<()> {
    let shop = shop()?;
    let int = primitive(&shop.registry, CilPrimitiveKind::I4);
    let root = TypeBuilder::interface(&shop.registry, "Shop.Data", "IRoot")
        .method("GetValue", &[], &int)?
        .build()?;
    let left = TypeBuilder::interface(&shop.registry, "Shop.Data", "ILeft")
        .implements(&root)
        .build()?;
    let right = TypeBuilder::interface(&shop.registry, "Shop.Data", "IRight")
        .implements(&root)
        .build()?;
    let both = TypeBuilder::interface(&shop.registry, "Shop.Data", "IBoth")
        .implements(&left)
        .implements(&right)
        .build()?;

    let counting = Counting::default();
    let methods = counting.methods.clone();
    let factory = ProxyFactory::new(shop.registry.clone(), counting);
    let proxy = factory.create_proxy("Diamond", Some(&shop.interceptor), Some(&both), None)?;

    assert_eq!(methods.load(Ordering::SeqCst), 1);
    assert_eq!(proxy.interfaces().len(), 4);
    assert!(proxy.cil_type().is_assignable_to(&root));

    let get_value = root.find_method("GetValue", &[]).unwrap();
    let instance = proxy.create_instance(&[])?;
    assert_eq!(instance.call(&get_value, &[])?, Value::I4(42));
    Ok(())
}

#[test]
fn test_rent_and_give_back() -> Result<()> {
    let shop = shop()?;
    let factory = Arc::new(ProxyFactory::new(
        shop.registry.clone(),
        ForwardingSynthesizer::default(),
    ));
    let proxy = factory.create_proxy("Entity", Some(&shop.interceptor), Some(&shop.entity), None)?;

    let first = factory.rent(&proxy, &[])?;
    first.set_property("Name", "Ada")?;
    let object = first.object().clone();
    factory.give_back(first)?;
    assert_eq!(factory.pooled_instances("Entity"), 1);

    let again = factory.rent(&proxy, &[])?;
    assert!(Arc::ptr_eq(again.object(), &object));
    assert_eq!(factory.pooled_instances("Entity"), 0);
    factory.give_back(again)?;

    let handle = factory.clone();
    handle.dispose()?;
    // disposal clears instance state
    assert!(object.field("name").is_null());
    assert!(matches!(factory.rent(&proxy, &[]), Err(Error::Disposed)));
    Ok(())
}

#[test]
fn test_custom_assembly_name() -> Result<()> {
    let shop = shop()?;
    let host = AssemblyIdentity::new("Shop.Host", AssemblyVersion::new(4, 2, 0, 0))
        .with_public_key(vec![0xAA, 0xBB]);
    let config = FactoryConfig::default()
        .with_assembly_name("Shop.Proxies")
        .with_module_name("ShopModule")
        .with_host_identity(host)
        .with_pool_concurrency(2);
    let factory =
        ProxyFactory::with_config(shop.registry.clone(), ForwardingSynthesizer::default(), config);

    let proxy = factory.create_proxy("Entity", Some(&shop.interceptor), Some(&shop.entity), None)?;
    assert_eq!(proxy.fullname(), "Shop.Proxies.Entity");
    assert_eq!(proxy.module_name(), "ShopModule");
    assert_eq!(proxy.identity().version, AssemblyVersion::new(4, 2, 0, 0));
    assert!(proxy.identity().is_strong_named());
    Ok(())
}
