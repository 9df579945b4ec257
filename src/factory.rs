//! The proxy factory: cached, thread-safe synthesis of proxy types.
//!
//! [`ProxyFactory::create_proxy`] validates a request, returns the cached type when one
//! with the same name exists, and otherwise runs the synthesis pipeline:
//!
//! 1. open a [`SynthesisContext`] (validation, identity derivation, interface surface)
//! 2. [`synthesize_constructor`] chains the proxy constructor to the base type
//! 3. [`synthesize_members`] lets the configured [`MemberSynthesizer`] implement every
//!    interface member
//! 4. the context is finished, which validates and registers the type
//!
//! Synthesis of one name is serialized: concurrent requests for the same name wait for the
//! first one and then share its result. A failed synthesis caches nothing, so a later
//! request retries from scratch.
//!
//! The factory also recycles proxy instances through a [`ProxyPool`]; see
//! [`ProxyFactory::rent`] and [`ProxyFactory::give_back`].

use std::sync::{Arc, Mutex};

use dashmap::DashMap;
use log::{debug, info, warn};

use crate::{
    cache::ProxyPool,
    config::FactoryConfig,
    emit::{synthesize_constructor, synthesize_members, MemberSynthesizer, SynthesisContext},
    metadata::typesystem::{CilTypeRc, TypeRegistry},
    proxy::{ProxyInstance, ProxySpecification, ProxyType, ProxyTypeRc},
    runtime::{Interpreter, Value},
    Error, Result,
};

/// Creates and caches proxy types over one [`TypeRegistry`]
///
/// # Examples
///
/// ```rust
/// use std::sync::Arc;
/// use dotproxy::prelude::*;
///
/// let registry = Arc::new(TypeRegistry::default());
/// let int = registry.get_primitive(CilPrimitiveKind::I4)?;
/// let string = registry.get_primitive(CilPrimitiveKind::String)?;
/// let object = registry.get_primitive(CilPrimitiveKind::Object)?;
/// let objects = registry.array_of(&object)?;
///
/// let base = TypeBuilder::class(&registry, "Shop", "Interceptor")
///     .constructor(&[], |_| Ok(Value::Null))?
///     .native_method(
///         "InvokeMethod",
///         &[Param::new("name", &string), Param::new("args", &objects)],
///         &object,
///         |call| match call.arg(0)?.as_str()? {
///             "GetValue" => Ok(Value::I4(42)),
///             other => Err(Error::Error(format!("unexpected member {other}"))),
///         },
///     )?
///     .build()?;
/// let contract = TypeBuilder::interface(&registry, "Shop", "IValue")
///     .method("GetValue", &[], &int)?
///     .build()?;
///
/// let factory = ProxyFactory::new(registry, ForwardingSynthesizer::default());
/// let proxy = factory.create_proxy("Value", Some(&base), Some(&contract), None)?;
/// let instance = proxy.create_instance(&[])?;
///
/// assert_eq!(instance.invoke("GetValue", &[])?, Value::I4(42));
/// # Ok::<(), dotproxy::Error>(())
/// ```
pub struct ProxyFactory {
    registry: Arc<TypeRegistry>,
    config: FactoryConfig,
    synthesizer: Arc<dyn MemberSynthesizer>,
    interpreter: Arc<Interpreter>,
    types: ProxyPool<String, ProxyTypeRc>,
    instances: ProxyPool<String, ProxyInstance>,
    synthesis_locks: DashMap<String, Arc<Mutex<()>>>,
}

impl ProxyFactory {
    /// Create a factory with the default configuration
    pub fn new(registry: Arc<TypeRegistry>, synthesizer: impl MemberSynthesizer + 'static) -> Self {
        Self::with_config(registry, synthesizer, FactoryConfig::default())
    }

    /// Create a factory with `config`
    pub fn with_config(
        registry: Arc<TypeRegistry>,
        synthesizer: impl MemberSynthesizer + 'static,
        config: FactoryConfig,
    ) -> Self {
        let concurrency = config
            .pool_concurrency
            .unwrap_or_else(crate::cache::default_concurrency);
        let interpreter =
            Arc::new(Interpreter::new(registry.clone()).with_max_call_depth(config.max_call_depth));

        ProxyFactory {
            registry,
            synthesizer: Arc::new(synthesizer),
            interpreter,
            types: ProxyPool::with_concurrency(concurrency),
            instances: ProxyPool::with_concurrency(concurrency),
            synthesis_locks: DashMap::new(),
            config,
        }
    }

    /// The registry proxies are registered in
    pub fn registry(&self) -> &Arc<TypeRegistry> {
        &self.registry
    }

    /// The configuration of this factory
    pub fn config(&self) -> &FactoryConfig {
        &self.config
    }

    fn synthesis_lock(&self, name: &str) -> Arc<Mutex<()>> {
        self.synthesis_locks
            .entry(name.to_string())
            .or_default()
            .value()
            .clone()
    }

    fn cached(&self, name: &str) -> Result<Option<ProxyTypeRc>> {
        let key = name.to_string();
        match self.types.request(&key)? {
            Some(existing) => {
                self.types.release(key, existing.clone())?;
                Ok(Some(existing))
            }
            None => Ok(None),
        }
    }

    /// Return the proxy type named `proxy_name`, synthesizing it on first request.
    ///
    /// ## Arguments
    /// * 'proxy_name'     - Simple name of the proxy, the cache key
    /// * 'base_type'      - The class the proxy derives from
    /// * 'interface_type' - The contract to implement
    /// * 'ctor_arg_type'  - Parameter type of the proxy constructor, `None` for none
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidArgument`] if an argument is missing or invalid, or if
    /// a proxy of that name was already synthesized over different types;
    /// [`crate::Error::Synthesis`] if the type cannot be finalized; or any error raised by
    /// the member synthesizer.
    pub fn create_proxy(
        &self,
        proxy_name: &str,
        base_type: Option<&CilTypeRc>,
        interface_type: Option<&CilTypeRc>,
        ctor_arg_type: Option<&CilTypeRc>,
    ) -> Result<ProxyTypeRc> {
        let specification =
            ProxySpecification::new(proxy_name, base_type, interface_type, ctor_arg_type)?;
        let name = specification.name.clone();

        let lock = self.synthesis_lock(&name);
        let _guard = lock!(lock);

        if let Some(existing) = self.cached(&name)? {
            if !existing.specification().matches(&specification) {
                return Err(argument_error!(
                    "proxy_name",
                    "'{}' was already synthesized over different types",
                    name
                ));
            }
            debug!("Cache hit for proxy '{}'", name);
            return Ok(existing);
        }

        let proxy = Arc::new(self.synthesize(specification)?);
        self.types.add(name, proxy.clone())?;
        Ok(proxy)
    }

    fn synthesize(&self, specification: ProxySpecification) -> Result<ProxyType> {
        let base_type = &specification.base_type;
        let mut context = SynthesisContext::create(
            &self.registry,
            &self.config,
            Some(specification.name.as_str()),
            Some(base_type),
            Some(&specification.interface_type),
        )?;
        let interfaces = context.interfaces().to_vec();

        synthesize_constructor(
            context.type_builder(),
            base_type,
            &specification.ctor_arg_types(),
        )?;
        synthesize_members(
            self.synthesizer.as_ref(),
            context.type_builder(),
            base_type,
            &interfaces,
        )?;

        let (cil_type, identity, module_name) = context.finish()?;
        info!(
            "Synthesized proxy '{}' deriving from '{}' ({} interfaces)",
            cil_type.fullname(),
            base_type.fullname(),
            interfaces.len()
        );

        Ok(ProxyType::new(
            specification,
            cil_type,
            identity,
            module_name,
            self.interpreter.clone(),
        ))
    }

    /// The cached proxy type named `proxy_name`, if it was synthesized
    ///
    /// # Errors
    /// Returns [`crate::Error::Disposed`] after [`ProxyFactory::dispose`].
    pub fn lookup(&self, proxy_name: &str) -> Result<Option<ProxyTypeRc>> {
        if self.types.is_disposed() {
            return Err(Error::Disposed);
        }
        let name = proxy_name.trim();
        // a name without a lock was never requested
        let Some(lock) = self
            .synthesis_locks
            .get(name)
            .map(|entry| entry.value().clone())
        else {
            return Ok(None);
        };
        let _guard = lock!(lock);
        self.cached(name)
    }

    /// Number of proxy types synthesized by this factory
    pub fn proxy_count(&self) -> usize {
        self.types.total_count()
    }

    /// Take a pooled instance of `proxy`, or construct a new one with `args`.
    ///
    /// A recycled instance was constructed earlier and is returned as is; `args` only
    /// apply to fresh instances.
    ///
    /// # Errors
    /// Returns [`crate::Error::Disposed`] after disposal, or any error of
    /// [`ProxyType::create_instance`].
    pub fn rent(&self, proxy: &ProxyTypeRc, args: &[Value]) -> Result<ProxyInstance> {
        self.instances
            .request_or_build(&proxy.name().to_string(), || proxy.create_instance(args))
    }

    /// Return an instance obtained from [`ProxyFactory::rent`] for reuse
    ///
    /// # Errors
    /// Returns [`crate::Error::Disposed`] after disposal.
    pub fn give_back(&self, instance: ProxyInstance) -> Result<()> {
        let name = instance.proxy_type().name().to_string();
        self.instances.release(name, instance)
    }

    /// Number of idle instances of the proxy named `proxy_name`
    pub fn pooled_instances(&self, proxy_name: &str) -> usize {
        self.instances.count(&proxy_name.trim().to_string())
    }

    /// Dispose every pooled instance and stop accepting requests
    ///
    /// # Errors
    /// Returns [`crate::Error::DisposeFailed`] if some instances failed to dispose.
    pub fn dispose(&self) -> Result<()> {
        let instances = self.instances.dispose();
        self.types.dispose()?;
        instances
    }
}

impl Drop for ProxyFactory {
    fn drop(&mut self) {
        if let Err(error) = self.dispose() {
            warn!("Disposing proxy factory failed: {error}");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{emit::ForwardingSynthesizer, metadata::typesystem::TypeBuilder};

    #[test]
    fn test_lookup_does_not_track_unknown_names() {
        let registry = Arc::new(TypeRegistry::default());
        let base = TypeBuilder::class(&registry, "Test", "Base").build().unwrap();
        let contract = TypeBuilder::interface(&registry, "Test", "IEmpty").build().unwrap();
        let factory = ProxyFactory::new(registry, ForwardingSynthesizer::default());

        for name in ["A", "B", "C"] {
            assert!(factory.lookup(name).unwrap().is_none());
        }
        assert_eq!(factory.synthesis_locks.len(), 0);

        let proxy = factory
            .create_proxy("Empty", Some(&base), Some(&contract), None)
            .unwrap();
        assert!(Arc::ptr_eq(&factory.lookup(" Empty ").unwrap().unwrap(), &proxy));
        assert_eq!(factory.synthesis_locks.len(), 1);

        factory.dispose().unwrap();
        assert!(matches!(factory.lookup("A"), Err(Error::Disposed)));
    }
}
