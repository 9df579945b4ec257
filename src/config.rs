//! Configuration of a [`crate::ProxyFactory`].
//!
//! The defaults name the dynamic module the way every proxy module is named
//! (`DotProxy.ProxyAssembly` / `DotProxyTypeGenerator`), adopt the registry's own identity
//! as host identity and size the pools from the number of CPUs.

use crate::{metadata::identity::AssemblyIdentity, runtime::DEFAULT_MAX_CALL_DEPTH};

/// Default name of the proxy assembly, also the namespace of every proxy type
pub const DEFAULT_ASSEMBLY_NAME: &str = "DotProxy.ProxyAssembly";
/// Default name of the dynamic module proxies are defined in
pub const DEFAULT_MODULE_NAME: &str = "DotProxyTypeGenerator";

/// Settings of a proxy factory
#[derive(Debug, Clone)]
pub struct FactoryConfig {
    /// Name of the proxy assembly; proxy types are named `{assembly_name}.{proxy_name}`
    pub assembly_name: String,

    /// Name of the dynamic module inside the proxy assembly
    pub module_name: String,

    /// Identity whose version and public key the proxy assembly adopts.
    /// `None` uses the identity of the factory's type registry.
    pub host_identity: Option<AssemblyIdentity>,

    /// Concurrency level of the factory's pools, `None` for `num_cpus * 8`
    pub pool_concurrency: Option<usize>,

    /// Nested call limit when executing proxy members
    pub max_call_depth: usize,
}

impl Default for FactoryConfig {
    fn default() -> Self {
        Self {
            assembly_name: DEFAULT_ASSEMBLY_NAME.to_string(),
            module_name: DEFAULT_MODULE_NAME.to_string(),
            host_identity: None,
            pool_concurrency: None,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

impl FactoryConfig {
    /// Set the proxy assembly name
    #[must_use]
    pub fn with_assembly_name(mut self, name: impl Into<String>) -> Self {
        self.assembly_name = name.into();
        self
    }

    /// Set the dynamic module name
    #[must_use]
    pub fn with_module_name(mut self, name: impl Into<String>) -> Self {
        self.module_name = name.into();
        self
    }

    /// Set the host identity the proxy assembly derives from
    #[must_use]
    pub fn with_host_identity(mut self, identity: AssemblyIdentity) -> Self {
        self.host_identity = Some(identity);
        self
    }

    /// Override the pool concurrency level
    #[must_use]
    pub fn with_pool_concurrency(mut self, level: usize) -> Self {
        self.pool_concurrency = Some(level);
        self
    }

    /// Override the nested call limit
    #[must_use]
    pub fn with_max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }
}
