//! Validation of synthesis requests and the isolated context a proxy type is built in.

use std::sync::Arc;

use log::debug;

use crate::{
    config::FactoryConfig,
    emit::ProxyTypeBuilder,
    metadata::{
        identity::AssemblyIdentity,
        token::Token,
        typesystem::{CilFlavor, CilTypeRc, TypeRegistry},
    },
    Result,
};

/// The sandbox one proxy type is synthesized in.
///
/// A context is created per synthesis request. It owns the [`ProxyTypeBuilder`] of the new
/// type, the identity of the dynamic module the type belongs to, and the interface list
/// the type implements.
pub struct SynthesisContext {
    identity: AssemblyIdentity,
    module_name: String,
    interfaces: Vec<CilTypeRc>,
    type_builder: ProxyTypeBuilder,
}

impl SynthesisContext {
    /// Validate a synthesis request and open a context for it.
    ///
    /// The proxy is declared as `{assembly}.{proxy_name}`, a public sealed class deriving
    /// from `base_type`. It implements every interface `interface_type` transitively
    /// implements, plus `interface_type` itself when it is an interface; each interface is
    /// registered once even when it is reachable along several paths.
    ///
    /// ## Arguments
    /// * 'registry'       - The registry tokens are allocated from and the type is registered in
    /// * 'config'         - Supplies the proxy assembly and module names and the host identity
    /// * 'proxy_name'     - Simple name of the new type
    /// * 'base_type'      - The class the proxy derives from
    /// * 'interface_type' - The contract to implement
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidArgument`] if `proxy_name` is missing or empty, if
    /// `base_type` or `interface_type` is missing, if `base_type` cannot be derived from,
    /// if `interface_type` is neither an interface nor a class, or if a type of the same
    /// full name is already registered.
    pub fn create(
        registry: &Arc<TypeRegistry>,
        config: &FactoryConfig,
        proxy_name: Option<&str>,
        base_type: Option<&CilTypeRc>,
        interface_type: Option<&CilTypeRc>,
    ) -> Result<Self> {
        let proxy_name = match proxy_name.map(str::trim) {
            Some(name) if !name.is_empty() => name,
            _ => return Err(argument_error!("proxy_name", "Proxy name cannot be empty")),
        };
        let Some(base_type) = base_type else {
            return Err(argument_error!("base_type", "A base type is required"));
        };
        let Some(interface_type) = interface_type else {
            return Err(argument_error!("interface_type", "An interface type is required"));
        };

        if !base_type.is_derivable() {
            return Err(argument_error!(
                "base_type",
                "'{}' cannot be derived from",
                base_type.fullname()
            ));
        }
        if !matches!(interface_type.flavor, CilFlavor::Interface | CilFlavor::Class) {
            return Err(argument_error!(
                "interface_type",
                "'{}' is neither an interface nor a class",
                interface_type.fullname()
            ));
        }

        let fullname = format!("{}.{}", config.assembly_name, proxy_name);
        if registry.get_by_fullname(&fullname).is_some() {
            return Err(argument_error!(
                "proxy_name",
                "A type named '{}' already exists",
                fullname
            ));
        }

        let host = config
            .host_identity
            .clone()
            .unwrap_or_else(|| registry.identity().clone());
        let identity = host.derive(&config.assembly_name);

        let interfaces = Self::interface_surface(interface_type);
        let type_builder = ProxyTypeBuilder::new(
            registry,
            &config.assembly_name,
            proxy_name,
            base_type,
            interfaces.clone(),
        );

        debug!(
            "Opened synthesis context for '{}' in module '{}' of '{}' ({} interfaces)",
            fullname,
            config.module_name,
            identity.display_name(),
            interfaces.len()
        );

        Ok(SynthesisContext {
            identity,
            module_name: config.module_name.clone(),
            interfaces,
            type_builder,
        })
    }

    /// The interfaces a proxy for `interface_type` implements, deduplicated by token
    fn interface_surface(interface_type: &CilTypeRc) -> Vec<CilTypeRc> {
        let mut interfaces = Vec::new();
        if interface_type.is_interface() {
            interfaces.push(interface_type.clone());
        }
        for interface in interface_type.all_interfaces() {
            if !interfaces.iter().any(|i: &CilTypeRc| i.token == interface.token) {
                interfaces.push(interface);
            }
        }
        interfaces
    }

    /// Identity of the dynamic module
    pub fn identity(&self) -> &AssemblyIdentity {
        &self.identity
    }

    /// Name of the dynamic module
    pub fn module_name(&self) -> &str {
        &self.module_name
    }

    /// The interfaces the proxy implements, in registration order
    pub fn interfaces(&self) -> &[CilTypeRc] {
        &self.interfaces
    }

    /// Reserved token of the proxy type
    pub fn token(&self) -> Token {
        self.type_builder.token()
    }

    /// The builder of the proxy type
    pub fn type_builder(&mut self) -> &mut ProxyTypeBuilder {
        &mut self.type_builder
    }

    /// Close the context: finalize and register the type
    ///
    /// # Errors
    /// Returns [`crate::Error::Synthesis`] if the definition is incomplete.
    pub fn finish(self) -> Result<(CilTypeRc, AssemblyIdentity, String)> {
        let proxy_type = self.type_builder.create_type()?;
        Ok((proxy_type, self.identity, self.module_name))
    }
}
