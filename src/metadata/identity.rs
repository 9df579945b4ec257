//! Assembly identity for the host and for synthesized proxy modules.
//!
//! Every [`crate::emit::SynthesisContext`] carries an [`AssemblyIdentity`]. The proxy
//! module never invents its own strong name: it derives its identity from the host
//! identity configured on the factory, taking over version and public key, so that
//! synthesized types are trusted like the hand-written types of the host.
//!
//! # Examples
//!
//! ```rust
//! use dotproxy::metadata::identity::{AssemblyIdentity, AssemblyVersion};
//!
//! let host = AssemblyIdentity::parse("Shop.Data, Version=2.1.0.0")?
//!     .with_public_key(vec![0x00, 0x24, 0x00, 0x00]);
//!
//! let proxy = host.derive("DotProxy.ProxyAssembly");
//! assert_eq!(proxy.version, AssemblyVersion::new(2, 1, 0, 0));
//! assert!(proxy.is_strong_named());
//! # Ok::<(), dotproxy::Error>(())
//! ```

use std::{fmt, fmt::Write, sync::Arc};

use crate::Result;

/// Complete identity of an assembly or dynamic module.
#[derive(Debug, Clone)]
pub struct AssemblyIdentity {
    /// Simple assembly name (e.g. "Shop.Data")
    pub name: String,
    /// Four-part version number
    pub version: AssemblyVersion,
    /// Culture for satellite assemblies, `None` for culture-neutral
    pub culture: Option<String>,
    /// Public key of the strong name, if signed
    pub public_key: Option<Arc<[u8]>>,
}

impl PartialEq for AssemblyIdentity {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name && self.version == other.version && self.culture == other.culture
    }
}

impl Eq for AssemblyIdentity {}

impl std::hash::Hash for AssemblyIdentity {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.name.hash(state);
        self.version.hash(state);
        self.culture.hash(state);
    }
}

impl AssemblyIdentity {
    /// Create a new culture-neutral, unsigned identity
    ///
    /// ## Arguments
    /// * 'name'    - The simple assembly name
    /// * 'version' - The assembly version
    pub fn new(name: impl Into<String>, version: AssemblyVersion) -> Self {
        AssemblyIdentity {
            name: name.into(),
            version,
            culture: None,
            public_key: None,
        }
    }

    /// Attach a public key, making this a strong-named identity
    #[must_use]
    pub fn with_public_key(mut self, public_key: Vec<u8>) -> Self {
        self.public_key = Some(public_key.into());
        self
    }

    /// Derive the identity of a dynamic module from this (host) identity.
    ///
    /// The derived identity takes the new `name` but keeps version, culture and
    /// signing key of `self`.
    #[must_use]
    pub fn derive(&self, name: &str) -> AssemblyIdentity {
        AssemblyIdentity {
            name: name.to_string(),
            version: self.version,
            culture: self.culture.clone(),
            public_key: self.public_key.clone(),
        }
    }

    /// Returns true if a public key is present
    #[must_use]
    pub fn is_strong_named(&self) -> bool {
        self.public_key.as_ref().is_some_and(|key| !key.is_empty())
    }

    /// Parse a display name of the form `Name[, Version=a.b.c.d][, Culture=xx]`.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidArgument`] if the name part is empty or the
    /// version cannot be parsed.
    pub fn parse(display_name: &str) -> Result<Self> {
        let mut parts = display_name.split(',').map(str::trim);

        let name = parts.next().unwrap_or_default();
        if name.is_empty() {
            return Err(argument_error!("display_name", "Assembly name cannot be empty"));
        }

        let mut identity = AssemblyIdentity::new(name, AssemblyVersion::default());
        for part in parts {
            if let Some(value) = part.strip_prefix("Version=") {
                identity.version = AssemblyVersion::parse(value)?;
            } else if let Some(value) = part.strip_prefix("Culture=") {
                if value != "neutral" {
                    identity.culture = Some(value.to_string());
                }
            }
        }

        Ok(identity)
    }

    /// Generate the display name string for this identity
    #[must_use]
    pub fn display_name(&self) -> String {
        let mut result = String::with_capacity(self.name.len() + 64);
        result.push_str(&self.name);

        let _ = write!(result, ", Version={}", self.version);
        let _ = write!(
            result,
            ", Culture={}",
            self.culture.as_deref().unwrap_or("neutral")
        );

        result.push_str(", PublicKey=");
        match &self.public_key {
            Some(key) if !key.is_empty() => {
                for byte in key.iter() {
                    let _ = write!(result, "{byte:02x}");
                }
            }
            _ => result.push_str("null"),
        }

        result
    }
}

/// Four-part version numbering (major.minor.build.revision).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct AssemblyVersion {
    /// Major version component
    pub major: u16,
    /// Minor version component
    pub minor: u16,
    /// Build version component
    pub build: u16,
    /// Revision version component
    pub revision: u16,
}

impl AssemblyVersion {
    /// Create a new version from its four components
    #[must_use]
    pub const fn new(major: u16, minor: u16, build: u16, revision: u16) -> Self {
        AssemblyVersion {
            major,
            minor,
            build,
            revision,
        }
    }

    /// Parse a version string with one to four dot-separated components.
    ///
    /// # Errors
    /// Returns [`crate::Error::InvalidArgument`] if the version string has an invalid format.
    pub fn parse(version_str: &str) -> Result<Self> {
        let parts: Vec<&str> = version_str.split('.').collect();
        if parts.len() > 4 {
            return Err(argument_error!(
                "version",
                "Invalid version format: {}",
                version_str
            ));
        }

        let mut components = [0u16; 4];
        for (i, part) in parts.iter().enumerate() {
            components[i] = part.parse::<u16>().map_err(|_| {
                argument_error!("version", "Invalid version component: {}", part)
            })?;
        }

        Ok(Self::new(
            components[0],
            components[1],
            components[2],
            components[3],
        ))
    }
}

impl fmt::Display for AssemblyVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}.{}.{}.{}",
            self.major, self.minor, self.build, self.revision
        )
    }
}
