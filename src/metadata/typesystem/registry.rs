//! Central type registry for host and synthesized types.
//!
//! This module provides the `TypeRegistry`, a thread-safe registry for every type, method
//! and user string the engine knows about. Host types are declared into it up front, and
//! every synthesis context allocates the tokens of its proxy type and members from it, so
//! synthesized members never collide with host members.
//!
//! # Registry Architecture
//!
//! - **Token-based lookup**: Primary index using metadata tokens (`SkipMap`)
//! - **Name-based lookup**: Secondary index for full names (`DashMap`)
//! - **Method index**: Token to method, used to resolve `call` / `callvirt` operands
//! - **User strings**: Interned string literals referenced by `ldstr`
//!
//! # Thread Safety
//!
//! - Lock-free data structures for primary storage (`SkipMap`)
//! - Concurrent hash maps for indices (`DashMap`)
//! - Atomic operations for token generation
//!
//! # Examples
//!
//! ```rust
//! use dotproxy::metadata::identity::AssemblyIdentity;
//! use dotproxy::metadata::typesystem::{CilPrimitiveKind, TypeRegistry};
//!
//! let identity = AssemblyIdentity::parse("Shop.Data, Version=1.0.0.0")?;
//! let registry = TypeRegistry::new(identity)?;
//!
//! let int = registry.get_by_fullname("System.Int32").unwrap();
//! assert_eq!(int.token, CilPrimitiveKind::I4.token());
//!
//! let by_ref = registry.by_ref(&int)?;
//! assert_eq!(by_ref.name, "Int32&");
//! # Ok::<(), dotproxy::Error>(())
//! ```

use std::sync::{
    atomic::{AtomicU32, Ordering},
    Arc,
};

use crossbeam_skiplist::SkipMap;
use dashmap::{mapref::entry::Entry, DashMap};
use strum::IntoEnumIterator;

use crate::{
    metadata::{
        identity::{AssemblyIdentity, AssemblyVersion},
        method::MethodRc,
        token::{Token, TABLE},
        typesystem::{CilFlavor, CilPrimitiveKind, CilType, CilTypeRc, TypeAttributes},
    },
    Error::{TypeError, TypeNotFound},
    Result,
};

/// Central registry for managing all types of a host process.
///
/// `TypeRegistry` provides thread-safe storage and lookup for all types, methods and user
/// strings. It is shared between host type declaration, synthesis contexts and the
/// interpreter that resolves instruction operands.
///
/// # Performance Characteristics
///
/// - **Token lookup**: O(log n) using skip list
/// - **Name lookup**: O(1) average using hash indices
/// - **Registration**: O(log n) + O(1) for indexing
pub struct TypeRegistry {
    /// Primary type storage indexed by metadata tokens
    types: SkipMap<Token, CilTypeRc>,
    /// Secondary index: types indexed by full name (namespace.name)
    types_by_fullname: DashMap<String, Token>,
    /// Methods, constructors and accessors indexed by their tokens
    methods: SkipMap<Token, MethodRc>,
    /// User strings indexed by their tokens
    strings: SkipMap<Token, Arc<str>>,
    /// Reverse index for interning user strings
    strings_by_value: DashMap<Arc<str>, Token>,
    /// Per-table row counters for token generation
    next_rows: DashMap<u8, AtomicU32>,
    /// Identity of the host this registry represents
    identity: AssemblyIdentity,
}

impl TypeRegistry {
    /// Create a new type registry with initialized primitive types.
    ///
    /// # Errors
    /// Returns an error if primitive type initialization fails.
    pub fn new(identity: AssemblyIdentity) -> Result<Self> {
        let registry = TypeRegistry {
            types: SkipMap::new(),
            types_by_fullname: DashMap::new(),
            methods: SkipMap::new(),
            strings: SkipMap::new(),
            strings_by_value: DashMap::new(),
            next_rows: DashMap::new(),
            identity,
        };

        registry.initialize_primitives()?;
        Ok(registry)
    }

    /// Get the host identity
    pub fn identity(&self) -> &AssemblyIdentity {
        &self.identity
    }

    /// Get the next available token of `table` and increment its counter
    pub fn next_token(&self, table: u8) -> Token {
        let row = self
            .next_rows
            .entry(table)
            .or_insert_with(|| AtomicU32::new(1))
            .fetch_add(1, Ordering::Relaxed);
        debug_assert!(row <= 0x00FF_FFFF, "ran out of rows in table 0x{table:02x}");

        Token::from_parts(table, row)
    }

    /// Initialize primitive types in the registry
    fn initialize_primitives(&self) -> Result<()> {
        for kind in CilPrimitiveKind::iter() {
            let new_type = Arc::new(CilType::new(
                kind.token(),
                CilFlavor::Primitive(kind),
                kind.namespace(),
                kind.name(),
                TypeAttributes::PUBLIC,
            ));
            self.insert(&new_type)?;
        }

        let object = self.get_primitive(CilPrimitiveKind::Object)?;
        self.get_primitive(CilPrimitiveKind::String)?
            .set_base(&object)?;

        Ok(())
    }

    /// Insert a `CilType` into the registry
    ///
    /// ## Arguments
    /// * '`new_type`' - The type to register
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeError`] if the token or the full name is already taken.
    pub fn insert(&self, new_type: &CilTypeRc) -> Result<()> {
        if self.types.contains_key(&new_type.token) {
            return Err(TypeError(format!(
                "Token {} is already registered",
                new_type.token
            )));
        }

        match self.types_by_fullname.entry(new_type.fullname()) {
            Entry::Occupied(entry) => Err(TypeError(format!(
                "Type '{}' is already registered",
                entry.key()
            ))),
            Entry::Vacant(entry) => {
                self.types.insert(new_type.token, new_type.clone());
                entry.insert(new_type.token);
                Ok(())
            }
        }
    }

    /// Get a primitive type by its kind
    ///
    /// # Errors
    /// Returns an error if the primitive type is not found in the registry.
    pub fn get_primitive(&self, primitive: CilPrimitiveKind) -> Result<CilTypeRc> {
        match self.types.get(&primitive.token()) {
            Some(res) => Ok(res.value().clone()),
            None => Err(TypeNotFound(primitive.token())),
        }
    }

    /// Look up a type by its metadata token.
    pub fn get(&self, token: &Token) -> Option<CilTypeRc> {
        self.types.get(token).map(|entry| entry.value().clone())
    }

    /// Look up a type by its full name (namespace.name)
    pub fn get_by_fullname(&self, fullname: &str) -> Option<CilTypeRc> {
        let token = *self.types_by_fullname.get(fullname)?;
        self.get(&token)
    }

    /// Get or create the managed reference type `T&` for `element`
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeError`] for `Void` or an element that already is a by-ref.
    pub fn by_ref(&self, element: &CilTypeRc) -> Result<CilTypeRc> {
        if element.is_by_ref() || element.primitive_kind() == Some(CilPrimitiveKind::Void) {
            return Err(TypeError(format!(
                "Cannot create a reference to '{}'",
                element.fullname()
            )));
        }
        self.compound(CilFlavor::ByRef, element)
    }

    /// Get or create the single-dimensional array type `T[]` for `element`
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeError`] for `Void` or by-ref elements.
    pub fn array_of(&self, element: &CilTypeRc) -> Result<CilTypeRc> {
        if element.is_by_ref() || element.primitive_kind() == Some(CilPrimitiveKind::Void) {
            return Err(TypeError(format!(
                "Cannot create an array of '{}'",
                element.fullname()
            )));
        }
        self.compound(CilFlavor::Array, element)
    }

    fn compound(&self, flavor: CilFlavor, element: &CilTypeRc) -> Result<CilTypeRc> {
        let token = self.next_token(TABLE::TYPESPEC);
        let candidate = Arc::new(CilType::compound(token, flavor, element));

        // The name index entry is the synchronization point, the loser of a race reuses the
        // winner's type and its token is simply left unused.
        match self.types_by_fullname.entry(candidate.fullname()) {
            Entry::Occupied(entry) => {
                let existing = *entry.get();
                drop(entry);
                self.get(&existing).ok_or(TypeNotFound(existing))
            }
            Entry::Vacant(entry) => {
                self.types.insert(token, candidate.clone());
                entry.insert(token);
                Ok(candidate)
            }
        }
    }

    /// Register a method, constructor or accessor so it can be resolved by token
    ///
    /// # Errors
    /// Returns [`crate::Error::TypeError`] if a different method already uses the token.
    pub fn register_method(&self, method: &MethodRc) -> Result<()> {
        if let Some(existing) = self.methods.get(&method.token) {
            if !Arc::ptr_eq(existing.value(), method) {
                return Err(TypeError(format!(
                    "Method token {} is already registered",
                    method.token
                )));
            }
            return Ok(());
        }
        self.methods.insert(method.token, method.clone());
        Ok(())
    }

    /// Look up a method by its token
    pub fn method(&self, token: &Token) -> Option<MethodRc> {
        self.methods.get(token).map(|entry| entry.value().clone())
    }

    /// Intern a string literal and return its user string token
    pub fn intern_string(&self, value: &str) -> Token {
        if let Some(token) = self.strings_by_value.get(value) {
            return *token;
        }

        match self.strings_by_value.entry(Arc::from(value)) {
            Entry::Occupied(entry) => *entry.get(),
            Entry::Vacant(entry) => {
                let token = self.next_token(TABLE::USERSTRING);
                self.strings.insert(token, entry.key().clone());
                entry.insert(token);
                token
            }
        }
    }

    /// Look up a user string by its token
    pub fn user_string(&self, token: &Token) -> Option<Arc<str>> {
        self.strings.get(token).map(|entry| entry.value().clone())
    }

    /// Number of registered types (primitives and constructed types included)
    pub fn len(&self) -> usize {
        self.types.len()
    }

    /// Returns true if no types are registered
    pub fn is_empty(&self) -> bool {
        self.types.is_empty()
    }

    /// Snapshot of all registered types in token order
    pub fn all_types(&self) -> Vec<CilTypeRc> {
        self.types.iter().map(|entry| entry.value().clone()).collect()
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        let registry = TypeRegistry {
            types: SkipMap::new(),
            types_by_fullname: DashMap::new(),
            methods: SkipMap::new(),
            strings: SkipMap::new(),
            strings_by_value: DashMap::new(),
            next_rows: DashMap::new(),
            identity: AssemblyIdentity::new("DotProxy.Host", AssemblyVersion::new(1, 0, 0, 0)),
        };

        // An empty registry cannot have name or token clashes
        let _ = registry.initialize_primitives();
        registry
    }
}
