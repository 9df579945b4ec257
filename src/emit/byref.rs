//! Indirect load/store opcode selection for values passed through reference slots.
//!
//! When a primitive travels through a `T&` parameter, the emitted body reads the slot with
//! an `ldind.*` and writes it back with a `stind.*` instruction of the matching width. The
//! mapping is a fixed table, built once per process on first use.
//!
//! Stores have no unsigned variants in CIL, so unsigned kinds share the signed store of the
//! same width. `UInt64` also loads through `ldind.i8`, there is no `ldind.u8`.

use std::{collections::HashMap, sync::OnceLock};

use strum::IntoEnumIterator;

use crate::{
    assembly::opcodes::{
        LDIND_I1, LDIND_I2, LDIND_I4, LDIND_I8, LDIND_R4, LDIND_R8, LDIND_REF, LDIND_U1,
        LDIND_U2, LDIND_U4, STIND_I1, STIND_I2, STIND_I4, STIND_I8, STIND_R4, STIND_R8,
        STIND_REF,
    },
    metadata::typesystem::{CilPrimitiveKind, CilType},
};

/// The indirect load and store opcode for one primitive kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ByRefAccess {
    /// `ldind.*` opcode reading the slot
    pub load: u8,
    /// `stind.*` opcode writing the slot
    pub store: u8,
}

static BYREF_TABLE: OnceLock<HashMap<CilPrimitiveKind, ByRefAccess>> = OnceLock::new();

/// Process-wide table of by-reference access opcodes, see the module documentation
pub struct ByRefAccessStrategy;

impl ByRefAccessStrategy {
    fn table() -> &'static HashMap<CilPrimitiveKind, ByRefAccess> {
        BYREF_TABLE.get_or_init(|| {
            CilPrimitiveKind::iter()
                .filter_map(|kind| Self::entry(kind).map(|access| (kind, access)))
                .collect()
        })
    }

    fn entry(kind: CilPrimitiveKind) -> Option<ByRefAccess> {
        let (load, store) = match kind {
            CilPrimitiveKind::Boolean => (LDIND_I1, STIND_I1),
            CilPrimitiveKind::U1 => (LDIND_U1, STIND_I1),
            CilPrimitiveKind::I1 => (LDIND_I1, STIND_I1),
            CilPrimitiveKind::I2 => (LDIND_I2, STIND_I2),
            CilPrimitiveKind::U2 => (LDIND_U2, STIND_I2),
            CilPrimitiveKind::I4 => (LDIND_I4, STIND_I4),
            CilPrimitiveKind::U4 => (LDIND_U4, STIND_I4),
            CilPrimitiveKind::I8 => (LDIND_I8, STIND_I8),
            CilPrimitiveKind::U8 => (LDIND_I8, STIND_I8),
            CilPrimitiveKind::Char => (LDIND_U2, STIND_I2),
            CilPrimitiveKind::R8 => (LDIND_R8, STIND_R8),
            CilPrimitiveKind::R4 => (LDIND_R4, STIND_R4),
            CilPrimitiveKind::Void | CilPrimitiveKind::Object | CilPrimitiveKind::String => {
                return None
            }
        };
        Some(ByRefAccess { load, store })
    }

    /// The access pair of a primitive kind, `None` for kinds that are not value primitives
    pub fn get(kind: CilPrimitiveKind) -> Option<ByRefAccess> {
        Self::table().get(&kind).copied()
    }

    /// The `ldind.*` opcode for `kind`
    pub fn load(kind: CilPrimitiveKind) -> Option<u8> {
        Self::get(kind).map(|access| access.load)
    }

    /// The `stind.*` opcode for `kind`
    pub fn store(kind: CilPrimitiveKind) -> Option<u8> {
        Self::get(kind).map(|access| access.store)
    }

    /// The `ldind.*` opcode for a slot of `element`, `ldind.ref` for reference types
    pub fn load_for_type(element: &CilType) -> Option<u8> {
        match element.primitive_kind().and_then(Self::load) {
            Some(opcode) => Some(opcode),
            None if element.flavor.is_reference_type() => Some(LDIND_REF),
            None => None,
        }
    }

    /// The `stind.*` opcode for a slot of `element`, `stind.ref` for reference types
    pub fn store_for_type(element: &CilType) -> Option<u8> {
        match element.primitive_kind().and_then(Self::store) {
            Some(opcode) => Some(opcode),
            None if element.flavor.is_reference_type() => Some(STIND_REF),
            None => None,
        }
    }

    /// Number of primitive kinds with by-reference access
    pub fn len() -> usize {
        Self::table().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::metadata::typesystem::TypeRegistry;

    #[test]
    fn test_table_matches_cil_widths() {
        assert_eq!(ByRefAccessStrategy::len(), 12);

        let expected = [
            (CilPrimitiveKind::Boolean, LDIND_I1, STIND_I1),
            (CilPrimitiveKind::U1, LDIND_U1, STIND_I1),
            (CilPrimitiveKind::I1, LDIND_I1, STIND_I1),
            (CilPrimitiveKind::I2, LDIND_I2, STIND_I2),
            (CilPrimitiveKind::U2, LDIND_U2, STIND_I2),
            (CilPrimitiveKind::I4, LDIND_I4, STIND_I4),
            (CilPrimitiveKind::U4, LDIND_U4, STIND_I4),
            (CilPrimitiveKind::I8, LDIND_I8, STIND_I8),
            (CilPrimitiveKind::U8, LDIND_I8, STIND_I8),
            (CilPrimitiveKind::Char, LDIND_U2, STIND_I2),
            (CilPrimitiveKind::R8, LDIND_R8, STIND_R8),
            (CilPrimitiveKind::R4, LDIND_R4, STIND_R4),
        ];
        for (kind, load, store) in expected {
            assert_eq!(
                ByRefAccessStrategy::get(kind),
                Some(ByRefAccess { load, store }),
                "{kind:?}"
            );
        }
    }

    #[test]
    fn test_uint64_shares_int64_load() {
        assert_eq!(
            ByRefAccessStrategy::load(CilPrimitiveKind::U8),
            ByRefAccessStrategy::load(CilPrimitiveKind::I8)
        );
    }

    #[test]
    fn test_non_value_kinds() {
        assert_eq!(ByRefAccessStrategy::get(CilPrimitiveKind::Void), None);
        assert_eq!(ByRefAccessStrategy::get(CilPrimitiveKind::String), None);
        assert_eq!(ByRefAccessStrategy::get(CilPrimitiveKind::Object), None);
    }

    #[test]
    fn test_for_type_falls_back_to_ref() {
        let registry = TypeRegistry::default();
        let string = registry.get_primitive(CilPrimitiveKind::String).unwrap();
        let int = registry.get_primitive(CilPrimitiveKind::I4).unwrap();
        let void = registry.get_primitive(CilPrimitiveKind::Void).unwrap();
        let int_ref = registry.by_ref(&int).unwrap();

        assert_eq!(ByRefAccessStrategy::load_for_type(&string), Some(LDIND_REF));
        assert_eq!(ByRefAccessStrategy::store_for_type(&string), Some(STIND_REF));
        assert_eq!(ByRefAccessStrategy::load_for_type(&int), Some(LDIND_I4));
        assert_eq!(ByRefAccessStrategy::load_for_type(&void), None);
        assert_eq!(ByRefAccessStrategy::store_for_type(&int_ref), None);
    }
}
