//! Heap objects: class instances and arrays.

use std::sync::{Arc, RwLock};

use dashmap::DashMap;

use crate::{metadata::typesystem::CilTypeRc, runtime::Value, Error, Result};

/// Reference to an `Object`
pub type ObjectRef = Arc<Object>;
/// Reference to an `Array`
pub type ArrayRef = Arc<Array>;

/// An instance of a class.
///
/// Besides its runtime type an object carries a named field store. Host types use it from
/// their native members to keep per-instance state (backing fields, change tracking).
pub struct Object {
    object_type: CilTypeRc,
    fields: DashMap<String, Value>,
}

impl Object {
    /// Allocate an instance of `object_type` with no fields set
    pub fn new(object_type: &CilTypeRc) -> ObjectRef {
        Arc::new(Object {
            object_type: object_type.clone(),
            fields: DashMap::new(),
        })
    }

    /// The runtime type of this instance
    pub fn object_type(&self) -> &CilTypeRc {
        &self.object_type
    }

    /// Read a field, `Null` if it was never written
    pub fn field(&self, name: &str) -> Value {
        self.fields
            .get(name)
            .map(|entry| entry.value().clone())
            .unwrap_or(Value::Null)
    }

    /// Write a field
    pub fn set_field(&self, name: &str, value: impl Into<Value>) {
        self.fields.insert(name.to_string(), value.into());
    }

    /// Remove all fields
    pub fn clear_fields(&self) {
        self.fields.clear();
    }
}

/// A single-dimensional, zero-based array
pub struct Array {
    element: CilTypeRc,
    items: RwLock<Vec<Value>>,
}

impl Array {
    /// Allocate an array of `len` zero values of `element`
    pub fn new(element: &CilTypeRc, len: usize) -> ArrayRef {
        Arc::new(Array {
            element: element.clone(),
            items: RwLock::new(vec![Value::default_for(element); len]),
        })
    }

    /// Wrap existing values
    pub fn from_values(element: &CilTypeRc, values: Vec<Value>) -> ArrayRef {
        Arc::new(Array {
            element: element.clone(),
            items: RwLock::new(values),
        })
    }

    /// The element type
    pub fn element_type(&self) -> &CilTypeRc {
        &self.element
    }

    /// Number of elements
    pub fn len(&self) -> usize {
        read_lock!(self.items).len()
    }

    /// Returns true if the array has no elements
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Read the element at `index`
    ///
    /// # Errors
    /// Returns [`Error::Thrown`] if `index` is out of range.
    pub fn get(&self, index: usize) -> Result<Value> {
        read_lock!(self.items)
            .get(index)
            .cloned()
            .ok_or_else(|| Self::out_of_range(index))
    }

    /// Write the element at `index`
    ///
    /// # Errors
    /// Returns [`Error::Thrown`] if `index` is out of range.
    pub fn set(&self, index: usize, value: Value) -> Result<()> {
        let mut items = write_lock!(self.items);
        let item = items
            .get_mut(index)
            .ok_or_else(|| Self::out_of_range(index))?;
        *item = value;
        Ok(())
    }

    /// Copy of all elements
    pub fn to_vec(&self) -> Vec<Value> {
        read_lock!(self.items).clone()
    }

    fn out_of_range(index: usize) -> Error {
        Error::Thrown {
            method: "System.Array".to_string(),
            message: format!("Index {index} was outside the bounds of the array"),
        }
    }
}
