//! FILENAME: core/data-model/src/fields.rs
//! PURPOSE: Field metadata discovered from an item source.
//! CONTEXT: Descriptors name a member by string. Once metadata is known the
//! name is resolved to a `FieldAccessor` a single time, and every later read
//! goes through the accessor.

use std::fmt;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::item::{DataItem, FieldType, Schema};
use crate::value::Value;

type Getter = dyn Fn(&dyn DataItem) -> Value + Send + Sync;

/// Resolved read access to one member of an item.
#[derive(Clone)]
pub struct FieldAccessor {
    getter: Arc<Getter>,
}

impl FieldAccessor {
    pub fn new<F>(getter: F) -> Self
    where
        F: Fn(&dyn DataItem) -> Value + Send + Sync + 'static,
    {
        FieldAccessor {
            getter: Arc::new(getter),
        }
    }

    /// Accessor reading the schema slot at `index`.
    pub fn indexed(index: usize) -> Self {
        FieldAccessor::new(move |item| item.value_at(index))
    }

    pub fn get(&self, item: &dyn DataItem) -> Value {
        (self.getter)(item)
    }
}

impl fmt::Debug for FieldAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("FieldAccessor")
    }
}

/// Metadata for one member of the source items.
#[derive(Debug, Clone)]
pub struct FieldInfo {
    pub name: String,
    pub display_name: String,
    pub field_type: FieldType,
    pub accessor: FieldAccessor,
}

impl FieldInfo {
    pub fn new(name: impl Into<String>, field_type: FieldType, accessor: FieldAccessor) -> Self {
        let name = name.into();
        FieldInfo {
            display_name: name.clone(),
            name,
            field_type,
            accessor,
        }
    }

    pub fn is_numeric(&self) -> bool {
        self.field_type == FieldType::Number
    }
}

/// All fields known for the current item source, indexed by member name.
#[derive(Debug, Clone, Default)]
pub struct FieldInfoData {
    fields: Vec<FieldInfo>,
    by_name: FxHashMap<String, usize>,
}

impl FieldInfoData {
    pub fn new(fields: Vec<FieldInfo>) -> Self {
        let by_name = fields
            .iter()
            .enumerate()
            .map(|(i, f)| (f.name.clone(), i))
            .collect();
        FieldInfoData { fields, by_name }
    }

    /// One indexed accessor per schema member.
    pub fn from_schema(schema: &Schema) -> Self {
        let fields = schema
            .fields()
            .enumerate()
            .map(|(i, (name, ty))| FieldInfo::new(name, ty, FieldAccessor::indexed(i)))
            .collect();
        FieldInfoData::new(fields)
    }

    pub fn get(&self, name: &str) -> Option<&FieldInfo> {
        self.by_name.get(name).map(|&i| &self.fields[i])
    }

    pub fn fields(&self) -> &[FieldInfo] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}
