//! FILENAME: core/data-model/src/item.rs
//! PURPOSE: Data items as seen by the provider and the engine.
//! CONTEXT: Items are shared (`Arc<dyn DataItem>`) between the source view,
//! the pending-change queue and refresh snapshots. Identity is the `ItemId`,
//! never the pointer.

use std::fmt;
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;
use serde::{Deserialize, Serialize};

use crate::error::{DataError, DataResult};
use crate::value::Value;

/// Stable identity of an item across mutations.
pub type ItemId = u64;

/// Shared handle to an item.
pub type ItemRef = Arc<dyn DataItem>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum FieldType {
    Number,
    Text,
    Boolean,
    #[default]
    Unknown,
}

/// Ordered list of the members an item exposes.
#[derive(Debug, Clone, Default)]
pub struct Schema {
    fields: Vec<(String, FieldType)>,
    index: FxHashMap<String, usize>,
}

impl Schema {
    pub fn new<S: Into<String>>(fields: impl IntoIterator<Item = (S, FieldType)>) -> Self {
        let fields: Vec<(String, FieldType)> =
            fields.into_iter().map(|(name, ty)| (name.into(), ty)).collect();
        let index = fields
            .iter()
            .enumerate()
            .map(|(i, (name, _))| (name.clone(), i))
            .collect();
        Schema { fields, index }
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn fields(&self) -> impl Iterator<Item = (&str, FieldType)> {
        self.fields.iter().map(|(name, ty)| (name.as_str(), *ty))
    }
}

/// An item of the source collection.
pub trait DataItem: Send + Sync + fmt::Debug {
    fn id(&self) -> ItemId;

    fn schema(&self) -> Arc<Schema>;

    /// Value of the member at `index` in the schema. Out of range reads
    /// yield `Value::Empty`.
    fn value_at(&self, index: usize) -> Value;
}

/// Schema-backed item with interior-mutable values.
pub struct Record {
    id: ItemId,
    schema: Arc<Schema>,
    values: RwLock<Vec<Value>>,
}

impl Record {
    pub fn new(id: ItemId, schema: Arc<Schema>, values: Vec<Value>) -> Arc<Self> {
        let mut values = values;
        values.resize(schema.len(), Value::Empty);
        Arc::new(Record {
            id,
            schema,
            values: RwLock::new(values),
        })
    }

    pub fn get(&self, field: &str) -> Option<Value> {
        let index = self.schema.index_of(field)?;
        self.values.read().get(index).cloned()
    }

    /// Overwrites a member and returns the previous value.
    ///
    /// This only mutates the record. Whoever owns the collection is
    /// responsible for raising the property-changed notification.
    pub fn set(&self, field: &str, value: impl Into<Value>) -> DataResult<Value> {
        let index = self
            .schema
            .index_of(field)
            .ok_or_else(|| DataError::UnknownField(field.to_string()))?;
        let mut values = self.values.write();
        Ok(std::mem::replace(&mut values[index], value.into()))
    }
}

impl DataItem for Record {
    fn id(&self) -> ItemId {
        self.id
    }

    fn schema(&self) -> Arc<Schema> {
        Arc::clone(&self.schema)
    }

    fn value_at(&self, index: usize) -> Value {
        self.values.read().get(index).cloned().unwrap_or_default()
    }
}

impl fmt::Debug for Record {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Record")
            .field("id", &self.id)
            .field("values", &*self.values.read())
            .finish()
    }
}
