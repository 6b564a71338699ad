//! FILENAME: core/data-model/src/lib.rs
//! Shared data types for the data view coordinator: values, items, field
//! metadata, descriptors and the observable settings registry.

pub mod aggregate;
pub mod descriptors;
pub mod error;
pub mod events;
pub mod fields;
pub mod item;
pub mod settings;
pub mod value;

pub use aggregate::AggregateValue;
pub use descriptors::{
    AggregateDescriptor, AggregateFunction, ComparisonOperator, Descriptor, FilterCondition,
    FilterDescriptor, GroupDescriptor, SortDescriptor, SortOrder, TextOperator,
};
pub use error::{DataError, DataResult};
pub use events::{EventHub, ListenerId};
pub use fields::{FieldAccessor, FieldInfo, FieldInfoData};
pub use item::{DataItem, FieldType, ItemId, ItemRef, Record, Schema};
pub use settings::{DataAxis, DataSettings, DescriptorList, SettingsChange, SettingsNotifier};
pub use value::{OrderedFloat, Value};
