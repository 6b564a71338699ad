//! FILENAME: core/data-model/src/descriptors.rs
//! PURPOSE: Filter, sort, group and aggregate descriptors.
//! CONTEXT: A descriptor names a source member by string and stays unbound
//! until field metadata arrives. Binding attaches a resolved accessor so the
//! engine never looks a member up by name while computing.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

use crate::fields::{FieldAccessor, FieldInfoData};
use crate::item::DataItem;
use crate::value::Value;

// ============================================================================
// ENUMS
// ============================================================================

/// Direction used for sorting items and group names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

impl SortOrder {
    pub fn apply(self, ordering: Ordering) -> Ordering {
        match self {
            SortOrder::Ascending => ordering,
            SortOrder::Descending => ordering.reverse(),
        }
    }
}

/// Aggregation functions for value descriptors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum AggregateFunction {
    #[default]
    Sum,
    Count,
    Average,
    Min,
    Max,
    CountNumbers,
    StdDev,
    StdDevP,
    Var,
    VarP,
    Product,
}

impl AggregateFunction {
    pub const ALL: [AggregateFunction; 11] = [
        AggregateFunction::Sum,
        AggregateFunction::Count,
        AggregateFunction::Average,
        AggregateFunction::Min,
        AggregateFunction::Max,
        AggregateFunction::CountNumbers,
        AggregateFunction::StdDev,
        AggregateFunction::StdDevP,
        AggregateFunction::Var,
        AggregateFunction::VarP,
        AggregateFunction::Product,
    ];

    pub fn display_name(&self) -> &'static str {
        match self {
            AggregateFunction::Sum => "Sum",
            AggregateFunction::Count => "Count",
            AggregateFunction::Average => "Average",
            AggregateFunction::Min => "Min",
            AggregateFunction::Max => "Max",
            AggregateFunction::CountNumbers => "Count Numbers",
            AggregateFunction::StdDev => "StdDev",
            AggregateFunction::StdDevP => "StdDevP",
            AggregateFunction::Var => "Var",
            AggregateFunction::VarP => "VarP",
            AggregateFunction::Product => "Product",
        }
    }
}

/// Numeric comparison operators for filters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOperator {
    Equals,
    NotEquals,
    GreaterThan,
    GreaterThanOrEqual,
    LessThan,
    LessThanOrEqual,
    Between,
    NotBetween,
}

/// Text filter operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TextOperator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    BeginsWith,
    EndsWith,
}

/// Condition an item's member value must satisfy to stay in the view.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum FilterCondition {
    /// Include only these specific values.
    ValueList(Vec<Value>),

    NumberFilter {
        operator: ComparisonOperator,
        value: f64,
        /// Second bound for Between/NotBetween.
        value2: Option<f64>,
    },

    TextFilter {
        operator: TextOperator,
        value: String,
        case_sensitive: bool,
    },
}

impl Default for FilterCondition {
    fn default() -> Self {
        FilterCondition::ValueList(Vec::new())
    }
}

impl FilterCondition {
    pub fn matches(&self, value: &Value) -> bool {
        match self {
            FilterCondition::ValueList(values) => values.contains(value),
            FilterCondition::NumberFilter { operator, value: a, value2 } => {
                let Some(n) = value.as_number() else {
                    return false;
                };
                let b = value2.unwrap_or(*a);
                let (lo, hi) = if *a <= b { (*a, b) } else { (b, *a) };
                match operator {
                    ComparisonOperator::Equals => n == *a,
                    ComparisonOperator::NotEquals => n != *a,
                    ComparisonOperator::GreaterThan => n > *a,
                    ComparisonOperator::GreaterThanOrEqual => n >= *a,
                    ComparisonOperator::LessThan => n < *a,
                    ComparisonOperator::LessThanOrEqual => n <= *a,
                    ComparisonOperator::Between => n >= lo && n <= hi,
                    ComparisonOperator::NotBetween => n < lo || n > hi,
                }
            }
            FilterCondition::TextFilter { operator, value: pattern, case_sensitive } => {
                let text = value.to_string();
                let (text, pattern) = if *case_sensitive {
                    (text, pattern.clone())
                } else {
                    (text.to_lowercase(), pattern.to_lowercase())
                };
                match operator {
                    TextOperator::Equals => text == pattern,
                    TextOperator::NotEquals => text != pattern,
                    TextOperator::Contains => text.contains(&pattern),
                    TextOperator::NotContains => !text.contains(&pattern),
                    TextOperator::BeginsWith => text.starts_with(&pattern),
                    TextOperator::EndsWith => text.ends_with(&pattern),
                }
            }
        }
    }
}

// ============================================================================
// DESCRIPTOR TRAIT
// ============================================================================

/// Behavior shared by every descriptor kind.
pub trait Descriptor: Clone + std::fmt::Debug + Send + Sync + 'static {
    /// Name of the source member this descriptor reads.
    fn property(&self) -> &str;

    fn accessor(&self) -> Option<&FieldAccessor>;

    fn set_accessor(&mut self, accessor: Option<FieldAccessor>);

    fn is_bound(&self) -> bool {
        self.accessor().is_some()
    }

    /// Resolves the accessor from `fields`. Unknown members leave the
    /// descriptor unbound.
    fn bind(&mut self, fields: &FieldInfoData) -> bool {
        let accessor = fields.get(self.property()).map(|f| f.accessor.clone());
        let bound = accessor.is_some();
        self.set_accessor(accessor);
        bound
    }

    /// Reads the member through the bound accessor; unbound reads are empty.
    fn value_of(&self, item: &dyn DataItem) -> Value {
        self.accessor().map(|a| a.get(item)).unwrap_or_default()
    }
}

// ============================================================================
// DESCRIPTORS
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SortDescriptor {
    pub property: String,
    #[serde(default)]
    pub order: SortOrder,
    #[serde(skip)]
    accessor: Option<FieldAccessor>,
}

impl SortDescriptor {
    pub fn new(property: impl Into<String>, order: SortOrder) -> Self {
        SortDescriptor {
            property: property.into(),
            order,
            accessor: None,
        }
    }

    pub fn compare(&self, a: &dyn DataItem, b: &dyn DataItem) -> Ordering {
        self.order.apply(self.value_of(a).cmp(&self.value_of(b)))
    }
}

impl Descriptor for SortDescriptor {
    fn property(&self) -> &str {
        &self.property
    }

    fn accessor(&self) -> Option<&FieldAccessor> {
        self.accessor.as_ref()
    }

    fn set_accessor(&mut self, accessor: Option<FieldAccessor>) {
        self.accessor = accessor;
    }
}

/// Groups items by the value of a member. `sort_order` orders group names.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GroupDescriptor {
    pub property: String,
    #[serde(default)]
    pub sort_order: SortOrder,
    #[serde(skip)]
    accessor: Option<FieldAccessor>,
}

impl GroupDescriptor {
    pub fn new(property: impl Into<String>) -> Self {
        GroupDescriptor {
            property: property.into(),
            sort_order: SortOrder::Ascending,
            accessor: None,
        }
    }

    pub fn with_sort_order(mut self, sort_order: SortOrder) -> Self {
        self.sort_order = sort_order;
        self
    }

    /// Name of the group `item` falls into.
    pub fn group_name(&self, item: &dyn DataItem) -> Value {
        self.value_of(item)
    }
}

impl Descriptor for GroupDescriptor {
    fn property(&self) -> &str {
        &self.property
    }

    fn accessor(&self) -> Option<&FieldAccessor> {
        self.accessor.as_ref()
    }

    fn set_accessor(&mut self, accessor: Option<FieldAccessor>) {
        self.accessor = accessor;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateDescriptor {
    pub property: String,
    #[serde(default)]
    pub function: AggregateFunction,
    #[serde(default)]
    pub string_format: Option<String>,
    #[serde(skip)]
    accessor: Option<FieldAccessor>,
}

impl AggregateDescriptor {
    pub fn new(property: impl Into<String>, function: AggregateFunction) -> Self {
        AggregateDescriptor {
            property: property.into(),
            function,
            string_format: None,
            accessor: None,
        }
    }

    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.string_format = Some(format.into());
        self
    }
}

impl Descriptor for AggregateDescriptor {
    fn property(&self) -> &str {
        &self.property
    }

    fn accessor(&self) -> Option<&FieldAccessor> {
        self.accessor.as_ref()
    }

    fn set_accessor(&mut self, accessor: Option<FieldAccessor>) {
        self.accessor = accessor;
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterDescriptor {
    pub property: String,
    #[serde(default)]
    pub condition: FilterCondition,
    #[serde(skip)]
    accessor: Option<FieldAccessor>,
}

impl FilterDescriptor {
    pub fn new(property: impl Into<String>, condition: FilterCondition) -> Self {
        FilterDescriptor {
            property: property.into(),
            condition,
            accessor: None,
        }
    }

    /// The value the filter tests for `item`.
    pub fn filter_item(&self, item: &dyn DataItem) -> Value {
        self.value_of(item)
    }

    pub fn passes(&self, value: &Value) -> bool {
        self.condition.matches(value)
    }
}

impl Descriptor for FilterDescriptor {
    fn property(&self) -> &str {
        &self.property
    }

    fn accessor(&self) -> Option<&FieldAccessor> {
        self.accessor.as_ref()
    }

    fn set_accessor(&mut self, accessor: Option<FieldAccessor>) {
        self.accessor = accessor;
    }
}
