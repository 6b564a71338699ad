//! FILENAME: core/data-provider/src/snapshot.rs
//! PURPOSE: Immutable per-refresh copy of the view rules.
//! CONTEXT: The engine may compute on another thread while the owner keeps
//! editing the settings registry. Every refresh therefore deep-clones the
//! descriptor lists into a `RefreshSnapshot` and the engine reads only
//! through the `ValueProvider` trait it implements.

use std::cmp::Ordering;
use std::sync::Arc;

use bitflags::bitflags;
use data_model::{
    AggregateDescriptor, AggregateValue, DataAxis, DataError, DataItem, DataResult, DataSettings,
    Descriptor, FilterDescriptor, GroupDescriptor, ItemRef, SortDescriptor, SortOrder, Value,
};
use smallvec::SmallVec;

/// Group names of an item, outermost level first.
pub type GroupPath = SmallVec<[Value; 4]>;

bitflags! {
    /// Why a refresh was requested.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct DataChangeFlags: u8 {
        const SOURCE = 1 << 0;
        const SETTINGS = 1 << 1;
        const DESCRIPTIONS = 1 << 2;
        const BATCH = 1 << 3;
    }
}

/// Compares items by the cloned sort descriptors, first key first.
#[derive(Debug, Clone)]
pub struct SortComparer {
    sorts: Arc<[SortDescriptor]>,
}

impl SortComparer {
    pub fn new(sorts: Vec<SortDescriptor>) -> Self {
        SortComparer { sorts: sorts.into() }
    }

    pub fn is_empty(&self) -> bool {
        self.sorts.is_empty()
    }

    pub fn compare(&self, a: &dyn DataItem, b: &dyn DataItem) -> Ordering {
        self.sorts
            .iter()
            .map(|s| s.compare(a, b))
            .find(|o| *o != Ordering::Equal)
            .unwrap_or(Ordering::Equal)
    }
}

/// Read access to the view rules for the duration of one computation.
pub trait ValueProvider: Send + Sync {
    fn row_group_names(&self, item: &dyn DataItem) -> GroupPath;

    fn column_group_names(&self, item: &dyn DataItem) -> GroupPath;

    /// Sort order of group names at `level`, if that level exists.
    fn row_group_sort_order(&self, level: usize) -> Option<SortOrder>;

    fn column_group_sort_order(&self, level: usize) -> Option<SortOrder>;

    fn aggregate_descriptors(&self) -> &[AggregateDescriptor];

    /// Member value feeding aggregate `aggregate_index` for `item`.
    fn aggregate_value(&self, aggregate_index: usize, item: &dyn DataItem) -> Value;

    /// Fresh accumulator for aggregate `aggregate_index`.
    fn create_aggregate(&self, aggregate_index: usize) -> Option<AggregateValue>;

    fn aggregate_format(&self, aggregate_index: usize) -> Option<&str>;

    fn filters_count(&self) -> usize;

    /// One value per filter descriptor, in descriptor order.
    fn filter_items(&self, item: &dyn DataItem) -> SmallVec<[Value; 4]>;

    /// Tests values produced by `filter_items`. Fails when the number of
    /// values does not match the number of filters.
    fn passes_filter(&self, filter_items: &[Value]) -> DataResult<bool>;

    fn sort_comparer(&self) -> &SortComparer;
}

#[derive(Debug)]
pub struct RefreshSnapshot {
    epoch: u64,
    flags: DataChangeFlags,
    items: Vec<ItemRef>,
    filters: Vec<FilterDescriptor>,
    row_groups: Vec<GroupDescriptor>,
    column_groups: Vec<GroupDescriptor>,
    aggregates: Vec<AggregateDescriptor>,
    comparer: SortComparer,
    aggregates_position: DataAxis,
    aggregates_level: Option<usize>,
}

impl RefreshSnapshot {
    /// Clones the current registry contents. Descriptors keep whatever
    /// accessors they were bound to at capture time.
    pub fn capture(
        settings: &DataSettings,
        items: Vec<ItemRef>,
        epoch: u64,
        flags: DataChangeFlags,
    ) -> Self {
        RefreshSnapshot {
            epoch,
            flags,
            items,
            filters: settings.filters().as_slice().to_vec(),
            row_groups: settings.row_groups().as_slice().to_vec(),
            column_groups: settings.column_groups().as_slice().to_vec(),
            aggregates: settings.aggregates().as_slice().to_vec(),
            comparer: SortComparer::new(settings.sorts().as_slice().to_vec()),
            aggregates_position: settings.aggregates_position(),
            aggregates_level: settings.aggregates_level(),
        }
    }

    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    pub fn flags(&self) -> DataChangeFlags {
        self.flags
    }

    /// Source items as they were when the refresh started.
    pub fn items(&self) -> &[ItemRef] {
        &self.items
    }

    pub fn filters(&self) -> &[FilterDescriptor] {
        &self.filters
    }

    pub fn row_groups(&self) -> &[GroupDescriptor] {
        &self.row_groups
    }

    pub fn column_groups(&self) -> &[GroupDescriptor] {
        &self.column_groups
    }

    pub fn aggregates_position(&self) -> DataAxis {
        self.aggregates_position
    }

    pub fn aggregates_level(&self) -> Option<usize> {
        self.aggregates_level
    }
}

impl ValueProvider for RefreshSnapshot {
    fn row_group_names(&self, item: &dyn DataItem) -> GroupPath {
        self.row_groups.iter().map(|g| g.group_name(item)).collect()
    }

    fn column_group_names(&self, item: &dyn DataItem) -> GroupPath {
        self.column_groups.iter().map(|g| g.group_name(item)).collect()
    }

    fn row_group_sort_order(&self, level: usize) -> Option<SortOrder> {
        self.row_groups.get(level).map(|g| g.sort_order)
    }

    fn column_group_sort_order(&self, level: usize) -> Option<SortOrder> {
        self.column_groups.get(level).map(|g| g.sort_order)
    }

    fn aggregate_descriptors(&self) -> &[AggregateDescriptor] {
        &self.aggregates
    }

    fn aggregate_value(&self, aggregate_index: usize, item: &dyn DataItem) -> Value {
        self.aggregates
            .get(aggregate_index)
            .map(|a| a.value_of(item))
            .unwrap_or_default()
    }

    fn create_aggregate(&self, aggregate_index: usize) -> Option<AggregateValue> {
        self.aggregates
            .get(aggregate_index)
            .map(|a| AggregateValue::new(a.function))
    }

    fn aggregate_format(&self, aggregate_index: usize) -> Option<&str> {
        self.aggregates.get(aggregate_index)?.string_format.as_deref()
    }

    fn filters_count(&self) -> usize {
        self.filters.len()
    }

    fn filter_items(&self, item: &dyn DataItem) -> SmallVec<[Value; 4]> {
        self.filters.iter().map(|f| f.filter_item(item)).collect()
    }

    fn passes_filter(&self, filter_items: &[Value]) -> DataResult<bool> {
        if filter_items.len() != self.filters.len() {
            return Err(DataError::FilterArity {
                expected: self.filters.len(),
                actual: filter_items.len(),
            });
        }
        Ok(self
            .filters
            .iter()
            .zip(filter_items)
            .all(|(filter, value)| filter.passes(value)))
    }

    fn sort_comparer(&self) -> &SortComparer {
        &self.comparer
    }
}
