//! FILENAME: core/data-model/src/settings.rs
//! PURPOSE: Observable registry of the rules that shape the view.
//! CONTEXT: Five descriptor lists plus two scalar options. Every effective
//! mutation raises `settings_changed` (consumed by the provider as an
//! invalidation trigger) followed by `layout_changed` (presentation only).

use std::sync::Arc;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::descriptors::{
    AggregateDescriptor, Descriptor, FilterDescriptor, GroupDescriptor, SortDescriptor,
};
use crate::error::{DataError, DataResult};
use crate::events::{EventHub, ListenerId};
use crate::fields::FieldInfoData;

/// Axis on which aggregate values are laid out when there are several.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DataAxis {
    Rows,
    #[default]
    Columns,
}

/// What part of the registry changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SettingsChange {
    Filters,
    RowGroups,
    ColumnGroups,
    Aggregates,
    Sorts,
    AggregatesPosition,
    AggregatesLevel,
}

/// The two notification channels of a registry.
#[derive(Debug, Default)]
pub struct SettingsNotifier {
    settings_changed: EventHub<SettingsChange>,
    layout_changed: EventHub<SettingsChange>,
    held: Mutex<HeldChanges>,
}

#[derive(Debug, Default)]
struct HeldChanges {
    depth: usize,
    changes: Vec<SettingsChange>,
}

impl SettingsNotifier {
    pub fn on_settings_changed<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&SettingsChange) + Send + Sync + 'static,
    {
        self.settings_changed.subscribe(listener)
    }

    pub fn on_layout_changed<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&SettingsChange) + Send + Sync + 'static,
    {
        self.layout_changed.subscribe(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.settings_changed.unsubscribe(id) || self.layout_changed.unsubscribe(id)
    }

    /// Buffers notifications until the matching `release`. Holds nest.
    pub fn hold(&self) {
        self.held.lock().depth += 1;
    }

    /// Ends a hold. The outermost release delivers everything buffered, in
    /// the order it was raised.
    pub fn release(&self) {
        let changes = {
            let mut held = self.held.lock();
            held.depth = held.depth.saturating_sub(1);
            if held.depth > 0 {
                return;
            }
            std::mem::take(&mut held.changes)
        };
        for change in changes {
            self.emit(change);
        }
    }

    fn notify(&self, change: SettingsChange) {
        {
            let mut held = self.held.lock();
            if held.depth > 0 {
                held.changes.push(change);
                return;
            }
        }
        self.emit(change);
    }

    fn emit(&self, change: SettingsChange) {
        self.settings_changed.emit(&change);
        self.layout_changed.emit(&change);
    }
}

// ============================================================================
// DESCRIPTOR LIST
// ============================================================================

/// Ordered descriptor collection that reports every mutation.
#[derive(Debug)]
pub struct DescriptorList<T> {
    items: Vec<T>,
    kind: SettingsChange,
    notifier: Arc<SettingsNotifier>,
}

impl<T: Descriptor> DescriptorList<T> {
    fn new(kind: SettingsChange, notifier: Arc<SettingsNotifier>) -> Self {
        DescriptorList {
            items: Vec::new(),
            kind,
            notifier,
        }
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        self.items.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, T> {
        self.items.iter()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.items
    }

    /// Whether any descriptor reads `property`.
    pub fn contains_property(&self, property: &str) -> bool {
        self.items.iter().any(|d| d.property() == property)
    }

    pub fn push(&mut self, descriptor: T) {
        self.items.push(descriptor);
        self.notifier.notify(self.kind);
    }

    pub fn insert(&mut self, index: usize, descriptor: T) -> DataResult<()> {
        self.check_index(index, self.items.len() + 1)?;
        self.items.insert(index, descriptor);
        self.notifier.notify(self.kind);
        Ok(())
    }

    pub fn remove(&mut self, index: usize) -> DataResult<T> {
        self.check_index(index, self.items.len())?;
        let removed = self.items.remove(index);
        self.notifier.notify(self.kind);
        Ok(removed)
    }

    pub fn replace(&mut self, index: usize, descriptor: T) -> DataResult<T> {
        self.check_index(index, self.items.len())?;
        let old = std::mem::replace(&mut self.items[index], descriptor);
        self.notifier.notify(self.kind);
        Ok(old)
    }

    /// Edits a descriptor in place and reports it as one change.
    pub fn update<F>(&mut self, index: usize, edit: F) -> DataResult<()>
    where
        F: FnOnce(&mut T),
    {
        self.check_index(index, self.items.len())?;
        edit(&mut self.items[index]);
        self.notifier.notify(self.kind);
        Ok(())
    }

    /// Clearing an empty list is not a change.
    pub fn clear(&mut self) {
        if self.items.is_empty() {
            return;
        }
        self.items.clear();
        self.notifier.notify(self.kind);
    }

    /// Binding attaches accessors only and raises nothing.
    fn bind_all(&mut self, fields: &FieldInfoData) {
        for descriptor in &mut self.items {
            descriptor.bind(fields);
        }
    }

    fn check_index(&self, index: usize, limit: usize) -> DataResult<()> {
        if index < limit {
            Ok(())
        } else {
            Err(DataError::IndexOutOfRange {
                index,
                len: self.items.len(),
            })
        }
    }
}

impl<'a, T: Descriptor> IntoIterator for &'a DescriptorList<T> {
    type Item = &'a T;
    type IntoIter = std::slice::Iter<'a, T>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

// ============================================================================
// DATA SETTINGS
// ============================================================================

#[derive(Debug)]
pub struct DataSettings {
    filters: DescriptorList<FilterDescriptor>,
    row_groups: DescriptorList<GroupDescriptor>,
    column_groups: DescriptorList<GroupDescriptor>,
    aggregates: DescriptorList<AggregateDescriptor>,
    sorts: DescriptorList<SortDescriptor>,
    aggregates_position: DataAxis,
    aggregates_level: Option<usize>,
    notifier: Arc<SettingsNotifier>,
}

impl Default for DataSettings {
    fn default() -> Self {
        Self::new()
    }
}

impl DataSettings {
    pub fn new() -> Self {
        let notifier = Arc::new(SettingsNotifier::default());
        DataSettings {
            filters: DescriptorList::new(SettingsChange::Filters, Arc::clone(&notifier)),
            row_groups: DescriptorList::new(SettingsChange::RowGroups, Arc::clone(&notifier)),
            column_groups: DescriptorList::new(SettingsChange::ColumnGroups, Arc::clone(&notifier)),
            aggregates: DescriptorList::new(SettingsChange::Aggregates, Arc::clone(&notifier)),
            sorts: DescriptorList::new(SettingsChange::Sorts, Arc::clone(&notifier)),
            aggregates_position: DataAxis::default(),
            aggregates_level: None,
            notifier,
        }
    }

    pub fn notifier(&self) -> &Arc<SettingsNotifier> {
        &self.notifier
    }

    pub fn filters(&self) -> &DescriptorList<FilterDescriptor> {
        &self.filters
    }

    pub fn filters_mut(&mut self) -> &mut DescriptorList<FilterDescriptor> {
        &mut self.filters
    }

    pub fn row_groups(&self) -> &DescriptorList<GroupDescriptor> {
        &self.row_groups
    }

    pub fn row_groups_mut(&mut self) -> &mut DescriptorList<GroupDescriptor> {
        &mut self.row_groups
    }

    pub fn column_groups(&self) -> &DescriptorList<GroupDescriptor> {
        &self.column_groups
    }

    pub fn column_groups_mut(&mut self) -> &mut DescriptorList<GroupDescriptor> {
        &mut self.column_groups
    }

    pub fn aggregates(&self) -> &DescriptorList<AggregateDescriptor> {
        &self.aggregates
    }

    pub fn aggregates_mut(&mut self) -> &mut DescriptorList<AggregateDescriptor> {
        &mut self.aggregates
    }

    pub fn sorts(&self) -> &DescriptorList<SortDescriptor> {
        &self.sorts
    }

    pub fn sorts_mut(&mut self) -> &mut DescriptorList<SortDescriptor> {
        &mut self.sorts
    }

    pub fn aggregates_position(&self) -> DataAxis {
        self.aggregates_position
    }

    pub fn set_aggregates_position(&mut self, axis: DataAxis) {
        if self.aggregates_position != axis {
            self.aggregates_position = axis;
            self.notifier.notify(SettingsChange::AggregatesPosition);
        }
    }

    /// Group level at which aggregates are laid out. `None` places them
    /// after the last group level.
    pub fn aggregates_level(&self) -> Option<usize> {
        self.aggregates_level
    }

    pub fn set_aggregates_level(&mut self, level: Option<usize>) {
        if self.aggregates_level != level {
            self.aggregates_level = level;
            self.notifier.notify(SettingsChange::AggregatesLevel);
        }
    }

    /// Resolves accessors for every descriptor in every list.
    pub fn bind_all(&mut self, fields: &FieldInfoData) {
        self.filters.bind_all(fields);
        self.row_groups.bind_all(fields);
        self.column_groups.bind_all(fields);
        self.aggregates.bind_all(fields);
        self.sorts.bind_all(fields);
    }
}
