//! FILENAME: core/data-provider/src/provider/changes.rs
//! PURPOSE: Incremental maintenance of the view between full refreshes.
//! CONTEXT: Source notifications are either applied to the engine at once
//! (provider `Ready`) or queued until the running rebuild completes. Items
//! under edit buffer their property changes until resumed.

use std::slice;
use std::sync::{Arc, Weak};

use data_model::{DataError, ItemRef, SettingsChange};

use super::state::{PendingChange, SuspendBuffer};
use super::Shared;
use crate::engine::AddRemoveResult;
use crate::events::{CollectionChange, ProviderEvent, ViewChangedEvent, ViewChangingEvent};
use crate::snapshot::DataChangeFlags;
use crate::source::{BatchLoadingStatus, CollectionAction, CollectionChangedArgs, SourceObserver};
use crate::status::DataProviderStatus;
use crate::{log_debug, log_info, log_warn};

// ============================================================================
// SOURCE OBSERVER
// ============================================================================

/// Subscription handed to a source view. Notifications from a source that
/// has since been replaced are recognised by `generation` and dropped.
pub(crate) struct SourceListener {
    pub shared: Weak<Shared>,
    pub generation: u64,
}

impl SourceObserver for SourceListener {
    fn collection_changing(&self, args: &CollectionChangedArgs) {
        if let Some(shared) = self.shared.upgrade() {
            shared.on_collection_changing(self.generation, args);
        }
    }

    fn collection_changed(&self, args: &CollectionChangedArgs) {
        if let Some(shared) = self.shared.upgrade() {
            if shared.state.lock().is_current_source(self.generation) {
                shared.enqueue_or_process(PendingChange::Collection(args.clone()));
            }
        }
    }

    fn item_property_changed(&self, item: &ItemRef, property: &str) {
        if let Some(shared) = self.shared.upgrade() {
            shared.on_item_property_changed(self.generation, item, property);
        }
    }

    fn current_changed(&self, current: Option<&ItemRef>) {
        if let Some(shared) = self.shared.upgrade() {
            if shared.state.lock().is_current_source(self.generation) {
                shared.events.current_changed.emit(&current.cloned());
            }
        }
    }
}

impl Shared {
    fn on_collection_changing(&self, generation: u64, args: &CollectionChangedArgs) {
        let view = {
            let st = self.state.lock();
            if !st.is_current_source(generation) {
                return;
            }
            st.source_view()
        };
        let (action, items) = match args.action {
            CollectionAction::Add => (CollectionChange::ItemInserted, args.new_items.clone()),
            CollectionAction::Remove => (CollectionChange::ItemRemoved, args.old_items.clone()),
            CollectionAction::Reset => (CollectionChange::Reset, Vec::new()),
            CollectionAction::Move | CollectionAction::Replace => return,
        };

        if self.events.view_changing.has_listeners() {
            self.events.view_changing.emit(&ViewChangingEvent { items, action });
        } else if matches!(action, CollectionChange::ItemRemoved | CollectionChange::Reset) {
            // Nobody needs the pre-change state, let the source commit now.
            if let Some(view) = view {
                view.process_pending_collection_change();
            }
        }
    }

    fn on_item_property_changed(&self, generation: u64, item: &ItemRef, property: &str) {
        {
            let mut st = self.state.lock();
            if !st.is_current_source(generation) || st.refresh_requested {
                return;
            }
            if let Some(buffer) = st.suspended.get_mut(&item.id()) {
                log_debug!("PROVIDER", "buffering {} for suspended item {}", property, item.id());
                buffer.properties.push(property.to_string());
                return;
            }
        }
        self.enqueue_or_process(PendingChange::Property {
            item: item.clone(),
            property: property.to_string(),
        });
    }

    pub(crate) fn on_batch_status(&self, generation: u64, status: &BatchLoadingStatus) {
        let mut out = Vec::new();
        {
            let mut st = self.state.lock();
            if !st.is_current_source(generation) {
                return;
            }
            log_info!("SOURCE", "batch loader: {:?}", status);
            match status {
                BatchLoadingStatus::ItemsRequested => {
                    st.set_status(DataProviderStatus::RequestingData, false, None, &mut out);
                }
                BatchLoadingStatus::ItemsLoaded => {
                    st.set_status(DataProviderStatus::DataLoadingCompleted, true, None, &mut out);
                }
                BatchLoadingStatus::ItemsLoadFailed(message) => {
                    let error = DataError::BatchLoad(message.clone());
                    st.set_status(DataProviderStatus::Faulted, false, Some(error), &mut out);
                }
            }
        }
        self.flush(out);
        if *status == BatchLoadingStatus::ItemsLoaded {
            self.invalidate(DataChangeFlags::BATCH);
        }
    }

    /// Applies a change now when the provider is `Ready`, queues it
    /// otherwise. Dropped while a full refresh is pending.
    pub(crate) fn enqueue_or_process(&self, change: PendingChange) {
        {
            let st = self.state.lock();
            if st.refresh_requested || st.source.is_none() {
                log_debug!("PROVIDER", "full refresh pending, dropping incremental change");
                return;
            }
        }
        let _gate = self.gate.enter();
        {
            let mut st = self.state.lock();
            if st.status != DataProviderStatus::Ready {
                st.pending.push_back(change);
                log_debug!("PROVIDER", "queued change, {} pending", st.pending.len());
                return;
            }
        }
        self.process_change(change);
    }

    pub(crate) fn process_change(&self, change: PendingChange) {
        match change {
            PendingChange::Collection(args) => self.process_collection_change(args),
            PendingChange::Property { item, property } => {
                // The item may have gone under edit while the change was queued.
                {
                    let mut st = self.state.lock();
                    if let Some(buffer) = st.suspended.get_mut(&item.id()) {
                        log_debug!("PROVIDER", "buffering queued {} for item {}", property, item.id());
                        buffer.properties.push(property);
                        return;
                    }
                }
                self.process_property_change(&item, &property)
            }
        }
    }

    fn process_collection_change(&self, args: CollectionChangedArgs) {
        if self.state.lock().descriptions.is_none() {
            log_warn!("FIELDS", "structural change without field descriptions, re-deriving");
            self.reset_descriptions();
            return;
        }

        match args.action {
            CollectionAction::Add => {
                let inserted = self.engine.insert(args.new_index, &args.new_items);
                self.publish_view(inserted, CollectionChange::ItemInserted);
            }
            CollectionAction::Remove => {
                let removed = self.engine.remove(args.old_index, &args.old_items, false, true);
                self.publish_view(removed, CollectionChange::ItemRemoved);
            }
            CollectionAction::Move | CollectionAction::Replace => {
                let removed = self.engine.remove(args.old_index, &args.old_items, false, true);
                self.publish_view(removed, CollectionChange::ItemRemoved);
                let inserted = self.engine.insert(args.new_index, &args.new_items);
                self.publish_view(inserted, CollectionChange::ItemInserted);
            }
            CollectionAction::Reset => self.reset_view(),
        }
    }

    /// A member of one item changed. Members that shape the view (sort,
    /// group, aggregate, or any active filter) force a remove + reinsert.
    fn process_property_change(&self, item: &ItemRef, property: &str) {
        let (sorted, grouped, aggregated, filtered, view) = {
            let st = self.state.lock();
            let s = &st.settings;
            (
                s.sorts().contains_property(property),
                s.row_groups().contains_property(property)
                    || s.column_groups().contains_property(property),
                s.aggregates().contains_property(property),
                !s.filters().is_empty(),
                st.source_view(),
            )
        };

        if !(sorted || grouped || aggregated || filtered) {
            self.publish_view(Vec::new(), CollectionChange::ItemChanged);
            return;
        }

        let index = if sorted || grouped || aggregated {
            None
        } else {
            view.as_ref().and_then(|v| v.index_of(item))
        };
        let exhaustive = filtered || grouped || sorted;
        log_debug!(
            "PROVIDER",
            "reinserting item {} after {} changed (exhaustive={})",
            item.id(),
            property,
            exhaustive
        );

        let removed = self.engine.remove(index, slice::from_ref(item), exhaustive, false);
        self.publish_view(removed, CollectionChange::ItemRemoved);
        let position = view.as_ref().and_then(|v| v.index_of(item));
        let inserted = self.engine.insert(position, slice::from_ref(item));
        self.publish_view(inserted, CollectionChange::ItemInserted);
    }

    fn reset_view(&self) {
        let snapshot = {
            let mut st = self.state.lock();
            st.pending.clear();
            st.refresh_requested = true;
            st.clear_snapshot(DataChangeFlags::SOURCE)
        };
        log_info!("PROVIDER", "source reset, epoch={}", snapshot.epoch());
        self.engine.clear(snapshot);
        self.publish_view(Vec::new(), CollectionChange::Reset);
        self.invalidate(DataChangeFlags::SOURCE);
    }

    /// Forgets field metadata and derives it again from the source.
    fn reset_descriptions(&self) {
        let mut out = Vec::new();
        {
            let mut st = self.state.lock();
            st.pending.clear();
            st.clear_descriptions();
            st.invalidated = false;
            st.set_status(DataProviderStatus::Uninitialized, false, None, &mut out);
            out.push(ProviderEvent::FieldDescriptionsChanged);
        }
        self.flush(out);
        self.invalidate(DataChangeFlags::DESCRIPTIONS);
    }

    fn publish_view(&self, changes: Vec<AddRemoveResult>, action: CollectionChange) {
        self.events.emit(ProviderEvent::View(ViewChangedEvent { changes, action }));
    }

    // ========================================================================
    // EDIT PROTOCOL
    // ========================================================================

    pub(crate) fn suspend_property_changes(&self, item: &ItemRef) {
        let mut st = self.state.lock();
        st.suspended.entry(item.id()).or_insert_with(|| SuspendBuffer {
            item: item.clone(),
            properties: Vec::new(),
        });
    }

    /// Replays every buffered change in arrival order through the normal
    /// property-changed path.
    pub(crate) fn resume_property_changes(&self, item: &ItemRef) {
        let buffer = self.state.lock().suspended.remove(&item.id());
        let Some(buffer) = buffer else {
            return;
        };
        log_debug!(
            "PROVIDER",
            "resuming item {} with {} buffered change(s)",
            item.id(),
            buffer.properties.len()
        );
        for property in buffer.properties {
            self.enqueue_or_process(PendingChange::Property {
                item: Arc::clone(&buffer.item),
                property,
            });
        }
    }

    /// Republishes registry notifications raised inside `update_settings`
    /// and invalidates once for all of them.
    pub(crate) fn apply_settings_changes(&self, changes: Vec<SettingsChange>) {
        if changes.is_empty() {
            return;
        }
        log_debug!("SETTINGS", "{} change(s): {:?}", changes.len(), changes);
        self.flush(changes.into_iter().map(ProviderEvent::Layout).collect());
        self.invalidate(DataChangeFlags::SETTINGS);
    }
}
