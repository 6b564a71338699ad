//! FILENAME: core/data-provider/src/provider/mod.rs
//! PURPOSE: The data view coordinator.
//! CONTEXT: `LocalDataProvider` binds a source view, a settings registry,
//! a field description provider and a computation engine. It owns the
//! status state machine, the pending-change queue and the defer/suspend
//! protocol, and republishes what happens as provider events.
//!
//! Locking: all mutable state sits behind one mutex that is never held
//! while calling the engine, the source, the field provider or a listener.
//! Drains of queued changes additionally hold the `IdleGate`.

mod changes;
mod refresh;
mod state;

use std::sync::{Arc, Weak};

use data_model::{
    AggregateDescriptor, AggregateFunction, DataError, DataResult, DataSettings, FieldInfo,
    FieldInfoData, FilterCondition, FilterDescriptor, GroupDescriptor, ItemRef, ListenerId,
    SettingsChange, SortDescriptor, SortOrder,
};
use parking_lot::Mutex;

use crate::config::ProviderConfig;
use crate::descriptions::FieldDescriptionProvider;
use crate::engine::{DataEngine, ExecutionMode};
use crate::events::{ProviderEvent, ProviderEvents, ViewChangedEvent, ViewChangingEvent};
use crate::gate::IdleGate;
use crate::snapshot::{DataChangeFlags, RefreshSnapshot};
use crate::source::SourceView;
use crate::status::{DataProviderStatus, StatusChangedEvent};
use crate::{log_debug, log_info};

use changes::SourceListener;
use state::{ProviderState, SourceBinding};

pub(crate) struct Shared {
    me: Weak<Shared>,
    state: Mutex<ProviderState>,
    gate: IdleGate,
    engine: Arc<dyn DataEngine>,
    events: ProviderEvents,
    /// Registry notifications collected while the settings are mutated.
    settings_inbox: Arc<Mutex<Vec<SettingsChange>>>,
}

pub struct LocalDataProvider {
    shared: Arc<Shared>,
}

/// Open defer scope. Dropping it closes the scope.
#[must_use = "the refresh is deferred only while the guard is alive"]
pub struct DeferGuard<'a> {
    shared: &'a Shared,
}

impl Drop for DeferGuard<'_> {
    fn drop(&mut self) {
        {
            let mut st = self.shared.state.lock();
            st.defer_level = st.defer_level.saturating_sub(1);
        }
        self.shared.on_edit_completed();
    }
}

impl LocalDataProvider {
    pub fn new(engine: Arc<dyn DataEngine>) -> Self {
        Self::with_settings(engine, DataSettings::new(), ProviderConfig::default())
    }

    pub fn with_config(engine: Arc<dyn DataEngine>, config: ProviderConfig) -> Self {
        Self::with_settings(engine, DataSettings::new(), config)
    }

    /// Builds a provider around an existing registry. The config's
    /// aggregate options override the registry's.
    pub fn with_settings(
        engine: Arc<dyn DataEngine>,
        settings: DataSettings,
        config: ProviderConfig,
    ) -> Self {
        let inbox = Arc::new(Mutex::new(Vec::new()));
        let state = ProviderState::new(settings, &config);
        let sink = Arc::clone(&inbox);
        state
            .settings
            .notifier()
            .on_settings_changed(move |change| sink.lock().push(*change));

        let shared = Arc::new_cyclic(|me| Shared {
            me: me.clone(),
            state: Mutex::new(state),
            gate: IdleGate::new(),
            engine: Arc::clone(&engine),
            events: ProviderEvents::default(),
            settings_inbox: inbox,
        });

        let weak = Arc::downgrade(&shared);
        engine.set_completion_handler(Arc::new(move |completion| {
            if let Some(shared) = weak.upgrade() {
                shared.on_engine_completed(completion);
            }
        }));
        log_info!("PROVIDER", "created, mode={:?}", config.execution_mode);
        LocalDataProvider { shared }
    }

    // ========================================================================
    // STATE
    // ========================================================================

    pub fn status(&self) -> DataProviderStatus {
        self.shared.state.lock().status
    }

    /// Read access to the registry.
    pub fn settings<R>(&self, read: impl FnOnce(&DataSettings) -> R) -> R {
        read(&self.shared.state.lock().settings)
    }

    /// Mutates the registry. All notifications raised by `edit` coalesce
    /// into a single invalidation delivered after `edit` returns.
    ///
    /// `edit` runs under the provider lock and must not call back into the
    /// provider. Registry listeners are notified after the lock is released.
    pub fn update_settings<R>(&self, edit: impl FnOnce(&mut DataSettings) -> R) -> R {
        let (result, notifier) = {
            let mut st = self.shared.state.lock();
            let notifier = Arc::clone(st.settings.notifier());
            notifier.hold();
            (edit(&mut st.settings), notifier)
        };
        notifier.release();
        let changes = std::mem::take(&mut *self.shared.settings_inbox.lock());
        self.shared.apply_settings_changes(changes);
        result
    }

    pub fn items_source(&self) -> Option<Arc<dyn SourceView>> {
        self.shared.state.lock().source_view()
    }

    /// Binds a new source, or unbinds with `None`. Subscriptions on the old
    /// source are released and field metadata is derived again.
    pub fn set_items_source(&self, source: Option<Arc<dyn SourceView>>) {
        let shared = &self.shared;
        let mut out = Vec::new();
        let (old, snapshot, generation) = {
            let mut st = shared.state.lock();
            let old = st.source.take();
            st.source_generation += 1;
            st.pending.clear();
            st.suspended.clear();
            st.clear_descriptions();
            st.refresh_requested = false;
            st.queued_refresh = false;
            st.value_provider = None;
            let snapshot = st.clear_snapshot(DataChangeFlags::SOURCE);
            if st.status != DataProviderStatus::Initializing {
                let is_final = source.is_none();
                st.set_status(DataProviderStatus::Uninitialized, is_final, None, &mut out);
            }
            out.push(ProviderEvent::FieldDescriptionsChanged);
            (old, snapshot, st.source_generation)
        };
        log_info!(
            "SOURCE",
            "items source {} (generation {})",
            if source.is_some() { "bound" } else { "cleared" },
            generation
        );

        if let Some(old) = old {
            old.release();
        }
        shared.engine.clear(snapshot);
        shared.flush(out);

        let Some(view) = source else {
            return;
        };
        let observer_id = view.subscribe(Arc::new(SourceListener {
            shared: shared.me.clone(),
            generation,
        }));
        let batch = view.batch_loader().map(|loader| {
            let me = shared.me.clone();
            let id = loader.on_status_changed(move |status| {
                if let Some(shared) = me.upgrade() {
                    shared.on_batch_status(generation, status);
                }
            });
            (loader, id)
        });
        let binding = SourceBinding {
            view,
            observer_id,
            batch,
            generation,
        };

        let stale = {
            let mut st = shared.state.lock();
            if st.source_generation == generation {
                st.source = Some(binding);
                None
            } else {
                Some(binding)
            }
        };
        if let Some(binding) = stale {
            log_debug!("SOURCE", "items source replaced concurrently, releasing");
            binding.release();
            return;
        }
        shared.invalidate(DataChangeFlags::SOURCE);
    }

    pub fn field_description_provider(&self) -> Option<Arc<dyn FieldDescriptionProvider>> {
        self.shared.state.lock().field_provider.clone()
    }

    /// Replaces the metadata source. Cached metadata is dropped.
    pub fn set_field_description_provider(&self, provider: Arc<dyn FieldDescriptionProvider>) {
        let refresh_now = {
            let mut st = self.shared.state.lock();
            st.custom_field_provider = true;
            st.field_provider = Some(provider);
            st.clear_descriptions();
            let allowed = st.can_refresh();
            if !allowed {
                st.invalidated = true;
            }
            allowed
        };
        self.shared.flush(vec![ProviderEvent::FieldDescriptionsChanged]);
        if refresh_now {
            self.shared.refresh(DataChangeFlags::DESCRIPTIONS);
        }
    }

    pub fn field_descriptions(&self) -> Option<Arc<FieldInfoData>> {
        self.shared.state.lock().descriptions.clone()
    }

    /// Snapshot the engine is computing (or last computed) from.
    pub fn value_provider(&self) -> Option<Arc<RefreshSnapshot>> {
        self.shared.state.lock().value_provider.clone()
    }

    pub fn execution_mode(&self) -> ExecutionMode {
        self.shared.state.lock().execution_mode
    }

    /// Takes effect on the next rebuild.
    pub fn set_execution_mode(&self, mode: ExecutionMode) {
        self.shared.state.lock().execution_mode = mode;
    }

    pub fn defer_updates(&self) -> bool {
        self.shared.state.lock().defer_updates
    }

    pub fn set_defer_updates(&self, defer: bool) {
        self.shared.state.lock().defer_updates = defer;
        if !defer {
            self.shared.on_edit_completed();
        }
    }

    /// Changes waiting for the running rebuild to complete.
    pub fn pending_change_count(&self) -> usize {
        self.shared.state.lock().pending.len()
    }

    // ========================================================================
    // REFRESH / DEFER / INIT
    // ========================================================================

    /// Rebuilds the view now, regardless of defer scopes.
    pub fn refresh(&self) {
        self.shared.refresh(DataChangeFlags::all());
    }

    pub fn defer_refresh(&self) -> DeferGuard<'_> {
        self.shared.state.lock().defer_level += 1;
        DeferGuard {
            shared: &self.shared,
        }
    }

    pub fn begin_init(&self) -> DataResult<()> {
        let mut out = Vec::new();
        {
            let mut st = self.shared.state.lock();
            if st.is_initializing {
                return Err(DataError::NestedBeginInit);
            }
            st.is_initializing = true;
            if st.status == DataProviderStatus::Uninitialized {
                st.set_status(DataProviderStatus::Initializing, false, None, &mut out);
            }
        }
        self.shared.flush(out);
        Ok(())
    }

    pub fn end_init(&self) -> DataResult<()> {
        let mut out = Vec::new();
        {
            let mut st = self.shared.state.lock();
            if !st.is_initializing {
                return Err(DataError::EndInitWithoutBeginInit);
            }
            st.is_initializing = false;
            if st.status == DataProviderStatus::Initializing {
                st.set_status(DataProviderStatus::Uninitialized, false, None, &mut out);
            }
        }
        self.shared.flush(out);
        self.shared.on_edit_completed();
        Ok(())
    }

    /// Blocks until the engine is idle and queued changes are drained.
    pub fn block_until_refresh_completes(&self) {
        self.shared.engine.wait_until_idle();
        self.shared.gate.wait_idle();
    }

    // ========================================================================
    // EDIT PROTOCOL
    // ========================================================================

    pub fn suspend_property_changes(&self, item: &ItemRef) {
        self.shared.suspend_property_changes(item);
    }

    pub fn resume_property_changes(&self, item: &ItemRef) {
        self.shared.resume_property_changes(item);
    }

    pub fn begin_edit(&self, item: &ItemRef) {
        self.suspend_property_changes(item);
    }

    pub fn commit_edit(&self, item: &ItemRef) {
        self.resume_property_changes(item);
    }

    /// Same as `commit_edit`: buffered changes are replayed. Values already
    /// written to the item are not rolled back.
    pub fn cancel_edit(&self, item: &ItemRef) {
        self.resume_property_changes(item);
    }

    // ========================================================================
    // DESCRIPTOR FACTORIES
    // ========================================================================

    pub fn filter_description_for(&self, field: &FieldInfo) -> FilterDescriptor {
        FilterDescriptor::new(field.name.clone(), FilterCondition::default())
    }

    pub fn sort_description_for(&self, field: &FieldInfo) -> SortDescriptor {
        SortDescriptor::new(field.name.clone(), SortOrder::Ascending)
    }

    pub fn group_description_for(&self, field: &FieldInfo) -> GroupDescriptor {
        GroupDescriptor::new(field.name.clone())
    }

    /// Numeric fields default to `Sum`, everything else to `Count`.
    pub fn aggregate_description_for(&self, field: &FieldInfo) -> AggregateDescriptor {
        let function = if field.is_numeric() {
            AggregateFunction::Sum
        } else {
            AggregateFunction::Count
        };
        AggregateDescriptor::new(field.name.clone(), function)
    }

    /// Functions that make sense for `descriptor` given the known metadata.
    pub fn aggregate_functions_for(&self, descriptor: &AggregateDescriptor) -> Vec<AggregateFunction> {
        let numeric = self
            .shared
            .state
            .lock()
            .descriptions
            .as_ref()
            .and_then(|d| d.get(&descriptor.property).map(|f| f.is_numeric()))
            .unwrap_or(false);
        if numeric {
            AggregateFunction::ALL.to_vec()
        } else {
            vec![AggregateFunction::Count]
        }
    }

    pub fn set_aggregate_function(&self, index: usize, function: AggregateFunction) -> DataResult<()> {
        self.update_settings(|s| s.aggregates_mut().update(index, |d| d.function = function))
    }

    // ========================================================================
    // EVENTS
    // ========================================================================

    pub fn on_status_changed<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&StatusChangedEvent) + Send + Sync + 'static,
    {
        self.shared.events.status_changed.subscribe(listener)
    }

    pub fn on_view_changed<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ViewChangedEvent) + Send + Sync + 'static,
    {
        self.shared.events.view_changed.subscribe(listener)
    }

    pub fn on_view_changing<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&ViewChangingEvent) + Send + Sync + 'static,
    {
        self.shared.events.view_changing.subscribe(listener)
    }

    pub fn on_field_descriptions_changed<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&()) + Send + Sync + 'static,
    {
        self.shared.events.field_descriptions_changed.subscribe(listener)
    }

    pub fn on_current_changed<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&Option<ItemRef>) + Send + Sync + 'static,
    {
        self.shared.events.current_changed.subscribe(listener)
    }

    pub fn on_layout_changed<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&SettingsChange) + Send + Sync + 'static,
    {
        self.shared.events.layout_changed.subscribe(listener)
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        self.shared.events.remove(id)
    }
}

impl Drop for LocalDataProvider {
    fn drop(&mut self) {
        let binding = self.shared.state.lock().source.take();
        if let Some(binding) = binding {
            log_debug!("PROVIDER", "dropped, releasing source subscriptions");
            binding.release();
        }
    }
}
