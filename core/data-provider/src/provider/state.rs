//! FILENAME: core/data-provider/src/provider/state.rs
//! PURPOSE: Mutable state of the coordinator, guarded by one mutex.

use std::collections::VecDeque;
use std::sync::Arc;

use data_model::{DataError, DataSettings, FieldInfoData, ItemId, ItemRef, ListenerId};
use rustc_hash::FxHashMap;

use crate::config::ProviderConfig;
use crate::descriptions::FieldDescriptionProvider;
use crate::engine::ExecutionMode;
use crate::events::ProviderEvent;
use crate::log_debug;
use crate::snapshot::{DataChangeFlags, RefreshSnapshot};
use crate::source::{BatchLoader, CollectionChangedArgs, SourceView};
use crate::status::{DataProviderStatus, StatusChangedEvent};

/// A change that arrived while the engine was busy.
#[derive(Debug, Clone)]
pub(crate) enum PendingChange {
    Collection(CollectionChangedArgs),
    Property { item: ItemRef, property: String },
}

/// Property changes held back while an item is being edited.
#[derive(Debug)]
pub(crate) struct SuspendBuffer {
    pub item: ItemRef,
    pub properties: Vec<String>,
}

/// The bound source view and the subscriptions made on it.
pub(crate) struct SourceBinding {
    pub view: Arc<dyn SourceView>,
    pub observer_id: ListenerId,
    pub batch: Option<(Arc<BatchLoader>, ListenerId)>,
    pub generation: u64,
}

impl SourceBinding {
    pub fn release(self) {
        self.view.unsubscribe(self.observer_id);
        if let Some((loader, id)) = self.batch {
            loader.unsubscribe(id);
        }
    }
}

pub(crate) struct ProviderState {
    pub settings: DataSettings,
    pub status: DataProviderStatus,
    pub execution_mode: ExecutionMode,

    /// A change requires a refresh that has not run yet.
    pub invalidated: bool,
    pub pending_flags: DataChangeFlags,
    pub defer_level: usize,
    pub is_initializing: bool,
    pub defer_updates: bool,

    /// A full refresh is coming; incremental notifications are dropped.
    pub refresh_requested: bool,
    /// A refresh was asked for while a rebuild was in flight.
    pub queued_refresh: bool,
    /// Epoch of the rebuild the engine is working on.
    pub in_flight: Option<u64>,
    pub epoch: u64,
    pub value_provider: Option<Arc<RefreshSnapshot>>,

    pub source: Option<SourceBinding>,
    pub source_generation: u64,

    pub field_provider: Option<Arc<dyn FieldDescriptionProvider>>,
    /// Set when the owner assigned the provider, as opposed to the
    /// on-demand local one.
    pub custom_field_provider: bool,
    pub descriptions: Option<Arc<FieldInfoData>>,
    pub descriptions_generation: u64,
    pub descriptions_pending: bool,
    /// The pending request was held back because the provider was still
    /// busy; it has not been sent yet.
    pub descriptions_deferred: bool,

    pub pending: VecDeque<PendingChange>,
    pub suspended: FxHashMap<ItemId, SuspendBuffer>,
}

impl ProviderState {
    pub fn new(mut settings: DataSettings, config: &ProviderConfig) -> Self {
        settings.set_aggregates_position(config.aggregates_position);
        settings.set_aggregates_level(config.aggregates_level);
        ProviderState {
            settings,
            status: DataProviderStatus::Uninitialized,
            execution_mode: config.execution_mode,
            invalidated: false,
            pending_flags: DataChangeFlags::empty(),
            defer_level: 0,
            is_initializing: false,
            defer_updates: config.defer_updates,
            refresh_requested: false,
            queued_refresh: false,
            in_flight: None,
            epoch: 0,
            value_provider: None,
            source: None,
            source_generation: 0,
            field_provider: None,
            custom_field_provider: false,
            descriptions: None,
            descriptions_generation: 0,
            descriptions_pending: false,
            descriptions_deferred: false,
            pending: VecDeque::new(),
            suspended: FxHashMap::default(),
        }
    }

    /// Records a status change. Unchanged statuses without an error are not
    /// republished.
    pub fn set_status(
        &mut self,
        status: DataProviderStatus,
        is_final: bool,
        error: Option<DataError>,
        out: &mut Vec<ProviderEvent>,
    ) {
        if self.status == status && error.is_none() {
            return;
        }
        log_debug!("PROVIDER", "status {:?} -> {:?} final={}", self.status, status, is_final);
        self.status = status;
        out.push(ProviderEvent::Status(StatusChangedEvent {
            status,
            is_final,
            error,
        }));
    }

    /// Automatic refreshes are allowed.
    pub fn can_refresh(&self) -> bool {
        self.defer_level == 0 && !self.is_initializing && !self.defer_updates
    }

    pub fn next_epoch(&mut self) -> u64 {
        self.epoch += 1;
        self.epoch
    }

    /// Drops cached metadata and orphans any reply still on its way.
    pub fn clear_descriptions(&mut self) {
        self.descriptions = None;
        self.descriptions_generation += 1;
        self.descriptions_pending = false;
        self.descriptions_deferred = false;
        if !self.custom_field_provider {
            self.field_provider = None;
        }
    }

    pub fn source_view(&self) -> Option<Arc<dyn SourceView>> {
        self.source.as_ref().map(|b| Arc::clone(&b.view))
    }

    pub fn is_current_source(&self, generation: u64) -> bool {
        self.source.as_ref().is_some_and(|b| b.generation == generation)
    }

    /// Empty snapshot handed to `DataEngine::clear`.
    pub fn clear_snapshot(&mut self, flags: DataChangeFlags) -> Arc<RefreshSnapshot> {
        let epoch = self.next_epoch();
        self.in_flight = None;
        Arc::new(RefreshSnapshot::capture(&self.settings, Vec::new(), epoch, flags))
    }
}
