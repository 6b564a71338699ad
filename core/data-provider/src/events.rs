//! FILENAME: core/data-provider/src/events.rs
//! PURPOSE: Notifications published by the data provider.

use data_model::{EventHub, ItemRef, ListenerId, SettingsChange};

use crate::engine::AddRemoveResult;
use crate::status::StatusChangedEvent;

/// Kind of change a view notification describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionChange {
    Reset,
    ItemInserted,
    ItemRemoved,
    ItemChanged,
}

/// Payload of `view_changed`. `changes` holds the engine diffs; it is empty
/// for `Reset` and `ItemChanged`.
#[derive(Debug, Clone)]
pub struct ViewChangedEvent {
    pub changes: Vec<AddRemoveResult>,
    pub action: CollectionChange,
}

/// Payload of `view_changing`, raised before the source commits a change.
#[derive(Debug, Clone)]
pub struct ViewChangingEvent {
    pub items: Vec<ItemRef>,
    pub action: CollectionChange,
}

/// Everything the provider can publish, queued while internal locks are
/// held and flushed once they are released.
#[derive(Debug, Clone)]
pub(crate) enum ProviderEvent {
    Status(StatusChangedEvent),
    View(ViewChangedEvent),
    FieldDescriptionsChanged,
    Layout(SettingsChange),
}

#[derive(Debug, Default)]
pub(crate) struct ProviderEvents {
    pub status_changed: EventHub<StatusChangedEvent>,
    pub view_changed: EventHub<ViewChangedEvent>,
    pub view_changing: EventHub<ViewChangingEvent>,
    pub field_descriptions_changed: EventHub<()>,
    pub current_changed: EventHub<Option<ItemRef>>,
    pub layout_changed: EventHub<SettingsChange>,
}

impl ProviderEvents {
    pub fn emit(&self, event: ProviderEvent) {
        match event {
            ProviderEvent::Status(e) => self.status_changed.emit(&e),
            ProviderEvent::View(e) => self.view_changed.emit(&e),
            ProviderEvent::FieldDescriptionsChanged => self.field_descriptions_changed.emit(&()),
            ProviderEvent::Layout(change) => self.layout_changed.emit(&change),
        }
    }

    pub fn emit_all(&self, events: Vec<ProviderEvent>) {
        for event in events {
            self.emit(event);
        }
    }

    pub fn remove(&self, id: ListenerId) -> bool {
        self.status_changed.unsubscribe(id)
            || self.view_changed.unsubscribe(id)
            || self.view_changing.unsubscribe(id)
            || self.field_descriptions_changed.unsubscribe(id)
            || self.current_changed.unsubscribe(id)
            || self.layout_changed.unsubscribe(id)
    }
}
