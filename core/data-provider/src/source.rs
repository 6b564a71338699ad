//! FILENAME: core/data-provider/src/source.rs
//! PURPOSE: Source view contract and an in-memory observable collection.
//! CONTEXT: The provider never reads a raw collection directly. It talks to
//! a `SourceView`, subscribes a `SourceObserver` for structural and
//! per-item notifications, and optionally follows a `BatchLoader` when the
//! items arrive in pages from a remote store.

use std::sync::Arc;

use data_model::{DataError, DataResult, EventHub, ItemRef, ListenerId};
use parking_lot::{Mutex, RwLock};

// ============================================================================
// CHANGE ARGUMENTS
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CollectionAction {
    Add,
    Remove,
    Move,
    Replace,
    Reset,
}

/// Describes one structural change of a source collection.
#[derive(Debug, Clone)]
pub struct CollectionChangedArgs {
    pub action: CollectionAction,
    pub new_items: Vec<ItemRef>,
    pub new_index: Option<usize>,
    pub old_items: Vec<ItemRef>,
    pub old_index: Option<usize>,
}

impl CollectionChangedArgs {
    pub fn add(items: Vec<ItemRef>, index: usize) -> Self {
        CollectionChangedArgs {
            action: CollectionAction::Add,
            new_items: items,
            new_index: Some(index),
            old_items: Vec::new(),
            old_index: None,
        }
    }

    pub fn remove(items: Vec<ItemRef>, index: usize) -> Self {
        CollectionChangedArgs {
            action: CollectionAction::Remove,
            new_items: Vec::new(),
            new_index: None,
            old_items: items,
            old_index: Some(index),
        }
    }

    pub fn moved(items: Vec<ItemRef>, old_index: usize, new_index: usize) -> Self {
        CollectionChangedArgs {
            action: CollectionAction::Move,
            new_items: items.clone(),
            new_index: Some(new_index),
            old_items: items,
            old_index: Some(old_index),
        }
    }

    pub fn replace(old_items: Vec<ItemRef>, new_items: Vec<ItemRef>, index: usize) -> Self {
        CollectionChangedArgs {
            action: CollectionAction::Replace,
            new_items,
            new_index: Some(index),
            old_items,
            old_index: Some(index),
        }
    }

    pub fn reset() -> Self {
        CollectionChangedArgs {
            action: CollectionAction::Reset,
            new_items: Vec::new(),
            new_index: None,
            old_items: Vec::new(),
            old_index: None,
        }
    }
}

// ============================================================================
// CONTRACTS
// ============================================================================

/// Receives notifications from a source view.
pub trait SourceObserver: Send + Sync {
    /// Raised before a change is committed to the source.
    fn collection_changing(&self, _args: &CollectionChangedArgs) {}

    fn collection_changed(&self, args: &CollectionChangedArgs);

    fn item_property_changed(&self, item: &ItemRef, property: &str);

    fn current_changed(&self, _current: Option<&ItemRef>) {}
}

pub trait SourceView: Send + Sync {
    /// Snapshot of the committed items, in source order.
    fn items(&self) -> Vec<ItemRef>;

    fn len(&self) -> usize {
        self.items().len()
    }

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Position of the item with the same identity.
    fn index_of(&self, item: &ItemRef) -> Option<usize>;

    fn subscribe(&self, observer: Arc<dyn SourceObserver>) -> ListenerId;

    fn unsubscribe(&self, id: ListenerId);

    fn batch_loader(&self) -> Option<Arc<BatchLoader>> {
        None
    }

    /// Commits a change announced by `collection_changing` right away.
    fn process_pending_collection_change(&self) {}
}

/// Request lifecycle of a paged source.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchLoadingStatus {
    ItemsRequested,
    ItemsLoaded,
    ItemsLoadFailed(String),
}

/// Publishes the request lifecycle of a paged source.
#[derive(Debug, Default)]
pub struct BatchLoader {
    status_changed: EventHub<BatchLoadingStatus>,
}

impl BatchLoader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_status_changed<F>(&self, listener: F) -> ListenerId
    where
        F: Fn(&BatchLoadingStatus) + Send + Sync + 'static,
    {
        self.status_changed.subscribe(listener)
    }

    pub fn unsubscribe(&self, id: ListenerId) {
        self.status_changed.unsubscribe(id);
    }

    /// Called by whatever fetches the pages.
    pub fn report(&self, status: BatchLoadingStatus) {
        self.status_changed.emit(&status);
    }
}

// ============================================================================
// ITEM COLLECTION
// ============================================================================

type StagedChange = Box<dyn FnOnce(&mut Vec<ItemRef>) + Send>;

/// Notification fanned out to the observers of an `ItemCollection`.
enum SourceNotification {
    Changing(CollectionChangedArgs),
    Changed(CollectionChangedArgs),
    PropertyChanged(ItemRef, String),
    CurrentChanged(Option<ItemRef>),
}

/// Observable in-memory `SourceView`.
///
/// Every mutation is staged, announced through `collection_changing`,
/// committed (unless an observer already forced it through
/// `process_pending_collection_change`) and then announced through
/// `collection_changed`. No internal lock is held while observers run.
#[derive(Default)]
pub struct ItemCollection {
    items: RwLock<Vec<ItemRef>>,
    notifications: EventHub<SourceNotification>,
    staged: Mutex<Option<StagedChange>>,
    current: Mutex<Option<ItemRef>>,
    batch_loader: Option<Arc<BatchLoader>>,
}

impl ItemCollection {
    pub fn new(items: Vec<ItemRef>) -> Arc<Self> {
        Arc::new(ItemCollection {
            items: RwLock::new(items),
            ..Default::default()
        })
    }

    /// Collection whose items arrive through `loader`.
    pub fn with_batch_loader(items: Vec<ItemRef>, loader: Arc<BatchLoader>) -> Arc<Self> {
        Arc::new(ItemCollection {
            items: RwLock::new(items),
            batch_loader: Some(loader),
            ..Default::default()
        })
    }

    pub fn get(&self, index: usize) -> Option<ItemRef> {
        self.items.read().get(index).cloned()
    }

    pub fn push(&self, item: ItemRef) {
        let index = self.len();
        self.apply(CollectionChangedArgs::add(vec![item.clone()], index), move |items| {
            items.push(item)
        });
    }

    pub fn insert(&self, index: usize, item: ItemRef) -> DataResult<()> {
        let len = self.len();
        if index > len {
            return Err(DataError::IndexOutOfRange { index, len });
        }
        self.apply(CollectionChangedArgs::add(vec![item.clone()], index), move |items| {
            let at = index.min(items.len());
            items.insert(at, item)
        });
        Ok(())
    }

    pub fn remove_at(&self, index: usize) -> DataResult<ItemRef> {
        let item = self.existing(index)?;
        self.apply(CollectionChangedArgs::remove(vec![item.clone()], index), move |items| {
            if index < items.len() {
                items.remove(index);
            }
        });
        Ok(item)
    }

    /// Removes the item with the same identity. Returns false when absent.
    pub fn remove(&self, item: &ItemRef) -> bool {
        match self.index_of(item) {
            Some(index) => self.remove_at(index).is_ok(),
            None => false,
        }
    }

    pub fn move_item(&self, old_index: usize, new_index: usize) -> DataResult<()> {
        let item = self.existing(old_index)?;
        self.existing(new_index)?;
        self.apply(
            CollectionChangedArgs::moved(vec![item], old_index, new_index),
            move |items| {
                if old_index < items.len() && new_index < items.len() {
                    let moved = items.remove(old_index);
                    items.insert(new_index, moved);
                }
            },
        );
        Ok(())
    }

    pub fn replace(&self, index: usize, item: ItemRef) -> DataResult<ItemRef> {
        let old = self.existing(index)?;
        self.apply(
            CollectionChangedArgs::replace(vec![old.clone()], vec![item.clone()], index),
            move |items| {
                if let Some(slot) = items.get_mut(index) {
                    *slot = item;
                }
            },
        );
        Ok(old)
    }

    /// Swaps the whole content and raises a single reset.
    pub fn reset(&self, items: Vec<ItemRef>) {
        self.apply(CollectionChangedArgs::reset(), move |current| *current = items);
    }

    /// Announces that `property` of `item` changed. The item itself is
    /// mutated by the caller beforehand.
    pub fn notify_property_changed(&self, item: &ItemRef, property: &str) {
        self.notifications
            .emit(&SourceNotification::PropertyChanged(item.clone(), property.to_string()));
    }

    pub fn current(&self) -> Option<ItemRef> {
        self.current.lock().clone()
    }

    pub fn set_current(&self, item: Option<ItemRef>) {
        *self.current.lock() = item.clone();
        self.notifications.emit(&SourceNotification::CurrentChanged(item));
    }

    fn apply<F>(&self, args: CollectionChangedArgs, commit: F)
    where
        F: FnOnce(&mut Vec<ItemRef>) + Send + 'static,
    {
        *self.staged.lock() = Some(Box::new(commit));
        self.notifications.emit(&SourceNotification::Changing(args.clone()));
        self.commit_staged();
        self.notifications.emit(&SourceNotification::Changed(args));
    }

    fn commit_staged(&self) {
        let staged = self.staged.lock().take();
        if let Some(commit) = staged {
            commit(&mut self.items.write());
        }
    }

    fn existing(&self, index: usize) -> DataResult<ItemRef> {
        self.get(index).ok_or(DataError::IndexOutOfRange {
            index,
            len: self.len(),
        })
    }
}

impl SourceView for ItemCollection {
    fn items(&self) -> Vec<ItemRef> {
        self.items.read().clone()
    }

    fn len(&self) -> usize {
        self.items.read().len()
    }

    fn index_of(&self, item: &ItemRef) -> Option<usize> {
        let id = item.id();
        self.items.read().iter().position(|i| i.id() == id)
    }

    fn subscribe(&self, observer: Arc<dyn SourceObserver>) -> ListenerId {
        self.notifications.subscribe(move |notification| match notification {
            SourceNotification::Changing(args) => observer.collection_changing(args),
            SourceNotification::Changed(args) => observer.collection_changed(args),
            SourceNotification::PropertyChanged(item, property) => {
                observer.item_property_changed(item, property)
            }
            SourceNotification::CurrentChanged(current) => observer.current_changed(current.as_ref()),
        })
    }

    fn unsubscribe(&self, id: ListenerId) {
        self.notifications.unsubscribe(id);
    }

    fn batch_loader(&self) -> Option<Arc<BatchLoader>> {
        self.batch_loader.clone()
    }

    fn process_pending_collection_change(&self) {
        self.commit_staged();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use data_model::{FieldType, Record, Schema};

    #[derive(Default)]
    struct Recorder {
        seen: Mutex<Vec<String>>,
        source: Mutex<Option<Arc<ItemCollection>>>,
    }

    impl SourceObserver for Recorder {
        fn collection_changing(&self, args: &CollectionChangedArgs) {
            let len = self.source.lock().as_ref().map(|s| s.len()).unwrap_or_default();
            self.seen.lock().push(format!("changing {:?} len={}", args.action, len));
        }

        fn collection_changed(&self, args: &CollectionChangedArgs) {
            let len = self.source.lock().as_ref().map(|s| s.len()).unwrap_or_default();
            self.seen.lock().push(format!("changed {:?} len={}", args.action, len));
        }

        fn item_property_changed(&self, item: &ItemRef, property: &str) {
            self.seen.lock().push(format!("property {} {}", item.id(), property));
        }
    }

    fn item(id: u64) -> ItemRef {
        let schema = Arc::new(Schema::new([("id", FieldType::Number)]));
        Record::new(id, schema, vec![(id as f64).into()])
    }

    fn observed(items: Vec<ItemRef>) -> (Arc<ItemCollection>, Arc<Recorder>) {
        let collection = ItemCollection::new(items);
        let recorder = Arc::new(Recorder::default());
        *recorder.source.lock() = Some(Arc::clone(&collection));
        collection.subscribe(recorder.clone());
        (collection, recorder)
    }

    #[test]
    fn test_changing_sees_uncommitted_state() {
        let (collection, recorder) = observed(vec![item(1)]);
        collection.push(item(2));
        collection.remove_at(0).unwrap();

        assert_eq!(
            *recorder.seen.lock(),
            vec![
                "changing Add len=1",
                "changed Add len=2",
                "changing Remove len=2",
                "changed Remove len=1",
            ]
        );
        assert_eq!(collection.get(0).map(|i| i.id()), Some(2));
    }

    #[test]
    fn test_process_pending_commits_early() {
        struct Committer(Mutex<Option<Arc<ItemCollection>>>);
        impl SourceObserver for Committer {
            fn collection_changing(&self, _args: &CollectionChangedArgs) {
                if let Some(source) = self.0.lock().as_ref() {
                    source.process_pending_collection_change();
                }
            }
            fn collection_changed(&self, _args: &CollectionChangedArgs) {}
            fn item_property_changed(&self, _item: &ItemRef, _property: &str) {}
        }

        let (collection, recorder) = observed(vec![item(1), item(2)]);
        let committer = Arc::new(Committer(Mutex::new(Some(Arc::clone(&collection)))));
        let id = collection.subscribe(committer.clone());
        // Recorder runs first, so it still sees the old length.
        collection.reset(vec![item(9)]);
        collection.unsubscribe(id);

        assert_eq!(
            *recorder.seen.lock(),
            vec!["changing Reset len=2", "changed Reset len=1"]
        );
        *committer.0.lock() = None;
    }

    #[test]
    fn test_move_and_replace() {
        let (collection, _) = observed(vec![item(1), item(2), item(3)]);
        collection.move_item(0, 2).unwrap();
        let ids: Vec<u64> = collection.items().iter().map(|i| i.id()).collect();
        assert_eq!(ids, vec![2, 3, 1]);

        let old = collection.replace(1, item(7)).unwrap();
        assert_eq!(old.id(), 3);
        assert_eq!(collection.index_of(&item(7)), Some(1));
        assert!(collection.move_item(0, 5).is_err());
    }

    #[test]
    fn test_property_notifications_reach_observers() {
        let one = item(1);
        let (collection, recorder) = observed(vec![one.clone()]);
        collection.notify_property_changed(&one, "id");
        assert_eq!(*recorder.seen.lock(), vec!["property 1 id"]);
    }
}
