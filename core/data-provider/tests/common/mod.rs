//! FILENAME: tests/common/mod.rs
//! Test harness and fixtures for data provider integration tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::thread::JoinHandle;

use data_model::{
    DataError, DataItem, FieldInfoData, FieldType, ItemRef, Record, Schema, SettingsChange, Value,
};
use data_provider::{
    AddRemoveResult, CollectionChange, CompletionHandler, DataEngine, DataProviderStatus,
    DescriptionsCallback, DescriptionsRequest, EngineCompletion, ExecutionMode,
    FieldDescriptionProvider, ItemCollection, LocalDataProvider, ProviderConfig, RefreshSnapshot,
    StatusChangedEvent, ValueProvider, ViewChangedEvent, ViewChangingEvent,
};
use parking_lot::Mutex;
use rayon::prelude::*;

// ============================================================================
// FIXTURES
// ============================================================================

/// Orders with `id`, `region`, `product` and `amount` members.
pub struct OrderFixture;

impl OrderFixture {
    pub fn schema() -> Arc<Schema> {
        Arc::new(Schema::new([
            ("id", FieldType::Number),
            ("region", FieldType::Text),
            ("product", FieldType::Text),
            ("amount", FieldType::Number),
        ]))
    }

    pub fn order(id: u64, region: &str, product: &str, amount: f64) -> Arc<Record> {
        Record::new(
            id,
            Self::schema(),
            vec![
                Value::number(id as f64),
                Value::text(region),
                Value::text(product),
                Value::number(amount),
            ],
        )
    }

    pub fn data() -> Vec<(u64, &'static str, &'static str, f64)> {
        vec![
            (1, "North", "Widget", 10.0),
            (2, "South", "Gadget", 5.0),
            (3, "East", "Widget", 7.5),
            (4, "North", "Gizmo", 12.0),
        ]
    }

    pub fn orders() -> Vec<Arc<Record>> {
        Self::data()
            .into_iter()
            .map(|(id, region, product, amount)| Self::order(id, region, product, amount))
            .collect()
    }
}

pub fn as_item(record: &Arc<Record>) -> ItemRef {
    record.clone()
}

pub fn ids(items: &[ItemRef]) -> Vec<u64> {
    items.iter().map(|i| i.id()).collect()
}

// ============================================================================
// LIST ENGINE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineMode {
    /// Rebuilds complete before `rebuild*` returns.
    Inline,
    /// Rebuilds wait for `complete_next`.
    Manual,
    /// Parallel rebuilds run on a spawned thread.
    Threaded,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineCall {
    Clear(u64),
    Rebuild(u64),
    RebuildParallel(u64),
    Insert {
        index: Option<usize>,
        ids: Vec<u64>,
    },
    Remove {
        index: Option<usize>,
        ids: Vec<u64>,
        exhaustive: bool,
        can_use_comparer: bool,
    },
}

#[derive(Default)]
struct ListState {
    snapshot: Option<Arc<RefreshSnapshot>>,
    rows: Vec<ItemRef>,
    waiting: Vec<Arc<RefreshSnapshot>>,
}

/// Flat engine: the view is the filtered source sorted by the snapshot
/// comparer. Enough to observe what the provider asks of an engine.
pub struct ListEngine {
    me: Weak<ListEngine>,
    mode: EngineMode,
    state: Mutex<ListState>,
    handler: Mutex<Option<CompletionHandler>>,
    calls: Mutex<Vec<EngineCall>>,
    fail_next: AtomicBool,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl ListEngine {
    pub fn new(mode: EngineMode) -> Arc<Self> {
        Arc::new_cyclic(|me| ListEngine {
            me: me.clone(),
            mode,
            state: Mutex::new(ListState::default()),
            handler: Mutex::new(None),
            calls: Mutex::new(Vec::new()),
            fail_next: AtomicBool::new(false),
            workers: Mutex::new(Vec::new()),
        })
    }

    pub fn rows(&self) -> Vec<u64> {
        ids(&self.state.lock().rows)
    }

    pub fn calls(&self) -> Vec<EngineCall> {
        self.calls.lock().clone()
    }

    pub fn clear_calls(&self) {
        self.calls.lock().clear();
    }

    pub fn rebuild_count(&self) -> usize {
        self.calls
            .lock()
            .iter()
            .filter(|c| matches!(c, EngineCall::Rebuild(_) | EngineCall::RebuildParallel(_)))
            .count()
    }

    pub fn fail_next_rebuild(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn waiting(&self) -> usize {
        self.state.lock().waiting.len()
    }

    /// Epoch of the oldest rebuild waiting for `complete_next`.
    pub fn waiting_epoch(&self) -> Option<u64> {
        self.state.lock().waiting.first().map(|s| s.epoch())
    }

    /// Finishes the oldest waiting rebuild. Returns false if none waits.
    pub fn complete_next(&self) -> bool {
        let snapshot = {
            let mut st = self.state.lock();
            if st.waiting.is_empty() {
                return false;
            }
            st.waiting.remove(0)
        };
        let completion = self.compute(snapshot);
        self.report(completion);
        true
    }

    /// Sends an arbitrary completion report.
    pub fn report(&self, completion: EngineCompletion) {
        let handler = self.handler.lock().clone();
        if let Some(handler) = handler {
            handler(completion);
        }
    }

    fn compute(&self, snapshot: Arc<RefreshSnapshot>) -> EngineCompletion {
        let epoch = snapshot.epoch();
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return EngineCompletion::faulted(epoch, DataError::Engine("cube build failed".into()));
        }
        let mut rows: Vec<ItemRef> = snapshot
            .items()
            .par_iter()
            .filter(|item| {
                snapshot
                    .passes_filter(&snapshot.filter_items(item.as_ref()))
                    .unwrap_or(false)
            })
            .cloned()
            .collect();
        let comparer = snapshot.sort_comparer().clone();
        rows.par_sort_by(|a, b| comparer.compare(a.as_ref(), b.as_ref()));

        let mut st = self.state.lock();
        st.rows = rows;
        st.snapshot = Some(snapshot);
        EngineCompletion::completed(epoch)
    }

    fn start(&self, snapshot: Arc<RefreshSnapshot>, parallel: bool) {
        match self.mode {
            EngineMode::Manual => self.state.lock().waiting.push(snapshot),
            EngineMode::Threaded if parallel => {
                let me = self.me.clone();
                let handle = std::thread::spawn(move || {
                    if let Some(engine) = me.upgrade() {
                        let completion = engine.compute(snapshot);
                        engine.report(completion);
                    }
                });
                self.workers.lock().push(handle);
            }
            _ => {
                let completion = self.compute(snapshot);
                self.report(completion);
            }
        }
    }
}

impl DataEngine for ListEngine {
    fn set_completion_handler(&self, handler: CompletionHandler) {
        *self.handler.lock() = Some(handler);
    }

    fn clear(&self, snapshot: Arc<RefreshSnapshot>) {
        self.calls.lock().push(EngineCall::Clear(snapshot.epoch()));
        let mut st = self.state.lock();
        st.rows.clear();
        st.waiting.clear();
        st.snapshot = Some(snapshot);
    }

    fn rebuild(&self, snapshot: Arc<RefreshSnapshot>) {
        self.calls.lock().push(EngineCall::Rebuild(snapshot.epoch()));
        self.start(snapshot, false);
    }

    fn rebuild_parallel(&self, snapshot: Arc<RefreshSnapshot>) {
        self.calls.lock().push(EngineCall::RebuildParallel(snapshot.epoch()));
        self.start(snapshot, true);
    }

    fn insert(&self, index: Option<usize>, items: &[ItemRef]) -> Vec<AddRemoveResult> {
        self.calls.lock().push(EngineCall::Insert {
            index,
            ids: ids(items),
        });
        let mut st = self.state.lock();
        let snapshot = st.snapshot.clone();
        let mut results = Vec::new();
        for item in items {
            let (visible, group_path, position) = match &snapshot {
                Some(s) => {
                    let visible = s.passes_filter(&s.filter_items(item.as_ref())).unwrap_or(false);
                    let comparer = s.sort_comparer();
                    let position = if comparer.is_empty() {
                        index.unwrap_or(st.rows.len()).min(st.rows.len())
                    } else {
                        st.rows.partition_point(|r| {
                            comparer.compare(r.as_ref(), item.as_ref()) != std::cmp::Ordering::Greater
                        })
                    };
                    (visible, s.row_group_names(item.as_ref()), position)
                }
                None => (true, Default::default(), st.rows.len()),
            };
            if visible {
                st.rows.insert(position, item.clone());
            }
            results.push(AddRemoveResult {
                item: item.clone(),
                index: visible.then_some(position),
                group_path,
            });
        }
        results
    }

    fn remove(
        &self,
        index: Option<usize>,
        items: &[ItemRef],
        exhaustive_search: bool,
        can_use_comparer: bool,
    ) -> Vec<AddRemoveResult> {
        self.calls.lock().push(EngineCall::Remove {
            index,
            ids: ids(items),
            exhaustive: exhaustive_search,
            can_use_comparer,
        });
        let mut st = self.state.lock();
        let mut results = Vec::new();
        for item in items {
            if let Some(position) = st.rows.iter().position(|r| r.id() == item.id()) {
                let removed = st.rows.remove(position);
                results.push(AddRemoveResult {
                    item: removed,
                    index: Some(position),
                    group_path: Default::default(),
                });
            }
        }
        results
    }

    fn wait_until_idle(&self) {
        loop {
            let workers: Vec<JoinHandle<()>> = self.workers.lock().drain(..).collect();
            if workers.is_empty() {
                return;
            }
            for worker in workers {
                let _ = worker.join();
            }
        }
    }
}

// ============================================================================
// FIELD DESCRIPTION PROVIDERS
// ============================================================================

/// Holds every request until `release` is called.
#[derive(Default)]
pub struct HeldFieldProvider {
    held: Mutex<Vec<DescriptionsCallback>>,
    requests: AtomicUsize,
}

impl HeldFieldProvider {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn request_count(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }

    /// Answers the oldest held request with the order schema.
    pub fn release(&self) -> bool {
        let callback = {
            let mut held = self.held.lock();
            if held.is_empty() {
                return false;
            }
            held.remove(0)
        };
        callback(Ok(Arc::new(FieldInfoData::from_schema(&OrderFixture::schema()))));
        true
    }

    /// Drops every held request without answering it.
    pub fn clear(&self) {
        self.held.lock().clear();
    }
}

impl FieldDescriptionProvider for HeldFieldProvider {
    fn is_ready(&self) -> bool {
        false
    }

    fn is_busy(&self) -> bool {
        !self.held.lock().is_empty()
    }

    fn request_descriptions(&self, _request: DescriptionsRequest, callback: DescriptionsCallback) {
        self.requests.fetch_add(1, Ordering::SeqCst);
        self.held.lock().push(callback);
    }
}

/// Fails every request.
pub struct FailingFieldProvider;

impl FieldDescriptionProvider for FailingFieldProvider {
    fn is_ready(&self) -> bool {
        false
    }

    fn is_busy(&self) -> bool {
        false
    }

    fn request_descriptions(&self, _request: DescriptionsRequest, callback: DescriptionsCallback) {
        callback(Err(DataError::Descriptions("schema service unavailable".into())));
    }
}

// ============================================================================
// EVENT RECORDER
// ============================================================================

#[derive(Clone, Default)]
pub struct EventRecorder {
    statuses: Arc<Mutex<Vec<StatusChangedEvent>>>,
    views: Arc<Mutex<Vec<ViewChangedEvent>>>,
    changing: Arc<Mutex<Vec<ViewChangingEvent>>>,
    layouts: Arc<Mutex<Vec<SettingsChange>>>,
    currents: Arc<Mutex<Vec<Option<u64>>>>,
    descriptions: Arc<AtomicUsize>,
}

impl EventRecorder {
    /// Subscribes to everything except `view_changing`, whose mere
    /// subscription changes provider behavior.
    pub fn attach(provider: &LocalDataProvider) -> Self {
        let recorder = EventRecorder::default();
        let r = recorder.clone();
        provider.on_status_changed(move |e| r.statuses.lock().push(e.clone()));
        let r = recorder.clone();
        provider.on_view_changed(move |e| r.views.lock().push(e.clone()));
        let r = recorder.clone();
        provider.on_layout_changed(move |c| r.layouts.lock().push(*c));
        let r = recorder.clone();
        provider.on_current_changed(move |c| r.currents.lock().push(c.as_ref().map(|i| i.id())));
        let r = recorder.clone();
        provider.on_field_descriptions_changed(move |_| {
            r.descriptions.fetch_add(1, Ordering::SeqCst);
        });
        recorder
    }

    pub fn watch_view_changing(&self, provider: &LocalDataProvider) {
        let r = self.clone();
        provider.on_view_changing(move |e| r.changing.lock().push(e.clone()));
    }

    pub fn statuses(&self) -> Vec<DataProviderStatus> {
        self.statuses.lock().iter().map(|e| e.status).collect()
    }

    pub fn status_events(&self) -> Vec<StatusChangedEvent> {
        self.statuses.lock().clone()
    }

    /// View notifications as (action, affected ids).
    pub fn views(&self) -> Vec<(CollectionChange, Vec<u64>)> {
        self.views
            .lock()
            .iter()
            .map(|e| (e.action, e.changes.iter().map(|c| c.item.id()).collect()))
            .collect()
    }

    pub fn view_events(&self) -> Vec<ViewChangedEvent> {
        self.views.lock().clone()
    }

    pub fn changing(&self) -> Vec<(CollectionChange, Vec<u64>)> {
        self.changing
            .lock()
            .iter()
            .map(|e| (e.action, ids(&e.items)))
            .collect()
    }

    pub fn layouts(&self) -> Vec<SettingsChange> {
        self.layouts.lock().clone()
    }

    pub fn currents(&self) -> Vec<Option<u64>> {
        self.currents.lock().clone()
    }

    pub fn description_changes(&self) -> usize {
        self.descriptions.load(Ordering::SeqCst)
    }

    pub fn clear(&self) {
        self.statuses.lock().clear();
        self.views.lock().clear();
        self.changing.lock().clear();
        self.layouts.lock().clear();
        self.currents.lock().clear();
        self.descriptions.store(0, Ordering::SeqCst);
    }
}

// ============================================================================
// HARNESS
// ============================================================================

/// Provider, engine, source and recorder wired together.
pub struct TestHarness {
    pub provider: LocalDataProvider,
    pub engine: Arc<ListEngine>,
    pub source: Arc<ItemCollection>,
    pub records: Vec<Arc<Record>>,
    pub events: EventRecorder,
}

impl TestHarness {
    /// Inline engine, order fixture loaded but not bound.
    pub fn new() -> Self {
        Self::with_mode(EngineMode::Inline)
    }

    pub fn with_mode(mode: EngineMode) -> Self {
        let execution_mode = match mode {
            EngineMode::Inline => ExecutionMode::SingleThreaded,
            EngineMode::Manual | EngineMode::Threaded => ExecutionMode::Parallel,
        };
        let config = ProviderConfig {
            execution_mode,
            ..ProviderConfig::default()
        };
        Self::with_records(mode, config, OrderFixture::orders())
    }

    pub fn with_records(mode: EngineMode, config: ProviderConfig, records: Vec<Arc<Record>>) -> Self {
        let engine = ListEngine::new(mode);
        let provider = LocalDataProvider::with_config(engine.clone(), config);
        let source = ItemCollection::new(records.iter().map(as_item).collect());
        let events = EventRecorder::attach(&provider);
        TestHarness {
            provider,
            engine,
            source,
            records,
            events,
        }
    }

    /// Inline engine with the orders bound and the initial refresh done.
    pub fn with_orders() -> Self {
        let harness = Self::new();
        harness.bind();
        harness.events.clear();
        harness.engine.clear_calls();
        harness
    }

    pub fn bind(&self) {
        self.provider.set_items_source(Some(self.source.clone()));
    }

    pub fn record(&self, id: u64) -> Arc<Record> {
        self.records
            .iter()
            .find(|r| r.id() == id)
            .cloned()
            .unwrap_or_else(|| panic!("no record {}", id))
    }

    pub fn item(&self, id: u64) -> ItemRef {
        as_item(&self.record(id))
    }

    /// Writes a member and raises the property notification.
    pub fn set_value(&self, id: u64, field: &str, value: impl Into<Value>) {
        let record = self.record(id);
        record.set(field, value).unwrap();
        self.source.notify_property_changed(&as_item(&record), field);
    }

    pub fn rows(&self) -> Vec<u64> {
        self.engine.rows()
    }
}
