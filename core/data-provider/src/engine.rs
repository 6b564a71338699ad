//! FILENAME: core/data-provider/src/engine.rs
//! PURPOSE: Contract between the provider and a pluggable computation engine.
//! CONTEXT: The engine owns the cube. The provider hands it one refresh
//! snapshot per full rebuild and forwards single-item changes as incremental
//! insert/remove calls while the engine is idle.

use std::sync::Arc;

use data_model::{DataError, ItemRef};
use serde::{Deserialize, Serialize};

use crate::snapshot::{GroupPath, RefreshSnapshot};

/// Tri-state result reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EngineStatus {
    InProgress,
    Completed,
    Faulted,
}

/// One completion report. `epoch` is the epoch of the snapshot the engine
/// was working on; reports for superseded snapshots are dropped.
#[derive(Debug, Clone)]
pub struct EngineCompletion {
    pub status: EngineStatus,
    pub errors: Vec<DataError>,
    pub epoch: u64,
}

impl EngineCompletion {
    pub fn completed(epoch: u64) -> Self {
        EngineCompletion {
            status: EngineStatus::Completed,
            errors: Vec::new(),
            epoch,
        }
    }

    pub fn faulted(epoch: u64, error: DataError) -> Self {
        EngineCompletion {
            status: EngineStatus::Faulted,
            errors: vec![error],
            epoch,
        }
    }
}

/// Position of an item in the computed view after an incremental change.
#[derive(Debug, Clone)]
pub struct AddRemoveResult {
    pub item: ItemRef,
    /// Row index in the view, if the item is (or was) visible.
    pub index: Option<usize>,
    /// Row group names of the item, outermost first.
    pub group_path: GroupPath,
}

pub type CompletionHandler = Arc<dyn Fn(EngineCompletion) + Send + Sync>;

/// How full rebuilds are dispatched.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum ExecutionMode {
    SingleThreaded,
    #[default]
    Parallel,
}

pub trait DataEngine: Send + Sync {
    /// Installs the callback receiving completion reports. The engine must
    /// not hold its own locks while invoking it; the handler may call back
    /// into `insert`/`remove`.
    fn set_completion_handler(&self, handler: CompletionHandler);

    /// Drops all computed state. Synchronous, reports no completion.
    fn clear(&self, snapshot: Arc<RefreshSnapshot>);

    /// Rebuilds on the calling thread, then reports exactly one completion.
    fn rebuild(&self, snapshot: Arc<RefreshSnapshot>);

    /// Starts a rebuild off the calling thread and returns immediately.
    /// Reports exactly one final completion, possibly preceded by
    /// `InProgress` reports.
    fn rebuild_parallel(&self, snapshot: Arc<RefreshSnapshot>);

    /// Inserts items at the given source position (engines with an active
    /// sort place them by the snapshot comparer instead).
    fn insert(&self, index: Option<usize>, items: &[ItemRef]) -> Vec<AddRemoveResult>;

    /// Removes items. `index` is a hint only; `exhaustive_search` forces a
    /// scan of the whole view, `can_use_comparer` allows locating the item
    /// by its sort key (only valid when the sort key has not changed).
    fn remove(
        &self,
        index: Option<usize>,
        items: &[ItemRef],
        exhaustive_search: bool,
        can_use_comparer: bool,
    ) -> Vec<AddRemoveResult>;

    /// Blocks until no rebuild is running.
    fn wait_until_idle(&self);
}
