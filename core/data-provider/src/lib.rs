//! FILENAME: core/data-provider/src/lib.rs
//! Data view coordinator.
//!
//! Turns an observable item collection into a grouped, sorted, filtered and
//! aggregated view computed by a pluggable `DataEngine`, keeping the view
//! consistent while the source, the view rules and the engine all change
//! underneath it.

pub mod config;
pub mod descriptions;
pub mod engine;
pub mod events;
pub mod gate;
pub mod logging;
pub mod provider;
pub mod snapshot;
pub mod source;
pub mod status;

#[doc(hidden)]
pub use log;

pub use config::ProviderConfig;
pub use descriptions::{
    DescriptionsCallback, DescriptionsRequest, FieldDescriptionProvider,
    LocalFieldDescriptionProvider,
};
pub use engine::{
    AddRemoveResult, CompletionHandler, DataEngine, EngineCompletion, EngineStatus, ExecutionMode,
};
pub use events::{CollectionChange, ViewChangedEvent, ViewChangingEvent};
pub use provider::{DeferGuard, LocalDataProvider};
pub use snapshot::{DataChangeFlags, GroupPath, RefreshSnapshot, SortComparer, ValueProvider};
pub use source::{
    BatchLoader, BatchLoadingStatus, CollectionAction, CollectionChangedArgs, ItemCollection,
    SourceObserver, SourceView,
};
pub use status::{DataProviderStatus, StatusChangedEvent};
