//! FILENAME: core/data-provider/src/status.rs

use data_model::DataError;
use serde::{Deserialize, Serialize};

use crate::engine::EngineStatus;

/// Lifecycle of a data provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum DataProviderStatus {
    #[default]
    Uninitialized,
    Initializing,
    RequestingData,
    DescriptionsReady,
    ProcessingData,
    DataLoadingCompleted,
    Ready,
    Faulted,
}

impl DataProviderStatus {
    /// Maps an engine completion status onto the provider lifecycle.
    pub fn from_engine(status: EngineStatus) -> Self {
        match status {
            EngineStatus::InProgress => DataProviderStatus::ProcessingData,
            EngineStatus::Completed => DataProviderStatus::Ready,
            EngineStatus::Faulted => DataProviderStatus::Faulted,
        }
    }
}

/// Payload of `status_changed`.
#[derive(Debug, Clone, PartialEq)]
pub struct StatusChangedEvent {
    pub status: DataProviderStatus,
    /// No further status change follows for the current request.
    pub is_final: bool,
    pub error: Option<DataError>,
}
