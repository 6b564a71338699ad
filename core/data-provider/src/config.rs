//! FILENAME: core/data-provider/src/config.rs
//! PURPOSE: Serializable provider options.

use data_model::{DataAxis, DataError, DataResult};
use serde::{Deserialize, Serialize};

use crate::engine::ExecutionMode;
use crate::log_debug;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct ProviderConfig {
    pub execution_mode: ExecutionMode,
    /// Suppresses automatic refreshes; the owner calls `refresh` itself.
    pub defer_updates: bool,
    pub aggregates_position: DataAxis,
    pub aggregates_level: Option<usize>,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        ProviderConfig {
            execution_mode: ExecutionMode::Parallel,
            defer_updates: false,
            aggregates_position: DataAxis::Columns,
            aggregates_level: None,
        }
    }
}

impl ProviderConfig {
    pub fn from_json(json: &str) -> DataResult<Self> {
        let config: ProviderConfig =
            serde_json::from_str(json).map_err(|e| DataError::Config(e.to_string()))?;
        log_debug!("CONFIG", "loaded {:?}", config);
        Ok(config)
    }

    pub fn to_json(&self) -> DataResult<String> {
        serde_json::to_string_pretty(self).map_err(|e| DataError::Config(e.to_string()))
    }
}
