//! FILENAME: core/data-provider/src/descriptions.rs
//! PURPOSE: Field metadata acquisition contract.
//! CONTEXT: Metadata may come from a remote schema service, so the contract
//! is callback based. The provider issues at most one request at a time and
//! checks on arrival that the answering provider is still the assigned one.

use std::sync::Arc;

use data_model::{DataResult, FieldInfoData};
use parking_lot::Mutex;

use crate::source::SourceView;
use crate::{log_debug, log_info};

/// What a field description provider is asked to describe.
#[derive(Clone)]
pub struct DescriptionsRequest {
    pub source: Arc<dyn SourceView>,
}

pub type DescriptionsCallback = Box<dyn FnOnce(DataResult<Arc<FieldInfoData>>) + Send>;

pub trait FieldDescriptionProvider: Send + Sync {
    /// Metadata for the last request is available.
    fn is_ready(&self) -> bool;

    /// A request is in flight.
    fn is_busy(&self) -> bool;

    /// Starts acquisition. `callback` runs exactly once, on any thread,
    /// possibly before this call returns.
    fn request_descriptions(&self, request: DescriptionsRequest, callback: DescriptionsCallback);
}

/// Derives fields from the schema of the first source item.
#[derive(Debug, Default)]
pub struct LocalFieldDescriptionProvider {
    data: Mutex<Option<Arc<FieldInfoData>>>,
}

impl LocalFieldDescriptionProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl FieldDescriptionProvider for LocalFieldDescriptionProvider {
    fn is_ready(&self) -> bool {
        self.data.lock().is_some()
    }

    fn is_busy(&self) -> bool {
        false
    }

    fn request_descriptions(&self, request: DescriptionsRequest, callback: DescriptionsCallback) {
        let data = match request.source.items().first() {
            Some(item) => FieldInfoData::from_schema(&item.schema()),
            None => {
                log_debug!("FIELDS", "empty source, no fields discovered");
                FieldInfoData::default()
            }
        };
        log_info!("FIELDS", "discovered {} fields", data.len());
        let data = Arc::new(data);
        *self.data.lock() = Some(Arc::clone(&data));
        callback(Ok(data));
    }
}
