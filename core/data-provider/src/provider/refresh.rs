//! FILENAME: core/data-provider/src/provider/refresh.rs
//! PURPOSE: Full refresh cycle: metadata acquisition, snapshot, rebuild and
//! completion handling.
//! CONTEXT: Decisions are taken under the state lock and turned into a
//! `RefreshPlan`. The plan is executed, and queued events are flushed, only
//! after the lock is released, because the engine and the field provider
//! may call straight back into the coordinator.

use std::sync::Arc;

use data_model::{DataError, DataResult, FieldInfoData, ItemRef};

use super::state::ProviderState;
use super::Shared;
use crate::descriptions::{
    DescriptionsRequest, FieldDescriptionProvider, LocalFieldDescriptionProvider,
};
use crate::engine::{EngineCompletion, EngineStatus, ExecutionMode};
use crate::events::ProviderEvent;
use crate::snapshot::{DataChangeFlags, RefreshSnapshot};
use crate::source::SourceView;
use crate::status::DataProviderStatus;
use crate::{log_debug, log_enter, log_error, log_exit, log_info, log_warn};

enum RefreshPlan {
    Idle,
    RequestDescriptions {
        provider: Arc<dyn FieldDescriptionProvider>,
        request: DescriptionsRequest,
        generation: u64,
    },
    Rebuild {
        snapshot: Arc<RefreshSnapshot>,
        mode: ExecutionMode,
    },
}

impl Shared {
    pub(crate) fn flush(&self, out: Vec<ProviderEvent>) {
        self.events.emit_all(out);
    }

    /// Marks the view stale and refreshes right away unless a defer scope,
    /// initialization or defer-updates holds it back.
    pub(crate) fn invalidate(&self, flags: DataChangeFlags) {
        let refresh_now = {
            let mut st = self.state.lock();
            st.pending_flags |= flags;
            if st.invalidated {
                false
            } else {
                st.invalidated = true;
                st.can_refresh()
            }
        };
        if refresh_now {
            self.refresh(DataChangeFlags::empty());
        }
    }

    /// Runs the refresh a closed defer/init scope was holding back.
    pub(crate) fn on_edit_completed(&self) {
        let refresh_now = {
            let st = self.state.lock();
            st.invalidated && st.can_refresh()
        };
        if refresh_now {
            self.refresh(DataChangeFlags::empty());
        }
    }

    pub(crate) fn refresh(&self, flags: DataChangeFlags) {
        log_enter!("PROVIDER", "refresh", "flags={:?}", flags);
        let mut out = Vec::new();
        let plan = {
            let _gate = self.gate.enter();
            let source = {
                let st = self.state.lock();
                st.source.as_ref().map(|b| (Arc::clone(&b.view), b.generation))
            };
            // Read the source outside the state lock.
            let captured = source.map(|(view, generation)| (view.items(), view, generation));
            let mut st = self.state.lock();
            Self::plan_refresh(&mut st, flags, captured, &mut out)
        };
        self.flush(out);
        self.execute(plan);
        log_exit!("PROVIDER", "refresh");
    }

    fn plan_refresh(
        st: &mut ProviderState,
        flags: DataChangeFlags,
        captured: Option<(Vec<ItemRef>, Arc<dyn SourceView>, u64)>,
        out: &mut Vec<ProviderEvent>,
    ) -> RefreshPlan {
        st.invalidated = false;
        st.pending_flags |= flags;

        let Some((items, view, generation)) = captured else {
            log_debug!("PROVIDER", "refresh skipped: no items source");
            return RefreshPlan::Idle;
        };
        if !st.is_current_source(generation) {
            log_debug!("PROVIDER", "refresh skipped: items source replaced");
            return RefreshPlan::Idle;
        }
        if let Some(epoch) = st.in_flight {
            log_debug!("PROVIDER", "rebuild {} in flight, queueing refresh", epoch);
            st.queued_refresh = true;
            return RefreshPlan::Idle;
        }

        let Some(descriptions) = st.descriptions.clone() else {
            st.refresh_requested = true;
            if st.descriptions_pending && !st.descriptions_deferred {
                log_debug!("FIELDS", "descriptions already requested");
                return RefreshPlan::Idle;
            }
            let provider = Arc::clone(st.field_provider.get_or_insert_with(|| {
                Arc::new(LocalFieldDescriptionProvider::new()) as Arc<dyn FieldDescriptionProvider>
            }));
            // Stays deferred until `execute` actually sends the request.
            st.descriptions_pending = true;
            st.descriptions_deferred = true;
            st.set_status(DataProviderStatus::RequestingData, false, None, out);
            return RefreshPlan::RequestDescriptions {
                provider,
                request: DescriptionsRequest { source: view },
                generation: st.descriptions_generation,
            };
        };

        st.settings.bind_all(&descriptions);
        st.refresh_requested = false;
        // The captured items already contain every queued change.
        st.pending.clear();
        let epoch = st.next_epoch();
        let flags = std::mem::replace(&mut st.pending_flags, DataChangeFlags::empty());
        let snapshot = Arc::new(RefreshSnapshot::capture(&st.settings, items, epoch, flags));
        st.value_provider = Some(Arc::clone(&snapshot));
        st.in_flight = Some(epoch);
        st.set_status(DataProviderStatus::ProcessingData, false, None, out);
        RefreshPlan::Rebuild {
            snapshot,
            mode: st.execution_mode,
        }
    }

    fn execute(&self, plan: RefreshPlan) {
        match plan {
            RefreshPlan::Idle => {}
            RefreshPlan::RequestDescriptions {
                provider,
                request,
                generation,
            } => {
                if provider.is_busy() {
                    log_debug!("FIELDS", "provider busy, request deferred until it replies");
                    return;
                }
                {
                    let mut st = self.state.lock();
                    if generation != st.descriptions_generation || !st.descriptions_deferred {
                        return;
                    }
                    st.descriptions_deferred = false;
                }
                log_info!("FIELDS", "requesting field descriptions generation={}", generation);
                let me = self.me.clone();
                provider.request_descriptions(
                    request,
                    Box::new(move |result| {
                        if let Some(shared) = me.upgrade() {
                            shared.on_descriptions_ready(generation, result);
                        }
                    }),
                );
            }
            RefreshPlan::Rebuild { snapshot, mode } => {
                log_info!(
                    "PROVIDER",
                    "rebuild epoch={} items={} mode={:?} flags={:?}",
                    snapshot.epoch(),
                    snapshot.items().len(),
                    mode,
                    snapshot.flags()
                );
                match mode {
                    ExecutionMode::SingleThreaded => self.engine.rebuild(snapshot),
                    ExecutionMode::Parallel => self.engine.rebuild_parallel(snapshot),
                }
            }
        }
    }

    pub(crate) fn on_descriptions_ready(
        &self,
        generation: u64,
        result: DataResult<Arc<FieldInfoData>>,
    ) {
        let mut out = Vec::new();
        let refresh_now = {
            let mut st = self.state.lock();
            if generation != st.descriptions_generation {
                log_warn!(
                    "FIELDS",
                    "ignoring descriptions for generation {} (current {})",
                    generation,
                    st.descriptions_generation
                );
                // The provider is free again; send what was held back for it.
                let retry = st.descriptions_deferred;
                drop(st);
                if retry {
                    self.refresh(DataChangeFlags::DESCRIPTIONS);
                }
                return;
            }
            st.descriptions_pending = false;
            st.descriptions_deferred = false;
            match result {
                Ok(data) => {
                    log_info!("FIELDS", "descriptions ready: {} fields", data.len());
                    st.settings.bind_all(&data);
                    st.descriptions = Some(data);
                    st.set_status(DataProviderStatus::DescriptionsReady, false, None, &mut out);
                    out.push(ProviderEvent::FieldDescriptionsChanged);
                    st.refresh_requested
                }
                Err(error) => {
                    log_error!("FIELDS", "field descriptions failed: {}", error);
                    st.refresh_requested = false;
                    st.set_status(DataProviderStatus::Uninitialized, true, Some(error), &mut out);
                    false
                }
            }
        };
        self.flush(out);
        if refresh_now {
            self.refresh(DataChangeFlags::DESCRIPTIONS);
        }
    }

    pub(crate) fn on_engine_completed(&self, completion: EngineCompletion) {
        log_debug!(
            "ENGINE",
            "completion epoch={} status={:?} errors={}",
            completion.epoch,
            completion.status,
            completion.errors.len()
        );
        let mut out = Vec::new();
        let rerun = {
            let _gate = self.gate.enter();
            {
                let mut st = self.state.lock();
                if st.in_flight != Some(completion.epoch) {
                    log_debug!(
                        "ENGINE",
                        "ignoring stale completion epoch={} in_flight={:?}",
                        completion.epoch,
                        st.in_flight
                    );
                    return;
                }
                match completion.status {
                    EngineStatus::InProgress => {
                        st.set_status(DataProviderStatus::ProcessingData, false, None, &mut out);
                    }
                    EngineStatus::Completed => st.in_flight = None,
                    EngineStatus::Faulted => {
                        st.in_flight = None;
                        let error = completion.errors.into_iter().next().unwrap_or_else(|| {
                            DataError::Engine("engine reported a fault".to_string())
                        });
                        log_error!("ENGINE", "rebuild faulted: {}", error);
                        st.set_status(DataProviderStatus::Faulted, true, Some(error), &mut out);
                    }
                }
            }
            if completion.status == EngineStatus::Completed {
                self.drain_pending(&mut out);
            }
            let mut st = self.state.lock();
            st.in_flight.is_none() && std::mem::take(&mut st.queued_refresh)
        };
        self.flush(out);
        if rerun {
            log_debug!("PROVIDER", "running queued refresh");
            self.refresh(DataChangeFlags::empty());
        }
    }

    /// Replays changes that queued up during the rebuild. `Ready` is set in
    /// the same critical section that finds the queue empty.
    fn drain_pending(&self, out: &mut Vec<ProviderEvent>) {
        loop {
            let next = {
                let mut st = self.state.lock();
                if st.queued_refresh || st.in_flight.is_some() {
                    return;
                }
                match st.pending.pop_front() {
                    Some(change) => change,
                    None => {
                        st.set_status(DataProviderStatus::Ready, true, None, out);
                        return;
                    }
                }
            };
            self.process_change(next);
        }
    }
}
