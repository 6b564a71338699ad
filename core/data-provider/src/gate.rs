//! FILENAME: core/data-provider/src/gate.rs
//! Busy/idle gate serializing pending-change drains with incoming changes.
//!
//! The gate is re-entrant for the thread holding it: a completion handler
//! running inline inside `rebuild` may enter again, and a holder asking to
//! wait for idleness returns immediately instead of deadlocking on itself.

use std::thread::{self, ThreadId};

use parking_lot::{Condvar, Mutex};

#[derive(Debug, Default)]
struct GateState {
    owner: Option<ThreadId>,
    depth: usize,
}

#[derive(Debug, Default)]
pub struct IdleGate {
    state: Mutex<GateState>,
    idle: Condvar,
}

pub struct GateGuard<'a> {
    gate: &'a IdleGate,
}

impl IdleGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn enter(&self) -> GateGuard<'_> {
        let me = thread::current().id();
        let mut state = self.state.lock();
        loop {
            match state.owner {
                None => {
                    state.owner = Some(me);
                    state.depth = 1;
                    break;
                }
                Some(owner) if owner == me => {
                    state.depth += 1;
                    break;
                }
                Some(_) => self.idle.wait(&mut state),
            }
        }
        GateGuard { gate: self }
    }

    /// Blocks until no other thread holds the gate.
    pub fn wait_idle(&self) {
        let me = thread::current().id();
        let mut state = self.state.lock();
        while let Some(owner) = state.owner {
            if owner == me {
                return;
            }
            self.idle.wait(&mut state);
        }
    }

    pub fn is_busy(&self) -> bool {
        self.state.lock().owner.is_some()
    }
}

impl Drop for GateGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.gate.state.lock();
        state.depth = state.depth.saturating_sub(1);
        if state.depth == 0 {
            state.owner = None;
            self.gate.idle.notify_all();
        }
    }
}
