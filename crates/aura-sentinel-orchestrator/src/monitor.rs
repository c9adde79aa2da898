use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use aura_sentinel_domain::{EngineKind, StageTrace};

use crate::CycleError;

#[derive(Debug, Clone, Copy, Eq, PartialEq, Default)]
pub enum CyclePhase {
    #[default]
    Idle,
    Running,
    Complete,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleSnapshot {
    pub phase: CyclePhase,
    pub active_stage: Option<EngineKind>,
    pub traces: Vec<StageTrace>,
}

/// Observable running state of the cycle: the executing stage and the traces
/// produced so far. Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct CycleMonitor {
    state: Arc<Mutex<CycleSnapshot>>,
}

impl CycleMonitor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn snapshot(&self) -> CycleSnapshot {
        self.lock().clone()
    }

    #[must_use]
    pub fn phase(&self) -> CyclePhase {
        self.lock().phase
    }

    #[must_use]
    pub fn active_stage(&self) -> Option<EngineKind> {
        self.lock().active_stage
    }

    #[must_use]
    pub fn traces(&self) -> Vec<StageTrace> {
        self.lock().traces.clone()
    }

    #[must_use]
    pub fn is_running(&self) -> bool {
        self.phase() == CyclePhase::Running
    }

    /// Claim the monitor for one run. The claim is released when the guard
    /// drops; an unfinished guard returns the monitor to `Idle`.
    ///
    /// # Errors
    /// Returns `CycleError::AlreadyRunning` while another run holds the claim.
    pub fn begin(&self) -> Result<RunGuard<'_>, CycleError> {
        let mut state = self.lock();
        if state.phase == CyclePhase::Running {
            return Err(CycleError::AlreadyRunning);
        }
        *state = CycleSnapshot {
            phase: CyclePhase::Running,
            active_stage: None,
            traces: Vec::new(),
        };
        Ok(RunGuard {
            monitor: self,
            finished: false,
        })
    }

    pub(crate) fn mark_active(&self, stage: EngineKind) {
        self.lock().active_stage = Some(stage);
    }

    pub(crate) fn record_trace(&self, trace: &StageTrace) {
        self.lock().traces.push(trace.clone());
    }

    fn lock(&self) -> MutexGuard<'_, CycleSnapshot> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[derive(Debug)]
pub struct RunGuard<'m> {
    monitor: &'m CycleMonitor,
    finished: bool,
}

impl RunGuard<'_> {
    pub fn complete(mut self) {
        self.finished = true;
        let mut state = self.monitor.lock();
        state.phase = CyclePhase::Complete;
        state.active_stage = None;
    }
}

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        if !self.finished {
            let mut state = self.monitor.lock();
            state.phase = CyclePhase::Idle;
            state.active_stage = None;
        }
    }
}
