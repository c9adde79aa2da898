#![forbid(unsafe_code)]

mod fixtures;
mod monitor;

use aura_sentinel_domain::{
    compute_record_digest, now_utc, DecisionRecord, EngineKind, RecordId, StageOutput,
    StageTrace, WorkflowDescriptor,
};
use aura_sentinel_engine::CognitiveEngine;
use aura_sentinel_policy::{extract_self_evaluation, halt_after, verdict_for};
use aura_sentinel_records::{DecisionRecordStore, InMemoryDecisionStore};
use serde_json::{json, Map, Value};
use tracing::{debug, info, info_span};

pub use fixtures::{fixture_assets, perception_bundle, seed_context};
pub use monitor::{CycleMonitor, CyclePhase, CycleSnapshot, RunGuard};

pub const ANCHOR_PREFIX: &str = "0xWeilChain";
pub const UNSIGNED: &str = "unsigned";
const ANCHOR_DIGEST_CHARS: usize = 12;

#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error("a cognitive cycle is already running")]
    AlreadyRunning,
    #[error("no active workflow is set")]
    NoActiveWorkflow,
    #[error("decision record store failed: {0}")]
    Store(String),
    #[error("serialization failed: {0}")]
    Serialization(String),
}

#[derive(Debug, Clone)]
pub struct CycleConfig {
    /// Stop after a faulted stage and report `Halted`.
    pub halt_on_fault: bool,
    pub engine_version: String,
    /// Replaces the fixture seed when set.
    pub seed_context: Option<Value>,
}

impl Default for CycleConfig {
    fn default() -> Self {
        Self {
            halt_on_fault: false,
            engine_version: "aura-sentinel.v0".to_string(),
            seed_context: None,
        }
    }
}

/// Progress callbacks fired while a cycle runs.
pub trait CycleObserver {
    fn stage_started(&self, _stage: EngineKind) {}

    fn trace_recorded(&self, _trace: &StageTrace) {}
}

#[must_use]
pub fn anchor_reference(record_digest: &str) -> String {
    let short = record_digest
        .get(..ANCHOR_DIGEST_CHARS)
        .unwrap_or(record_digest);
    format!("{ANCHOR_PREFIX}{short}")
}

/// Payload handed to the next stage: the stage's own fields plus its
/// confidence, without the variant tag.
///
/// # Errors
/// Returns an error if the output cannot be serialized.
pub fn previous_step_payload(trace: &StageTrace) -> Result<Value, CycleError> {
    let fields = match &trace.output {
        StageOutput::Report(report) => serde_json::to_value(report),
        StageOutput::Fault(fault) => serde_json::to_value(fault),
    }
    .map_err(|err| CycleError::Serialization(err.to_string()))?;
    let mut payload = match fields {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    payload.insert("confidence".to_string(), json!(trace.confidence));
    Ok(Value::Object(payload))
}

/// Merge a stage's output into the context under `previousStep`.
///
/// # Errors
/// Returns an error if the output cannot be serialized.
pub fn merge_previous_step(context: &mut Value, trace: &StageTrace) -> Result<(), CycleError> {
    let previous = previous_step_payload(trace)?;
    if let Value::Object(map) = context {
        map.insert("previousStep".to_string(), previous);
    } else {
        let input = context.take();
        *context = json!({ "input": input, "previousStep": previous });
    }
    Ok(())
}

pub struct Orchestrator<'a> {
    engine: &'a dyn CognitiveEngine,
    store: &'a dyn DecisionRecordStore,
    monitor: &'a CycleMonitor,
    observer: Option<&'a dyn CycleObserver>,
}

impl<'a> Orchestrator<'a> {
    #[must_use]
    pub fn new(
        engine: &'a dyn CognitiveEngine,
        store: &'a dyn DecisionRecordStore,
        monitor: &'a CycleMonitor,
    ) -> Self {
        Self {
            engine,
            store,
            monitor,
            observer: None,
        }
    }

    #[must_use]
    pub fn with_observer(mut self, observer: &'a dyn CycleObserver) -> Self {
        self.observer = Some(observer);
        self
    }

    /// Run one cognitive cycle for `workflow` and append the resulting record
    /// to the store.
    ///
    /// # Errors
    /// Returns an error when another run holds the monitor, when the context
    /// or record cannot be serialized, or when the store rejects the record.
    pub fn run(
        &self,
        workflow: &WorkflowDescriptor,
        config: &CycleConfig,
    ) -> Result<DecisionRecord, CycleError> {
        let guard = self.monitor.begin()?;
        let span = info_span!("cycle", workflow_id = %workflow.workflow_id);
        let _entered = span.enter();
        info!(
            mode = ?self.engine.mode(),
            engine_version = %config.engine_version,
            "cognitive cycle started"
        );

        let mut context = match &config.seed_context {
            Some(seed) => seed.clone(),
            None => seed_context(&workflow.objective)
                .map_err(|err| CycleError::Serialization(format!("{err:#}")))?,
        };
        let mut traces = Vec::with_capacity(EngineKind::COGNITIVE_CYCLE.len());
        let mut halt = None;

        for stage in EngineKind::COGNITIVE_CYCLE {
            self.monitor.mark_active(stage);
            debug!(stage = %stage, "stage started");
            if let Some(observer) = self.observer {
                observer.stage_started(stage);
            }

            let trace = self.engine.invoke(stage, &context);
            info!(
                stage = %stage,
                latency_ms = trace.latency_ms,
                confidence = trace.confidence,
                "stage completed"
            );
            merge_previous_step(&mut context, &trace)?;
            self.monitor.record_trace(&trace);
            if let Some(observer) = self.observer {
                observer.trace_recorded(&trace);
            }

            halt = halt_after(&trace, config.halt_on_fault);
            traces.push(trace);
            if halt.is_some() {
                break;
            }
        }

        let verdict = verdict_for(halt);
        let self_evaluation = extract_self_evaluation(&traces);
        let record_digest = compute_record_digest(workflow.workflow_id, verdict, &traces)
            .map_err(|err| CycleError::Serialization(format!("{err:#}")))?;

        let record = DecisionRecord {
            record_id: RecordId::new(),
            workflow_id: workflow.workflow_id,
            completed_at: now_utc(),
            verdict,
            traces,
            self_evaluation,
            anchor_ref: Some(anchor_reference(&record_digest)),
            record_digest,
            signature: UNSIGNED.to_string(),
        };
        self.store
            .append(record.clone())
            .map_err(|err| CycleError::Store(format!("{err:#}")))?;
        guard.complete();

        info!(
            record_id = %record.record_id,
            verdict = record.verdict.as_str(),
            stages = record.traces.len(),
            "cognitive cycle complete"
        );
        Ok(record)
    }
}

/// Session-scoped state: the active workflow, the running-state monitor and
/// the record history.
#[derive(Debug, Default)]
pub struct Session {
    active_workflow: Option<WorkflowDescriptor>,
    monitor: CycleMonitor,
    store: InMemoryDecisionStore,
}

impl Session {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_store(store: InMemoryDecisionStore) -> Self {
        Self {
            active_workflow: None,
            monitor: CycleMonitor::new(),
            store,
        }
    }

    /// Replace the active workflow; returns the previous one.
    pub fn set_active_workflow(
        &mut self,
        workflow: WorkflowDescriptor,
    ) -> Option<WorkflowDescriptor> {
        debug!(workflow_id = %workflow.workflow_id, "active workflow set");
        self.active_workflow.replace(workflow)
    }

    pub fn clear_active_workflow(&mut self) -> Option<WorkflowDescriptor> {
        self.active_workflow.take()
    }

    #[must_use]
    pub fn active_workflow(&self) -> Option<&WorkflowDescriptor> {
        self.active_workflow.as_ref()
    }

    #[must_use]
    pub fn monitor(&self) -> &CycleMonitor {
        &self.monitor
    }

    #[must_use]
    pub fn store(&self) -> &InMemoryDecisionStore {
        &self.store
    }

    /// Run one cycle for the active workflow.
    ///
    /// # Errors
    /// Returns `CycleError::NoActiveWorkflow` when none is set, otherwise any
    /// error from [`Orchestrator::run`].
    pub fn run_active(
        &self,
        engine: &dyn CognitiveEngine,
        config: &CycleConfig,
        observer: Option<&dyn CycleObserver>,
    ) -> Result<DecisionRecord, CycleError> {
        let workflow = self
            .active_workflow
            .as_ref()
            .ok_or(CycleError::NoActiveWorkflow)?;
        let mut orchestrator = Orchestrator::new(engine, &self.store, &self.monitor);
        if let Some(observer) = observer {
            orchestrator = orchestrator.with_observer(observer);
        }
        orchestrator.run(workflow, config)
    }
}
