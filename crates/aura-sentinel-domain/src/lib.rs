#![forbid(unsafe_code)]

use anyhow::{anyhow, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use time::OffsetDateTime;
use ulid::Ulid;

pub type DateTimeUtc = OffsetDateTime;

/// Input fingerprint carried by traces whose engine call faulted.
pub const ERROR_FINGERPRINT: &str = "ERROR";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct WorkflowId(pub Ulid);

impl WorkflowId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for WorkflowId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct StepId(pub Ulid);

impl StepId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for StepId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StepId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct RecordId(pub Ulid);

impl RecordId {
    #[must_use]
    pub fn new() -> Self {
        Self(Ulid::new())
    }
}

impl Default for RecordId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RecordId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The eight cognitive engines. `Memory` is reserved: it is a valid kind but
/// is never scheduled by the cognitive cycle.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EngineKind {
    Perception,
    WorldModel,
    Planning,
    Policy,
    Execution,
    Memory,
    MetaReasoning,
    SelfEvaluation,
}

impl EngineKind {
    pub const ALL: [Self; 8] = [
        Self::Perception,
        Self::WorldModel,
        Self::Planning,
        Self::Policy,
        Self::Execution,
        Self::Memory,
        Self::MetaReasoning,
        Self::SelfEvaluation,
    ];

    /// Fixed execution order of one cognitive cycle.
    pub const COGNITIVE_CYCLE: [Self; 7] = [
        Self::Perception,
        Self::WorldModel,
        Self::Planning,
        Self::MetaReasoning,
        Self::Policy,
        Self::Execution,
        Self::SelfEvaluation,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Perception => "PERCEPTION",
            Self::WorldModel => "WORLD_MODEL",
            Self::Planning => "PLANNING",
            Self::Policy => "POLICY",
            Self::Execution => "EXECUTION",
            Self::Memory => "MEMORY",
            Self::MetaReasoning => "META_REASONING",
            Self::SelfEvaluation => "SELF_EVALUATION",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_uppercase().replace('-', "_").as_str() {
            "PERCEPTION" => Some(Self::Perception),
            "WORLD_MODEL" => Some(Self::WorldModel),
            "PLANNING" => Some(Self::Planning),
            "POLICY" => Some(Self::Policy),
            "EXECUTION" => Some(Self::Execution),
            "MEMORY" => Some(Self::Memory),
            "META_REASONING" => Some(Self::MetaReasoning),
            "SELF_EVALUATION" => Some(Self::SelfEvaluation),
            _ => None,
        }
    }

    #[must_use]
    pub fn is_scheduled(self) -> bool {
        Self::COGNITIVE_CYCLE.contains(&self)
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Approved,
    Rejected,
    Halted,
}

impl Verdict {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approved => "APPROVED",
            Self::Rejected => "REJECTED",
            Self::Halted => "HALTED",
        }
    }
}

/// Structured result reported by an engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct StageReport {
    pub summary: String,
    /// Opaque payload, usually a serialized JSON document.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub flags: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct StageFault {
    pub error: String,
    pub details: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum StageOutput {
    Report(StageReport),
    Fault(StageFault),
}

impl StageOutput {
    /// Human-readable summary; faults carry none.
    #[must_use]
    pub fn summary(&self) -> Option<&str> {
        match self {
            Self::Report(report) => Some(report.summary.as_str()),
            Self::Fault(_) => None,
        }
    }

    #[must_use]
    pub fn is_fault(&self) -> bool {
        matches!(self, Self::Fault(_))
    }
}

/// One engine invocation within one cycle run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StageTrace {
    pub step_id: StepId,
    pub stage: EngineKind,
    #[serde(with = "time::serde::rfc3339")]
    pub recorded_at: DateTimeUtc,
    pub input_hash: String,
    pub output: StageOutput,
    pub confidence: f64,
    pub latency_ms: u64,
}

impl StageTrace {
    #[must_use]
    pub fn is_fault(&self) -> bool {
        self.output.is_fault() || self.input_hash == ERROR_FINGERPRINT
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SelfEvaluation {
    pub score: f64,
    pub feedback: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct WorkflowDescriptor {
    pub workflow_id: WorkflowId,
    pub name: String,
    pub objective: String,
    pub trigger_event: String,
    /// Advisory only; the cycle order is fixed.
    pub required_engines: Vec<EngineKind>,
    pub owner: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: DateTimeUtc,
}

/// Terminal artifact of one cognitive cycle run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DecisionRecord {
    pub record_id: RecordId,
    pub workflow_id: WorkflowId,
    #[serde(with = "time::serde::rfc3339")]
    pub completed_at: DateTimeUtc,
    pub verdict: Verdict,
    /// Traces in actual execution order.
    pub traces: Vec<StageTrace>,
    pub self_evaluation: Option<SelfEvaluation>,
    pub record_digest: String,
    pub anchor_ref: Option<String>,
    pub signature: String,
}

impl DecisionRecord {
    #[must_use]
    pub fn trace_for(&self, stage: EngineKind) -> Option<&StageTrace> {
        self.traces.iter().find(|trace| trace.stage == stage)
    }

    #[must_use]
    pub fn stages(&self) -> Vec<EngineKind> {
        self.traces.iter().map(|trace| trace.stage).collect()
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetKind {
    Invoice,
    Bond,
    RealEstate,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AssetStatus {
    Pending,
    Tokenized,
    Rejected,
}

/// Tokenized real-world asset. Read-only context for stage invocations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RwaAsset {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: AssetKind,
    pub value: f64,
    pub currency: String,
    pub issuer: String,
    pub risk_score: u32,
    pub status: AssetStatus,
    /// Content-addressed metadata reference.
    pub metadata_hash: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InvoiceStats {
    pub line_items: u32,
    pub tax_code: String,
    pub previous_defaults: u32,
    pub days_outstanding: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MarketConditions {
    pub volatility_index: f64,
    pub sector_outlook: String,
    pub liquidity_score: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct PerceptionBundle {
    pub invoice_data: InvoiceStats,
    pub market_conditions: MarketConditions,
}

#[must_use]
pub fn now_utc() -> DateTimeUtc {
    OffsetDateTime::now_utc()
}

#[must_use]
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Hash a JSON value with stable `serde_json` serialization + SHA-256.
///
/// # Errors
/// Returns an error if JSON serialization fails.
pub fn hash_json(value: &Value) -> Result<String> {
    let bytes = serde_json::to_vec(value)?;
    Ok(hash_bytes(&bytes))
}

/// Ensure a string field is non-empty after trimming.
///
/// # Errors
/// Returns an error when the provided value is empty/whitespace.
pub fn ensure_non_empty(field_name: &str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(anyhow!("{field_name} MUST be non-empty"));
    }
    Ok(())
}

/// Digest over the lineage of a decision record.
///
/// # Errors
/// Returns an error if the traces cannot be serialized.
pub fn compute_record_digest(
    workflow_id: WorkflowId,
    verdict: Verdict,
    traces: &[StageTrace],
) -> Result<String> {
    let material = serde_json::json!({
        "workflow_id": workflow_id,
        "verdict": verdict,
        "traces": traces,
    });
    hash_json(&material)
}

#[cfg(test)]
mod tests {
    use super::{
        compute_record_digest, ensure_non_empty, hash_json, EngineKind, RecordId, StageFault,
        StageOutput, StageReport, Verdict, WorkflowId,
    };
    use serde_json::json;

    #[test]
    fn cognitive_cycle_never_schedules_memory() {
        assert_eq!(EngineKind::COGNITIVE_CYCLE.len(), 7);
        assert!(!EngineKind::Memory.is_scheduled());
        assert!(EngineKind::ALL
            .iter()
            .filter(|kind| **kind != EngineKind::Memory)
            .all(|kind| kind.is_scheduled()));
        assert_eq!(EngineKind::COGNITIVE_CYCLE[3], EngineKind::MetaReasoning);
        assert_eq!(EngineKind::COGNITIVE_CYCLE[4], EngineKind::Policy);
    }

    #[test]
    fn engine_kind_parse_accepts_loose_spelling() {
        assert_eq!(EngineKind::parse("world-model"), Some(EngineKind::WorldModel));
        assert_eq!(
            EngineKind::parse(" self_evaluation "),
            Some(EngineKind::SelfEvaluation)
        );
        assert_eq!(EngineKind::parse("oracle"), None);
        let wire = serde_json::to_value(EngineKind::MetaReasoning);
        assert!(wire.is_ok());
        assert_eq!(wire.unwrap_or_else(|_| unreachable!()), json!("META_REASONING"));
    }

    #[test]
    fn stage_output_is_tagged_and_faults_have_no_summary() {
        let report = StageOutput::Report(StageReport {
            summary: "facts only".to_string(),
            data: None,
            flags: Vec::new(),
        });
        let value = serde_json::to_value(&report);
        assert!(value.is_ok());
        assert_eq!(
            value.unwrap_or_else(|_| unreachable!()),
            json!({"kind": "report", "summary": "facts only"})
        );
        assert_eq!(report.summary(), Some("facts only"));

        let fault = StageOutput::Fault(StageFault {
            error: "Engine Fault".to_string(),
            details: "timeout".to_string(),
        });
        assert!(fault.is_fault());
        assert_eq!(fault.summary(), None);
    }

    #[test]
    fn hash_json_is_stable_and_digest_depends_on_verdict() {
        let value = json!({"objective": "audit", "n": 1});
        let first = hash_json(&value).unwrap_or_else(|_| unreachable!());
        let second = hash_json(&value).unwrap_or_else(|_| unreachable!());
        assert_eq!(first, second);
        assert_eq!(first.len(), 64);

        let workflow_id = WorkflowId::new();
        let approved = compute_record_digest(workflow_id, Verdict::Approved, &[]);
        let rejected = compute_record_digest(workflow_id, Verdict::Rejected, &[]);
        assert!(approved.is_ok() && rejected.is_ok());
        assert_ne!(
            approved.unwrap_or_else(|_| unreachable!()),
            rejected.unwrap_or_else(|_| unreachable!())
        );
    }

    #[test]
    fn ensure_non_empty_rejects_whitespace() {
        assert!(ensure_non_empty("objective", "   ").is_err());
        assert!(ensure_non_empty("objective", "x").is_ok());
    }

    #[test]
    fn record_id_displays_as_it_serializes() {
        let record_id = RecordId::new();
        let wire = serde_json::to_value(record_id);
        assert!(wire.is_ok());
        assert_eq!(
            wire.unwrap_or_else(|_| unreachable!()),
            json!(record_id.to_string())
        );
        assert_eq!(record_id.to_string(), record_id.0.to_string());
    }
}
