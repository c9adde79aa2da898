#![forbid(unsafe_code)]

mod config;

use std::time::{Duration, Instant};

use aura_sentinel_domain::{
    hash_json, now_utc, EngineKind, StageFault, StageOutput, StageReport, StageTrace, StepId,
    ERROR_FINGERPRINT,
};
use rand::Rng;
use serde_json::{json, Value};
use tracing::{debug, warn};

pub use config::{
    EngineConfig, LatencyWindow, API_KEY_VARS, DEFAULT_ENDPOINT, DEFAULT_FAST_MODEL,
    DEFAULT_REASONING_MODEL, DEFAULT_TIMEOUT_MS,
};

/// Confidence reported by every simulated stage.
pub const SIMULATED_CONFIDENCE: f64 = 0.95;

const PROMPT_TRAILER: &str = "Generate the strictly typed output for this engine.\n\
If you have complex data, serialize it as a JSON string in the 'data' field.";

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum EngineMode {
    Simulation,
    Live,
}

/// Engine Stage Invoker. Always produces a trace: faults are folded into a
/// zero-confidence trace instead of being returned to the caller.
pub trait CognitiveEngine {
    fn mode(&self) -> EngineMode;

    fn invoke(&self, stage: EngineKind, context: &Value) -> StageTrace;
}

#[derive(Debug, thiserror::Error, Clone, Eq, PartialEq)]
pub enum EngineFault {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("http status {status}: {body}")]
    HttpStatus { status: u16, body: String },
    #[error("generation backend returned no text")]
    EmptyResponse,
    #[error("response is not valid JSON: {0}")]
    MalformedJson(String),
    #[error("response violates schema: {0}")]
    SchemaViolation(String),
    #[error("engine {0} is reserved and has no role instruction")]
    ReservedEngine(EngineKind),
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ModelTier {
    /// Deeper deliberation, used for planning and policy review.
    Reasoning,
    Fast,
}

#[must_use]
pub fn model_tier(stage: EngineKind) -> ModelTier {
    match stage {
        EngineKind::Planning | EngineKind::Policy => ModelTier::Reasoning,
        _ => ModelTier::Fast,
    }
}

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub struct RoleInstruction {
    pub role: &'static str,
    pub task: &'static str,
    pub constraint: &'static str,
}

impl RoleInstruction {
    #[must_use]
    pub fn system_text(&self) -> String {
        format!(
            "ROLE: {}.\nTASK: {}.\nCONSTRAINT: {}.",
            self.role, self.task, self.constraint
        )
    }
}

/// Behavioural contract sent to the backend for each stage. `Memory` has none.
#[must_use]
pub fn role_instruction(stage: EngineKind) -> Option<RoleInstruction> {
    let instruction = match stage {
        EngineKind::Perception => RoleInstruction {
            role: "Perception Engine",
            task: "Ingest raw data, normalize into canonical observation",
            constraint: "No inference of intent or risk; facts only",
        },
        EngineKind::WorldModel => RoleInstruction {
            role: "World-Model Engine",
            task: "Update causal-graph state from new observations",
            constraint: "Must state assumptions explicitly",
        },
        EngineKind::Planning => RoleInstruction {
            role: "Planning Engine",
            task: "Generate candidate plans toward the objective",
            constraint: "Propose only, never execute; prefer reversible plans",
        },
        EngineKind::Policy => RoleInstruction {
            role: "Policy & Norm Engine",
            task: "Review plans against hard legal/ethical/safety constraints",
            constraint: "Has veto power; must reject any violating plan",
        },
        EngineKind::Execution => RoleInstruction {
            role: "Execution Engine",
            task: "Convert the approved plan into instruction data",
            constraint: "Output must be deterministic",
        },
        EngineKind::MetaReasoning => RoleInstruction {
            role: "Meta-Reasoning Engine",
            task: "Observe the reasoning process for hallucination/loop/drift",
            constraint: "Output strictly boolean health signals",
        },
        EngineKind::SelfEvaluation => RoleInstruction {
            role: "Self-Evaluation & Alignment Engine",
            task: "Retroactively score the execution plan against the objective",
            constraint:
                "Output a confidence score; high = high alignment; give specific feedback",
        },
        EngineKind::Memory => return None,
    };
    Some(instruction)
}

/// Structured-output schema requested from the backend.
#[must_use]
pub fn response_schema() -> Value {
    json!({
        "type": "OBJECT",
        "properties": {
            "summary": { "type": "STRING" },
            "data": {
                "type": "STRING",
                "description": "Serialized JSON string of the detailed output data",
            },
            "confidence": { "type": "NUMBER" },
            "flags": { "type": "ARRAY", "items": { "type": "STRING" } },
        },
        "required": ["summary", "confidence"],
    })
}

#[must_use]
pub fn build_prompt(context: &Value) -> String {
    format!("INPUT CONTEXT: {context}\n\n{PROMPT_TRAILER}")
}

/// Build the `generateContent` request body for one stage.
///
/// # Errors
/// Returns [`EngineFault::ReservedEngine`] for kinds without a role instruction.
pub fn build_generation_request(stage: EngineKind, context: &Value) -> Result<Value, EngineFault> {
    let instruction = role_instruction(stage).ok_or(EngineFault::ReservedEngine(stage))?;
    Ok(json!({
        "systemInstruction": { "parts": [{ "text": instruction.system_text() }] },
        "contents": [{ "role": "user", "parts": [{ "text": build_prompt(context) }] }],
        "generationConfig": {
            "responseMimeType": "application/json",
            "responseSchema": response_schema(),
        },
    }))
}

/// Extract the stage report and confidence from a `generateContent` reply.
///
/// # Errors
/// Returns a fault when the reply carries no text, the text is not JSON, or
/// the JSON does not satisfy [`response_schema`].
pub fn parse_generation_response(body: &Value) -> Result<(StageReport, f64), EngineFault> {
    let text: String = body
        .pointer("/candidates/0/content/parts")
        .and_then(Value::as_array)
        .map(|parts| {
            parts
                .iter()
                .filter_map(|part| part.get("text").and_then(Value::as_str))
                .collect()
        })
        .unwrap_or_default();
    if text.trim().is_empty() {
        return Err(EngineFault::EmptyResponse);
    }

    let output: Value =
        serde_json::from_str(&text).map_err(|err| EngineFault::MalformedJson(err.to_string()))?;
    let object = output
        .as_object()
        .ok_or_else(|| EngineFault::SchemaViolation("top-level value must be an object".into()))?;

    let summary = object
        .get("summary")
        .and_then(Value::as_str)
        .ok_or_else(|| EngineFault::SchemaViolation("missing string field 'summary'".into()))?
        .to_string();
    let confidence = object
        .get("confidence")
        .and_then(Value::as_f64)
        .ok_or_else(|| EngineFault::SchemaViolation("missing number field 'confidence'".into()))?;

    let data = match object.get("data") {
        None | Some(Value::Null) => None,
        Some(Value::String(raw)) => Some(raw.clone()),
        Some(_) => {
            return Err(EngineFault::SchemaViolation(
                "field 'data' must be a string".into(),
            ))
        }
    };

    let flags = match object.get("flags") {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str().map(ToString::to_string).ok_or_else(|| {
                    EngineFault::SchemaViolation("field 'flags' must hold strings".into())
                })
            })
            .collect::<Result<Vec<_>, _>>()?,
        Some(_) => {
            return Err(EngineFault::SchemaViolation(
                "field 'flags' must be an array".into(),
            ))
        }
    };

    Ok((
        StageReport {
            summary,
            data,
            flags,
        },
        confidence.clamp(0.0, 1.0),
    ))
}

/// Zero-confidence trace standing in for a failed invocation.
#[must_use]
pub fn fault_trace(stage: EngineKind, fault: &EngineFault, latency_ms: u64) -> StageTrace {
    StageTrace {
        step_id: StepId::new(),
        stage,
        recorded_at: now_utc(),
        input_hash: ERROR_FINGERPRINT.to_string(),
        output: StageOutput::Fault(StageFault {
            error: "Engine Fault".to_string(),
            details: fault.to_string(),
        }),
        confidence: 0.0,
        latency_ms,
    }
}

fn context_fingerprint(context: &Value) -> String {
    hash_json(context).unwrap_or_else(|_| ERROR_FINGERPRINT.to_string())
}

fn elapsed_ms(started: Instant) -> u64 {
    u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX)
}

/// Offline invoker: waits a randomized interval, then echoes the context.
#[derive(Debug, Clone, Default)]
pub struct SimulatedEngine {
    latency: LatencyWindow,
}

impl SimulatedEngine {
    #[must_use]
    pub fn new(latency: LatencyWindow) -> Self {
        Self { latency }
    }

    fn pick_delay(&self) -> Duration {
        let (min_ms, max_ms) = self.latency.bounds();
        let ms = if min_ms == max_ms {
            min_ms
        } else {
            rand::thread_rng().gen_range(min_ms..=max_ms)
        };
        Duration::from_millis(ms)
    }
}

impl CognitiveEngine for SimulatedEngine {
    fn mode(&self) -> EngineMode {
        EngineMode::Simulation
    }

    fn invoke(&self, stage: EngineKind, context: &Value) -> StageTrace {
        let started = Instant::now();
        let delay = self.pick_delay();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let trace = StageTrace {
            step_id: StepId::new(),
            stage,
            recorded_at: now_utc(),
            input_hash: context_fingerprint(context),
            output: StageOutput::Report(StageReport {
                summary: format!("Simulated output for {stage}"),
                data: serde_json::to_string(context).ok(),
                flags: Vec::new(),
            }),
            confidence: SIMULATED_CONFIDENCE,
            latency_ms: elapsed_ms(started),
        };
        debug!(stage = %stage, latency_ms = trace.latency_ms, "simulated stage completed");
        trace
    }
}

/// Live invoker backed by a hosted `generateContent` endpoint.
#[derive(Debug, Clone)]
pub struct GenerativeEngine {
    config: EngineConfig,
    agent: ureq::Agent,
}

impl GenerativeEngine {
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        let agent = ureq::AgentBuilder::new()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build();
        Self { config, agent }
    }

    fn endpoint_for(&self, stage: EngineKind) -> String {
        format!(
            "{}/models/{}:generateContent",
            self.config.endpoint.trim_end_matches('/'),
            self.config.model_for(stage)
        )
    }

    fn try_invoke(
        &self,
        stage: EngineKind,
        context: &Value,
    ) -> Result<(StageReport, f64), EngineFault> {
        let body = build_generation_request(stage, context)?;
        let mut request = self
            .agent
            .post(&self.endpoint_for(stage))
            .set("content-type", "application/json");
        if let Some(key) = &self.config.api_key {
            request = request.set("x-goog-api-key", key);
        }

        let reply: Value = match request.send_json(&body) {
            Ok(response) => response
                .into_json()
                .map_err(|err| EngineFault::MalformedJson(err.to_string()))?,
            Err(ureq::Error::Status(status, response)) => {
                let body = response
                    .into_string()
                    .unwrap_or_default()
                    .chars()
                    .take(512)
                    .collect();
                return Err(EngineFault::HttpStatus { status, body });
            }
            Err(ureq::Error::Transport(err)) => {
                return Err(EngineFault::Transport(err.to_string()));
            }
        };

        parse_generation_response(&reply)
    }
}

impl CognitiveEngine for GenerativeEngine {
    fn mode(&self) -> EngineMode {
        EngineMode::Live
    }

    fn invoke(&self, stage: EngineKind, context: &Value) -> StageTrace {
        let started = Instant::now();
        match self.try_invoke(stage, context) {
            Ok((report, confidence)) => {
                let trace = StageTrace {
                    step_id: StepId::new(),
                    stage,
                    recorded_at: now_utc(),
                    input_hash: context_fingerprint(context),
                    output: StageOutput::Report(report),
                    confidence,
                    latency_ms: elapsed_ms(started),
                };
                debug!(
                    stage = %stage,
                    model = self.config.model_for(stage),
                    latency_ms = trace.latency_ms,
                    "live stage completed"
                );
                trace
            }
            Err(fault) => {
                warn!(stage = %stage, error = %fault, "engine fault");
                fault_trace(stage, &fault, elapsed_ms(started))
            }
        }
    }
}

/// Pick live or simulation mode from the presence of a credential.
#[must_use]
pub fn build_engine(config: &EngineConfig) -> Box<dyn CognitiveEngine> {
    if config.live_mode_enabled() {
        Box::new(GenerativeEngine::new(config.clone()))
    } else {
        Box::new(SimulatedEngine::new(config.simulated_latency))
    }
}
