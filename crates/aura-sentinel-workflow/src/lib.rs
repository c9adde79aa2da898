#![forbid(unsafe_code)]

use std::collections::BTreeSet;
use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use aura_sentinel_domain::{
    ensure_non_empty, hash_json, now_utc, EngineKind, WorkflowDescriptor, WorkflowId,
};
use aura_sentinel_engine::EngineConfig;
use tracing::{debug, info};

/// Engines named by every synthesized architecture, whatever the objective.
pub const CANONICAL_ENGINES: [EngineKind; 6] = [
    EngineKind::Perception,
    EngineKind::WorldModel,
    EngineKind::Planning,
    EngineKind::Policy,
    EngineKind::Execution,
    EngineKind::MetaReasoning,
];

pub const GENERATED_ARCHITECTURE_NAME: &str = "Generated Architecture";
pub const DEFAULT_TRIGGER_EVENT: &str = "Manual Trigger";
pub const DEFAULT_OWNER: &str = "0xAdmin";

/// Turns an objective into a workflow descriptor. Synthesis depends on a
/// configured generation backend; without one it yields nothing.
#[derive(Debug, Clone)]
pub struct ArchitectureSynthesizer {
    generation_available: bool,
    owner: String,
}

impl ArchitectureSynthesizer {
    #[must_use]
    pub fn from_config(config: &EngineConfig) -> Self {
        Self {
            generation_available: config.live_mode_enabled(),
            owner: DEFAULT_OWNER.to_string(),
        }
    }

    #[must_use]
    pub fn offline() -> Self {
        Self {
            generation_available: false,
            owner: DEFAULT_OWNER.to_string(),
        }
    }

    #[must_use]
    pub fn with_owner(mut self, owner: &str) -> Self {
        self.owner = owner.to_string();
        self
    }

    #[must_use]
    pub fn generation_available(&self) -> bool {
        self.generation_available
    }

    #[must_use]
    pub fn synthesize(&self, objective: &str) -> Option<WorkflowDescriptor> {
        if !self.generation_available {
            debug!("no generation backend configured; no architecture synthesized");
            return None;
        }

        let descriptor = WorkflowDescriptor {
            workflow_id: WorkflowId::new(),
            name: GENERATED_ARCHITECTURE_NAME.to_string(),
            objective: objective.to_string(),
            trigger_event: DEFAULT_TRIGGER_EVENT.to_string(),
            required_engines: CANONICAL_ENGINES.to_vec(),
            owner: self.owner.clone(),
            created_at: now_utc(),
        };
        info!(workflow_id = %descriptor.workflow_id, "architecture synthesized");
        Some(descriptor)
    }
}

/// Load a descriptor YAML document from disk and validate it.
///
/// # Errors
/// Returns an error when the file cannot be read, parsed, or validated.
pub fn load_descriptor_from_path(path: &Path) -> Result<WorkflowDescriptor> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read workflow descriptor {}", path.display()))?;
    parse_descriptor_yaml(&content)
}

/// # Errors
/// Returns an error when YAML parsing or validation fails.
pub fn parse_descriptor_yaml(yaml: &str) -> Result<WorkflowDescriptor> {
    let mut descriptor: WorkflowDescriptor = serde_yaml::from_str(yaml)
        .map_err(|err| anyhow!("invalid workflow descriptor YAML: {err}"))?;
    normalize_descriptor(&mut descriptor);
    validate_descriptor(&descriptor)?;
    Ok(descriptor)
}

/// # Errors
/// Returns an error when the descriptor is invalid or cannot be serialized.
pub fn descriptor_to_yaml(descriptor: &WorkflowDescriptor) -> Result<String> {
    validate_descriptor(descriptor)?;
    Ok(serde_yaml::to_string(descriptor)?)
}

/// # Errors
/// Returns an error when the descriptor is invalid or the file cannot be written.
pub fn save_descriptor(descriptor: &WorkflowDescriptor, path: &Path) -> Result<()> {
    let yaml = descriptor_to_yaml(descriptor)?;
    fs::write(path, yaml)
        .with_context(|| format!("failed to write workflow descriptor {}", path.display()))
}

/// Content hash of a descriptor's canonical JSON form.
///
/// # Errors
/// Returns an error if serialization fails.
pub fn descriptor_hash(descriptor: &WorkflowDescriptor) -> Result<String> {
    hash_json(&serde_json::to_value(descriptor)?)
}

/// # Errors
/// Returns an error naming the first invalid field.
pub fn validate_descriptor(descriptor: &WorkflowDescriptor) -> Result<()> {
    ensure_non_empty("name", &descriptor.name)?;
    ensure_non_empty("objective", &descriptor.objective)?;
    ensure_non_empty("trigger_event", &descriptor.trigger_event)?;
    ensure_non_empty("owner", &descriptor.owner)?;

    if descriptor.required_engines.is_empty() {
        return Err(anyhow!("required_engines MUST name at least one engine"));
    }
    let mut seen = BTreeSet::new();
    for engine in &descriptor.required_engines {
        if !seen.insert(*engine) {
            return Err(anyhow!("duplicate required engine: {engine}"));
        }
    }
    Ok(())
}

fn normalize_descriptor(descriptor: &mut WorkflowDescriptor) {
    descriptor.name = descriptor.name.trim().to_string();
    descriptor.objective = descriptor.objective.trim().to_string();
    descriptor.trigger_event = descriptor.trigger_event.trim().to_string();
    descriptor.owner = descriptor.owner.trim().to_string();
}

#[cfg(test)]
mod tests {
    use super::{
        descriptor_hash, descriptor_to_yaml, load_descriptor_from_path, parse_descriptor_yaml,
        save_descriptor, ArchitectureSynthesizer, CANONICAL_ENGINES,
    };
    use aura_sentinel_domain::EngineKind;
    use aura_sentinel_engine::EngineConfig;
    use std::path::Path;

    const OBJECTIVE: &str = "Ensure all Invoice RWAs are from non-sanctioned entities and have a risk score < 20 before tokenization.";

    fn live_synthesizer() -> ArchitectureSynthesizer {
        ArchitectureSynthesizer::from_config(&EngineConfig {
            api_key: Some("key".to_string()),
            ..EngineConfig::default()
        })
    }

    #[test]
    fn offline_synthesizer_always_returns_none() {
        let synthesizer = ArchitectureSynthesizer::from_config(&EngineConfig::default());
        assert!(!synthesizer.generation_available());
        for objective in [OBJECTIVE, "", "   ", "reject everything"] {
            assert!(synthesizer.synthesize(objective).is_none());
        }
        assert!(ArchitectureSynthesizer::offline().synthesize(OBJECTIVE).is_none());
    }

    #[test]
    fn synthesized_architecture_uses_canonical_engines() {
        let first = live_synthesizer().synthesize(OBJECTIVE);
        let second = live_synthesizer().synthesize("Maximize yield on the bond book");
        assert!(first.is_some() && second.is_some());
        let first = first.unwrap_or_else(|| unreachable!());
        let second = second.unwrap_or_else(|| unreachable!());

        assert_eq!(first.objective, OBJECTIVE);
        assert_eq!(first.name, "Generated Architecture");
        assert_eq!(first.owner, "0xAdmin");
        assert_eq!(first.required_engines, CANONICAL_ENGINES.to_vec());
        assert_eq!(first.required_engines, second.required_engines);
        assert!(!first.required_engines.contains(&EngineKind::Memory));
        assert!(!first.required_engines.contains(&EngineKind::SelfEvaluation));
        assert_ne!(first.workflow_id, second.workflow_id);
    }

    #[test]
    fn live_synthesizer_ignores_objective_content() {
        let empty = live_synthesizer().synthesize("");
        assert!(empty.is_some());
        let empty = empty.unwrap_or_else(|| unreachable!());
        assert_eq!(empty.required_engines, CANONICAL_ENGINES.to_vec());
        assert_eq!(empty.objective, "");

        let padded = live_synthesizer()
            .synthesize("  audit  ")
            .unwrap_or_else(|| unreachable!());
        assert_eq!(padded.objective, "  audit  ");
        assert_eq!(padded.required_engines, CANONICAL_ENGINES.to_vec());
    }

    #[test]
    fn descriptor_yaml_round_trip_preserves_hash() {
        let descriptor = live_synthesizer()
            .with_owner("0xAuditor")
            .synthesize(OBJECTIVE)
            .unwrap_or_else(|| unreachable!());
        let yaml = descriptor_to_yaml(&descriptor).unwrap_or_else(|_| unreachable!());
        assert!(yaml.contains("PERCEPTION"));

        let parsed = parse_descriptor_yaml(&yaml);
        assert!(parsed.is_ok());
        let parsed = parsed.unwrap_or_else(|_| unreachable!());
        assert_eq!(parsed, descriptor);
        assert_eq!(
            descriptor_hash(&parsed).unwrap_or_else(|_| unreachable!()),
            descriptor_hash(&descriptor).unwrap_or_else(|_| unreachable!())
        );
    }

    #[test]
    fn descriptor_validation_rejects_duplicates_and_blank_fields() {
        let base = r"
workflow_id: 01J9ZK3V4W5X6Y7Z8A9B0C1D2E
name: invoice audit
objective: audit invoices
trigger_event: Manual Trigger
owner: 0xAdmin
created_at: 2026-10-01T12:00:00Z
";
        let ok = parse_descriptor_yaml(&format!("{base}required_engines: [PERCEPTION, POLICY]\n"));
        assert!(ok.is_ok(), "{ok:?}");

        let duplicate =
            parse_descriptor_yaml(&format!("{base}required_engines: [POLICY, POLICY]\n"));
        assert!(duplicate.is_err());

        let empty = parse_descriptor_yaml(&format!("{base}required_engines: []\n"));
        assert!(empty.is_err());

        let blank = parse_descriptor_yaml(
            &format!("{base}required_engines: [PLANNING]\n").replace("audit invoices", "'  '"),
        );
        assert!(blank.is_err());

        let unknown = parse_descriptor_yaml(&format!(
            "{base}required_engines: [PLANNING]\npriority: high\n"
        ));
        assert!(unknown.is_err());
    }

    #[test]
    fn demo_descriptor_loads_and_saves() {
        let demo = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../demos/invoice-audit.yaml");
        let loaded = load_descriptor_from_path(&demo);
        assert!(loaded.is_ok(), "{loaded:?}");
        let loaded = loaded.unwrap_or_else(|_| unreachable!());
        assert_eq!(loaded.required_engines, CANONICAL_ENGINES.to_vec());

        let out = std::env::temp_dir().join(format!("aura-sentinel-{}.yaml", loaded.workflow_id));
        assert!(save_descriptor(&loaded, &out).is_ok());
        let reloaded = load_descriptor_from_path(&out).unwrap_or_else(|_| unreachable!());
        assert_eq!(reloaded, loaded);
        let _ = std::fs::remove_file(&out);

        assert!(load_descriptor_from_path(Path::new("/nonexistent/aura.yaml")).is_err());
    }
}
