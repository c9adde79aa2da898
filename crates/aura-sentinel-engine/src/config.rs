use std::fs;
use std::path::Path;

use anyhow::{anyhow, Context, Result};
use aura_sentinel_domain::EngineKind;
use serde::{Deserialize, Serialize};

use crate::{model_tier, ModelTier};

pub const DEFAULT_ENDPOINT: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_REASONING_MODEL: &str = "gemini-3-pro-preview";
pub const DEFAULT_FAST_MODEL: &str = "gemini-3-flash-preview";
pub const DEFAULT_TIMEOUT_MS: u64 = 30_000;

/// Credential variables, checked in order.
pub const API_KEY_VARS: [&str; 3] = ["AURA_SENTINEL_API_KEY", "GEMINI_API_KEY", "API_KEY"];

#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
#[serde(deny_unknown_fields)]
pub struct LatencyWindow {
    pub min_ms: u64,
    pub max_ms: u64,
}

impl Default for LatencyWindow {
    fn default() -> Self {
        Self {
            min_ms: 800,
            max_ms: 1800,
        }
    }
}

impl LatencyWindow {
    #[must_use]
    pub fn fixed(ms: u64) -> Self {
        Self {
            min_ms: ms,
            max_ms: ms,
        }
    }

    /// Bounds with `min <= max`.
    #[must_use]
    pub fn bounds(self) -> (u64, u64) {
        if self.min_ms <= self.max_ms {
            (self.min_ms, self.max_ms)
        } else {
            (self.max_ms, self.min_ms)
        }
    }
}

/// Generation backend settings. A non-empty `api_key` switches the invoker
/// into live mode; everything else falls back to simulation.
#[derive(Clone, Serialize, Deserialize, PartialEq)]
#[serde(deny_unknown_fields, default)]
pub struct EngineConfig {
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub endpoint: String,
    pub reasoning_model: String,
    pub fast_model: String,
    pub timeout_ms: u64,
    pub simulated_latency: LatencyWindow,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            endpoint: DEFAULT_ENDPOINT.to_string(),
            reasoning_model: DEFAULT_REASONING_MODEL.to_string(),
            fast_model: DEFAULT_FAST_MODEL.to_string(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            simulated_latency: LatencyWindow::default(),
        }
    }
}

impl std::fmt::Debug for EngineConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineConfig")
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("endpoint", &self.endpoint)
            .field("reasoning_model", &self.reasoning_model)
            .field("fast_model", &self.fast_model)
            .field("timeout_ms", &self.timeout_ms)
            .field("simulated_latency", &self.simulated_latency)
            .finish()
    }
}

impl EngineConfig {
    /// Defaults overlaid with the process environment.
    ///
    /// # Errors
    /// Returns an error when an override variable holds an invalid value.
    pub fn from_env() -> Result<Self> {
        Self::default().with_env_overrides(|name| std::env::var(name).ok())
    }

    /// Defaults overlaid with variables resolved through `lookup`.
    ///
    /// # Errors
    /// Returns an error when an override variable holds an invalid value.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        Self::default().with_env_overrides(lookup)
    }

    /// Parse a YAML configuration document. Missing keys keep their defaults.
    ///
    /// # Errors
    /// Returns an error when the document is not valid configuration YAML.
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).map_err(|err| anyhow!("invalid engine config YAML: {err}"))
    }

    /// # Errors
    /// Returns an error when the file cannot be read or parsed.
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .with_context(|| format!("failed to read engine config {}", path.display()))?;
        Self::from_yaml_str(&content)
    }

    /// Apply `AURA_SENTINEL_*` overrides (and the credential fallbacks).
    ///
    /// # Errors
    /// Returns an error when `AURA_SENTINEL_TIMEOUT_MS` is not an integer.
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let non_empty = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(key) = API_KEY_VARS.iter().find_map(|name| non_empty(*name)) {
            self.api_key = Some(key);
        }
        if let Some(endpoint) = non_empty("AURA_SENTINEL_ENDPOINT") {
            self.endpoint = endpoint;
        }
        if let Some(model) = non_empty("AURA_SENTINEL_REASONING_MODEL") {
            self.reasoning_model = model;
        }
        if let Some(model) = non_empty("AURA_SENTINEL_FAST_MODEL") {
            self.fast_model = model;
        }
        if let Some(raw) = non_empty("AURA_SENTINEL_TIMEOUT_MS") {
            self.timeout_ms = raw
                .trim()
                .parse()
                .map_err(|err| anyhow!("AURA_SENTINEL_TIMEOUT_MS must be an integer: {err}"))?;
        }
        Ok(self)
    }

    /// Drop the credential, forcing simulation mode.
    #[must_use]
    pub fn without_credentials(mut self) -> Self {
        self.api_key = None;
        self
    }

    #[must_use]
    pub fn live_mode_enabled(&self) -> bool {
        self.api_key
            .as_deref()
            .is_some_and(|key| !key.trim().is_empty())
    }

    #[must_use]
    pub fn model_for(&self, stage: EngineKind) -> &str {
        match model_tier(stage) {
            ModelTier::Reasoning => &self.reasoning_model,
            ModelTier::Fast => &self.fast_model,
        }
    }
}
