use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_with::{DurationSeconds, serde_as};

/// Budgets for the three external calls.
#[serde_as]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct StageTimeouts {
    #[serde_as(as = "DurationSeconds<u64>")]
    pub extraction: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub solve: Duration,
    #[serde_as(as = "DurationSeconds<u64>")]
    pub explanation: Duration,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            extraction: Duration::from_secs(30),
            solve: Duration::from_secs(60),
            explanation: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    pub endpoint: String,
    pub model: String,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    pub max_tokens: u32,
    pub temperature: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://api.openai.com/v1/chat/completions".to_string(),
            model: "gpt-4o-mini".to_string(),
            api_key_env: "OPENAI_API_KEY".to_string(),
            max_tokens: 1500,
            temperature: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct SolverConfig {
    pub program: Option<PathBuf>,
    pub args: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub timeouts: StageTimeouts,
    /// Lowest-precedence hand field values.
    pub defaults: BTreeMap<String, String>,
    pub model: ModelConfig,
    pub solver: SolverConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            timeouts: StageTimeouts::default(),
            defaults: BTreeMap::new(),
            model: ModelConfig::default(),
            solver: SolverConfig::default(),
        }
    }
}

impl PipelineConfig {
    pub fn from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&raw).with_context(|| format!("invalid config {}", path.display()))
    }
}
