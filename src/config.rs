use crate::catalog::ExperimentKind;
use crate::models::{DecoyVariant, ExperimentType, ModelId};
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Endpoints and transport settings shared by all experiments of a run file
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ProviderSettings {
    /// OpenAI API endpoint
    #[serde(default = "default_openai_api_base")]
    pub openai_api_base: String,
    /// Replicate API endpoint
    #[serde(default = "default_replicate_api_base")]
    pub replicate_api_base: String,
    /// Per-call HTTP timeout in seconds
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_openai_api_base() -> String {
    "https://api.openai.com/v1".to_string()
}

fn default_replicate_api_base() -> String {
    "https://api.replicate.com/v1".to_string()
}

fn default_request_timeout_secs() -> u64 {
    60
}

impl Default for ProviderSettings {
    fn default() -> Self {
        Self {
            openai_api_base: default_openai_api_base(),
            replicate_api_base: default_replicate_api_base(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Reference to a built-in catalog scenario
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PresetRef {
    pub experiment: ExperimentKind,
    pub scenario: usize,
    #[serde(default)]
    pub priming: bool,
}

/// Configuration for a single experiment run
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ExperimentConfig {
    /// Name shown in the output
    pub title: String,
    /// Models to query, each one of the supported model ids
    pub models: Vec<ModelId>,
    /// Queries per (model, scenario) pair
    #[serde(default = "default_iterations")]
    pub iterations: usize,
    /// Sampling temperature passed to every call
    #[serde(default = "default_temperature")]
    pub temperature: f64,
    /// Built-in scenario to run instead of `scenarios` and `answer_texts`
    #[serde(default)]
    pub preset: Option<PresetRef>,
    #[serde(default = "default_experiment_type")]
    pub experiment_type: ExperimentType,
    /// Scenario texts, one per scenario
    #[serde(default)]
    pub scenarios: Vec<String>,
    /// Answer options of all scenarios, `num_options` per scenario in order
    #[serde(default)]
    pub answer_texts: Vec<String>,
    /// Options per scenario; inferred from the answer count when omitted
    #[serde(default)]
    pub num_options: Option<usize>,
    /// Present the answer options in several shuffled orders
    #[serde(default)]
    pub shuffle: bool,
    /// Send `instructions` as system messages; empty instructions otherwise
    #[serde(default)]
    pub add_instruction: bool,
    #[serde(default)]
    pub instructions: Vec<String>,
    #[serde(default)]
    pub decoy_variant: DecoyVariant,
    /// Maximum output tokens; defaults depend on the experiment type
    #[serde(default)]
    pub max_tokens: Option<u32>,
    /// Seed for the shuffle order
    #[serde(default)]
    pub seed: Option<u64>,
    /// Optional path to export the results table as CSV
    #[serde(default)]
    pub storage_path: Option<String>,
}

fn default_iterations() -> usize {
    10
}

fn default_temperature() -> f64 {
    1.0
}

fn default_experiment_type() -> ExperimentType {
    ExperimentType::AnswerOptions
}

/// Root configuration of a run file
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub providers: ProviderSettings,
    /// Experiments, executed in order
    pub experiments: Vec<ExperimentConfig>,
}

impl Config {
    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse TOML config: {}", path.display()))
    }
}
