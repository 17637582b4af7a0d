use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Models that can be queried in a live run
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum ModelId {
    #[serde(rename = "gpt-3.5-turbo")]
    Gpt35Turbo,
    #[serde(rename = "gpt-4-1106-preview")]
    Gpt4Turbo,
    #[serde(rename = "llama-2-70b")]
    Llama2Chat70b,
}

impl ModelId {
    pub const ALL: [ModelId; 3] = [
        ModelId::Gpt35Turbo,
        ModelId::Gpt4Turbo,
        ModelId::Llama2Chat70b,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ModelId::Gpt35Turbo => "gpt-3.5-turbo",
            ModelId::Gpt4Turbo => "gpt-4-1106-preview",
            ModelId::Llama2Chat70b => "llama-2-70b",
        }
    }

    pub fn provider(&self) -> Provider {
        match self {
            ModelId::Gpt35Turbo | ModelId::Gpt4Turbo => Provider::OpenAi,
            ModelId::Llama2Chat70b => Provider::Replicate,
        }
    }

    pub fn tier(&self) -> ProviderTier {
        match self {
            ModelId::Gpt35Turbo => ProviderTier::OpenAiSmall,
            ModelId::Gpt4Turbo => ProviderTier::OpenAiLarge,
            ModelId::Llama2Chat70b => ProviderTier::Replicate,
        }
    }

    /// Lowest temperature the backing provider accepts
    pub fn min_temperature(&self) -> f64 {
        match self.provider() {
            Provider::OpenAi => 0.0,
            Provider::Replicate => 0.01,
        }
    }
}

impl fmt::Display for ModelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Backend that serves a model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Provider {
    OpenAi,
    Replicate,
}

/// Rate-limit class a model call is paced under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderTier {
    OpenAiSmall,
    OpenAiLarge,
    Replicate,
}

impl ProviderTier {
    /// Minimum spacing between two calls of this tier
    pub fn min_interval(&self) -> Duration {
        match self {
            ProviderTier::OpenAiSmall => Duration::from_secs_f64(60.0 / 3500.0),
            ProviderTier::OpenAiLarge => Duration::from_secs_f64(60.0 / 500.0),
            ProviderTier::Replicate => Duration::from_secs_f64(1.0 / 50.0),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExperimentType {
    AnswerOptions,
    Numeric,
}

impl ExperimentType {
    /// Default output length: one token for a letter, a few for a dollar amount
    pub fn default_max_tokens(&self) -> u32 {
        match self {
            ExperimentType::AnswerOptions => 1,
            ExperimentType::Numeric => 10,
        }
    }
}

/// How a decoy-effect scenario presents its options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DecoyVariant {
    #[default]
    Standard,
    OptionRemoved,
    Renamed,
    RenamedAndRemoved,
}

/// Multiple-choice answer label
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AnswerLabel {
    A,
    B,
    C,
    D,
    E,
    F,
}

impl AnswerLabel {
    pub const ALL: [AnswerLabel; 6] = [
        AnswerLabel::A,
        AnswerLabel::B,
        AnswerLabel::C,
        AnswerLabel::D,
        AnswerLabel::E,
        AnswerLabel::F,
    ];

    /// The first `count` labels, capped at the alphabet size
    pub fn first(count: usize) -> &'static [AnswerLabel] {
        &Self::ALL[..count.min(Self::ALL.len())]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            AnswerLabel::A => "A",
            AnswerLabel::B => "B",
            AnswerLabel::C => "C",
            AnswerLabel::D => "D",
            AnswerLabel::E => "E",
            AnswerLabel::F => "F",
        }
    }

    pub fn parse(text: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|label| label.as_str() == text)
    }
}

impl fmt::Display for AnswerLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Interpretation of one raw model answer
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClassifiedAnswer {
    Label(AnswerLabel),
    Amount(f64),
    Invalid,
}

impl ClassifiedAnswer {
    pub fn is_valid(&self) -> bool {
        !matches!(self, ClassifiedAnswer::Invalid)
    }
}

/// Summary statistics over the valid dollar amounts of one row
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NumericSummary {
    pub average: Option<f64>,
    pub median: Option<f64>,
    pub percentile_25: Option<f64>,
    pub percentile_75: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RowOutcome {
    /// Share of valid answers per outcome slot; NaN when there were none
    Shares(BTreeMap<AnswerLabel, f64>),
    Summary(NumericSummary),
}

/// Aggregated answers of one model for one scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    pub model: ModelId,
    /// 1-based scenario (or shuffle variant) number
    pub scenario: usize,
    pub temperature: f64,
    pub iterations: usize,
    pub correct_answer_count: usize,
    pub outcome: RowOutcome,
}

impl ResultRow {
    /// Fraction of iterations that produced a valid answer
    pub fn valid_ratio(&self) -> f64 {
        self.correct_answer_count as f64 / self.iterations as f64
    }

    pub fn share(&self, label: AnswerLabel) -> Option<f64> {
        match &self.outcome {
            RowOutcome::Shares(shares) => shares.get(&label).copied(),
            RowOutcome::Summary(_) => None,
        }
    }
}

/// Human reference data for a catalog scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Baseline {
    Shares(BTreeMap<AnswerLabel, f64>),
    Median(f64),
}

/// Deviation of one result row from the human baseline
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BaselineComparison {
    pub model: ModelId,
    pub scenario: usize,
    /// Model share minus human share per slot (answer options)
    pub share_deltas: BTreeMap<AnswerLabel, f64>,
    /// Sum of the absolute share deltas
    pub total_abs_deviation: Option<f64>,
    /// Model median minus human median (numeric)
    pub median_delta: Option<f64>,
}

/// Everything a completed run hands to the presentation layer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentResults {
    pub experiment_type: ExperimentType,
    pub rows: Vec<ResultRow>,
    pub low_answers_share_warning: bool,
    /// model -> scenario number -> answers in iteration order
    pub raw_model_answers: BTreeMap<ModelId, BTreeMap<usize, Vec<String>>>,
    #[serde(default)]
    pub baseline_comparisons: Vec<BaselineComparison>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status")]
pub enum ExperimentOutcome {
    Completed(ExperimentResults),
    Failed { error: String },
}

/// Outcome of one experiment of a run file
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExperimentReport {
    pub title: String,
    pub outcome: ExperimentOutcome,
}
