use thiserror::Error;

/// Errors that end an experiment run
#[derive(Error, Debug)]
pub enum ExperimentError {
    #[error("Invalid experiment configuration: {0}")]
    Configuration(String),

    #[error("No catalog entry for {experiment} scenario {scenario} (priming: {priming})")]
    UnknownPreset {
        experiment: String,
        scenario: usize,
        priming: bool,
    },

    #[error("Could not generate distinct answer orders: {0}")]
    DegenerateShuffle(String),

    #[error("Provider call for {model} failed: {source}")]
    Provider {
        model: String,
        #[source]
        source: ProviderError,
    },

    #[error("Run cancelled")]
    Cancelled,
}

/// Errors raised by a single provider round-trip
#[derive(Error, Debug)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("OpenAI error: {0}")]
    OpenAi(#[from] async_openai::error::OpenAIError),

    #[error("Request failed with status {status}: {body}")]
    RequestFailed { status: u16, body: String },

    #[error("Invalid response: {0}")]
    InvalidResponse(String),

    #[error("Prediction failed: {0}")]
    PredictionFailed(String),
}

impl ExperimentError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }
}
