//! Replicate-hosted Llama 2 chat backend.
//!
//! A prediction is created with streaming enabled and its output is read
//! from the server-sent event stream, where every `output` event carries
//! one text fragment.

use crate::error::ProviderError;
use crate::models::ModelId;
use crate::provider::ProviderClient;
use async_trait::async_trait;
use eventsource_stream::Eventsource;
use futures::StreamExt;
use serde::{Deserialize, Serialize};

/// Pinned version of `meta/llama-2-70b-chat`
pub const LLAMA_2_70B_CHAT_VERSION: &str =
    "02e509c789964a7ea8736978a43525956ef40397be9033abf9fd2badfe68c9e3";

pub struct ReplicateClient {
    http_client: reqwest::Client,
    api_base: String,
    api_token: String,
}

#[derive(Debug, Serialize)]
struct PredictionRequest<'a> {
    version: &'a str,
    input: PredictionInput<'a>,
    stream: bool,
}

#[derive(Debug, Serialize)]
struct PredictionInput<'a> {
    system_prompt: &'a str,
    prompt: &'a str,
    temperature: f64,
    max_new_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct Prediction {
    id: String,
    #[serde(default)]
    error: Option<serde_json::Value>,
    urls: PredictionUrls,
}

#[derive(Debug, Deserialize)]
struct PredictionUrls {
    #[serde(default)]
    stream: Option<String>,
}

impl ReplicateClient {
    pub fn new(api_token: &str, api_base: &str, http_client: reqwest::Client) -> Self {
        Self {
            http_client,
            api_base: api_base.trim_end_matches('/').to_string(),
            api_token: api_token.to_string(),
        }
    }

    async fn create_prediction(
        &self,
        prompt: &str,
        instruction: &str,
        temperature: f64,
        max_output_tokens: u32,
    ) -> Result<Prediction, ProviderError> {
        let request = PredictionRequest {
            version: LLAMA_2_70B_CHAT_VERSION,
            input: PredictionInput {
                system_prompt: instruction,
                prompt,
                temperature,
                max_new_tokens: max_output_tokens,
            },
            stream: true,
        };

        let url = format!("{}/predictions", self.api_base);
        let response = self
            .http_client
            .post(&url)
            .bearer_auth(&self.api_token)
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::RequestFailed { status, body });
        }

        let prediction = response.json::<Prediction>().await?;
        if let Some(error) = prediction.error.as_ref().filter(|e| !e.is_null()) {
            return Err(ProviderError::PredictionFailed(error.to_string()));
        }

        Ok(prediction)
    }

    /// Concatenate the `output` fragments of a prediction's event stream
    async fn read_output_stream(&self, stream_url: &str) -> Result<String, ProviderError> {
        let response = self
            .http_client
            .get(stream_url)
            .bearer_auth(&self.api_token)
            .header(reqwest::header::ACCEPT, "text/event-stream")
            .header(reqwest::header::CACHE_CONTROL, "no-store")
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::RequestFailed { status, body });
        }

        let mut events = Box::pin(response.bytes_stream().eventsource());
        let mut output = String::new();

        while let Some(event) = events.next().await {
            let event = event.map_err(|e| ProviderError::InvalidResponse(e.to_string()))?;
            if apply_event(&event.event, &event.data, &mut output)? {
                break;
            }
        }

        Ok(output)
    }
}

/// Fold one event into the output; returns true once the stream is done
fn apply_event(event: &str, data: &str, output: &mut String) -> Result<bool, ProviderError> {
    match event {
        "output" => {
            output.push_str(data);
            Ok(false)
        }
        "error" => Err(ProviderError::PredictionFailed(data.to_string())),
        "done" => match done_reason(data) {
            Some(reason) => Err(ProviderError::PredictionFailed(format!("prediction {}", reason))),
            None => Ok(true),
        },
        _ => Ok(false),
    }
}

/// Canceled and failed predictions close the stream with a `reason`
fn done_reason(data: &str) -> Option<String> {
    let value: serde_json::Value = serde_json::from_str(data).ok()?;
    value
        .get("reason")
        .and_then(serde_json::Value::as_str)
        .filter(|reason| !reason.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl ProviderClient for ReplicateClient {
    async fn call(
        &self,
        model: ModelId,
        prompt: &str,
        instruction: &str,
        temperature: f64,
        max_output_tokens: u32,
    ) -> Result<String, ProviderError> {
        let prediction = self
            .create_prediction(prompt, instruction, temperature, max_output_tokens)
            .await?;
        tracing::debug!(model = %model, prediction = %prediction.id, "Prediction created");

        let stream_url = prediction.urls.stream.ok_or_else(|| {
            ProviderError::InvalidResponse(format!(
                "prediction {} has no stream url",
                prediction.id
            ))
        })?;

        let output = self.read_output_stream(&stream_url).await?;
        Ok(output.trim().to_string())
    }
}
