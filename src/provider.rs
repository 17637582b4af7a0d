use crate::config::ProviderSettings;
use crate::error::ProviderError;
use crate::models::{ModelId, Provider};
use crate::replicate::ReplicateClient;
use anyhow::{Context, Result};
use async_openai::types::{
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessageArgs,
    ChatCompletionRequestUserMessageArgs, CreateChatCompletionRequest,
    CreateChatCompletionRequestArgs, CreateChatCompletionResponse,
};
use async_openai::{Client, config::OpenAIConfig};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;

/// A single model call: prompt in, trimmed answer text out
#[async_trait]
pub trait ProviderClient: Send + Sync {
    async fn call(
        &self,
        model: ModelId,
        prompt: &str,
        instruction: &str,
        temperature: f64,
        max_output_tokens: u32,
    ) -> Result<String, ProviderError>;
}

/// API credentials for one run
#[derive(Debug, Clone, Default)]
pub struct Credentials {
    pub openai_api_key: Option<String>,
    pub replicate_api_token: Option<String>,
}

/// Clients available to a run, keyed by provider
#[derive(Default)]
pub struct Providers {
    clients: HashMap<Provider, Box<dyn ProviderClient>>,
}

impl Providers {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_client(mut self, provider: Provider, client: impl ProviderClient + 'static) -> Self {
        self.clients.insert(provider, Box::new(client));
        self
    }

    /// Build clients for every provider a credential was supplied for
    pub fn from_credentials(credentials: &Credentials, settings: &ProviderSettings) -> Result<Self> {
        let timeout = Duration::from_secs(settings.request_timeout_secs);
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build HTTP client")?;

        let mut providers = Self::new();
        if let Some(api_key) = &credentials.openai_api_key {
            providers = providers.with_client(
                Provider::OpenAi,
                OpenAiClient::new(api_key, &settings.openai_api_base, http_client.clone()),
            );
        }
        if let Some(api_token) = &credentials.replicate_api_token {
            providers = providers.with_client(
                Provider::Replicate,
                ReplicateClient::new(api_token, &settings.replicate_api_base, http_client),
            );
        }

        Ok(providers)
    }

    pub fn client_for(&self, model: ModelId) -> Option<&dyn ProviderClient> {
        self.clients.get(&model.provider()).map(|client| client.as_ref())
    }
}

/// OpenAI chat-completions backend
pub struct OpenAiClient {
    client: Client<OpenAIConfig>,
}

impl OpenAiClient {
    pub fn new(api_key: &str, api_base: &str, http_client: reqwest::Client) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(api_key)
            .with_api_base(api_base);

        Self {
            client: Client::with_config(openai_config).with_http_client(http_client),
        }
    }

    /// Build the chat completion request: instruction as system message, prompt as user message
    fn build_request(
        &self,
        model: ModelId,
        prompt: &str,
        instruction: &str,
        temperature: f64,
        max_output_tokens: u32,
    ) -> Result<CreateChatCompletionRequest, ProviderError> {
        let system_message: ChatCompletionRequestMessage =
            ChatCompletionRequestSystemMessageArgs::default()
                .content(instruction.to_string())
                .build()?
                .into();

        let user_message: ChatCompletionRequestMessage =
            ChatCompletionRequestUserMessageArgs::default()
                .content(prompt.to_string())
                .build()?
                .into();

        let request = CreateChatCompletionRequestArgs::default()
            .model(model.as_str())
            .messages([system_message, user_message])
            .temperature(temperature as f32)
            .max_tokens(u16::try_from(max_output_tokens).unwrap_or(u16::MAX))
            .build()?;

        Ok(request)
    }

    /// Extract the answer text of the first choice
    fn extract_content(&self, response: CreateChatCompletionResponse) -> String {
        match response.choices.first() {
            Some(choice) => match &choice.message.content {
                Some(content) => content.trim().to_string(),
                None => String::new(),
            },
            None => String::new(),
        }
    }
}

#[async_trait]
impl ProviderClient for OpenAiClient {
    async fn call(
        &self,
        model: ModelId,
        prompt: &str,
        instruction: &str,
        temperature: f64,
        max_output_tokens: u32,
    ) -> Result<String, ProviderError> {
        let request = self.build_request(model, prompt, instruction, temperature, max_output_tokens)?;
        let response = self.client.chat().create(request).await?;
        Ok(self.extract_content(response))
    }
}
