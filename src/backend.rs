//! Interchangeable analysis backends. The orchestrator depends only on
//! the `AnalysisBackend` trait; the concrete variant is chosen once at
//! configuration time and injected.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::config::{Config, LlmProvider};
use crate::error::{Error, Result};

#[derive(Debug, Clone)]
pub struct CompletionOptions {
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl CompletionOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            temperature: config.llm_temperature,
            max_tokens: config.llm_max_tokens,
            timeout: config.llm_timeout,
        }
    }
}

/// A backend turns a prompt into free text. Variants differ only in wire
/// shape and envelope field names; both normalize to plain text.
#[async_trait]
pub trait AnalysisBackend: Send + Sync {
    fn name(&self) -> &'static str;

    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String>;

    /// Cheap liveness probe (model listing).
    async fn is_available(&self) -> bool;
}

/// Build the configured backend. This is the only place that branches on
/// the provider choice.
pub fn from_config(config: &Config) -> Result<Arc<dyn AnalysisBackend>> {
    match config.llm_provider {
        LlmProvider::OpenAi => {
            let api_key = config.openai_api_key.clone().ok_or_else(|| {
                Error::Configuration("OpenAI backend selected without an API key".to_string())
            })?;
            Ok(Arc::new(OpenAiBackend::new(
                config.openai_api_base.clone(),
                api_key,
                config.openai_model.clone(),
            )?))
        }
        LlmProvider::Ollama => Ok(Arc::new(OllamaBackend::new(
            config.ollama_url.clone(),
            config.ollama_model.clone(),
        )?)),
    }
}

fn build_client() -> Result<Client> {
    Client::builder()
        .user_agent(crate::USER_AGENT)
        .build()
        .map_err(|e| Error::Configuration(format!("failed to build HTTP client: {e}")))
}

fn truncate(body: &str) -> String {
    const LIMIT: usize = 200;
    if body.chars().count() > LIMIT {
        let head: String = body.chars().take(LIMIT).collect();
        format!("{head}...")
    } else {
        body.to_string()
    }
}

/// Remote chat-style backend (OpenAI-compatible `/chat/completions`).
pub struct OpenAiBackend {
    client: Client,
    api_base: String,
    api_key: String,
    model: String,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl OpenAiBackend {
    pub fn new(api_base: impl Into<String>, api_key: String, model: String) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            api_base: api_base.into().trim_end_matches('/').to_string(),
            api_key,
            model,
        })
    }
}

#[async_trait]
impl AnalysisBackend for OpenAiBackend {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String> {
        let url = format!("{}/chat/completions", self.api_base);
        let request = ChatRequest {
            model: &self.model,
            messages: vec![ChatMessage {
                role: "user",
                content: prompt,
            }],
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            stream: false,
        };

        debug!(model = %self.model, prompt_bytes = prompt.len(), "requesting chat completion");

        let response = self
            .client
            .post(&url)
            .timeout(options.timeout)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Backend(format!("chat completion request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Backend(format!(
                "chat completion returned {status}: {}",
                truncate(&body)
            )));
        }

        let envelope: ChatResponse = response
            .json()
            .await
            .map_err(|e| Error::Backend(format!("malformed completion envelope: {e}")))?;

        envelope
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .ok_or_else(|| Error::Backend("completion envelope held no content".to_string()))
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/models", self.api_base);
        match self
            .client
            .get(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}

/// Local inference server backend (Ollama `/api/generate`).
pub struct OllamaBackend {
    client: Client,
    base_url: String,
    model: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    stream: bool,
    options: GenerateOptions,
}

#[derive(Serialize)]
struct GenerateOptions {
    temperature: f32,
    num_predict: u32,
}

#[derive(Deserialize)]
struct GenerateResponse {
    response: String,
}

impl OllamaBackend {
    pub fn new(base_url: impl Into<String>, model: String) -> Result<Self> {
        Ok(Self {
            client: build_client()?,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model,
        })
    }
}

#[async_trait]
impl AnalysisBackend for OllamaBackend {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn complete(&self, prompt: &str, options: &CompletionOptions) -> Result<String> {
        let url = format!("{}/api/generate", self.base_url);
        let request = GenerateRequest {
            model: &self.model,
            prompt,
            stream: false,
            options: GenerateOptions {
                temperature: options.temperature,
                num_predict: options.max_tokens,
            },
        };

        debug!(model = %self.model, prompt_bytes = prompt.len(), "requesting generation");

        let response = self
            .client
            .post(&url)
            .timeout(options.timeout)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Backend(format!("generate request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::Backend(format!(
                "generate returned {status}: {}",
                truncate(&body)
            )));
        }

        let envelope: GenerateResponse = response
            .json()
            .await
            .map_err(|e| Error::Backend(format!("malformed generate envelope: {e}")))?;

        Ok(envelope.response)
    }

    async fn is_available(&self) -> bool {
        let url = format!("{}/api/tags", self.base_url);
        match self.client.get(&url).send().await {
            Ok(response) => response.status().is_success(),
            Err(_) => false,
        }
    }
}
