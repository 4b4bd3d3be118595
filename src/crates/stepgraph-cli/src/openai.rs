//! Completion service for OpenAI-compatible `/chat/completions` endpoints
//!
//! Works against api.openai.com as well as local servers (vLLM, llama.cpp,
//! Ollama) that expose the same API. Per-run overrides are read from the
//! [`RunConfig`] keys `model`, `max_tokens` and `api_key`; anything missing
//! falls back to the client's [`OpenAiSettings`].
//!
//! # Example
//!
//! ```rust,no_run
//! use stepgraph_cli::{OpenAiCompatClient, OpenAiSettings};
//!
//! let settings = OpenAiSettings::resolve(
//!     Some("http://localhost:8000/v1".to_string()),
//!     None,
//!     None,
//!     None,
//! );
//! let client = OpenAiCompatClient::new(settings)?;
//! # Ok::<(), stepgraph_core::GraphError>(())
//! ```

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use stepgraph_core::{CompletionService, GraphError, Message, MessageRole, Result, RunConfig};

pub const DEFAULT_BASE_URL: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "mistralai/Ministral-3-14B-Reasoning-2512";
pub const DEFAULT_MAX_TOKENS: u32 = 256;

/// Key used when a custom endpoint is configured without credentials
const PLACEHOLDER_API_KEY: &str = "dummy";

/// Connection defaults for [`OpenAiCompatClient`]
#[derive(Debug, Clone)]
pub struct OpenAiSettings {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub max_tokens: u32,
    pub timeout: Duration,
}

impl OpenAiSettings {
    /// Fill in defaults for anything not configured
    ///
    /// A custom `base_url` without an API key gets the placeholder key
    /// `dummy`, which local OpenAI-compatible servers accept.
    pub fn resolve(
        base_url: Option<String>,
        api_key: Option<String>,
        model: Option<String>,
        max_tokens: Option<u32>,
    ) -> Self {
        let api_key = api_key
            .filter(|key| !key.is_empty())
            .or_else(|| base_url.as_ref().map(|_| PLACEHOLDER_API_KEY.to_string()));

        Self {
            base_url: base_url
                .unwrap_or_else(|| DEFAULT_BASE_URL.to_string())
                .trim_end_matches('/')
                .to_string(),
            api_key,
            model: model.unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            max_tokens: max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
            timeout: Duration::from_secs(120),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// [`CompletionService`] backed by an OpenAI-compatible HTTP API
#[derive(Clone)]
pub struct OpenAiCompatClient {
    settings: OpenAiSettings,
    client: Client,
}

impl OpenAiCompatClient {
    pub fn new(settings: OpenAiSettings) -> Result<Self> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .build()
            .map_err(|e| GraphError::external(format!("failed to build HTTP client: {}", e)))?;

        Ok(Self { settings, client })
    }

    pub fn settings(&self) -> &OpenAiSettings {
        &self.settings
    }

    fn convert_message(message: &Message) -> OpenAiMessage {
        OpenAiMessage {
            role: match message.role {
                MessageRole::System => "system",
                MessageRole::Human => "user",
                MessageRole::Assistant => "assistant",
                MessageRole::Tool => "tool",
            }
            .to_string(),
            content: Some(message.text().to_string()),
            name: message.name.clone(),
        }
    }

    fn build_request(
        &self,
        system_prompt: Option<&str>,
        messages: &[Message],
        config: &RunConfig,
    ) -> OpenAiRequest {
        let model = config
            .get_str("model")
            .map(strip_provider_prefix)
            .unwrap_or(self.settings.model.as_str())
            .to_string();
        let max_tokens = config
            .get_u64("max_tokens")
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or(self.settings.max_tokens);

        let messages = system_prompt
            .map(|prompt| Message::system(prompt))
            .iter()
            .chain(messages)
            .map(Self::convert_message)
            .collect();

        OpenAiRequest {
            model,
            messages,
            max_tokens: Some(max_tokens),
            stream: false,
        }
    }

    fn api_key<'a>(&'a self, config: &'a RunConfig) -> Option<&'a str> {
        config
            .get_str("api_key")
            .filter(|key| !key.is_empty())
            .or(self.settings.api_key.as_deref())
    }
}

/// `openai:gpt-4o` → `gpt-4o`
fn strip_provider_prefix(model: &str) -> &str {
    model.strip_prefix("openai:").unwrap_or(model)
}

/// Separate `<think>…</think>` output of reasoning models from the answer
fn split_reasoning(content: &str) -> (String, Option<String>) {
    match content.split_once("</think>") {
        Some((thinking, answer)) => {
            let thinking = thinking.replace("<think>", "").trim().to_string();
            let thinking = (!thinking.is_empty()).then_some(thinking);
            (answer.trim().to_string(), thinking)
        }
        None => (content.trim().to_string(), None),
    }
}

#[async_trait]
impl CompletionService for OpenAiCompatClient {
    #[tracing::instrument(skip(self, system_prompt, messages, config), fields(history = messages.len()))]
    async fn complete(
        &self,
        system_prompt: Option<&str>,
        messages: &[Message],
        config: &RunConfig,
    ) -> Result<Message> {
        let url = format!("{}/chat/completions", self.settings.base_url);
        let body = self.build_request(system_prompt, messages, config);
        tracing::debug!(model = %body.model, url = %url, "Requesting completion");

        let mut request = self.client.post(&url).json(&body);
        if let Some(key) = self.api_key(config) {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| GraphError::external(format!("request to {} failed: {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(GraphError::external(match status.as_u16() {
                401 => format!("authentication failed: {}", error_text),
                429 => format!("rate limit exceeded: {}", error_text),
                _ => format!("API error {}: {}", status, error_text),
            }));
        }

        let completion: OpenAiResponse = response
            .json()
            .await
            .map_err(|e| GraphError::external(format!("invalid completion response: {}", e)))?;

        let choice = completion
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| GraphError::external("completion response has no choices"))?;

        let (answer, reasoning) = split_reasoning(&choice.message.content.unwrap_or_default());
        let mut message =
            Message::assistant(answer).with_metadata("model", Value::String(completion.model));
        if let Some(reason) = choice.finish_reason {
            message = message.with_metadata("finish_reason", Value::String(reason));
        }
        if let Some(reasoning) = reasoning {
            message = message.with_metadata("reasoning", Value::String(reasoning));
        }

        Ok(message)
    }
}

impl std::fmt::Debug for OpenAiCompatClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiCompatClient")
            .field("base_url", &self.settings.base_url)
            .field("model", &self.settings.model)
            .field("has_api_key", &self.settings.api_key.is_some())
            .finish()
    }
}

#[derive(Debug, Serialize)]
struct OpenAiRequest {
    model: String,
    messages: Vec<OpenAiMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Debug, Serialize, Deserialize)]
struct OpenAiMessage {
    role: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiResponse {
    #[serde(default)]
    model: String,
    choices: Vec<OpenAiChoice>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    message: OpenAiMessage,
    finish_reason: Option<String>,
}
