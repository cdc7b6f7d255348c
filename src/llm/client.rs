//! Async HTTP client for the reasoning backend
//!
//! Speaks the Anthropic messages API and the OpenAI-compatible chat API
//! (DeepSeek, OpenAI, local gateways). Only used to phrase rationale;
//! nothing it returns feeds back into decisions.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::core::error::{EngineError, Result};
use crate::llm::ReasoningBackend;

const ANTHROPIC_URL: &str = "https://api.anthropic.com/v1/messages";
const ANTHROPIC_VERSION: &str = "2023-06-01";
const DEFAULT_MODEL: &str = "claude-3-haiku-20240307";
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const SYSTEM_PROMPT: &str = "You are a terse battlefield analyst. Explain tactical decisions in one or two plain sentences.";

/// Wire dialect, picked from the endpoint host
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiFormat {
    Anthropic,
    OpenAI,
}

impl ApiFormat {
    fn for_url(url: &str) -> Self {
        if url.contains("anthropic.com") {
            ApiFormat::Anthropic
        } else {
            ApiFormat::OpenAI
        }
    }
}

/// Endpoint, credentials and transport limits
#[derive(Debug, Clone)]
pub struct ClientSettings {
    pub api_key: String,
    pub api_url: String,
    pub model: String,
    pub request_timeout: Duration,
}

impl ClientSettings {
    pub fn new(api_key: impl Into<String>, api_url: impl Into<String>, model: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            api_url: api_url.into(),
            model: model.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    /// Read `LLM_API_KEY` (required), `LLM_API_URL` and `LLM_MODEL`
    pub fn from_env() -> Result<Self> {
        let api_key = std::env::var("LLM_API_KEY").map_err(|_| EngineError::Llm("LLM_API_KEY not set".into()))?;
        let api_url = std::env::var("LLM_API_URL").unwrap_or_else(|_| ANTHROPIC_URL.into());
        let model = std::env::var("LLM_MODEL").unwrap_or_else(|_| DEFAULT_MODEL.into());
        Ok(Self::new(api_key, api_url, model))
    }
}

pub struct LlmClient {
    http: Client,
    settings: ClientSettings,
    format: ApiFormat,
}

impl LlmClient {
    pub fn new(settings: ClientSettings) -> Result<Self> {
        let http = Client::builder()
            .timeout(settings.request_timeout)
            .build()
            .map_err(|e| EngineError::Llm(format!("http client: {e}")))?;
        Ok(Self {
            http,
            format: ApiFormat::for_url(&settings.api_url),
            settings,
        })
    }

    pub fn from_env() -> Result<Self> {
        Self::new(ClientSettings::from_env()?)
    }

    pub fn api_format(&self) -> ApiFormat {
        self.format
    }

    pub fn model(&self) -> &str {
        &self.settings.model
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match self.format {
            ApiFormat::Anthropic => request
                .header("x-api-key", &self.settings.api_key)
                .header("anthropic-version", ANTHROPIC_VERSION),
            ApiFormat::OpenAI => request.bearer_auth(&self.settings.api_key),
        }
    }

    /// POST `body` and decode the reply, mapping transport and HTTP errors
    async fn exchange<B: Serialize, R: DeserializeOwned>(&self, body: &B) -> Result<R> {
        let response = self
            .authorize(self.http.post(&self.settings.api_url))
            .json(body)
            .send()
            .await
            .map_err(|e| EngineError::Llm(format!("request failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(EngineError::Llm(format!("backend returned {status}: {detail}")));
        }
        response
            .json()
            .await
            .map_err(|e| EngineError::Llm(format!("undecodable reply: {e}")))
    }

    fn build_body(&self, prompt: &str, max_tokens: u32, temperature: f32) -> RequestBody {
        let user = ChatTurn::user(prompt);
        match self.format {
            ApiFormat::Anthropic => RequestBody::Messages(MessagesRequest {
                model: self.settings.model.clone(),
                max_tokens,
                temperature,
                system: SYSTEM_PROMPT,
                messages: vec![user],
            }),
            ApiFormat::OpenAI => RequestBody::Chat(ChatRequest {
                model: self.settings.model.clone(),
                max_tokens,
                temperature,
                messages: vec![ChatTurn::system(SYSTEM_PROMPT), user],
            }),
        }
    }
}

#[async_trait]
impl ReasoningBackend for LlmClient {
    async fn generate(&self, prompt: &str, max_tokens: u32, temperature: f32) -> Result<String> {
        let body = self.build_body(prompt, max_tokens, temperature.clamp(0.0, 1.0));
        let text = match &body {
            RequestBody::Messages(req) => self
                .exchange::<_, MessagesReply>(req)
                .await?
                .content
                .into_iter()
                .next()
                .map(|block| block.text),
            RequestBody::Chat(req) => self
                .exchange::<_, ChatReply>(req)
                .await?
                .choices
                .into_iter()
                .next()
                .map(|choice| choice.message.content),
        };
        text.ok_or_else(|| EngineError::Llm("backend returned no text".into()))
    }
}

enum RequestBody {
    Messages(MessagesRequest),
    Chat(ChatRequest),
}

#[derive(Serialize)]
struct ChatTurn {
    role: &'static str,
    content: String,
}

impl ChatTurn {
    fn system(content: &str) -> Self {
        Self { role: "system", content: content.into() }
    }

    fn user(content: &str) -> Self {
        Self { role: "user", content: content.into() }
    }
}

/// Anthropic messages request; the system prompt is a top-level field
#[derive(Serialize)]
struct MessagesRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    system: &'static str,
    messages: Vec<ChatTurn>,
}

#[derive(Deserialize)]
struct MessagesReply {
    content: Vec<TextBlock>,
}

#[derive(Deserialize)]
struct TextBlock {
    text: String,
}

#[derive(Serialize)]
struct ChatRequest {
    model: String,
    max_tokens: u32,
    temperature: f32,
    messages: Vec<ChatTurn>,
}

#[derive(Deserialize)]
struct ChatReply {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatTurnReply,
}

#[derive(Deserialize)]
struct ChatTurnReply {
    content: String,
}
