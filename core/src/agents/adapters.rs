//! Provider adapters: one per remote API, all speaking the same
//! [`ProviderAdapter`] contract.
//!
//! An adapter turns a combined prompt into that provider's HTTP request and
//! folds whatever comes back (a response, an error body, a dropped
//! connection) into a [`GenerationOutcome`]. Adapters never return `Err` and
//! never panic; the dispatcher relies on that to stay usable after any
//! failure.

use std::sync::Arc;

use async_trait::async_trait;
use log::debug;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use super::providers::ProviderKind;
use super::transport::{HttpRequest, Transport};
use crate::errors::{FailureKind, GenerationFailure};

/// Inserted between the user's prompt and the selected text.
pub const CONTEXT_LABEL: &str = "上下文：";

pub const OPENROUTER_BASE_URL: &str = "https://openrouter.ai/api";
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com";
pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com";

const OPENROUTER_REFERER: &str = "http://localhost:8080";
const OPENROUTER_TITLE: &str = "Obsidian OpenRouter Plugin";
const DEEPSEEK_MODEL: &str = "deepseek-chat";
const DEEPSEEK_SYSTEM_PROMPT: &str = "You are a helpful assistant.";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerationRequest {
    pub prompt_text: String,
    pub context_text: String,
    pub model_id: String,
}

impl GenerationRequest {
    pub fn new(
        prompt_text: impl Into<String>,
        context_text: impl Into<String>,
        model_id: impl Into<String>,
    ) -> Self {
        Self {
            prompt_text: prompt_text.into(),
            context_text: context_text.into(),
            model_id: model_id.into(),
        }
    }

    pub fn combined_prompt(&self) -> String {
        format!(
            "{}\n\n{}{}",
            self.prompt_text, CONTEXT_LABEL, self.context_text
        )
    }
}

/// Result of one generation attempt. Exactly one variant, never partial.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GenerationOutcome {
    Success { text: String },
    Failure(GenerationFailure),
}

impl GenerationOutcome {
    pub fn success(text: impl Into<String>) -> Self {
        Self::Success { text: text.into() }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success { .. })
    }

    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Success { text } => Some(text),
            Self::Failure(_) => None,
        }
    }

    pub fn failure_kind(&self) -> Option<FailureKind> {
        match self {
            Self::Success { .. } => None,
            Self::Failure(failure) => Some(failure.kind),
        }
    }

    pub fn into_result(self) -> Result<String, GenerationFailure> {
        match self {
            Self::Success { text } => Ok(text),
            Self::Failure(failure) => Err(failure),
        }
    }
}

impl From<GenerationFailure> for GenerationOutcome {
    fn from(failure: GenerationFailure) -> Self {
        Self::Failure(failure)
    }
}

impl From<Result<String, GenerationFailure>> for GenerationOutcome {
    fn from(result: Result<String, GenerationFailure>) -> Self {
        match result {
            Ok(text) => Self::Success { text },
            Err(failure) => Self::Failure(failure),
        }
    }
}

#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn kind(&self) -> ProviderKind;

    async fn generate(&self, model_id: &str, prompt: &str, credential: &str) -> GenerationOutcome;
}

/// OpenRouter: model id goes on the wire as-is, bearer auth plus the
/// application identity headers OpenRouter uses for attribution.
pub struct AggregatorAdapter {
    transport: Arc<dyn Transport>,
    base_url: String,
}

impl AggregatorAdapter {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            base_url: OPENROUTER_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn build_request(&self, model_id: &str, prompt: &str, credential: &str) -> HttpRequest {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let payload = json!({
            "model": model_id,
            "messages": [{ "role": "user", "content": prompt }],
        });
        HttpRequest::post(url, payload)
            .bearer(credential)
            .header("HTTP-Referer", OPENROUTER_REFERER)
            .header("X-Title", OPENROUTER_TITLE)
    }
}

#[async_trait]
impl ProviderAdapter for AggregatorAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Aggregator
    }

    async fn generate(&self, model_id: &str, prompt: &str, credential: &str) -> GenerationOutcome {
        let request = self.build_request(model_id, prompt, credential);
        debug!("calling OpenRouter at {} with model {model_id}", request.url);
        exchange(self.transport.as_ref(), self.kind(), request)
            .await
            .and_then(|body| chat_completion_text(self.kind(), &body))
            .into()
    }
}

/// Gemini: single-turn `generateContent`, key passed in the query string.
pub struct SingleTurnAdapter {
    transport: Arc<dyn Transport>,
    base_url: String,
}

impl SingleTurnAdapter {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            base_url: GEMINI_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn build_request(&self, model_id: &str, prompt: &str, credential: &str) -> HttpRequest {
        let url = format!(
            "{}/v1/models/{}:generateContent",
            self.base_url.trim_end_matches('/'),
            model_id
        );
        let payload = json!({
            "contents": [{ "parts": [{ "text": prompt }] }],
        });
        HttpRequest::post(url, payload).query("key", credential)
    }
}

#[async_trait]
impl ProviderAdapter for SingleTurnAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::SingleTurn
    }

    async fn generate(&self, model_id: &str, prompt: &str, credential: &str) -> GenerationOutcome {
        let request = self.build_request(model_id, prompt, credential);
        debug!("calling Gemini at {} with model {model_id}", request.url);
        exchange(self.transport.as_ref(), self.kind(), request)
            .await
            .and_then(|body| gemini_text(&body))
            .into()
    }
}

/// DeepSeek: OpenAI-compatible chat. Always sends the canonical model name,
/// whichever descriptor routed the request here.
pub struct ChatCompatibleAdapter {
    transport: Arc<dyn Transport>,
    base_url: String,
}

impl ChatCompatibleAdapter {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            base_url: DEEPSEEK_BASE_URL.to_string(),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    fn build_request(&self, prompt: &str, credential: &str) -> HttpRequest {
        let url = format!("{}/v1/chat/completions", self.base_url.trim_end_matches('/'));
        let payload = json!({
            "model": DEEPSEEK_MODEL,
            "messages": [
                { "role": "system", "content": DEEPSEEK_SYSTEM_PROMPT },
                { "role": "user", "content": prompt },
            ],
            "stream": false,
        });
        HttpRequest::post(url, payload).bearer(credential)
    }
}

#[async_trait]
impl ProviderAdapter for ChatCompatibleAdapter {
    fn kind(&self) -> ProviderKind {
        ProviderKind::ChatCompatible
    }

    async fn generate(&self, model_id: &str, prompt: &str, credential: &str) -> GenerationOutcome {
        let request = self.build_request(prompt, credential);
        debug!(
            "calling DeepSeek at {} for descriptor {model_id} as {DEEPSEEK_MODEL}",
            request.url
        );
        exchange(self.transport.as_ref(), self.kind(), request)
            .await
            .and_then(|body| chat_completion_text(self.kind(), &body))
            .into()
    }
}

/// Base URLs for the three providers. Defaults are the public endpoints.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEndpoints {
    pub aggregator: String,
    pub single_turn: String,
    pub chat_compatible: String,
}

impl Default for ProviderEndpoints {
    fn default() -> Self {
        Self {
            aggregator: OPENROUTER_BASE_URL.to_string(),
            single_turn: GEMINI_BASE_URL.to_string(),
            chat_compatible: DEEPSEEK_BASE_URL.to_string(),
        }
    }
}

/// One adapter per [`ProviderKind`].
pub struct ProviderAdapters {
    aggregator: Box<dyn ProviderAdapter>,
    single_turn: Box<dyn ProviderAdapter>,
    chat_compatible: Box<dyn ProviderAdapter>,
}

impl ProviderAdapters {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_endpoints(transport, &ProviderEndpoints::default())
    }

    pub fn with_endpoints(transport: Arc<dyn Transport>, endpoints: &ProviderEndpoints) -> Self {
        Self {
            aggregator: Box::new(
                AggregatorAdapter::new(transport.clone()).with_base_url(&endpoints.aggregator),
            ),
            single_turn: Box::new(
                SingleTurnAdapter::new(transport.clone()).with_base_url(&endpoints.single_turn),
            ),
            chat_compatible: Box::new(
                ChatCompatibleAdapter::new(transport).with_base_url(&endpoints.chat_compatible),
            ),
        }
    }

    pub fn get(&self, kind: ProviderKind) -> &dyn ProviderAdapter {
        match kind {
            ProviderKind::Aggregator => self.aggregator.as_ref(),
            ProviderKind::SingleTurn => self.single_turn.as_ref(),
            ProviderKind::ChatCompatible => self.chat_compatible.as_ref(),
        }
    }
}

/// Send the request and decode a successful JSON body. Error statuses
/// become `TransportError`, undecodable success bodies `MalformedResponse`.
async fn exchange(
    transport: &dyn Transport,
    provider: ProviderKind,
    request: HttpRequest,
) -> Result<Value, GenerationFailure> {
    let name = provider.display_name();
    let response = transport.post_json(request).await.map_err(|fault| {
        GenerationFailure::transport(format!("{name} request failed: {fault}"))
    })?;

    if !response.is_success() {
        let detail =
            upstream_error_message(&response.body).unwrap_or_else(|| "unknown error".to_string());
        return Err(GenerationFailure::transport(format!(
            "{name} API error (HTTP {}): {detail}",
            response.status
        )));
    }

    serde_json::from_str(&response.body).map_err(|err| {
        GenerationFailure::malformed(format!("{name} returned a body that is not JSON: {err}"))
    })
}

/// `error.message` (or a bare string `error`) from an error body.
fn upstream_error_message(body: &str) -> Option<String> {
    let value: Value = serde_json::from_str(body).ok()?;
    let error = value.get("error")?;
    error
        .get("message")
        .and_then(Value::as_str)
        .or_else(|| error.as_str())
        .map(str::to_string)
}

fn chat_completion_text(provider: ProviderKind, body: &Value) -> Result<String, GenerationFailure> {
    body.get("choices")
        .and_then(|choices| choices.get(0))
        .and_then(|choice| choice.get("message"))
        .and_then(|msg| msg.get("content"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| {
            let upstream = body
                .get("error")
                .and_then(|e| e.get("message"))
                .and_then(Value::as_str)
                .map(|m| format!(" ({m})"))
                .unwrap_or_default();
            GenerationFailure::malformed(format!(
                "{} response has no choices[0].message.content{upstream}",
                provider.display_name()
            ))
        })
}

fn gemini_text(body: &Value) -> Result<String, GenerationFailure> {
    let candidate = body
        .get("candidates")
        .and_then(|c| c.get(0))
        .ok_or_else(|| GenerationFailure::malformed("Gemini response has no candidates"))?;
    let content = candidate
        .get("content")
        .ok_or_else(|| GenerationFailure::malformed("Gemini candidate has no content"))?;
    content
        .get("parts")
        .and_then(|parts| parts.get(0))
        .and_then(|part| part.get("text"))
        .and_then(Value::as_str)
        .map(str::to_string)
        .ok_or_else(|| GenerationFailure::malformed("Gemini content has no generated text part"))
}
