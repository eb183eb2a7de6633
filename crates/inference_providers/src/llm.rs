//! LLM adapter (spec.md §4.1): `generate(messages, language) -> sequence of
//! text chunks` plus non-streaming `generate_once`. Request payload follows
//! the OpenAI-style chat-completion shape; streaming bodies are
//! newline-delimited `data: <json>` with sentinel `data: [DONE]`.

use async_trait::async_trait;
use futures_core::Stream;
use futures_util::StreamExt;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::LlmCache;
use crate::errors::{LlmError, ProviderErrorKind};
use crate::sse::SseChunkStream;
use crate::types::{ChatMessage, GenerateOnceResult, LlmRequest};

pub type TextChunkStream = Pin<Box<dyn Stream<Item = Result<String, LlmError>> + Send>>;

#[async_trait]
pub trait LlmProvider: Send + Sync {
    async fn generate(&self, request: LlmRequest) -> Result<TextChunkStream, LlmError>;

    async fn generate_once(&self, request: LlmRequest) -> Result<GenerateOnceResult, LlmError>;
}

pub struct HttpLlmProvider {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    timeout: Duration,
    cache: Option<Arc<LlmCache>>,
}

#[derive(serde::Serialize)]
struct ChatCompletionRequestBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    stream: bool,
    max_tokens: u32,
    temperature: f32,
    top_p: f32,
    frequency_penalty: f32,
    presence_penalty: f32,
}

#[derive(serde::Deserialize)]
struct ChatCompletionResponseBody {
    choices: Vec<ChatCompletionResponseChoice>,
    usage: Option<ChatCompletionResponseUsage>,
}

#[derive(serde::Deserialize)]
struct ChatCompletionResponseChoice {
    message: ChatCompletionResponseMessage,
    finish_reason: Option<String>,
}

#[derive(serde::Deserialize)]
struct ChatCompletionResponseMessage {
    content: String,
}

#[derive(serde::Deserialize)]
struct ChatCompletionResponseUsage {
    completion_tokens: u32,
}

impl HttpLlmProvider {
    pub fn new(
        base_url: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
        cache: Option<Arc<LlmCache>>,
    ) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            api_key,
            timeout,
            cache,
        }
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url.trim_end_matches('/'))
    }

    fn authed(&self, builder: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.api_key {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

#[async_trait]
impl LlmProvider for HttpLlmProvider {
    async fn generate(&self, request: LlmRequest) -> Result<TextChunkStream, LlmError> {
        let body = ChatCompletionRequestBody {
            model: &request.model,
            messages: &request.messages,
            stream: true,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
            frequency_penalty: request.frequency_penalty,
            presence_penalty: request.presence_penalty,
        };

        let response = tokio::time::timeout(
            self.timeout,
            self.authed(self.client.post(self.endpoint()).json(&body)).send(),
        )
        .await
        .map_err(|_| LlmError::Kind(ProviderErrorKind::ProviderTimeout(self.timeout)))?
        .map_err(|e| LlmError::Kind(ProviderErrorKind::ProviderRpcError(e.to_string())))?;

        if !response.status().is_success() {
            return Err(LlmError::Kind(ProviderErrorKind::ProviderRpcError(format!(
                "status {}",
                response.status()
            ))));
        }

        let byte_stream = response.bytes_stream();
        let chunk_stream = SseChunkStream::new(byte_stream);
        let stream = chunk_stream.map(|chunk| {
            let content = chunk
                .choices
                .into_iter()
                .next()
                .and_then(|choice| choice.delta)
                .and_then(|delta| delta.content)
                .unwrap_or_default();
            Ok(content)
        });

        Ok(Box::pin(stream))
    }

    async fn generate_once(&self, request: LlmRequest) -> Result<GenerateOnceResult, LlmError> {
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(&request.messages).await {
                return Ok(hit);
            }
        }

        let body = ChatCompletionRequestBody {
            model: &request.model,
            messages: &request.messages,
            stream: false,
            max_tokens: request.max_tokens,
            temperature: request.temperature,
            top_p: request.top_p,
            frequency_penalty: request.frequency_penalty,
            presence_penalty: request.presence_penalty,
        };

        let response = tokio::time::timeout(
            self.timeout,
            self.authed(self.client.post(self.endpoint()).json(&body)).send(),
        )
        .await
        .map_err(|_| LlmError::Kind(ProviderErrorKind::ProviderTimeout(self.timeout)))?
        .map_err(|e| LlmError::Kind(ProviderErrorKind::ProviderRpcError(e.to_string())))?;

        if !response.status().is_success() {
            return Err(LlmError::Kind(ProviderErrorKind::ProviderRpcError(format!(
                "status {}",
                response.status()
            ))));
        }

        let parsed: ChatCompletionResponseBody = response
            .json()
            .await
            .map_err(|e| LlmError::MalformedResponse(e.to_string()))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::MalformedResponse("no choices in response".to_string()))?;

        let result = GenerateOnceResult {
            text: choice.message.content,
            token_count: parsed.usage.map(|u| u.completion_tokens).unwrap_or(0),
            finish_reason: choice.finish_reason.unwrap_or_else(|| "stop".to_string()),
        };

        if let Some(cache) = &self.cache {
            cache.set(&request.messages, &result.text).await;
        }

        Ok(result)
    }
}
