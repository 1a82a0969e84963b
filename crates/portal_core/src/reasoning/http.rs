//! OpenAI-compatible chat completion client.

use super::{ReasoningClient, ReasoningError, ReasoningRequest};
use log::{error, info};
use reqwest::header::{HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

/// Connection settings for [`HttpReasoningClient`].
#[derive(Debug, Clone)]
pub struct ReasoningClientConfig {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub timeout: Duration,
}

/// Blocking chat-completions client.
pub struct HttpReasoningClient {
    client: reqwest::blocking::Client,
    config: ReasoningClientConfig,
    authorization: HeaderValue,
}

impl HttpReasoningClient {
    /// Builds a client; fails when no API key is configured.
    pub fn new(config: ReasoningClientConfig) -> Result<Self, ReasoningError> {
        let key = config
            .api_key
            .as_deref()
            .map(str::trim)
            .filter(|key| !key.is_empty())
            .ok_or_else(|| ReasoningError::Unconfigured("API key is missing".to_string()))?;
        let authorization = HeaderValue::from_str(&format!("Bearer {key}"))
            .map_err(|err| ReasoningError::Unconfigured(format!("invalid API key: {err}")))?;
        let client = reqwest::blocking::Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|err| ReasoningError::Http(err.to_string()))?;
        Ok(Self {
            client,
            config,
            authorization,
        })
    }
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatMessageResponse,
}

#[derive(Debug, Deserialize)]
struct ChatMessageResponse {
    content: Option<String>,
}

impl ReasoningClient for HttpReasoningClient {
    fn complete(&self, request: &ReasoningRequest) -> Result<String, ReasoningError> {
        let started_at = Instant::now();
        let body = ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: &request.system,
                },
                ChatMessage {
                    role: "user",
                    content: &request.user,
                },
            ],
            temperature: self.config.temperature,
        };

        let result = self
            .client
            .post(&self.config.endpoint)
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .header(AUTHORIZATION, self.authorization.clone())
            .json(&body)
            .send()
            .map_err(|err| ReasoningError::Http(err.to_string()))
            .and_then(|response| {
                let status = response.status();
                if !status.is_success() {
                    return Err(ReasoningError::Response(format!("HTTP {}", status.as_u16())));
                }
                response
                    .json::<ChatResponse>()
                    .map_err(|err| ReasoningError::Response(err.to_string()))
            })
            .and_then(|parsed| {
                parsed
                    .choices
                    .into_iter()
                    .next()
                    .and_then(|choice| choice.message.content)
                    .ok_or_else(|| ReasoningError::Response("missing choices".to_string()))
            });

        match &result {
            Ok(text) => info!(
                "event=reasoning_complete module=reasoning status=ok chars={} duration_ms={}",
                text.chars().count(),
                started_at.elapsed().as_millis()
            ),
            Err(err) => error!(
                "event=reasoning_complete module=reasoning status=error duration_ms={} error={}",
                started_at.elapsed().as_millis(),
                err
            ),
        }
        result
    }
}
