// OpenAI-compatible chat completion client
// Author: kelexine (https://github.com/kelexine)

use super::{ContentGenerator, GenerationPrompt, UpstreamError, UpstreamErrorKind};
use crate::config::UpstreamConfig;
use crate::error::{GuardError, Result};
use crate::utils::logging::sanitize;
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error};

/// Generator backed by an OpenAI-compatible `/chat/completions` endpoint.
///
/// This client never retries on its own; the governance layer wraps every
/// call in the retry executor and relies on the error kinds produced here.
pub struct OpenAiGenerator {
    http_client: Client,
    config: UpstreamConfig,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage>,
    max_tokens: u32,
    temperature: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Debug, Serialize)]
struct ChatMessage {
    role: &'static str,
    content: String,
}

#[derive(Debug, Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    format_type: &'static str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

impl OpenAiGenerator {
    pub fn new(config: &UpstreamConfig) -> Result<Self> {
        let http_client = Client::builder()
            .connect_timeout(Duration::from_secs(config.connect_timeout_secs))
            .pool_max_idle_per_host(10)
            .pool_idle_timeout(Duration::from_secs(90))
            .tcp_keepalive(Some(Duration::from_secs(60)))
            .use_rustls_tls()
            .build()
            .map_err(|e| GuardError::Config(format!("Failed to create HTTP client: {}", e)))?;

        debug!(base_url = %config.api_base_url, model = %config.model, "Created upstream HTTP client");

        Ok(Self {
            http_client,
            config: config.clone(),
        })
    }

    fn build_request<'a>(&'a self, prompt: &GenerationPrompt) -> ChatRequest<'a> {
        let structured = prompt.request_type.expects_structured_output();
        let system = if structured {
            format!(
                "You produce {} content for a real-estate agency. Respond with a single JSON object.",
                prompt.request_type
            )
        } else {
            format!(
                "You produce {} content for a real-estate agency. Respond with plain text.",
                prompt.request_type
            )
        };
        ChatRequest {
            model: &self.config.model,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: system,
                },
                ChatMessage {
                    role: "user",
                    content: match &prompt.input {
                        Value::String(text) => text.clone(),
                        other => other.to_string(),
                    },
                },
            ],
            max_tokens: self.config.max_tokens,
            temperature: self.config.temperature,
            response_format: structured.then_some(ResponseFormat {
                format_type: "json_object",
            }),
        }
    }
}

#[async_trait]
impl ContentGenerator for OpenAiGenerator {
    async fn generate(&self, prompt: &GenerationPrompt) -> std::result::Result<Value, UpstreamError> {
        let url = format!("{}/chat/completions", self.config.api_base_url.trim_end_matches('/'));
        debug!(request_type = %prompt.request_type, "Calling chat completions");

        let mut request = self.http_client.post(&url).json(&self.build_request(prompt));
        if let Some(key) = &self.config.api_key {
            request = request.bearer_auth(key);
        }

        let response = request.send().await.map_err(classify_transport)?;

        let status = response.status();
        let body = response.text().await.map_err(classify_transport)?;

        if !status.is_success() {
            error!("Upstream error: HTTP {} - {}", status, sanitize(truncate(&body, 500)));
            return Err(classify_status(status.as_u16(), &body));
        }

        parse_completion(&body, prompt.request_type.expects_structured_output())
    }
}

/// Map a reqwest failure onto an error kind.
fn classify_transport(e: reqwest::Error) -> UpstreamError {
    if e.is_timeout() {
        return UpstreamError::new(UpstreamErrorKind::Timeout, e.to_string());
    }
    if e.is_connect() || has_connection_io_error(&e) {
        return UpstreamError::connection(e.to_string());
    }
    UpstreamError::new(UpstreamErrorKind::Other, e.to_string())
}

fn has_connection_io_error(e: &(dyn std::error::Error + 'static)) -> bool {
    use std::io::ErrorKind;

    let mut source = e.source();
    while let Some(err) = source {
        if let Some(io) = err.downcast_ref::<std::io::Error>() {
            return matches!(
                io.kind(),
                ErrorKind::ConnectionReset
                    | ErrorKind::ConnectionRefused
                    | ErrorKind::ConnectionAborted
                    | ErrorKind::BrokenPipe
                    | ErrorKind::TimedOut
            );
        }
        source = err.source();
    }
    false
}

/// Classify a non-success response. Billing exhaustion is reported by the
/// provider as 429 (or 402) with an `insufficient_quota` code; it is terminal
/// and must not be confused with an ordinary rate limit.
pub(crate) fn classify_status(status: u16, body: &str) -> UpstreamError {
    let (message, code) = extract_error(body);
    let message = message.unwrap_or_else(|| truncate(body, 200).to_string());

    let quota = status == 402
        || matches!(
            code.as_deref(),
            Some("insufficient_quota") | Some("billing_hard_limit_reached")
        );

    if quota {
        UpstreamError::quota_exhausted(message)
    } else {
        UpstreamError::status(status, message)
    }
}

/// Pull `error.message` and `error.code` (or `error.type`) from an error body.
fn extract_error(body: &str) -> (Option<String>, Option<String>) {
    #[derive(Deserialize)]
    struct ErrorResponse {
        error: Option<ErrorDetail>,
    }

    #[derive(Deserialize)]
    struct ErrorDetail {
        message: Option<String>,
        code: Option<Value>,
        #[serde(rename = "type")]
        error_type: Option<String>,
    }

    match serde_json::from_str::<ErrorResponse>(body) {
        Ok(ErrorResponse {
            error: Some(detail),
        }) => {
            let code = detail
                .code
                .and_then(|c| c.as_str().map(str::to_string))
                .or(detail.error_type);
            (detail.message, code)
        }
        _ => (None, None),
    }
}

/// Structured content is parsed as JSON; anything else is returned as text.
fn parse_completion(body: &str, structured: bool) -> std::result::Result<Value, UpstreamError> {
    let parsed: ChatResponse = serde_json::from_str(body).map_err(|e| {
        UpstreamError::new(
            UpstreamErrorKind::InvalidResponse,
            format!("Response parsing error: {}", e),
        )
    })?;

    let content = parsed
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .ok_or_else(|| UpstreamError::new(UpstreamErrorKind::InvalidResponse, "empty completion"))?;

    if !structured {
        return Ok(Value::String(content));
    }
    Ok(serde_json::from_str(&content).unwrap_or(Value::String(content)))
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
