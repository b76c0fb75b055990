//! GeminiClient - handles communication with the Gemini `generateContent` API.

use std::time::Duration;

use base64::Engine;
use serde::{Deserialize, Serialize};

use super::retry::{is_retryable_status, is_transient_network_error, parse_retry_after, RetryPolicy};

/// The environment variable name for the Gemini API key.
pub const GEMINI_API_KEY_ENV: &str = "GEMINI_API_KEY";

/// Default base URL for the Gemini API.
pub const GEMINI_API_BASE_URL: &str = "https://generativelanguage.googleapis.com";

/// Default model.
pub const DEFAULT_MODEL: &str = "gemini-1.5-flash";

/// Default timeout for HTTP requests. Video uploads inline, so be generous.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(90);

/// Default connection timeout (10 seconds).
const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

const HTTP_STATUS_TOO_MANY_REQUESTS: u16 = 429;

/// Sampling parameters sent with every request.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GenerationConfig {
    pub temperature: f32,
    pub top_k: u32,
    pub top_p: f32,
    pub max_output_tokens: u32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            temperature: 0.4,
            top_k: 32,
            top_p: 1.0,
            max_output_tokens: 2048,
        }
    }
}

/// Media attached to a prompt, sent inline as base64.
#[derive(Clone, PartialEq, Eq)]
pub struct InlineMedia {
    pub data: Vec<u8>,
    pub mime_type: String,
}

impl std::fmt::Debug for InlineMedia {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InlineMedia")
            .field("mime_type", &self.mime_type)
            .field("bytes", &self.data.len())
            .finish()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentRequest {
    contents: Vec<Content>,
    generation_config: GenerationConfig,
}

#[derive(Debug, Serialize)]
struct Content {
    role: &'static str,
    parts: Vec<Part>,
}

#[derive(Debug, Serialize)]
#[serde(untagged)]
enum Part {
    Text {
        text: String,
    },
    #[serde(rename_all = "camelCase")]
    InlineData {
        inline_data: InlineData,
    },
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateContentResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    prompt_feedback: Option<PromptFeedback>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    #[serde(default)]
    content: Option<CandidateContent>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<ResponsePart>,
}

#[derive(Debug, Deserialize)]
struct ResponsePart {
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptFeedback {
    #[serde(default)]
    block_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
    #[serde(default)]
    status: Option<String>,
}

/// Pull a readable message out of a Google API error body.
fn api_error_message(body: &str) -> String {
    match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) if !envelope.error.message.is_empty() => match envelope.error.status {
            Some(status) => format!("{} ({})", envelope.error.message, status),
            None => envelope.error.message,
        },
        _ if body.trim().is_empty() => "Unknown error".to_string(),
        _ => body.trim().to_string(),
    }
}

/// Client for the Gemini API.
pub struct GeminiClient {
    api_key: String,
    base_url: String,
    model: String,
    generation: GenerationConfig,
    retry: RetryPolicy,
    http_client: reqwest::Client,
}

impl std::fmt::Debug for GeminiClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GeminiClient")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}

impl GeminiClient {
    /// Create a client from the `GEMINI_API_KEY` environment variable.
    ///
    /// # Errors
    ///
    /// Returns `AiError::MissingApiKey` if the variable is unset or empty.
    pub fn from_env() -> Result<Self, AiError> {
        let api_key = std::env::var(GEMINI_API_KEY_ENV).map_err(|_| AiError::MissingApiKey)?;
        Self::with_api_key(api_key)
    }

    /// Create a client with an explicit API key.
    pub fn with_api_key(api_key: String) -> Result<Self, AiError> {
        Self::with_base_url(api_key, GEMINI_API_BASE_URL.to_string())
    }

    /// Create a client with a custom base URL.
    ///
    /// Useful for testing against a mock server.
    pub fn with_base_url(api_key: String, base_url: String) -> Result<Self, AiError> {
        if api_key.is_empty() {
            return Err(AiError::MissingApiKey);
        }

        let http_client = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            api_key,
            base_url: base_url.trim_end_matches('/').to_string(),
            model: DEFAULT_MODEL.to_string(),
            generation: GenerationConfig::default(),
            retry: RetryPolicy::default(),
            http_client,
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_retry_policy(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_generation_config(mut self, generation: GenerationConfig) -> Self {
        self.generation = generation;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        self.retry
    }

    fn endpoint(&self) -> String {
        format!("{}/v1beta/models/{}:generateContent", self.base_url, self.model)
    }

    /// Send one `generateContent` request and return the model's text.
    ///
    /// # Errors
    ///
    /// `AiError::RateLimit` on 429, `AiError::ApiError` on other non-2xx
    /// statuses, `AiError::Blocked` when the prompt or answer was filtered,
    /// `AiError::EmptyResponse` when no text came back and
    /// `AiError::HttpError` when the request itself failed.
    pub async fn generate(&self, prompt: &str, media: Option<&InlineMedia>) -> Result<String, AiError> {
        let mut parts = vec![Part::Text {
            text: prompt.to_string(),
        }];
        if let Some(media) = media {
            parts.push(Part::InlineData {
                inline_data: InlineData {
                    mime_type: media.mime_type.clone(),
                    data: base64::engine::general_purpose::STANDARD.encode(&media.data),
                },
            });
        }

        let request_body = GenerateContentRequest {
            contents: vec![Content { role: "user", parts }],
            generation_config: self.generation,
        };

        let response = self
            .http_client
            .post(self.endpoint())
            .query(&[("key", self.api_key.as_str())])
            .json(&request_body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            if status.as_u16() == HTTP_STATUS_TOO_MANY_REQUESTS {
                let retry_after_secs = parse_retry_after(&response);
                let error_text = response
                    .text()
                    .await
                    .unwrap_or_else(|_| "Rate limit exceeded".to_string());
                log::warn!(
                    "Rate limited by Gemini API. Retry-After: {:?} seconds",
                    retry_after_secs
                );
                return Err(AiError::RateLimit {
                    message: api_error_message(&error_text),
                    retry_after_secs,
                });
            }

            let error_text = response.text().await.unwrap_or_default();
            return Err(AiError::ApiError {
                status: status.as_u16(),
                message: api_error_message(&error_text),
            });
        }

        let body: GenerateContentResponse = response.json().await?;

        if let Some(reason) = body.prompt_feedback.and_then(|f| f.block_reason) {
            return Err(AiError::Blocked { reason });
        }

        let Some(candidate) = body.candidates.into_iter().next() else {
            return Err(AiError::EmptyResponse);
        };

        let text: String = candidate
            .content
            .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
            .unwrap_or_default();

        if text.trim().is_empty() {
            return match candidate.finish_reason {
                Some(reason) if reason == "SAFETY" || reason == "RECITATION" || reason == "BLOCKLIST" => {
                    Err(AiError::Blocked { reason })
                }
                _ => Err(AiError::EmptyResponse),
            };
        }

        Ok(text)
    }

    /// Like [`generate`](Self::generate), retrying rate limits, gateway
    /// errors and transient network failures according to the client's
    /// [`RetryPolicy`].
    pub async fn generate_with_retry(&self, prompt: &str, media: Option<&InlineMedia>) -> Result<String, AiError> {
        let policy = self.retry;
        let mut attempt = 0u32;
        let mut network_failures = 0u32;

        loop {
            let error = match self.generate(prompt, media).await {
                Ok(text) => return Ok(text),
                Err(e) => e,
            };

            let delay = match &error {
                AiError::RateLimit { retry_after_secs, .. } if attempt < policy.max_retries => {
                    Some(policy.delay(attempt, *retry_after_secs))
                }
                AiError::ApiError { status, .. } if is_retryable_status(*status) && attempt < policy.max_retries => {
                    Some(policy.delay(attempt, None))
                }
                AiError::HttpError(e) if is_transient_network_error(e) => {
                    network_failures += 1;
                    if network_failures > policy.network_retries {
                        log::error!(
                            "Network error after {} attempts. Giving up. Error: {}",
                            network_failures,
                            e
                        );
                        return Err(AiError::NetworkError {
                            message: e.to_string(),
                            attempts: network_failures,
                        });
                    }
                    Some(policy.delay(network_failures - 1, None))
                }
                _ => None,
            };

            let Some(delay) = delay else {
                if attempt > 0 {
                    log::error!("Gemini request failed after {} attempts: {}", attempt + 1, error);
                }
                return Err(error);
            };

            log::info!(
                "Gemini request failed (attempt {}): {}. Retrying in {:?}...",
                attempt + 1,
                error,
                delay
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}

/// Error type for Gemini operations.
#[derive(Debug, thiserror::Error)]
pub enum AiError {
    #[error("API key not configured")]
    MissingApiKey,

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("API error ({status}): {message}")]
    ApiError { status: u16, message: String },

    #[error("Rate limited: {message}")]
    RateLimit {
        /// Human-readable rate limit message
        message: String,
        /// Retry-After header value in seconds, if provided
        retry_after_secs: Option<u64>,
    },

    #[error("Network error: {message} (after {attempts} attempts)")]
    NetworkError {
        /// Human-readable network error message
        message: String,
        /// Number of attempts made before giving up
        attempts: u32,
    },

    #[error("Response blocked: {reason}")]
    Blocked { reason: String },

    #[error("Model returned no text")]
    EmptyResponse,
}
