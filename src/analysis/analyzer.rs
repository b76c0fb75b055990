//! Analysis service: turns a report into an [`AiResponse`], substituting a
//! deterministic fallback whenever that is safe.

use super::client::{AiError, GeminiClient, InlineMedia};
use super::prompt::{build_prompt, VERIFY_PROMPT};
use super::response::AiResponse;

/// Input to one analysis.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AnalysisRequest {
    pub media: Option<InlineMedia>,
    pub issue_text: Option<String>,
    pub location: Option<String>,
}

impl AnalysisRequest {
    /// Issue text, ignoring blank input.
    pub fn issue_text(&self) -> Option<&str> {
        non_blank(self.issue_text.as_deref())
    }

    /// Location, ignoring blank input.
    pub fn location(&self) -> Option<&str> {
        non_blank(self.location.as_deref())
    }
}

fn non_blank(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Why an analysis could not produce any response at all.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum AnalyzeError {
    #[error("Please provide issue description or location")]
    MissingInput,

    #[error("AI service is currently unavailable. Please try again later or contact support.")]
    ServiceUnavailable,

    #[error("Failed to analyze media. Please check your API configuration or try again later.")]
    Failed(String),
}

impl AnalyzeError {
    /// HTTP status the analyze endpoint answers with.
    pub fn status_code(&self) -> u16 {
        match self {
            AnalyzeError::MissingInput => 400,
            AnalyzeError::ServiceUnavailable => 503,
            AnalyzeError::Failed(_) => 500,
        }
    }
}

/// Wraps an optional Gemini client; without one every analysis is a 503.
#[derive(Debug, Default)]
pub struct Analyzer {
    client: Option<GeminiClient>,
}

impl Analyzer {
    pub fn new(client: Option<GeminiClient>) -> Self {
        if client.is_none() {
            log::warn!("GEMINI_API_KEY is not set. AI analysis will be unavailable.");
        }
        Self { client }
    }

    pub fn unconfigured() -> Self {
        Self { client: None }
    }

    pub fn is_configured(&self) -> bool {
        self.client.is_some()
    }

    pub fn client(&self) -> Option<&GeminiClient> {
        self.client.as_ref()
    }

    /// Analyze a report.
    ///
    /// Unparseable model output becomes the "unparseable" fallback. An AI
    /// failure becomes the "service error" fallback when a location is
    /// known and [`AnalyzeError::Failed`] otherwise.
    pub async fn analyze(&self, request: &AnalysisRequest) -> Result<AiResponse, AnalyzeError> {
        let Some(client) = self.client.as_ref() else {
            log::error!("Analysis requested but no Gemini client is configured");
            return Err(AnalyzeError::ServiceUnavailable);
        };

        let issue_text = request.issue_text();
        let location = request.location();
        if issue_text.is_none() && location.is_none() {
            return Err(AnalyzeError::MissingInput);
        }

        let prompt = build_prompt(issue_text, location);
        if let Some(media) = &request.media {
            log::info!("Analyzing report with {} ({} bytes)", media.mime_type, media.data.len());
        } else {
            log::info!("Analyzing report without media");
        }

        match client.generate_with_retry(&prompt, request.media.as_ref()).await {
            Ok(text) => Ok(AiResponse::from_model_output(&text, location).unwrap_or_else(|| {
                log::error!("Failed to parse AI response: {}", text);
                AiResponse::unparseable_fallback(location)
            })),
            Err(e) => {
                log::error!("Error in AI analysis: {}", e);
                match location {
                    Some(location) => {
                        log::info!("Using fallback response due to API error");
                        Ok(AiResponse::service_error_fallback(location))
                    }
                    None => Err(AnalyzeError::Failed(e.to_string())),
                }
            }
        }
    }

    /// Ask the model for a one-line answer to prove the key works.
    pub async fn verify(&self) -> Result<String, AiError> {
        let client = self.client.as_ref().ok_or(AiError::MissingApiKey)?;
        let text = client.generate(VERIFY_PROMPT, None).await?;
        Ok(text.trim().to_string())
    }
}
