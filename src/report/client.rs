//! HTTP client for the report endpoints served by [`crate::server`].

use std::time::Duration;

use reqwest::multipart::{Form, Part};
use reqwest::StatusCode;

use super::media::MediaFile;
use crate::analysis::AiResponse;
use crate::geo::LocationError;
use crate::social::TweetResult;

/// Default address of a locally running server.
pub const DEFAULT_SERVER_URL: &str = "http://127.0.0.1:3000";

const ANALYZE_FAILED: &str = "Failed to process with AI";

const POST_FAILED: &str = "Failed to post tweet";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(120);

/// Everything that can go wrong while authoring or sending a report.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ReportError {
    #[error("Please provide issue description or location")]
    MissingInput,

    #[error(transparent)]
    Location(#[from] LocationError),

    #[error("{0}")]
    Media(String),

    #[error("Failed to reach server: {0}")]
    Unreachable(String),

    #[error("{message}")]
    Endpoint { status: u16, message: String },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("No tweet data available")]
    NothingToPost,

    #[error("Failed to post tweet: {0}")]
    PostRejected(String),
}

impl From<reqwest::Error> for ReportError {
    fn from(e: reqwest::Error) -> Self {
        ReportError::Unreachable(e.to_string())
    }
}

impl ReportError {
    pub fn status(&self) -> Option<u16> {
        match self {
            ReportError::Endpoint { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Whether the analysis may be replaced by a local fallback.
    pub fn allows_fallback(&self) -> bool {
        match self {
            ReportError::Unreachable(_) | ReportError::InvalidResponse(_) => true,
            ReportError::Endpoint { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Errors about the location belong next to the location field.
    pub fn is_location_error(&self) -> bool {
        matches!(self, ReportError::Location(_)) || self.to_string().to_lowercase().contains("location")
    }

    /// Message for the general error area.
    pub fn user_message(&self) -> String {
        let message = self.to_string();
        if message.to_lowercase().contains("media") {
            format!("Media issue: {}", message)
        } else {
            format!("Error processing your report. {}", message)
        }
    }
}

/// Rewrite an analyze endpoint `{error}` into what the user is shown.
fn analyze_error_message(status: StatusCode, error: &str) -> String {
    if status == StatusCode::SERVICE_UNAVAILABLE {
        "AI service is currently unavailable. Please check your API key configuration or try again later.".to_string()
    } else if error.contains("API key") || error.contains("Gemini") {
        "AI service configuration issue. Please check your API key or contact support.".to_string()
    } else {
        error.to_string()
    }
}

/// Turn a non-success response into an [`ReportError::Endpoint`].
async fn endpoint_error(
    resp: reqwest::Response,
    default_message: &str,
    map_error: impl Fn(StatusCode, &str) -> String,
) -> ReportError {
    let status = resp.status();
    let reason = status.canonical_reason().unwrap_or("Unknown status").to_string();
    let body = resp.text().await.unwrap_or_default();

    let json_error = serde_json::from_str::<serde_json::Value>(&body)
        .ok()
        .and_then(|v| v.get("error").and_then(|e| e.as_str()).map(str::to_string));

    let message = match json_error {
        Some(error) => map_error(status, &error),
        None if !body.trim().is_empty() => format!("{}: {}", default_message, body.trim()),
        None => format!("{}: {}", default_message, reason),
    };
    ReportError::Endpoint {
        status: status.as_u16(),
        message,
    }
}

fn non_blank(value: &str) -> Option<&str> {
    let value = value.trim();
    (!value.is_empty()).then_some(value)
}

/// Talks to `/api/analyze` and `/api/tweet`.
#[derive(Debug, Clone)]
pub struct ReportClient {
    base_url: String,
    http: reqwest::Client,
}

impl ReportClient {
    pub fn new(base_url: impl Into<String>) -> Result<Self, ReportError> {
        let http = reqwest::Client::builder().timeout(DEFAULT_TIMEOUT).build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn media_part(media: &MediaFile) -> Result<Part, ReportError> {
        Part::bytes(media.data.clone())
            .file_name(media.file_name.clone())
            .mime_str(&media.mime_type)
            .map_err(|_| ReportError::Media(format!("Invalid media type: {}", media.mime_type)))
    }

    /// Ask the server to analyze a report.
    pub async fn analyze(
        &self,
        media: Option<&MediaFile>,
        issue_text: &str,
        location: &str,
    ) -> Result<AiResponse, ReportError> {
        if non_blank(issue_text).is_none() && non_blank(location).is_none() {
            return Err(ReportError::MissingInput);
        }

        let mut form = Form::new()
            .text("issueText", issue_text.to_string())
            .text("location", location.to_string());
        if let Some(media) = media {
            form = form.part("media", Self::media_part(media)?);
        }

        let resp = self
            .http
            .post(format!("{}/api/analyze", self.base_url))
            .multipart(form)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(endpoint_error(resp, ANALYZE_FAILED, analyze_error_message).await);
        }

        let status = resp.status().as_u16();
        let body = resp.text().await?;
        let value: serde_json::Value =
            serde_json::from_str(&body).map_err(|_| ReportError::InvalidResponse(body.clone()))?;
        if let Some(error) = value.get("error").and_then(|e| e.as_str()) {
            return Err(ReportError::Endpoint {
                status,
                message: error.to_string(),
            });
        }

        let mut response: AiResponse =
            serde_json::from_value(value).map_err(|_| ReportError::InvalidResponse(body.clone()))?;
        if response.location_detected.trim().is_empty() {
            if let Some(location) = non_blank(location) {
                response.location_detected = location.to_string();
            }
        }
        Ok(response)
    }

    /// Like [`analyze`](Self::analyze), but a server-side failure with a
    /// known location yields the local fallback instead of an error.
    pub async fn analyze_or_fallback(
        &self,
        media: Option<&MediaFile>,
        issue_text: &str,
        location: &str,
    ) -> Result<AiResponse, ReportError> {
        match self.analyze(media, issue_text, location).await {
            Ok(response) => Ok(response),
            Err(e) if e.allows_fallback() => match non_blank(location) {
                Some(location) => {
                    log::warn!("Analysis failed ({}), using fallback for {}", e, location);
                    Ok(AiResponse::service_error_fallback(location))
                }
                None => Err(e),
            },
            Err(e) => Err(e),
        }
    }

    /// Publish `text` with `media` through the server.
    pub async fn post_tweet(&self, text: &str, media: &MediaFile) -> Result<TweetResult, ReportError> {
        if non_blank(text).is_none() {
            return Err(ReportError::NothingToPost);
        }

        let form = Form::new()
            .text("tweet", text.to_string())
            .part("media", Self::media_part(media)?);

        let resp = self
            .http
            .post(format!("{}/api/tweet", self.base_url))
            .multipart(form)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(endpoint_error(resp, POST_FAILED, |_, error| error.to_string()).await);
        }

        let body = resp.text().await?;
        let result: TweetResult =
            serde_json::from_str(&body).map_err(|_| ReportError::InvalidResponse(body.clone()))?;
        if !result.success {
            return Err(ReportError::PostRejected(result.error.unwrap_or_default()));
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_analyze_error_message_mapping() {
        assert!(analyze_error_message(StatusCode::SERVICE_UNAVAILABLE, "whatever").starts_with("AI service is currently unavailable"));
        assert_eq!(
            analyze_error_message(StatusCode::INTERNAL_SERVER_ERROR, "Gemini quota exceeded"),
            "AI service configuration issue. Please check your API key or contact support."
        );
        assert_eq!(
            analyze_error_message(StatusCode::BAD_REQUEST, "Please provide issue description or location"),
            "Please provide issue description or location"
        );
    }

    #[test]
    fn test_fallback_eligibility() {
        assert!(ReportError::Unreachable("refused".into()).allows_fallback());
        assert!(ReportError::InvalidResponse("<html>".into()).allows_fallback());
        assert!(ReportError::Endpoint {
            status: 503,
            message: "down".into()
        }
        .allows_fallback());
        assert!(!ReportError::Endpoint {
            status: 400,
            message: "bad".into()
        }
        .allows_fallback());
        assert!(!ReportError::MissingInput.allows_fallback());
    }

    #[test]
    fn test_error_routing() {
        assert!(ReportError::Location(LocationError::ManualEmpty).is_location_error());
        assert!(ReportError::MissingInput.is_location_error());
        assert!(!ReportError::Unreachable("refused".into()).is_location_error());

        assert_eq!(
            ReportError::Media("Media file is empty".into()).user_message(),
            "Media issue: Media file is empty"
        );
        assert_eq!(
            ReportError::Unreachable("refused".into()).user_message(),
            "Error processing your report. Failed to reach server: refused"
        );
    }
}
