//! Endpoint handlers (/api/analyze, /api/tweet, /api/verify-*)

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::{Multipart, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;

use super::error::{ApiError, LogErr};
use super::AppState;
use crate::analysis::{AnalysisRequest, InlineMedia};
use crate::social::{self, TweetMedia, TwitterError};

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/analyze", post(analyze))
        .route("/api/tweet", post(tweet))
        .route("/api/verify-gemini", get(verify_gemini))
        .route("/api/verify-twitter", get(verify_twitter))
}

/// An uploaded file part.
struct UploadedFile {
    data: Vec<u8>,
    content_type: String,
}

/// Text fields plus the `media` file of a multipart form.
#[derive(Default)]
struct FormData {
    fields: HashMap<String, String>,
    media: Option<UploadedFile>,
}

impl FormData {
    fn text(&self, name: &str) -> Option<String> {
        self.fields.get(name).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    }
}

async fn read_form(mut multipart: Multipart) -> Result<FormData, ApiError> {
    let mut form = FormData::default();

    while let Some(field) = multipart
        .next_field()
        .await
        .log_status("Multipart field error", StatusCode::BAD_REQUEST, "Invalid form data")?
    {
        let Some(name) = field.name().map(str::to_string) else {
            continue;
        };

        if name == "media" {
            let content_type = field
                .content_type()
                .map(|s| s.to_string())
                .unwrap_or_else(|| "application/octet-stream".to_string());
            let data = field
                .bytes()
                .await
                .log_status("Reading media field", StatusCode::BAD_REQUEST, "Invalid media upload")?;
            // Browsers send an empty part when no file was chosen.
            if !data.is_empty() {
                form.media = Some(UploadedFile {
                    data: data.to_vec(),
                    content_type,
                });
            }
        } else {
            let value = field
                .text()
                .await
                .log_status("Reading form field", StatusCode::BAD_REQUEST, "Invalid form data")?;
            form.fields.insert(name, value);
        }
    }

    Ok(form)
}

/// POST /api/analyze - classify a report and draft a tweet
async fn analyze(State(state): State<Arc<AppState>>, multipart: Multipart) -> Response {
    let form = match read_form(multipart).await {
        Ok(form) => form,
        Err(e) => return e.into_response(),
    };

    let issue_text = form.text("issueText");
    let location = form.text("location");
    let request = AnalysisRequest {
        media: form.media.map(|m| InlineMedia {
            data: m.data,
            mime_type: m.content_type,
        }),
        issue_text,
        location,
    };

    match state.analyzer.analyze(&request).await {
        Ok(response) => Json(response).into_response(),
        Err(e) => {
            let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            ApiError::new(status, e.to_string()).into_response()
        }
    }
}

/// POST /api/tweet - publish a tweet with optional media
async fn tweet(State(state): State<Arc<AppState>>, multipart: Multipart) -> Response {
    let form = match read_form(multipart).await {
        Ok(form) => form,
        Err(e) => return e.into_response(),
    };

    let Some(client) = state.twitter.as_ref() else {
        log::error!("Tweet requested but {} is not set", social::X_ACCESS_TOKEN_ENV);
        let body = social::PublishError::Credentials(TwitterError::MissingToken).to_result();
        return (StatusCode::UNAUTHORIZED, Json(body)).into_response();
    };

    let text = form.text("tweet");
    let media = form.media.map(|m| TweetMedia {
        data: m.data,
        mime_type: m.content_type,
    });

    match social::publish(client, text.as_deref(), media.as_ref()).await {
        Ok(result) => Json(result).into_response(),
        Err(social::PublishError::MissingText) => ApiError::bad_request("No tweet text provided").into_response(),
        Err(e) => {
            let status = StatusCode::from_u16(e.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(e.to_result())).into_response()
        }
    }
}

/// GET /api/verify-gemini - check the Gemini key with a tiny prompt
async fn verify_gemini(State(state): State<Arc<AppState>>) -> Response {
    match state.analyzer.verify().await {
        Ok(sample) => Json(json!({
            "success": true,
            "message": "Gemini API connection successful",
            "sample_response": sample,
        }))
        .into_response(),
        Err(e) => {
            log::error!("Gemini verification failed: {}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "success": false, "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// GET /api/verify-twitter - check the X credentials
async fn verify_twitter(State(state): State<Arc<AppState>>) -> Response {
    let result = match state.twitter.as_ref() {
        Some(client) => client.get_me().await,
        None => Err(TwitterError::MissingToken),
    };

    match result {
        Ok(user) => Json(json!({
            "success": true,
            "message": format!("Twitter API connection successful. Authenticated as @{}", user.username),
            "user": user,
        }))
        .into_response(),
        Err(e) => {
            log::error!("Twitter verification failed: {}", e);
            let status = StatusCode::from_u16(e.code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            (status, Json(json!({ "success": false, "error": e.to_string() }))).into_response()
        }
    }
}
