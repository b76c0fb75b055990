//! X (Twitter) API v2 client: credential check, media upload and posting.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Environment variable holding the user-context bearer token.
pub const X_ACCESS_TOKEN_ENV: &str = "X_ACCESS_TOKEN";

pub const X_API_BASE_URL: &str = "https://api.x.com";

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Segment size for chunked uploads (1 MB).
const CHUNK_SIZE: usize = 1024 * 1024;

/// Give up on media processing after this many status checks.
const MAX_STATUS_CHECKS: u32 = 60;

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct TwitterUser {
    pub id: String,
    pub name: String,
    pub username: String,
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    data: TwitterUser,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PostedTweet {
    pub id: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Deserialize)]
struct TweetResponseWrapper {
    data: PostedTweet,
}

#[derive(Debug, Deserialize)]
struct MediaUploadResponse {
    data: MediaUploadData,
}

#[derive(Debug, Deserialize)]
struct MediaUploadData {
    id: String,
    #[serde(default)]
    processing_info: Option<MediaProcessingInfo>,
}

#[derive(Debug, Deserialize)]
struct MediaProcessingInfo {
    state: String,
    #[serde(default)]
    check_after_secs: Option<u64>,
}

/// Upload category expected by the media endpoints.
pub fn media_category(mime_type: &str) -> &'static str {
    if mime_type.starts_with("video/") {
        "tweet_video"
    } else if mime_type == "image/gif" {
        "tweet_gif"
    } else {
        "tweet_image"
    }
}

/// Public URL of a posted tweet.
pub fn tweet_url(tweet_id: &str) -> String {
    format!("https://twitter.com/user/status/{}", tweet_id)
}

/// Errors from the X API.
#[derive(Debug, thiserror::Error)]
pub enum TwitterError {
    #[error("X access token not configured")]
    MissingToken,

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Twitter API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("Media processing failed: {0}")]
    Processing(String),

    #[error("Invalid media type: {0}")]
    InvalidMediaType(String),
}

impl TwitterError {
    /// Status-like code for API responses; 500 when there is none.
    pub fn code(&self) -> u16 {
        match self {
            TwitterError::MissingToken => 401,
            TwitterError::Api { status, .. } => *status,
            TwitterError::Http(e) => e.status().map(|s| s.as_u16()).unwrap_or(500),
            _ => 500,
        }
    }
}

/// Client for the X API acting on behalf of one user.
#[derive(Clone)]
pub struct TwitterClient {
    access_token: String,
    base_url: String,
    http: reqwest::Client,
}

impl std::fmt::Debug for TwitterClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TwitterClient")
            .field("base_url", &self.base_url)
            .finish_non_exhaustive()
    }
}

impl TwitterClient {
    /// Create a client from `X_ACCESS_TOKEN`.
    pub fn from_env() -> Result<Self, TwitterError> {
        let token = std::env::var(X_ACCESS_TOKEN_ENV).map_err(|_| TwitterError::MissingToken)?;
        Self::new(token)
    }

    pub fn new(access_token: String) -> Result<Self, TwitterError> {
        Self::with_base_url(access_token, X_API_BASE_URL.to_string())
    }

    pub fn with_base_url(access_token: String, base_url: String) -> Result<Self, TwitterError> {
        if access_token.is_empty() {
            return Err(TwitterError::MissingToken);
        }
        let http = reqwest::Client::builder()
            .timeout(DEFAULT_TIMEOUT)
            .connect_timeout(DEFAULT_CONNECT_TIMEOUT)
            .build()?;
        Ok(Self {
            access_token,
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn bearer(&self) -> String {
        format!("Bearer {}", self.access_token)
    }

    async fn read_json<T: serde::de::DeserializeOwned>(resp: reqwest::Response, step: &str) -> Result<T, TwitterError> {
        let status = resp.status();
        let text = resp.text().await?;
        if !status.is_success() {
            return Err(TwitterError::Api {
                status: status.as_u16(),
                message: format!("{} failed: {}", step, text),
            });
        }
        // Unreadable success body is an upstream fault, not a 200.
        serde_json::from_str(&text).map_err(|e| TwitterError::Api {
            status: 502,
            message: format!("Failed to parse {} response: {} - body: {}", step, e, text),
        })
    }

    /// Get the authenticated user's info. Doubles as a credential check.
    pub async fn get_me(&self) -> Result<TwitterUser, TwitterError> {
        let resp = self
            .http
            .get(format!("{}/2/users/me", self.base_url))
            .header("Authorization", self.bearer())
            .send()
            .await?;

        let wrapper: UserResponse = Self::read_json(resp, "users/me").await?;
        Ok(wrapper.data)
    }

    /// Post a tweet, optionally with already-uploaded media.
    pub async fn post_tweet(&self, text: &str, media_ids: &[String]) -> Result<PostedTweet, TwitterError> {
        let mut body = serde_json::json!({ "text": text });
        if !media_ids.is_empty() {
            body["media"] = serde_json::json!({ "media_ids": media_ids });
        }

        let resp = self
            .http
            .post(format!("{}/2/tweets", self.base_url))
            .header("Authorization", self.bearer())
            .json(&body)
            .send()
            .await?;

        let wrapper: TweetResponseWrapper = Self::read_json(resp, "tweet").await?;
        Ok(wrapper.data)
    }

    /// Upload media and return its id.
    ///
    /// Images use a single multipart request; videos use the chunked
    /// initialize/append/finalize sequence followed by a processing poll.
    pub async fn upload_media(&self, data: &[u8], mime_type: &str) -> Result<String, TwitterError> {
        if mime_type.starts_with("video/") {
            return self.upload_media_chunked(data, mime_type).await;
        }

        let part = reqwest::multipart::Part::bytes(data.to_vec())
            .file_name("media")
            .mime_str(mime_type)
            .map_err(|_| TwitterError::InvalidMediaType(mime_type.to_string()))?;

        let form = reqwest::multipart::Form::new()
            .text("media_category", media_category(mime_type))
            .text("media_type", mime_type.to_string())
            .part("media", part);

        let resp = self
            .http
            .post(format!("{}/2/media/upload", self.base_url))
            .header("Authorization", self.bearer())
            .multipart(form)
            .send()
            .await?;

        let wrapper: MediaUploadResponse = Self::read_json(resp, "media upload").await?;
        log::info!("Uploaded {} ({} bytes) as media {}", mime_type, data.len(), wrapper.data.id);
        Ok(wrapper.data.id)
    }

    async fn upload_media_chunked(&self, data: &[u8], mime_type: &str) -> Result<String, TwitterError> {
        // The media endpoints reject codec parameters.
        let media_type = mime_type.split(';').next().unwrap_or(mime_type).trim();

        let init_body = serde_json::json!({
            "media_type": media_type,
            "total_bytes": data.len(),
            "media_category": media_category(media_type),
        });
        let resp = self
            .http
            .post(format!("{}/2/media/upload/initialize", self.base_url))
            .header("Authorization", self.bearer())
            .json(&init_body)
            .send()
            .await?;
        let init: MediaUploadResponse = Self::read_json(resp, "INIT").await?;
        let media_id = init.data.id;
        log::debug!("Chunked upload started: media_id={}, {} bytes", media_id, data.len());

        let total_segments = data.len().div_ceil(CHUNK_SIZE);
        for (segment_index, chunk) in data.chunks(CHUNK_SIZE).enumerate() {
            log::debug!("APPEND segment {}/{} ({} bytes)", segment_index + 1, total_segments, chunk.len());
            let part = reqwest::multipart::Part::bytes(chunk.to_vec())
                .file_name("media")
                .mime_str(media_type)
                .map_err(|_| TwitterError::InvalidMediaType(media_type.to_string()))?;
            let form = reqwest::multipart::Form::new()
                .text("segment_index", segment_index.to_string())
                .part("media", part);

            let resp = self
                .http
                .post(format!("{}/2/media/upload/{}/append", self.base_url, media_id))
                .header("Authorization", self.bearer())
                .multipart(form)
                .send()
                .await?;
            let status = resp.status();
            if !status.is_success() {
                let text = resp.text().await?;
                return Err(TwitterError::Api {
                    status: status.as_u16(),
                    message: format!("APPEND failed at segment {}: {}", segment_index, text),
                });
            }
        }

        let resp = self
            .http
            .post(format!("{}/2/media/upload/{}/finalize", self.base_url, media_id))
            .header("Authorization", self.bearer())
            .send()
            .await?;
        let finalized: MediaUploadResponse = Self::read_json(resp, "FINALIZE").await?;

        if let Some(info) = finalized.data.processing_info {
            if info.state != "succeeded" {
                self.wait_for_processing(&media_id, info.check_after_secs).await?;
            }
        }

        log::info!("Uploaded {} ({} bytes) as media {}", media_type, data.len(), media_id);
        Ok(media_id)
    }

    /// Poll the STATUS endpoint until processing completes.
    async fn wait_for_processing(&self, media_id: &str, first_wait: Option<u64>) -> Result<(), TwitterError> {
        let mut wait_secs = first_wait.unwrap_or(1);

        for _ in 0..MAX_STATUS_CHECKS {
            tokio::time::sleep(Duration::from_secs(wait_secs)).await;

            let resp = self
                .http
                .get(format!("{}/2/media/upload", self.base_url))
                .query(&[("command", "STATUS"), ("media_id", media_id)])
                .header("Authorization", self.bearer())
                .send()
                .await?;
            let status: MediaUploadResponse = Self::read_json(resp, "STATUS").await?;

            let Some(info) = status.data.processing_info else {
                return Ok(());
            };
            match info.state.as_str() {
                "succeeded" => return Ok(()),
                "failed" => return Err(TwitterError::Processing(format!("media {} failed processing", media_id))),
                state => {
                    wait_secs = info.check_after_secs.unwrap_or(5);
                    log::debug!("Media {} is {}, checking again in {}s", media_id, state, wait_secs);
                }
            }
        }

        Err(TwitterError::Processing(format!(
            "media {} still processing after {} checks",
            media_id, MAX_STATUS_CHECKS
        )))
    }
}
