//! Publishing a drafted report: credential check, optional media, post.

use serde::{Deserialize, Serialize};

use super::twitter::{tweet_url, TwitterClient, TwitterError};

/// Media attached to a tweet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TweetMedia {
    pub data: Vec<u8>,
    pub mime_type: String,
}

/// Body returned by the tweet endpoint, on success and on failure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TweetResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tweet_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tweet_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<u16>,
}

impl TweetResult {
    pub fn posted(tweet_id: String) -> Self {
        Self {
            success: true,
            tweet_url: Some(tweet_url(&tweet_id)),
            tweet_id: Some(tweet_id),
            ..Default::default()
        }
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Twitter API credentials verification failed")]
    Credentials(#[source] TwitterError),

    #[error("No tweet text provided")]
    MissingText,

    #[error("Failed to post tweet")]
    Post(#[source] TwitterError),
}

impl PublishError {
    /// HTTP status the tweet endpoint answers with.
    pub fn status_code(&self) -> u16 {
        match self {
            PublishError::Credentials(_) => 401,
            PublishError::MissingText => 400,
            PublishError::Post(_) => 500,
        }
    }

    /// Failure body in the shape the endpoint returns.
    pub fn to_result(&self) -> TweetResult {
        match self {
            PublishError::Credentials(e) => TweetResult {
                success: false,
                error: Some(self.to_string()),
                details: Some(e.to_string()),
                code: Some(e.code()),
                ..Default::default()
            },
            PublishError::MissingText => TweetResult {
                success: false,
                error: Some(self.to_string()),
                ..Default::default()
            },
            PublishError::Post(e) => {
                let error = match e {
                    TwitterError::Api { message, .. } if !message.is_empty() => message.clone(),
                    _ => self.to_string(),
                };
                TweetResult {
                    success: false,
                    error: Some(error),
                    details: Some(e.to_string()),
                    code: Some(e.code()),
                    ..Default::default()
                }
            }
        }
    }
}

/// Verify credentials, upload `media` if given, then post `text`.
///
/// A media upload failure does not fail the publish; the tweet goes out
/// without media.
pub async fn publish(
    client: &TwitterClient,
    text: Option<&str>,
    media: Option<&TweetMedia>,
) -> Result<TweetResult, PublishError> {
    let user = client.get_me().await.map_err(|e| {
        log::error!("Twitter credentials verification failed: {}", e);
        PublishError::Credentials(e)
    })?;
    log::info!("Twitter credentials verified for @{}", user.username);

    let text = text.map(str::trim).filter(|t| !t.is_empty()).ok_or(PublishError::MissingText)?;

    let mut media_ids = Vec::new();
    if let Some(media) = media {
        match client.upload_media(&media.data, &media.mime_type).await {
            Ok(id) => media_ids.push(id),
            Err(e) => log::warn!("Media upload failed, posting without media: {}", e),
        }
    }

    let tweet = client.post_tweet(text, &media_ids).await.map_err(|e| {
        log::error!("Failed to post tweet: {}", e);
        PublishError::Post(e)
    })?;
    log::info!("Posted tweet {}", tweet.id);

    Ok(TweetResult::posted(tweet.id))
}
