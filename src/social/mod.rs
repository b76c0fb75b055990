//! Posting drafted reports to X (Twitter).

mod publish;
mod twitter;

pub use publish::{publish, PublishError, TweetMedia, TweetResult};
pub use twitter::{
    media_category, tweet_url, PostedTweet, TwitterClient, TwitterError, TwitterUser, X_ACCESS_TOKEN_ENV,
    X_API_BASE_URL,
};
