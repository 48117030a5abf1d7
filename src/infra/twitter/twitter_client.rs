// Twitter v2 client implementing the message transport collaborator.
//
// Needs a user-context OAuth2 access token with tweet.write scope in
// `TWITTER_ACCESS_TOKEN`; obtaining and refreshing that token is an external
// concern. Duplicate tweets come back as 403 with a "duplicate content"
// detail, which the core layer treats as a soft, retryable outcome.

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue};
use reqwest::{Client, StatusCode};
use serde_json::json;
use tracing::debug;

use crate::core::outreach::{MessageTransport, OutreachError, SendOutcome};

pub struct TwitterApiClient {
    client: Client,
    base_url: String,
}

impl TwitterApiClient {
    pub fn new(access_token: &str) -> Result<Self, OutreachError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Authorization",
            HeaderValue::from_str(&format!("Bearer {}", access_token))
                .map_err(|e| OutreachError::Transport(e.to_string()))?,
        );
        headers.insert("User-Agent", HeaderValue::from_static("SheetOutreachBot/0.2"));

        let client = Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| OutreachError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: "https://api.twitter.com".to_string(),
        })
    }

    fn is_duplicate(status: StatusCode, body: &str) -> bool {
        status == StatusCode::FORBIDDEN && body.to_ascii_lowercase().contains("duplicate")
    }
}

#[async_trait]
impl MessageTransport for TwitterApiClient {
    async fn send(&self, message: &str) -> Result<SendOutcome, OutreachError> {
        debug!(len = message.len(), "posting tweet");

        let response = self
            .client
            .post(format!("{}/2/tweets", self.base_url))
            .json(&json!({ "text": message }))
            .send()
            .await
            .map_err(|e| OutreachError::Transport(format!("Twitter request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            return Ok(SendOutcome::Sent);
        }

        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());

        if Self::is_duplicate(status, &body) {
            return Ok(SendOutcome::Duplicate);
        }

        Err(OutreachError::Transport(format!(
            "Twitter rejected send ({}): {}",
            status, body
        )))
    }
}
