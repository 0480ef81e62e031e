use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, warn};

use crate::{FeedSource, RawRecord};

#[derive(Error, Debug)]
pub enum FeedError {
    #[error("feed request timed out after {0:?}")]
    Timeout(Duration),

    #[error("feed request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("feed returned HTTP {0}")]
    Status(StatusCode),

    #[error("feed body is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("feed body is not a JSON array (got {0})")]
    NotAnArray(&'static str),
}

/// HTTP client for the live-matches endpoint.
#[derive(Clone, Debug)]
pub struct FeedClient {
    http: reqwest::Client,
    url: String,
    token: Option<String>,
    timeout: Duration,
}

impl FeedClient {
    /// `timeout` bounds the whole request, body included.
    pub fn new(
        url: impl Into<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, FeedError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url: url.into(),
            token: token.filter(|t| !t.is_empty()),
            timeout,
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    fn classify(&self, err: reqwest::Error) -> FeedError {
        if err.is_timeout() {
            FeedError::Timeout(self.timeout)
        } else {
            FeedError::Request(err)
        }
    }
}

#[async_trait]
impl FeedSource for FeedClient {
    async fn fetch_live(&self) -> Result<Vec<RawRecord>, FeedError> {
        let mut request = self.http.get(&self.url);
        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await.map_err(|e| self.classify(e))?;
        let status = response.status();
        if !status.is_success() {
            return Err(FeedError::Status(status));
        }
        let body = response.bytes().await.map_err(|e| self.classify(e))?;

        let items = match serde_json::from_slice::<Value>(&body)? {
            Value::Array(items) => items,
            other => return Err(FeedError::NotAnArray(json_kind(&other))),
        };

        let total = items.len();
        let records: Vec<RawRecord> = items
            .into_iter()
            .enumerate()
            .filter_map(|(idx, item)| match item {
                Value::Object(map) => Some(map),
                other => {
                    warn!(index = idx, kind = json_kind(&other), "skipping non-object feed entry");
                    None
                }
            })
            .collect();
        debug!(total, kept = records.len(), "feed fetched");
        Ok(records)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
