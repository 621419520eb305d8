use candela_ports::FetchError;
use reqwest::{Client, StatusCode};
use serde::de::DeserializeOwned;
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum RestError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("API error: {status} - {body}")]
    Api { status: u16, body: String },
    #[error("Rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },
    #[error("Parse error: {0}")]
    Parse(String),
}

/// Convert infrastructure RestError to domain FetchError
impl From<RestError> for FetchError {
    fn from(err: RestError) -> Self {
        match err {
            RestError::Http(e) => FetchError::Transport(e.to_string()),
            RestError::Api { status, body } => FetchError::Http { status, body },
            RestError::RateLimited { retry_after } => FetchError::RateLimited {
                retry_after_ms: retry_after.map(|d| d.as_millis() as u64),
            },
            RestError::Parse(msg) => FetchError::Parse(msg),
        }
    }
}

/// JSON-over-HTTP client for public exchange REST APIs
/// Infrastructure component - handles HTTP communication
#[derive(Clone)]
pub struct RestClient {
    client: Client,
    base_url: String,
}

impl RestClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_else(|_| Client::new());
        RestClient {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub async fn get<T: DeserializeOwned>(
        &self,
        path: &str,
        query: &[(&str, String)],
    ) -> Result<T, RestError> {
        let url = format!("{}{}", self.base_url, path);
        let resp = self.client.get(&url).query(query).send().await?;
        self.handle_response(resp).await
    }

    async fn handle_response<T: DeserializeOwned>(
        &self,
        resp: reqwest::Response,
    ) -> Result<T, RestError> {
        let status = resp.status();

        if status == StatusCode::TOO_MANY_REQUESTS || status.as_u16() == 418 {
            let retry_after = resp
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_secs);
            return Err(RestError::RateLimited { retry_after });
        }

        let text = resp.text().await?;
        if !status.is_success() {
            return Err(RestError::Api {
                status: status.as_u16(),
                body: text,
            });
        }

        serde_json::from_str(&text).map_err(|e| RestError::Parse(e.to_string()))
    }
}
