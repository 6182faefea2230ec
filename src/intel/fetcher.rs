use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {0} timed out")]
    Timeout(String),
    #[error("{path} returned HTTP {status}")]
    Status { path: String, status: u16 },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("response was not JSON: {0}")]
    Decode(String),
}

/// GETs a JSON document from the intelligence backend.
#[async_trait]
pub trait IntelFetcher: Send + Sync {
    async fn get_json(&self, path: &str) -> Result<Value, FetchError>;
}

pub struct HttpFetcher {
    client: Client,
    base_url: String,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(base_url: &str, timeout: Duration) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            timeout,
        }
    }
}

#[async_trait]
impl IntelFetcher for HttpFetcher {
    async fn get_json(&self, path: &str) -> Result<Value, FetchError> {
        let url = format!("{}{}", self.base_url, path);
        debug!(%url, "fetching intelligence");

        let request = async {
            let resp = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| FetchError::Transport(e.to_string()))?;
            let status = resp.status();
            if !status.is_success() {
                return Err(FetchError::Status {
                    path: path.to_string(),
                    status: status.as_u16(),
                });
            }
            resp.json::<Value>()
                .await
                .map_err(|e| FetchError::Decode(e.to_string()))
        };

        // Dropping the request future on timeout aborts the connection.
        match tokio::time::timeout(self.timeout, request).await {
            Ok(result) => result,
            Err(_) => Err(FetchError::Timeout(path.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_fetches_json_from_server() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/api/risk/global")
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(r#"{"level":"high","score":71}"#)
            .create_async()
            .await;

        let fetcher = HttpFetcher::new(&server.url(), Duration::from_secs(5));
        let json = fetcher.get_json("/api/risk/global").await.unwrap();
        assert_eq!(json["level"], "high");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_non_success_status_is_an_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/alerts/summary")
            .with_status(503)
            .create_async()
            .await;

        let fetcher = HttpFetcher::new(&server.url(), Duration::from_secs(5));
        match fetcher.get_json("/api/alerts/summary").await {
            Err(FetchError::Status { status, .. }) => assert_eq!(status, 503),
            other => panic!("expected status error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_body_is_decode_error() {
        let mut server = mockito::Server::new_async().await;
        let _mock = server
            .mock("GET", "/api/market/sentiment")
            .with_status(200)
            .with_body("<html>gateway</html>")
            .create_async()
            .await;

        let fetcher = HttpFetcher::new(&server.url(), Duration::from_secs(5));
        assert!(matches!(
            fetcher.get_json("/api/market/sentiment").await,
            Err(FetchError::Decode(_))
        ));
    }
}
