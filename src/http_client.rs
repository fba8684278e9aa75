use std::time::Duration;

use futures::TryStreamExt;
use reqwest::{Client, Response};
use tokio::time::{sleep, timeout};
use tracing::{debug, warn};

use crate::error::{BindingError, Result};

/// Configuration for the HTTP client used to fetch remote schema documents
#[derive(Debug, Clone)]
pub struct HttpClientConfig {
    /// Request timeout in seconds
    pub timeout_seconds: u64,
    /// Number of retry attempts
    pub retry_attempts: u32,
    /// Initial retry delay in milliseconds
    pub retry_delay_ms: u64,
    /// Maximum retry delay in milliseconds (for exponential backoff cap)
    pub max_retry_delay_ms: u64,
    /// Largest document accepted, whatever the server announces
    pub max_document_bytes: usize,
    pub user_agent: String,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 30,
            retry_attempts: 3,
            retry_delay_ms: 1000,
            max_retry_delay_ms: 30000,
            max_document_bytes: 16 * 1024 * 1024,
            user_agent: format!("xml-binder/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Async HTTP client with retry and exponential backoff
#[derive(Debug, Clone)]
pub struct AsyncHttpClient {
    client: Client,
    config: HttpClientConfig,
}

impl AsyncHttpClient {
    pub fn new(config: HttpClientConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .user_agent(&config.user_agent)
            .pool_idle_timeout(Duration::from_secs(30))
            .pool_max_idle_per_host(10)
            .build()
            .map_err(BindingError::from)?;

        Ok(Self { client, config })
    }

    /// Download a document, retrying transient failures
    pub async fn download(&self, url: &str) -> Result<Vec<u8>> {
        let response = self.get_response_with_retry(url).await?;

        let limit = self.config.max_document_bytes;
        if let Some(length) = response.content_length()
            && length > limit as u64
        {
            return Err(self.too_large(url, length));
        }

        let mut buffer = Vec::new();
        let mut stream = response.bytes_stream();
        while let Some(chunk) = TryStreamExt::try_next(&mut stream)
            .await
            .map_err(BindingError::from)?
        {
            if buffer.len() + chunk.len() > limit {
                return Err(self.too_large(url, (buffer.len() + chunk.len()) as u64));
            }
            buffer.extend_from_slice(&chunk);
        }

        debug!(url, bytes = buffer.len(), "downloaded schema document");
        Ok(buffer)
    }

    fn too_large(&self, url: &str, length: u64) -> BindingError {
        BindingError::XmlProcessing {
            details: format!(
                "{}: document of {} bytes exceeds the {} byte limit",
                url, length, self.config.max_document_bytes
            ),
        }
    }

    async fn get_response_with_retry(&self, url: &str) -> Result<Response> {
        let mut current_attempt = 0;

        loop {
            match self.make_request(url).await {
                Ok(response) if response.status().is_success() => return Ok(response),
                Ok(response) => {
                    let status = response.status();
                    let error = BindingError::HttpStatus {
                        url: url.to_string(),
                        status: status.as_u16(),
                        message: format!(
                            "HTTP {}: {}",
                            status.as_u16(),
                            status.canonical_reason().unwrap_or("Unknown")
                        ),
                    };

                    // 5xx is retried, 4xx is final
                    if status.is_server_error() && current_attempt < self.config.retry_attempts {
                        warn!(url, status = status.as_u16(), attempt = current_attempt, "retrying");
                        self.wait_before_retry(current_attempt).await;
                        current_attempt += 1;
                        continue;
                    }

                    return Err(error);
                }
                Err(error) => {
                    if current_attempt < self.config.retry_attempts
                        && self.is_retryable_error(&error)
                    {
                        warn!(url, %error, attempt = current_attempt, "retrying");
                        self.wait_before_retry(current_attempt).await;
                        current_attempt += 1;
                        continue;
                    }
                    return Err(error);
                }
            }
        }
    }

    async fn make_request(&self, url: &str) -> Result<Response> {
        let request_future = self.client.get(url).send();

        timeout(
            Duration::from_secs(self.config.timeout_seconds),
            request_future,
        )
        .await
        .map_err(|_| BindingError::Timeout {
            url: url.to_string(),
            timeout_seconds: self.config.timeout_seconds,
        })?
        .map_err(BindingError::from)
    }

    fn retry_delay(&self, attempt: u32) -> Duration {
        let delay_ms = self
            .config
            .retry_delay_ms
            .saturating_mul(2_u64.saturating_pow(attempt));
        Duration::from_millis(delay_ms.min(self.config.max_retry_delay_ms))
    }

    async fn wait_before_retry(&self, attempt: u32) {
        sleep(self.retry_delay(attempt)).await;
    }

    fn is_retryable_error(&self, error: &BindingError) -> bool {
        match error {
            BindingError::Http(reqwest_error) => {
                reqwest_error.is_timeout() || reqwest_error.is_connect() || reqwest_error.is_request()
            }
            BindingError::Timeout { .. } => true,
            _ => false,
        }
    }

    pub fn config(&self) -> &HttpClientConfig {
        &self.config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned response on a local port and return its URL
    async fn serve_once(response: Vec<u8>) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut socket, _) = listener.accept().await.unwrap();
            let mut request = [0u8; 1024];
            let _ = socket.read(&mut request).await;
            let _ = socket.write_all(&response).await;
            let _ = socket.shutdown().await;
        });
        format!("http://{}/schema.xsd", addr)
    }

    fn client_without_retries(max_document_bytes: usize) -> AsyncHttpClient {
        AsyncHttpClient::new(HttpClientConfig {
            timeout_seconds: 5,
            retry_attempts: 0,
            max_document_bytes,
            ..Default::default()
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_http_client_creation() {
        let client = AsyncHttpClient::new(HttpClientConfig::default()).unwrap();
        assert!(client.config().user_agent.starts_with("xml-binder/"));
    }

    #[test]
    fn test_exponential_backoff_is_capped() {
        let config = HttpClientConfig {
            retry_delay_ms: 1000,
            max_retry_delay_ms: 5000,
            ..Default::default()
        };
        let client = AsyncHttpClient::new(config).unwrap();

        assert_eq!(client.retry_delay(0), Duration::from_millis(1000));
        assert_eq!(client.retry_delay(1), Duration::from_millis(2000));
        assert_eq!(client.retry_delay(2), Duration::from_millis(4000));
        assert_eq!(client.retry_delay(3), Duration::from_millis(5000));
        assert_eq!(client.retry_delay(40), Duration::from_millis(5000));
    }

    #[test]
    fn test_retryable_error_detection() {
        let client = AsyncHttpClient::new(HttpClientConfig::default()).unwrap();

        let timeout_error = BindingError::Timeout {
            url: "http://example.com".to_string(),
            timeout_seconds: 30,
        };
        assert!(client.is_retryable_error(&timeout_error));

        let not_found = BindingError::HttpStatus {
            url: "http://example.com".to_string(),
            status: 404,
            message: "HTTP 404: Not Found".to_string(),
        };
        assert!(!client.is_retryable_error(&not_found));
    }

    #[tokio::test]
    async fn test_unreachable_host_fails_without_retry_budget() {
        let config = HttpClientConfig {
            timeout_seconds: 2,
            retry_attempts: 0,
            ..Default::default()
        };
        let client = AsyncHttpClient::new(config).unwrap();

        let result = client.download("http://127.0.0.1:9/schema.xsd").await;
        assert!(result.is_err());
        assert!(result.unwrap_err().is_xml_error());
    }

    #[tokio::test]
    async fn test_announced_length_over_limit_is_rejected() {
        let url = serve_once(
            b"HTTP/1.1 200 OK\r\nContent-Length: 900000000000000\r\n\r\n<xs:schema".to_vec(),
        )
        .await;

        let err = client_without_retries(1024).download(&url).await.unwrap_err();
        assert!(matches!(err, BindingError::XmlProcessing { .. }));
        assert!(err.is_xml_error());
    }

    #[tokio::test]
    async fn test_streamed_body_over_limit_is_rejected() {
        let mut response = b"HTTP/1.1 200 OK\r\nConnection: close\r\n\r\n".to_vec();
        response.extend(std::iter::repeat_n(b'x', 4096));
        let url = serve_once(response).await;

        let err = client_without_retries(64).download(&url).await.unwrap_err();
        assert!(matches!(err, BindingError::XmlProcessing { .. }));
    }

    #[tokio::test]
    async fn test_small_document_downloads() {
        let body = r#"<xs:schema xmlns:xs="http://www.w3.org/2001/XMLSchema"/>"#;
        let url = serve_once(
            format!(
                "HTTP/1.1 200 OK\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
                body.len(),
                body
            )
            .into_bytes(),
        )
        .await;

        let data = client_without_retries(1024).download(&url).await.unwrap();
        assert_eq!(data, body.as_bytes());
    }
}
