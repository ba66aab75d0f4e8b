//! Reqwest-backed admin API client

use std::fmt;

use log::{debug, warn};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde_json::Value;

use crate::api::config::{ConnectionConfig, RetryConfig};

/// Error talking to the admin API.
#[derive(Debug)]
pub enum ApiError {
    /// The server answered with a non-success status.
    Http {
        status: u16,
        path: String,
        message: String,
    },
    /// The request never completed (connect, timeout, TLS, decode).
    Transport(reqwest::Error),
    /// The client could not be constructed from its configuration.
    InvalidConfig(String),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Http {
                status,
                path,
                message,
            } => write!(f, "HTTP {} from {}: {}", status, path, message),
            Self::Transport(err) => write!(f, "request failed: {}", err),
            Self::InvalidConfig(msg) => write!(f, "invalid client configuration: {}", msg),
        }
    }
}

impl std::error::Error for ApiError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(err) => Some(err),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        Self::Transport(err)
    }
}

impl ApiError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Http { status: 404, .. })
    }
}

fn retryable_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 429 | 500 | 502 | 503)
}

/// HTTP client for the admin API with retry and pagination built in.
#[derive(Debug, Clone)]
pub struct AdminClient {
    http: reqwest::Client,
    base_url: String,
    retry: RetryConfig,
}

impl AdminClient {
    pub fn new(connection: &ConnectionConfig, retry: RetryConfig) -> Result<Self, ApiError> {
        let mut headers = HeaderMap::new();
        for (name, value) in &connection.headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ApiError::InvalidConfig(format!("header name '{}': {}", name, e)))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| ApiError::InvalidConfig(format!("header value: {}", e)))?;
            headers.insert(name, value);
        }

        let http = reqwest::Client::builder()
            .timeout(connection.timeout)
            .default_headers(headers)
            .danger_accept_invalid_certs(connection.tls_skip_verify)
            .build()?;

        Ok(Self {
            http,
            base_url: connection.base_url.trim_end_matches('/').to_string(),
            retry,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    /// Send one request, retrying transient failures with backoff.
    async fn request(
        &self,
        method: Method,
        path: &str,
        body: Option<&Value>,
    ) -> Result<Value, ApiError> {
        let url = self.url(path);
        let mut attempt = 0u32;
        loop {
            debug!("{} {} (attempt {})", method, url, attempt + 1);
            let mut req = self.http.request(method.clone(), &url);
            if let Some(body) = body {
                req = req.json(body);
            }

            let response = match req.send().await {
                Ok(response) => response,
                Err(err) => {
                    let transient = err.is_timeout() || err.is_connect();
                    if transient && attempt < self.retry.max_retries {
                        let delay = self.retry.delay_for_attempt(attempt);
                        warn!("{} {} failed ({}), retrying in {:?}", method, url, err, delay);
                        tokio::time::sleep(delay).await;
                        attempt += 1;
                        continue;
                    }
                    return Err(ApiError::Transport(err));
                }
            };

            let status = response.status();
            if status.is_success() {
                let text = response.text().await?;
                if text.is_empty() {
                    return Ok(Value::Null);
                }
                return serde_json::from_str(&text).map_err(|e| ApiError::Http {
                    status: status.as_u16(),
                    path: path.to_string(),
                    message: format!("invalid JSON body: {}", e),
                });
            }

            if retryable_status(status) && attempt < self.retry.max_retries {
                let delay = self.retry.delay_for_attempt(attempt);
                warn!("{} {} returned {}, retrying in {:?}", method, url, status, delay);
                tokio::time::sleep(delay).await;
                attempt += 1;
                continue;
            }

            let message = response.text().await.unwrap_or_default();
            return Err(ApiError::Http {
                status: status.as_u16(),
                path: path.to_string(),
                message,
            });
        }
    }

    pub async fn get(&self, path: &str) -> Result<Value, ApiError> {
        self.request(Method::GET, path, None).await
    }

    pub async fn post(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.request(Method::POST, path, Some(body)).await
    }

    pub async fn put(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.request(Method::PUT, path, Some(body)).await
    }

    pub async fn patch(&self, path: &str, body: &Value) -> Result<Value, ApiError> {
        self.request(Method::PATCH, path, Some(body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.request(Method::DELETE, path, None).await.map(|_| ())
    }

    /// Fetch every page of a collection endpoint.
    ///
    /// The API pages with an opaque `offset` cursor alongside the `data`
    /// array; absence of the cursor marks the last page.
    pub async fn list_all(&self, path: &str) -> Result<Vec<Value>, ApiError> {
        let mut items = Vec::new();
        let mut offset: Option<String> = None;
        loop {
            let page_path = match &offset {
                Some(cursor) => format!("{}?size=1000&offset={}", path, urlencoding::encode(cursor)),
                None => format!("{}?size=1000", path),
            };
            let page = self.get(&page_path).await?;
            if let Some(data) = page.get("data").and_then(Value::as_array) {
                items.extend(data.iter().cloned());
            }
            offset = page
                .get("offset")
                .and_then(Value::as_str)
                .map(str::to_string);
            if offset.is_none() {
                return Ok(items);
            }
        }
    }

    /// Root endpoint, used for reachability checks and version discovery.
    pub async fn server_info(&self) -> Result<Value, ApiError> {
        self.get("/").await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_url_joins_without_double_slash() {
        let connection = ConnectionConfig::new("http://localhost:8001/");
        let client = AdminClient::new(&connection, RetryConfig::default()).unwrap();
        assert_eq!(client.url("/services"), "http://localhost:8001/services");
        assert_eq!(client.url("services"), "http://localhost:8001/services");
    }

    #[test]
    fn test_invalid_header_rejected() {
        let mut connection = ConnectionConfig::new("http://localhost:8001");
        connection
            .headers
            .push(("bad header".to_string(), "x".to_string()));
        let err = AdminClient::new(&connection, RetryConfig::default()).unwrap_err();
        assert!(matches!(err, ApiError::InvalidConfig(_)));
    }

    #[test]
    fn test_retryable_statuses() {
        assert!(retryable_status(StatusCode::TOO_MANY_REQUESTS));
        assert!(retryable_status(StatusCode::BAD_GATEWAY));
        assert!(retryable_status(StatusCode::SERVICE_UNAVAILABLE));
        assert!(!retryable_status(StatusCode::NOT_FOUND));
        assert!(!retryable_status(StatusCode::BAD_REQUEST));
    }
}
