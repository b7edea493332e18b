//! HTTP primitive every backend fetches through.
//!
//! Backends never talk to `reqwest` directly: they go through the
//! [`Transport`] trait, which returns the body on success and a
//! [`FetchError`] that keeps the HTTP status distinguishable on failure.
//! [`HttpTransport`] is the real implementation; tests plug in canned
//! responses instead.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use thiserror::Error;

use crate::config::HttpConfig;

/// Failure of a single HTTP exchange.
#[derive(Debug, Error)]
pub enum FetchError {
    /// The server answered with a non-success status. The body is kept
    /// because some backends embed useful data in error pages.
    #[error("HTTP Error {status}")]
    Status { status: u16, body: String },

    /// Connection, TLS, timeout, or body decoding failure.
    #[error("{0}")]
    Transport(String),
}

impl FetchError {
    pub fn status(&self) -> Option<u16> {
        match self {
            FetchError::Status { status, .. } => Some(*status),
            FetchError::Transport(_) => None,
        }
    }

    /// Body of a non-success response (empty for transport failures).
    pub fn body(&self) -> &str {
        match self {
            FetchError::Status { body, .. } => body,
            FetchError::Transport(_) => "",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(e: reqwest::Error) -> Self {
        FetchError::Transport(e.to_string())
    }
}

/// Outbound HTTP used by the tracker layer.
///
/// Implementations must be safe to share across concurrent fetches.
#[async_trait]
pub trait Transport: Send + Sync {
    /// `GET url`, returning the body text on a 2xx response.
    async fn get(&self, url: &str) -> Result<String, FetchError>;

    /// `POST body to url` with extra headers, returning the body text on
    /// a 2xx response. Used by the SOAP client.
    async fn post(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: String,
    ) -> Result<String, FetchError>;
}

/// [`Transport`] backed by a pooled `reqwest::Client`.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Build a client with the configured timeout and user agent.
    pub fn new(config: &HttpConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(config.user_agent.clone())
            .build()?;
        Ok(Self { client })
    }

    async fn finish(resp: reqwest::Response) -> Result<String, FetchError> {
        let status = resp.status();
        let body = resp.text().await?;
        if status.is_success() {
            Ok(body)
        } else {
            Err(FetchError::Status {
                status: status.as_u16(),
                body,
            })
        }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<String, FetchError> {
        tracing::debug!(url, "GET");
        let resp = self.client.get(url).send().await?;
        Self::finish(resp).await
    }

    async fn post(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: String,
    ) -> Result<String, FetchError> {
        tracing::debug!(url, "POST");
        let mut req = self.client.post(url).body(body);
        for (name, value) in headers {
            req = req.header(*name, *value);
        }
        let resp = req.send().await?;
        Self::finish(resp).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_error_keeps_status_and_body() {
        let err = FetchError::Status {
            status: 404,
            body: "Object: <Bug>, name: '12'".to_string(),
        };
        assert_eq!(err.status(), Some(404));
        assert_eq!(err.to_string(), "HTTP Error 404");
        assert!(err.body().ends_with("'12'"));
    }

    #[test]
    fn transport_error_has_no_status() {
        let err = FetchError::Transport("connection refused".to_string());
        assert_eq!(err.status(), None);
        assert_eq!(err.body(), "");
    }

    #[test]
    fn builds_from_default_config() {
        assert!(HttpTransport::new(&HttpConfig::default()).is_ok());
    }
}
