//! Backend health probe.
//!
//! Issues a bounded-timeout `GET {base}/health` against the detection
//! backend and validates the response: JSON content-type and a truthy `ok`
//! boolean. Raw failure messages and response bodies never reach the block
//! detail; network errors are reduced to a small classification.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tracing::debug;

use crate::data::CheckResult;

/// Path appended to the configured base URL.
pub const HEALTH_PATH: &str = "/health";

/// Classified fetch failure. The classification, not the underlying
/// message, is what surfaces on the block.
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("timeout")]
    Timeout,
    #[error("connection_refused")]
    ConnectionRefused,
    #[error("cors_or_mixed_content")]
    CorsOrMixedContent,
    /// Anything else; the raw message is kept for debug logging only.
    #[error("other")]
    Other(String),
}

impl FetchError {
    pub fn class(&self) -> &'static str {
        match self {
            FetchError::Timeout => "timeout",
            FetchError::ConnectionRefused => "connection_refused",
            FetchError::CorsOrMixedContent => "cors_or_mixed_content",
            FetchError::Other(_) => "other",
        }
    }
}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            FetchError::Timeout
        } else if err.is_connect() {
            FetchError::ConnectionRefused
        } else {
            let text = err.to_string().to_ascii_lowercase();
            if text.contains("cors") || text.contains("mixed content") {
                FetchError::CorsOrMixedContent
            } else {
                FetchError::Other(err.to_string())
            }
        }
    }
}

/// A fetched health response, reduced to what the probe inspects.
#[derive(Debug, Clone)]
pub struct HealthResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

/// Seam over the HTTP client so the probe can be exercised without a
/// backend.
#[async_trait]
pub trait HealthFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<HealthResponse, FetchError>;
}

/// Production fetcher over reqwest with a per-request timeout.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    client: reqwest::Client,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Self {
        Self {
            client: reqwest::Client::new(),
            timeout,
        }
    }
}

#[async_trait]
impl HealthFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<HealthResponse, FetchError> {
        let response = self
            .client
            .get(url)
            .timeout(self.timeout)
            .send()
            .await?;
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response.text().await?;
        Ok(HealthResponse {
            status,
            content_type,
            body,
        })
    }
}

/// The backend-health checker's probe.
pub struct BackendHealth {
    fetcher: Arc<dyn HealthFetcher>,
    base_url: Option<String>,
}

impl BackendHealth {
    pub fn new(fetcher: Arc<dyn HealthFetcher>, base_url: Option<String>) -> Self {
        Self { fetcher, base_url }
    }

    /// Run one probe and reduce the outcome to a [`CheckResult`].
    pub async fn probe(&self) -> CheckResult {
        let Some(base) = self.base_url.as_deref() else {
            return CheckResult::fail("missing backend base URL config");
        };
        let url = format!("{}{}", base.trim_end_matches('/'), HEALTH_PATH);

        let response = match self.fetcher.fetch(&url).await {
            Ok(response) => response,
            Err(e) => {
                if let FetchError::Other(raw) = &e {
                    debug!(raw, "health fetch failed");
                }
                return CheckResult::fail(format!("health fetch failed: {}", e.class()))
                    .with_error(e.class());
            }
        };

        let is_json = response
            .content_type
            .as_deref()
            .map(|ct| ct.to_ascii_lowercase().contains("json"))
            .unwrap_or(false);
        if !is_json {
            return CheckResult::fail("non-JSON health response");
        }

        let payload: serde_json::Value = match serde_json::from_str(&response.body) {
            Ok(payload) => payload,
            Err(_) => return CheckResult::fail("non-JSON health response"),
        };

        if payload.get("ok").and_then(serde_json::Value::as_bool) != Some(true) {
            return CheckResult::fail("health payload missing ok=true");
        }

        match payload.get("service").and_then(serde_json::Value::as_str) {
            Some(service) => CheckResult::ok(format!("ok=true ({})", service)),
            None => CheckResult::ok("ok=true"),
        }
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scriptable fetcher shared by probe and engine tests.

    use super::*;
    use parking_lot::Mutex;

    pub struct StubFetcher {
        response: Mutex<Result<HealthResponse, FetchError>>,
        pub last_url: Mutex<Option<String>>,
    }

    impl StubFetcher {
        pub fn json_ok() -> Self {
            Self::with_response(Ok(HealthResponse {
                status: 200,
                content_type: Some("application/json".to_string()),
                body: r#"{"ok":true,"service":"webrtc-signaling-relay"}"#.to_string(),
            }))
        }

        pub fn html(body: &str) -> Self {
            Self::with_response(Ok(HealthResponse {
                status: 200,
                content_type: Some("text/html".to_string()),
                body: body.to_string(),
            }))
        }

        pub fn error(error: FetchError) -> Self {
            Self::with_response(Err(error))
        }

        pub fn with_response(response: Result<HealthResponse, FetchError>) -> Self {
            Self {
                response: Mutex::new(response),
                last_url: Mutex::new(None),
            }
        }

        pub fn set_response(&self, response: Result<HealthResponse, FetchError>) {
            *self.response.lock() = response;
        }
    }

    #[async_trait]
    impl HealthFetcher for StubFetcher {
        async fn fetch(&self, url: &str) -> Result<HealthResponse, FetchError> {
            *self.last_url.lock() = Some(url.to_string());
            self.response.lock().clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::testing::StubFetcher;
    use super::*;
    use crate::data::MonitorState;

    #[tokio::test]
    async fn test_missing_config_fails_without_probing() {
        let fetcher = Arc::new(StubFetcher::json_ok());
        let probe = BackendHealth::new(Arc::clone(&fetcher) as Arc<dyn HealthFetcher>, None);
        let result = probe.probe().await;
        assert_eq!(result.state, MonitorState::Fail);
        assert!(result.detail.contains("missing"));
        assert!(fetcher.last_url.lock().is_none());
    }

    #[tokio::test]
    async fn test_healthy_backend() {
        let fetcher = Arc::new(StubFetcher::json_ok());
        let probe = BackendHealth::new(
            Arc::clone(&fetcher) as Arc<dyn HealthFetcher>,
            Some("http://127.0.0.1:8766/".to_string()),
        );
        let result = probe.probe().await;
        assert_eq!(result.state, MonitorState::Ok);
        assert!(result.detail.contains("ok=true"));
        // Trailing slash collapsed when appending the health path.
        assert_eq!(
            fetcher.last_url.lock().as_deref(),
            Some("http://127.0.0.1:8766/health")
        );
    }

    #[tokio::test]
    async fn test_non_json_content_type_hides_body() {
        let fetcher = Arc::new(StubFetcher::html("<html>enormous error page</html>"));
        let probe = BackendHealth::new(
            fetcher as Arc<dyn HealthFetcher>,
            Some("http://backend".to_string()),
        );
        let result = probe.probe().await;
        assert_eq!(result.state, MonitorState::Fail);
        assert!(result.detail.contains("non-JSON"));
        assert!(!result.detail.contains("enormous"));
    }

    #[tokio::test]
    async fn test_unparseable_body_with_json_content_type() {
        let fetcher = Arc::new(StubFetcher::with_response(Ok(HealthResponse {
            status: 200,
            content_type: Some("application/json".to_string()),
            body: "{not json".to_string(),
        })));
        let probe = BackendHealth::new(
            fetcher as Arc<dyn HealthFetcher>,
            Some("http://backend".to_string()),
        );
        assert!(probe.probe().await.detail.contains("non-JSON"));
    }

    #[tokio::test]
    async fn test_missing_ok_flag() {
        let fetcher = Arc::new(StubFetcher::with_response(Ok(HealthResponse {
            status: 200,
            content_type: Some("application/json".to_string()),
            body: r#"{"ok":false}"#.to_string(),
        })));
        let probe = BackendHealth::new(
            fetcher as Arc<dyn HealthFetcher>,
            Some("http://backend".to_string()),
        );
        assert!(probe.probe().await.detail.contains("missing ok=true"));
    }

    #[tokio::test]
    async fn test_network_errors_surface_classification_only() {
        for (error, class) in [
            (FetchError::Timeout, "timeout"),
            (FetchError::ConnectionRefused, "connection_refused"),
            (FetchError::CorsOrMixedContent, "cors_or_mixed_content"),
            (
                FetchError::Other("dns failure at 10.0.0.7 with a long trace".to_string()),
                "other",
            ),
        ] {
            let fetcher = Arc::new(StubFetcher::error(error));
            let probe = BackendHealth::new(
                fetcher as Arc<dyn HealthFetcher>,
                Some("http://backend".to_string()),
            );
            let result = probe.probe().await;
            assert_eq!(result.state, MonitorState::Fail);
            assert!(result.detail.contains(class));
            assert_eq!(result.error.as_deref(), Some(class));
            assert!(!result.detail.contains("dns failure"));
        }
    }
}
