//! HTTP transport for GCP REST API calls

use super::auth::TokenSource;
use super::client::{ApiCall, HttpMethod, Transport};
use crate::error::{CliError, ErrorKind, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

/// Maximum length of response body to log (to avoid logging sensitive data)
const MAX_LOG_BODY_LENGTH: usize = 200;

/// Per-request timeout
const REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

/// Header carrying the project billed for quota
pub const USER_PROJECT_HEADER: &str = "X-Goog-User-Project";

/// Truncate a body for logging and drop control characters
pub fn sanitize_for_log(body: &str) -> String {
    let truncated = if body.len() > MAX_LOG_BODY_LENGTH {
        let mut cut = MAX_LOG_BODY_LENGTH;
        while !body.is_char_boundary(cut) {
            cut -= 1;
        }
        format!("{}... [truncated, {} bytes total]", &body[..cut], body.len())
    } else {
        body.to_string()
    };
    truncated.replace(|c: char| c.is_control(), "")
}

/// reqwest-backed [`Transport`]
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    tokens: Arc<dyn TokenSource>,
    quota_project: Option<String>,
    /// APIs that honour the quota project header
    user_project_apis: HashSet<String>,
    log_http: bool,
}

impl HttpTransport {
    pub fn new(tokens: Arc<dyn TokenSource>) -> Result<Self> {
        let client = Client::builder()
            .user_agent(format!("gcloud-cli/{}", crate::VERSION))
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| CliError::internal(format!("Failed to create HTTP client: {e}")))?;
        Ok(Self {
            client,
            tokens,
            quota_project: None,
            user_project_apis: HashSet::new(),
            log_http: false,
        })
    }

    /// Send `X-Goog-User-Project: <project>` on calls to the listed APIs
    pub fn with_quota_project(
        mut self,
        project: Option<String>,
        apis: impl IntoIterator<Item = String>,
    ) -> Self {
        self.quota_project = project;
        self.user_project_apis = apis.into_iter().collect();
        self
    }

    pub fn with_log_http(mut self, enabled: bool) -> Self {
        self.log_http = enabled;
        self
    }

    fn quota_project_for(&self, api: &str) -> Option<&str> {
        self.quota_project
            .as_deref()
            .filter(|_| self.user_project_apis.contains(api))
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn execute(&self, call: &ApiCall) -> Result<Value> {
        let summary = call.summary();
        tracing::debug!("{}", summary);

        let token = self.tokens.token().await.map_err(|e| {
            CliError::new(ErrorKind::Auth, "Could not obtain access credentials.")
                .with_hint("Run `gcloud auth application-default login` and retry.")
                .with_cause(format!("{e:#}"))
        })?;

        let method = match call.http_method {
            HttpMethod::Get => reqwest::Method::GET,
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Put => reqwest::Method::PUT,
            HttpMethod::Patch => reqwest::Method::PATCH,
            HttpMethod::Delete => reqwest::Method::DELETE,
        };
        let mut request = self
            .client
            .request(method, &call.url)
            .query(&call.query)
            .bearer_auth(token);
        if let Some(project) = self.quota_project_for(&call.api) {
            request = request.header(USER_PROJECT_HEADER, project);
        }
        if let Some(body) = &call.body {
            if self.log_http {
                tracing::debug!("request body: {}", sanitize_for_log(&body.to_string()));
            }
            request = request.json(body);
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(e, &summary))?;
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| transport_error(e, &summary))?;

        if self.log_http {
            tracing::debug!("response {}: {}", status, sanitize_for_log(&body));
        }

        if !status.is_success() {
            tracing::error!("API error: {} - {}", status, sanitize_for_log(&body));
            return Err(CliError::from_http(
                status.as_u16(),
                &body,
                format!("{summary} -> {}", status.as_u16()),
            ));
        }

        if body.trim().is_empty() {
            return Ok(Value::Null);
        }
        serde_json::from_str(&body).map_err(|e| {
            CliError::internal("Failed to parse response JSON")
                .with_request(summary)
                .with_cause(e)
        })
    }
}

/// Connection-level failures. Timeouts and refused connections are worth
/// retrying; anything else (TLS, malformed URL, redirect loops) is not.
fn transport_error(err: reqwest::Error, summary: &str) -> CliError {
    let kind = if err.is_timeout() || err.is_connect() {
        ErrorKind::TransportRetryable
    } else {
        ErrorKind::TransportFatal
    };
    CliError::new(kind, format!("Request failed: {}", sanitize_for_log(&err.to_string())))
        .with_request(summary.to_string())
        .with_cause(err)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_truncates_long_bodies() {
        let body = "x".repeat(500);
        let out = sanitize_for_log(&body);
        assert!(out.starts_with(&"x".repeat(200)));
        assert!(out.contains("[truncated, 500 bytes total]"));
        assert_eq!(sanitize_for_log("a\nb"), "ab");
    }

    #[test]
    fn test_sanitize_respects_char_boundaries() {
        let body = "é".repeat(150);
        let out = sanitize_for_log(&body);
        assert!(out.contains("truncated"));
    }
}
