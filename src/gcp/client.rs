//! API calls and the transport seam
//!
//! A command describes each service request as an [`ApiCall`]; the
//! [`Transport`] executes it. The production transport speaks HTTPS through
//! reqwest, tests substitute an in-memory fake.

use crate::error::Result;
use async_trait::async_trait;
use serde_json::Value;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HttpMethod {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl HttpMethod {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Patch => "PATCH",
            Self::Delete => "DELETE",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One service request
#[derive(Debug, Clone, PartialEq)]
pub struct ApiCall {
    /// API name, e.g. `compute`
    pub api: String,
    /// Service method, e.g. `instances.delete`
    pub method: String,
    pub http_method: HttpMethod,
    /// URL without query string
    pub url: String,
    pub query: Vec<(String, String)>,
    pub body: Option<Value>,
    /// Whether re-issuing this call is safe. GET always is; PUT and DELETE
    /// only when the call says so.
    pub idempotent: bool,
}

impl ApiCall {
    fn build(api: &str, method: &str, http_method: HttpMethod, url: impl Into<String>) -> Self {
        Self {
            api: api.to_string(),
            method: method.to_string(),
            http_method,
            url: url.into(),
            query: Vec::new(),
            body: None,
            idempotent: http_method == HttpMethod::Get,
        }
    }

    pub fn get(api: &str, method: &str, url: impl Into<String>) -> Self {
        Self::build(api, method, HttpMethod::Get, url)
    }

    pub fn post(api: &str, method: &str, url: impl Into<String>, body: Value) -> Self {
        let mut call = Self::build(api, method, HttpMethod::Post, url);
        call.body = Some(body);
        call
    }

    pub fn delete(api: &str, method: &str, url: impl Into<String>) -> Self {
        Self::build(api, method, HttpMethod::Delete, url)
    }

    pub fn put(api: &str, method: &str, url: impl Into<String>, body: Value) -> Self {
        let mut call = Self::build(api, method, HttpMethod::Put, url);
        call.body = Some(body);
        call
    }

    /// Mark a PUT or DELETE as safe to retry
    pub fn idempotent(mut self) -> Self {
        if matches!(self.http_method, HttpMethod::Put | HttpMethod::Delete) {
            self.idempotent = true;
        }
        self
    }

    pub fn with_query(mut self, key: &str, value: impl Into<String>) -> Self {
        self.set_query(key, value);
        self
    }

    /// Replace any existing value for `key`
    pub fn set_query(&mut self, key: &str, value: impl Into<String>) {
        self.query.retain(|(k, _)| k != key);
        self.query.push((key.to_string(), value.into()));
    }

    pub fn query_value(&self, key: &str) -> Option<&str> {
        self.query
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// URL with the query string appended
    pub fn full_url(&self) -> String {
        if self.query.is_empty() {
            return self.url.clone();
        }
        let query = self
            .query
            .iter()
            .map(|(k, v)| format!("{}={}", urlencoding::encode(k), urlencoding::encode(v)))
            .collect::<Vec<_>>()
            .join("&");
        format!("{}?{}", self.url, query)
    }

    /// One-line summary for logs and debug error output
    pub fn summary(&self) -> String {
        format!("{} {}", self.http_method, self.full_url())
    }
}

/// Executes API calls. Implementations turn non-2xx responses into
/// [`CliError`](crate::error::CliError)s via `CliError::from_http`, and
/// connection-level failures into transport kinds.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, call: &ApiCall) -> Result<Value>;
}
