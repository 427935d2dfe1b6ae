//! Long-running operations
//!
//! Two wire shapes are understood:
//!
//! - `google.longrunning.Operation`: `name`, `done`, `error{code,message,details}`,
//!   `response`, `metadata`
//! - Compute operations: `status` (`PENDING`/`RUNNING`/`DONE`), `error.errors[]`,
//!   `targetLink`, `operationType`, `selfLink`
//!
//! Pollers hide the difference from the waiter.

use super::client::ApiCall;
use super::dispatcher::Dispatcher;
use crate::error::{CliError, Result};
use async_trait::async_trait;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationStyle {
    /// google.longrunning
    Cloud,
    Compute,
}

/// One observation of a long-running operation
#[derive(Debug, Clone, PartialEq)]
pub struct Operation {
    pub style: OperationStyle,
    pub name: String,
    pub done: bool,
    /// Human-readable state for progress lines
    pub state: String,
    pub error: Option<Value>,
    pub response: Option<Value>,
    pub metadata: Option<Value>,
    pub target_link: Option<String>,
    pub operation_type: Option<String>,
    pub self_link: Option<String>,
    /// The operation exactly as the service returned it
    pub raw: Value,
}

impl Operation {
    /// Recognise an operation in a response body
    pub fn from_value(value: &Value) -> Option<Self> {
        let obj = value.as_object()?;
        let name = obj.get("name").and_then(Value::as_str)?.to_string();
        let str_field = |k: &str| obj.get(k).and_then(Value::as_str).map(String::from);

        let is_compute = obj
            .get("kind")
            .and_then(Value::as_str)
            .is_some_and(|k| k.ends_with("#operation"))
            || (obj.contains_key("status") && obj.contains_key("operationType"));
        if is_compute {
            let state = str_field("status").unwrap_or_else(|| "PENDING".to_string());
            return Some(Self {
                style: OperationStyle::Compute,
                name,
                done: state == "DONE",
                state,
                error: obj.get("error").cloned(),
                response: None,
                metadata: None,
                target_link: str_field("targetLink"),
                operation_type: str_field("operationType"),
                self_link: str_field("selfLink"),
                raw: value.clone(),
            });
        }

        let looks_cloud = obj.contains_key("done")
            || obj.contains_key("metadata")
            || obj.contains_key("response")
            || name.contains("/operations/");
        if !looks_cloud {
            return None;
        }
        let done = obj.get("done").and_then(Value::as_bool).unwrap_or(false);
        let metadata = obj.get("metadata").cloned();
        let state = metadata
            .as_ref()
            .and_then(|m| {
                m.get("status")
                    .and_then(|s| s.get("state").or(Some(s)))
                    .or_else(|| m.get("state"))
            })
            .and_then(Value::as_str)
            .map(String::from)
            .unwrap_or_else(|| if done { "DONE" } else { "RUNNING" }.to_string());
        Some(Self {
            style: OperationStyle::Cloud,
            name,
            done,
            state,
            error: obj.get("error").cloned(),
            response: obj.get("response").cloned(),
            target_link: metadata
                .as_ref()
                .and_then(|m| m.get("target").or_else(|| m.get("targetLink")))
                .and_then(Value::as_str)
                .map(String::from),
            operation_type: metadata
                .as_ref()
                .and_then(|m| m.get("verb").or_else(|| m.get("operationType")))
                .and_then(Value::as_str)
                .map(String::from),
            metadata,
            self_link: None,
            raw: value.clone(),
        })
    }

    /// Short name for messages (last path segment)
    pub fn short_name(&self) -> &str {
        self.name.rsplit('/').next().unwrap_or(&self.name)
    }

    /// The failure payload converted to an error, if the operation failed
    pub fn failure(&self) -> Option<CliError> {
        let error = self.error.as_ref()?;
        match self.style {
            OperationStyle::Compute => {
                let errors = error.get("errors").and_then(Value::as_array)?;
                if errors.is_empty() {
                    return None;
                }
                let messages: Vec<String> = errors
                    .iter()
                    .map(|e| {
                        let code = e.get("code").and_then(Value::as_str).unwrap_or("UNKNOWN");
                        let msg = e.get("message").and_then(Value::as_str).unwrap_or("");
                        format!("{code}: {msg}")
                    })
                    .collect();
                Some(CliError::operation_failed(
                    format!("Operation [{}] failed: {}", self.short_name(), messages.join("; ")),
                    Some(error.clone()),
                ))
            }
            OperationStyle::Cloud => {
                let message = error
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error");
                let details = error.get("details").cloned().or_else(|| Some(error.clone()));
                Some(CliError::operation_failed(
                    format!("Operation [{}] failed: {}", self.short_name(), message),
                    details,
                ))
            }
        }
    }
}

/// Polls, cancels and resolves one style of operation
#[async_trait]
pub trait OperationPoller: Send + Sync {
    /// Fetch the current state
    async fn poll(&self, op: &Operation) -> Result<Operation>;

    /// Ask the service to cancel. Returns false when the service has no
    /// cancel method.
    async fn cancel(&self, op: &Operation) -> Result<bool>;

    /// Value to return once the operation is done without error
    async fn get_result(&self, op: &Operation) -> Result<Value>;
}

fn not_an_operation(value: &Value) -> CliError {
    CliError::internal("Polling returned a response that is not an operation")
        .with_cause(super::http::sanitize_for_log(&value.to_string()))
}

/// Poller for `google.longrunning` operations
pub struct CloudOperationPoller {
    dispatcher: Dispatcher,
    api: String,
    /// API base URL with version, e.g. `https://pubsub.googleapis.com/v1/`
    base_url: String,
    /// Fetches the target resource once done, when the operation carries no response
    getter: Option<ApiCall>,
}

impl CloudOperationPoller {
    pub fn new(dispatcher: Dispatcher, api: &str, base_url: &str) -> Self {
        Self {
            dispatcher,
            api: api.to_string(),
            base_url: base_url.to_string(),
            getter: None,
        }
    }

    pub fn with_getter(mut self, getter: ApiCall) -> Self {
        self.getter = Some(getter);
        self
    }

    fn op_url(&self, op: &Operation) -> String {
        if op.name.starts_with("https://") || op.name.starts_with("http://") {
            op.name.clone()
        } else {
            format!("{}{}", self.base_url, op.name)
        }
    }
}

#[async_trait]
impl OperationPoller for CloudOperationPoller {
    async fn poll(&self, op: &Operation) -> Result<Operation> {
        let call = ApiCall::get(&self.api, "operations.get", self.op_url(op));
        let value = self.dispatcher.call(&call).await?;
        Operation::from_value(&value).ok_or_else(|| not_an_operation(&value))
    }

    async fn cancel(&self, op: &Operation) -> Result<bool> {
        let url = format!("{}:cancel", self.op_url(op));
        let call = ApiCall::post(&self.api, "operations.cancel", url, Value::Object(Default::default()));
        self.dispatcher.call(&call).await?;
        Ok(true)
    }

    async fn get_result(&self, op: &Operation) -> Result<Value> {
        if let Some(response) = &op.response {
            return Ok(response.clone());
        }
        match &self.getter {
            Some(getter) => self.dispatcher.call(getter).await,
            None => Ok(op.raw.clone()),
        }
    }
}

/// Poller for Compute Engine zonal/regional/global operations
pub struct ComputeOperationPoller {
    dispatcher: Dispatcher,
}

impl ComputeOperationPoller {
    pub fn new(dispatcher: Dispatcher) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl OperationPoller for ComputeOperationPoller {
    async fn poll(&self, op: &Operation) -> Result<Operation> {
        let url = op.self_link.clone().ok_or_else(|| {
            CliError::internal(format!("Operation [{}] has no selfLink to poll", op.name))
        })?;
        let value = self.dispatcher.call(&ApiCall::get("compute", "operations.get", url)).await?;
        Operation::from_value(&value).ok_or_else(|| not_an_operation(&value))
    }

    async fn cancel(&self, _op: &Operation) -> Result<bool> {
        Ok(false)
    }

    async fn get_result(&self, op: &Operation) -> Result<Value> {
        if op.operation_type.as_deref() == Some("delete") {
            return Ok(op.raw.clone());
        }
        match &op.target_link {
            Some(target) => {
                self.dispatcher
                    .call(&ApiCall::get("compute", "get", target.clone()))
                    .await
            }
            None => Ok(op.raw.clone()),
        }
    }
}
