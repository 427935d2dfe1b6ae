//! Error taxonomy
//!
//! Every failure that crosses a module boundary is carried as a [`CliError`]
//! tagged with an [`ErrorKind`]. Conversion into the user-visible message
//! happens once, at the top of the invocation, and the process exit code is
//! a function of the kind alone.

use serde::Deserialize;
use serde_json::Value;
use std::fmt;
use thiserror::Error;

/// Result alias used across the core
pub type Result<T> = std::result::Result<T, CliError>;

/// Exit code for a successful invocation
pub const EXIT_SUCCESS: i32 = 0;

/// Classification of a failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Argument,
    Auth,
    PermissionDenied,
    NotFound,
    Conflict,
    Precondition,
    Quota,
    BadRequest,
    Cancelled,
    TransportRetryable,
    TransportFatal,
    OperationFailed,
    Timeout,
    Internal,
    Unknown,
}

impl ErrorKind {
    pub const ALL: [ErrorKind; 15] = [
        ErrorKind::Argument,
        ErrorKind::Auth,
        ErrorKind::PermissionDenied,
        ErrorKind::NotFound,
        ErrorKind::Conflict,
        ErrorKind::Precondition,
        ErrorKind::Quota,
        ErrorKind::BadRequest,
        ErrorKind::Cancelled,
        ErrorKind::TransportRetryable,
        ErrorKind::TransportFatal,
        ErrorKind::OperationFailed,
        ErrorKind::Timeout,
        ErrorKind::Internal,
        ErrorKind::Unknown,
    ];

    /// Process exit code for this kind. Scripts branch on these, so they
    /// never change.
    pub fn exit_code(self) -> i32 {
        match self {
            Self::Internal | Self::Unknown => 1,
            Self::Argument => 2,
            Self::Auth => 3,
            Self::PermissionDenied => 4,
            Self::NotFound => 5,
            Self::Conflict => 6,
            Self::Precondition => 7,
            Self::Quota => 8,
            Self::BadRequest => 9,
            Self::Cancelled => 10,
            Self::TransportRetryable => 11,
            Self::TransportFatal => 12,
            Self::OperationFailed => 13,
            Self::Timeout => 14,
        }
    }

    /// Label used in the error headline
    pub fn label(self) -> &'static str {
        match self {
            Self::Argument => "ARGUMENT",
            Self::Auth => "AUTH",
            Self::PermissionDenied => "PERMISSION_DENIED",
            Self::NotFound => "NOT_FOUND",
            Self::Conflict => "CONFLICT",
            Self::Precondition => "PRECONDITION",
            Self::Quota => "QUOTA",
            Self::BadRequest => "BAD_REQUEST",
            Self::Cancelled => "CANCELLED",
            Self::TransportRetryable | Self::TransportFatal => "TRANSPORT",
            Self::OperationFailed => "OPERATION_FAILED",
            Self::Timeout => "TIMEOUT",
            Self::Internal => "INTERNAL",
            Self::Unknown => "UNKNOWN",
        }
    }

    /// Whether a failed call of this kind may be re-issued
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::TransportRetryable)
    }

    /// Baseline mapping from an HTTP status code
    pub fn from_http_status(status: u16) -> Self {
        match status {
            400 => Self::BadRequest,
            401 => Self::Auth,
            403 => Self::PermissionDenied,
            404 => Self::NotFound,
            409 => Self::Conflict,
            412 => Self::Precondition,
            429 => Self::Quota,
            502..=504 => Self::TransportRetryable,
            500..=599 => Self::Internal,
            _ => Self::Unknown,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A typed failure with its kind, service payload and cause chain
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct CliError {
    pub kind: ErrorKind,
    pub message: String,
    /// HTTP status of the failing call, when there was one
    pub status: Option<u16>,
    /// Service-supplied machine reason (`billingDisabled`, `SERVICE_DISABLED`, ...)
    pub reason: Option<String>,
    /// Service-supplied failure payload, rendered verbatim under `error.details`
    pub details: Option<Value>,
    /// Actionable follow-up for the user
    pub hint: Option<String>,
    /// One-line request/response summary shown at debug verbosity
    pub request: Option<String>,
    pub causes: Vec<String>,
}

impl CliError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            reason: None,
            details: None,
            hint: None,
            request: None,
            causes: Vec::new(),
        }
    }

    pub fn argument(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Argument, message)
    }

    pub fn cancelled(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Cancelled, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Timeout, message)
    }

    /// The user declined a confirmation prompt
    pub fn aborted_by_user() -> Self {
        Self::cancelled("Operation aborted by user.")
    }

    /// A long-running operation finished with an error payload
    pub fn operation_failed(message: impl Into<String>, details: Option<Value>) -> Self {
        let mut err = Self::new(ErrorKind::OperationFailed, message);
        err.details = details;
        err
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    pub fn with_request(mut self, request: impl Into<String>) -> Self {
        self.request = Some(request.into());
        self
    }

    pub fn with_cause(mut self, cause: impl fmt::Display) -> Self {
        self.causes.push(cause.to_string());
        self
    }

    pub fn exit_code(&self) -> i32 {
        self.kind.exit_code()
    }

    /// Build an error from a non-2xx HTTP response.
    ///
    /// The body is parsed as a Google API error envelope when possible so the
    /// `reason`/`domain` fields can refine the kind and attach a hint.
    pub fn from_http(status: u16, body: &str, request: impl Into<String>) -> Self {
        let payload = serde_json::from_str::<ErrorEnvelope>(body)
            .ok()
            .map(|envelope| envelope.error);

        let mut kind = ErrorKind::from_http_status(status);
        let mut message = format!("HTTP {status}");
        let mut reason = None;
        let mut details = None;

        if let Some(payload) = payload {
            if let Some(msg) = payload.message.filter(|m| !m.is_empty()) {
                message = msg;
            }
            reason = payload
                .errors
                .iter()
                .find_map(|e| e.reason.clone())
                .or_else(|| error_info_reason(&payload.details));
            if !payload.details.is_empty() {
                details = Some(Value::Array(payload.details));
            }
        }

        let mut hint = None;
        if let Some(r) = reason.as_deref() {
            let escalation = escalate(kind, r);
            kind = escalation.kind;
            if let Some(note) = escalation.note {
                if !message.contains(note) {
                    message = format!("{message} {note}");
                }
            }
            hint = escalation.hint.map(String::from);
        }

        Self {
            kind,
            message,
            status: Some(status),
            reason,
            details,
            hint,
            request: Some(request.into()),
            causes: Vec::new(),
        }
    }

    /// Fold several per-input failures into one error.
    ///
    /// The aggregate takes the kind of the first failure so the exit code is
    /// stable for a given input order.
    pub fn aggregate(mut failures: Vec<(String, CliError)>) -> Self {
        let Some(first_kind) = failures.first().map(|(_, e)| e.kind) else {
            return Self::internal("aggregate error built from an empty failure list");
        };
        if failures.len() == 1 {
            let (input, mut err) = failures.remove(0);
            err.message = format!("{input}: {}", err.message);
            return err;
        }
        let mut message = String::from("Some requests did not succeed:");
        for (input, err) in &failures {
            message.push_str(&format!("\n - {}: {}: {}", input, err.kind.label(), err.message));
        }
        let mut err = Self::new(first_kind, message);
        err.causes = failures
            .iter()
            .flat_map(|(_, e)| e.causes.iter().cloned())
            .collect();
        err
    }

    /// Headline printed to stderr, e.g. `ERROR: (gcloud.compute.instances.delete) NOT_FOUND: ...`
    pub fn headline(&self, command_path: &str) -> String {
        format!("ERROR: ({}) {}: {}", command_path, self.kind.label(), self.message)
    }

    /// Full stderr rendering: headline, hint, details and, at debug
    /// verbosity, the request summary and cause chain.
    pub fn render(&self, command_path: &str, debug: bool) -> String {
        let mut out = self.headline(command_path);
        if let Some(hint) = &self.hint {
            out.push('\n');
            out.push_str(hint);
        }
        if self.kind == ErrorKind::OperationFailed {
            if let Some(details) = &self.details {
                let rendered = serde_json::to_string_pretty(details).unwrap_or_default();
                out.push_str("\nerror.details:\n");
                out.push_str(&rendered);
            }
        }
        if debug {
            if let Some(request) = &self.request {
                out.push_str(&format!("\nrequest: {request}"));
            }
            for cause in &self.causes {
                out.push_str(&format!("\ncaused by: {cause}"));
            }
        }
        out
    }
}

impl From<anyhow::Error> for CliError {
    fn from(err: anyhow::Error) -> Self {
        let mut out = Self::internal(err.to_string());
        out.causes = err.chain().skip(1).map(|c| c.to_string()).collect();
        out
    }
}

impl From<std::io::Error> for CliError {
    fn from(err: std::io::Error) -> Self {
        Self::internal(format!("I/O error: {err}"))
    }
}

impl From<serde_json::Error> for CliError {
    fn from(err: serde_json::Error) -> Self {
        Self::internal(format!("malformed JSON: {err}"))
    }
}

// =============================================================================
// Service error payloads
// =============================================================================

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorPayload,
}

#[derive(Debug, Deserialize)]
struct ErrorPayload {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    errors: Vec<ErrorItem>,
    #[serde(default)]
    details: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ErrorItem {
    #[serde(default)]
    reason: Option<String>,
}

fn error_info_reason(details: &[Value]) -> Option<String> {
    details
        .iter()
        .filter(|d| {
            d.get("@type")
                .and_then(|t| t.as_str())
                .is_some_and(|t| t.ends_with("google.rpc.ErrorInfo"))
        })
        .find_map(|d| d.get("reason").and_then(|r| r.as_str()).map(String::from))
}

struct Escalation {
    kind: ErrorKind,
    /// Appended to the service message
    note: Option<&'static str>,
    hint: Option<&'static str>,
}

/// Reasons that refine the status-derived kind or carry an actionable hint
fn escalate(kind: ErrorKind, reason: &str) -> Escalation {
    let mut out = Escalation { kind, note: None, hint: None };
    match reason {
        "billingDisabled" | "BILLING_DISABLED" => {
            out.note = Some("Project must have billing enabled to use this API.");
            out.hint = Some("Enable billing at https://console.cloud.google.com/billing and retry.");
        }
        "accessNotConfigured" | "SERVICE_DISABLED" => {
            out.hint = Some("The API is not enabled for this project. Enable it with `gcloud services enable` and retry.");
        }
        "rateLimitExceeded" | "quotaExceeded" | "RATE_LIMIT_EXCEEDED" => out.kind = ErrorKind::Quota,
        _ => {}
    }
    out
}
