//! Request dispatcher
//!
//! Executes the calls a command produces, one at a time or as a concurrent
//! batch. Retries are limited to transport-retryable failures on calls that
//! are safe to repeat. Batches keep results in input order and report every
//! failure together.

use super::client::{ApiCall, Transport};
use super::retry::{retry_with_backoff, RetryConfig};
use crate::error::{CliError, Result};
use futures::stream::{FuturesUnordered, Stream};
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// How a batch reacts to failures
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum BatchMode {
    /// Every call runs to completion
    #[default]
    CollectAll,
    /// The first failure abandons calls that have not finished
    FailFast,
}

#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    retry: RetryConfig,
    cancel: CancellationToken,
}

impl Dispatcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            retry: RetryConfig::default(),
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Execute one call
    pub async fn call(&self, call: &ApiCall) -> Result<Value> {
        if self.cancel.is_cancelled() {
            return Err(CliError::cancelled("Cancelled before the request was sent."));
        }
        let retry_safe = call.idempotent;
        retry_with_backoff(
            &self.retry,
            &call.summary(),
            |e: &CliError| retry_safe && e.kind.is_retryable(),
            || self.transport.execute(call),
        )
        .await
    }

    /// Execute independent calls concurrently. Each call is labelled with
    /// the user input it came from; results come back in input order.
    pub async fn batch(&self, calls: Vec<(String, ApiCall)>, mode: BatchMode) -> Vec<(String, Result<Value>)> {
        tracing::debug!("Dispatching batch of {} calls", calls.len());
        match mode {
            BatchMode::CollectAll => {
                let futures = calls.iter().map(|(_, call)| self.call(call));
                let results = futures::future::join_all(futures).await;
                calls
                    .into_iter()
                    .map(|(label, _)| label)
                    .zip(results)
                    .collect()
            }
            BatchMode::FailFast => {
                let futures = calls.iter().enumerate().map(|(idx, (_, call))| async move {
                    self.call(call).await.map_err(|e| (idx, e))
                });
                match futures::future::try_join_all(futures).await {
                    Ok(values) => calls
                        .into_iter()
                        .map(|(label, _)| label)
                        .zip(values.into_iter().map(Ok))
                        .collect(),
                    Err((idx, err)) => {
                        let label = calls
                            .into_iter()
                            .nth(idx)
                            .map(|(label, _)| label)
                            .unwrap_or_default();
                        vec![(label, Err(err))]
                    }
                }
            }
        }
    }

    /// Execute calls concurrently and yield each result as it completes.
    /// Order is unspecified.
    pub fn stream_unordered(
        &self,
        calls: Vec<(String, ApiCall)>,
    ) -> impl Stream<Item = (String, Result<Value>)> + '_ {
        calls
            .into_iter()
            .map(|(label, call)| async move {
                let result = self.call(&call).await;
                (label, result)
            })
            .collect::<FuturesUnordered<_>>()
    }
}

/// Split batch results into successes and one aggregated error
pub fn collect_batch(results: Vec<(String, Result<Value>)>) -> (Vec<(String, Value)>, Option<CliError>) {
    let mut successes = Vec::new();
    let mut failures = Vec::new();
    for (label, result) in results {
        match result {
            Ok(value) => successes.push((label, value)),
            Err(err) => failures.push((label, err)),
        }
    }
    let error = (!failures.is_empty()).then(|| CliError::aggregate(failures));
    (successes, error)
}
