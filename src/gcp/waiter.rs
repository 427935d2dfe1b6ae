//! Operation waiter
//!
//! Polls an operation until it is done, the deadline passes or the
//! invocation is cancelled. Waiting is cooperative: the waiter sleeps
//! between polls on the current task and never spawns.

use super::operations::{Operation, OperationPoller};
use super::retry::{jittered, next_delay};
use crate::console::{Console, OperationVerb, ProgressTracker};
use crate::error::{CliError, Result};
use serde_json::Value;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[derive(Debug, Clone)]
pub struct WaitConfig {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub multiplier: f64,
    /// Total time allowed for the operation
    pub timeout: Duration,
}

impl Default for WaitConfig {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            multiplier: 2.0,
            timeout: Duration::from_secs(30 * 60),
        }
    }
}

impl WaitConfig {
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Default::default()
        }
    }
}

pub struct Waiter<'a> {
    poller: &'a dyn OperationPoller,
    config: WaitConfig,
    cancel: CancellationToken,
    console: Option<&'a Console>,
}

impl<'a> Waiter<'a> {
    pub fn new(poller: &'a dyn OperationPoller) -> Self {
        Self {
            poller,
            config: WaitConfig::default(),
            cancel: CancellationToken::new(),
            console: None,
        }
    }

    pub fn with_config(mut self, config: WaitConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Report progress on the console's stderr
    pub fn with_progress(mut self, console: &'a Console) -> Self {
        self.console = Some(console);
        self
    }

    /// Wait for `op` and return its result. An operation that is already
    /// done is resolved without polling.
    pub async fn wait(&self, op: Operation, label: &str) -> Result<Value> {
        let verb = op
            .operation_type
            .as_deref()
            .map(|t| OperationVerb::from_operation_type(&t.to_ascii_lowercase()))
            .unwrap_or(OperationVerb::Other);
        let tracker = self
            .console
            .map(|console| ProgressTracker::new(console, verb, label));

        let result = self.wait_inner(op, tracker.as_ref()).await;
        if let Some(tracker) = &tracker {
            match &result {
                Ok(_) => tracker.succeeded(),
                Err(_) => tracker.failed(),
            }
        }
        result
    }

    async fn wait_inner(&self, mut op: Operation, tracker: Option<&ProgressTracker<'_>>) -> Result<Value> {
        if op.done {
            return self.complete(&op).await;
        }

        let deadline = Instant::now() + self.config.timeout;
        let mut delay = self.config.initial_delay;
        let mut polls = 0u32;

        loop {
            let now = Instant::now();
            if now >= deadline {
                return Err(self.timed_out(&op));
            }
            let sleep_for = jittered(delay).min(deadline - now);

            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Err(self.cancel_operation(&op).await),
                _ = tokio::time::sleep(sleep_for) => {}
            }

            op = self.poller.poll(&op).await?;
            polls += 1;
            tracing::debug!("Poll {} of {}: {}", polls, op.name, op.state);
            if let Some(tracker) = tracker {
                tracker.tick(&op.state);
            }
            if op.done {
                return self.complete(&op).await;
            }
            delay = next_delay(delay, self.config.multiplier, self.config.max_delay);
        }
    }

    async fn complete(&self, op: &Operation) -> Result<Value> {
        if let Some(err) = op.failure() {
            return Err(err);
        }
        self.poller.get_result(op).await
    }

    /// Best-effort cancel, one confirming poll, then `Cancelled`
    async fn cancel_operation(&self, op: &Operation) -> CliError {
        tracing::warn!("Cancelling wait for {}", op.name);
        match self.poller.cancel(op).await {
            Ok(true) => {
                if let Ok(latest) = self.poller.poll(op).await {
                    tracing::debug!("Operation {} is {} after cancel", latest.name, latest.state);
                }
            }
            Ok(false) => tracing::debug!("Service has no cancel method for {}", op.name),
            Err(e) => tracing::warn!("Cancel request for {} failed: {}", op.name, e),
        }
        CliError::cancelled(format!(
            "Aborted wait for operation [{}]. The operation may still be running.",
            op.short_name()
        ))
    }

    fn timed_out(&self, op: &Operation) -> CliError {
        CliError::timeout(format!(
            "Operation [{}] did not finish within {}s.",
            op.short_name(),
            self.config.timeout.as_secs()
        ))
        .with_hint(format!(
            "The operation may still complete. Check it with `gcloud compute operations describe {}` or the service's operations command.",
            op.short_name()
        ))
    }
}

/// `--async` handling: print where to check status and return the
/// operation unchanged, without polling.
pub fn report_async(console: &Console, op: &Operation, describe_command: &str) -> Value {
    console.status(&format!(
        "Operation [{}] is running in the background. Check its status with:\n  $ {}",
        op.name, describe_command
    ));
    op.raw.clone()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Becomes done after `polls_until_done` polls
    struct CountingPoller {
        polls: AtomicU32,
        cancels: AtomicU32,
        polls_until_done: u32,
        error: Option<Value>,
        cancellable: bool,
        seen: Mutex<Vec<String>>,
    }

    impl CountingPoller {
        fn new(polls_until_done: u32) -> Self {
            Self {
                polls: AtomicU32::new(0),
                cancels: AtomicU32::new(0),
                polls_until_done,
                error: None,
                cancellable: true,
                seen: Mutex::new(Vec::new()),
            }
        }
    }

    fn op(done: bool) -> Operation {
        Operation::from_value(&json!({"name": "operations/op-1", "done": done})).unwrap()
    }

    #[async_trait]
    impl OperationPoller for CountingPoller {
        async fn poll(&self, op: &Operation) -> Result<Operation> {
            let n = self.polls.fetch_add(1, Ordering::SeqCst) + 1;
            self.seen.lock().unwrap().push(op.name.clone());
            let mut body = json!({"name": op.name, "done": n >= self.polls_until_done});
            if let Some(err) = &self.error {
                body["error"] = err.clone();
            }
            Ok(Operation::from_value(&body).unwrap())
        }

        async fn cancel(&self, _op: &Operation) -> Result<bool> {
            self.cancels.fetch_add(1, Ordering::SeqCst);
            Ok(self.cancellable)
        }

        async fn get_result(&self, op: &Operation) -> Result<Value> {
            Ok(json!({"result": op.name}))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_done_operation_needs_no_polls() {
        let poller = CountingPoller::new(1);
        let value = Waiter::new(&poller).wait(op(true), "op-1").await.unwrap();
        assert_eq!(value["result"], "operations/op-1");
        assert_eq!(poller.polls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polls_until_done() {
        let poller = CountingPoller::new(3);
        let value = Waiter::new(&poller).wait(op(false), "op-1").await.unwrap();
        assert_eq!(value["result"], "operations/op-1");
        assert_eq!(poller.polls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_backoff_grows_to_ceiling() {
        let poller = CountingPoller::new(12);
        let start = Instant::now();
        Waiter::new(&poller).wait(op(false), "op-1").await.unwrap();
        let elapsed = start.elapsed();
        // 1+2+4+8+16+32 then six at the 60s ceiling, each within 10%
        assert!(elapsed >= Duration::from_secs(380), "{elapsed:?}");
        assert!(elapsed <= Duration::from_secs(466), "{elapsed:?}");
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_operation_surfaces_details() {
        let mut poller = CountingPoller::new(1);
        poller.error = Some(json!({"code": 3, "message": "bad config", "details": [{"field": "x"}]}));
        let err = Waiter::new(&poller).wait(op(false), "op-1").await.unwrap_err();
        assert_eq!(err.kind, ErrorKind::OperationFailed);
        assert_eq!(err.details.unwrap()[0]["field"], "x");
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout() {
        let poller = CountingPoller::new(u32::MAX);
        let err = Waiter::new(&poller)
            .with_config(WaitConfig::with_timeout(Duration::from_secs(10)))
            .wait(op(false), "op-1")
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Timeout);
        assert!(poller.polls.load(Ordering::SeqCst) >= 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_requests_cancel_and_one_more_poll() {
        let poller = CountingPoller::new(u32::MAX);
        let token = CancellationToken::new();
        token.cancel();
        let err = Waiter::new(&poller)
            .with_cancellation(token)
            .wait(op(false), "op-1")
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Cancelled);
        assert_eq!(poller.cancels.load(Ordering::SeqCst), 1);
        assert_eq!(poller.polls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_without_service_support_skips_poll() {
        let mut poller = CountingPoller::new(u32::MAX);
        poller.cancellable = false;
        let token = CancellationToken::new();
        token.cancel();
        let err = Waiter::new(&poller)
            .with_cancellation(token)
            .wait(op(false), "op-1")
            .await
            .unwrap_err();
        assert_eq!(err.kind, ErrorKind::Cancelled);
        assert_eq!(poller.polls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_lines() {
        let poller = CountingPoller::new(2);
        let (console, captured) = Console::scripted("", false);
        Waiter::new(&poller)
            .with_progress(&console)
            .wait(op(false), "op-1")
            .await
            .unwrap();
        let err = captured.stderr.contents();
        assert_eq!(err.matches("Waiting for [op-1]...").count(), 2);
        assert!(err.contains("Completed [op-1]"));
    }

    #[test]
    fn test_report_async_prints_status_hint() {
        let (console, captured) = Console::scripted("", false);
        let value = report_async(&console, &op(false), "gcloud compute operations describe op-1");
        assert_eq!(value["name"], "operations/op-1");
        assert!(captured.stderr.contents().contains("gcloud compute operations describe op-1"));
    }
}
