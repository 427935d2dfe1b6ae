//! Shared fixtures for end-to-end tests: an in-memory transport with
//! scripted responses and a harness that runs one invocation against it.

#![allow(dead_code)]

use async_trait::async_trait;
use gcloud_cli::cli::{CommandTree, Runner};
use gcloud_cli::console::Console;
use gcloud_cli::error::{CliError, Result};
use gcloud_cli::gcp::client::{ApiCall, Transport};
use gcloud_cli::gcp::retry::RetryConfig;
use gcloud_cli::gcp::waiter::WaitConfig;
use gcloud_cli::properties::{Env, PropertyStore, Scope};
use gcloud_cli::resource::Registry;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Replies per `METHOD url` in the order they were scripted. Unscripted
/// requests fail with NOT_FOUND so a stray call shows up in the exit code.
#[derive(Default)]
pub struct FakeTransport {
    replies: Mutex<HashMap<String, VecDeque<Result<Value>>>>,
    calls: Mutex<Vec<ApiCall>>,
}

impl FakeTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn on(&self, method: &str, url: &str, reply: Result<Value>) -> &Self {
        self.replies
            .lock()
            .unwrap()
            .entry(format!("{method} {url}"))
            .or_default()
            .push_back(reply);
        self
    }

    pub fn calls(&self) -> Vec<ApiCall> {
        self.calls.lock().unwrap().clone()
    }

    /// `METHOD url?query` for every call, in order
    pub fn requests(&self) -> Vec<String> {
        self.calls()
            .iter()
            .map(|c| format!("{} {}", c.http_method, c.full_url()))
            .collect()
    }

    pub fn count(&self, method: &str, url: &str) -> usize {
        self.calls()
            .iter()
            .filter(|c| c.http_method.as_str() == method && c.url == url)
            .count()
    }
}

#[async_trait]
impl Transport for FakeTransport {
    async fn execute(&self, call: &ApiCall) -> Result<Value> {
        self.calls.lock().unwrap().push(call.clone());
        let key = format!("{} {}", call.http_method, call.url);
        self.replies
            .lock()
            .unwrap()
            .get_mut(&key)
            .and_then(VecDeque::pop_front)
            .unwrap_or_else(|| Err(CliError::not_found(format!("No scripted reply for {key}"))))
    }
}

/// What one invocation left behind
pub struct Outcome {
    pub code: i32,
    pub stdout: String,
    pub stderr: String,
}

pub struct Harness {
    pub transport: Arc<FakeTransport>,
    store: PropertyStore,
    answers: String,
}

impl Harness {
    pub fn new() -> Self {
        Self {
            transport: FakeTransport::new(),
            store: PropertyStore::in_memory(Env::new()),
            answers: String::new(),
        }
    }

    pub fn with_env(env: &[(&str, &str)]) -> Self {
        let env: Env = env.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        Self {
            store: PropertyStore::in_memory(env),
            ..Self::new()
        }
    }

    pub fn property(mut self, key: &str, value: &str) -> Self {
        self.store.set(key, value, Scope::User).unwrap();
        self
    }

    /// Lines typed at prompts
    pub fn answers(mut self, answers: &str) -> Self {
        self.answers = answers.to_string();
        self
    }

    pub async fn run(&self, args: &[&str]) -> Outcome {
        let (console, captured) = Console::scripted(&self.answers, true);
        let transport: Arc<dyn Transport> = self.transport.clone();
        let argv: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let code = Runner::new(
            CommandTree::builtin(),
            Registry::builtin().unwrap(),
            console,
            Box::new(move |_: &PropertyStore, _: &Registry| Ok(transport)),
        )
        .with_properties(self.store.clone())
        .with_retry(RetryConfig::none())
        .with_wait_config(WaitConfig {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            ..WaitConfig::default()
        })
        .run(&argv)
        .await;
        Outcome {
            code,
            stdout: captured.stdout.contents(),
            stderr: captured.stderr.contents(),
        }
    }
}
