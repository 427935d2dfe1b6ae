//! Invocation runner
//!
//! One [`Runner::run`] call is one command invocation: route argv through
//! the tree, bind flags, load properties, resolve resource arguments,
//! confirm destructive actions, run the command body and print its output.
//! Every failure is rendered once, here, and mapped to an exit code.

use super::args::{self, ParsedArgs};
use super::flags::{self, UniversalFlags};
use super::help;
use super::tree::{command_line, dotted_path, Command, CommandOutput, CommandTree, ReleaseTrack};
use crate::concepts::{ArgumentValues, Resolved, ResourceArg, Resolver};
use crate::console::Console;
use crate::error::{CliError, Result};
use crate::gcp::auth::GcpCredentials;
use crate::gcp::client::Transport;
use crate::gcp::dispatcher::Dispatcher;
use crate::gcp::http::HttpTransport;
use crate::gcp::operations::{Operation, OperationPoller};
use crate::gcp::retry::RetryConfig;
use crate::gcp::waiter::{report_async, WaitConfig, Waiter};
use crate::output::{self, Pipeline};
use crate::properties::{ConfigPaths, Env, PropertyStore, Scope};
use crate::resource::{Reference, Registry};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

/// Builds the transport once properties are known
pub type TransportFactory = Box<dyn FnOnce(&PropertyStore, &Registry) -> Result<Arc<dyn Transport>>>;

/// HTTPS transport with Application Default Credentials. The quota project
/// header goes only to APIs that honour it.
pub fn http_transport() -> TransportFactory {
    Box::new(|properties: &PropertyStore, registry: &Registry| {
        let override_apis: Vec<String> = registry
            .apis()
            .iter()
            .filter(|api| api.user_project_override)
            .map(|api| api.name.clone())
            .collect();
        let transport = HttpTransport::new(Arc::new(GcpCredentials::new()))?
            .with_quota_project(properties.get("billing/quota_project"), override_apis)
            .with_log_http(properties.get_bool("core/log_http"));
        Ok(Arc::new(transport) as Arc<dyn Transport>)
    })
}

/// Everything a command body can reach
pub struct Invocation<'a> {
    pub registry: &'a Registry,
    pub properties: &'a PropertyStore,
    pub console: &'a Console,
    pub tree: &'a CommandTree,
    pub dispatcher: Dispatcher,
    pub track: ReleaseTrack,
    /// Command path below the root, without the track
    pub path: Vec<String>,
    pub args: ParsedArgs,
    pub flags: UniversalFlags,
    /// Resolved resource arguments by leaf argument name
    pub resources: BTreeMap<String, Vec<Resolved>>,
    pub wait: WaitConfig,
}

impl<'a> Invocation<'a> {
    /// `gcloud.compute.instances.list`
    pub fn command_path(&self) -> String {
        dotted_path(self.track, &self.path)
    }

    pub fn resolved(&self, arg: &str) -> &[Resolved] {
        self.resources.get(arg).map(Vec::as_slice).unwrap_or_default()
    }

    /// The single reference bound to `arg`
    pub fn reference(&self, arg: &str) -> Result<&Reference> {
        self.resolved(arg)
            .first()
            .map(|r| &r.reference)
            .ok_or_else(|| CliError::internal(format!("Resource argument [{arg}] was not resolved")))
    }

    pub fn references(&self, arg: &str) -> Vec<&Reference> {
        self.resolved(arg).iter().map(|r| &r.reference).collect()
    }

    pub fn project(&self) -> Result<String> {
        Ok(self.properties.get_required("core/project")?)
    }

    /// Wait for `op`, or with `--async` report it and return it as-is
    pub async fn finish(
        &self,
        op: Operation,
        poller: &dyn OperationPoller,
        label: &str,
        describe_command: &str,
    ) -> Result<Value> {
        if self.flags.no_wait {
            return Ok(report_async(self.console, &op, describe_command));
        }
        Waiter::new(poller)
            .with_config(self.wait.clone())
            .with_cancellation(self.dispatcher.cancellation().clone())
            .with_progress(self.console)
            .wait(op, label)
            .await
    }
}

enum PropertySource {
    Files { paths: ConfigPaths, env: Env },
    Loaded(PropertyStore),
}

/// What the top-level error report needs to know
struct Report {
    command_path: String,
    debug: bool,
}

pub struct Runner {
    tree: CommandTree,
    registry: Registry,
    console: Console,
    properties: Option<PropertySource>,
    transport: Option<TransportFactory>,
    cancel: CancellationToken,
    wait: WaitConfig,
    retry: RetryConfig,
}

impl Runner {
    pub fn new(tree: CommandTree, registry: Registry, console: Console, transport: TransportFactory) -> Self {
        Self {
            tree,
            registry,
            console,
            properties: None,
            transport: Some(transport),
            cancel: CancellationToken::new(),
            wait: WaitConfig::default(),
            retry: RetryConfig::default(),
        }
    }

    /// Load properties from this config layout once `--configuration` is known
    pub fn with_config(mut self, paths: ConfigPaths, env: Env) -> Self {
        self.properties = Some(PropertySource::Files { paths, env });
        self
    }

    /// Use an already built store
    pub fn with_properties(mut self, store: PropertyStore) -> Self {
        self.properties = Some(PropertySource::Loaded(store));
        self
    }

    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn with_wait_config(mut self, wait: WaitConfig) -> Self {
        self.wait = wait;
        self
    }

    pub fn with_retry(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Run one invocation and return the process exit code
    pub async fn run(mut self, argv: &[String]) -> i32 {
        let id = uuid::Uuid::new_v4();
        let span = tracing::info_span!("invocation", id = %id);
        let mut report = Report {
            command_path: "gcloud".to_string(),
            debug: flags::prescan(argv, "verbosity").as_deref() == Some("debug"),
        };

        let result = self.execute(argv, &mut report).instrument(span).await;
        match result {
            Ok(()) => 0,
            Err(err) => {
                tracing::debug!("{} failed with {}", report.command_path, err.kind);
                self.console.err_line(&err.render(&report.command_path, report.debug));
                err.exit_code()
            }
        }
    }

    async fn execute(&mut self, argv: &[String], report: &mut Report) -> Result<()> {
        let (track, argv) = match argv.first().and_then(|t| ReleaseTrack::from_prefix(t)) {
            Some(track) => (track, &argv[1..]),
            None => (ReleaseTrack::Ga, argv),
        };
        report.command_path = dotted_path(track, &[]);

        let (path, remaining) = self.route(track, argv, report)?;
        let is_group = self.tree.node(&path).map_or(true, |n| n.is_group());
        let wants_help = flags::wants_help(&remaining);

        if is_group {
            if wants_help {
                return self.console.out(&help::group_help(&self.tree, &path, track));
            }
            let children: Vec<String> = self
                .tree
                .children(&path, track)
                .iter()
                .map(|n| n.name.clone())
                .collect();
            return Err(CliError::argument("Command name argument expected.").with_hint(format!(
                "Available groups and commands for {}:\n  {}",
                command_line(track, &path),
                children.join(", ")
            )));
        }

        let command = self
            .tree
            .command(&path, track)
            .ok_or_else(|| CliError::internal(format!("No command registered at {}", report.command_path)))?;
        if wants_help {
            return self
                .console
                .out(&help::command_help(&self.tree, &path, &command, track));
        }

        let mut specs = flags::universal_args();
        for spec in command.arg_specs() {
            if !specs.iter().any(|s| s.name == spec.name) {
                specs.push(spec);
            }
        }
        let parsed = args::parse(&specs, &command.groups, &remaining)?;
        let flags = UniversalFlags::from_args(&parsed);
        tracing::debug!("Running {} on track {}", report.command_path, track);

        let mut store = match self.properties.take() {
            Some(PropertySource::Files { paths, env }) => {
                PropertyStore::load(paths, env, flags.configuration.as_deref())?
            }
            Some(PropertySource::Loaded(store)) => store,
            None => PropertyStore::in_memory(Env::new()),
        };
        for (key, value) in flags.property_overrides() {
            store.set(key, &value, Scope::Flag)?;
        }
        report.debug = store.get("core/verbosity").as_deref() == Some("debug");
        self.console.set_quiet(store.get_bool("core/disable_prompts"));
        self.console
            .set_user_output_enabled(store.get_bool("core/user_output_enabled"));
        for warning in &parsed.warnings {
            self.console.status(&format!("WARNING: {warning}"));
        }

        for (api, url) in store.endpoint_overrides() {
            tracing::debug!("Endpoint override for {}: {}", api, url);
            self.registry.set_endpoint_override(&api, &url);
        }

        // Bad --format/--filter fail before any request is sent
        let options = flags.output_options();
        let pipeline = Pipeline::new(&options, &command.default_format)?;

        let resources = {
            let resolver = Resolver::new(&self.registry, &store).with_console(&self.console);
            let mut resolved = BTreeMap::new();
            for arg in &command.resources {
                let values = argument_values(arg, &parsed);
                resolved.insert(arg.leaf_arg_name(), resolver.resolve_arg(arg, &values)?);
            }
            resolved
        };

        if let Some(verb) = &command.confirm {
            let message = confirmation_message(&command, &resources, verb);
            self.console.prompt_continue(&message, true, true)?;
        }

        let factory = self
            .transport
            .take()
            .ok_or_else(|| CliError::internal("Transport was already consumed"))?;
        let dispatcher = Dispatcher::new(factory(&store, &self.registry)?)
            .with_retry(self.retry.clone())
            .with_cancellation(self.cancel.clone());

        let invocation = Invocation {
            registry: &self.registry,
            properties: &store,
            console: &self.console,
            tree: &self.tree,
            dispatcher,
            track,
            path,
            args: parsed,
            flags,
            resources,
            wait: self.wait.clone(),
        };

        match (command.action)(&invocation).await? {
            CommandOutput::Resource(value) => output::print_resource(&self.console, &pipeline, &value)?,
            CommandOutput::Resources(records) => {
                let records = pipeline.process(records);
                self.console.out(&pipeline.render(&records, false)?)?;
            }
            CommandOutput::List(stream) => {
                let count = output::print_list(&self.console, &pipeline, stream).await?;
                tracing::debug!("Listed {} items", count);
            }
            CommandOutput::Operations(ops) => {
                let pipeline = Pipeline::new(&options, "yaml")?;
                let records = pipeline.process(ops);
                self.console.out(&pipeline.render(&records, records.len() == 1)?)?;
            }
            CommandOutput::Nothing => {}
        }
        Ok(())
    }

    /// Split argv into the command path and everything else. Universal
    /// flags may appear before the command; their values are skipped.
    fn route(&self, track: ReleaseTrack, argv: &[String], report: &mut Report) -> Result<(Vec<String>, Vec<String>)> {
        let mut path: Vec<String> = Vec::new();
        let mut remaining = Vec::new();
        let mut at_leaf = false;
        let mut tokens = argv.iter();

        while let Some(token) = tokens.next() {
            if at_leaf {
                remaining.push(token.clone());
                continue;
            }
            if token == "--" {
                remaining.push(token.clone());
                remaining.extend(tokens.by_ref().cloned());
                break;
            }
            if token.starts_with('-') {
                remaining.push(token.clone());
                if flags::takes_separate_value(token) {
                    remaining.extend(tokens.next().cloned());
                }
                continue;
            }

            let mut candidate = path.clone();
            candidate.push(token.clone());
            if self.tree.is_visible(&candidate, track) {
                at_leaf = self.tree.node(&candidate).is_some_and(|n| !n.is_group());
                path = candidate;
                report.command_path = dotted_path(track, &path);
                continue;
            }

            let mut err = CliError::argument(format!("Invalid choice: '{token}'."));
            let suggestions = self.tree.suggest(&path, track, token);
            if !suggestions.is_empty() {
                let lines: Vec<String> = suggestions
                    .iter()
                    .map(|s| format!("  {} {}", command_line(track, &path), s))
                    .collect();
                err = err.with_hint(format!("Maybe you meant:\n{}", lines.join("\n")));
            }
            return Err(err);
        }
        Ok((path, remaining))
    }
}

fn argument_values(arg: &ResourceArg, parsed: &ParsedArgs) -> ArgumentValues {
    ArgumentValues {
        leaves: parsed.strings(&arg.leaf_arg_name()),
        attributes: arg
            .attribute_flags()
            .filter_map(|a| parsed.string(&a.name).map(|v| (a.name.clone(), v.to_string())))
            .collect(),
    }
}

/// `The following instances will be deleted:` and one line per resource
fn confirmation_message(command: &Command, resources: &BTreeMap<String, Vec<Resolved>>, verb: &str) -> String {
    let mut lines = Vec::new();
    for arg in &command.resources {
        let Some(resolved) = resources.get(&arg.leaf_arg_name()).filter(|r| !r.is_empty()) else {
            continue;
        };
        lines.push(format!("The following {}s will be {}:", arg.spec.resource_name, verb));
        // Innermost container other than the project, e.g. the zone
        let scope = arg
            .spec
            .attributes
            .iter()
            .rev()
            .skip(1)
            .find(|a| a.name != "project");
        for r in resolved {
            match scope.and_then(|a| r.reference.get(&a.param)) {
                Some(value) => lines.push(format!(" - [{}] in [{}]", r.reference.name(), value)),
                None => lines.push(format!(" - [{}]", r.reference.name())),
            }
        }
    }
    lines.join("\n")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::arg_types::ArgType;
    use crate::cli::args::ArgSpec;
    use crate::concepts::{AttributeConfig, ResourceSpec};
    use async_trait::async_trait;
    use futures::future::LocalBoxFuture;
    use futures::FutureExt;
    use serde_json::json;
    use std::sync::Mutex;

    #[derive(Default)]
    struct Recording {
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport for Recording {
        async fn execute(&self, call: &crate::gcp::client::ApiCall) -> Result<Value> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{} {}", call.http_method, call.url));
            Ok(json!({"name": "done"}))
        }
    }

    fn instance_spec() -> ResourceSpec {
        ResourceSpec::new("compute.instances", "instance")
            .attribute(AttributeConfig::new("project", "project", "Project.").property("core/project").without_flag())
            .attribute(AttributeConfig::new("zone", "zone", "Zone.").property("compute/zone"))
            .attribute(AttributeConfig::new("instance", "instance", "Instance."))
    }

    fn describe<'a>(inv: &'a Invocation<'a>) -> LocalBoxFuture<'a, Result<CommandOutput<'a>>> {
        async move {
            let reference = inv.reference("INSTANCE")?;
            let call = crate::gcp::client::ApiCall::get("compute", "instances.get", reference.self_link());
            inv.dispatcher.call(&call).await?;
            Ok(CommandOutput::Resource(json!({
                "name": reference.name(),
                "zone": reference.get("zone"),
                "verbose": inv.args.flag("verbose"),
            })))
        }
        .boxed_local()
    }

    fn build_describe(_: ReleaseTrack) -> Command {
        Command::new(describe)
            .resource(ResourceArg::positional(instance_spec(), "Instance."))
            .arg(ArgSpec::flag("verbose", ArgType::Bool, "Verbose."))
            .format("json")
    }

    fn build_delete(_: ReleaseTrack) -> Command {
        Command::new(describe)
            .resource(ResourceArg::positional(instance_spec(), "Instance."))
            .destructive("deleted")
    }

    fn tree() -> CommandTree {
        let mut tree = CommandTree::new();
        tree.add_group(&["compute"], "Compute.", &ReleaseTrack::ALL)
            .add_group(&["compute", "instances"], "Instances.", &ReleaseTrack::ALL)
            .add_command(&["compute", "instances", "describe"], "Describe.", &ReleaseTrack::ALL, build_describe)
            .add_command(&["compute", "instances", "delete"], "Delete.", &ReleaseTrack::ALL, build_delete);
        tree
    }

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    fn runner(answers: &str) -> (Runner, crate::console::Captured, Arc<Recording>) {
        let (console, captured) = Console::scripted(answers, true);
        let transport = Arc::new(Recording::default());
        let shared: Arc<dyn Transport> = transport.clone();
        let runner = Runner::new(
            tree(),
            Registry::builtin().unwrap(),
            console,
            Box::new(move |_: &PropertyStore, _: &Registry| Ok(shared)),
        )
        .with_properties(PropertyStore::in_memory(Env::new()));
        (runner, captured, transport)
    }

    #[tokio::test]
    async fn test_runs_command_and_prints_output() {
        let (runner, captured, transport) = runner("");
        let code = runner
            .run(&argv(&["--project", "p1", "compute", "instances", "describe", "vm-1", "--zone=us-east1-b", "--verbose"]))
            .await;
        assert_eq!(code, 0, "stderr: {}", captured.stderr.contents());
        let out: Value = serde_json::from_str(&captured.stdout.contents()).unwrap();
        assert_eq!(out["name"], "vm-1");
        assert_eq!(out["zone"], "us-east1-b");
        assert_eq!(out["verbose"], true);
        assert_eq!(
            transport.calls.lock().unwrap().as_slice(),
            ["GET https://compute.googleapis.com/compute/v1/projects/p1/zones/us-east1-b/instances/vm-1"]
        );
    }

    #[tokio::test]
    async fn test_group_without_command_is_argument_error() {
        let (runner, captured, _) = runner("");
        let code = runner.run(&argv(&["compute", "instances"])).await;
        assert_eq!(code, 2);
        let stderr = captured.stderr.contents();
        assert!(stderr.contains("ERROR: (gcloud.compute.instances) ARGUMENT: Command name argument expected."));
        assert!(stderr.contains("delete, describe"));
    }

    #[tokio::test]
    async fn test_unknown_command_suggests() {
        let (runner, captured, _) = runner("");
        let code = runner.run(&argv(&["beta", "compute", "instancez", "list"])).await;
        assert_eq!(code, 2);
        let stderr = captured.stderr.contents();
        assert!(stderr.contains("ERROR: (gcloud.beta.compute) ARGUMENT: Invalid choice: 'instancez'."));
        assert!(stderr.contains("gcloud beta compute instances"));
    }

    #[tokio::test]
    async fn test_help_prints_and_sends_nothing() {
        let (runner, captured, transport) = runner("");
        let code = runner.run(&argv(&["compute", "instances", "describe", "--help"])).await;
        assert_eq!(code, 0);
        assert!(captured.stdout.contents().contains("gcloud compute instances describe INSTANCE"));
        assert!(transport.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_missing_attribute_lists_remedies() {
        let (runner, captured, transport) = runner("");
        let code = runner
            .run(&argv(&["compute", "instances", "describe", "vm-1", "--project=p", "--quiet"]))
            .await;
        assert_eq!(code, 2);
        let stderr = captured.stderr.contents();
        assert!(stderr.contains("Failed to find attribute [zone]"));
        assert!(stderr.contains("--zone"));
        assert!(stderr.contains("compute/zone"));
        assert!(transport.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_declined_confirmation_sends_nothing() {
        let (runner, captured, transport) = runner("n\n");
        let code = runner
            .run(&argv(&["compute", "instances", "delete", "vm-1", "--zone=z", "--project=p"]))
            .await;
        assert_eq!(code, 10);
        let stderr = captured.stderr.contents();
        assert!(stderr.contains("The following instances will be deleted:\n - [vm-1] in [z]"));
        assert!(stderr.contains("Operation aborted by user."));
        assert!(transport.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_quiet_accepts_confirmation() {
        let (runner, _, transport) = runner("");
        let code = runner
            .run(&argv(&["compute", "instances", "delete", "vm-1", "--zone=z", "--project=p", "-q"]))
            .await;
        assert_eq!(code, 0);
        assert_eq!(transport.calls.lock().unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_bad_format_fails_before_requests() {
        let (runner, captured, transport) = runner("");
        let code = runner
            .run(&argv(&["compute", "instances", "describe", "vm-1", "--zone=z", "--project=p", "--format=bogus"]))
            .await;
        assert_eq!(code, 2);
        assert!(captured.stderr.contents().contains("ARGUMENT"));
        assert!(transport.calls.lock().unwrap().is_empty());
    }
}
