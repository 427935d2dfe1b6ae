//! `compute instances` and `compute operations`

use super::{basename, finish_operations, project_attribute};
use crate::cli::{ArgGroup, ArgSpec, ArgType, Command, CommandOutput, CommandTree, Invocation, ReleaseTrack};
use crate::concepts::{AttributeConfig, ResourceArg, ResourceSpec};
use crate::error::{CliError, Result};
use crate::gcp::client::ApiCall;
use crate::gcp::dispatcher::{collect_batch, BatchMode};
use crate::gcp::lister::{list_items, ListRequest};
use crate::gcp::operations::{ComputeOperationPoller, Operation, OperationPoller};
use crate::gcp::waiter::Waiter;
use crate::resource::{ParseOptions, Reference};
use async_trait::async_trait;
use futures::future::LocalBoxFuture;
use futures::{FutureExt, StreamExt, TryStreamExt};
use serde_json::{json, Map, Value};

const LIST_FORMAT: &str = "table(name, zone.basename(), machineType.basename():label=MACHINE_TYPE, \
     scheduling.preemptible.yesno(true, ''):label=PREEMPTIBLE, \
     networkInterfaces[0].networkIP:label=INTERNAL_IP, \
     networkInterfaces[0].accessConfigs[0].natIP:label=EXTERNAL_IP, status)";

const GIB: u64 = 1 << 30;

/// Compute API version for a release track
pub fn api_version(track: ReleaseTrack) -> &'static str {
    match track {
        ReleaseTrack::Ga => "v1",
        ReleaseTrack::Beta | ReleaseTrack::Alpha => "beta",
    }
}

fn zone_attribute() -> AttributeConfig {
    AttributeConfig::new("zone", "zone", "Zone of the resource.")
        .property("compute/zone")
        .prompt("Zone")
}

pub fn instance_spec(track: ReleaseTrack) -> ResourceSpec {
    ResourceSpec::new("compute.instances", "instance")
        .api_version(api_version(track))
        .attribute(project_attribute("project"))
        .attribute(zone_attribute())
        .attribute(AttributeConfig::new("instance", "instance", "Name of the instance."))
}

fn operation_spec(track: ReleaseTrack) -> ResourceSpec {
    ResourceSpec::new("compute.zoneOperations", "operation")
        .api_version(api_version(track))
        .attribute(project_attribute("project"))
        .attribute(zone_attribute())
        .attribute(AttributeConfig::new("operation", "operation", "Name of the operation."))
}

pub fn register(tree: &mut CommandTree) {
    let all = &ReleaseTrack::ALL;
    tree.add_group(&["compute"], "Create and manipulate Compute Engine resources.", all)
        .add_group(&["compute", "instances"], "Read and manipulate Compute Engine virtual machine instances.", all)
        .add_command(&["compute", "instances", "list"], "List Compute Engine instances.", all, list_command)
        .add_command(
            &["compute", "instances", "describe"],
            "Describe a virtual machine instance.",
            all,
            describe_command,
        )
        .add_command(
            &["compute", "instances", "create"],
            "Create Compute Engine virtual machine instances.",
            all,
            create_command,
        )
        .add_command(
            &["compute", "instances", "delete"],
            "Delete Compute Engine virtual machine instances.",
            all,
            delete_command,
        )
        .add_group(&["compute", "operations"], "Read and manipulate Compute Engine operations.", all)
        .add_command(
            &["compute", "operations", "describe"],
            "Describe a Compute Engine operation.",
            all,
            operation_describe_command,
        )
        .add_command(
            &["compute", "operations", "wait"],
            "Poll a Compute Engine operation until it completes.",
            &[ReleaseTrack::Beta, ReleaseTrack::Alpha],
            operation_wait_command,
        );
}

// =============================================================================
// instances list
// =============================================================================

fn list_command(_track: ReleaseTrack) -> Command {
    Command::new(list)
        .description(
            "Lists instances in a project. Without --zones, instances in all zones are listed using the \
             aggregated list method.",
        )
        .arg(ArgSpec::flag("zones", ArgType::List, "If provided, only resources from the given zones are queried."))
        .format(LIST_FORMAT)
}

fn list<'a>(inv: &'a Invocation<'a>) -> LocalBoxFuture<'a, Result<CommandOutput<'a>>> {
    async move {
        let project = inv.project()?;
        let base = inv.registry.base_url("compute", api_version(inv.track))?;
        let zones = inv.args.strings("zones");

        if let [zone] = zones.as_slice() {
            let url = format!("{base}projects/{project}/zones/{zone}/instances");
            let request = ListRequest::new(ApiCall::get("compute", "instances.list", url), "items")
                .page_size_field("maxResults")
                .page_size(inv.flags.page_size);
            return Ok(CommandOutput::List(list_items(&inv.dispatcher, request).boxed_local()));
        }

        let url = format!("{base}projects/{project}/aggregated/instances");
        let request = ListRequest::new(ApiCall::get("compute", "instances.aggregatedList", url), "items")
            .page_size_field("maxResults")
            .page_size(inv.flags.page_size)
            .aggregated("instances");
        let items = list_items(&inv.dispatcher, request).try_filter(move |instance| {
            let keep = zones.is_empty()
                || instance
                    .get("zone")
                    .and_then(Value::as_str)
                    .is_some_and(|z| zones.iter().any(|wanted| wanted == basename(z)));
            futures::future::ready(keep)
        });
        Ok(CommandOutput::List(items.boxed_local()))
    }
    .boxed_local()
}

// =============================================================================
// instances describe
// =============================================================================

fn describe_command(track: ReleaseTrack) -> Command {
    Command::new(describe)
        .description("Displays all data associated with a Compute Engine virtual machine instance.")
        .resource(ResourceArg::positional(instance_spec(track), "Name of the instance to describe."))
}

fn describe<'a>(inv: &'a Invocation<'a>) -> LocalBoxFuture<'a, Result<CommandOutput<'a>>> {
    async move {
        let instance = inv.reference("INSTANCE")?;
        let call = ApiCall::get("compute", "instances.get", instance.self_link());
        Ok(CommandOutput::Resource(inv.dispatcher.call(&call).await?))
    }
    .boxed_local()
}

// =============================================================================
// instances create
// =============================================================================

fn create_command(track: ReleaseTrack) -> Command {
    Command::new(create)
        .description("Creates Compute Engine virtual machine instances.")
        .resource(ResourceArg::plural(instance_spec(track), "Names of the instances to create."))
        .arg(ArgSpec::flag("machine-type", ArgType::String, "Machine type to create.").default_value("n1-standard-1"))
        .arg(ArgSpec::flag(
            "image",
            ArgType::String,
            "Boot disk image, as a name, a relative name or a URL.",
        ))
        .arg(
            ArgSpec::flag("image-family", ArgType::String, "Image family for the boot disk.")
                .default_value("debian-12"),
        )
        .arg(
            ArgSpec::flag("image-project", ArgType::String, "Project the image lives in.")
                .default_value("debian-cloud"),
        )
        .group(ArgGroup::mutex(&["image", "image-family"]))
        .arg(ArgSpec::flag(
            "boot-disk-size",
            ArgType::ByteSize,
            "Size of the boot disk, a whole number of GB such as 20GB.",
        ))
        .arg(ArgSpec::flag("labels", ArgType::KeyValue, "Labels to apply, KEY=VALUE pairs."))
        .arg(ArgSpec::flag("tags", ArgType::List, "Network tags for the instances."))
        .arg(ArgSpec::flag("preemptible", ArgType::Bool, "Create preemptible instances."))
        .arg(ArgSpec::flag("network", ArgType::String, "Network to attach to.").default_value("default"))
        .arg(ArgSpec::flag("no-address", ArgType::Bool, "Do not assign an external IP address."))
        .format(LIST_FORMAT)
}

/// `sourceImage` for the boot disk
fn source_image(inv: &Invocation<'_>, instance: &Reference) -> Result<String> {
    let image_project = inv.args.string("image-project").unwrap_or("debian-cloud");
    match inv.args.string("image") {
        Some(image) => {
            let opts = ParseOptions::collection("compute.images")
                .param("project", image_project)
                .api_version(instance.api_version());
            Ok(inv.registry.parse(image, &opts)?.self_link())
        }
        None => {
            let family = inv.args.string("image-family").unwrap_or("debian-12");
            Ok(format!("projects/{image_project}/global/images/family/{family}"))
        }
    }
}

fn disk_size_gb(inv: &Invocation<'_>) -> Result<Option<u64>> {
    match inv.args.bytes("boot-disk-size") {
        None => Ok(None),
        Some(bytes) if bytes % GIB == 0 && bytes > 0 => Ok(Some(bytes / GIB)),
        Some(_) => Err(CliError::argument(
            "argument --boot-disk-size: Must be specified as a whole number of GB.",
        )),
    }
}

fn instance_body(inv: &Invocation<'_>, instance: &Reference, image: &str, disk_gb: Option<u64>) -> Value {
    let zone = instance.get("zone").unwrap_or_default();
    let machine_type = inv.args.string("machine-type").unwrap_or("n1-standard-1");
    let network = inv.args.string("network").unwrap_or("default");

    let mut init = Map::new();
    init.insert("sourceImage".into(), json!(image));
    if let Some(gb) = disk_gb {
        init.insert("diskSizeGb".into(), json!(gb.to_string()));
    }

    let mut interface = json!({ "network": format!("global/networks/{network}") });
    if !inv.args.flag("no-address") {
        interface["accessConfigs"] = json!([{ "name": "external-nat", "type": "ONE_TO_ONE_NAT" }]);
    }

    let mut body = json!({
        "name": instance.name(),
        "machineType": format!("zones/{zone}/machineTypes/{machine_type}"),
        "disks": [{ "boot": true, "autoDelete": true, "initializeParams": init }],
        "networkInterfaces": [interface],
    });
    if let Some(labels) = inv.args.map("labels") {
        body["labels"] = json!(labels);
    }
    let tags = inv.args.strings("tags");
    if !tags.is_empty() {
        body["tags"] = json!({ "items": tags });
    }
    if inv.args.flag("preemptible") {
        body["scheduling"] = json!({ "preemptible": true });
    }
    body
}

fn operations_describe_hint(op: &Operation) -> String {
    let zone = op.raw.get("zone").and_then(Value::as_str).map(basename);
    match zone {
        Some(zone) => format!("gcloud compute operations describe {} --zone={zone}", op.short_name()),
        None => format!("gcloud compute operations describe {}", op.short_name()),
    }
}

fn create<'a>(inv: &'a Invocation<'a>) -> LocalBoxFuture<'a, Result<CommandOutput<'a>>> {
    async move {
        let disk_gb = disk_size_gb(inv)?;
        let mut calls = Vec::new();
        for instance in inv.references("INSTANCE") {
            let image = source_image(inv, instance)?;
            let parent = inv
                .registry
                .parent(instance)
                .ok_or_else(|| CliError::internal("Instance reference has no zone"))?;
            let url = format!("{}/instances", parent.self_link());
            let body = instance_body(inv, instance, &image, disk_gb);
            calls.push((instance.name().to_string(), ApiCall::post("compute", "instances.insert", url, body)));
        }

        let (started, failure) = collect_batch(inv.dispatcher.batch(calls, BatchMode::CollectAll).await);
        let poller = ComputeOperationPoller::new(inv.dispatcher.clone());
        let created = finish_operations(inv, started, &poller, operations_describe_hint).await?;
        if inv.flags.no_wait {
            return match failure {
                Some(err) => Err(err),
                None => Ok(CommandOutput::Operations(created)),
            };
        }

        for instance in &created {
            if let Some(link) = instance.get("selfLink").and_then(Value::as_str) {
                inv.console.status(&format!("Created [{link}]."));
            }
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(CommandOutput::Resources(created)),
        }
    }
    .boxed_local()
}

// =============================================================================
// instances delete
// =============================================================================

fn delete_command(track: ReleaseTrack) -> Command {
    Command::new(delete)
        .description("Deletes one or more Compute Engine virtual machine instances.")
        .resource(ResourceArg::plural(instance_spec(track), "Names of the instances to delete."))
        .destructive("deleted")
}

fn delete<'a>(inv: &'a Invocation<'a>) -> LocalBoxFuture<'a, Result<CommandOutput<'a>>> {
    async move {
        let calls = inv
            .references("INSTANCE")
            .into_iter()
            .map(|r| (r.self_link(), ApiCall::delete("compute", "instances.delete", r.self_link())))
            .collect();
        let (started, failure) = collect_batch(inv.dispatcher.batch(calls, BatchMode::CollectAll).await);

        let poller = ComputeOperationPoller::new(inv.dispatcher.clone());
        let links: Vec<String> = started.iter().map(|(link, _)| link.clone()).collect();
        let finished = finish_operations(inv, started, &poller, operations_describe_hint).await?;
        if inv.flags.no_wait {
            return match failure {
                Some(err) => Err(err),
                None => Ok(CommandOutput::Operations(finished)),
            };
        }
        for link in links {
            inv.console.status(&format!("Deleted [{link}]."));
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(CommandOutput::Nothing),
        }
    }
    .boxed_local()
}

// =============================================================================
// operations describe / wait
// =============================================================================

fn operation_describe_command(track: ReleaseTrack) -> Command {
    Command::new(operation_describe)
        .description("Displays all data associated with a Compute Engine operation.")
        .resource(ResourceArg::positional(operation_spec(track), "Name of the operation to describe."))
}

fn operation_describe<'a>(inv: &'a Invocation<'a>) -> LocalBoxFuture<'a, Result<CommandOutput<'a>>> {
    async move {
        let operation = inv.reference("OPERATION")?;
        let call = ApiCall::get("compute", "zoneOperations.get", operation.self_link());
        Ok(CommandOutput::Resource(inv.dispatcher.call(&call).await?))
    }
    .boxed_local()
}

fn operation_wait_command(track: ReleaseTrack) -> Command {
    Command::new(operation_wait)
        .description("Polls a Compute Engine operation until it is done, then prints it.")
        .resource(ResourceArg::positional(operation_spec(track), "Name of the operation to wait for."))
}

/// Polls like the compute poller but yields the finished operation itself
struct FinishedOperation {
    inner: ComputeOperationPoller,
}

#[async_trait]
impl OperationPoller for FinishedOperation {
    async fn poll(&self, op: &Operation) -> Result<Operation> {
        self.inner.poll(op).await
    }

    async fn cancel(&self, op: &Operation) -> Result<bool> {
        self.inner.cancel(op).await
    }

    async fn get_result(&self, op: &Operation) -> Result<Value> {
        Ok(op.raw.clone())
    }
}

fn operation_wait<'a>(inv: &'a Invocation<'a>) -> LocalBoxFuture<'a, Result<CommandOutput<'a>>> {
    async move {
        let reference = inv.reference("OPERATION")?;
        let call = ApiCall::get("compute", "zoneOperations.get", reference.self_link());
        let value = inv.dispatcher.call(&call).await?;
        let op = Operation::from_value(&value)
            .ok_or_else(|| CliError::internal(format!("[{}] is not an operation", reference.name())))?;
        let poller = FinishedOperation {
            inner: ComputeOperationPoller::new(inv.dispatcher.clone()),
        };
        let done = Waiter::new(&poller)
            .with_config(inv.wait.clone())
            .with_cancellation(inv.dispatcher.cancellation().clone())
            .with_progress(inv.console)
            .wait(op, reference.name())
            .await?;
        Ok(CommandOutput::Resource(done))
    }
    .boxed_local()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Runner;
    use crate::console::{Captured, Console};
    use crate::gcp::client::Transport;
    use crate::gcp::waiter::WaitConfig;
    use crate::properties::{Env, PropertyStore, Scope};
    use crate::resource::Registry;
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    /// Replies in order and records every call
    #[derive(Default)]
    struct Script {
        replies: Mutex<VecDeque<Value>>,
        calls: Mutex<Vec<ApiCall>>,
    }

    impl Script {
        fn new(replies: Vec<Value>) -> Arc<Self> {
            Arc::new(Self {
                replies: Mutex::new(replies.into()),
                calls: Mutex::default(),
            })
        }

        fn urls(&self) -> Vec<String> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .map(|c| format!("{} {}", c.http_method, c.full_url()))
                .collect()
        }
    }

    #[async_trait]
    impl Transport for Script {
        async fn execute(&self, call: &ApiCall) -> Result<Value> {
            self.calls.lock().unwrap().push(call.clone());
            Ok(self.replies.lock().unwrap().pop_front().unwrap_or_else(|| json!({})))
        }
    }

    fn run(script: Arc<Script>, answers: &str, args: &[&str]) -> (i32, Captured) {
        let (console, captured) = Console::scripted(answers, true);
        let mut store = PropertyStore::in_memory(Env::new());
        store.set("core/project", "p1", Scope::User).unwrap();
        let shared: Arc<dyn Transport> = script;
        let mut tree = CommandTree::new();
        register(&mut tree);
        let runner = Runner::new(
            tree,
            Registry::builtin().unwrap(),
            console,
            Box::new(move |_: &PropertyStore, _: &Registry| Ok(shared)),
        )
        .with_properties(store)
        .with_wait_config(WaitConfig {
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(1),
            ..WaitConfig::default()
        });
        let argv: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let code = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap()
            .block_on(runner.run(&argv));
        (code, captured)
    }

    fn compute_op(name: &str, status: &str, op_type: &str, target: &str) -> Value {
        json!({
            "kind": "compute#operation",
            "name": name,
            "status": status,
            "operationType": op_type,
            "zone": "https://compute.googleapis.com/compute/v1/projects/p1/zones/us-east1-b",
            "targetLink": target,
            "selfLink": format!("https://compute.googleapis.com/compute/v1/projects/p1/zones/us-east1-b/operations/{name}"),
        })
    }

    const VM1: &str = "https://compute.googleapis.com/compute/v1/projects/p1/zones/us-east1-b/instances/vm-1";

    #[test]
    fn test_list_single_zone_uses_zonal_method() {
        let script = Script::new(vec![json!({
            "items": [{
                "name": "vm-1",
                "zone": "https://compute.googleapis.com/compute/v1/projects/p1/zones/us-east1-b",
                "machineType": "https://compute.googleapis.com/compute/v1/projects/p1/zones/us-east1-b/machineTypes/e2-small",
                "status": "RUNNING",
                "networkInterfaces": [{ "networkIP": "10.0.0.2", "accessConfigs": [{ "natIP": "34.1.2.3" }] }],
            }]
        })]);
        let (code, captured) = run(script.clone(), "", &["compute", "instances", "list", "--zones=us-east1-b"]);
        assert_eq!(code, 0, "{}", captured.stderr.contents());
        assert_eq!(
            script.urls(),
            ["GET https://compute.googleapis.com/compute/v1/projects/p1/zones/us-east1-b/instances"]
        );
        let out = captured.stdout.contents();
        assert!(out.starts_with("NAME"));
        assert!(out.contains("INTERNAL_IP"));
        assert!(out.contains("vm-1"));
        assert!(out.contains("e2-small"));
        assert!(out.contains("34.1.2.3"));
    }

    #[test]
    fn test_list_all_zones_is_aggregated_and_filtered() {
        let zone = |z: &str| format!("https://compute.googleapis.com/compute/v1/projects/p1/zones/{z}");
        let script = Script::new(vec![json!({
            "items": {
                "zones/a": { "instances": [{ "name": "vm-a", "zone": zone("a") }] },
                "zones/b": { "instances": [{ "name": "vm-b", "zone": zone("b") }] },
                "zones/c": { "warning": { "code": "NO_RESULTS_ON_PAGE" } },
            }
        })]);
        let (code, captured) = run(
            script.clone(),
            "",
            &["beta", "compute", "instances", "list", "--zones=a,c", "--format=value(name)"],
        );
        assert_eq!(code, 0, "{}", captured.stderr.contents());
        assert_eq!(
            script.urls(),
            ["GET https://compute.googleapis.com/compute/beta/projects/p1/aggregated/instances"]
        );
        assert_eq!(captured.stdout.contents().trim(), "vm-a");
    }

    #[test]
    fn test_create_waits_and_fetches_target() {
        let script = Script::new(vec![
            compute_op("op-1", "RUNNING", "insert", VM1),
            compute_op("op-1", "DONE", "insert", VM1),
            json!({ "name": "vm-1", "selfLink": VM1, "status": "RUNNING" }),
        ]);
        let (code, captured) = run(
            script.clone(),
            "",
            &[
                "compute", "instances", "create", "vm-1", "--zone=us-east1-b", "--labels=env=dev",
                "--boot-disk-size=20GB", "--format=value(name,status)",
            ],
        );
        assert_eq!(code, 0, "{}", captured.stderr.contents());
        let calls = script.calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        assert_eq!(
            calls[0].url,
            "https://compute.googleapis.com/compute/v1/projects/p1/zones/us-east1-b/instances"
        );
        let body = calls[0].body.as_ref().unwrap();
        assert_eq!(body["name"], "vm-1");
        assert_eq!(body["machineType"], "zones/us-east1-b/machineTypes/n1-standard-1");
        assert_eq!(body["labels"]["env"], "dev");
        assert_eq!(body["disks"][0]["initializeParams"]["diskSizeGb"], "20");
        assert_eq!(
            body["disks"][0]["initializeParams"]["sourceImage"],
            "projects/debian-cloud/global/images/family/debian-12"
        );
        assert_eq!(calls[2].url, VM1);
        assert_eq!(captured.stdout.contents().trim(), "vm-1\tRUNNING");
        assert!(captured.stderr.contents().contains(&format!("Created [{VM1}].")));
    }

    #[test]
    fn test_create_with_image_name_builds_image_link() {
        let script = Script::new(vec![compute_op("op-1", "RUNNING", "insert", VM1)]);
        let (code, _) = run(
            script.clone(),
            "",
            &[
                "compute", "instances", "create", "vm-1", "--zone=us-east1-b", "--async",
                "--image=family/debian-12", "--image-project=debian-cloud",
            ],
        );
        assert_eq!(code, 0);
        let calls = script.calls.lock().unwrap();
        assert_eq!(
            calls[0].body.as_ref().unwrap()["disks"][0]["initializeParams"]["sourceImage"],
            "https://compute.googleapis.com/compute/v1/projects/debian-cloud/global/images/family/debian-12"
        );
    }

    #[test]
    fn test_create_rejects_fractional_disk_size() {
        let script = Script::new(vec![]);
        let (code, captured) = run(
            script.clone(),
            "",
            &["compute", "instances", "create", "vm-1", "--zone=z", "--boot-disk-size=1536MB"],
        );
        assert_eq!(code, 2);
        assert!(captured.stderr.contents().contains("whole number of GB"));
        assert!(script.calls.lock().unwrap().is_empty());
    }

    #[test]
    fn test_create_image_and_family_conflict() {
        let (code, captured) = run(
            Script::new(vec![]),
            "",
            &["compute", "instances", "create", "vm-1", "--zone=z", "--image=i", "--image-family=f"],
        );
        assert_eq!(code, 2);
        assert!(captured.stderr.contents().contains("At most one of"));
    }

    #[test]
    fn test_delete_does_not_fetch_deleted_target() {
        let script = Script::new(vec![
            compute_op("op-2", "RUNNING", "delete", VM1),
            compute_op("op-2", "DONE", "delete", VM1),
        ]);
        let (code, captured) = run(script.clone(), "", &["compute", "instances", "delete", "vm-1", "--zone=us-east1-b", "-q"]);
        assert_eq!(code, 0, "{}", captured.stderr.contents());
        let urls = script.urls();
        assert_eq!(urls.len(), 2);
        assert_eq!(urls[0], format!("DELETE {VM1}"));
        assert!(urls[1].ends_with("/operations/op-2"));
        assert!(captured.stderr.contents().contains(&format!("Deleted [{VM1}].")));
    }

    #[test]
    fn test_operations_wait_only_on_beta() {
        let (code, _) = run(Script::new(vec![]), "", &["compute", "operations", "wait", "op-1", "--zone=z"]);
        assert_eq!(code, 2);

        let script = Script::new(vec![
            compute_op("op-1", "RUNNING", "insert", VM1),
            compute_op("op-1", "DONE", "insert", VM1),
        ]);
        let (code, captured) = run(
            script.clone(),
            "",
            &["beta", "compute", "operations", "wait", "op-1", "--zone=us-east1-b", "--format=value(status)"],
        );
        assert_eq!(code, 0, "{}", captured.stderr.contents());
        assert_eq!(captured.stdout.contents().trim(), "DONE");
        assert_eq!(
            script.urls()[0],
            "GET https://compute.googleapis.com/compute/beta/projects/p1/zones/us-east1-b/operations/op-1"
        );
    }
}
