//! `dataproc clusters`

use super::{finish_operations, project_attribute};
use crate::cli::{Command, CommandOutput, CommandTree, Invocation, ReleaseTrack};
use crate::concepts::{AttributeConfig, ResourceArg, ResourceSpec};
use crate::error::Result;
use crate::gcp::client::ApiCall;
use crate::gcp::lister::{list_items, ListRequest};
use crate::gcp::operations::CloudOperationPoller;
use futures::future::LocalBoxFuture;
use futures::{FutureExt, StreamExt};

const LIST_FORMAT: &str = "table(clusterName:label=NAME, \
     config.workerConfig.numInstances:label=WORKER_COUNT, \
     status.state:label=STATUS, \
     config.gceClusterConfig.zoneUri.basename():label=ZONE)";

fn region_attribute() -> AttributeConfig {
    AttributeConfig::new("region", "region", "Dataproc region for the cluster.").property("dataproc/region")
}

fn region_spec() -> ResourceSpec {
    ResourceSpec::new("dataproc.projects.regions", "region")
        .attribute(project_attribute("projectId"))
        .attribute(region_attribute())
}

fn cluster_spec() -> ResourceSpec {
    ResourceSpec::new("dataproc.projects.regions.clusters", "cluster")
        .attribute(project_attribute("projectId"))
        .attribute(region_attribute())
        .attribute(AttributeConfig::new("cluster", "clusterName", "Name of the cluster."))
}

pub fn register(tree: &mut CommandTree) {
    let all = &ReleaseTrack::ALL;
    tree.add_group(&["dataproc"], "Create and manage Google Cloud Dataproc clusters and jobs.", all)
        .add_group(&["dataproc", "clusters"], "Create and manage Dataproc clusters.", all)
        .add_command(&["dataproc", "clusters", "list"], "View a list of clusters in a project.", all, list_command)
        .add_command(&["dataproc", "clusters", "describe"], "View the details of a cluster.", all, describe_command)
        .add_command(&["dataproc", "clusters", "delete"], "Delete a cluster.", all, delete_command);
}

fn list_command(_track: ReleaseTrack) -> Command {
    Command::new(list)
        .description("Lists all clusters in a project and region.")
        .resource(ResourceArg::flag(region_spec(), "Dataproc region to list clusters in."))
        .format(LIST_FORMAT)
}

fn list<'a>(inv: &'a Invocation<'a>) -> LocalBoxFuture<'a, Result<CommandOutput<'a>>> {
    async move {
        let region = inv.reference("region")?;
        let call = ApiCall::get(
            "dataproc",
            "projects.regions.clusters.list",
            format!("{}/clusters", region.self_link()),
        );
        let request = ListRequest::new(call, "clusters").page_size(inv.flags.page_size);
        Ok(CommandOutput::List(list_items(&inv.dispatcher, request).boxed_local()))
    }
    .boxed_local()
}

fn describe_command(_track: ReleaseTrack) -> Command {
    Command::new(describe)
        .description("Shows the configuration and status of a cluster.")
        .resource(ResourceArg::positional(cluster_spec(), "The name of the cluster to describe."))
}

fn describe<'a>(inv: &'a Invocation<'a>) -> LocalBoxFuture<'a, Result<CommandOutput<'a>>> {
    async move {
        let cluster = inv.reference("CLUSTER")?;
        let call = ApiCall::get("dataproc", "projects.regions.clusters.get", cluster.self_link());
        Ok(CommandOutput::Resource(inv.dispatcher.call(&call).await?))
    }
    .boxed_local()
}

fn delete_command(_track: ReleaseTrack) -> Command {
    Command::new(delete)
        .description("Deletes a cluster and the virtual machines it runs on.")
        .resource(ResourceArg::positional(cluster_spec(), "The name of the cluster to delete."))
        .destructive("deleted")
}

fn delete<'a>(inv: &'a Invocation<'a>) -> LocalBoxFuture<'a, Result<CommandOutput<'a>>> {
    async move {
        let cluster = inv.reference("CLUSTER")?;
        let link = cluster.self_link();
        let call = ApiCall::delete("dataproc", "projects.regions.clusters.delete", link.clone());
        let started = inv.dispatcher.call(&call).await?;

        let poller = CloudOperationPoller::new(inv.dispatcher.clone(), "dataproc", cluster.base_url());
        let finished = finish_operations(
            inv,
            vec![(format!("Waiting for cluster deletion [{}]", cluster.name()), started)],
            &poller,
            |op| format!("gcloud dataproc operations describe {}", op.name),
        )
        .await?;
        if inv.flags.no_wait {
            return Ok(CommandOutput::Operations(finished));
        }
        inv.console.status(&format!("Deleted [{link}]."));
        Ok(CommandOutput::Nothing)
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
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::collections::VecDeque;
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Default)]
    struct Script {
        replies: Mutex<VecDeque<Value>>,
        calls: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl Transport for Script {
        async fn execute(&self, call: &ApiCall) -> Result<Value> {
            self.calls
                .lock()
                .unwrap()
                .push(format!("{} {}", call.http_method, call.full_url()));
            Ok(self.replies.lock().unwrap().pop_front().unwrap_or_else(|| json!({})))
        }
    }

    async fn run(replies: Vec<Value>, store: PropertyStore, args: &[&str]) -> (i32, Captured, Vec<String>) {
        let (console, captured) = Console::scripted("", true);
        let transport = Arc::new(Script {
            replies: Mutex::new(replies.into()),
            calls: Mutex::default(),
        });
        let shared: Arc<dyn Transport> = transport.clone();
        let mut tree = CommandTree::new();
        register(&mut tree);
        let argv: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        let code = Runner::new(
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
        })
        .run(&argv)
        .await;
        let calls = transport.calls.lock().unwrap().clone();
        (code, captured, calls)
    }

    fn store() -> PropertyStore {
        let mut store = PropertyStore::in_memory(Env::new());
        store.set("core/project", "p1", Scope::User).unwrap();
        store
    }

    #[tokio::test]
    async fn test_list_region_from_property() {
        let mut store = store();
        store.set("dataproc/region", "europe-west1", Scope::User).unwrap();
        let replies = vec![json!({
            "clusters": [{ "clusterName": "etl", "status": { "state": "RUNNING" }, "config": { "workerConfig": { "numInstances": 2 } } }]
        })];
        let (code, captured, calls) = run(replies, store, &["dataproc", "clusters", "list"]).await;
        assert_eq!(code, 0, "{}", captured.stderr.contents());
        assert_eq!(
            calls,
            ["GET https://dataproc.googleapis.com/v1/projects/p1/regions/europe-west1/clusters"]
        );
        let out = captured.stdout.contents();
        assert!(out.starts_with("NAME"));
        assert!(out.contains("etl"));
        assert!(out.contains("RUNNING"));
    }

    #[tokio::test]
    async fn test_list_without_region_names_remedies() {
        let (code, captured, calls) = run(vec![], store(), &["dataproc", "clusters", "list", "-q"]).await;
        assert_eq!(code, 2);
        let stderr = captured.stderr.contents();
        assert!(stderr.contains("--region"));
        assert!(stderr.contains("dataproc/region"));
        assert!(calls.is_empty());
    }

    #[tokio::test]
    async fn test_delete_polls_longrunning_operation() {
        let op = "projects/p1/regions/us-central1/operations/abc";
        let replies = vec![
            json!({ "name": op, "metadata": { "status": { "state": "RUNNING" } } }),
            json!({ "name": op, "done": true, "response": {} }),
        ];
        let (code, captured, calls) = run(
            replies,
            store(),
            &["dataproc", "clusters", "delete", "etl", "--region=us-central1", "--quiet"],
        )
        .await;
        assert_eq!(code, 0, "{}", captured.stderr.contents());
        assert_eq!(
            calls,
            [
                "DELETE https://dataproc.googleapis.com/v1/projects/p1/regions/us-central1/clusters/etl".to_string(),
                format!("GET https://dataproc.googleapis.com/v1/{op}"),
            ]
        );
        assert!(captured
            .stderr
            .contents()
            .contains("Deleted [https://dataproc.googleapis.com/v1/projects/p1/regions/us-central1/clusters/etl]."));
    }
}
