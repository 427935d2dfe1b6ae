//! `pubsub topics`

use super::project_attribute;
use crate::cli::{ArgSpec, ArgType, Command, CommandOutput, CommandTree, Invocation, ReleaseTrack};
use crate::concepts::{AttributeConfig, ResourceArg, ResourceSpec};
use crate::error::Result;
use crate::gcp::client::ApiCall;
use crate::gcp::dispatcher::{collect_batch, BatchMode};
use crate::gcp::lister::{list_items, ListRequest};
use futures::future::LocalBoxFuture;
use futures::{FutureExt, StreamExt};
use serde_json::{json, Value};

fn topic_spec() -> ResourceSpec {
    ResourceSpec::new("pubsub.projects.topics", "topic")
        .attribute(project_attribute("projectsId"))
        .attribute(AttributeConfig::new("topic", "topicsId", "Name of the topic."))
}

pub fn register(tree: &mut CommandTree) {
    let all = &ReleaseTrack::ALL;
    tree.add_group(&["pubsub"], "Manage Cloud Pub/Sub topics and subscriptions.", all)
        .add_group(&["pubsub", "topics"], "Manage Cloud Pub/Sub topics.", all)
        .add_command(&["pubsub", "topics", "list"], "List Cloud Pub/Sub topics.", all, list_command)
        .add_command(&["pubsub", "topics", "create"], "Create one or more Cloud Pub/Sub topics.", all, create_command)
        .add_command(&["pubsub", "topics", "delete"], "Delete one or more Cloud Pub/Sub topics.", all, delete_command);
}

fn list_command(_track: ReleaseTrack) -> Command {
    Command::new(list)
        .description("Lists all of the topics in the current project.")
        .format("table(name.basename():label=TOPIC_ID, messageRetentionDuration:label=RETENTION, name)")
}

fn list<'a>(inv: &'a Invocation<'a>) -> LocalBoxFuture<'a, Result<CommandOutput<'a>>> {
    async move {
        let project = inv.project()?;
        let base = inv.registry.base_url("pubsub", "v1")?;
        let call = ApiCall::get("pubsub", "projects.topics.list", format!("{base}projects/{project}/topics"));
        let request = ListRequest::new(call, "topics").page_size(inv.flags.page_size);
        Ok(CommandOutput::List(list_items(&inv.dispatcher, request).boxed_local()))
    }
    .boxed_local()
}

fn create_command(_track: ReleaseTrack) -> Command {
    Command::new(create)
        .description("Creates one or more Cloud Pub/Sub topics.")
        .resource(ResourceArg::plural(topic_spec(), "One or more topic IDs to create."))
        .arg(ArgSpec::flag("labels", ArgType::KeyValue, "List of label KEY=VALUE pairs to add."))
        .arg(ArgSpec::flag(
            "message-retention-duration",
            ArgType::Duration,
            "How long to retain unacknowledged messages, such as 7d or 10m.",
        ))
}

fn topic_body(inv: &Invocation<'_>) -> Value {
    let mut body = json!({});
    if let Some(labels) = inv.args.map("labels") {
        body["labels"] = json!(labels);
    }
    if let Some(retention) = inv.args.duration("message-retention-duration") {
        body["messageRetentionDuration"] = json!(format!("{}s", retention.as_secs()));
    }
    body
}

fn create<'a>(inv: &'a Invocation<'a>) -> LocalBoxFuture<'a, Result<CommandOutput<'a>>> {
    async move {
        let calls = inv
            .references("TOPIC")
            .into_iter()
            .map(|topic| {
                let call = ApiCall::put("pubsub", "projects.topics.create", topic.self_link(), topic_body(inv));
                (topic.relative_name(), call)
            })
            .collect();
        let (created, failure) = collect_batch(inv.dispatcher.batch(calls, BatchMode::CollectAll).await);
        for (name, _) in &created {
            inv.console.status(&format!("Created topic [{name}]."));
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(CommandOutput::Nothing),
        }
    }
    .boxed_local()
}

fn delete_command(_track: ReleaseTrack) -> Command {
    Command::new(delete)
        .description("Deletes one or more Cloud Pub/Sub topics.")
        .resource(ResourceArg::plural(topic_spec(), "One or more topic IDs to delete."))
        .destructive("deleted")
}

fn delete<'a>(inv: &'a Invocation<'a>) -> LocalBoxFuture<'a, Result<CommandOutput<'a>>> {
    async move {
        let calls = inv
            .references("TOPIC")
            .into_iter()
            .map(|topic| {
                let call = ApiCall::delete("pubsub", "projects.topics.delete", topic.self_link());
                (topic.relative_name(), call)
            })
            .collect();
        let (deleted, failure) = collect_batch(inv.dispatcher.batch(calls, BatchMode::CollectAll).await);
        for (name, _) in &deleted {
            inv.console.status(&format!("Deleted topic [{name}]."));
        }
        match failure {
            Some(err) => Err(err),
            None => Ok(CommandOutput::Nothing),
        }
    }
    .boxed_local()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::Runner;
    use crate::console::{Captured, Console};
    use crate::error::CliError;
    use crate::gcp::client::Transport;
    use crate::properties::{Env, PropertyStore};
    use crate::resource::Registry;
    use async_trait::async_trait;
    use std::sync::{Arc, Mutex};

    /// Fails requests for topics named `taken`
    #[derive(Default)]
    struct Topics {
        calls: Mutex<Vec<ApiCall>>,
    }

    #[async_trait]
    impl Transport for Topics {
        async fn execute(&self, call: &ApiCall) -> Result<Value> {
            self.calls.lock().unwrap().push(call.clone());
            if call.url.ends_with("/topics/taken") {
                return Err(CliError::from_http(
                    409,
                    r#"{"error":{"code":409,"message":"Resource already exists in the project","status":"ALREADY_EXISTS"}}"#,
                    format!("PUT {}", call.url),
                ));
            }
            if call.url.ends_with("/topics") {
                return Ok(json!({ "topics": [{ "name": "projects/p1/topics/t1" }, { "name": "projects/p1/topics/t2" }] }));
            }
            Ok(json!({ "name": call.url }))
        }
    }

    async fn run(answers: &str, args: &[&str]) -> (i32, Captured, Arc<Topics>) {
        let (console, captured) = Console::scripted(answers, true);
        let transport = Arc::new(Topics::default());
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
        .with_properties(PropertyStore::in_memory(Env::new()))
        .run(&argv)
        .await;
        (code, captured, transport)
    }

    #[tokio::test]
    async fn test_create_sends_labels_and_retention() {
        let (code, captured, transport) = run(
            "",
            &["pubsub", "topics", "create", "t1", "--project=p1", "--labels=team=data", "--message-retention-duration=1d"],
        )
        .await;
        assert_eq!(code, 0, "{}", captured.stderr.contents());
        let calls = transport.calls.lock().unwrap();
        assert_eq!(calls[0].url, "https://pubsub.googleapis.com/v1/projects/p1/topics/t1");
        let body = calls[0].body.as_ref().unwrap();
        assert_eq!(body["labels"]["team"], "data");
        assert_eq!(body["messageRetentionDuration"], "86400s");
        assert!(captured.stderr.contents().contains("Created topic [projects/p1/topics/t1]."));
    }

    #[tokio::test]
    async fn test_create_partial_failure_aggregates() {
        let (code, captured, transport) = run("", &["pubsub", "topics", "create", "t1", "taken", "--project=p1"]).await;
        assert_eq!(code, 6);
        assert_eq!(transport.calls.lock().unwrap().len(), 2);
        let stderr = captured.stderr.contents();
        assert!(stderr.contains("Created topic [projects/p1/topics/t1]."));
        assert!(stderr.contains("projects/p1/topics/taken"));
        assert!(stderr.contains("already exists"));
    }

    #[tokio::test]
    async fn test_list_prints_topic_ids() {
        let (code, captured, _) = run("", &["pubsub", "topics", "list", "--project=p1", "--format=value(name.basename())"]).await;
        assert_eq!(code, 0);
        assert_eq!(captured.stdout.contents(), "t1\nt2\n");
    }

    #[tokio::test]
    async fn test_delete_prompts_with_topic_names() {
        let (code, captured, transport) = run("y\n", &["pubsub", "topics", "delete", "projects/p2/topics/old"]).await;
        assert_eq!(code, 0, "{}", captured.stderr.contents());
        let stderr = captured.stderr.contents();
        assert!(stderr.contains("The following topics will be deleted:\n - [old]"));
        assert!(stderr.contains("Deleted topic [projects/p2/topics/old]."));
        assert_eq!(
            transport.calls.lock().unwrap()[0].url,
            "https://pubsub.googleapis.com/v1/projects/p2/topics/old"
        );
    }
}
