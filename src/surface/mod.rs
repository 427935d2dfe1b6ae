//! Built-in command groups
//!
//! Each submodule registers its groups and commands on the tree. Command
//! bodies only build [`ApiCall`](crate::gcp::client::ApiCall)s and hand
//! them to the dispatcher; resolution, confirmation and printing happen in
//! the runner.

pub mod compute;
pub mod config;
pub mod dataproc;
pub mod meta;
pub mod pubsub;

use crate::cli::{CommandTree, Invocation};
use crate::concepts::AttributeConfig;
use crate::error::Result;
use crate::gcp::operations::{Operation, OperationPoller};
use serde_json::Value;

pub fn register(tree: &mut CommandTree) {
    compute::register(tree);
    config::register(tree);
    dataproc::register(tree);
    meta::register(tree);
    pubsub::register(tree);
}

/// The project attribute every resource spec starts with. It has no flag of
/// its own; `--project` sets the property it falls back to.
pub(crate) fn project_attribute(param: &str) -> AttributeConfig {
    AttributeConfig::new("project", param, "Project ID of the Google Cloud project for the resource.")
        .property("core/project")
        .without_flag()
}

/// Last path segment of a URL or relative name
pub(crate) fn basename(value: &str) -> &str {
    value.rsplit('/').next().unwrap_or(value)
}

/// Wait for every operation among batch results, in order. Results that
/// are not operations pass through.
pub(crate) async fn finish_operations(
    inv: &Invocation<'_>,
    results: Vec<(String, Value)>,
    poller: &dyn OperationPoller,
    describe_command: impl Fn(&Operation) -> String,
) -> Result<Vec<Value>> {
    let mut finished = Vec::with_capacity(results.len());
    for (label, value) in results {
        match Operation::from_value(&value) {
            Some(op) => {
                let describe = describe_command(&op);
                finished.push(inv.finish(op, poller, &label, &describe).await?);
            }
            None => finished.push(value),
        }
    }
    Ok(finished)
}
