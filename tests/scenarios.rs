//! End-to-end invocations against the scripted transport

mod common;

use common::Harness;
use gcloud_cli::error::{CliError, ErrorKind};
use serde_json::{json, Value};

const COMPUTE: &str = "https://compute.googleapis.com/compute/v1/";

fn compute_op(name: &str, status: &str, op_type: &str, target: &str) -> Value {
    json!({
        "kind": "compute#operation",
        "name": name,
        "status": status,
        "operationType": op_type,
        "targetLink": target,
        "selfLink": format!("{COMPUTE}projects/x/zones/us-central1-a/operations/{name}"),
    })
}

/// A relative name carries every parent, so no property is consulted
#[tokio::test]
async fn test_resolve_project_from_relative_name() {
    let instance = format!("{COMPUTE}projects/x/zones/us-central1-a/instances/i1");
    let harness = Harness::with_env(&[("CLOUDSDK_CORE_PROJECT", "ignored")]).answers("y\n");
    harness
        .transport
        .on("DELETE", &instance, Ok(compute_op("op-1", "DONE", "delete", &instance)));

    let out = harness
        .run(&["compute", "instances", "delete", "projects/x/zones/us-central1-a/instances/i1"])
        .await;

    assert_eq!(out.code, 0, "{}", out.stderr);
    assert_eq!(harness.transport.requests(), [format!("DELETE {instance}")]);
    assert!(out.stderr.contains(" - [i1] in [us-central1-a]"));
    assert!(out.stderr.contains(&format!("Deleted [{instance}].")));
}

#[tokio::test]
async fn test_list_stops_at_limit_across_pages() {
    let url = format!("{COMPUTE}projects/p/zones/z/instances");
    let page = |start: usize, count: usize, token: Option<&str>| {
        let items: Vec<Value> = (start..start + count).map(|i| json!({ "name": format!("vm-{i}") })).collect();
        match token {
            Some(token) => json!({ "items": items, "nextPageToken": token }),
            None => json!({ "items": items }),
        }
    };
    let harness = Harness::new().property("core/project", "p");
    harness
        .transport
        .on("GET", &url, Ok(page(0, 1000, Some("t"))))
        .on("GET", &url, Ok(page(1000, 235, None)));

    let out = harness
        .run(&[
            "compute", "instances", "list", "--zones=z", "--limit=1234", "--page-size=1000", "--format=value(name)",
        ])
        .await;

    assert_eq!(out.code, 0, "{}", out.stderr);
    let names: Vec<&str> = out.stdout.lines().collect();
    assert_eq!(names.len(), 1234);
    assert_eq!(names.first(), Some(&"vm-0"));
    assert_eq!(names.last(), Some(&"vm-1233"));
    assert!(!names.contains(&"vm-1234"));

    let requests = harness.transport.requests();
    assert_eq!(requests.len(), 2);
    assert_eq!(requests[0], format!("GET {url}?maxResults=1000"));
    assert!(requests[1].contains("pageToken=t"));
}

#[tokio::test]
async fn test_async_create_prints_operation_without_polling() {
    let harness = Harness::new().property("core/project", "p").property("compute/zone", "z");
    harness.transport.on(
        "POST",
        &format!("{COMPUTE}projects/p/zones/z/instances"),
        Ok(json!({ "name": "op/1", "done": false })),
    );

    let out = harness
        .run(&["compute", "instances", "create", "vm-1", "--async"])
        .await;

    assert_eq!(out.code, 0, "{}", out.stderr);
    assert_eq!(harness.transport.calls().len(), 1);
    assert!(out.stdout.contains("name: op/1"));
    assert!(out.stdout.contains("done: false"));
    assert!(out.stderr.contains("Operation [op/1] is running in the background."));
}

#[tokio::test]
async fn test_declined_confirmation_sends_no_delete() {
    let harness = Harness::new().property("core/project", "p").answers("n\n");

    let out = harness
        .run(&["compute", "instances", "delete", "vm-1", "--zone=z"])
        .await;

    assert_eq!(out.code, ErrorKind::Cancelled.exit_code());
    assert!(out.stderr.contains("aborted by user"));
    assert!(harness.transport.calls().is_empty());
}

#[tokio::test]
async fn test_billing_disabled_is_permission_error() {
    let body = json!({
        "error": {
            "code": 403,
            "message": "This API method requires billing to be enabled.",
            "status": "PERMISSION_DENIED",
            "errors": [{ "reason": "billingDisabled", "domain": "global" }]
        }
    })
    .to_string();
    let url = "https://pubsub.googleapis.com/v1/projects/p/topics";
    let harness = Harness::new().property("core/project", "p");
    harness
        .transport
        .on("GET", url, Err(CliError::from_http(403, &body, format!("GET {url}"))));

    let out = harness.run(&["pubsub", "topics", "list"]).await;

    assert_eq!(out.code, ErrorKind::PermissionDenied.exit_code());
    assert!(out.stderr.starts_with("ERROR: (gcloud.pubsub.topics.list) PERMISSION_DENIED:"));
    assert!(out.stderr.contains("billing enabled"));
}

#[tokio::test]
async fn test_filter_and_table_format() {
    let url = format!("{COMPUTE}projects/p/zones/z/instances");
    let harness = Harness::new().property("core/project", "p");
    harness.transport.on(
        "GET",
        &url,
        Ok(json!({
            "items": [
                { "name": "b-vm", "zone": "z", "state": "READY" },
                { "name": "a-vm", "zone": "z", "state": "STOPPED" },
                { "name": "c-vm", "zone": "z", "state": "READY" },
            ]
        })),
    );

    let args = [
        "compute", "instances", "list", "--zones=z", "--filter=state=READY", "--format=table(name,zone)",
    ];
    let first = harness.run(&args).await;
    assert_eq!(first.code, 0, "{}", first.stderr);
    let lines: Vec<&str> = first.stdout.lines().map(str::trim_end).collect();
    assert_eq!(lines, ["NAME  ZONE", "b-vm  z", "c-vm  z"]);

    harness.transport.on(
        "GET",
        &url,
        Ok(json!({
            "items": [
                { "name": "b-vm", "zone": "z", "state": "READY" },
                { "name": "a-vm", "zone": "z", "state": "STOPPED" },
                { "name": "c-vm", "zone": "z", "state": "READY" },
            ]
        })),
    );
    let second = harness.run(&args).await;
    assert_eq!(first.stdout, second.stdout);
}

#[tokio::test]
async fn test_zone_falls_back_to_property() {
    let instance = format!("{COMPUTE}projects/p/zones/us-east1-b/instances/vm-1");
    let harness = Harness::new()
        .property("core/project", "p")
        .property("compute/zone", "us-east1-b");
    harness
        .transport
        .on("GET", &instance, Ok(json!({ "name": "vm-1", "status": "RUNNING" })));

    let out = harness
        .run(&["compute", "instances", "describe", "vm-1", "--format=value(status)"])
        .await;

    assert_eq!(out.code, 0, "{}", out.stderr);
    assert_eq!(out.stdout, "RUNNING\n");
}

#[tokio::test]
async fn test_failed_operation_reports_details() {
    let instance = format!("{COMPUTE}projects/p/zones/z/instances/vm-1");
    let harness = Harness::new().property("core/project", "p");
    let mut failed = compute_op("op-9", "DONE", "insert", &instance);
    failed["error"] = json!({ "errors": [{ "code": "QUOTA_EXCEEDED", "message": "Quota 'CPUS' exceeded." }] });
    harness
        .transport
        .on("POST", &format!("{COMPUTE}projects/p/zones/z/instances"), Ok(failed));

    let out = harness
        .run(&["compute", "instances", "create", "vm-1", "--zone=z"])
        .await;

    assert_eq!(out.code, ErrorKind::OperationFailed.exit_code());
    assert!(out.stderr.contains("QUOTA_EXCEEDED: Quota 'CPUS' exceeded."));
}

#[tokio::test]
async fn test_endpoint_override_changes_request_host() {
    let harness = Harness::new()
        .property("core/project", "p")
        .property("api_endpoint_overrides/pubsub", "http://localhost:8085/v1/");
    harness.transport.on(
        "GET",
        "http://localhost:8085/v1/projects/p/topics",
        Ok(json!({ "topics": [{ "name": "projects/p/topics/t" }] })),
    );

    let out = harness
        .run(&["pubsub", "topics", "list", "--format=value(name)"])
        .await;

    assert_eq!(out.code, 0, "{}", out.stderr);
    assert_eq!(out.stdout, "projects/p/topics/t\n");
}
