//! Resource registry and references
//!
//! This module provides a data-driven catalogue of API collections. Each
//! collection is a URI template such as
//! `projects/{project}/zones/{zone}/instances/{instance}`; the registry turns
//! bare ids, relative names and full URLs into typed [`Reference`]s and back.
//!
//! # Architecture
//!
//! - [`registry`] - Loads collection definitions from embedded JSON and parses names
//! - [`reference`] - Immutable collection + parameter bindings and their name forms
//!
//! # Collection Definitions
//!
//! APIs are declared in JSON files under `src/resource/collections/`:
//! - `compute.json` - Compute Engine (instances, zones, operations, images)
//! - `pubsub.json` - Pub/Sub topics and subscriptions
//! - `dataproc.json` - Dataproc clusters and operations
//! - `cloudresourcemanager.json`, `storage.json`, `container.json` - parse-only catalogues
//!
//! # Example
//!
//! ```ignore
//! use gcloud_cli::resource::{ParseOptions, Registry};
//!
//! let registry = Registry::builtin()?;
//! let opts = ParseOptions::collection("compute.instances")
//!     .param("project", "my-project")
//!     .param("zone", "us-central1-a");
//! let vm = registry.parse("vm-1", &opts)?;
//! assert_eq!(vm.relative_name(), "projects/my-project/zones/us-central1-a/instances/vm-1");
//! ```

mod reference;
mod registry;

pub use reference::{Collection, Reference, Segment};
pub use registry::{ApiInfo, ParseOptions, Registry, ResourceError};
