//! GCP API interaction module
//!
//! This module provides the core functionality for talking to Google Cloud
//! APIs: authentication, the HTTP transport, retrying dispatch, long-running
//! operation polling and pagination.
//!
//! # Module Structure
//!
//! - [`auth`] - Access tokens from Application Default Credentials
//! - [`client`] - [`ApiCall`](client::ApiCall) and the [`Transport`](client::Transport) seam
//! - [`http`] - reqwest-backed transport
//! - [`retry`] - Exponential backoff with jitter
//! - [`dispatcher`] - Single calls and concurrent batches
//! - [`operations`] - Operation shapes and per-service pollers
//! - [`waiter`] - Polling loop with timeout, cancellation and progress
//! - [`lister`] - Lazy paginated item streams
//!
//! # Example
//!
//! ```ignore
//! use gcloud_cli::gcp::client::ApiCall;
//! use gcloud_cli::gcp::dispatcher::Dispatcher;
//!
//! async fn example(dispatcher: &Dispatcher) -> gcloud_cli::error::Result<()> {
//!     let call = ApiCall::get("compute", "instances.get", "https://compute.googleapis.com/compute/v1/projects/p/zones/z/instances/i");
//!     let instance = dispatcher.call(&call).await?;
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod client;
pub mod dispatcher;
pub mod http;
pub mod lister;
pub mod operations;
pub mod retry;
pub mod waiter;
