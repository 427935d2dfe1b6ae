//! Core of a Google Cloud command-line tool
//!
//! A command invocation flows through these layers:
//!
//! - [`cli`] routes argv through the command tree and binds flags
//! - [`properties`] supplies scoped defaults (flag, environment, workspace,
//!   user configuration, installation)
//! - [`concepts`] resolves resource arguments to canonical references using
//!   the collection catalogue in [`resource`]
//! - [`gcp`] sends API calls with retry, waits on long-running operations
//!   and pages through lists
//! - [`output`] filters, sorts, projects and prints the results
//! - [`console`] owns stdout, stderr and prompts; [`error`] maps every
//!   failure to one message and exit code
//!
//! The commands in [`surface`] are built on top of these layers.

pub mod cli;
pub mod concepts;
pub mod console;
pub mod error;
pub mod gcp;
pub mod output;
pub mod properties;
pub mod resource;
pub mod surface;

/// Version reported in the User-Agent header
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
