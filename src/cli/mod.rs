//! Command-line surface
//!
//! # Module Structure
//!
//! - [`tree`] - Group/command registration and release-track visibility
//! - [`args`] - Flag and positional binding on top of clap
//! - [`arg_types`] - Typed value conversion (sizes, durations, lists, ...)
//! - [`flags`] - Flags every command accepts
//! - [`help`] - Help text for groups and commands
//! - [`runner`] - One invocation from argv to exit code

pub mod arg_types;
pub mod args;
pub mod flags;
pub mod help;
pub mod runner;
pub mod tree;

pub use arg_types::{ArgType, ArgValue};
pub use args::{ArgGroup, ArgSpec, ArgumentError, GroupKind, ParsedArgs};
pub use flags::UniversalFlags;
pub use runner::{http_transport, Invocation, Runner, TransportFactory};
pub use tree::{Command, CommandOutput, CommandTree, ReleaseTrack};
