//! Command tree
//!
//! Groups and commands are registered once at startup, keyed by their path
//! below the root. Each node lists the release tracks it is visible on; a
//! node is reachable on a track only if every ancestor is too.

use super::arg_types::ArgType;
use super::args::{ArgGroup, ArgSpec};
use super::runner::Invocation;
use crate::concepts::{FallThrough, ResourceArg, Surface};
use crate::error::Result;
use futures::future::LocalBoxFuture;
use futures::stream::LocalBoxStream;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ReleaseTrack {
    Ga,
    Beta,
    Alpha,
}

impl ReleaseTrack {
    pub const ALL: [ReleaseTrack; 3] = [ReleaseTrack::Ga, ReleaseTrack::Beta, ReleaseTrack::Alpha];

    /// Leading command-line token selecting the track
    pub fn prefix(self) -> Option<&'static str> {
        match self {
            Self::Ga => None,
            Self::Beta => Some("beta"),
            Self::Alpha => Some("alpha"),
        }
    }

    pub fn from_prefix(token: &str) -> Option<Self> {
        match token {
            "beta" => Some(Self::Beta),
            "alpha" => Some(Self::Alpha),
            _ => None,
        }
    }
}

impl fmt::Display for ReleaseTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Ga => "GA",
            Self::Beta => "BETA",
            Self::Alpha => "ALPHA",
        };
        f.write_str(s)
    }
}

/// What a command body hands to the output pipeline
pub enum CommandOutput<'a> {
    /// One resource, printed as a single record
    Resource(Value),
    /// A fixed set of records
    Resources(Vec<Value>),
    /// Lazily fetched records
    List(LocalBoxStream<'a, Result<Value>>),
    /// Operations left running under `--async`, printed as YAML unless
    /// `--format` says otherwise
    Operations(Vec<Value>),
    Nothing,
}

pub type Action = for<'a> fn(&'a Invocation<'a>) -> LocalBoxFuture<'a, Result<CommandOutput<'a>>>;

/// A leaf command as instantiated for one release track
pub struct Command {
    pub description: Option<String>,
    pub args: Vec<ArgSpec>,
    pub groups: Vec<ArgGroup>,
    pub resources: Vec<ResourceArg>,
    pub default_format: String,
    /// Past participle for the confirmation prompt of destructive commands
    pub confirm: Option<String>,
    pub action: Action,
}

impl Command {
    pub fn new(action: Action) -> Self {
        Self {
            description: None,
            args: Vec::new(),
            groups: Vec::new(),
            resources: Vec::new(),
            default_format: "yaml".to_string(),
            confirm: None,
            action,
        }
    }

    pub fn description(mut self, text: &str) -> Self {
        self.description = Some(text.to_string());
        self
    }

    pub fn arg(mut self, spec: ArgSpec) -> Self {
        self.args.push(spec);
        self
    }

    pub fn group(mut self, group: ArgGroup) -> Self {
        self.groups.push(group);
        self
    }

    pub fn resource(mut self, arg: ResourceArg) -> Self {
        self.resources.push(arg);
        self
    }

    pub fn format(mut self, spec: &str) -> Self {
        self.default_format = spec.to_string();
        self
    }

    /// Ask before running; `verb` completes "will be ..."
    pub fn destructive(mut self, verb: &str) -> Self {
        self.confirm = Some(verb.to_string());
        self
    }

    /// Command arguments followed by those generated for resource
    /// arguments. Attribute flags shared between resource arguments appear
    /// once.
    pub fn arg_specs(&self) -> Vec<ArgSpec> {
        let mut specs: Vec<ArgSpec> = Vec::new();
        for arg in &self.resources {
            for spec in resource_arg_specs(arg) {
                if !specs.iter().any(|s| s.name == spec.name) {
                    specs.push(spec);
                }
            }
        }
        for spec in &self.args {
            if !specs.iter().any(|s| s.name == spec.name) {
                specs.push(spec.clone());
            }
        }
        specs
    }
}

fn resource_arg_specs(arg: &ResourceArg) -> Vec<ArgSpec> {
    let leaf = arg.leaf_arg_name();
    let mut specs = Vec::new();
    match arg.surface {
        Surface::Positional { plural } => {
            let mut spec = ArgSpec::positional(&leaf, &arg.help);
            spec.plural = plural;
            spec.required = arg.required;
            specs.push(spec);
        }
        Surface::Flag => specs.push(ArgSpec::flag(&leaf, ArgType::String, &arg.help)),
    }
    for attr in arg.attribute_flags() {
        let mut help = attr.help.clone();
        let property = attr.fallthroughs.iter().find_map(|f| match f {
            FallThrough::Property(key) => Some(key.as_str()),
            _ => None,
        });
        if let Some(key) = property {
            help.push_str(&format!(
                " Overrides the default {key} property value for this command invocation."
            ));
        }
        specs.push(ArgSpec::flag(&attr.name, ArgType::String, &help));
    }
    specs
}

pub type CommandBuilder = fn(ReleaseTrack) -> Command;

#[derive(Clone, Copy)]
pub enum NodeKind {
    Group,
    Command(CommandBuilder),
}

pub struct Node {
    pub name: String,
    pub help: String,
    pub tracks: Vec<ReleaseTrack>,
    pub kind: NodeKind,
}

impl Node {
    pub fn is_group(&self) -> bool {
        matches!(self.kind, NodeKind::Group)
    }
}

/// Registration table of every group and command
pub struct CommandTree {
    nodes: BTreeMap<Vec<String>, Node>,
}

impl Default for CommandTree {
    fn default() -> Self {
        Self::new()
    }
}

fn to_path(path: &[&str]) -> Vec<String> {
    path.iter().map(|s| s.to_string()).collect()
}

impl CommandTree {
    /// A tree holding only the root group
    pub fn new() -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert(
            Vec::new(),
            Node {
                name: "gcloud".to_string(),
                help: "Manage Google Cloud resources and developer workflow.".to_string(),
                tracks: ReleaseTrack::ALL.to_vec(),
                kind: NodeKind::Group,
            },
        );
        Self { nodes }
    }

    /// The root plus every built-in command
    pub fn builtin() -> Self {
        let mut tree = Self::new();
        crate::surface::register(&mut tree);
        tree
    }

    pub fn add_group(&mut self, path: &[&str], help: &str, tracks: &[ReleaseTrack]) -> &mut Self {
        self.insert(path, help, tracks, NodeKind::Group)
    }

    pub fn add_command(
        &mut self,
        path: &[&str],
        help: &str,
        tracks: &[ReleaseTrack],
        build: CommandBuilder,
    ) -> &mut Self {
        self.insert(path, help, tracks, NodeKind::Command(build))
    }

    fn insert(&mut self, path: &[&str], help: &str, tracks: &[ReleaseTrack], kind: NodeKind) -> &mut Self {
        let key = to_path(path);
        debug_assert!(
            key.split_last()
                .is_some_and(|(_, parent)| self.nodes.get(parent).is_some_and(Node::is_group)),
            "parent group of {key:?} must be registered first"
        );
        self.nodes.insert(
            key,
            Node {
                name: path.last().map(|s| s.to_string()).unwrap_or_default(),
                help: help.to_string(),
                tracks: tracks.to_vec(),
                kind,
            },
        );
        self
    }

    pub fn node(&self, path: &[String]) -> Option<&Node> {
        self.nodes.get(path)
    }

    /// Whether the node and all of its ancestors exist on `track`
    pub fn is_visible(&self, path: &[String], track: ReleaseTrack) -> bool {
        (0..=path.len()).all(|n| {
            self.nodes
                .get(&path[..n])
                .is_some_and(|node| node.tracks.contains(&track))
        })
    }

    /// Visible immediate children, by name
    pub fn children(&self, path: &[String], track: ReleaseTrack) -> Vec<&Node> {
        self.nodes
            .iter()
            .filter(|(key, node)| {
                key.len() == path.len() + 1 && key.starts_with(path) && node.tracks.contains(&track)
            })
            .map(|(_, node)| node)
            .collect()
    }

    /// Every visible node below the root, parents before children
    pub fn walk(&self, track: ReleaseTrack) -> Vec<(&[String], &Node)> {
        self.nodes
            .iter()
            .filter(|(key, _)| !key.is_empty() && self.is_visible(key, track))
            .map(|(key, node)| (key.as_slice(), node))
            .collect()
    }

    /// Instantiate the command at `path` for `track`
    pub fn command(&self, path: &[String], track: ReleaseTrack) -> Option<Command> {
        if !self.is_visible(path, track) {
            return None;
        }
        match self.nodes.get(path)?.kind {
            NodeKind::Command(build) => Some(build(track)),
            NodeKind::Group => None,
        }
    }

    /// Children of `path` whose name is close to `name`
    pub fn suggest(&self, path: &[String], track: ReleaseTrack, name: &str) -> Vec<String> {
        self.children(path, track)
            .into_iter()
            .filter(|node| node.name.starts_with(name) || edit_distance(&node.name, name) <= 2)
            .map(|node| node.name.clone())
            .collect()
    }
}

fn edit_distance(a: &str, b: &str) -> usize {
    let b: Vec<char> = b.chars().collect();
    let mut row: Vec<usize> = (0..=b.len()).collect();
    for (i, ca) in a.chars().enumerate() {
        let mut prev = row[0];
        row[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let current = row[j + 1];
            row[j + 1] = if ca == *cb {
                prev
            } else {
                1 + prev.min(row[j]).min(row[j + 1])
            };
            prev = current;
        }
    }
    row[b.len()]
}

/// Full dotted command path for messages: `gcloud.beta.compute.instances.list`
pub fn dotted_path(track: ReleaseTrack, path: &[String]) -> String {
    let mut parts = vec!["gcloud".to_string()];
    parts.extend(track.prefix().map(String::from));
    parts.extend(path.iter().cloned());
    parts.join(".")
}

/// Command line prefix for help: `gcloud beta compute instances`
pub fn command_line(track: ReleaseTrack, path: &[String]) -> String {
    dotted_path(track, path).replace('.', " ")
}
