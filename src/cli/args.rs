//! Flag and positional binding
//!
//! Each command declares [`ArgSpec`]s; binding builds a clap command for
//! exactly those arguments, lets clap tokenise and check arity, then
//! converts every value to its declared [`ArgType`].

use super::arg_types::{convert, ArgType, ArgValue};
use crate::error::CliError;
use chrono::{DateTime, FixedOffset};
use clap::builder::ValueRange;
use clap::error::{ContextKind, ContextValue, ErrorKind as ClapErrorKind};
use clap::parser::ValueSource;
use clap::{Arg, ArgAction, ArgMatches};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Declaration of one flag or positional
#[derive(Debug, Clone)]
pub struct ArgSpec {
    /// Flag name without dashes (`zone`) or positional name (`INSTANCE`)
    pub name: String,
    pub positional: bool,
    pub kind: ArgType,
    pub help: String,
    pub required: bool,
    pub hidden: bool,
    /// Warning printed when the flag is used
    pub deprecated: Option<String>,
    /// Raw default, converted like a command-line value
    pub default: Option<String>,
    /// Positional accepting one or more values
    pub plural: bool,
    pub short: Option<char>,
    /// Bool flag that also accepts `--no-<name>`
    pub negatable: bool,
}

impl ArgSpec {
    pub fn flag(name: &str, kind: ArgType, help: &str) -> Self {
        Self {
            name: name.to_string(),
            positional: false,
            kind,
            help: help.to_string(),
            required: false,
            hidden: false,
            deprecated: None,
            default: None,
            plural: false,
            short: None,
            negatable: false,
        }
    }

    pub fn positional(name: &str, help: &str) -> Self {
        Self {
            positional: true,
            ..Self::flag(name, ArgType::String, help)
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn hidden(mut self) -> Self {
        self.hidden = true;
        self
    }

    pub fn deprecated(mut self, warning: &str) -> Self {
        self.deprecated = Some(warning.to_string());
        self
    }

    pub fn default_value(mut self, value: &str) -> Self {
        self.default = Some(value.to_string());
        self
    }

    pub fn plural(mut self) -> Self {
        self.plural = true;
        self
    }

    pub fn short(mut self, c: char) -> Self {
        self.short = Some(c);
        self
    }

    pub fn negatable(mut self) -> Self {
        self.negatable = true;
        self
    }

    /// How the argument is named in messages: `--zone` or `INSTANCE`
    pub fn display_name(&self) -> String {
        if self.positional {
            self.name.clone()
        } else {
            format!("--{}", self.name)
        }
    }

    /// Usage fragment: `--zone=ZONE`, `--[no-]async`, `INSTANCE [INSTANCE ...]`
    pub fn usage(&self) -> String {
        if self.positional {
            return if self.plural {
                format!("{0} [{0} ...]", self.name)
            } else {
                self.name.clone()
            };
        }
        match self.kind {
            ArgType::Bool if self.negatable => format!("--[no-]{}", self.name),
            ArgType::Bool => format!("--{}", self.name),
            ref kind => format!("--{}={}", self.name, kind.metavar(&self.name)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    /// At most one member may be given
    MutuallyExclusive,
    /// At least one member must be given
    AtLeastOne,
}

#[derive(Debug, Clone)]
pub struct ArgGroup {
    pub kind: GroupKind,
    /// Member argument names
    pub members: Vec<String>,
    /// For mutually exclusive groups: exactly one is required
    pub required: bool,
}

impl ArgGroup {
    pub fn mutex(members: &[&str]) -> Self {
        Self {
            kind: GroupKind::MutuallyExclusive,
            members: members.iter().map(|m| m.to_string()).collect(),
            required: false,
        }
    }

    pub fn at_least_one(members: &[&str]) -> Self {
        Self {
            kind: GroupKind::AtLeastOne,
            required: true,
            ..Self::mutex(members)
        }
    }

    pub fn required(mut self) -> Self {
        self.required = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ArgumentError {
    #[error("unrecognized arguments: {arg}{}", suggestion.as_ref().map(|s| format!(" (did you mean '{s}'?)")).unwrap_or_default())]
    Unknown { arg: String, suggestion: Option<String> },
    #[error("argument {first}: At most one of {first} | {second} can be specified.")]
    Conflicting { first: String, second: String },
    #[error("argument {0}: Must be specified.")]
    Required(String),
    #[error("argument {arg}: Invalid choice: '{value}'. Valid choices are [{}].", choices.join(", "))]
    InvalidChoice {
        arg: String,
        value: String,
        choices: Vec<String>,
    },
    #[error("argument {arg}: {reason}")]
    Invalid { arg: String, reason: String },
}

impl From<ArgumentError> for CliError {
    fn from(err: ArgumentError) -> Self {
        CliError::argument(err.to_string())
    }
}

/// Typed values bound for one invocation
#[derive(Debug, Clone, Default)]
pub struct ParsedArgs {
    values: BTreeMap<String, ArgValue>,
    specified: BTreeSet<String>,
    /// Deprecation notices for flags that were used
    pub warnings: Vec<String>,
}

impl ParsedArgs {
    pub fn insert(&mut self, name: &str, value: ArgValue) {
        self.specified.insert(name.to_string());
        self.values.insert(name.to_string(), value);
    }

    pub fn get(&self, name: &str) -> Option<&ArgValue> {
        self.values.get(name)
    }

    /// Whether the user gave the argument, as opposed to a default applying
    pub fn is_specified(&self, name: &str) -> bool {
        self.specified.contains(name)
    }

    pub fn string(&self, name: &str) -> Option<&str> {
        match self.values.get(name)? {
            ArgValue::Str(s) => Some(s),
            _ => None,
        }
    }

    /// List values, a plural positional, or a single string as one item
    pub fn strings(&self, name: &str) -> Vec<String> {
        match self.values.get(name) {
            Some(ArgValue::List(items)) => items.clone(),
            Some(ArgValue::Str(s)) => vec![s.clone()],
            _ => Vec::new(),
        }
    }

    pub fn int(&self, name: &str) -> Option<i64> {
        match self.values.get(name)? {
            ArgValue::Int(n) => Some(*n),
            _ => None,
        }
    }

    pub fn bool(&self, name: &str) -> Option<bool> {
        match self.values.get(name)? {
            ArgValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// True only when the flag is set
    pub fn flag(&self, name: &str) -> bool {
        self.bool(name).unwrap_or(false)
    }

    pub fn duration(&self, name: &str) -> Option<Duration> {
        match self.values.get(name)? {
            ArgValue::Duration(d) => Some(*d),
            _ => None,
        }
    }

    pub fn datetime(&self, name: &str) -> Option<DateTime<FixedOffset>> {
        match self.values.get(name)? {
            ArgValue::DateTime(ts) => Some(*ts),
            _ => None,
        }
    }

    pub fn path(&self, name: &str) -> Option<&PathBuf> {
        match self.values.get(name)? {
            ArgValue::Path(p) => Some(p),
            _ => None,
        }
    }

    pub fn bytes(&self, name: &str) -> Option<u64> {
        match self.values.get(name)? {
            ArgValue::Bytes(n) => Some(*n),
            _ => None,
        }
    }

    pub fn map(&self, name: &str) -> Option<&BTreeMap<String, String>> {
        match self.values.get(name)? {
            ArgValue::Map(m) => Some(m),
            _ => None,
        }
    }
}

fn negated_id(name: &str) -> String {
    format!("no-{name}")
}

fn build_command(specs: &[ArgSpec], groups: &[ArgGroup]) -> clap::Command {
    let mut cmd = clap::Command::new("gcloud")
        .no_binary_name(true)
        .disable_help_flag(true)
        .disable_version_flag(true)
        .disable_help_subcommand(true);

    let mut index = 1;
    for spec in specs {
        if spec.positional {
            let arity: ValueRange = if spec.plural { (1..).into() } else { 1.into() };
            let arg = Arg::new(spec.name.clone())
                .index(index)
                .value_name(spec.name.clone())
                .required(spec.required && spec.default.is_none())
                .action(ArgAction::Append)
                .num_args(arity);
            index += 1;
            cmd = cmd.arg(arg);
            continue;
        }

        let mut arg = Arg::new(spec.name.clone())
            .long(spec.name.clone())
            .hide(spec.hidden);
        if let Some(short) = spec.short {
            arg = arg.short(short);
        }
        if spec.kind == ArgType::Bool {
            arg = arg.action(ArgAction::SetTrue);
            if spec.negatable {
                arg = arg.overrides_with(negated_id(&spec.name));
                cmd = cmd.arg(
                    Arg::new(negated_id(&spec.name))
                        .long(negated_id(&spec.name))
                        .action(ArgAction::SetTrue)
                        .hide(true)
                        .overrides_with(spec.name.clone()),
                );
            }
        } else {
            // Repeated scalar flags keep the last value
            arg = arg
                .action(ArgAction::Append)
                .num_args(1)
                .value_name(spec.kind.metavar(&spec.name))
                .required(spec.required && spec.default.is_none());
        }
        cmd = cmd.arg(arg);
    }

    for (i, group) in groups.iter().enumerate() {
        cmd = cmd.group(
            clap::ArgGroup::new(format!("group-{i}"))
                .args(group.members.clone())
                .multiple(group.kind == GroupKind::AtLeastOne)
                .required(group.required),
        );
    }
    cmd
}

fn context(err: &clap::Error, kind: ContextKind) -> Option<String> {
    match err.get(kind)? {
        ContextValue::String(s) => Some(s.clone()),
        ContextValue::Strings(v) => Some(v.join(" | ")),
        other => Some(other.to_string()),
    }
}

/// `--zone <ZONE>` -> `--zone`, `<INSTANCE>` -> `INSTANCE`
fn bare_arg_name(rendered: &str) -> String {
    rendered
        .split(" | ")
        .map(|part| {
            let first = part.split_whitespace().next().unwrap_or(part);
            first
                .trim_start_matches('<')
                .trim_end_matches('>')
                .trim_end_matches("...")
                .trim_end_matches('>')
                .to_string()
        })
        .collect::<Vec<_>>()
        .join(" | ")
}

fn map_clap_error(err: clap::Error) -> ArgumentError {
    let arg = context(&err, ContextKind::InvalidArg)
        .map(|a| bare_arg_name(&a))
        .unwrap_or_default();
    match err.kind() {
        ClapErrorKind::UnknownArgument => ArgumentError::Unknown {
            arg,
            suggestion: context(&err, ContextKind::SuggestedArg),
        },
        ClapErrorKind::ArgumentConflict => ArgumentError::Conflicting {
            first: arg,
            second: context(&err, ContextKind::PriorArg)
                .map(|a| bare_arg_name(&a))
                .unwrap_or_default(),
        },
        ClapErrorKind::MissingRequiredArgument => ArgumentError::Required(arg),
        ClapErrorKind::InvalidValue if context(&err, ContextKind::ValidValue).is_some() => {
            ArgumentError::InvalidChoice {
                arg,
                value: context(&err, ContextKind::InvalidValue).unwrap_or_default(),
                choices: context(&err, ContextKind::ValidValue)
                    .map(|v| v.split(" | ").map(String::from).collect())
                    .unwrap_or_default(),
            }
        }
        _ => {
            let rendered = err.render().to_string();
            let reason = rendered
                .lines()
                .next()
                .unwrap_or_default()
                .trim_start_matches("error: ")
                .to_string();
            ArgumentError::Invalid { arg, reason }
        }
    }
}

fn from_command_line(matches: &ArgMatches, id: &str) -> bool {
    matches.value_source(id) == Some(ValueSource::CommandLine)
}

/// Bind `argv` (everything after the command path) against `specs`
pub fn parse(specs: &[ArgSpec], groups: &[ArgGroup], argv: &[String]) -> Result<ParsedArgs, ArgumentError> {
    let matches = build_command(specs, groups)
        .try_get_matches_from(argv)
        .map_err(map_clap_error)?;

    let mut parsed = ParsedArgs::default();
    for spec in specs {
        let given = from_command_line(&matches, &spec.name);

        if spec.kind == ArgType::Bool && !spec.positional {
            let negated = spec.negatable && from_command_line(&matches, &negated_id(&spec.name));
            if given || negated {
                parsed.insert(&spec.name, ArgValue::Bool(given));
            } else if let Some(default) = &spec.default {
                let value = convert(&spec.kind, std::slice::from_ref(default))
                    .map_err(|reason| ArgumentError::Invalid {
                        arg: spec.display_name(),
                        reason,
                    })?;
                parsed.values.insert(spec.name.clone(), value);
            }
        } else {
            let raw: Vec<String> = if given {
                matches
                    .get_many::<String>(&spec.name)
                    .map(|values| values.cloned().collect())
                    .unwrap_or_default()
            } else {
                Vec::new()
            };
            let raw = match (raw.is_empty(), &spec.default) {
                (false, _) => raw,
                (true, Some(default)) => vec![default.clone()],
                (true, None) => continue,
            };

            if let ArgType::Choice(choices) = spec.kind {
                if let Some(bad) = raw.iter().find(|v| !choices.contains(&v.as_str())) {
                    return Err(ArgumentError::InvalidChoice {
                        arg: spec.display_name(),
                        value: bad.clone(),
                        choices: choices.iter().map(|c| c.to_string()).collect(),
                    });
                }
            }

            let value = if spec.positional && spec.plural {
                ArgValue::List(raw)
            } else {
                convert(&spec.kind, &raw).map_err(|reason| ArgumentError::Invalid {
                    arg: spec.display_name(),
                    reason,
                })?
            };
            if given {
                parsed.insert(&spec.name, value);
            } else {
                parsed.values.insert(spec.name.clone(), value);
            }
        }

        if given {
            if let Some(warning) = &spec.deprecated {
                tracing::warn!("Deprecated flag {} used", spec.display_name());
                parsed
                    .warnings
                    .push(format!("Flag {} is deprecated. {}", spec.display_name(), warning));
            }
        }
    }
    Ok(parsed)
}
