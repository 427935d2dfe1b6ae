//! `config` and `config configurations`
//!
//! These commands never call an API; they read and rewrite the property
//! files behind the invocation's store.

use crate::cli::{ArgSpec, ArgType, Command, CommandOutput, CommandTree, Invocation, ReleaseTrack};
use crate::error::Result;
use crate::properties::configurations::{self, ConfigPaths, Configuration};
use crate::properties::{normalize_key, PropertyError, Scope};
use futures::future::LocalBoxFuture;
use futures::FutureExt;
use serde_json::{json, Map, Value};
use std::collections::BTreeMap;

pub fn register(tree: &mut CommandTree) {
    let all = &ReleaseTrack::ALL;
    tree.add_group(&["config"], "View and edit Google Cloud CLI properties.", all)
        .add_command(&["config", "get"], "Print the value of a property.", all, get_command)
        .add_command(&["config", "set"], "Set a property.", all, set_command)
        .add_command(&["config", "unset"], "Unset a property.", all, unset_command)
        .add_command(&["config", "list"], "List properties of the active configuration.", all, list_command)
        .add_group(&["config", "configurations"], "Manage the set of named configurations.", all)
        .add_command(
            &["config", "configurations", "create"],
            "Create a new named configuration.",
            all,
            create_command,
        )
        .add_command(
            &["config", "configurations", "activate"],
            "Activate an existing named configuration.",
            all,
            activate_command,
        )
        .add_command(&["config", "configurations", "list"], "List existing named configurations.", all, configurations_list_command)
        .add_command(
            &["config", "configurations", "describe"],
            "Describe a named configuration by listing its properties.",
            all,
            describe_command,
        )
        .add_command(&["config", "configurations", "delete"], "Delete named configurations.", all, delete_command);
}

/// Scope a write goes to
fn write_scope(inv: &Invocation<'_>) -> Scope {
    if inv.args.flag("installation") {
        Scope::Installation
    } else {
        Scope::User
    }
}

fn installation_flag() -> ArgSpec {
    ArgSpec::flag(
        "installation",
        ArgType::Bool,
        "Update the property in the installation properties file instead of the active configuration.",
    )
}

fn paths<'a>(inv: &'a Invocation<'a>) -> Result<&'a ConfigPaths> {
    Ok(inv
        .properties
        .paths()
        .ok_or(PropertyError::ScopeUnavailable(Scope::User))?)
}

/// `{"core/project": "p"}` -> `{"core": {"project": "p"}}`
fn nest_by_section<'k>(props: impl IntoIterator<Item = (&'k String, &'k String)>) -> Value {
    let mut sections: BTreeMap<&str, Map<String, Value>> = BTreeMap::new();
    for (key, value) in props {
        if let Some((section, name)) = key.split_once('/') {
            sections
                .entry(section)
                .or_default()
                .insert(name.to_string(), json!(value));
        }
    }
    Value::Object(
        sections
            .into_iter()
            .map(|(section, names)| (section.to_string(), Value::Object(names)))
            .collect(),
    )
}

// =============================================================================
// get / set / unset / list
// =============================================================================

fn get_command(_track: ReleaseTrack) -> Command {
    Command::new(get)
        .description("Prints the value of a property. An unset property prints (unset) to stderr.")
        .arg(ArgSpec::positional("SECTION/PROPERTY", "The property to print, such as core/project."))
        .format("value(value)")
}

fn get<'a>(inv: &'a Invocation<'a>) -> LocalBoxFuture<'a, Result<CommandOutput<'a>>> {
    async move {
        let key = normalize_key(inv.args.string("SECTION/PROPERTY").unwrap_or_default());
        crate::properties::lookup(&key)?;
        match inv.properties.get(&key) {
            Some(value) => Ok(CommandOutput::Resource(json!({ "key": key, "value": value }))),
            None => {
                inv.console.status("(unset)");
                Ok(CommandOutput::Nothing)
            }
        }
    }
    .boxed_local()
}

fn set_command(_track: ReleaseTrack) -> Command {
    Command::new(set)
        .description("Sets the specified property in the active configuration.")
        .arg(ArgSpec::positional("SECTION/PROPERTY", "The property to set, such as compute/zone."))
        .arg(ArgSpec::positional("VALUE", "The value to set the property to."))
        .arg(installation_flag())
}

fn set<'a>(inv: &'a Invocation<'a>) -> LocalBoxFuture<'a, Result<CommandOutput<'a>>> {
    async move {
        let key = normalize_key(inv.args.string("SECTION/PROPERTY").unwrap_or_default());
        let value = inv.args.string("VALUE").unwrap_or_default();
        let mut store = inv.properties.clone();
        store.persist(&key, Some(value), write_scope(inv))?;
        inv.console.status(&format!("Updated property [{key}]."));
        Ok(CommandOutput::Nothing)
    }
    .boxed_local()
}

fn unset_command(_track: ReleaseTrack) -> Command {
    Command::new(unset)
        .description("Unsets the specified property in the active configuration.")
        .arg(ArgSpec::positional("SECTION/PROPERTY", "The property to unset, such as compute/zone."))
        .arg(installation_flag())
}

fn unset<'a>(inv: &'a Invocation<'a>) -> LocalBoxFuture<'a, Result<CommandOutput<'a>>> {
    async move {
        let key = normalize_key(inv.args.string("SECTION/PROPERTY").unwrap_or_default());
        let mut store = inv.properties.clone();
        store.persist(&key, None, write_scope(inv))?;
        inv.console.status(&format!("Unset property [{key}]."));
        Ok(CommandOutput::Nothing)
    }
    .boxed_local()
}

fn list_command(_track: ReleaseTrack) -> Command {
    Command::new(list)
        .description("Lists the effective properties, grouped by section. Defaults are shown with --all.")
        .arg(ArgSpec::flag("all", ArgType::Bool, "List all set and unset properties that have defaults."))
}

fn list<'a>(inv: &'a Invocation<'a>) -> LocalBoxFuture<'a, Result<CommandOutput<'a>>> {
    async move {
        let show_defaults = inv.args.flag("all");
        let effective: BTreeMap<String, String> = inv
            .properties
            .all()
            .into_iter()
            .filter(|(_, (_, scope))| show_defaults || *scope != Scope::Default)
            .map(|(key, (value, _))| (key, value))
            .collect();
        inv.console.status(&format!(
            "Your active configuration is: [{}]",
            inv.properties.active_configuration()
        ));
        Ok(CommandOutput::Resource(nest_by_section(&effective)))
    }
    .boxed_local()
}

// =============================================================================
// configurations
// =============================================================================

fn configuration_record(config: &Configuration) -> Value {
    json!({
        "name": config.name,
        "is_active": config.is_active,
        "properties": nest_by_section(&config.properties),
    })
}

fn create_command(_track: ReleaseTrack) -> Command {
    Command::new(create)
        .description("Creates a new named configuration and, unless --no-activate is given, activates it.")
        .arg(ArgSpec::positional("CONFIGURATION_NAME", "Name of the configuration to create."))
        .arg(
            ArgSpec::flag("activate", ArgType::Bool, "Activate the configuration after creating it.")
                .negatable()
                .default_value("true"),
        )
}

fn create<'a>(inv: &'a Invocation<'a>) -> LocalBoxFuture<'a, Result<CommandOutput<'a>>> {
    async move {
        let name = inv.args.string("CONFIGURATION_NAME").unwrap_or_default();
        let activate = inv.args.flag("activate");
        configurations::create(paths(inv)?, name, activate)?;
        inv.console.status(&format!("Created [{name}]."));
        if activate {
            inv.console.status(&format!("Activated [{name}]."));
        }
        Ok(CommandOutput::Nothing)
    }
    .boxed_local()
}

fn activate_command(_track: ReleaseTrack) -> Command {
    Command::new(activate)
        .description("Activates an existing named configuration.")
        .arg(ArgSpec::positional("CONFIGURATION_NAME", "Name of the configuration to activate."))
}

fn activate<'a>(inv: &'a Invocation<'a>) -> LocalBoxFuture<'a, Result<CommandOutput<'a>>> {
    async move {
        let name = inv.args.string("CONFIGURATION_NAME").unwrap_or_default();
        configurations::activate(paths(inv)?, name)?;
        inv.console.status(&format!("Activated [{name}]."));
        Ok(CommandOutput::Nothing)
    }
    .boxed_local()
}

fn configurations_list_command(_track: ReleaseTrack) -> Command {
    Command::new(configurations_list)
        .description("Lists existing named configurations.")
        .format(
            "table(name, is_active.yesno(True, False):label=IS_ACTIVE, \
             properties.core.account:label=ACCOUNT, properties.core.project:label=PROJECT, \
             properties.compute.zone:label=COMPUTE_DEFAULT_ZONE, \
             properties.compute.region:label=COMPUTE_DEFAULT_REGION)",
        )
}

fn configurations_list<'a>(inv: &'a Invocation<'a>) -> LocalBoxFuture<'a, Result<CommandOutput<'a>>> {
    async move {
        let records = configurations::list(paths(inv)?, inv.properties.active_configuration())
            .iter()
            .map(configuration_record)
            .collect();
        Ok(CommandOutput::Resources(records))
    }
    .boxed_local()
}

fn describe_command(_track: ReleaseTrack) -> Command {
    Command::new(describe)
        .description("Describes a named configuration by listing its properties.")
        .arg(ArgSpec::positional("CONFIGURATION_NAME", "Name of the configuration to describe."))
}

fn describe<'a>(inv: &'a Invocation<'a>) -> LocalBoxFuture<'a, Result<CommandOutput<'a>>> {
    async move {
        let name = inv.args.string("CONFIGURATION_NAME").unwrap_or_default();
        let config = configurations::describe(paths(inv)?, name, inv.properties.active_configuration())?;
        Ok(CommandOutput::Resource(configuration_record(&config)))
    }
    .boxed_local()
}

fn delete_command(_track: ReleaseTrack) -> Command {
    Command::new(delete)
        .description("Deletes one or more named configurations. The active configuration cannot be deleted.")
        .arg(ArgSpec::positional("CONFIGURATION_NAMES", "Names of the configurations to delete.").plural())
}

fn delete<'a>(inv: &'a Invocation<'a>) -> LocalBoxFuture<'a, Result<CommandOutput<'a>>> {
    async move {
        let names = inv.args.strings("CONFIGURATION_NAMES");
        let paths = paths(inv)?;
        let active = inv.properties.active_configuration();
        // Refuse before asking
        if let Some(name) = names.iter().find(|n| n.as_str() == active) {
            return Err(PropertyError::DeleteActive(name.clone()).into());
        }
        let listed: Vec<String> = names.iter().map(|n| format!(" - {n}")).collect();
        inv.console.prompt_continue(
            &format!("The following configurations will be deleted:\n{}", listed.join("\n")),
            true,
            true,
        )?;
        for name in &names {
            configurations::delete(paths, name, active)?;
            inv.console.status(&format!("Deleted [{name}]."));
        }
        Ok(CommandOutput::Nothing)
    }
    .boxed_local()
}
