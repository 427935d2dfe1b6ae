//! Help text for groups and commands

use super::args::ArgSpec;
use super::flags::universal_args;
use super::tree::{command_line, Command, CommandTree, Node, ReleaseTrack};

const INDENT: &str = "    ";

fn section(out: &mut String, title: &str) {
    out.push('\n');
    out.push_str(title);
    out.push('\n');
}

fn entry(out: &mut String, term: &str, help: &str) {
    out.push_str(INDENT);
    out.push_str(term);
    out.push('\n');
    if !help.is_empty() {
        out.push_str(INDENT);
        out.push_str(INDENT);
        out.push_str(help);
        out.push('\n');
    }
}

fn universal_names() -> String {
    universal_args()
        .iter()
        .map(|a| format!("--{}", a.name))
        .collect::<Vec<_>>()
        .join(", ")
}

fn name_section(out: &mut String, track: ReleaseTrack, path: &[String], node: &Node) {
    out.push_str("NAME\n");
    out.push_str(INDENT);
    out.push_str(&format!("{} - {}\n", command_line(track, path), node.help));
}

/// Help for a group: synopsis and visible children
pub fn group_help(tree: &CommandTree, path: &[String], track: ReleaseTrack) -> String {
    let mut out = String::new();
    let Some(node) = tree.node(path) else {
        return out;
    };
    name_section(&mut out, track, path, node);

    section(&mut out, "SYNOPSIS");
    out.push_str(INDENT);
    out.push_str(&format!("{} GROUP | COMMAND [GCLOUD_WIDE_FLAG ...]\n", command_line(track, path)));

    let children = tree.children(path, track);
    let (groups, commands): (Vec<&Node>, Vec<&Node>) = children.into_iter().partition(|n| n.is_group());
    if !groups.is_empty() {
        section(&mut out, "GROUPS");
        out.push_str(INDENT);
        out.push_str("GROUP is one of the following:\n\n");
        for group in groups {
            entry(&mut out, &group.name, &group.help);
        }
    }
    if !commands.is_empty() {
        section(&mut out, "COMMANDS");
        out.push_str(INDENT);
        out.push_str("COMMAND is one of the following:\n\n");
        for command in commands {
            entry(&mut out, &command.name, &command.help);
        }
    }
    section(&mut out, "GCLOUD WIDE FLAGS");
    out.push_str(INDENT);
    out.push_str(&format!("These flags are available to all commands: {}.\n", universal_names()));
    out
}

/// Help for a command: synopsis, positionals and flags. Hidden flags are
/// left out.
pub fn command_help(
    tree: &CommandTree,
    path: &[String],
    command: &Command,
    track: ReleaseTrack,
) -> String {
    let mut out = String::new();
    let Some(node) = tree.node(path) else {
        return out;
    };
    name_section(&mut out, track, path, node);

    let specs: Vec<ArgSpec> = command.arg_specs().into_iter().filter(|s| !s.hidden).collect();
    let (positionals, flags): (Vec<&ArgSpec>, Vec<&ArgSpec>) = specs.iter().partition(|s| s.positional);

    section(&mut out, "SYNOPSIS");
    let mut synopsis = vec![command_line(track, path)];
    for spec in positionals.iter().chain(flags.iter()) {
        synopsis.push(if spec.required {
            spec.usage()
        } else {
            format!("[{}]", spec.usage())
        });
    }
    synopsis.push("[GCLOUD_WIDE_FLAG ...]".to_string());
    out.push_str(INDENT);
    out.push_str(&synopsis.join(" "));
    out.push('\n');

    if let Some(description) = &command.description {
        section(&mut out, "DESCRIPTION");
        out.push_str(INDENT);
        out.push_str(description);
        out.push('\n');
    }

    if !positionals.is_empty() {
        section(&mut out, "POSITIONAL ARGUMENTS");
        for spec in &positionals {
            entry(&mut out, &spec.usage(), &spec.help);
        }
    }

    let (required, optional): (Vec<&ArgSpec>, Vec<&ArgSpec>) = flags.into_iter().partition(|s| s.required);
    if !required.is_empty() {
        section(&mut out, "REQUIRED FLAGS");
        for spec in required {
            entry(&mut out, &spec.usage(), &spec.help);
        }
    }
    if !optional.is_empty() {
        section(&mut out, "FLAGS");
        for spec in optional {
            let mut help = spec.help.clone();
            if let Some(default) = &spec.default {
                help.push_str(&format!(" The default is {default}."));
            }
            entry(&mut out, &spec.usage(), &help);
        }
    }

    section(&mut out, "GCLOUD WIDE FLAGS");
    out.push_str(INDENT);
    out.push_str(&format!("These flags are available to all commands: {}.\n", universal_names()));

    if track != ReleaseTrack::Ga {
        section(&mut out, "NOTES");
        out.push_str(INDENT);
        out.push_str(&format!(
            "This command is currently in {}. It may change without notice.\n",
            track.to_string().to_lowercase()
        ));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::arg_types::ArgType;
    use crate::cli::runner::Invocation;
    use crate::cli::tree::CommandOutput;
    use crate::error::Result;
    use futures::future::LocalBoxFuture;
    use futures::FutureExt;

    fn noop<'a>(_: &'a Invocation<'a>) -> LocalBoxFuture<'a, Result<CommandOutput<'a>>> {
        async { Ok(CommandOutput::Nothing) }.boxed_local()
    }

    fn build(_: ReleaseTrack) -> Command {
        Command::new(noop)
            .description("Creates a topic.")
            .arg(ArgSpec::positional("TOPIC", "Name of the topic.").required())
            .arg(ArgSpec::flag("labels", ArgType::KeyValue, "Labels to apply."))
            .arg(ArgSpec::flag("secret", ArgType::String, "Hidden.").hidden())
            .arg(ArgSpec::flag("retention", ArgType::Duration, "Retention.").default_value("7d"))
    }

    fn tree() -> CommandTree {
        let mut tree = CommandTree::new();
        tree.add_group(&["pubsub"], "Manage Pub/Sub.", &ReleaseTrack::ALL)
            .add_group(&["pubsub", "topics"], "Manage topics.", &ReleaseTrack::ALL)
            .add_command(&["pubsub", "topics", "create"], "Create a topic.", &ReleaseTrack::ALL, build)
            .add_command(&["pubsub", "topics", "peek"], "Peek.", &[ReleaseTrack::Alpha], build);
        tree
    }

    fn path(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_group_help_lists_track_children() {
        let tree = tree();
        let ga = group_help(&tree, &path(&["pubsub", "topics"]), ReleaseTrack::Ga);
        assert!(ga.contains("gcloud pubsub topics - Manage topics."));
        assert!(ga.contains("COMMANDS"));
        assert!(ga.contains("create\n        Create a topic."));
        assert!(!ga.contains("peek"));

        let alpha = group_help(&tree, &path(&["pubsub", "topics"]), ReleaseTrack::Alpha);
        assert!(alpha.contains("gcloud alpha pubsub topics"));
        assert!(alpha.contains("peek"));
    }

    #[test]
    fn test_command_help_hides_hidden_flags() {
        let tree = tree();
        let p = path(&["pubsub", "topics", "create"]);
        let help = command_help(&tree, &p, &build(ReleaseTrack::Ga), ReleaseTrack::Ga);
        assert!(help.contains("gcloud pubsub topics create TOPIC [--labels=[KEY=VALUE,...]]"));
        assert!(help.contains("POSITIONAL ARGUMENTS"));
        assert!(help.contains("Creates a topic."));
        assert!(help.contains("The default is 7d."));
        assert!(!help.contains("--secret"));
        assert!(!help.contains("NOTES"));

        let beta = command_help(&tree, &p, &build(ReleaseTrack::Beta), ReleaseTrack::Beta);
        assert!(beta.contains("currently in beta"));
    }
}
