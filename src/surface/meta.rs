//! `meta list-commands`

use crate::cli::tree::{command_line, dotted_path};
use crate::cli::{ArgSpec, ArgType, Command, CommandOutput, CommandTree, Invocation, ReleaseTrack};
use crate::error::Result;
use futures::future::LocalBoxFuture;
use futures::FutureExt;

pub fn register(tree: &mut CommandTree) {
    let all = &ReleaseTrack::ALL;
    tree.add_group(&["meta"], "Cloud meta commands.", all).add_command(
        &["meta", "list-commands"],
        "List all commands in the command tree.",
        all,
        list_commands_command,
    );
}

fn list_commands_command(_track: ReleaseTrack) -> Command {
    Command::new(list_commands)
        .description("Lists every group and command visible on the current release track, in tree order.")
        .arg(ArgSpec::flag("dotted", ArgType::Bool, "Print dotted command paths such as gcloud.compute.instances."))
        .arg(ArgSpec::flag("commands-only", ArgType::Bool, "Omit groups from the listing."))
}

fn list_commands<'a>(inv: &'a Invocation<'a>) -> LocalBoxFuture<'a, Result<CommandOutput<'a>>> {
    async move {
        let dotted = inv.args.flag("dotted");
        let commands_only = inv.args.flag("commands-only");
        let mut lines = Vec::new();
        for (path, node) in inv.tree.walk(inv.track) {
            if commands_only && node.is_group() {
                continue;
            }
            lines.push(if dotted {
                dotted_path(inv.track, path)
            } else {
                command_line(inv.track, path)
            });
        }
        tracing::debug!("Listed {} tree nodes", lines.len());
        lines.push(String::new());
        inv.console.out(&lines.join("\n"))?;
        Ok(CommandOutput::Nothing)
    }
    .boxed_local()
}
