//! Flags recognised by every command

use super::arg_types::ArgType;
use super::args::{ArgSpec, ParsedArgs};
use crate::output::OutputOptions;
use crate::properties::VERBOSITY_CHOICES;

/// Universal flags that take a separate value token (`--project p`)
const VALUE_FLAGS: &[&str] = &[
    "--account",
    "--billing-project",
    "--configuration",
    "--filter",
    "--flatten",
    "--format",
    "--limit",
    "--page-size",
    "--project",
    "--sort-by",
    "--verbosity",
];

pub fn universal_args() -> Vec<ArgSpec> {
    vec![
        ArgSpec::flag("account", ArgType::String, "Google Cloud user account to use for invocation."),
        ArgSpec::flag(
            "async",
            ArgType::Bool,
            "Return immediately, without waiting for the operation in progress to complete.",
        ),
        ArgSpec::flag(
            "billing-project",
            ArgType::String,
            "Project that will be charged quota for operations performed.",
        ),
        ArgSpec::flag(
            "configuration",
            ArgType::String,
            "Named configuration to use for this command invocation.",
        ),
        ArgSpec::flag("filter", ArgType::String, "Apply a Boolean filter to the resources listed."),
        ArgSpec::flag("flatten", ArgType::List, "Flatten list-valued keys into one record per element."),
        ArgSpec::flag("format", ArgType::String, "Set the format for printing command output resources."),
        ArgSpec::flag("help", ArgType::Bool, "Display detailed help.").short('h'),
        ArgSpec::flag("limit", ArgType::bounded(1, None), "Maximum number of resources to list."),
        ArgSpec::flag("log-http", ArgType::Bool, "Log all HTTP server requests and responses to stderr."),
        ArgSpec::flag(
            "page-size",
            ArgType::bounded(1, None),
            "Some services group resource list output into pages. This flag specifies the maximum number of resources per page.",
        ),
        ArgSpec::flag("project", ArgType::String, "The Google Cloud project ID to use for this invocation."),
        ArgSpec::flag("quiet", ArgType::Bool, "Disable all interactive prompts.").short('q'),
        ArgSpec::flag("sort-by", ArgType::List, "Comma-separated list of resource field key names to sort by."),
        ArgSpec::flag(
            "verbosity",
            ArgType::Choice(VERBOSITY_CHOICES),
            "Override the default verbosity for this command.",
        ),
    ]
}

/// Whether a token is a universal flag whose value is the next token
pub fn takes_separate_value(token: &str) -> bool {
    !token.contains('=') && VALUE_FLAGS.contains(&token)
}

/// Value of `--<name>=V` or `--<name> V` in raw argv, last occurrence wins.
/// Used before the command is known.
pub fn prescan(argv: &[String], name: &str) -> Option<String> {
    let flag = format!("--{name}");
    let mut found = None;
    let mut iter = argv.iter();
    while let Some(token) = iter.next() {
        if token == "--" {
            break;
        }
        if let Some(value) = token.strip_prefix(&flag).and_then(|rest| rest.strip_prefix('=')) {
            found = Some(value.to_string());
        } else if *token == flag {
            found = iter.next().cloned();
        }
    }
    found
}

pub fn wants_help(argv: &[String]) -> bool {
    argv.iter()
        .take_while(|t| *t != "--")
        .any(|t| t == "--help" || t == "-h")
}

/// The universal flags of one invocation
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UniversalFlags {
    pub account: Option<String>,
    /// `--async`: return operations without waiting
    pub no_wait: bool,
    pub billing_project: Option<String>,
    pub configuration: Option<String>,
    pub filter: Option<String>,
    pub flatten: Vec<String>,
    pub format: Option<String>,
    pub limit: Option<usize>,
    pub log_http: bool,
    pub page_size: Option<u32>,
    pub project: Option<String>,
    pub quiet: bool,
    pub sort_by: Vec<String>,
    pub verbosity: Option<String>,
}

impl UniversalFlags {
    pub fn from_args(args: &ParsedArgs) -> Self {
        let owned = |name: &str| args.string(name).map(String::from);
        Self {
            account: owned("account"),
            no_wait: args.flag("async"),
            billing_project: owned("billing-project"),
            configuration: owned("configuration"),
            filter: owned("filter"),
            flatten: args.strings("flatten"),
            format: owned("format"),
            limit: args.int("limit").and_then(|n| usize::try_from(n).ok()),
            log_http: args.flag("log-http"),
            page_size: args.int("page-size").and_then(|n| u32::try_from(n).ok()),
            project: owned("project"),
            quiet: args.flag("quiet"),
            sort_by: args.strings("sort-by"),
            verbosity: owned("verbosity"),
        }
    }

    pub fn output_options(&self) -> OutputOptions {
        OutputOptions {
            format: self.format.clone(),
            filter: self.filter.clone(),
            sort_by: self.sort_by.clone(),
            limit: self.limit,
            flatten: self.flatten.clone(),
        }
    }

    /// Properties these flags set for the invocation
    pub fn property_overrides(&self) -> Vec<(&'static str, String)> {
        let mut props = Vec::new();
        if let Some(project) = &self.project {
            props.push(("core/project", project.clone()));
        }
        if let Some(account) = &self.account {
            props.push(("core/account", account.clone()));
        }
        if let Some(billing) = &self.billing_project {
            props.push(("billing/quota_project", billing.clone()));
        }
        if self.quiet {
            props.push(("core/disable_prompts", "true".to_string()));
        }
        if let Some(verbosity) = &self.verbosity {
            props.push(("core/verbosity", verbosity.clone()));
        }
        if self.log_http {
            props.push(("core/log_http", "true".to_string()));
        }
        props
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::args::parse;

    fn argv(args: &[&str]) -> Vec<String> {
        args.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_universal_flags_bind() {
        let parsed = parse(
            &universal_args(),
            &[],
            &argv(&["--project", "p1", "-q", "--limit=5", "--sort-by=~name,zone", "--format=json", "--async"]),
        )
        .unwrap();
        let flags = UniversalFlags::from_args(&parsed);
        assert!(flags.no_wait);
        assert_eq!(flags.project.as_deref(), Some("p1"));
        assert!(flags.quiet);
        assert_eq!(flags.limit, Some(5));
        assert_eq!(flags.sort_by, vec!["~name", "zone"]);

        let props = flags.property_overrides();
        assert!(props.contains(&("core/project", "p1".to_string())));
        assert!(props.contains(&("core/disable_prompts", "true".to_string())));

        let output = flags.output_options();
        assert_eq!(output.format.as_deref(), Some("json"));
    }

    #[test]
    fn test_limit_must_be_positive() {
        assert!(parse(&universal_args(), &[], &argv(&["--limit=0"])).is_err());
    }

    #[test]
    fn test_verbosity_choices() {
        assert!(parse(&universal_args(), &[], &argv(&["--verbosity=debug"])).is_ok());
        let err = parse(&universal_args(), &[], &argv(&["--verbosity=loud"])).unwrap_err();
        assert!(err.to_string().contains("Invalid choice: 'loud'"));
    }

    #[test]
    fn test_prescan() {
        let args = argv(&["compute", "--verbosity", "info", "instances", "--verbosity=debug"]);
        assert_eq!(prescan(&args, "verbosity").as_deref(), Some("debug"));
        assert_eq!(prescan(&args, "configuration"), None);
        assert_eq!(prescan(&argv(&["--", "--project=x"]), "project"), None);
        assert!(takes_separate_value("--project"));
        assert!(!takes_separate_value("--project=x"));
        assert!(!takes_separate_value("--zone"));
        assert!(wants_help(&argv(&["compute", "-h"])));
    }
}
