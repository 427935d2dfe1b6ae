//! Property store
//!
//! Properties are `section/name` keys (`core/project`, `compute/zone`, ...)
//! looked up across a fixed stack of scopes. The set of known keys is a
//! static table so typos fail loudly instead of silently persisting.
//!
//! # Module Structure
//!
//! - [`store`] - Scoped lookup, invocation overrides and atomic persistence
//! - [`configurations`] - Config directory layout and named configurations

pub mod configurations;
pub mod store;

pub use configurations::{ConfigPaths, Configuration};
pub use store::{Env, PropertyStore};

use crate::error::{CliError, ErrorKind};
use std::fmt;
use thiserror::Error;

/// Environment variable prefix for property shadows
pub const ENV_PREFIX: &str = "CLOUDSDK";

/// Section whose keys are accepted for any API name
const ENDPOINT_OVERRIDES_SECTION: &str = "api_endpoint_overrides";

/// Where a property value came from, highest precedence first
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Scope {
    Flag,
    Env,
    Workspace,
    User,
    Installation,
    Default,
}

impl Scope {
    /// Lookup order
    pub const PRECEDENCE: [Scope; 6] = [
        Scope::Flag,
        Scope::Env,
        Scope::Workspace,
        Scope::User,
        Scope::Installation,
        Scope::Default,
    ];
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Scope::Flag => "flag",
            Scope::Env => "environment",
            Scope::Workspace => "workspace",
            Scope::User => "user",
            Scope::Installation => "installation",
            Scope::Default => "default",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropertyKind {
    String,
    Bool,
    Choice(&'static [&'static str]),
}

/// Declaration of one known property
#[derive(Debug, Clone)]
pub struct PropertyDef {
    pub key: String,
    pub kind: PropertyKind,
    pub default: Option<&'static str>,
    pub help: &'static str,
    /// Universal flag that sets this property for one invocation
    pub flag: Option<&'static str>,
}

pub const VERBOSITY_CHOICES: &[&str] = &["debug", "info", "warning", "error", "critical", "none"];

struct StaticDef {
    key: &'static str,
    kind: PropertyKind,
    default: Option<&'static str>,
    help: &'static str,
    flag: Option<&'static str>,
}

static PROPERTIES: &[StaticDef] = &[
    StaticDef {
        key: "core/project",
        kind: PropertyKind::String,
        default: None,
        help: "Project ID of the Cloud Platform project to operate on by default.",
        flag: Some("--project"),
    },
    StaticDef {
        key: "core/account",
        kind: PropertyKind::String,
        default: None,
        help: "Account used for authorization.",
        flag: Some("--account"),
    },
    StaticDef {
        key: "core/disable_prompts",
        kind: PropertyKind::Bool,
        default: Some("false"),
        help: "If true, the default answer is assumed for all user prompts.",
        flag: Some("--quiet"),
    },
    StaticDef {
        key: "core/verbosity",
        kind: PropertyKind::Choice(VERBOSITY_CHOICES),
        default: Some("warning"),
        help: "Default logging verbosity.",
        flag: Some("--verbosity"),
    },
    StaticDef {
        key: "core/user_output_enabled",
        kind: PropertyKind::Bool,
        default: Some("true"),
        help: "If false, messages to the user and command output on stdout are suppressed.",
        flag: None,
    },
    StaticDef {
        key: "core/log_http",
        kind: PropertyKind::Bool,
        default: Some("false"),
        help: "If true, log HTTP requests and responses at debug level.",
        flag: Some("--log-http"),
    },
    StaticDef {
        key: "billing/quota_project",
        kind: PropertyKind::String,
        default: None,
        help: "Project billed for API usage where the API supports it.",
        flag: Some("--billing-project"),
    },
    StaticDef {
        key: "compute/zone",
        kind: PropertyKind::String,
        default: None,
        help: "Default zone for zonal Compute Engine resources.",
        flag: None,
    },
    StaticDef {
        key: "compute/region",
        kind: PropertyKind::String,
        default: None,
        help: "Default region for regional Compute Engine resources.",
        flag: None,
    },
    StaticDef {
        key: "dataproc/region",
        kind: PropertyKind::String,
        default: None,
        help: "Dataproc region to use.",
        flag: None,
    },
];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PropertyError {
    #[error("Section [{0}] has no property [{1}].")]
    InvalidProperty(String, String),
    #[error("Invalid property key [{0}]; expected section/name.")]
    MalformedKey(String),
    #[error("Invalid value [{value}] for property [{key}]: {reason}")]
    InvalidValue {
        key: String,
        value: String,
        reason: String,
    },
    #[error("The required property [{name}] is not currently set.\n{remedy}")]
    RequiredProperty { name: String, remedy: String },
    #[error("Invalid configuration name [{0}]; names must match [a-z][-a-z0-9]*.")]
    InvalidConfigurationName(String),
    #[error("Configuration [{0}] does not exist.")]
    ConfigurationNotFound(String),
    #[error("Cannot create configuration [{0}], it already exists.")]
    ConfigurationExists(String),
    #[error("Cannot delete configuration [{0}], it is the currently active configuration.")]
    DeleteActive(String),
    #[error("No {0} scope is available for writing.")]
    ScopeUnavailable(Scope),
    #[error("Unable to write {path}: {reason}")]
    Write { path: String, reason: String },
}

impl From<PropertyError> for CliError {
    fn from(err: PropertyError) -> Self {
        let kind = match err {
            PropertyError::Write { .. } => ErrorKind::Internal,
            _ => ErrorKind::Argument,
        };
        CliError::new(kind, err.to_string())
    }
}

/// Split `section/name`
pub fn split_key(key: &str) -> Result<(&str, &str), PropertyError> {
    match key.split_once('/') {
        Some((section, name)) if !section.is_empty() && !name.is_empty() && !name.contains('/') => {
            Ok((section, name))
        }
        _ => Err(PropertyError::MalformedKey(key.to_string())),
    }
}

/// Resolve a key to its declaration. A bare name is taken as `core/<name>`.
pub fn lookup(key: &str) -> Result<PropertyDef, PropertyError> {
    let key = normalize_key(key);
    let (section, name) = split_key(&key)?;
    if section == ENDPOINT_OVERRIDES_SECTION {
        return Ok(PropertyDef {
            key: key.clone(),
            kind: PropertyKind::String,
            default: None,
            help: "Overrides the API endpoint used for this API.",
            flag: None,
        });
    }
    PROPERTIES
        .iter()
        .find(|d| d.key == key)
        .map(|d| PropertyDef {
            key: d.key.to_string(),
            kind: d.kind,
            default: d.default,
            help: d.help,
            flag: d.flag,
        })
        .ok_or_else(|| PropertyError::InvalidProperty(section.to_string(), name.to_string()))
}

/// Every statically declared property
pub fn known_keys() -> impl Iterator<Item = &'static str> {
    PROPERTIES.iter().map(|d| d.key)
}

pub fn normalize_key(key: &str) -> String {
    if key.contains('/') {
        key.to_string()
    } else {
        format!("core/{key}")
    }
}

/// Parse a boolean property value
pub fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" | "" => Some(false),
        _ => None,
    }
}

impl PropertyDef {
    /// Check a value against the declared kind
    pub fn validate(&self, value: &str) -> Result<(), PropertyError> {
        let invalid = |reason: String| PropertyError::InvalidValue {
            key: self.key.clone(),
            value: value.to_string(),
            reason,
        };
        match self.kind {
            PropertyKind::String => Ok(()),
            PropertyKind::Bool => parse_bool(value)
                .map(|_| ())
                .ok_or_else(|| invalid("expected a boolean".to_string())),
            PropertyKind::Choice(choices) => {
                if choices.contains(&value) {
                    Ok(())
                } else {
                    Err(invalid(format!("must be one of [{}]", choices.join(", "))))
                }
            }
        }
    }

    /// Environment variables that shadow this property, preferred first
    pub fn env_vars(&self) -> Vec<String> {
        let upper = self.key.to_ascii_uppercase().replace('/', "_");
        match self.key.strip_prefix("core/") {
            Some(name) => vec![
                format!("{}_{}", ENV_PREFIX, name.to_ascii_uppercase()),
                format!("{ENV_PREFIX}_{upper}"),
            ],
            None => vec![format!("{ENV_PREFIX}_{upper}")],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_and_unknown() {
        assert!(lookup("core/project").is_ok());
        assert_eq!(lookup("project").unwrap().key, "core/project");
        assert_eq!(
            lookup("compute/zoen").unwrap_err(),
            PropertyError::InvalidProperty("compute".into(), "zoen".into())
        );
        assert!(lookup("api_endpoint_overrides/compute").is_ok());
        assert!(matches!(lookup("a/b/c"), Err(PropertyError::MalformedKey(_))));
    }

    #[test]
    fn test_env_var_mapping() {
        let project = lookup("core/project").unwrap();
        assert_eq!(project.env_vars(), vec!["CLOUDSDK_PROJECT", "CLOUDSDK_CORE_PROJECT"]);
        let region = lookup("compute/region").unwrap();
        assert_eq!(region.env_vars(), vec!["CLOUDSDK_COMPUTE_REGION"]);
        let endpoint = lookup("api_endpoint_overrides/pubsub").unwrap();
        assert_eq!(endpoint.env_vars(), vec!["CLOUDSDK_API_ENDPOINT_OVERRIDES_PUBSUB"]);
    }

    #[test]
    fn test_bool_values() {
        for v in ["true", "1", "yes", "on", "TRUE"] {
            assert_eq!(parse_bool(v), Some(true));
        }
        for v in ["false", "0", "no", "off"] {
            assert_eq!(parse_bool(v), Some(false));
        }
        assert_eq!(parse_bool("maybe"), None);
        let def = lookup("core/disable_prompts").unwrap();
        assert!(def.validate("maybe").is_err());
    }

    #[test]
    fn test_choice_validation() {
        let def = lookup("core/verbosity").unwrap();
        assert!(def.validate("debug").is_ok());
        assert!(def.validate("loud").is_err());
    }
}
