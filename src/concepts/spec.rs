//! Resource specs and attribute configs
//!
//! A [`ResourceSpec`] is declared once per command and is read-only after
//! that. Each attribute carries its own ordered list of fall-throughs.

use crate::properties::PropertyStore;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// What a [`FallThrough::Fallback`] callable can see
pub struct FallbackContext<'a> {
    pub properties: &'a PropertyStore,
    /// Attributes resolved so far, by attribute name
    pub resolved: &'a BTreeMap<String, String>,
}

pub type FallbackFn = Arc<dyn Fn(&FallbackContext<'_>) -> Option<String> + Send + Sync>;

/// A source consulted when an attribute has no explicit value
#[derive(Clone)]
pub enum FallThrough {
    /// A property such as `compute/zone`
    Property(String),
    /// Derived from another attribute of the same resource, resolved earlier
    Attribute {
        attribute: String,
        derive: fn(&str) -> Option<String>,
    },
    /// An ambient default computed by a callable
    Fallback {
        label: String,
        hint: String,
        func: FallbackFn,
    },
    /// Ask the user, when stdin is interactive and prompts are enabled
    Prompt(String),
    /// A fixed value
    Value(String),
}

impl fmt::Debug for FallThrough {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Property(key) => write!(f, "Property({key})"),
            Self::Attribute { attribute, .. } => write!(f, "Attribute({attribute})"),
            Self::Fallback { label, .. } => write!(f, "Fallback({label})"),
            Self::Prompt(message) => write!(f, "Prompt({message})"),
            Self::Value(value) => write!(f, "Value({value})"),
        }
    }
}

/// Where a resolved attribute value came from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Source {
    /// The positional or flag bound to the attribute
    Argument(String),
    /// Implied by a URL or relative name given for the resource
    Parsed,
    Property(String),
    Attribute(String),
    Fallback(String),
    Prompt,
    Value,
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Argument(name) => write!(f, "argument {name}"),
            Self::Parsed => f.write_str("the full resource name"),
            Self::Property(key) => write!(f, "property {key}"),
            Self::Attribute(name) => write!(f, "attribute [{name}]"),
            Self::Fallback(label) => write!(f, "{label}"),
            Self::Prompt => f.write_str("interactive prompt"),
            Self::Value => f.write_str("default value"),
        }
    }
}

/// One parameter of a resource spec
#[derive(Debug, Clone)]
pub struct AttributeConfig {
    /// User-facing name, also the flag name (`zone` -> `--zone`)
    pub name: String,
    /// Collection parameter this attribute fills
    pub param: String,
    pub help: String,
    pub fallthroughs: Vec<FallThrough>,
    /// Whether the attribute gets its own `--<name>` flag
    pub has_flag: bool,
}

impl AttributeConfig {
    pub fn new(name: &str, param: &str, help: &str) -> Self {
        Self {
            name: name.to_string(),
            param: param.to_string(),
            help: help.to_string(),
            fallthroughs: Vec::new(),
            has_flag: true,
        }
    }

    pub fn property(mut self, key: &str) -> Self {
        self.fallthroughs.push(FallThrough::Property(key.to_string()));
        self
    }

    pub fn from_attribute(mut self, attribute: &str, derive: fn(&str) -> Option<String>) -> Self {
        self.fallthroughs.push(FallThrough::Attribute {
            attribute: attribute.to_string(),
            derive,
        });
        self
    }

    pub fn fallback(
        mut self,
        label: &str,
        hint: &str,
        func: impl Fn(&FallbackContext<'_>) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.fallthroughs.push(FallThrough::Fallback {
            label: label.to_string(),
            hint: hint.to_string(),
            func: Arc::new(func),
        });
        self
    }

    pub fn prompt(mut self, message: &str) -> Self {
        self.fallthroughs.push(FallThrough::Prompt(message.to_string()));
        self
    }

    pub fn value(mut self, value: &str) -> Self {
        self.fallthroughs.push(FallThrough::Value(value.to_string()));
        self
    }

    /// Only settable through fall-throughs (e.g. `project` via `--project`)
    pub fn without_flag(mut self) -> Self {
        self.has_flag = false;
        self
    }

    pub fn flag_name(&self) -> String {
        format!("--{}", self.name)
    }
}

/// A collection plus one attribute config per parameter
#[derive(Debug, Clone)]
pub struct ResourceSpec {
    pub collection: String,
    pub api_version: Option<String>,
    /// Singular name used in help and messages (`instance`)
    pub resource_name: String,
    /// Container to leaf, in collection parameter order
    pub attributes: Vec<AttributeConfig>,
}

impl ResourceSpec {
    pub fn new(collection: &str, resource_name: &str) -> Self {
        Self {
            collection: collection.to_string(),
            api_version: None,
            resource_name: resource_name.to_string(),
            attributes: Vec::new(),
        }
    }

    pub fn api_version(mut self, version: &str) -> Self {
        self.api_version = Some(version.to_string());
        self
    }

    pub fn attribute(mut self, attribute: AttributeConfig) -> Self {
        self.attributes.push(attribute);
        self
    }

    /// The attribute bound to the collection's terminal parameter
    pub fn leaf(&self) -> Option<&AttributeConfig> {
        self.attributes.last()
    }

    pub fn attribute_named(&self, name: &str) -> Option<&AttributeConfig> {
        self.attributes.iter().find(|a| a.name == name)
    }
}

/// How a resource argument appears on the command line
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Surface {
    /// The leaf is the positional; `plural` accepts several
    Positional { plural: bool },
    /// The leaf is `--<name>`
    Flag,
}

/// A resource spec attached to a command
#[derive(Debug, Clone)]
pub struct ResourceArg {
    pub spec: Arc<ResourceSpec>,
    pub surface: Surface,
    pub required: bool,
    /// Help for the leaf argument
    pub help: String,
}

impl ResourceArg {
    pub fn positional(spec: ResourceSpec, help: &str) -> Self {
        Self {
            spec: Arc::new(spec),
            surface: Surface::Positional { plural: false },
            required: true,
            help: help.to_string(),
        }
    }

    pub fn plural(spec: ResourceSpec, help: &str) -> Self {
        Self {
            surface: Surface::Positional { plural: true },
            ..Self::positional(spec, help)
        }
    }

    pub fn flag(spec: ResourceSpec, help: &str) -> Self {
        Self {
            surface: Surface::Flag,
            ..Self::positional(spec, help)
        }
    }

    pub fn optional(mut self) -> Self {
        self.required = false;
        self
    }

    pub fn is_plural(&self) -> bool {
        matches!(self.surface, Surface::Positional { plural: true })
    }

    /// Argument id of the leaf: `INSTANCE` or `instance`
    pub fn leaf_arg_name(&self) -> String {
        let leaf = self
            .spec
            .leaf()
            .map(|a| a.name.clone())
            .unwrap_or_else(|| self.spec.resource_name.clone());
        match self.surface {
            Surface::Positional { .. } => leaf.to_uppercase().replace('-', "_"),
            Surface::Flag => leaf,
        }
    }

    /// Non-leaf attributes that get their own flag
    pub fn attribute_flags(&self) -> impl Iterator<Item = &AttributeConfig> {
        let n = self.spec.attributes.len();
        self.spec
            .attributes
            .iter()
            .take(n.saturating_sub(1))
            .filter(|a| a.has_flag)
    }
}
