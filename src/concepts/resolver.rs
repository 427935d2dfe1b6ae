//! Attribute resolution
//!
//! Turns the values bound to a resource argument into a [`Reference`].
//! Attributes are visited leaf first, so a full URL or relative name given
//! for the leaf supplies every ancestor before any fall-through runs.

use super::spec::{FallThrough, FallbackContext, ResourceArg, ResourceSpec, Source};
use crate::console::Console;
use crate::error::{CliError, Result};
use crate::properties::PropertyStore;
use crate::resource::{ParseOptions, Reference, Registry, ResourceError};
use std::collections::BTreeMap;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConceptError {
    #[error("{}", missing_message(.resource, .attribute, .ways))]
    RequiredAttributeMissing {
        resource: String,
        attribute: String,
        /// Every flag, property or fallback that would have supplied it
        ways: Vec<String>,
    },
}

fn missing_message(resource: &str, attribute: &str, ways: &[String]) -> String {
    let mut msg = format!("Failed to find attribute [{attribute}] for resource [{resource}].");
    if !ways.is_empty() {
        msg.push_str(" The attribute can be set in the following ways:");
        for way in ways {
            msg.push_str("\n- ");
            msg.push_str(way);
        }
    }
    msg
}

impl From<ConceptError> for CliError {
    fn from(err: ConceptError) -> Self {
        CliError::argument(err.to_string())
    }
}

/// A resolved resource and where each attribute came from
#[derive(Debug, Clone, PartialEq)]
pub struct Resolved {
    pub reference: Reference,
    /// Attribute name and source, in declaration order
    pub sources: Vec<(String, Source)>,
}

impl Resolved {
    pub fn source(&self, attribute: &str) -> Option<&Source> {
        self.sources
            .iter()
            .find(|(name, _)| name == attribute)
            .map(|(_, source)| source)
    }
}

/// Values bound on the command line for one resource argument
#[derive(Debug, Clone, Default)]
pub struct ArgumentValues {
    /// Positional or leaf flag values; several for plural arguments
    pub leaves: Vec<String>,
    /// `--<attribute>` flag values by attribute name
    pub attributes: BTreeMap<String, String>,
}

pub struct Resolver<'a> {
    registry: &'a Registry,
    properties: &'a PropertyStore,
    console: Option<&'a Console>,
}

impl<'a> Resolver<'a> {
    pub fn new(registry: &'a Registry, properties: &'a PropertyStore) -> Self {
        Self {
            registry,
            properties,
            console: None,
        }
    }

    /// Allow prompt fall-throughs on this console
    pub fn with_console(mut self, console: &'a Console) -> Self {
        self.console = Some(console);
        self
    }

    /// Resolve one reference per leaf value. An optional argument with no
    /// values resolves to nothing.
    pub fn resolve_arg(&self, arg: &ResourceArg, values: &ArgumentValues) -> Result<Vec<Resolved>> {
        let arg_name = match arg.surface {
            super::spec::Surface::Positional { .. } => arg.leaf_arg_name(),
            super::spec::Surface::Flag => format!("--{}", arg.leaf_arg_name()),
        };
        let mut memo = BTreeMap::new();
        if values.leaves.is_empty() {
            if !arg.required {
                return Ok(Vec::new());
            }
            return Ok(vec![self.resolve_one(&arg.spec, None, &arg_name, &values.attributes, &mut memo)?]);
        }
        values
            .leaves
            .iter()
            .map(|leaf| self.resolve_one(&arg.spec, Some(leaf), &arg_name, &values.attributes, &mut memo))
            .collect()
    }

    /// Resolve a single reference
    pub fn resolve(
        &self,
        spec: &ResourceSpec,
        leaf: Option<&str>,
        attributes: &BTreeMap<String, String>,
    ) -> Result<Resolved> {
        let arg_name = spec
            .leaf()
            .map(|a| a.name.to_uppercase())
            .unwrap_or_default();
        self.resolve_one(spec, leaf, &arg_name, attributes, &mut BTreeMap::new())
    }

    /// `memo` carries fall-through results between the leaves of a plural
    /// argument so a prompt is answered once
    fn resolve_one(
        &self,
        spec: &ResourceSpec,
        leaf: Option<&str>,
        leaf_arg: &str,
        attributes: &BTreeMap<String, String>,
        memo: &mut BTreeMap<String, (String, Source)>,
    ) -> Result<Resolved> {
        let implied = match leaf {
            Some(input) => self.parse_full_name(spec, input)?,
            None => BTreeMap::new(),
        };

        let leaf_name = spec.leaf().map(|a| a.name.clone()).unwrap_or_default();
        let mut resolved: BTreeMap<String, String> = BTreeMap::new();
        let mut sources: Vec<(String, Source)> = Vec::new();

        for attr in spec.attributes.iter().rev() {
            let is_leaf = attr.name == leaf_name;
            let found = if is_leaf {
                match (implied.get(&attr.param), leaf) {
                    (Some(v), _) => Some((v.clone(), Source::Parsed)),
                    (None, Some(v)) => Some((v.to_string(), Source::Argument(leaf_arg.to_string()))),
                    (None, None) => self.run_fallthroughs(attr, &resolved, memo)?,
                }
            } else if let Some(v) = attributes.get(&attr.name).filter(|v| !v.is_empty()) {
                Some((v.clone(), Source::Argument(attr.flag_name())))
            } else if let Some(v) = implied.get(&attr.param) {
                Some((v.clone(), Source::Parsed))
            } else {
                self.run_fallthroughs(attr, &resolved, memo)?
            };

            let Some((value, source)) = found else {
                let mut ways = Vec::new();
                if is_leaf {
                    ways.push(format!("provide the argument [{leaf_arg}] on the command line"));
                } else if attr.has_flag {
                    ways.push(format!("provide the argument [{}] on the command line", attr.flag_name()));
                }
                for ft in &attr.fallthroughs {
                    match ft {
                        FallThrough::Property(key) => ways.push(format!("set the property [{key}]")),
                        FallThrough::Attribute { attribute, .. } => {
                            ways.push(format!("provide the attribute [{attribute}]"))
                        }
                        FallThrough::Fallback { hint, .. } => ways.push(hint.clone()),
                        FallThrough::Prompt(_) | FallThrough::Value(_) => {}
                    }
                }
                return Err(ConceptError::RequiredAttributeMissing {
                    resource: spec.resource_name.clone(),
                    attribute: attr.name.clone(),
                    ways,
                }
                .into());
            };

            tracing::debug!(
                "Resolved attribute [{}] of {} to [{}] from {}",
                attr.name,
                spec.resource_name,
                value,
                source
            );
            resolved.insert(attr.name.clone(), value);
            sources.push((attr.name.clone(), source));
        }
        sources.reverse();

        let params: Vec<(&str, &str)> = spec
            .attributes
            .iter()
            .filter_map(|a| resolved.get(&a.name).map(|v| (a.param.as_str(), v.as_str())))
            .collect();
        let reference = self
            .registry
            .create(&spec.collection, spec.api_version.as_deref(), &params)?;
        Ok(Resolved { reference, sources })
    }

    /// Parameters implied by a URL or relative name. A slash-containing
    /// value that is not a full name (e.g. `family/f`) implies nothing.
    fn parse_full_name(&self, spec: &ResourceSpec, input: &str) -> Result<BTreeMap<String, String>> {
        if !input.contains('/') {
            return Ok(BTreeMap::new());
        }
        let mut opts = ParseOptions::collection(&spec.collection);
        if let Some(version) = spec.api_version.as_deref() {
            opts = opts.api_version(version);
        }
        match self.registry.parse(input, &opts) {
            Ok(reference) => Ok(reference.as_map()),
            Err(ResourceError::RequiredParameterMissing { .. }) => Ok(BTreeMap::new()),
            Err(e) => Err(e.into()),
        }
    }

    fn run_fallthroughs(
        &self,
        attr: &super::spec::AttributeConfig,
        resolved: &BTreeMap<String, String>,
        memo: &mut BTreeMap<String, (String, Source)>,
    ) -> Result<Option<(String, Source)>> {
        if let Some(hit) = memo.get(&attr.name) {
            return Ok(Some(hit.clone()));
        }
        for ft in &attr.fallthroughs {
            let found = match ft {
                FallThrough::Property(key) => self
                    .properties
                    .get(key)
                    .map(|v| (v, Source::Property(key.clone()))),
                FallThrough::Attribute { attribute, derive } => resolved
                    .get(attribute)
                    .and_then(|v| derive(v))
                    .map(|v| (v, Source::Attribute(attribute.clone()))),
                FallThrough::Fallback { label, func, .. } => {
                    let ctx = FallbackContext {
                        properties: self.properties,
                        resolved,
                    };
                    func(&ctx).map(|v| (v, Source::Fallback(label.clone())))
                }
                FallThrough::Prompt(message) => match self.console {
                    Some(console) if console.can_prompt() => console
                        .prompt_string(message)?
                        .map(|v| (v, Source::Prompt)),
                    _ => None,
                },
                FallThrough::Value(v) => Some((v.clone(), Source::Value)),
            };
            if let Some((value, source)) = found.filter(|(v, _)| !v.is_empty()) {
                memo.insert(attr.name.clone(), (value.clone(), source.clone()));
                return Ok(Some((value, source)));
            }
        }
        Ok(None)
    }
}
