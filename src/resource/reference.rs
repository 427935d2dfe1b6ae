//! Resource references
//!
//! A [`Reference`] binds a [`Collection`] to a complete set of parameter
//! values. References are immutable and can only be built through the
//! registry, which rejects unknown or missing parameters.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// One segment of a collection path template
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Literal(String),
    Param(String),
}

/// A named class of resources with a URI template
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Collection {
    pub api_name: String,
    pub api_version: String,
    /// Name within the API, e.g. `instances` or `projects.topics`
    pub name: String,
    /// Ordered parameter names, in template order
    pub params: Vec<String>,
    pub path: String,
    pub(crate) segments: Vec<Segment>,
}

impl Collection {
    /// Dotted id, e.g. `compute.instances`
    pub fn full_name(&self) -> String {
        format!("{}.{}", self.api_name, self.name)
    }

    /// The parameter bound to the terminal path segment
    pub fn terminal_param(&self) -> &str {
        self.params.last().map(String::as_str).unwrap_or_default()
    }

    pub fn segments(&self) -> &[Segment] {
        &self.segments
    }
}

/// Split a path template into literal and parameter segments
pub(crate) fn parse_template(path: &str) -> Vec<Segment> {
    path.trim_matches('/')
        .split('/')
        .map(|seg| {
            if seg.starts_with('{') && seg.ends_with('}') && seg.len() > 2 {
                Segment::Param(seg[1..seg.len() - 1].to_string())
            } else {
                Segment::Literal(seg.to_string())
            }
        })
        .collect()
}

/// Percent-encode a parameter value for use in a URL path.
/// Slashes are kept so multi-segment names stay readable.
pub(crate) fn encode_path_value(value: &str) -> String {
    value
        .split('/')
        .map(|piece| urlencoding::encode(piece).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}

/// An immutable binding of a collection to concrete parameter values
#[derive(Debug, Clone)]
pub struct Reference {
    collection: Arc<Collection>,
    base_url: String,
    values: Vec<String>,
}

impl Reference {
    /// Caller guarantees `values` lines up with `collection.params`
    pub(crate) fn new(collection: Arc<Collection>, base_url: String, values: Vec<String>) -> Self {
        debug_assert_eq!(collection.params.len(), values.len());
        Self {
            collection,
            base_url,
            values,
        }
    }

    /// Dotted collection id, e.g. `compute.instances`
    pub fn collection(&self) -> String {
        self.collection.full_name()
    }

    pub fn collection_info(&self) -> &Collection {
        &self.collection
    }

    pub fn api_name(&self) -> &str {
        &self.collection.api_name
    }

    pub fn api_version(&self) -> &str {
        &self.collection.api_version
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Value of one parameter
    pub fn get(&self, param: &str) -> Option<&str> {
        self.collection
            .params
            .iter()
            .position(|p| p == param)
            .map(|idx| self.values[idx].as_str())
    }

    /// Parameters in template order
    pub fn params(&self) -> Vec<(&str, &str)> {
        self.collection
            .params
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().map(String::as_str))
            .collect()
    }

    pub fn as_map(&self) -> BTreeMap<String, String> {
        self.params()
            .into_iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    /// Atomic name: the terminal parameter value
    pub fn name(&self) -> &str {
        self.values.last().map(String::as_str).unwrap_or_default()
    }

    /// Path portion without host and API version, e.g. `projects/p/zones/z/instances/i`
    pub fn relative_name(&self) -> String {
        self.render_path(|v| v.to_string())
    }

    /// Full URL including API host and version
    pub fn self_link(&self) -> String {
        format!("{}{}", self.base_url, self.render_path(encode_path_value))
    }

    fn render_path(&self, render: impl Fn(&str) -> String) -> String {
        let mut idx = 0;
        self.collection
            .segments
            .iter()
            .map(|seg| match seg {
                Segment::Literal(lit) => lit.clone(),
                Segment::Param(_) => {
                    let out = render(&self.values[idx]);
                    idx += 1;
                    out
                }
            })
            .collect::<Vec<_>>()
            .join("/")
    }
}

impl PartialEq for Reference {
    fn eq(&self, other: &Self) -> bool {
        self.collection.api_name == other.collection.api_name
            && self.collection.api_version == other.collection.api_version
            && self.collection.name == other.collection.name
            && self.values == other.values
    }
}

impl Eq for Reference {}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.self_link())
    }
}
