//! Resource Registry - collection definitions and URI parsing
//!
//! Collections are declared in JSON files embedded at compile time and can
//! also be registered programmatically. The registry is populated at startup,
//! then shared read-only behind an `Arc` for the rest of the invocation.

use super::reference::{parse_template, Collection, Reference, Segment};
use crate::error::{CliError, ErrorKind};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use thiserror::Error;

/// Embedded API definition files (compiled into the binary)
const API_FILES: &[&str] = &[
    include_str!("collections/compute.json"),
    include_str!("collections/cloudresourcemanager.json"),
    include_str!("collections/pubsub.json"),
    include_str!("collections/storage.json"),
    include_str!("collections/dataproc.json"),
    include_str!("collections/container.json"),
];

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResourceError {
    #[error("collection [{collection}] is already registered for API version [{version}]")]
    DuplicateCollection { collection: String, version: String },
    #[error("invalid collection [{collection}]: {reason}")]
    InvalidCollection { collection: String, reason: String },
    #[error("unknown collection [{0}]")]
    UnknownCollection(String),
    #[error("unknown API [{0}]")]
    UnknownApi(String),
    #[error("API [{api}] has no registered version [{version}]")]
    UnknownApiVersion { api: String, version: String },
    #[error("could not parse resource [{input}]: {reason}")]
    InvalidResource { input: String, reason: String },
    #[error("wrong collection: expected [{expected}], got [{actual}] for [{input}]")]
    WrongCollection {
        expected: String,
        actual: String,
        input: String,
    },
    #[error("resource [{input}] is ambiguous; it matches {candidates:?}")]
    AmbiguousResource {
        input: String,
        candidates: Vec<String>,
    },
    #[error("missing required parameter [{param}] for collection [{collection}]")]
    RequiredParameterMissing { collection: String, param: String },
    #[error("unknown parameter [{param}] for collection [{collection}]")]
    UnknownParameter { collection: String, param: String },
}

impl From<ResourceError> for CliError {
    fn from(err: ResourceError) -> Self {
        let kind = match err {
            ResourceError::DuplicateCollection { .. }
            | ResourceError::InvalidCollection { .. }
            | ResourceError::UnknownCollection(_)
            | ResourceError::UnknownApi(_) => ErrorKind::Internal,
            _ => ErrorKind::Argument,
        };
        CliError::new(kind, err.to_string())
    }
}

/// One version of one API
#[derive(Debug, Clone)]
pub struct ApiInfo {
    pub name: String,
    pub version: String,
    /// Version-less root, e.g. `https://compute.googleapis.com/compute/`
    pub root_url: String,
    /// Alternate roots accepted when parsing URLs
    pub aliases: Vec<String>,
    pub is_default: bool,
    /// Whether the API honours the `X-Goog-User-Project` quota override
    pub user_project_override: bool,
}

impl ApiInfo {
    pub fn base_url(&self) -> String {
        format!("{}{}/", self.root_url, self.version)
    }
}

/// API definition file structure
#[derive(Debug, Deserialize)]
struct ApiFile {
    name: String,
    root_url: String,
    #[serde(default)]
    aliases: Vec<String>,
    versions: Vec<VersionDef>,
    #[serde(default)]
    user_project_override: bool,
    collections: Vec<CollectionDef>,
}

#[derive(Debug, Deserialize)]
struct VersionDef {
    version: String,
    #[serde(default)]
    default: bool,
}

#[derive(Debug, Deserialize)]
struct CollectionDef {
    name: String,
    path: String,
}

/// Options for [`Registry::parse`]
#[derive(Default)]
pub struct ParseOptions<'a> {
    /// Expected collection, e.g. `compute.instances`
    pub collection: Option<&'a str>,
    /// Rebind the result to this API version
    pub api_version: Option<&'a str>,
    /// Explicit values for non-terminal parameters
    pub params: BTreeMap<String, String>,
    /// Consulted for parameters absent from `params`
    pub resolver: Option<&'a (dyn Fn(&str) -> Option<String> + Sync)>,
}

impl<'a> ParseOptions<'a> {
    pub fn collection(collection: &'a str) -> Self {
        Self {
            collection: Some(collection),
            ..Default::default()
        }
    }

    pub fn param(mut self, name: &str, value: &str) -> Self {
        self.params.insert(name.to_string(), value.to_string());
        self
    }

    pub fn api_version(mut self, version: &'a str) -> Self {
        self.api_version = Some(version);
        self
    }

    pub fn resolver(mut self, resolver: &'a (dyn Fn(&str) -> Option<String> + Sync)) -> Self {
        self.resolver = Some(resolver);
        self
    }
}

/// Canonical resource collections and the parser over them
#[derive(Debug, Default)]
pub struct Registry {
    apis: Vec<ApiInfo>,
    /// Registration order is kept; it breaks no ties but makes listings stable
    collections: Vec<Arc<Collection>>,
    index: HashMap<(String, String), usize>,
    endpoint_overrides: HashMap<String, String>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding every embedded API definition
    pub fn builtin() -> Result<Self, ResourceError> {
        let mut registry = Self::new();
        for content in API_FILES {
            let file: ApiFile =
                serde_json::from_str(content).map_err(|e| ResourceError::InvalidCollection {
                    collection: "<embedded>".to_string(),
                    reason: e.to_string(),
                })?;
            registry.load_api_file(file)?;
        }
        Ok(registry)
    }

    fn load_api_file(&mut self, file: ApiFile) -> Result<(), ResourceError> {
        for version in &file.versions {
            self.register_api(ApiInfo {
                name: file.name.clone(),
                version: version.version.clone(),
                root_url: file.root_url.clone(),
                aliases: file.aliases.clone(),
                is_default: version.default,
                user_project_override: file.user_project_override,
            });
            for def in &file.collections {
                let params = template_params(&def.path);
                let params: Vec<&str> = params.iter().map(String::as_str).collect();
                self.register(
                    &format!("{}.{}", file.name, def.name),
                    &params,
                    &def.path,
                    &version.version,
                )?;
            }
        }
        Ok(())
    }

    /// Declare an API version. Re-declaring replaces the previous entry.
    pub fn register_api(&mut self, info: ApiInfo) {
        self.apis
            .retain(|a| !(a.name == info.name && a.version == info.version));
        self.apis.push(info);
    }

    /// Declare one collection for one API version.
    ///
    /// `params` must list the template's parameters in template order.
    pub fn register(
        &mut self,
        collection: &str,
        params: &[&str],
        path: &str,
        api_version: &str,
    ) -> Result<(), ResourceError> {
        let Some((api_name, name)) = collection.split_once('.') else {
            return Err(ResourceError::InvalidCollection {
                collection: collection.to_string(),
                reason: "collection ids have the form <api>.<name>".to_string(),
            });
        };
        if self.api(api_name, api_version).is_none() {
            return Err(ResourceError::UnknownApiVersion {
                api: api_name.to_string(),
                version: api_version.to_string(),
            });
        }
        let key = (collection.to_string(), api_version.to_string());
        if self.index.contains_key(&key) {
            return Err(ResourceError::DuplicateCollection {
                collection: collection.to_string(),
                version: api_version.to_string(),
            });
        }
        let declared = template_params(path);
        if declared.iter().map(String::as_str).ne(params.iter().copied()) {
            return Err(ResourceError::InvalidCollection {
                collection: collection.to_string(),
                reason: format!("parameters {params:?} do not match template [{path}]"),
            });
        }

        let entry = Collection {
            api_name: api_name.to_string(),
            api_version: api_version.to_string(),
            name: name.to_string(),
            params: declared,
            path: path.to_string(),
            segments: parse_template(path),
        };
        self.collections.push(Arc::new(entry));
        self.index.insert(key, self.collections.len() - 1);
        tracing::debug!("Registered collection {} ({})", collection, api_version);
        Ok(())
    }

    /// Point an API at a different endpoint, e.g. a local emulator.
    /// The API version is appended unless the URL already ends with it.
    pub fn set_endpoint_override(&mut self, api: &str, url: &str) {
        let mut url = url.to_string();
        if !url.ends_with('/') {
            url.push('/');
        }
        self.endpoint_overrides.insert(api.to_string(), url);
    }

    pub fn api(&self, name: &str, version: &str) -> Option<&ApiInfo> {
        self.apis
            .iter()
            .find(|a| a.name == name && a.version == version)
    }

    pub fn apis(&self) -> &[ApiInfo] {
        &self.apis
    }

    /// Default version of an API (the one marked default, else the first declared)
    pub fn default_version(&self, api: &str) -> Option<&str> {
        self.apis
            .iter()
            .filter(|a| a.name == api)
            .find(|a| a.is_default)
            .or_else(|| self.apis.iter().find(|a| a.name == api))
            .map(|a| a.version.as_str())
    }

    /// Effective base URL for an API version, honouring endpoint overrides
    pub fn base_url(&self, api: &str, version: &str) -> Result<String, ResourceError> {
        let info = self
            .api(api, version)
            .ok_or_else(|| ResourceError::UnknownApiVersion {
                api: api.to_string(),
                version: version.to_string(),
            })?;
        Ok(match self.endpoint_overrides.get(api) {
            Some(url) if url.trim_end_matches('/').ends_with(&format!("/{version}")) => url.clone(),
            Some(url) => format!("{url}{version}/"),
            None => info.base_url(),
        })
    }

    /// Look up a collection; `version` defaults to the API's default version
    pub fn collection(
        &self,
        collection: &str,
        version: Option<&str>,
    ) -> Result<Arc<Collection>, ResourceError> {
        let api = collection.split('.').next().unwrap_or_default();
        let version = match version {
            Some(v) => v.to_string(),
            None => self
                .default_version(api)
                .ok_or_else(|| ResourceError::UnknownApi(api.to_string()))?
                .to_string(),
        };
        self.index
            .get(&(collection.to_string(), version.clone()))
            .map(|idx| self.collections[*idx].clone())
            .ok_or_else(|| {
                if self.api(api, &version).is_none() && self.default_version(api).is_some() {
                    ResourceError::UnknownApiVersion {
                        api: api.to_string(),
                        version,
                    }
                } else {
                    ResourceError::UnknownCollection(collection.to_string())
                }
            })
    }

    /// All collection ids registered for the default version of each API
    pub fn collection_names(&self) -> Vec<String> {
        self.collections
            .iter()
            .filter(|c| self.default_version(&c.api_name) == Some(c.api_version.as_str()))
            .map(|c| c.full_name())
            .collect()
    }

    /// Build a reference from explicit parameter values.
    ///
    /// Unknown keys and missing parameters are rejected.
    pub fn create(
        &self,
        collection: &str,
        version: Option<&str>,
        params: &[(&str, &str)],
    ) -> Result<Reference, ResourceError> {
        let info = self.collection(collection, version)?;
        for (key, _) in params {
            if !info.params.iter().any(|p| p == key) {
                return Err(ResourceError::UnknownParameter {
                    collection: collection.to_string(),
                    param: key.to_string(),
                });
            }
        }
        let values = info
            .params
            .iter()
            .map(|p| {
                params
                    .iter()
                    .find(|(k, _)| k == p)
                    .map(|(_, v)| v.to_string())
                    .filter(|v| !v.is_empty())
                    .ok_or_else(|| ResourceError::RequiredParameterMissing {
                        collection: collection.to_string(),
                        param: p.clone(),
                    })
            })
            .collect::<Result<Vec<_>, _>>()?;
        self.bind(info, values)
    }

    fn bind(&self, info: Arc<Collection>, values: Vec<String>) -> Result<Reference, ResourceError> {
        let base = self.base_url(&info.api_name, &info.api_version)?;
        Ok(Reference::new(info, base, values))
    }

    /// Parse a bare id, a relative name, or a URL into a reference.
    pub fn parse(&self, input: &str, opts: &ParseOptions<'_>) -> Result<Reference, ResourceError> {
        let trimmed = input.trim_end_matches('/');
        if trimmed.is_empty() {
            return Err(ResourceError::InvalidResource {
                input: input.to_string(),
                reason: "empty resource name".to_string(),
            });
        }

        if let Some(hint) = opts.collection {
            let info = self.collection(hint, opts.api_version)?;
            if let Some(key) = opts.params.keys().find(|k| !info.params.contains(k)) {
                return Err(ResourceError::UnknownParameter {
                    collection: hint.to_string(),
                    param: key.clone(),
                });
            }
        }

        let reference = if trimmed.starts_with("https://") || trimmed.starts_with("http://") {
            self.parse_url(trimmed, opts)?
        } else if trimmed.contains('/') && self.looks_relative(trimmed, opts) {
            self.parse_relative(trimmed, opts)?
        } else {
            self.parse_bare(trimmed, opts)?
        };

        tracing::debug!("Parsed [{}] as {}", input, reference.collection());
        Ok(reference)
    }

    /// Strict relative-name parse against one collection
    pub fn parse_relative_name(
        &self,
        name: &str,
        collection: &str,
    ) -> Result<Reference, ResourceError> {
        let info = self.collection(collection, None)?;
        let segs: Vec<&str> = name.trim_matches('/').split('/').collect();
        match match_segments(&info, &segs, false) {
            Some(values) => self.bind(info, values),
            None => Err(ResourceError::InvalidResource {
                input: name.to_string(),
                reason: format!(
                    "it does not match the template [{}] of collection [{}]",
                    info.path, collection
                ),
            }),
        }
    }

    /// Reference to the containing resource: the collection in the same API
    /// version whose template is the longest strict prefix of this one.
    pub fn parent(&self, reference: &Reference) -> Option<Reference> {
        let info = reference.collection_info();
        let candidate = self
            .collections
            .iter()
            .filter(|c| c.api_name == info.api_name && c.api_version == info.api_version)
            .filter(|c| {
                c.segments.len() < info.segments.len()
                    && info.segments[..c.segments.len()] == c.segments[..]
            })
            .max_by_key(|c| c.segments.len())?;
        let values = reference
            .params()
            .into_iter()
            .take(candidate.params.len())
            .map(|(_, v)| v.to_string())
            .collect();
        Some(Reference::new(
            candidate.clone(),
            reference.base_url().to_string(),
            values,
        ))
    }

    // =========================================================================
    // Parsing internals
    // =========================================================================

    /// A slash-containing input is a relative name unless a collection hint
    /// says otherwise (names such as `family/f` are terminal values).
    fn looks_relative(&self, input: &str, opts: &ParseOptions<'_>) -> bool {
        let Some(hint) = opts.collection else {
            return true;
        };
        let Ok(info) = self.collection(hint, opts.api_version) else {
            return true;
        };
        match info.segments.first() {
            Some(Segment::Literal(first)) => input.split('/').next() == Some(first.as_str()),
            _ => true,
        }
    }

    fn parse_url(&self, url: &str, opts: &ParseOptions<'_>) -> Result<Reference, ResourceError> {
        let parsed = url::Url::parse(url).map_err(|e| ResourceError::InvalidResource {
            input: url.to_string(),
            reason: e.to_string(),
        })?;
        let without_query = format!(
            "{}{}",
            &parsed[..url::Position::BeforePath],
            parsed.path()
        );

        let (api, version, rest) = self.split_api_url(&without_query).ok_or_else(|| {
            ResourceError::InvalidResource {
                input: url.to_string(),
                reason: "the URL does not belong to a known API".to_string(),
            }
        })?;

        let version = match opts.api_version {
            Some(explicit) => explicit.to_string(),
            None => version,
        };
        if self.api(&api, &version).is_none() {
            return Err(ResourceError::UnknownApiVersion { api, version });
        }

        let segs: Vec<String> = rest
            .trim_matches('/')
            .split('/')
            .map(|s| {
                urlencoding::decode(s)
                    .map(|d| d.into_owned())
                    .unwrap_or_else(|_| s.to_string())
            })
            .collect();
        let segs: Vec<&str> = segs.iter().map(String::as_str).collect();

        let candidates: Vec<Arc<Collection>> = self
            .collections
            .iter()
            .filter(|c| c.api_name == api && c.api_version == version)
            .cloned()
            .collect();
        let (info, values) = pick_match(&candidates, &segs, url)?;
        check_hint(opts.collection, &info, url)?;
        self.bind(info, values)
    }

    /// Split a URL into (api, version, path after version)
    fn split_api_url(&self, url: &str) -> Option<(String, String, String)> {
        for info in &self.apis {
            let mut roots: Vec<String> = vec![info.root_url.clone()];
            roots.extend(info.aliases.iter().cloned());
            if let Some(over) = self.endpoint_overrides.get(&info.name) {
                let over_root = over
                    .trim_end_matches('/')
                    .strip_suffix(&format!("/{}", info.version))
                    .map(|r| format!("{r}/"))
                    .unwrap_or_else(|| over.clone());
                roots.push(over_root);
            }
            for root in roots {
                if let Some(rest) = url.strip_prefix(root.as_str()) {
                    let (version, path) = rest.split_once('/').unwrap_or((rest, ""));
                    if self.api(&info.name, version).is_some() || looks_like_version(version)
                    {
                        return Some((info.name.clone(), version.to_string(), path.to_string()));
                    }
                }
            }
        }
        None
    }

    fn parse_relative(
        &self,
        name: &str,
        opts: &ParseOptions<'_>,
    ) -> Result<Reference, ResourceError> {
        let segs: Vec<&str> = name.trim_start_matches('/').split('/').collect();
        let candidates: Vec<Arc<Collection>> = match opts.collection {
            Some(hint) => vec![self.collection(hint, opts.api_version)?],
            None => self
                .collections
                .iter()
                .filter(|c| self.default_version(&c.api_name) == Some(c.api_version.as_str()))
                .cloned()
                .collect(),
        };
        let (info, values) = pick_match(&candidates, &segs, name)?;
        self.bind(info, values)
    }

    fn parse_bare(&self, id: &str, opts: &ParseOptions<'_>) -> Result<Reference, ResourceError> {
        let Some(hint) = opts.collection else {
            return Err(ResourceError::InvalidResource {
                input: id.to_string(),
                reason: "a collection is required to parse a bare name".to_string(),
            });
        };
        let info = self.collection(hint, opts.api_version)?;
        let terminal = info.params.len().saturating_sub(1);
        let mut values = Vec::with_capacity(info.params.len());
        for (idx, param) in info.params.iter().enumerate() {
            if idx == terminal {
                values.push(id.to_string());
                continue;
            }
            let value = opts
                .params
                .get(param)
                .cloned()
                .or_else(|| opts.resolver.and_then(|r| r(param)))
                .filter(|v| !v.is_empty())
                .ok_or_else(|| ResourceError::RequiredParameterMissing {
                    collection: hint.to_string(),
                    param: param.clone(),
                })?;
            values.push(value);
        }
        self.bind(info, values)
    }
}

fn looks_like_version(segment: &str) -> bool {
    segment.starts_with('v') && segment[1..].starts_with(|c: char| c.is_ascii_digit())
        || matches!(segment, "alpha" | "beta")
}

/// Parameter names of a template, in order
fn template_params(path: &str) -> Vec<String> {
    parse_template(path)
        .into_iter()
        .filter_map(|s| match s {
            Segment::Param(p) => Some(p),
            Segment::Literal(_) => None,
        })
        .collect()
}

/// Match path segments against a collection template. With `greedy`, a
/// trailing parameter absorbs any extra segments.
fn match_segments(info: &Collection, segs: &[&str], greedy: bool) -> Option<Vec<String>> {
    let tmpl = &info.segments;
    let exact = segs.len() == tmpl.len();
    let absorbs = greedy && segs.len() > tmpl.len() && matches!(tmpl.last(), Some(Segment::Param(_)));
    if !exact && !absorbs {
        return None;
    }
    let mut values = Vec::with_capacity(info.params.len());
    for (idx, seg) in tmpl.iter().enumerate() {
        let is_last = idx == tmpl.len() - 1;
        match seg {
            Segment::Literal(lit) if segs[idx] == lit => {}
            Segment::Literal(_) => return None,
            Segment::Param(_) if is_last && absorbs => values.push(segs[idx..].join("/")),
            Segment::Param(_) if segs[idx].is_empty() => return None,
            Segment::Param(_) => values.push(segs[idx].to_string()),
        }
    }
    Some(values)
}

/// Exact-length matches win; otherwise the longest template whose trailing
/// parameter can absorb the remaining segments.
fn pick_match(
    candidates: &[Arc<Collection>],
    segs: &[&str],
    input: &str,
) -> Result<(Arc<Collection>, Vec<String>), ResourceError> {
    let exact: Vec<_> = candidates
        .iter()
        .filter_map(|c| match_segments(c, segs, false).map(|v| (c.clone(), v)))
        .collect();
    let mut matches = if exact.is_empty() {
        let greedy: Vec<_> = candidates
            .iter()
            .filter_map(|c| match_segments(c, segs, true).map(|v| (c.clone(), v)))
            .collect();
        let longest = greedy.iter().map(|(c, _)| c.segments.len()).max().unwrap_or(0);
        greedy
            .into_iter()
            .filter(|(c, _)| c.segments.len() == longest)
            .collect()
    } else {
        exact
    };

    match matches.len() {
        0 => Err(ResourceError::InvalidResource {
            input: input.to_string(),
            reason: "it does not match any known resource path".to_string(),
        }),
        1 => Ok(matches.remove(0)),
        _ => Err(ResourceError::AmbiguousResource {
            input: input.to_string(),
            candidates: matches.iter().map(|(c, _)| c.full_name()).collect(),
        }),
    }
}

fn check_hint(hint: Option<&str>, info: &Collection, input: &str) -> Result<(), ResourceError> {
    match hint {
        Some(expected) if expected != info.full_name() => Err(ResourceError::WrongCollection {
            expected: expected.to_string(),
            actual: info.full_name(),
            input: input.to_string(),
        }),
        _ => Ok(()),
    }
}
