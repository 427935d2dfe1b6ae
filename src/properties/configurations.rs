//! Config directory layout and named configurations
//!
//! ```text
//! <root>/
//!   active_config                  name of the active configuration
//!   configurations/config_<name>   one `section/name=value` line per property
//!   logs/
//! ```

use super::store::Env;
use super::PropertyError;
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Name of the configuration used when nothing else selects one
pub const DEFAULT_CONFIGURATION: &str = "default";

const ACTIVE_CONFIG_FILE: &str = "active_config";
const CONFIGURATIONS_DIR: &str = "configurations";
const WORKSPACE_DIR: &str = ".gcloud";

/// Locations of every property file for one invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigPaths {
    /// Per-user config root
    pub root: PathBuf,
    /// Installation-wide properties file
    pub installation: Option<PathBuf>,
    /// Workspace properties file, found by walking up from the working directory
    pub workspace: Option<PathBuf>,
}

impl ConfigPaths {
    /// Resolve paths from the environment and working directory.
    /// `CLOUDSDK_CONFIG` wins, else `~/.config/gcloud`.
    pub fn discover(env: &Env, cwd: Option<&Path>) -> Option<Self> {
        let root = env
            .get("CLOUDSDK_CONFIG")
            .map(PathBuf::from)
            .or_else(|| dirs::config_dir().map(|p| p.join("gcloud")))?;
        let installation = env
            .get("CLOUDSDK_ROOT")
            .map(|r| PathBuf::from(r).join("properties"));
        let workspace = cwd.and_then(find_workspace);
        Some(Self {
            root,
            installation,
            workspace,
        })
    }

    /// Paths rooted at one directory, with no installation or workspace file
    pub fn rooted(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            installation: None,
            workspace: None,
        }
    }

    pub fn active_config_file(&self) -> PathBuf {
        self.root.join(ACTIVE_CONFIG_FILE)
    }

    pub fn configurations_dir(&self) -> PathBuf {
        self.root.join(CONFIGURATIONS_DIR)
    }

    pub fn configuration_file(&self, name: &str) -> PathBuf {
        self.configurations_dir().join(format!("config_{name}"))
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.root.join("logs")
    }
}

fn find_workspace(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .map(|dir| dir.join(WORKSPACE_DIR).join("properties"))
        .find(|candidate| candidate.is_file())
}

/// Check a configuration name against `[a-z][-a-z0-9]*`
pub fn validate_name(name: &str) -> Result<(), PropertyError> {
    static NAME_RE: OnceLock<regex::Regex> = OnceLock::new();
    let re = NAME_RE
        .get_or_init(|| regex::Regex::new(r"^[a-z][-a-z0-9]*$").expect("static pattern compiles"));
    if re.is_match(name) {
        Ok(())
    } else {
        Err(PropertyError::InvalidConfigurationName(name.to_string()))
    }
}

/// A named bundle of user-scoped properties
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Configuration {
    pub name: String,
    pub is_active: bool,
    pub properties: BTreeMap<String, String>,
}

/// Name of the active configuration:
/// explicit selection > `CLOUDSDK_ACTIVE_CONFIG_NAME` > `active_config` file > `default`
pub fn active_name(
    paths: &ConfigPaths,
    env: &Env,
    explicit: Option<&str>,
) -> Result<String, PropertyError> {
    if let Some(name) = explicit {
        validate_name(name)?;
        return Ok(name.to_string());
    }
    if let Some(name) = env.get("CLOUDSDK_ACTIVE_CONFIG_NAME").filter(|n| !n.is_empty()) {
        validate_name(name)?;
        return Ok(name.clone());
    }
    match std::fs::read_to_string(paths.active_config_file()) {
        Ok(content) => {
            let name = content.trim();
            if name.is_empty() {
                return Ok(DEFAULT_CONFIGURATION.to_string());
            }
            if validate_name(name).is_err() {
                tracing::warn!("Ignoring invalid name in {}", ACTIVE_CONFIG_FILE);
                return Ok(DEFAULT_CONFIGURATION.to_string());
            }
            Ok(name.to_string())
        }
        Err(_) => Ok(DEFAULT_CONFIGURATION.to_string()),
    }
}

/// Names of every configuration on disk, sorted
pub fn list_names(paths: &ConfigPaths) -> Vec<String> {
    let Ok(entries) = std::fs::read_dir(paths.configurations_dir()) else {
        return Vec::new();
    };
    let mut names: Vec<String> = entries
        .filter_map(|e| e.ok())
        .filter_map(|e| {
            e.file_name()
                .to_str()
                .and_then(|n| n.strip_prefix("config_"))
                .map(String::from)
        })
        .filter(|n| validate_name(n).is_ok())
        .collect();
    names.sort();
    names
}

/// Every configuration with its properties. `default` is listed even when
/// it has no file yet.
pub fn list(paths: &ConfigPaths, active: &str) -> Vec<Configuration> {
    let mut names = list_names(paths);
    if !names.iter().any(|n| n == DEFAULT_CONFIGURATION) {
        names.insert(0, DEFAULT_CONFIGURATION.to_string());
        names.sort();
    }
    names
        .into_iter()
        .map(|name| Configuration {
            is_active: name == active,
            properties: read_properties_file(&paths.configuration_file(&name)),
            name,
        })
        .collect()
}

pub fn describe(paths: &ConfigPaths, name: &str, active: &str) -> Result<Configuration, PropertyError> {
    validate_name(name)?;
    let file = paths.configuration_file(name);
    if !file.is_file() && name != DEFAULT_CONFIGURATION {
        return Err(PropertyError::ConfigurationNotFound(name.to_string()));
    }
    Ok(Configuration {
        name: name.to_string(),
        is_active: name == active,
        properties: read_properties_file(&file),
    })
}

/// Create an empty configuration, optionally making it the active one
pub fn create(paths: &ConfigPaths, name: &str, activate_it: bool) -> Result<(), PropertyError> {
    validate_name(name)?;
    let file = paths.configuration_file(name);
    if file.exists() {
        return Err(PropertyError::ConfigurationExists(name.to_string()));
    }
    write_properties_file(&file, &BTreeMap::new())?;
    tracing::debug!("Created configuration {}", name);
    if activate_it {
        activate(paths, name)?;
    }
    Ok(())
}

/// Make `name` the active configuration
pub fn activate(paths: &ConfigPaths, name: &str) -> Result<(), PropertyError> {
    validate_name(name)?;
    if name != DEFAULT_CONFIGURATION && !paths.configuration_file(name).is_file() {
        return Err(PropertyError::ConfigurationNotFound(name.to_string()));
    }
    atomic_write(&paths.active_config_file(), name)?;
    tracing::debug!("Activated configuration {}", name);
    Ok(())
}

pub fn delete(paths: &ConfigPaths, name: &str, active: &str) -> Result<(), PropertyError> {
    validate_name(name)?;
    if name == active {
        return Err(PropertyError::DeleteActive(name.to_string()));
    }
    let file = paths.configuration_file(name);
    if !file.is_file() {
        return Err(PropertyError::ConfigurationNotFound(name.to_string()));
    }
    std::fs::remove_file(&file).map_err(|e| PropertyError::Write {
        path: file.display().to_string(),
        reason: e.to_string(),
    })
}

// =============================================================================
// Property files
// =============================================================================

/// Read a property file. Accepts `section/name=value` lines as well as the
/// `[section]` / `name = value` layout; `#` and `;` start comments.
/// A missing or unreadable file reads as empty.
pub fn read_properties_file(path: &Path) -> BTreeMap<String, String> {
    match std::fs::read_to_string(path) {
        Ok(content) => parse_properties(&content),
        Err(_) => BTreeMap::new(),
    }
}

pub fn parse_properties(content: &str) -> BTreeMap<String, String> {
    let mut out = BTreeMap::new();
    let mut section: Option<String> = None;
    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if line.starts_with('[') && line.ends_with(']') {
            section = Some(line[1..line.len() - 1].trim().to_string());
            continue;
        }
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let key = key.trim();
        let full_key = match (&section, key.contains('/')) {
            (_, true) => key.to_string(),
            (Some(section), false) => format!("{section}/{key}"),
            (None, false) => format!("core/{key}"),
        };
        out.insert(full_key, value.trim().to_string());
    }
    out
}

pub fn render_properties(props: &BTreeMap<String, String>) -> String {
    props
        .iter()
        .map(|(k, v)| format!("{k}={v}\n"))
        .collect()
}

pub fn write_properties_file(path: &Path, props: &BTreeMap<String, String>) -> Result<(), PropertyError> {
    atomic_write(path, &render_properties(props))
}

/// Write via a temp file in the same directory, then rename over the target
pub(crate) fn atomic_write(path: &Path, content: &str) -> Result<(), PropertyError> {
    let fail = |e: &dyn std::fmt::Display| PropertyError::Write {
        path: path.display().to_string(),
        reason: e.to_string(),
    };
    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(dir).map_err(|e| fail(&e))?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| fail(&e))?;
    tmp.write_all(content.as_bytes()).map_err(|e| fail(&e))?;
    tmp.persist(path).map_err(|e| fail(&e.error))?;
    Ok(())
}
