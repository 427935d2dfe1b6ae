//! Scoped property lookup
//!
//! Every layer is read once when the store is built; lookups are pure
//! after that. Writes either stay in memory for the invocation (flag scope)
//! or rewrite exactly one file atomically.

use super::configurations::{self, ConfigPaths};
use super::{lookup, normalize_key, parse_bool, PropertyError, Scope};
use std::collections::BTreeMap;

/// Snapshot of the process environment
pub type Env = BTreeMap<String, String>;

/// Capture the current process environment
pub fn process_env() -> Env {
    std::env::vars().collect()
}

#[derive(Debug, Clone)]
pub struct PropertyStore {
    paths: Option<ConfigPaths>,
    active: String,
    env: Env,
    layers: BTreeMap<Scope, BTreeMap<String, String>>,
}

impl PropertyStore {
    /// Load all file-backed scopes. `configuration` is the `--configuration`
    /// flag value, if any.
    pub fn load(paths: ConfigPaths, env: Env, configuration: Option<&str>) -> Result<Self, PropertyError> {
        let active = configurations::active_name(&paths, &env, configuration)?;
        let mut layers = BTreeMap::new();
        layers.insert(
            Scope::User,
            configurations::read_properties_file(&paths.configuration_file(&active)),
        );
        if let Some(file) = &paths.workspace {
            layers.insert(Scope::Workspace, configurations::read_properties_file(file));
        }
        if let Some(file) = &paths.installation {
            layers.insert(Scope::Installation, configurations::read_properties_file(file));
        }
        tracing::debug!("Loaded properties for configuration {}", active);
        Ok(Self {
            paths: Some(paths),
            active,
            env,
            layers,
        })
    }

    /// A store with no backing files
    pub fn in_memory(env: Env) -> Self {
        Self {
            paths: None,
            active: configurations::DEFAULT_CONFIGURATION.to_string(),
            env,
            layers: BTreeMap::new(),
        }
    }

    /// Name of the configuration backing the user scope
    pub fn active_configuration(&self) -> &str {
        &self.active
    }

    pub fn paths(&self) -> Option<&ConfigPaths> {
        self.paths.as_ref()
    }

    pub fn env(&self) -> &Env {
        &self.env
    }

    pub fn get(&self, key: &str) -> Option<String> {
        self.get_with_source(key).map(|(value, _)| value)
    }

    /// Value and the scope that supplied it
    pub fn get_with_source(&self, key: &str) -> Option<(String, Scope)> {
        let key = normalize_key(key);
        let def = lookup(&key).ok();
        for scope in Scope::PRECEDENCE {
            let value = match scope {
                Scope::Env => def.as_ref().and_then(|d| {
                    d.env_vars()
                        .iter()
                        .find_map(|var| self.env.get(var).filter(|v| !v.is_empty()).cloned())
                }),
                Scope::Default => def.as_ref().and_then(|d| d.default.map(String::from)),
                _ => self
                    .layers
                    .get(&scope)
                    .and_then(|layer| layer.get(&key))
                    .filter(|v| !v.is_empty())
                    .cloned(),
            };
            if let Some(value) = value {
                return Some((value, scope));
            }
        }
        None
    }

    /// Boolean view of a property; unset or unparseable reads as false
    pub fn get_bool(&self, key: &str) -> bool {
        match self.get(key) {
            Some(value) => parse_bool(&value).unwrap_or_else(|| {
                tracing::warn!("Property [{}] has non-boolean value [{}]", key, value);
                false
            }),
            None => false,
        }
    }

    /// Value of a property that must be set
    pub fn get_required(&self, key: &str) -> Result<String, PropertyError> {
        let key = normalize_key(key);
        if let Some(value) = self.get(&key) {
            return Ok(value);
        }
        let def = lookup(&key)?;
        let name = key.strip_prefix("core/").unwrap_or(&key).to_string();
        let mut remedy = format!("To set the [{name}] property, do one of the following:\n");
        if let Some(flag) = def.flag {
            remedy.push_str(&format!(" - Set it for this invocation with `{flag}`.\n"));
        }
        remedy.push_str(&format!(
            " - Set it as the default with `gcloud config set {key} <value>`.\n - Set the {} environment variable.",
            def.env_vars().first().cloned().unwrap_or_default()
        ));
        Err(PropertyError::RequiredProperty { name, remedy })
    }

    /// Set a value in memory for this invocation only
    pub fn set(&mut self, key: &str, value: &str, scope: Scope) -> Result<(), PropertyError> {
        let key = normalize_key(key);
        lookup(&key)?.validate(value)?;
        self.layers
            .entry(scope)
            .or_default()
            .insert(key, value.to_string());
        Ok(())
    }

    /// Write a value (or remove it, with `None`) to the file behind `scope`
    pub fn persist(&mut self, key: &str, value: Option<&str>, scope: Scope) -> Result<(), PropertyError> {
        let key = normalize_key(key);
        let def = lookup(&key)?;
        if let Some(value) = value {
            def.validate(value)?;
        }
        let file = self
            .paths
            .as_ref()
            .and_then(|paths| match scope {
                Scope::User => Some(paths.configuration_file(&self.active)),
                Scope::Workspace => paths.workspace.clone(),
                Scope::Installation => paths.installation.clone(),
                _ => None,
            })
            .ok_or(PropertyError::ScopeUnavailable(scope))?;

        let mut props = configurations::read_properties_file(&file);
        match value {
            Some(value) => props.insert(key.clone(), value.to_string()),
            None => props.remove(&key),
        };
        configurations::write_properties_file(&file, &props)?;
        tracing::debug!("Persisted {} to {} scope ({})", key, scope, file.display());
        self.layers.insert(scope, props);
        Ok(())
    }

    /// Effective value of every property that is set anywhere
    pub fn all(&self) -> BTreeMap<String, (String, Scope)> {
        let mut keys: Vec<String> = super::known_keys().map(String::from).collect();
        for layer in self.layers.values() {
            keys.extend(layer.keys().cloned());
        }
        keys.sort();
        keys.dedup();
        keys.into_iter()
            .filter_map(|key| self.get_with_source(&key).map(|found| (key, found)))
            .collect()
    }

    /// `api -> url` pairs from `api_endpoint_overrides/<api>` across all scopes
    pub fn endpoint_overrides(&self) -> Vec<(String, String)> {
        let mut apis: Vec<String> = self
            .layers
            .values()
            .flat_map(|layer| layer.keys())
            .filter_map(|k| k.strip_prefix("api_endpoint_overrides/"))
            .map(String::from)
            .collect();
        apis.extend(
            self.env
                .keys()
                .filter_map(|k| k.strip_prefix("CLOUDSDK_API_ENDPOINT_OVERRIDES_"))
                .map(|api| api.to_ascii_lowercase()),
        );
        apis.sort();
        apis.dedup();
        apis.into_iter()
            .filter_map(|api| {
                self.get(&format!("api_endpoint_overrides/{api}"))
                    .map(|url| (api, url))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn env(pairs: &[(&str, &str)]) -> Env {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    fn store_with_files(dir: &TempDir) -> PropertyStore {
        let root = dir.path().join("cfg");
        let install = dir.path().join("install");
        std::fs::create_dir_all(root.join("configurations")).unwrap();
        std::fs::create_dir_all(&install).unwrap();
        std::fs::write(
            root.join("configurations").join("config_default"),
            "[core]\nproject = user-project\n[compute]\nzone = us-east1-b\n",
        )
        .unwrap();
        std::fs::write(install.join("properties"), "core/project=install-project\ncompute/region=europe-west1\n")
            .unwrap();
        let paths = ConfigPaths {
            root,
            installation: Some(install.join("properties")),
            workspace: None,
        };
        PropertyStore::load(paths, Env::new(), None).unwrap()
    }

    #[test]
    fn test_precedence_across_scopes() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with_files(&dir);
        assert_eq!(
            store.get_with_source("core/project"),
            Some(("user-project".to_string(), Scope::User))
        );
        assert_eq!(
            store.get_with_source("compute/region"),
            Some(("europe-west1".to_string(), Scope::Installation))
        );
        assert_eq!(
            store.get_with_source("core/verbosity"),
            Some(("warning".to_string(), Scope::Default))
        );

        store.set("core/project", "flag-project", Scope::Flag).unwrap();
        assert_eq!(store.get("project").as_deref(), Some("flag-project"));
    }

    #[test]
    fn test_env_short_form_wins() {
        let store = PropertyStore::in_memory(env(&[
            ("CLOUDSDK_CORE_PROJECT", "long"),
            ("CLOUDSDK_PROJECT", "short"),
            ("CLOUDSDK_COMPUTE_ZONE", "asia-east1-a"),
        ]));
        assert_eq!(
            store.get_with_source("core/project"),
            Some(("short".to_string(), Scope::Env))
        );
        assert_eq!(store.get("compute/zone").as_deref(), Some("asia-east1-a"));
    }

    #[test]
    fn test_empty_env_value_is_unset() {
        let store = PropertyStore::in_memory(env(&[("CLOUDSDK_PROJECT", "")]));
        assert_eq!(store.get("core/project"), None);
    }

    #[test]
    fn test_get_bool() {
        let mut store = PropertyStore::in_memory(env(&[("CLOUDSDK_CORE_DISABLE_PROMPTS", "1")]));
        assert!(store.get_bool("core/disable_prompts"));
        assert!(store.get_bool("core/user_output_enabled"));
        store.set("core/user_output_enabled", "off", Scope::Flag).unwrap();
        assert!(!store.get_bool("core/user_output_enabled"));
    }

    #[test]
    fn test_set_rejects_unknown_and_invalid() {
        let mut store = PropertyStore::in_memory(Env::new());
        assert!(matches!(
            store.set("compute/zoen", "x", Scope::Flag),
            Err(PropertyError::InvalidProperty(..))
        ));
        assert!(matches!(
            store.set("core/verbosity", "loud", Scope::Flag),
            Err(PropertyError::InvalidValue { .. })
        ));
    }

    #[test]
    fn test_required_property_message() {
        let store = PropertyStore::in_memory(Env::new());
        let err = store.get_required("core/project").unwrap_err();
        let text = err.to_string();
        assert!(text.contains("[project] is not currently set"));
        assert!(text.contains("--project"));
        assert!(text.contains("CLOUDSDK_PROJECT"));
    }

    #[test]
    fn test_persist_and_unset() {
        let dir = TempDir::new().unwrap();
        let mut store = store_with_files(&dir);
        store.persist("compute/zone", Some("us-west1-a"), Scope::User).unwrap();
        assert_eq!(store.get("compute/zone").as_deref(), Some("us-west1-a"));

        let reloaded = PropertyStore::load(
            store.paths().cloned().unwrap(),
            Env::new(),
            None,
        )
        .unwrap();
        assert_eq!(reloaded.get("compute/zone").as_deref(), Some("us-west1-a"));

        store.persist("compute/zone", None, Scope::User).unwrap();
        assert_eq!(store.get("compute/zone"), None);
        assert!(matches!(
            store.persist("core/project", Some("x"), Scope::Workspace),
            Err(PropertyError::ScopeUnavailable(Scope::Workspace))
        ));
    }

    #[test]
    fn test_endpoint_overrides_collected() {
        let mut store = PropertyStore::in_memory(env(&[(
            "CLOUDSDK_API_ENDPOINT_OVERRIDES_PUBSUB",
            "http://localhost:8085/",
        )]));
        store
            .set("api_endpoint_overrides/compute", "http://localhost:3990/compute/", Scope::Flag)
            .unwrap();
        assert_eq!(
            store.endpoint_overrides(),
            vec![
                ("compute".to_string(), "http://localhost:3990/compute/".to_string()),
                ("pubsub".to_string(), "http://localhost:8085/".to_string()),
            ]
        );
    }

    #[test]
    fn test_all_lists_effective_values() {
        let dir = TempDir::new().unwrap();
        let store = store_with_files(&dir);
        let all = store.all();
        assert_eq!(all["core/project"].0, "user-project");
        assert_eq!(all["compute/zone"].1, Scope::User);
        assert!(!all.contains_key("core/account"));
    }
}
