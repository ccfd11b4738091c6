//! Daemon configuration.
//!
//! Loaded via the `config` crate from an optional file (JSON, TOML or YAML
//! by extension) overlaid with `TOOLBAR_`-prefixed environment variables.
//! Nested keys use `__`, e.g. `TOOLBAR_DISPATCHER__MAX_CONCURRENT_RUNS=8`.

use serde::Deserialize;
use serde_json::{Map, Value as JsonValue};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use toolbar_integration::DEFAULT_WINDOW_SECS;
use toolbar_plugin::ResolutionPolicy;
use toolbar_workflow::{DEFAULT_ACTION_TIMEOUT, DispatcherConfig};

const ENV_PREFIX: &str = "TOOLBAR";

/// Daemon configuration.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Filter used when `RUST_LOG` is unset.
    pub log_level: String,
    pub plugins: PluginsConfig,
    pub workflows: WorkflowsConfig,
    pub dispatcher: DispatchSettings,
    /// Scripts the automation plugin may run, by id.
    pub scripts: BTreeMap<String, ScriptConfig>,
    /// How long a notification fingerprint suppresses repeats.
    pub dedup_window_secs: u32,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            plugins: PluginsConfig::default(),
            workflows: WorkflowsConfig::default(),
            dispatcher: DispatchSettings::default(),
            scripts: BTreeMap::new(),
            dedup_window_secs: DEFAULT_WINDOW_SECS,
        }
    }
}

/// Plugin discovery and settings.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct PluginsConfig {
    /// Directories scanned for `<plugin>/plugin.json` manifests.
    pub dirs: Vec<PathBuf>,
    /// Plugins never instantiated.
    pub disabled: Vec<String>,
    /// Per-plugin settings merged over descriptor defaults.
    pub settings: BTreeMap<String, Map<String, JsonValue>>,
    pub resolution: ResolutionPolicy,
}

/// Where workflow definitions live.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WorkflowsConfig {
    /// Directory holding `workflows.json`.
    pub path: PathBuf,
}

impl Default for WorkflowsConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from(".toolbar"),
        }
    }
}

/// Dispatcher pool and action timeout.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct DispatchSettings {
    pub max_concurrent_runs: usize,
    pub queue_capacity: usize,
    pub action_timeout_secs: u64,
}

impl Default for DispatchSettings {
    fn default() -> Self {
        let dispatcher = DispatcherConfig::default();
        Self {
            max_concurrent_runs: dispatcher.max_concurrent_runs,
            queue_capacity: dispatcher.queue_capacity,
            action_timeout_secs: DEFAULT_ACTION_TIMEOUT.as_secs(),
        }
    }
}

impl DispatchSettings {
    #[must_use]
    pub fn dispatcher(&self) -> DispatcherConfig {
        DispatcherConfig {
            max_concurrent_runs: self.max_concurrent_runs,
            queue_capacity: self.queue_capacity,
        }
    }

    #[must_use]
    pub fn action_timeout(&self) -> Duration {
        Duration::from_secs(self.action_timeout_secs.max(1))
    }
}

/// A script the automation plugin can run.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ScriptConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub working_dir: Option<PathBuf>,
}

impl AppConfig {
    /// Loads the file at `path` (if any) overlaid with the environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the file is unreadable or a value has the wrong
    /// type.
    pub fn load(path: Option<&Path>) -> Result<Self, config::ConfigError> {
        Self::from_sources(path, environment())
    }

    fn from_sources(
        path: Option<&Path>,
        env: config::Environment,
    ) -> Result<Self, config::ConfigError> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }
        builder.add_source(env).build()?.try_deserialize()
    }
}

fn environment() -> config::Environment {
    config::Environment::with_prefix(ENV_PREFIX)
        .prefix_separator("_")
        .separator("__")
        .try_parsing(true)
        .list_separator(",")
        .with_list_parse_key("plugins.disabled")
        .with_list_parse_key("plugins.dirs")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    fn env(vars: &[(&str, &str)]) -> config::Environment {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        environment().source(Some(map))
    }

    #[test]
    fn defaults_without_sources() {
        let config = AppConfig::from_sources(None, env(&[])).unwrap();
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.dispatcher.max_concurrent_runs, 4);
        assert_eq!(config.dispatcher.action_timeout(), Duration::from_secs(30));
        assert_eq!(config.dedup_window_secs, 300);
    }

    #[test]
    fn file_then_environment() {
        let mut file = tempfile::Builder::new().suffix(".json").tempfile().unwrap();
        write!(
            file,
            r#"{{
                "log_level": "debug",
                "plugins": {{
                    "disabled": ["linear"],
                    "settings": {{ "github": {{ "merge_method": "rebase" }} }},
                    "resolution": "load_valid_prefix"
                }},
                "scripts": {{ "deploy": {{ "command": "./deploy.sh", "args": ["--dry-run"] }} }}
            }}"#
        )
        .unwrap();

        let config = AppConfig::from_sources(
            Some(file.path()),
            env(&[
                ("TOOLBAR_LOG_LEVEL", "warn"),
                ("TOOLBAR_DISPATCHER__MAX_CONCURRENT_RUNS", "1"),
            ]),
        )
        .unwrap();

        assert_eq!(config.log_level, "warn");
        assert_eq!(config.dispatcher.max_concurrent_runs, 1);
        assert_eq!(config.dispatcher.queue_capacity, 256);
        assert_eq!(config.plugins.disabled, vec!["linear".to_string()]);
        assert_eq!(config.plugins.resolution, ResolutionPolicy::LoadValidPrefix);
        assert_eq!(config.plugins.settings["github"]["merge_method"], "rebase");
        assert_eq!(config.scripts["deploy"].args, vec!["--dry-run".to_string()]);
    }

    #[test]
    fn disabled_list_from_environment() {
        let config =
            AppConfig::from_sources(None, env(&[("TOOLBAR_PLUGINS__DISABLED", "github,linear")]))
                .unwrap();
        assert_eq!(config.plugins.disabled, vec!["github", "linear"]);
    }
}
