//! Plugin discovery.
//!
//! Candidates come from two sources:
//!
//! - built-in registrations on a [`PluginCatalog`], each pairing a
//!   descriptor with a constructor
//! - `plugin.json` manifests found one level below each plugin directory
//!   (`<dir>/<plugin>/plugin.json`), bound to a registered implementation
//!   through the manifest's `implementation` key
//!
//! Problems with individual manifests are collected and reported; they
//! never stop discovery of the remaining plugins.

use crate::descriptor::PluginDescriptor;
use crate::error::DiscoveryError;
use crate::plugin::Plugin;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

/// File name of a plugin manifest.
pub const MANIFEST_FILE: &str = "plugin.json";

/// Builds a fresh plugin object.
pub type PluginConstructor = Arc<dyn Fn() -> Arc<dyn Plugin> + Send + Sync>;

/// A discovered plugin that can be instantiated.
#[derive(Clone)]
pub struct PluginCandidate {
    descriptor: Arc<PluginDescriptor>,
    constructor: PluginConstructor,
}

impl PluginCandidate {
    #[must_use]
    pub fn new(descriptor: PluginDescriptor, constructor: PluginConstructor) -> Self {
        Self {
            descriptor: Arc::new(descriptor),
            constructor,
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    #[must_use]
    pub fn descriptor(&self) -> &Arc<PluginDescriptor> {
        &self.descriptor
    }

    #[must_use]
    pub fn instantiate(&self) -> Arc<dyn Plugin> {
        (self.constructor)()
    }
}

impl fmt::Debug for PluginCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginCandidate")
            .field("descriptor", &self.descriptor)
            .finish_non_exhaustive()
    }
}

/// Result of a discovery pass.
#[derive(Debug, Default)]
pub struct Discovery {
    pub candidates: Vec<PluginCandidate>,
    pub errors: Vec<DiscoveryError>,
    /// Plugins skipped because configuration disables them.
    pub disabled: Vec<String>,
}

/// Manifests read from one directory.
#[derive(Debug, Default)]
pub struct ManifestScan {
    pub descriptors: Vec<PluginDescriptor>,
    pub errors: Vec<DiscoveryError>,
}

/// Known plugin implementations and built-in descriptors.
#[derive(Clone, Default)]
pub struct PluginCatalog {
    implementations: BTreeMap<String, PluginConstructor>,
    builtins: Vec<PluginDescriptor>,
}

impl PluginCatalog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an implementation that manifests can bind to.
    pub fn register_implementation<F>(&mut self, key: impl Into<String>, constructor: F)
    where
        F: Fn() -> Arc<dyn Plugin> + Send + Sync + 'static,
    {
        self.implementations.insert(key.into(), Arc::new(constructor));
    }

    /// Register a built-in plugin: its descriptor plus an implementation
    /// under the descriptor's implementation key.
    pub fn register<F>(&mut self, descriptor: PluginDescriptor, constructor: F)
    where
        F: Fn() -> Arc<dyn Plugin> + Send + Sync + 'static,
    {
        self.register_implementation(descriptor.implementation_key().to_string(), constructor);
        self.builtins.push(descriptor);
    }

    #[must_use]
    pub fn has_implementation(&self, key: &str) -> bool {
        self.implementations.contains_key(key)
    }

    /// Collect candidates from built-ins and manifest directories.
    ///
    /// Built-ins are considered first, then directories in the given order.
    /// A name seen twice keeps its first descriptor. Disabled plugins are
    /// treated as not installed.
    #[must_use]
    pub fn discover(&self, dirs: &[PathBuf], disabled: &[String]) -> Discovery {
        let disabled: BTreeSet<&str> = disabled.iter().map(String::as_str).collect();
        let mut discovery = Discovery::default();
        let mut seen = BTreeSet::new();

        let mut descriptors = self.builtins.clone();
        for dir in dirs {
            let scan = scan_manifests(dir);
            descriptors.extend(scan.descriptors);
            discovery.errors.extend(scan.errors);
        }

        for descriptor in descriptors {
            if !seen.insert(descriptor.name.clone()) {
                warn!(plugin = %descriptor.name, "Duplicate plugin name, keeping the first");
                discovery.errors.push(DiscoveryError::DuplicatePlugin {
                    plugin: descriptor.name,
                });
                continue;
            }
            if disabled.contains(descriptor.name.as_str()) {
                info!(plugin = %descriptor.name, "Plugin disabled by configuration");
                discovery.disabled.push(descriptor.name);
                continue;
            }
            let Some(constructor) = self.implementations.get(descriptor.implementation_key())
            else {
                warn!(
                    plugin = %descriptor.name,
                    implementation = %descriptor.implementation_key(),
                    "No implementation registered for plugin"
                );
                discovery.errors.push(DiscoveryError::NoImplementation {
                    implementation: descriptor.implementation_key().to_string(),
                    plugin: descriptor.name,
                });
                continue;
            };
            debug!(plugin = %descriptor.name, version = %descriptor.version, "Discovered plugin");
            discovery
                .candidates
                .push(PluginCandidate::new(descriptor, Arc::clone(constructor)));
        }

        discovery
    }
}

impl fmt::Debug for PluginCatalog {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginCatalog")
            .field("implementations", &self.implementations.keys().collect::<Vec<_>>())
            .field("builtins", &self.builtins)
            .finish()
    }
}

/// Read every `<dir>/<plugin>/plugin.json`, in directory name order.
///
/// A missing directory yields an empty scan. Subdirectories without a
/// manifest are ignored.
#[must_use]
pub fn scan_manifests(dir: &Path) -> ManifestScan {
    let mut scan = ManifestScan::default();

    if !dir.exists() {
        debug!(path = %dir.display(), "Plugin directory does not exist");
        return scan;
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) => {
            warn!(path = %dir.display(), error = %e, "Failed to read plugin directory");
            scan.errors.push(DiscoveryError::Io {
                path: dir.to_path_buf(),
                reason: e.to_string(),
            });
            return scan;
        }
    };

    let mut plugin_dirs: Vec<PathBuf> = entries
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|path| path.is_dir())
        .collect();
    plugin_dirs.sort();

    for plugin_dir in plugin_dirs {
        let manifest = plugin_dir.join(MANIFEST_FILE);
        if !manifest.is_file() {
            continue;
        }
        match read_manifest(&manifest) {
            Ok(descriptor) => scan.descriptors.push(descriptor),
            Err(e) => {
                warn!(error = %e, "Skipping plugin manifest");
                scan.errors.push(e);
            }
        }
    }

    scan
}

fn read_manifest(path: &Path) -> Result<PluginDescriptor, DiscoveryError> {
    let content = std::fs::read_to_string(path).map_err(|e| DiscoveryError::Io {
        path: path.to_path_buf(),
        reason: e.to_string(),
    })?;
    let descriptor: PluginDescriptor =
        serde_json::from_str(&content).map_err(|e| DiscoveryError::InvalidManifest {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
    if descriptor.name.trim().is_empty() {
        return Err(DiscoveryError::InvalidManifest {
            path: path.to_path_buf(),
            reason: "plugin name is empty".to_string(),
        });
    }
    Ok(descriptor)
}
