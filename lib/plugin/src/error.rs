//! Error types for the plugin crate.
//!
//! - `ResolveError`: dependency resolution failures (missing, cyclic)
//! - `PluginError`: errors raised by plugin implementations
//! - `LifecycleError`: lifecycle manager operations
//! - `LookupError`: registry lookups at dispatch time
//! - `DiscoveryError`: manifest scanning and catalog binding

use crate::registry::PluginState;
use std::fmt;
use std::path::PathBuf;

/// Errors from dependency resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolveError {
    /// A plugin declares a dependency that is not part of the set.
    MissingDependency { plugin: String, dependency: String },
    /// The dependency graph contains a cycle. The cycle is listed in
    /// traversal order, starting from the node where it was entered.
    CyclicDependency { cycle: Vec<String> },
    /// A dependency was itself excluded from the load order.
    DependencyExcluded { plugin: String, dependency: String },
}

impl ResolveError {
    /// Returns the plugin this error is reported against.
    #[must_use]
    pub fn plugin(&self) -> &str {
        match self {
            Self::MissingDependency { plugin, .. } | Self::DependencyExcluded { plugin, .. } => {
                plugin
            }
            Self::CyclicDependency { cycle } => cycle.first().map_or("", String::as_str),
        }
    }
}

impl fmt::Display for ResolveError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingDependency { plugin, dependency } => {
                write!(f, "plugin '{plugin}' depends on missing plugin '{dependency}'")
            }
            Self::CyclicDependency { cycle } => {
                write!(f, "cyclic plugin dependency: {}", cycle.join(" -> "))?;
                if let Some(first) = cycle.first() {
                    write!(f, " -> {first}")?;
                }
                Ok(())
            }
            Self::DependencyExcluded { plugin, dependency } => {
                write!(
                    f,
                    "plugin '{plugin}' excluded because dependency '{dependency}' cannot be loaded"
                )
            }
        }
    }
}

impl std::error::Error for ResolveError {}

/// Errors returned by plugin implementations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginError {
    /// `initialize` failed.
    Initialization { reason: String },
    /// `cleanup` failed.
    Cleanup { reason: String },
    /// The plugin does not handle this action kind.
    UnsupportedAction { action: String },
    /// Action parameters were rejected by the plugin.
    InvalidParameters { action: String, reason: String },
    /// The action raised an error while running.
    Action { reason: String },
}

impl fmt::Display for PluginError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initialization { reason } => write!(f, "initialization failed: {reason}"),
            Self::Cleanup { reason } => write!(f, "cleanup failed: {reason}"),
            Self::UnsupportedAction { action } => write!(f, "unsupported action: {action}"),
            Self::InvalidParameters { action, reason } => {
                write!(f, "invalid parameters for '{action}': {reason}")
            }
            Self::Action { reason } => write!(f, "action failed: {reason}"),
        }
    }
}

impl std::error::Error for PluginError {}

/// Errors from lifecycle manager operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleError {
    /// Resolution failed and loading did not start.
    Resolution(ResolveError),
    /// A plugin's `initialize` returned an error.
    PluginInit { plugin: String, reason: String },
    /// A dependency is not in a usable state.
    DependencyFailed { plugin: String, dependency: String },
    /// No plugin with this name is registered.
    NotFound { plugin: String },
    /// The requested state transition is not allowed.
    InvalidTransition {
        plugin: String,
        from: PluginState,
        to: PluginState,
    },
    /// `load` was called while plugins are still loaded.
    AlreadyLoaded,
}

impl fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Resolution(e) => write!(f, "dependency resolution failed: {e}"),
            Self::PluginInit { plugin, reason } => {
                write!(f, "plugin '{plugin}' failed to initialize: {reason}")
            }
            Self::DependencyFailed { plugin, dependency } => {
                write!(f, "plugin '{plugin}' skipped: dependency failed ('{dependency}')")
            }
            Self::NotFound { plugin } => write!(f, "plugin not found: {plugin}"),
            Self::InvalidTransition { plugin, from, to } => {
                write!(f, "plugin '{plugin}' cannot move from {from} to {to}")
            }
            Self::AlreadyLoaded => write!(f, "plugins are already loaded"),
        }
    }
}

impl std::error::Error for LifecycleError {}

impl From<ResolveError> for LifecycleError {
    fn from(e: ResolveError) -> Self {
        Self::Resolution(e)
    }
}

/// Errors from registry lookups.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LookupError {
    /// No plugin with this name is registered.
    NotFound { plugin: String },
    /// The plugin exists but is not active.
    NotActive { plugin: String, state: PluginState },
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotFound { plugin } => write!(f, "target unavailable: plugin '{plugin}' not found"),
            Self::NotActive { plugin, state } => {
                write!(f, "target unavailable: plugin '{plugin}' is {state}")
            }
        }
    }
}

impl std::error::Error for LookupError {}

/// Errors from plugin discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DiscoveryError {
    /// A plugin directory or manifest could not be read.
    Io { path: PathBuf, reason: String },
    /// A manifest could not be parsed.
    InvalidManifest { path: PathBuf, reason: String },
    /// A descriptor names an implementation that is not registered.
    NoImplementation { plugin: String, implementation: String },
    /// Two descriptors share a name; the later one is dropped.
    DuplicatePlugin { plugin: String },
}

impl fmt::Display for DiscoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Io { path, reason } => write!(f, "cannot read {}: {reason}", path.display()),
            Self::InvalidManifest { path, reason } => {
                write!(f, "invalid plugin manifest {}: {reason}", path.display())
            }
            Self::NoImplementation {
                plugin,
                implementation,
            } => write!(
                f,
                "plugin '{plugin}' has no registered implementation '{implementation}'"
            ),
            Self::DuplicatePlugin { plugin } => write!(f, "duplicate plugin name: {plugin}"),
        }
    }
}

impl std::error::Error for DiscoveryError {}
