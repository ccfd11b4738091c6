//! Plugin hosting for toolbar.
//!
//! This crate provides:
//!
//! - **Plugin contract**: the [`Plugin`] trait and the action sink types
//! - **Descriptors**: immutable plugin metadata, built in or read from
//!   `plugin.json` manifests
//! - **Resolver**: deterministic dependency ordering with cycle detection
//! - **Registry**: the live instance table read at dispatch time
//! - **Lifecycle manager**: load, activate and unload in resolved order

pub mod descriptor;
pub mod discovery;
pub mod error;
pub mod lifecycle;
pub mod mock;
pub mod plugin;
pub mod registry;
pub mod resolver;
pub mod settings;

pub use descriptor::PluginDescriptor;
pub use discovery::{
    Discovery, MANIFEST_FILE, ManifestScan, PluginCandidate, PluginCatalog, PluginConstructor,
    scan_manifests,
};
pub use error::{DiscoveryError, LifecycleError, LookupError, PluginError, ResolveError};
pub use lifecycle::{LifecycleManager, LoadReport, PluginFailure, ResolutionPolicy, UnloadReport};
pub use mock::{MockPlugin, MockResponse};
pub use plugin::{ActionRequest, ActionResponse, Plugin, PluginConfig};
pub use registry::{PluginInstance, PluginRegistry, PluginState};
pub use resolver::{PartialResolution, resolve, resolve_partial};
pub use settings::merge_settings;
