//! Built-in plugins.
//!
//! Each built-in is registered on the catalog with its descriptor, so a
//! `plugin.json` manifest can also bind to it through `implementation`.

pub mod automation;
pub mod github;
pub mod linear;
pub mod prompting;

use crate::config::AppConfig;
use std::sync::Arc;
use toolbar_plugin::{Plugin, PluginCatalog, PluginDescriptor};

pub use automation::AutomationPlugin;
pub use github::{GithubClient, GithubPlugin, LoggingGithubClient};
pub use linear::{LinearClient, LinearPlugin, LoggingLinearClient};
pub use prompting::PromptingPlugin;

/// Catalog of the built-in plugins.
#[must_use]
pub fn builtin_catalog(config: &AppConfig) -> PluginCatalog {
    let mut catalog = PluginCatalog::new();

    catalog.register(
        PluginDescriptor::new(prompting::NAME, "1.0.0")
            .with_description("Sends rendered prompts")
            .with_priority(10),
        || Arc::new(PromptingPlugin::new()) as Arc<dyn Plugin>,
    );

    let scripts = config.scripts.clone();
    catalog.register(
        PluginDescriptor::new(automation::NAME, "1.0.0").with_description("Runs configured scripts"),
        move || Arc::new(AutomationPlugin::new(scripts.clone())) as Arc<dyn Plugin>,
    );

    let github: Arc<dyn GithubClient> = Arc::new(LoggingGithubClient);
    catalog.register(
        PluginDescriptor::new(github::NAME, "1.0.0")
            .with_description("Merges pull requests")
            .with_default_setting("merge_method", "squash".into()),
        move || Arc::new(GithubPlugin::new(Arc::clone(&github))) as Arc<dyn Plugin>,
    );

    let linear: Arc<dyn LinearClient> = Arc::new(LoggingLinearClient::default());
    catalog.register(
        PluginDescriptor::new(linear::NAME, "1.0.0").with_description("Creates Linear issues"),
        move || Arc::new(LinearPlugin::new(Arc::clone(&linear))) as Arc<dyn Plugin>,
    );

    catalog
}
