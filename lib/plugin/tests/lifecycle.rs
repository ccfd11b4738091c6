//! End-to-end lifecycle behavior over mock plugins.

use std::sync::{Arc, Mutex};
use toolbar_plugin::{
    LifecycleError, LifecycleManager, MockPlugin, Plugin, PluginCandidate, PluginConstructor,
    PluginDescriptor, PluginState, ResolutionPolicy, ResolveError,
};

fn candidate(plugin: &Arc<MockPlugin>) -> PluginCandidate {
    candidate_with(plugin, |d| d)
}

fn candidate_with(
    plugin: &Arc<MockPlugin>,
    adjust: impl FnOnce(PluginDescriptor) -> PluginDescriptor,
) -> PluginCandidate {
    let descriptor = adjust(PluginDescriptor::from_plugin(plugin.as_ref()));
    let plugin = Arc::clone(plugin);
    let constructor: PluginConstructor = Arc::new(move || Arc::clone(&plugin) as Arc<dyn Plugin>);
    PluginCandidate::new(descriptor, constructor)
}

fn journal() -> Arc<Mutex<Vec<String>>> {
    Arc::new(Mutex::new(Vec::new()))
}

fn entries(journal: &Arc<Mutex<Vec<String>>>, prefix: &str) -> Vec<String> {
    journal
        .lock()
        .expect("journal")
        .iter()
        .filter_map(|e| e.strip_prefix(prefix).map(str::to_string))
        .collect()
}

#[tokio::test]
async fn shared_dependency_loads_first() {
    let log = journal();
    let a = Arc::new(MockPlugin::new("A").with_journal(Arc::clone(&log)));
    let b = Arc::new(
        MockPlugin::new("B")
            .with_dependency("A")
            .with_journal(Arc::clone(&log)),
    );
    let c = Arc::new(
        MockPlugin::new("C")
            .with_dependency("A")
            .with_journal(Arc::clone(&log)),
    );

    let manager = LifecycleManager::new([candidate(&c), candidate(&b), candidate(&a)]);
    let report = manager.load().await.expect("load");

    assert_eq!(report.order[0], "A");
    assert_eq!(report.order.len(), 3);
    assert_eq!(entries(&log, "initialize:")[0], "A");
    assert!(report.failed.is_empty());
}

#[tokio::test]
async fn mutual_dependency_is_rejected_before_loading() {
    let x = Arc::new(MockPlugin::new("X").with_dependency("Y"));
    let y = Arc::new(MockPlugin::new("Y").with_dependency("X"));

    let manager = LifecycleManager::new([candidate(&x), candidate(&y)]);
    let err = manager.load().await.unwrap_err();

    assert!(err.to_string().contains("X -> Y"));
    assert_eq!(x.initialize_calls(), 0);
    assert_eq!(y.initialize_calls(), 0);
    assert!(manager.registry().is_empty());
}

#[tokio::test]
async fn missing_dependency_reports_both_names() {
    let b = Arc::new(MockPlugin::new("B").with_dependency("A"));
    let manager = LifecycleManager::new([candidate(&b)]);
    let err = manager.load().await.unwrap_err();
    assert!(err.to_string().contains("'B' depends on missing plugin 'A'"));
}

#[tokio::test]
async fn failed_plugin_skips_dependents_but_not_independents() {
    let base = Arc::new(MockPlugin::new("base").failing_init("no credentials"));
    let child = Arc::new(MockPlugin::new("child").with_dependency("base"));
    let grandchild = Arc::new(MockPlugin::new("grandchild").with_dependency("child"));
    let other = Arc::new(MockPlugin::new("other"));

    let manager = LifecycleManager::new([
        candidate(&base),
        candidate(&child),
        candidate(&grandchild),
        candidate(&other),
    ]);
    let report = manager.load().await.expect("load completes");

    assert_eq!(report.initialized, vec!["other".to_string()]);
    let failed: Vec<(&str, &str)> = report
        .failed
        .iter()
        .map(|f| (f.plugin.as_str(), f.reason.as_str()))
        .collect();
    assert_eq!(
        failed,
        vec![
            ("base", "initialization failed: no credentials"),
            ("child", "dependency failed: base"),
            ("grandchild", "dependency failed: child"),
        ]
    );
    assert_eq!(child.initialize_calls(), 0);
    assert_eq!(grandchild.initialize_calls(), 0);

    let registry = manager.registry();
    assert_eq!(registry.state("child"), Some(PluginState::Failed));
    assert_eq!(
        registry.lookup("child").expect("present").failure(),
        Some("dependency failed: base")
    );
    assert_eq!(registry.state("other"), Some(PluginState::Initialized));
}

#[tokio::test]
async fn unload_runs_cleanup_in_reverse_order_and_swallows_errors() {
    let log = journal();
    let a = Arc::new(MockPlugin::new("a").with_journal(Arc::clone(&log)));
    let b = Arc::new(
        MockPlugin::new("b")
            .with_dependency("a")
            .failing_cleanup("socket already closed")
            .with_journal(Arc::clone(&log)),
    );
    let c = Arc::new(
        MockPlugin::new("c")
            .with_dependency("b")
            .with_journal(Arc::clone(&log)),
    );

    let manager = LifecycleManager::new([candidate(&a), candidate(&b), candidate(&c)]);
    manager.load().await.expect("load");
    assert!(manager.activate_all().await.is_empty());

    let report = manager.unload().await;
    assert_eq!(entries(&log, "cleanup:"), vec!["c", "b", "a"]);
    assert_eq!(report.stopped, vec!["c", "b", "a"]);
    assert_eq!(report.cleanup_errors.len(), 1);
    assert_eq!(report.cleanup_errors[0].plugin, "b");
    assert_eq!(manager.registry().state("b"), Some(PluginState::Stopped));
}

#[tokio::test]
async fn unload_plugin_stops_dependents_first() {
    let log = journal();
    let core = Arc::new(MockPlugin::new("core").with_journal(Arc::clone(&log)));
    let user = Arc::new(
        MockPlugin::new("user")
            .with_dependency("core")
            .with_journal(Arc::clone(&log)),
    );
    let bystander = Arc::new(MockPlugin::new("bystander").with_journal(Arc::clone(&log)));

    let manager =
        LifecycleManager::new([candidate(&core), candidate(&user), candidate(&bystander)]);
    manager.load().await.expect("load");
    manager.activate_all().await;

    let report = manager.unload_plugin("core").await.expect("unload");
    assert_eq!(report.stopped, vec!["user", "core"]);
    assert_eq!(entries(&log, "cleanup:"), vec!["user", "core"]);

    let registry = manager.registry();
    assert_eq!(registry.state("bystander"), Some(PluginState::Active));
    assert!(registry.lookup_active("core").is_err());
}

#[tokio::test]
async fn stopped_plugin_can_be_reloaded_and_activated() {
    let plugin = Arc::new(MockPlugin::new("github"));
    let manager = LifecycleManager::new([candidate(&plugin)]);
    manager.load().await.expect("load");
    manager.activate("github").await.expect("activate");
    manager.unload_plugin("github").await.expect("unload");

    let err = manager.activate("github").await.unwrap_err();
    assert!(matches!(
        err,
        LifecycleError::InvalidTransition {
            from: PluginState::Stopped,
            ..
        }
    ));

    manager.reload_plugin("github").await.expect("reload");
    manager.activate("github").await.expect("activate again");
    assert_eq!(plugin.initialize_calls(), 2);
    assert!(manager.registry().lookup_active("github").is_ok());
}

#[tokio::test]
async fn valid_prefix_policy_loads_what_it_can() {
    let a = Arc::new(MockPlugin::new("a"));
    let x = Arc::new(MockPlugin::new("x").with_dependency("y"));
    let y = Arc::new(MockPlugin::new("y").with_dependency("x"));
    let z = Arc::new(MockPlugin::new("z").with_dependency("missing"));

    let manager = LifecycleManager::new([
        candidate(&a),
        candidate(&x),
        candidate(&y),
        candidate(&z),
    ])
    .with_policy(ResolutionPolicy::LoadValidPrefix);
    let report = manager.load().await.expect("load");

    assert_eq!(report.order, vec!["a"]);
    let excluded: Vec<&str> = report.excluded.iter().map(|f| f.plugin.as_str()).collect();
    assert_eq!(excluded, vec!["x", "y", "z"]);
    assert!(manager.registry().lookup("x").is_err());
}

#[tokio::test]
async fn priority_orders_independent_plugins() {
    let low = Arc::new(MockPlugin::new("low"));
    let high = Arc::new(MockPlugin::new("high"));
    let manager = LifecycleManager::new([
        candidate(&low),
        candidate_with(&high, |d| d.with_priority(10)),
    ]);
    let report = manager.load().await.expect("load");
    assert_eq!(report.order, vec!["high", "low"]);
}

#[test]
fn resolve_error_names_cycle_member() {
    let err = toolbar_plugin::resolve(&[
        PluginDescriptor::new("X", "1").with_dependency("Y"),
        PluginDescriptor::new("Y", "1").with_dependency("X"),
    ])
    .unwrap_err();
    assert!(matches!(err, ResolveError::CyclicDependency { cycle } if cycle == ["X", "Y"]));
}
