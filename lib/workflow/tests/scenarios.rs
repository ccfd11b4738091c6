//! End-to-end runs of the documentation auto-merge workflow.

use serde_json::{Value, json};
use std::sync::Arc;
use toolbar_plugin::{
    LifecycleManager, MockPlugin, Plugin, PluginCandidate, PluginConstructor, PluginDescriptor,
};
use toolbar_workflow::{
    ActionKind, ActionOutcome, ActionSpec, Condition, DispatchHistory, Dispatcher,
    DispatcherConfig, Edge, Engine, Event, EventType, InMemoryHistory, JsonFileStore,
    KeyValueStore, MemoryKeyValueStore, Node, Operator, RunPhase, TriggerSpec, Workflow,
    WorkflowStore,
};

async fn active(plugins: &[Arc<MockPlugin>]) -> LifecycleManager {
    let candidates = plugins.iter().map(|plugin| {
        let descriptor = PluginDescriptor::from_plugin(plugin.as_ref());
        let plugin = Arc::clone(plugin);
        let constructor: PluginConstructor = Arc::new(move || Arc::clone(&plugin) as Arc<dyn Plugin>);
        PluginCandidate::new(descriptor, constructor)
    });
    let manager = LifecycleManager::new(candidates);
    manager.load().await.expect("load");
    assert!(manager.activate_all().await.is_empty());
    manager
}

/// `github_pr_created` → "files all end with .md" → merge, else prompt.
fn docs_automerge() -> Workflow {
    let mut workflow = Workflow::new("Docs automerge", TriggerSpec::new(EventType::GithubPrCreated));
    let check = workflow.add_node(Node::condition(
        "docs only",
        Condition::new("files", Operator::AllEndWith, ".md"),
    ));
    let merge = workflow.add_node(Node::action("merge", ActionSpec::new(ActionKind::AutoMergePr)));
    let review = workflow.add_node(Node::action(
        "ask for review",
        ActionSpec::new(ActionKind::SendPrompt)
            .with_parameter("prompt_template", "Review {pull_request.title}"),
    ));
    workflow.connect(workflow.root(), check, Edge::Unconditional).unwrap();
    workflow.connect(check, merge, Edge::OnTrue).unwrap();
    workflow.connect(check, review, Edge::OnFalse).unwrap();
    workflow
}

fn pr_created(files: Value) -> Event {
    Event::new(
        EventType::GithubPrCreated,
        json!({
            "repository": { "full_name": "acme/site" },
            "pull_request": { "number": 42, "title": "Update guide" },
            "files": files
        }),
        "github-events",
    )
}

async fn setup(plugins: &[Arc<MockPlugin>]) -> (Dispatcher, Arc<InMemoryHistory>, LifecycleManager) {
    let manager = active(plugins).await;
    let history = Arc::new(InMemoryHistory::new());
    let engine = Engine::new(manager.registry(), history.clone() as Arc<dyn DispatchHistory>);
    let store = Arc::new(WorkflowStore::new(
        Arc::new(MemoryKeyValueStore::new()) as Arc<dyn KeyValueStore>
    ));
    store.save(docs_automerge()).await.expect("save");
    let dispatcher = Dispatcher::start(engine, store, DispatcherConfig::default());
    (dispatcher, history, manager)
}

#[tokio::test]
async fn docs_only_pr_is_merged_once() {
    let github = Arc::new(MockPlugin::new("github"));
    let prompting = Arc::new(MockPlugin::new("prompting"));
    let (dispatcher, history, _manager) = setup(&[Arc::clone(&github), Arc::clone(&prompting)]).await;

    dispatcher.publish(pr_created(json!(["README.md", "docs/guide.md"]))).await.unwrap();
    dispatcher.shutdown().await;

    let records = history.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].action, ActionKind::AutoMergePr);
    assert_eq!(records[0].outcome, ActionOutcome::Success);
    assert_eq!(records[0].target.as_deref(), Some("github"));
    assert_eq!(records[0].parameters["repo"], "acme/site");
    assert_eq!(records[0].parameters["pr_number"], "42");

    let requests = github.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].action, "auto_merge_pr");
    assert!(prompting.requests().is_empty());
}

#[tokio::test]
async fn code_change_takes_false_branch() {
    let github = Arc::new(MockPlugin::new("github"));
    let prompting = Arc::new(MockPlugin::new("prompting"));
    let (dispatcher, history, _manager) = setup(&[Arc::clone(&github), Arc::clone(&prompting)]).await;

    dispatcher.publish(pr_created(json!(["main.py"]))).await.unwrap();
    dispatcher.shutdown().await;

    assert!(github.requests().is_empty());
    let records = history.records().await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].action, ActionKind::SendPrompt);
    assert_eq!(records[0].parameters["prompt_template"], "Review Update guide");
}

#[tokio::test]
async fn unregistered_target_errors_and_run_continues() {
    let prompting = Arc::new(MockPlugin::new("prompting"));
    let manager = active(&[Arc::clone(&prompting)]).await;
    let history = Arc::new(InMemoryHistory::new());
    let engine = Engine::new(manager.registry(), history.clone() as Arc<dyn DispatchHistory>);

    let mut workflow = Workflow::new("Ticket sync", TriggerSpec::new(EventType::GithubPrCreated));
    let sync = workflow.add_node(Node::action(
        "sync to jira",
        ActionSpec::new(ActionKind::Custom)
            .with_target("jira")
            .with_parameter("summary", "{pull_request.title}"),
    ));
    let notify = workflow.add_node(Node::action(
        "notify",
        ActionSpec::new(ActionKind::SendPrompt).with_parameter("prompt_template", "synced"),
    ));
    workflow.connect(workflow.root(), sync, Edge::Unconditional).unwrap();
    workflow.connect(sync, notify, Edge::Unconditional).unwrap();
    workflow.validate().unwrap();

    let report = engine.run(&workflow, &pr_created(json!([]))).await;

    assert_eq!(report.phase, RunPhase::Completed);
    assert_eq!(report.dispatches.len(), 2);
    assert_eq!(report.dispatches[0].outcome, ActionOutcome::Error);
    assert_eq!(report.dispatches[0].target.as_deref(), Some("jira"));
    assert!(report.dispatches[0].message.contains("target unavailable"));
    assert_eq!(report.dispatches[1].outcome, ActionOutcome::Success);
    assert_eq!(prompting.requests().len(), 1);
    assert_eq!(history.records().await.len(), 2);
}

#[tokio::test]
async fn empty_file_list_is_not_docs_only() {
    let github = Arc::new(MockPlugin::new("github"));
    let prompting = Arc::new(MockPlugin::new("prompting"));
    let (dispatcher, _, _manager) = setup(&[Arc::clone(&github), Arc::clone(&prompting)]).await;

    let reports = dispatcher.run_now(&pr_created(json!([]))).await;
    assert_eq!(reports.len(), 1);
    assert!(reports[0].matched);
    assert!(github.requests().is_empty());
    assert_eq!(prompting.requests().len(), 1);
    dispatcher.shutdown().await;
}

#[tokio::test]
async fn definitions_survive_file_roundtrip() {
    let dir = tempfile::TempDir::new().unwrap();
    let backend = Arc::new(JsonFileStore::new(dir.path())) as Arc<dyn KeyValueStore>;

    let original = docs_automerge().with_description("merge docs").with_priority(3);
    let id = original.id;
    let store = WorkflowStore::new(Arc::clone(&backend));
    store.save(original).await.unwrap();
    let saved = store.get(id).await.unwrap();

    let reloaded = WorkflowStore::new(backend);
    let outcome = reloaded.load().await.unwrap();
    assert_eq!(outcome.loaded, 1);
    assert!(outcome.skipped.is_empty());

    let loaded = reloaded.get(id).await.unwrap();
    assert_eq!(loaded.metadata, saved.metadata);
    assert_eq!(loaded.root(), saved.root());
    assert_eq!(
        loaded.graph.nodes().collect::<Vec<_>>(),
        saved.graph.nodes().collect::<Vec<_>>()
    );
    assert_eq!(loaded.graph.edges(), saved.graph.edges());
}

#[tokio::test]
async fn condition_without_false_branch_is_rejected_on_save() {
    let store = WorkflowStore::new(Arc::new(MemoryKeyValueStore::new()) as Arc<dyn KeyValueStore>);
    let mut workflow = Workflow::new("half", TriggerSpec::new(EventType::GithubPrCreated));
    let check = workflow.add_node(Node::condition(
        "docs only",
        Condition::new("files", Operator::AllEndWith, ".md"),
    ));
    let merge = workflow.add_node(Node::action("merge", ActionSpec::new(ActionKind::AutoMergePr)));
    workflow.connect(workflow.root(), check, Edge::Unconditional).unwrap();
    workflow.connect(check, merge, Edge::OnTrue).unwrap();

    let err = store.save(workflow).await.unwrap_err();
    assert!(err.to_string().contains("has no on_false edge"));
    assert!(store.is_empty().await);
}

#[tokio::test]
async fn legacy_document_is_migrated() {
    let backend = Arc::new(MemoryKeyValueStore::new());
    backend
        .insert(
            "workflows",
            json!([{
                "id": "legacy-1",
                "name": "Prompt on new issue",
                "description": "",
                "trigger": {
                    "id": "t",
                    "name": "issue",
                    "event_type": "linear_issue_created",
                    "conditions": [{ "field": "issue.team.key", "operator": "equals", "value": "ENG" }],
                    "enabled": true
                },
                "actions": [{
                    "id": "a",
                    "name": "prompt",
                    "action_type": "send_prompt",
                    "parameters": [{ "name": "prompt_template", "value": "Triage {issue.title}" }],
                    "enabled": true
                }],
                "enabled": true
            }]),
        )
        .await;
    let store = WorkflowStore::new(backend.clone() as Arc<dyn KeyValueStore>);
    let outcome = store.load().await.unwrap();
    assert_eq!(outcome.loaded, 1);
    assert_eq!(outcome.migrated, 1);

    let workflow = store.all().await.remove(0);
    store.save((*workflow).clone()).await.unwrap();
    let document = backend.get("workflows").await.unwrap();
    assert_eq!(document["version"], json!(1));
    assert!(document["workflows"][0]["nodes"].is_array());
    assert!(document["workflows"][0].get("actions").is_none());
}
