use intentcode::generation::{GenerationRecords, ModelDescriptor};
use intentcode::graph::{GraphStore, NewNode, NodeFilter, NodeStatus, NodeType};
use serde_json::json;

fn project(store: &GraphStore) -> intentcode::graph::Node {
    store.upsert(None, NewNode::new("default", NodeType::Project, "web")).unwrap()
}

#[test]
fn test_upsert_same_key_twice_keeps_one_node() {
    let store = GraphStore::in_memory().unwrap();
    let project = project(&store);
    let first = store
        .upsert(None, NewNode::child_of(&project, NodeType::DependencyRoot, "dependencies").with_structured(json!({})))
        .unwrap();
    let second = store
        .upsert(None, NewNode::child_of(&project, NodeType::DependencyRoot, "dependencies").with_structured(json!({})))
        .unwrap();

    assert_eq!(first.id, second.id);
    assert_eq!(first.structured_content_hash, second.structured_content_hash);
    assert_eq!(store.children(&project.id, NodeType::DependencyRoot).unwrap().len(), 1);
}

#[test]
fn test_delete_cascade_leaves_nothing_reachable() {
    let store = GraphStore::in_memory().unwrap();
    let project = project(&store);
    let container = store.create(NewNode::child_of(&project, NodeType::BuildContainer, "builds")).unwrap();
    let run = store.create(NewNode::child_of(&container, NodeType::BuildRun, "run-1")).unwrap();
    let intent = store.create(NewNode::child_of(&run, NodeType::IntentRoot, "intent")).unwrap();
    let dir = store.create(NewNode::child_of(&intent, NodeType::IntentDir, "src")).unwrap();
    let file = store.create(NewNode::child_of(&dir, NodeType::IntentFile, "main.rs.md").with_text("x")).unwrap();

    let records = GenerationRecords::new(&store);
    records.save(&file.id, &ModelDescriptor::new("m"), "# task: index\n", Some("{}"), Some(&json!({}))).unwrap();

    assert_eq!(store.delete_cascade(&run.id).unwrap(), 4);

    for id in [&run.id, &intent.id, &dir.id, &file.id] {
        assert!(store.get_by_id(id).unwrap().is_none());
    }
    assert!(records.list(&file.id).unwrap().is_empty());
    assert!(store.children(&container.id, NodeType::BuildRun).unwrap().is_empty());
    assert!(store.filter(&NodeFilter::new().node_type(NodeType::IntentFile)).unwrap().is_empty());
    assert!(store.get_by_id(&container.id).unwrap().is_some());
}

#[test]
fn test_copy_subtree_into_other_scope() {
    let store = GraphStore::in_memory().unwrap();
    let templates = store.create(NewNode::new("system", NodeType::Project, "templates")).unwrap();
    let root = store.create(NewNode::child_of(&templates, NodeType::ExtensionsRoot, "extensions")).unwrap();
    let extension = store
        .create(NewNode::child_of(&root, NodeType::Extension, "rust@1.0.0").with_structured(json!({"name": "rust"})))
        .unwrap();
    store.create(NewNode::child_of(&extension, NodeType::Skill, "errors.md").with_text("Use thiserror.")).unwrap();

    let web = project(&store);
    let target = store.create(NewNode::child_of(&web, NodeType::ExtensionsRoot, "extensions")).unwrap();
    let copied = store.copy_subtree(&extension.id, Some(&target.id), "default").unwrap();

    assert_ne!(copied.id, extension.id);
    assert_eq!(copied.scope_id, "default");
    let skills = store.children(&copied.id, NodeType::Skill).unwrap();
    assert_eq!(skills.len(), 1);
    assert_eq!(skills[0].text_content.as_deref(), Some("Use thiserror."));
    assert_eq!(skills[0].scope_id, "default");
}

#[test]
fn test_filter_by_status() {
    let store = GraphStore::in_memory().unwrap();
    let project = project(&store);
    let container = store.create(NewNode::child_of(&project, NodeType::BuildContainer, "builds")).unwrap();
    store
        .create(NewNode::child_of(&container, NodeType::BuildRun, "run-1").with_status(NodeStatus::Completed))
        .unwrap();
    store
        .create(NewNode::child_of(&container, NodeType::BuildRun, "run-2").with_status(NodeStatus::Failed))
        .unwrap();
    store.create(NewNode::child_of(&container, NodeType::BuildRun, "run-3")).unwrap();

    let failed = store.filter(&NodeFilter::new().node_type(NodeType::BuildRun).status(NodeStatus::Failed)).unwrap();
    assert_eq!(failed.len(), 1);
    assert_eq!(failed[0].name, "run-2");
    assert_eq!(store.children(&container.id, NodeType::BuildRun).unwrap().len(), 3);
}
