use intentcode::constants::DEFAULT_SCOPE;
use intentcode::core::IntentError;
use intentcode::deps::DepsManifest;
use intentcode::graph::{NodeFilter, NodeStatus, NodeType};
use intentcode::test_utils::{IntentFixture, TestProject};

fn manifest(project: &TestProject) -> DepsManifest {
    DepsManifest::load(&project.layout().deps_path()).unwrap()
}

#[tokio::test]
async fn test_front_matter_dependencies_reach_deps_json() {
    let project = TestProject::new().unwrap();
    project
        .write_intent(&IntentFixture::main_rs().with_dependency("clap", "4.5"))
        .unwrap();

    project.build().await.unwrap();

    let packages: Vec<_> = manifest(&project).packages().map(|(_, name, req)| (name.to_string(), req.to_string())).collect();
    assert_eq!(packages, vec![("clap".to_string(), "4.5".to_string())]);
    project.workspace().verify_dependencies(DEFAULT_SCOPE, "web").unwrap();
}

#[tokio::test]
async fn test_dropped_declaration_keeps_project_view() {
    let project = TestProject::new().unwrap();
    project
        .write_intent(&IntentFixture::main_rs().with_dependency("clap", "4.5"))
        .unwrap();
    project.build().await.unwrap();

    project.write_intent(&IntentFixture::main_rs()).unwrap();
    project.build().await.unwrap();

    // The project view only grows; the file itself no longer needs clap.
    assert!(manifest(&project).packages().any(|(_, name, _)| name == "clap"));
    let intent_files = project
        .store
        .filter(&NodeFilter::new().scope(DEFAULT_SCOPE).node_type(NodeType::IntentFile))
        .unwrap();
    let newest = intent_files.iter().max_by_key(|node| node.seq).unwrap();
    let per_file = newest.structured_content.as_ref().and_then(|c| c.get("dependencies"));
    assert!(per_file.is_none_or(|deps| deps.get("clap").is_none()));
}

#[tokio::test]
async fn test_tampered_manifest_fails_next_build() {
    let project = TestProject::new().unwrap();
    project.write_intent(&IntentFixture::main_rs()).unwrap();
    project.build().await.unwrap();

    std::fs::write(project.layout().deps_path(), "{\"tool\": \"make\"}\n").unwrap();

    let err = project.workspace().verify_dependencies(DEFAULT_SCOPE, "web").unwrap_err();
    assert!(matches!(err.downcast_ref::<IntentError>(), Some(IntentError::DependencyDivergence { .. })));

    let err = project.build().await.unwrap_err();
    assert!(matches!(err.downcast_ref::<IntentError>(), Some(IntentError::DependencyDivergence { .. })));

    let runs = project
        .store
        .filter(&NodeFilter::new().scope(DEFAULT_SCOPE).node_type(NodeType::BuildRun))
        .unwrap();
    assert_eq!(runs.last().map(|run| run.status), Some(NodeStatus::Failed));
    assert_eq!(runs.first().map(|run| run.status), Some(NodeStatus::Completed));
}

#[tokio::test]
async fn test_missing_manifest_reads_as_empty() {
    let project = TestProject::new().unwrap();
    // Nothing built yet: no deps.json and an empty dependency root.
    project.workspace().verify_dependencies(DEFAULT_SCOPE, "web").unwrap();
}
