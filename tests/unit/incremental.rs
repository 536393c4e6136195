use intentcode::constants::DEFAULT_SCOPE;
use intentcode::generation::{CallSite, GenerationRecords};
use intentcode::graph::{NodeFilter, NodeType};
use intentcode::project::Workspace;
use intentcode::test_utils::{IntentFixture, ScriptedProvider, TestProject};
use std::sync::Arc;

#[tokio::test]
async fn test_second_build_skips_unchanged_intent() {
    let project = TestProject::new().unwrap();
    project.write_intent(&IntentFixture::main_rs()).unwrap();

    let first = project.build().await.unwrap();
    assert_eq!(first.compiled, vec!["src/main.rs"]);
    assert_eq!(project.read("src/main.rs").as_deref(), Some("fn main() {}\n"));

    let second = project.build().await.unwrap();
    assert!(second.compiled.is_empty());
    assert_eq!(second.skipped, vec!["src/main.rs"]);
    assert_eq!(project.provider.calls(CallSite::Compile), 1);
}

#[tokio::test]
async fn test_skipped_target_carries_its_record_into_the_new_run() {
    let project = TestProject::new().unwrap();
    project.write_intent(&IntentFixture::main_rs()).unwrap();
    project.build().await.unwrap();
    project.build().await.unwrap();

    let sources = project
        .store
        .filter(&NodeFilter::new().scope(DEFAULT_SCOPE).node_type(NodeType::SourceFile))
        .unwrap();
    assert_eq!(sources.len(), 2);

    let records = GenerationRecords::new(&project.store);
    let prompts: Vec<String> =
        sources.iter().map(|node| records.latest(&node.id).unwrap().unwrap().prompt).collect();
    assert_eq!(prompts[0], prompts[1]);
}

#[tokio::test]
async fn test_edited_intent_recompiles() {
    let project = TestProject::new().unwrap();
    project.write_intent(&IntentFixture::main_rs()).unwrap();
    project.build().await.unwrap();

    project
        .write_intent(&IntentFixture::new("src/main.rs.md", "# main\n\nPrint a farewell instead.\n"))
        .unwrap();
    let summary = project.build().await.unwrap();
    assert_eq!(summary.compiled, vec!["src/main.rs"]);
    assert_eq!(project.provider.calls(CallSite::Compile), 2);
    assert!(project.provider.prompts(CallSite::Compile)[1].contains("farewell"));
}

#[tokio::test]
async fn test_deleted_target_is_regenerated() {
    let project = TestProject::new().unwrap();
    project.write_intent(&IntentFixture::main_rs()).unwrap();
    project.build().await.unwrap();

    std::fs::remove_file(project.path("src/main.rs")).unwrap();
    let summary = project.build().await.unwrap();

    assert_eq!(summary.compiled, vec!["src/main.rs"]);
    assert!(project.path("src/main.rs").is_file());
    // Same model and prompt: answered from the generation cache.
    assert_eq!(project.provider.calls(CallSite::Compile), 1);
    assert!(summary.cache_hits >= 1);
}

#[tokio::test]
async fn test_new_model_recompiles() {
    let project = TestProject::new().unwrap();
    project.write_intent(&IntentFixture::main_rs()).unwrap();
    project.build().await.unwrap();

    let other = Arc::new(ScriptedProvider::stub().with_model("other-model"));
    let summary = Workspace::with_store(&project.home, Arc::clone(&project.store))
        .with_provider(other.clone())
        .run_build(DEFAULT_SCOPE, &project.name)
        .await
        .unwrap();

    assert_eq!(summary.compiled, vec!["src/main.rs"]);
    assert_eq!(other.calls(CallSite::Compile), 1);
    assert_eq!(project.provider.calls(CallSite::Compile), 1);
}

#[tokio::test]
async fn test_old_build_runs_are_pruned() {
    let project = TestProject::new().unwrap();
    project.write_intent(&IntentFixture::main_rs()).unwrap();
    for _ in 0..5 {
        project.build().await.unwrap();
    }

    let runs = project
        .store
        .filter(&NodeFilter::new().scope(DEFAULT_SCOPE).node_type(NodeType::BuildRun))
        .unwrap();
    assert_eq!(runs.len(), intentcode::constants::BUILD_RUN_RETENTION);
    assert_eq!(project.provider.calls(CallSite::Compile), 1);
}
