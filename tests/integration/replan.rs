//! Re-planning when compilation changes a project's dependencies.

use intentcode::build::StageKind;
use intentcode::config::BuildConfig;
use intentcode::constants::DEFAULT_SCOPE;
use intentcode::core::IntentError;
use intentcode::generation::CallSite;
use intentcode::graph::{NodeFilter, NodeStatus, NodeType};
use intentcode::test_utils::{IntentFixture, ScriptedProvider, TestProject};
use serde_json::json;

fn provider_adding(package: &str) -> ScriptedProvider {
    ScriptedProvider::stub().with_default(
        CallSite::Compile,
        json!({
            "targetSource": "fn main() {}\n",
            "dependencyDeltas": [{"kind": "set", "packageName": package, "minVersion": "1"}]
        }),
    )
}

#[tokio::test]
async fn test_replan_limit_zero_fails_the_build() {
    let project = TestProject::with_provider(provider_adding("anyhow")).unwrap();
    project
        .write_config(&BuildConfig {
            max_replans: 0,
            ..BuildConfig::default()
        })
        .await
        .unwrap();
    project.write_intent(&IntentFixture::main_rs()).unwrap();

    let err = project.build().await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<IntentError>(),
        Some(IntentError::ReplanLimitExceeded { limit: 0 })
    ));

    let runs = project
        .store
        .filter(&NodeFilter::new().scope(DEFAULT_SCOPE).node_type(NodeType::BuildRun))
        .unwrap();
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, NodeStatus::Failed);
}

#[tokio::test]
async fn test_replan_reruns_the_whole_sequence_once() {
    let project = TestProject::with_provider(provider_adding("anyhow")).unwrap();
    project.write_intent(&IntentFixture::main_rs()).unwrap();

    let summary = project.build().await.unwrap();

    assert_eq!(summary.replans, 1);
    let compile_stages = summary.stages_run.iter().filter(|stage| **stage == StageKind::Compile).count();
    assert_eq!(compile_stages, 2);
    assert_eq!(summary.stages_run.first(), Some(&StageKind::VerifyInternals));
    assert_eq!(summary.stages_run.last(), Some(&StageKind::VerifyInternals));
    // The second compile pass finds the prompt unchanged.
    assert_eq!(project.provider.calls(CallSite::Compile), 1);
}

#[tokio::test]
async fn test_declared_dependency_triggers_one_replan() {
    let project = TestProject::new().unwrap();
    project
        .write_intent(&IntentFixture::main_rs().with_dependency("regex", "1.11"))
        .unwrap();

    let summary = project.build().await.unwrap();

    // The first update-deps stage folds the declaration in and reports a change.
    assert_eq!(summary.replans, 1);
    assert!(summary.compiled.contains(&"src/main.rs".to_string()));
}

#[tokio::test]
async fn test_rebuild_after_replan_is_stable() {
    let project = TestProject::with_provider(provider_adding("anyhow")).unwrap();
    project.write_intent(&IntentFixture::main_rs()).unwrap();
    project.build().await.unwrap();

    let summary = project.build().await.unwrap();

    assert_eq!(summary.replans, 0);
    assert_eq!(summary.skipped, vec!["src/main.rs"]);
    assert_eq!(project.provider.calls(CallSite::Compile), 1);
}
