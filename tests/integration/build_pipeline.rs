//! Full builds over a registered project with a scripted provider.

use intentcode::build::{BuildOrchestrator, StageKind};
use intentcode::config::{BuildConfig, Strategy};
use intentcode::constants::DEFAULT_SCOPE;
use intentcode::deps::DepsManifest;
use intentcode::generation::{CallSite, GenerationRecords};
use intentcode::graph::{NodeFilter, NodeStatus, NodeType};
use intentcode::lock::ProjectLock;
use intentcode::test_utils::{ExtensionFixture, IntentFixture, ScriptedProvider, SpecFixture, TestProject};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn nodes_of(project: &TestProject, node_type: NodeType) -> Vec<intentcode::graph::Node> {
    project.store.filter(&NodeFilter::new().scope(DEFAULT_SCOPE).node_type(node_type)).unwrap()
}

#[tokio::test]
async fn test_end_to_end_build_with_dependency_deltas() {
    let provider = ScriptedProvider::stub().with_default(
        CallSite::Compile,
        json!({
            "targetSource": "fn main() { println!(\"hello\"); }\n",
            "dependencyDeltas": [{"kind": "set", "packageName": "serde", "minVersion": "1.0"}]
        }),
    );
    let project = TestProject::with_provider(provider).unwrap();
    project.write_spec(&SpecFixture::tech_stack()).unwrap();
    project.write_intent(&IntentFixture::main_rs()).unwrap();

    let summary = project.build().await.unwrap();

    assert_eq!(summary.compiled, vec!["src/main.rs"]);
    assert!(summary.failed.is_empty());
    assert_eq!(summary.replans, 1);
    assert_eq!(project.provider.calls(CallSite::Compile), 1);
    assert_eq!(summary.stages_run.last(), Some(&StageKind::VerifyInternals));
    assert_eq!(
        project.read("src/main.rs").as_deref(),
        Some("fn main() { println!(\"hello\"); }\n")
    );

    let manifest = DepsManifest::load(&project.layout().deps_path()).unwrap();
    assert_eq!(manifest.tool.as_deref(), Some("cargo"));
    let packages: Vec<_> = manifest.packages().collect();
    assert_eq!(packages, vec![("rust", "serde", "1.0")]);

    let records = GenerationRecords::new(&project.store);
    let sources = nodes_of(&project, NodeType::SourceFile);
    assert_eq!(sources.len(), 1);
    assert_eq!(records.list(&sources[0].id).unwrap().len(), 1);

    let metadata = project.store.children(&sources[0].id, NodeType::GenerationMetadata).unwrap();
    assert_eq!(metadata.len(), 1);
    assert_eq!(metadata[0].structured_str("intentPath"), Some("src/main.rs.md"));

    let runs = nodes_of(&project, NodeType::BuildRun);
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, NodeStatus::Completed);

    project.workspace().verify_dependencies(DEFAULT_SCOPE, "web").unwrap();
}

#[tokio::test]
async fn test_indexed_strategy_feeds_summaries_to_compile() {
    let project = TestProject::new().unwrap();
    project
        .write_config(&BuildConfig {
            strategy: Strategy::Indexed,
            ..BuildConfig::default()
        })
        .await
        .unwrap();
    project.write_intent(&IntentFixture::main_rs()).unwrap();
    project
        .write_intent(&IntentFixture::new("src/lib.rs.md", "# lib\n\nA greeting helper.\n"))
        .unwrap();

    let summary = project.build().await.unwrap();

    assert_eq!(summary.indexed, 2);
    assert!(summary.stages_run.contains(&StageKind::Index));
    assert_eq!(nodes_of(&project, NodeType::IndexedMetadata).len(), 2);

    let compile_prompts = project.provider.prompts(CallSite::Compile);
    assert_eq!(compile_prompts.len(), 2);
    assert!(compile_prompts.iter().all(|prompt| prompt.contains("## Related files")));
    assert!(compile_prompts.iter().all(|prompt| prompt.contains("Entry point.")));
}

#[tokio::test]
async fn test_direct_analysis_uses_sibling_text() {
    let project = TestProject::new().unwrap();
    project.write_intent(&IntentFixture::main_rs()).unwrap();
    project
        .write_intent(&IntentFixture::new("src/lib.rs.md", "# lib\n\nA greeting helper.\n"))
        .unwrap();

    let summary = project.build().await.unwrap();

    assert_eq!(summary.indexed, 0);
    assert!(!summary.stages_run.contains(&StageKind::Index));
    let prompts = project.provider.prompts(CallSite::Compile);
    let main_prompt = prompts.iter().find(|prompt| prompt.contains("`src/main.rs.md`")).unwrap();
    assert!(main_prompt.contains("A greeting helper."));
}

#[tokio::test]
async fn test_specs_become_intent_files() {
    let provider = ScriptedProvider::stub().with_default(
        CallSite::SpecsToIntent,
        json!({"fileOps": [{"op": "set", "path": "src/main.rs.md", "content": "# main\n\nGreet the user.\n"}]}),
    );
    let project = TestProject::with_provider(provider).unwrap();
    project
        .write_spec(&SpecFixture::new("greeter.md", "# Greeter\n\nA program that greets.\n"))
        .unwrap();

    let summary = project.build().await.unwrap();

    assert_eq!(summary.intent_files_written, 1);
    assert_eq!(project.read("intent/src/main.rs.md").as_deref(), Some("# main\n\nGreet the user.\n"));
    assert_eq!(summary.compiled, vec!["src/main.rs"]);

    // Unchanged specifications are not translated again.
    project.build().await.unwrap();
    assert_eq!(project.provider.calls(CallSite::SpecsToIntent), 1);
}

#[tokio::test]
async fn test_compile_errors_are_reported_not_fatal() {
    let provider = ScriptedProvider::stub();
    provider.push_structured(CallSite::Compile, json!({"errors": ["The intent never says what to print."]}));
    let project = TestProject::with_provider(provider).unwrap();
    project
        .write_intent(&IntentFixture::new("src/a.rs.md", "# a\n\nUnclear.\n"))
        .unwrap();
    project
        .write_intent(&IntentFixture::new("src/b.rs.md", "# b\n\nReturn 2.\n"))
        .unwrap();

    let summary = project.build().await.unwrap();

    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].intent_path, "src/a.rs.md");
    assert_eq!(summary.failed[0].errors, vec!["The intent never says what to print."]);
    assert_eq!(summary.compiled, vec!["src/b.rs"]);
    assert!(!project.path("src/a.rs").exists());
}

#[tokio::test]
async fn test_suggestions_are_stored_under_the_analysis_root() {
    let provider = ScriptedProvider::stub().with_default(
        CallSite::Analyze,
        json!({"suggestions": [{"intentPath": "src/main.rs.md", "text": "Say which greeting to print."}]}),
    );
    let project = TestProject::with_provider(provider).unwrap();
    project.write_intent(&IntentFixture::main_rs()).unwrap();

    let summary = project.build().await.unwrap();

    assert_eq!(summary.suggestions, 1);
    let suggestions = nodes_of(&project, NodeType::Suggestion);
    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0].text_content.as_deref(), Some("Say which greeting to print."));
    assert_eq!(suggestions[0].structured_str("intentPath"), Some("src/main.rs.md"));
}

#[tokio::test]
async fn test_extension_skills_reach_the_compile_prompt() {
    let provider = ScriptedProvider::stub().with_default(
        CallSite::TechStack,
        json!({"tool": "cargo", "runtimes": {"rust": {}}, "extensions": {"rust-style": "1.0"}}),
    );
    let project = TestProject::with_provider(provider).unwrap();
    ExtensionFixture::new("rust-style", "1.2.0")
        .with_skill("iterators.md", "Prefer iterator adapters over index loops.\n")
        .with_hook("fmt.json", "{\"event\": \"after-compile\", \"command\": \"cargo fmt\"}")
        .write_to(&project.home.join("extensions"))
        .unwrap();
    project.write_spec(&SpecFixture::tech_stack()).unwrap();
    project.write_intent(&IntentFixture::main_rs()).unwrap();

    project.build().await.unwrap();

    let tech_stack_prompt = &project.provider.prompts(CallSite::TechStack)[0];
    assert!(tech_stack_prompt.contains("Available extensions: rust-style@1.2.0"));

    let installed = nodes_of(&project, NodeType::Extension);
    assert_eq!(installed.len(), 1);
    assert_eq!(installed[0].structured_str("version"), Some("1.2.0"));
    assert_eq!(nodes_of(&project, NodeType::Hook).len(), 1);

    let compile_prompt = &project.provider.prompts(CallSite::Compile)[0];
    assert!(compile_prompt.contains("## Skills"));
    assert!(compile_prompt.contains("Prefer iterator adapters over index loops."));
}

#[tokio::test]
async fn test_local_config_files_are_mirrored() {
    let project = TestProject::new().unwrap();
    project.write_config(&BuildConfig::default()).await.unwrap();
    project.write_intent(&IntentFixture::main_rs()).unwrap();

    project.build().await.unwrap();

    let config_files = nodes_of(&project, NodeType::ConfigFile);
    assert!(!config_files.is_empty());
    assert!(config_files.iter().any(|node| node.text_content.as_deref().is_some_and(|t| t.contains("max_replans"))));
}

#[tokio::test]
async fn test_orchestrator_reads_extensions_from_given_dir() {
    let project = TestProject::new().unwrap();
    let extensions = project.temp_dir.path().join("shared-extensions");
    ExtensionFixture::new("rust-style", "1.2.0")
        .with_skill("iterators.md", "Prefer iterator adapters.\n")
        .write_to(&extensions)
        .unwrap();
    project.write_spec(&SpecFixture::tech_stack()).unwrap();
    project.write_intent(&IntentFixture::main_rs()).unwrap();

    BuildOrchestrator::new(Arc::clone(&project.store), &project.home)
        .with_provider(project.provider.clone())
        .with_extensions_dir(&extensions)
        .run_build(DEFAULT_SCOPE, "web")
        .await
        .unwrap();

    let tech_stack_prompt = &project.provider.prompts(CallSite::TechStack)[0];
    assert!(tech_stack_prompt.contains("Available extensions: rust-style@1.2.0"));
}

#[tokio::test]
async fn test_build_waits_for_the_project_lock() {
    let project = TestProject::new().unwrap();
    project.write_intent(&IntentFixture::main_rs()).unwrap();
    let held = ProjectLock::acquire(&project.home, DEFAULT_SCOPE, "web").await.unwrap();

    let orchestrator = BuildOrchestrator::new(Arc::clone(&project.store), &project.home)
        .with_provider(project.provider.clone())
        .with_lock_timeout(Duration::from_millis(100));
    let err = orchestrator.run_build(DEFAULT_SCOPE, "web").await.unwrap_err();
    assert!(err.to_string().contains("Timeout"));
    assert!(!project.path("src/main.rs").exists());

    drop(held);
    let summary = orchestrator.run_build(DEFAULT_SCOPE, "web").await.unwrap();
    assert_eq!(summary.compiled, vec!["src/main.rs"]);
}

#[test]
fn test_blocking_build_from_sync_code() {
    let project = TestProject::new().unwrap();
    project.write_intent(&IntentFixture::main_rs()).unwrap();

    let summary = project.workspace().run_build_blocking(DEFAULT_SCOPE, "web").unwrap();

    assert_eq!(summary.compiled, vec!["src/main.rs"]);
    assert!(project.path("src/main.rs").is_file());
}
