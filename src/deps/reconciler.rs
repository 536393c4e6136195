//! Folding dependency deltas into the graph and `deps.json`.
//!
//! Two views are kept:
//!
//! - the per-file view, the `dependencies` map in an intent-file node's
//!   structured content, where `delete` removes the package;
//! - the project view, the dependency-root node, where packages are only ever
//!   added or updated.
//!
//! Each package a file needs is also an edge `intent-file -> dependency-root`
//! labelled with the package name. After every fold the project view is
//! written to `.intentcode/deps.json`, and [`DependencyReconciler::verify`]
//! checks that the file still matches the graph.

use super::manifest::{DeltaKind, DependencyDelta, DepsManifest, PackageMap};
use crate::constants::DEPENDENCY_ROOT_NAME;
use crate::core::IntentError;
use crate::generation::validators;
use crate::graph::{GraphStore, NewNode, Node, NodeType};
use crate::project::ProjectLayout;
use crate::utils::{atomic_write, canonical_json};
use anyhow::{Context, Result};
use gray_matter::Matter;
use gray_matter::engine::YAML;
use serde::Deserialize;
use serde_json::{Map, Value, json};
use std::collections::BTreeMap;
use std::path::PathBuf;
use tracing::{debug, info};

const DEPENDENCIES_KEY: &str = "dependencies";
const DECLARED_KEY: &str = "declared";

#[derive(Debug, Default, Deserialize)]
struct IntentFrontMatter {
    #[serde(default)]
    dependencies: BTreeMap<String, serde_yaml::Value>,
}

/// Packages declared in an intent file's YAML front-matter.
///
/// ```yaml
/// ---
/// dependencies:
///   serde: "1.0"
///   tokio: ">=1.40"
/// ---
/// ```
///
/// Text without front-matter declares nothing.
pub fn declared_dependencies(intent_text: &str) -> Result<PackageMap> {
    let matter = Matter::<YAML>::new();
    let parsed = matter
        .parse::<serde_yaml::Value>(intent_text)
        .context("Failed to parse intent front-matter")?;
    let Some(data) = parsed.data else {
        return Ok(PackageMap::new());
    };

    let front: IntentFrontMatter =
        serde_yaml::from_value(data).context("Intent front-matter 'dependencies' must be a map")?;

    let mut declared = PackageMap::new();
    for (name, requirement) in front.dependencies {
        let requirement = match requirement {
            serde_yaml::Value::String(s) => s,
            serde_yaml::Value::Number(n) => n.to_string(),
            serde_yaml::Value::Null => "*".to_string(),
            other => {
                return Err(IntentError::InvalidDependency {
                    name,
                    reason: format!("requirement must be a string, found {other:?}"),
                }
                .into());
            }
        };
        if !validators::is_valid_package_name(&name) {
            return Err(IntentError::InvalidDependency {
                name,
                reason: "not a valid package name".to_string(),
            }
            .into());
        }
        validators::version_requirement(&requirement).map_err(|reason| IntentError::InvalidDependency {
            name: name.clone(),
            reason,
        })?;
        declared.insert(name, requirement);
    }
    Ok(declared)
}

/// Deltas turning the `previous` declaration into `declared`.
#[must_use]
pub fn diff_declared(previous: &PackageMap, declared: &PackageMap) -> Vec<DependencyDelta> {
    let mut deltas: Vec<DependencyDelta> = declared
        .iter()
        .filter(|(name, requirement)| previous.get(*name) != Some(*requirement))
        .map(|(name, requirement)| DependencyDelta::set(name.clone(), requirement.clone()))
        .collect();
    deltas.extend(
        previous
            .keys()
            .filter(|name| !declared.contains_key(*name))
            .map(|name| DependencyDelta::delete(name.clone())),
    );
    deltas
}

/// The per-file dependency view of an intent-file node.
#[must_use]
pub fn file_dependencies(intent_file: &Node) -> PackageMap {
    package_map(intent_file.structured_content.as_ref(), DEPENDENCIES_KEY)
}

/// The front-matter declaration last folded into an intent-file node.
#[must_use]
pub fn file_declared(intent_file: &Node) -> PackageMap {
    package_map(intent_file.structured_content.as_ref(), DECLARED_KEY)
}

fn package_map(content: Option<&Value>, key: &str) -> PackageMap {
    content
        .and_then(|c| c.get(key))
        .and_then(Value::as_object)
        .map(|map| {
            map.iter().filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string()))).collect()
        })
        .unwrap_or_default()
}

fn with_package_map(content: Option<&Value>, key: &str, packages: &PackageMap) -> Value {
    let mut map = match content {
        Some(Value::Object(map)) => map.clone(),
        _ => Map::new(),
    };
    map.insert(key.to_string(), json!(packages));
    Value::Object(map)
}

/// Keeps the dependency views of a project consistent.
pub struct DependencyReconciler<'a> {
    store: &'a GraphStore,
}

impl<'a> DependencyReconciler<'a> {
    #[must_use]
    pub const fn new(store: &'a GraphStore) -> Self {
        Self {
            store,
        }
    }

    /// The project's dependency-root node, created empty on first use.
    pub fn dependency_root(&self, project: &Node) -> Result<Node> {
        self.store.get_or_create(
            NewNode::child_of(project, NodeType::DependencyRoot, DEPENDENCY_ROOT_NAME).with_structured(json!({})),
        )
    }

    /// The project view as a manifest.
    pub fn manifest(&self, project: &Node) -> Result<DepsManifest> {
        let root = self.dependency_root(project)?;
        DepsManifest::from_value(root.structured_content.as_ref())
    }

    /// Fold `deltas` into both views, maintain edges, and rewrite `deps.json`.
    ///
    /// Returns the dependency-root node after the fold.
    pub fn process_deltas(&self, project: &Node, intent_file: &Node, deltas: &[DependencyDelta]) -> Result<Node> {
        for delta in deltas {
            delta.validate()?;
        }

        let root = self.dependency_root(project)?;
        let intent_file = self.store.get_by_id(&intent_file.id)?.ok_or_else(|| IntentError::NodeNotFound {
            id: intent_file.id.clone(),
        })?;

        let mut manifest = DepsManifest::from_value(root.structured_content.as_ref())?;
        let mut per_file = file_dependencies(&intent_file);
        let default_runtime = manifest.default_runtime();

        for delta in deltas {
            match delta.kind {
                DeltaKind::Set => {
                    let runtime = delta.runtime.as_deref().unwrap_or(&default_runtime);
                    per_file.insert(delta.package_name.clone(), delta.requirement().to_string());
                    manifest.set_package(runtime, &delta.package_name, delta.requirement());
                    self.store.add_edge(&intent_file.id, &root.id, &delta.package_name)?;
                }
                DeltaKind::Delete => {
                    per_file.remove(&delta.package_name);
                    self.store.remove_edge(&intent_file.id, &root.id, &delta.package_name)?;
                }
            }
            debug!(
                intent_file = %intent_file.name,
                package = %delta.package_name,
                kind = ?delta.kind,
                "Folded dependency delta"
            );
        }

        if per_file != file_dependencies(&intent_file) {
            let content = with_package_map(intent_file.structured_content.as_ref(), DEPENDENCIES_KEY, &per_file);
            self.store.set_structured_content(&intent_file.id, &content)?;
        }

        let root = self.store_manifest(&root, &manifest)?;
        self.write_manifest(project)?;
        Ok(root)
    }

    /// Fold an intent file's front-matter declaration into both views.
    ///
    /// Packages dropped from the front-matter leave the per-file view.
    pub fn apply_declared(&self, project: &Node, intent_file: &Node, declared: &PackageMap) -> Result<Node> {
        let previous = file_declared(intent_file);
        let deltas = diff_declared(&previous, declared);
        let root = if deltas.is_empty() {
            self.dependency_root(project)?
        } else {
            self.process_deltas(project, intent_file, &deltas)?
        };

        if previous != *declared {
            let current = self.store.get_by_id(&intent_file.id)?.ok_or_else(|| IntentError::NodeNotFound {
                id: intent_file.id.clone(),
            })?;
            let content = with_package_map(current.structured_content.as_ref(), DECLARED_KEY, declared);
            self.store.set_structured_content(&intent_file.id, &content)?;
        }
        Ok(root)
    }

    /// Copy packages from an earlier node for the same intent file into
    /// `current` when `current` has none yet.
    pub fn carry_forward(&self, project: &Node, previous: &Node, current: &Node) -> Result<()> {
        let current = self.store.get_by_id(&current.id)?.ok_or_else(|| IntentError::NodeNotFound {
            id: current.id.clone(),
        })?;
        if !file_dependencies(&current).is_empty() {
            return Ok(());
        }
        let deltas: Vec<DependencyDelta> = file_dependencies(previous)
            .into_iter()
            .map(|(name, requirement)| DependencyDelta::set(name, requirement))
            .collect();
        if !deltas.is_empty() {
            debug!(intent_file = %current.name, count = deltas.len(), "Carrying dependencies forward");
            self.process_deltas(project, &current, &deltas)?;
        }
        Ok(())
    }

    /// Merge a tech stack manifest into the project view and rewrite `deps.json`.
    pub fn apply_tech_stack(&self, project: &Node, tech_stack: &DepsManifest) -> Result<Node> {
        let root = self.dependency_root(project)?;
        let mut manifest = DepsManifest::from_value(root.structured_content.as_ref())?;
        manifest.merge(tech_stack);
        let root = self.store_manifest(&root, &manifest)?;
        self.write_manifest(project)?;
        Ok(root)
    }

    fn store_manifest(&self, root: &Node, manifest: &DepsManifest) -> Result<Node> {
        let value = manifest.to_value()?;
        if root.structured_content.as_ref() == Some(&value) {
            return Ok(root.clone());
        }
        self.store.set_structured_content(&root.id, &value)
    }

    /// Write the project view to `deps.json` atomically.
    pub fn write_manifest(&self, project: &Node) -> Result<PathBuf> {
        let path = ProjectLayout::of_project(project)?.deps_path();
        let manifest = self.manifest(project)?;
        atomic_write(&path, manifest.to_pretty_json()?.as_bytes())?;
        debug!(path = %path.display(), "Wrote dependency manifest");
        Ok(path)
    }

    /// Fail with [`IntentError::DependencyDivergence`] when `deps.json` differs
    /// from the graph. A missing file reads as an empty manifest.
    pub fn verify(&self, project: &Node) -> Result<()> {
        let path = ProjectLayout::of_project(project)?.deps_path();
        let on_disk = DepsManifest::load(&path)?;
        let in_graph = self.manifest(project)?;

        if on_disk != in_graph {
            return Err(IntentError::DependencyDivergence {
                path: path.display().to_string(),
                on_disk: canonical_json(&on_disk.to_value()?),
                in_graph: canonical_json(&in_graph.to_value()?),
            }
            .into());
        }

        info!(project = %project.name, "Dependency manifest matches the graph");
        Ok(())
    }
}
