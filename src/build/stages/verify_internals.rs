//! `verify-internals`: the on-disk manifest matches the graph and every node of
//! the project sits under a parent its type allows.

use super::{StageEnv, StageOutcome};
use crate::build::ProjectContext;
use crate::deps::DependencyReconciler;
use crate::graph::{GraphStore, Node};
use anyhow::Result;
use std::collections::HashMap;
use tracing::debug;

pub fn run(env: &StageEnv<'_>, context: &ProjectContext) -> Result<StageOutcome> {
    DependencyReconciler::new(env.store).verify(&context.project)?;
    let checked = audit_parent_types(env.store, &context.project)?;
    debug!(project = %context.project.name, nodes = checked, "Parent types verified");
    Ok(StageOutcome::unchanged())
}

/// Check the parent-type rule for every node under `project`. Returns the
/// number of nodes checked.
pub fn audit_parent_types(store: &GraphStore, project: &Node) -> Result<usize> {
    let nodes = store.subtree(&project.id)?;
    let types: HashMap<&str, _> = nodes.iter().map(|n| (n.id.as_str(), n.node_type)).collect();

    for node in &nodes {
        let parent_type = node.parent_id.as_deref().and_then(|id| types.get(id).copied());
        if node.id == project.id {
            continue;
        }
        node.node_type.check_parent(parent_type)?;
    }
    Ok(nodes.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::{NewNode, NodeType};

    #[test]
    fn test_audit_passes_on_valid_tree() {
        let store = GraphStore::in_memory().unwrap();
        let project = store.create(NewNode::new("default", NodeType::Project, "web")).unwrap();
        let container = store.create(NewNode::child_of(&project, NodeType::BuildContainer, "builds")).unwrap();
        store.create(NewNode::child_of(&container, NodeType::BuildRun, "run")).unwrap();
        assert_eq!(audit_parent_types(&store, &project).unwrap(), 3);
    }
}
