//! Structural integrity checks over a whole graph.
//!
//! The factory keeps its invariants while it is mutated through its API and
//! the loader rejects files that break them locally. What neither can see is
//! global: a ring of nodes owning each other with consistent parent links
//! passes every per-node check. [`check`] builds the ownership graph with
//! petgraph and looks for cycles, alongside the per-node rules, so a store
//! can refuse such graphs after loading.

use petgraph::algo::{is_cyclic_directed, tarjan_scc};
use petgraph::graph::{DiGraph, NodeIndex};
use serde::{Deserialize, Serialize};

use csasg_core::{schema, EdgeKind, Factory, NodeId};

use crate::error::StorageError;

/// A single integrity violation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, thiserror::Error)]
pub enum Finding {
    /// A node names a parent that does not own it.
    #[error("node {node} names parent {parent} which does not own it")]
    ParentMismatch { node: NodeId, parent: NodeId },

    /// An owning edge holds a node whose parent is someone else.
    #[error("node {child} is owned by {owner} but names parent {parent}")]
    OwnerMismatch {
        owner: NodeId,
        child: NodeId,
        parent: NodeId,
    },

    /// More than one node owns the same child.
    #[error("node {child} has {owners} owners")]
    MultipleOwners { child: NodeId, owners: usize },

    /// An edge targets a slot with no live node.
    #[error("node {node} edge {} targets missing node {target}", .edge.name())]
    Dangling {
        node: NodeId,
        edge: EdgeKind,
        target: NodeId,
    },

    /// An edge targets a node of the wrong kind.
    #[error("node {node} edge {} targets node {target} of the wrong kind", .edge.name())]
    WrongTargetKind {
        node: NodeId,
        edge: EdgeKind,
        target: NodeId,
    },

    /// The root is owned or has a parent.
    #[error("root {root} is owned by another node")]
    RootOwned { root: NodeId },

    /// Nodes that own each other, directly or transitively.
    #[error("ownership cycle through nodes {nodes:?}")]
    OwnershipCycle { nodes: Vec<NodeId> },
}

/// Runs every check and returns the findings, in discovery order.
///
/// Each finding is also logged at `warn` level.
pub fn check(factory: &Factory) -> Vec<Finding> {
    let schema = schema();
    let mut findings = Vec::new();
    let root = factory.root();

    // Ownership graph: one petgraph node per live ASG node.
    let mut owners: DiGraph<NodeId, EdgeKind> = DiGraph::new();
    let mut index: Vec<Option<NodeIndex>> = vec![None; factory.size()];
    for node in factory.nodes() {
        if let Some(slot) = index.get_mut(node.id().index()) {
            *slot = Some(owners.add_node(node.id()));
        }
    }
    let lookup = |id: NodeId| index.get(id.index()).copied().flatten();
    let mut owner_count = vec![0usize; factory.size()];

    for node in factory.nodes() {
        let id = node.id();
        let parent = node.parent();
        if parent.is_some() && !factory.get_ref(parent).is_some_and(|p| p.owns(id)) {
            findings.push(Finding::ParentMismatch { node: id, parent });
        }

        for (edge, target) in node.targets() {
            let spec = edge.spec();
            let Some(target_node) = factory.get_ref(target) else {
                findings.push(Finding::Dangling {
                    node: id,
                    edge,
                    target,
                });
                continue;
            };
            if !schema.is_descendant(target_node.kind(), spec.target) {
                findings.push(Finding::WrongTargetKind {
                    node: id,
                    edge,
                    target,
                });
            }
            if !spec.is_owning() {
                continue;
            }
            if target_node.parent() != id {
                findings.push(Finding::OwnerMismatch {
                    owner: id,
                    child: target,
                    parent: target_node.parent(),
                });
            }
            if let (Some(from), Some(to)) = (lookup(id), lookup(target)) {
                if !owners.contains_edge(from, to) {
                    owners.add_edge(from, to, edge);
                    if let Some(count) = owner_count.get_mut(target.index()) {
                        *count += 1;
                    }
                }
            }
        }
    }

    for (i, &count) in owner_count.iter().enumerate() {
        if count > 1 {
            findings.push(Finding::MultipleOwners {
                child: NodeId(i as u32),
                owners: count,
            });
        }
    }

    let root_owned = owner_count.get(root.index()).is_some_and(|&c| c > 0)
        || factory.get_ref(root).is_some_and(|r| r.parent().is_some());
    if root_owned {
        findings.push(Finding::RootOwned { root });
    }

    if is_cyclic_directed(&owners) {
        for component in tarjan_scc(&owners) {
            let looped = component.len() > 1
                || component
                    .first()
                    .is_some_and(|&n| owners.contains_edge(n, n));
            if looped {
                let mut nodes: Vec<NodeId> = component.iter().map(|&n| owners[n]).collect();
                nodes.sort();
                findings.push(Finding::OwnershipCycle { nodes });
            }
        }
    }

    for finding in &findings {
        tracing::warn!("integrity check failed: {}", finding);
    }
    findings
}

/// Fails with the first finding, if any.
pub fn ensure(factory: &Factory) -> Result<(), StorageError> {
    match check(factory).into_iter().next() {
        None => Ok(()),
        Some(finding) => Err(StorageError::Integrity {
            reason: finding.to_string(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use csasg_core::NodeKind;

    #[test]
    fn valid_graph_has_no_findings() {
        let mut f = Factory::new();
        let root = f.root();
        let ns = f.create_node(NodeKind::NamespaceDeclaration).unwrap();
        let class = f.create_node(NodeKind::ClassDeclaration).unwrap();
        f.add_edge(root, EdgeKind::CompilationUnitMembers, ns).unwrap();
        f.add_edge(ns, EdgeKind::NamespaceDeclarationMembers, class)
            .unwrap();
        let reference = f.create_node(NodeKind::IdentifierName).unwrap();
        f.set_edge(reference, EdgeKind::IdentifierNameDeclaration, class)
            .unwrap();

        assert!(check(&f).is_empty());
        assert!(ensure(&f).is_ok());
    }
}
