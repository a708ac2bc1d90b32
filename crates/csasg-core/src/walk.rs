//! Iterative preorder traversal over owning edges.
//!
//! The walk keeps an explicit stack instead of recursing, since expression
//! chains in real C# sources nest deeply enough to exhaust the call stack.

use crate::error::CoreError;
use crate::factory::Factory;
use crate::id::NodeId;
use crate::node::Node;

/// Callbacks invoked by [`Preorder`].
pub trait Visitor {
    /// Called before any of the node's children.
    fn visit(&mut self, _node: &Node) {}

    /// Called after all of the node's children.
    fn visit_end(&mut self, _node: &Node) {}
}

enum Step {
    Enter(NodeId),
    Exit(NodeId),
}

/// Preorder walker over a [`Factory`].
pub struct Preorder<'a> {
    factory: &'a Factory,
    skip_filtered: bool,
}

impl<'a> Preorder<'a> {
    pub fn new(factory: &'a Factory) -> Self {
        Preorder {
            factory,
            skip_filtered: false,
        }
    }

    /// When set, filtered nodes and their subtrees are not visited.
    pub fn skip_filtered(mut self, skip: bool) -> Self {
        self.skip_filtered = skip;
        self
    }

    /// Walks the owned subtree of `start`.
    pub fn run_from<V: Visitor>(&self, start: NodeId, visitor: &mut V) -> Result<(), CoreError> {
        self.factory.get_node(start)?;
        let mut visited = vec![false; self.factory.size()];
        self.walk(start, &mut visited, visitor);
        Ok(())
    }

    /// Visits every live node once: the root subtree, then each individual
    /// node's subtree in id order, then anything not reached so far.
    pub fn run_all<V: Visitor>(&self, visitor: &mut V) {
        let mut visited = vec![false; self.factory.size()];
        self.walk(self.factory.root(), &mut visited, visitor);

        let individuals: Vec<NodeId> = self
            .factory
            .nodes()
            .map(Node::id)
            .filter(|&id| self.factory.is_individual(id))
            .collect();
        for id in individuals {
            self.walk(id, &mut visited, visitor);
        }

        let leftovers: Vec<NodeId> = self.factory.nodes().map(Node::id).collect();
        for id in leftovers {
            self.walk(id, &mut visited, visitor);
        }
    }

    fn hidden(&self, id: NodeId) -> bool {
        self.skip_filtered && self.factory.is_filtered(id).unwrap_or(false)
    }

    /// Marks the owned subtree below a hidden node as visited, so later
    /// passes never start a walk inside it.
    fn prune(&self, hidden: &Node, visited: &mut [bool]) {
        let mut pending: Vec<NodeId> = hidden.children().collect();
        while let Some(id) = pending.pop() {
            match visited.get_mut(id.index()) {
                Some(seen) if !*seen => *seen = true,
                _ => continue,
            }
            if let Some(node) = self.factory.get_ref(id) {
                pending.extend(node.children());
            }
        }
    }

    fn walk<V: Visitor>(&self, start: NodeId, visited: &mut [bool], visitor: &mut V) {
        let mut stack = vec![Step::Enter(start)];
        let mut children = Vec::new();
        while let Some(step) = stack.pop() {
            match step {
                Step::Enter(id) => {
                    let Some(node) = self.factory.get_ref(id) else {
                        continue;
                    };
                    match visited.get_mut(id.index()) {
                        Some(seen) if !*seen => *seen = true,
                        _ => continue,
                    }
                    if self.hidden(id) {
                        self.prune(node, visited);
                        continue;
                    }
                    visitor.visit(node);
                    stack.push(Step::Exit(id));
                    children.clear();
                    children.extend(node.children());
                    stack.extend(children.iter().rev().map(|&child| Step::Enter(child)));
                }
                Step::Exit(id) => {
                    if let Some(node) = self.factory.get_ref(id) {
                        visitor.visit_end(node);
                    }
                }
            }
        }
    }
}

/// Collects visited ids in visit order.
#[derive(Debug, Default)]
pub struct CollectIds(pub Vec<NodeId>);

impl Visitor for CollectIds {
    fn visit(&mut self, node: &Node) {
        self.0.push(node.id());
    }
}
